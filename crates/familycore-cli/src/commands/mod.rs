//! Operator CLI subcommands, one module per spec §6 command group.

pub mod bus;
pub mod pipelines;
pub mod space;

use std::process::ExitCode;

use familycore_core::{Classify, ErrorKind};

/// Error surfaced by a CLI subcommand, carrying the §7 error-taxonomy kind
/// used to pick the process exit code (spec §6): `2` invariant violation,
/// `3` substrate error, `4` policy denied, `5` not found.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Storage(#[from] familycore_core::StorageError),
    #[error(transparent)]
    Bus(#[from] familycore_core::BusError),
    #[error(transparent)]
    Pipeline(#[from] familycore_core::CoreError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvariantViolation(String),
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        let code = match self {
            CliError::NotFound(_) => 5,
            CliError::InvariantViolation(_) => 2,
            CliError::Storage(e) => kind_to_code(e.kind()),
            CliError::Bus(e) => kind_to_code(e.kind()),
            CliError::Pipeline(e) => kind_to_code(e.kind),
        };
        ExitCode::from(code)
    }
}

fn kind_to_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvariantViolation => 2,
        ErrorKind::SubstrateFailure | ErrorKind::Busy | ErrorKind::Deadline | ErrorKind::PoisonedDependency => 3,
        ErrorKind::PolicyDenial => 4,
        ErrorKind::Duplicate => 0,
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
