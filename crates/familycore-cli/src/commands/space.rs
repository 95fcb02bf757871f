//! `familycore space ...` — snapshot and consistency verification (spec §6).

use std::process::ExitCode;

use colored::Colorize;
use familycore_core::{pipelines, Classify, Clock, SpaceId, Storage, SystemClock};

use super::Result;
use crate::SpaceCommands;

pub fn run(storage: &Storage, cmd: SpaceCommands) -> Result<ExitCode> {
    match cmd {
        SpaceCommands::Snapshot { space_id, path } => snapshot(storage, &space_id, &path),
        SpaceCommands::Verify { space_id } => verify(storage, &space_id),
    }
}

fn snapshot(storage: &Storage, space_id: &str, path: &std::path::Path) -> Result<ExitCode> {
    let handle = storage.open_space(&SpaceId::new(space_id))?;
    let snapshot = handle.snapshot(path, SystemClock.now())?;
    println!("snapshot of {} written to {}", space_id, snapshot.dir.display());
    Ok(ExitCode::SUCCESS)
}

fn verify(storage: &Storage, space_id: &str) -> Result<ExitCode> {
    let handle = storage.open_space(&SpaceId::new(space_id))?;
    let report = pipelines::verify_space(&handle).map_err(|e| familycore_core::CoreError::new(e.kind(), e))?;

    println!("{:<28} {:>10}", "TOPIC", "WAL_RECORDS");
    for topic in &report.topics_checked {
        println!("{:<28} {:>10}", topic, report.wal_record_counts.get(topic).copied().unwrap_or(0));
    }
    if report.problems.is_empty() {
        println!("{}", "no problems found".green());
        Ok(ExitCode::SUCCESS)
    } else {
        for problem in &report.problems {
            println!("{} {problem}", "!".red().bold());
        }
        Ok(ExitCode::from(3))
    }
}
