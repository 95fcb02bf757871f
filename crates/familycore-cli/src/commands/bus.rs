//! `familycore bus ...` — durable log inspection and replay (spec §6).

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use familycore_core::{pipelines, Bus, CoreConfig, SpaceId, Storage, StorageError};

use super::{CliError, Result};
use crate::{BusCommands, DlqCommands};

fn open(storage: &Storage, config: &CoreConfig, space: &str) -> Result<(Arc<familycore_core::SpaceStorage>, Bus)> {
    let space_id = SpaceId::new(space);
    let handle = storage.open_space(&space_id)?;
    let bus = Bus::new(handle.clone(), config.bus.clone());
    Ok((handle, bus))
}

pub fn run(storage: &Storage, config: &CoreConfig, cmd: BusCommands) -> Result<ExitCode> {
    match cmd {
        BusCommands::Tail { space, topic, from, group, json } => tail(storage, config, &space, &topic, from, group, json),
        BusCommands::Groups { space } => groups(storage, config, &space),
        BusCommands::Offsets { space, topic } => offsets(storage, config, &space, &topic),
        BusCommands::Dlq(args) => dlq(storage, config, args.command),
    }
}

fn tail(storage: &Storage, config: &CoreConfig, space: &str, topic: &str, from: Option<u64>, group: Option<String>, json: bool) -> Result<ExitCode> {
    let (handle, _bus) = open(storage, config, space)?;
    let log = handle.wal_log(topic)?;
    let records = log.replay().map_err(StorageError::from)?;
    let start = from.unwrap_or(0);
    let group_committed = group.as_deref().map(|g| handle.committed_offset(g, topic)).transpose()?;

    for record in records.into_iter().filter(|r| r.offset >= start) {
        if let Some(committed) = group_committed {
            if record.offset < committed {
                continue;
            }
        }
        match serde_json::from_slice::<serde_json::Value>(&record.payload) {
            Ok(envelope) if json => {
                println!("{}", serde_json::json!({ "offset": record.offset, "envelope": envelope }));
            }
            Ok(envelope) => println!(
                "{:>8}  {}  {}",
                record.offset.to_string().cyan(),
                envelope.get("type").and_then(|v| v.as_str()).unwrap_or("?").green(),
                envelope
            ),
            Err(_) if json => {
                println!("{}", serde_json::json!({ "offset": record.offset, "undecodable_bytes": record.payload.len() }));
            }
            Err(_) => println!("{:>8}  <{} bytes, undecodable>", record.offset.to_string().cyan(), record.payload.len()),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn groups(storage: &Storage, config: &CoreConfig, space: &str) -> Result<ExitCode> {
    let (handle, _bus) = open(storage, config, space)?;
    println!("{:<24} {:<28} {:>10} {:>10}", "GROUP", "TOPIC", "COMMITTED", "LAG");
    for handler in pipelines::catalogue() {
        let topic = handler.topic();
        let committed = handle.committed_offset(handler.name(), &topic)?;
        let log_len = handle.wal_log(&topic)?.len();
        let lag = log_len.saturating_sub(committed);
        println!("{:<24} {:<28} {:>10} {:>10}", handler.name(), topic, committed, lag);
    }
    Ok(ExitCode::SUCCESS)
}

fn offsets(storage: &Storage, config: &CoreConfig, space: &str, topic: &str) -> Result<ExitCode> {
    let (handle, _bus) = open(storage, config, space)?;
    let log_len = handle.wal_log(topic)?.len();
    println!("{:<24} {:>10} {:>10}", "GROUP", "COMMITTED", "LAG");
    for handler in pipelines::catalogue().into_iter().filter(|h| h.topic() == topic) {
        let committed = handle.committed_offset(handler.name(), topic)?;
        println!("{:<24} {:>10} {:>10}", handler.name(), committed, log_len.saturating_sub(committed));
    }
    Ok(ExitCode::SUCCESS)
}

pub fn dlq(storage: &Storage, config: &CoreConfig, cmd: DlqCommands) -> Result<ExitCode> {
    match cmd {
        DlqCommands::List { space, topic, group } => {
            let (handle, _bus) = open(storage, config, &space)?;
            let rows = handle.list_dlq(topic.as_deref(), group.as_deref())?;
            println!("{:<24} {:<24} {:<20} {:>8} {:<12}", "DLQ_ID", "GROUP", "TOPIC", "ATTEMPTS", "LAST_ERROR");
            for row in rows {
                println!(
                    "{:<24} {:<24} {:<20} {:>8} {}",
                    row.dlq_id,
                    row.group,
                    row.topic,
                    row.attempts,
                    row.last_error.red()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        DlqCommands::Replay { space, dlq_id } => {
            let (_handle, bus) = open(storage, config, &space)?;
            let offset = bus.replay_dlq(&dlq_id).map_err(|e| match e {
                familycore_core::BusError::DlqNotFound(id) => CliError::NotFound(id),
                other => other.into(),
            })?;
            println!("replayed {} at new offset {}", dlq_id, offset);
            Ok(ExitCode::SUCCESS)
        }
    }
}
