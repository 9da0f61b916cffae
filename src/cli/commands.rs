//! CLI command implementations
//!
//! Each command loads the config, opens the store, does one thing, prints
//! one JSON object, and shuts the store down. Commands other than `init`
//! require an initialized data directory.

use std::path::Path;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::component::ComponentKind;
use crate::config::Config;
use crate::context::TermStore;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    match run_command(cli.command) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Resolve { config, uuids } => resolve(&config, &uuids),
        Command::Lookup { config, nid } => lookup(&config, nid),
        Command::Stamp { config, sequence } => stamp(&config, sequence),
        Command::Stats { config } => stats(&config),
    }
}

/// Opens the store for a command that needs existing data.
fn open_initialized(config_path: &Path) -> CliResult<TermStore> {
    let config = Config::load(config_path)?;
    if !TermStore::is_initialized(config.data_path()) {
        return Err(CliError::not_initialized());
    }
    Ok(TermStore::open(config)?)
}

/// Creates the data directory and an empty store
pub fn init(config_path: &Path) -> CliResult<Value> {
    let config = Config::load(config_path)?;
    if TermStore::is_initialized(config.data_path()) {
        return Err(CliError::already_initialized());
    }

    let store = TermStore::open(config)?;
    store.shutdown()?;
    Ok(json!({
        "initialized": true,
        "data_dir": store.data_dir().display().to_string(),
    }))
}

/// Resolves UUIDs of one component to a nid, creating it if needed
pub fn resolve(config_path: &Path, uuids: &[Uuid]) -> CliResult<Value> {
    let store = open_initialized(config_path)?;
    let nid = store.get_nid_for_uuids(uuids)?;
    let concept_sequence = store
        .components(ComponentKind::Concept)
        .sequences()
        .get_sequence(nid);
    store.shutdown()?;

    Ok(json!({
        "nid": nid,
        "concept_sequence": concept_sequence,
    }))
}

/// Lists the UUIDs of a nid
pub fn lookup(config_path: &Path, nid: i32) -> CliResult<Value> {
    if nid >= 0 {
        return Err(CliError::not_found(format!("nid {} is not negative", nid)));
    }
    let store = open_initialized(config_path)?;
    let uuids = store.get_uuids(nid)?;
    if uuids.is_empty() {
        return Err(CliError::not_found(format!("no UUID maps to nid {}", nid)));
    }
    Ok(json!({
        "nid": nid,
        "uuids": uuids.iter().map(Uuid::to_string).collect::<Vec<_>>(),
    }))
}

/// Shows one stamp with its comment and aliases
pub fn stamp(config_path: &Path, sequence: u32) -> CliResult<Value> {
    let store = open_initialized(config_path)?;
    let stamps = store.stamps();
    let stamp = stamps
        .get_stamp(sequence)
        .map_err(crate::Error::from)?
        .ok_or_else(|| CliError::not_found(format!("no stamp at sequence {}", sequence)))?;

    Ok(json!({
        "sequence": sequence,
        "stamp": stamp,
        "description": stamp.to_string(),
        "comment": stamps.get_comment(sequence),
        "aliases": stamps.get_aliases(sequence),
    }))
}

/// Prints store statistics
pub fn stats(config_path: &Path) -> CliResult<Value> {
    let store = open_initialized(config_path)?;
    // counts cover every shard, not just the ones touched so far
    store.identifiers().load_all().map_err(crate::Error::from)?;
    Ok(serde_json::to_value(store.stats())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::Status;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_config(dir: &Path) -> PathBuf {
        let mut config = Config::for_data_dir(dir.join("data"));
        config.worker_threads = 1;
        config.log_level = "ERROR".into();
        let path = dir.join("termcore.json");
        config.save(&path).unwrap();
        path
    }

    #[test]
    fn test_init_then_reinit_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(temp_dir.path());

        assert_eq!(init(&config).unwrap()["initialized"], true);
        assert_eq!(
            init(&config).unwrap_err().code(),
            &crate::cli::CliErrorCode::AlreadyInitialized
        );
    }

    #[test]
    fn test_commands_require_init() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(temp_dir.path());
        let err = resolve(&config, &[Uuid::new_v4()]).unwrap_err();
        assert_eq!(err.code_str(), "TERM_CLI_NOT_INITIALIZED");
    }

    #[test]
    fn test_resolve_is_stable_across_runs() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(temp_dir.path());
        init(&config).unwrap();

        let uuid = Uuid::new_v4();
        let first = resolve(&config, &[uuid]).unwrap();
        let second = resolve(&config, &[uuid]).unwrap();
        assert_eq!(first["nid"], -1);
        assert_eq!(first, second);

        let found = lookup(&config, -1).unwrap();
        assert_eq!(found["uuids"][0], uuid.to_string());
        assert!(lookup(&config, -2).is_err());
    }

    #[test]
    fn test_stamp_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let config = write_config(temp_dir.path());
        init(&config).unwrap();
        {
            let store = open_initialized(&config).unwrap();
            store.add_uncommitted_stamp(Status::Active, 5, 6, 7);
            store.commit(Some("init")).unwrap().unwrap();
            store.shutdown().unwrap();
        }

        let shown = stamp(&config, 0).unwrap();
        assert_eq!(shown["comment"], "init");
        assert_eq!(shown["stamp"]["status"], "ACTIVE");
        assert!(stamp(&config, 1).is_err());

        let counts = stats(&config).unwrap();
        assert_eq!(counts["stamps"], 1);
        assert_eq!(counts["comments"], 1);
        assert_eq!(counts["loaded_shards"], 256);
    }
}
