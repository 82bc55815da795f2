//! Command-line arguments.
//!
//! Plain paths are imported when the player starts. The maintenance flags
//! work on the stored library and exit without opening the terminal UI.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use log::info;
use serde_json::Value;

use crate::error::CommandError;
use crate::storage::{KeyValueStore, PlayerStore};

pub const USAGE: &str = "\
usage: allegro [FILE|DIR]...
       allegro --export FILE   write the stored library to FILE as JSON
       allegro --import FILE   replace stored documents with those in FILE
       allegro --clear         delete every stored document
       allegro --help";

#[derive(Debug, PartialEq)]
pub enum Command {
    /// Start the player, importing these paths first.
    Play(Vec<PathBuf>),
    Maintain(Maintenance),
    Help,
}

#[derive(Debug, PartialEq)]
pub enum Maintenance {
    Export(PathBuf),
    Import(PathBuf),
    Clear,
}

pub fn parse(args: impl IntoIterator<Item = OsString>) -> Result<Command, CommandError> {
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(Command::Play(Vec::new()));
    };

    let (flag, command) = match first.to_str() {
        Some("-h" | "--help") => return Ok(Command::Help),
        Some("--export") => {
            let file = file_arg(&mut args, "--export")?;
            ("--export", Maintenance::Export(file))
        }
        Some("--import") => {
            let file = file_arg(&mut args, "--import")?;
            ("--import", Maintenance::Import(file))
        }
        Some("--clear") => ("--clear", Maintenance::Clear),
        Some(other) if other.starts_with("--") => {
            return Err(CommandError::UnknownOption(other.to_string()));
        }
        _ => {
            let paths = std::iter::once(first.clone()).chain(args).map(PathBuf::from);
            return Ok(Command::Play(paths.collect()));
        }
    };

    match args.next() {
        Some(extra) => Err(CommandError::Unexpected(
            extra.to_string_lossy().into_owned(),
            flag,
        )),
        None => Ok(Command::Maintain(command)),
    }
}

fn file_arg(
    args: &mut impl Iterator<Item = OsString>,
    flag: &'static str,
) -> Result<PathBuf, CommandError> {
    args.next()
        .map(PathBuf::from)
        .ok_or(CommandError::MissingValue(flag))
}

/// Run a maintenance command and describe what it did.
pub fn execute<S: KeyValueStore>(
    command: Maintenance,
    store: &mut PlayerStore<S>,
) -> Result<String, CommandError> {
    match command {
        Maintenance::Export(path) => {
            let data = store.export().ok_or(CommandError::Storage("the export"))?;
            let json = serde_json::to_string_pretty(&data).map_err(|source| CommandError::Json {
                path: path.clone(),
                source,
            })?;
            fs::write(&path, json).map_err(|source| CommandError::Io {
                path: path.clone(),
                source,
            })?;
            info!("exported library to {}", path.display());
            Ok(format!(
                "exported {} track(s) to {} ({} bytes stored)",
                store.tracks().len(),
                path.display(),
                store.usage()
            ))
        }
        Maintenance::Import(path) => {
            let raw = fs::read_to_string(&path).map_err(|source| CommandError::Io {
                path: path.clone(),
                source,
            })?;
            let data: Value = serde_json::from_str(&raw).map_err(|source| CommandError::Json {
                path: path.clone(),
                source,
            })?;
            if !store.import(&data) {
                return Err(CommandError::Storage("the import"));
            }
            info!("imported library from {}", path.display());
            Ok(format!(
                "imported {} track(s) from {}",
                store.tracks().len(),
                path.display()
            ))
        }
        Maintenance::Clear => {
            if !store.clear_all() {
                return Err(CommandError::Storage("clearing"));
            }
            info!("cleared stored library");
            Ok("cleared the stored library".to_string())
        }
    }
}
