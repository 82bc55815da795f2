use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use env_logger::{Builder, Env, Target};

use crate::error::LoggingError;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "ALLEGRO_LOG";

fn open_log_file(data_dir: Option<&Path>) -> Result<(PathBuf, fs::File), LoggingError> {
    let dir = data_dir.ok_or(LoggingError::NoDataDir)?;
    let path = dir.join("allegro.log");
    let io_err = |source| LoggingError::Io {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(io_err)?;
    Ok((path, file))
}

/// Send log output to `<data_dir>/allegro.log`; the terminal belongs to the UI.
/// Returns the log file path.
pub fn init(data_dir: Option<&Path>) -> Result<PathBuf, LoggingError> {
    let (path, file) = open_log_file(data_dir)?;
    Builder::from_env(Env::default().filter_or(LOG_ENV, "info"))
        .target(Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()?;
    Ok(path)
}
