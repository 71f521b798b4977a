//! Logger setup
//!
//! `env_logger` behind the `log` facade. The default filter is `info`;
//! `RUST_LOG` overrides it. Lines look like
//! `[2024-05-01 12:00:00.123] [INFO] [pluckpad::instrument] message`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use env_logger::{Env, Target};
use once_cell::sync::Lazy;

static LOG_FILE: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

fn open_log_file(path: &Path) -> Result<File, String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create log directory {:?}: {}", parent, e))?;
        }
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {:?}: {}", path, e))
}

/// Install the global logger, writing to `log_file` if given, else stderr
///
/// Fails if the file cannot be opened or a logger is already installed.
pub fn init_logging(log_file: Option<&Path>) -> Result<(), String> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = open_log_file(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| format!("Failed to initialise logger: {}", e))?;

    if let Ok(mut current) = LOG_FILE.lock() {
        *current = log_file.map(Path::to_path_buf);
    }

    log::info!("pluckpad {} started", env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// File the logger writes to, if any
pub fn log_file_path() -> Option<PathBuf> {
    LOG_FILE.lock().ok().and_then(|p| p.clone())
}
