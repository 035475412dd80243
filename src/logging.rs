//! Tracing setup.
//!
//! Line-oriented commands log to stderr. The dashboard owns the terminal, so it logs to a
//! file under the data directory instead, or under the temp dir when there is none.

use crate::config::APP_DIR;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "console.log";

pub fn default_log_path() -> PathBuf {
    log_path_under(dirs::data_dir())
}

fn log_path_under(data_dir: Option<PathBuf>) -> PathBuf {
    data_dir
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join(LOG_FILE)
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(interactive: bool, log_file: Option<&Path>) -> Result<()> {
    let target = match log_file {
        Some(p) => Some(p.to_path_buf()),
        None if interactive => Some(default_log_path()),
        None => None,
    };

    let Some(path) = target else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("init logging: {e}"));
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("init logging: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_dir_falls_back_to_temp() {
        let path = log_path_under(None);
        assert!(path.starts_with(std::env::temp_dir()));
        assert!(path.ends_with(Path::new(APP_DIR).join(LOG_FILE)));

        let path = log_path_under(Some(PathBuf::from("/data")));
        assert_eq!(path, Path::new("/data").join(APP_DIR).join(LOG_FILE));
    }
}
