// src/infra/paths.rs — Path management
//
// All paths respect the PAGECAP_HOME environment variable for isolation.
// When PAGECAP_HOME is set, config and data live under that directory.
// When unset, config uses ~/.pagecap/ and data uses XDG_DATA_HOME/pagecap.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Returns the PAGECAP_HOME override, if set.
fn pagecap_home() -> Option<PathBuf> {
    std::env::var_os("PAGECAP_HOME").map(PathBuf::from)
}

/// Home directory, falling back to the working directory on exotic platforms.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $PAGECAP_HOME/ or ~/.pagecap/
pub fn config_dir() -> PathBuf {
    if let Some(home) = pagecap_home() {
        return home;
    }
    dirs_home().join(".pagecap")
}

/// Data directory: $PAGECAP_HOME/data/ or ~/.local/share/pagecap/
pub fn data_dir() -> PathBuf {
    if let Some(home) = pagecap_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "pagecap")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

/// Default directory for captured documents.
pub fn captures_dir() -> PathBuf {
    data_dir().join("captures")
}

/// Capture ledger database.
pub fn ledger_path() -> PathBuf {
    data_dir().join("ledger.db")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure the data directories exist.
pub async fn ensure_dirs() -> anyhow::Result<()> {
    for dir in [config_dir(), data_dir(), captures_dir()] {
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}
