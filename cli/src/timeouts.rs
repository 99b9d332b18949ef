//! Reply deadlines derived from the daemon's `[timeouts]` settings, so the
//! client never gives up on work the daemon is still allowed to be doing.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Round trip and prompt building on top of generation and script deadlines.
const RUN_SLACK: Duration = Duration::from_secs(30);
/// Attempts the daemon makes at downloading the speech model.
const DOWNLOAD_ATTEMPTS: u64 = 3;
/// Backoff between download attempts plus loading the model.
const LISTEN_SLACK: Duration = Duration::from_secs(60);

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    timeouts: DaemonTimeouts,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DaemonTimeouts {
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_seconds: u64,
    #[serde(default = "default_script_timeout")]
    pub script_timeout_seconds: u64,
    #[serde(default = "default_model_download_timeout")]
    pub model_download_timeout_seconds: u64,
}

impl Default for DaemonTimeouts {
    fn default() -> Self {
        Self {
            compile_timeout_seconds: default_compile_timeout(),
            script_timeout_seconds: default_script_timeout(),
            model_download_timeout_seconds: default_model_download_timeout(),
        }
    }
}

fn default_compile_timeout() -> u64 {
    60
}
fn default_script_timeout() -> u64 {
    30
}
fn default_model_download_timeout() -> u64 {
    300
}

impl DaemonTimeouts {
    pub fn load() -> Self {
        match shared::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Falls back to defaults when the file is missing or unreadable; the
    /// daemon reports config errors itself.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config at {:?}, using default timeouts", path);
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| toml::from_str::<FileConfig>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => config.timeouts,
            Err(e) => {
                warn!("Could not read timeouts from {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// How long a `run` reply may take: generation, then the script.
    pub fn run_reply(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_seconds + self.script_timeout_seconds) + RUN_SLACK
    }

    /// How long a `listen` reply may take: a first run downloads the model.
    pub fn listen_reply(&self) -> Duration {
        Duration::from_secs(self.model_download_timeout_seconds * DOWNLOAD_ATTEMPTS) + LISTEN_SLACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_daemon_defaults() {
        let timeouts = DaemonTimeouts::default();
        assert_eq!(timeouts.run_reply(), Duration::from_secs(120));
        assert_eq!(timeouts.listen_reply(), Duration::from_secs(960));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let timeouts = DaemonTimeouts::load_from(&dir.path().join("config.toml"));
        assert_eq!(timeouts, DaemonTimeouts::default());
    }

    #[test]
    fn test_raised_daemon_timeouts_extend_run_reply() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [compiler]
            model = "gpt-4o"

            [timeouts]
            compile_timeout_seconds = 180
            script_timeout_seconds = 90
            "#
        )
        .unwrap();

        let timeouts = DaemonTimeouts::load_from(file.path());
        assert_eq!(timeouts.model_download_timeout_seconds, 300);
        assert_eq!(timeouts.run_reply(), Duration::from_secs(300));
    }

    #[test]
    fn test_unparseable_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts\ncompile_timeout_seconds = 1").unwrap();

        let timeouts = DaemonTimeouts::load_from(file.path());
        assert_eq!(timeouts, DaemonTimeouts::default());
    }
}
