//! Runs generated AppleScript through the system interpreter.

use shared::ScriptOutcome;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;

/// Prefix the snippet with an instruction bringing `app` to the front.
pub fn build_program(snippet: &str, app: Option<&str>) -> String {
    match app {
        Some(app) => format!("tell application \"{}\" to activate\n\n{}", app, snippet),
        None => snippet.to_string(),
    }
}

/// Quote `text` as one single-quoted shell word.
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

pub struct ScriptRunner {
    config: RunnerConfig,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(config: RunnerConfig, timeout_secs: u64) -> Self {
        Self {
            config,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Shell command line handed to `<shell> -c`.
    pub fn command_line(&self, program: &str) -> String {
        format!(
            "{} {} {}",
            self.config.interpreter,
            self.config.inline_flag,
            shell_quote(program)
        )
    }

    pub async fn run(&self, program: &str) -> ScriptOutcome {
        let command_line = self.command_line(program);
        debug!("Running: {} -c {}", self.config.shell, command_line);

        let child = Command::new(&self.config.shell)
            .arg("-c")
            .arg(&command_line)
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Could not start {}: {}", self.config.shell, e);
                return ScriptOutcome::LaunchFailed {
                    reason: e.to_string(),
                };
            }
            Err(_) => {
                warn!("Script timed out after {:?}", self.timeout);
                return ScriptOutcome::TimedOut {
                    after_secs: self.timeout.as_secs(),
                };
            }
        };

        let outcome = ScriptOutcome::from_exit(
            output.status.code(),
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        );
        info!(
            "Script finished with {:?} (success: {})",
            output.status.code(),
            outcome.is_success()
        );
        outcome
    }
}
