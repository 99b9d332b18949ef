use serde::{Deserialize, Serialize};

/// Result of handing a generated script to the interpreter.
///
/// A script that exits zero but writes to stderr is kept apart from a clean
/// run, and both are kept apart from a non-zero exit, so callers do not have
/// to parse the captured text to tell them apart.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ScriptOutcome {
    /// The interpreter process could not be started.
    LaunchFailed { reason: String },
    /// The script was killed after running past its deadline.
    TimedOut { after_secs: u64 },
    /// Non-zero exit. `code` is `None` when the process died from a signal.
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    CompletedWithStderr { stdout: String, stderr: String },
    Completed { stdout: String },
}

impl ScriptOutcome {
    /// Classify captured output by exit status. Both streams are trimmed of
    /// surrounding newlines.
    pub fn from_exit(code: Option<i32>, success: bool, stdout: &str, stderr: &str) -> Self {
        let stdout = trim_newlines(stdout).to_string();
        let stderr = trim_newlines(stderr).to_string();

        if !success {
            ScriptOutcome::Failed {
                code,
                stdout,
                stderr,
            }
        } else if stderr.is_empty() {
            ScriptOutcome::Completed { stdout }
        } else {
            ScriptOutcome::CompletedWithStderr { stdout, stderr }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ScriptOutcome::Completed { .. } | ScriptOutcome::CompletedWithStderr { .. }
        )
    }

    /// Text shown to the user: stderr, a newline, then stdout.
    pub fn display(&self) -> String {
        match self {
            ScriptOutcome::LaunchFailed { reason } => {
                format!("failed to start script interpreter: {}", reason)
            }
            ScriptOutcome::TimedOut { after_secs } => {
                format!("script timed out after {}s", after_secs)
            }
            ScriptOutcome::Failed { stdout, stderr, .. }
            | ScriptOutcome::CompletedWithStderr { stdout, stderr } => {
                format!("{}\n{}", stderr, stdout)
            }
            ScriptOutcome::Completed { stdout } => format!("\n{}", stdout),
        }
    }
}

fn trim_newlines(text: &str) -> &str {
    text.trim_matches(|c| c == '\n' || c == '\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_exit_clean_run() {
        let outcome = ScriptOutcome::from_exit(Some(0), true, "done\n", "");
        assert_eq!(
            outcome,
            ScriptOutcome::Completed {
                stdout: "done".to_string()
            }
        );
        assert!(outcome.is_success());
    }

    #[test]
    fn test_from_exit_success_with_stderr() {
        let outcome = ScriptOutcome::from_exit(Some(0), true, "", "\nwarning: deprecated\n");
        assert_eq!(
            outcome,
            ScriptOutcome::CompletedWithStderr {
                stdout: String::new(),
                stderr: "warning: deprecated".to_string()
            }
        );
        assert!(outcome.is_success());
    }

    #[test]
    fn test_from_exit_non_zero() {
        let outcome = ScriptOutcome::from_exit(Some(1), false, "", "execution error: -1728\n");
        assert!(matches!(outcome, ScriptOutcome::Failed { code: Some(1), .. }));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_trim_keeps_inner_whitespace() {
        let outcome = ScriptOutcome::from_exit(Some(0), true, "\n  a\nb  \n\n", "");
        assert_eq!(
            outcome,
            ScriptOutcome::Completed {
                stdout: "  a\nb  ".to_string()
            }
        );
    }

    #[test]
    fn test_display_is_stderr_then_stdout() {
        let outcome = ScriptOutcome::Failed {
            code: Some(1),
            stdout: "partial".to_string(),
            stderr: "boom".to_string(),
        };
        assert_eq!(outcome.display(), "boom\npartial");
    }

    #[test]
    fn test_display_clean_run_has_empty_stderr_line() {
        let outcome = ScriptOutcome::Completed {
            stdout: "ok".to_string(),
        };
        assert_eq!(outcome.display(), "\nok");
    }

    #[test]
    fn test_display_launch_failure() {
        let outcome = ScriptOutcome::LaunchFailed {
            reason: "No such file or directory".to_string(),
        };
        assert!(outcome.display().contains("No such file"));
    }
}
