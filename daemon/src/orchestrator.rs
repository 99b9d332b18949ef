use shared::CycleReport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compiler::{build_prompt, CodeGenerator, CompileError};
use crate::extract::extract_snippet;
use crate::monitor::ForegroundApp;
use crate::runner::{build_program, ScriptRunner};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Another command is still running")]
    Busy,

    #[error("Nothing to do: the command is empty")]
    EmptyUtterance,

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Clears the running flag however the cycle ends.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One command cycle: prompt, generate, extract, run.
pub struct Orchestrator<G> {
    generator: G,
    runner: ScriptRunner,
    foreground: ForegroundApp,
    running: Arc<AtomicBool>,
}

impl<G: CodeGenerator> Orchestrator<G> {
    pub fn new(generator: G, runner: ScriptRunner, foreground: ForegroundApp) -> Self {
        Self {
            generator,
            runner,
            foreground,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one command. A second command while one is in flight is rejected
    /// with [`PipelineError::Busy`].
    pub async fn execute(&self, utterance: &str) -> Result<CycleReport, PipelineError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(PipelineError::EmptyUtterance);
        }

        let _in_flight = InFlight::claim(&self.running).ok_or_else(|| {
            warn!("Rejecting '{}': another command is running", utterance);
            PipelineError::Busy
        })?;

        let foreground_app = self.foreground.get().await;
        let prompt = build_prompt(utterance, foreground_app.as_deref());
        debug!("Prompt: {}", prompt);

        let reply = self.generator.generate(&prompt).await.map_err(|e| {
            warn!("Code generation failed: {}", e);
            e
        })?;
        debug!("Model reply: {}", reply);

        let snippet = extract_snippet(&reply).to_string();
        let program = build_program(&snippet, foreground_app.as_deref());
        debug!("Program:\n{}", program);

        info!("Executing AppleScript for '{}'", utterance);
        let outcome = self.runner.run(&program).await;

        Ok(CycleReport {
            utterance: utterance.to_string(),
            foreground_app,
            snippet,
            program,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerConfig;
    use std::sync::Mutex;
    use std::time::Duration;

    struct CannedGenerator {
        reply: Result<String, fn() -> CompileError>,
        delay: Duration,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(make: fn() -> CompileError) -> Self {
            Self {
                reply: Err(make),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl CodeGenerator for CannedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, CompileError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    /// Echoes the program back instead of running it.
    fn echo_runner() -> ScriptRunner {
        ScriptRunner::new(
            RunnerConfig {
                shell: "/bin/sh".to_string(),
                interpreter: "printf".to_string(),
                inline_flag: "%s".to_string(),
            },
            5,
        )
    }

    #[tokio::test]
    async fn test_cycle_without_known_app() {
        let orchestrator = Orchestrator::new(
            CannedGenerator::replying("```applescript\nbeep\n```"),
            echo_runner(),
            ForegroundApp::new(),
        );

        let report = orchestrator.execute("make a sound").await.unwrap();
        assert_eq!(report.foreground_app, None);
        assert_eq!(report.snippet, "beep");
        assert_eq!(report.program, "beep");
        assert_eq!(
            report.outcome,
            shared::ScriptOutcome::Completed {
                stdout: "beep".to_string()
            }
        );

        let prompts = orchestrator.generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("The frontmost app is Unknown."));
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_blank_utterance_rejected() {
        let orchestrator = Orchestrator::new(
            CannedGenerator::replying("beep"),
            echo_runner(),
            ForegroundApp::new(),
        );
        let result = orchestrator.execute("   ").await;
        assert!(matches!(result, Err(PipelineError::EmptyUtterance)));
        assert!(orchestrator.generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compile_failure_clears_running_flag() {
        let orchestrator = Orchestrator::new(
            CannedGenerator::failing(|| CompileError::EmptyResponse),
            echo_runner(),
            ForegroundApp::new(),
        );
        let result = orchestrator.execute("do something").await;
        assert!(matches!(
            result,
            Err(PipelineError::Compile(CompileError::EmptyResponse))
        ));
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_overlapping_command_is_busy() {
        let mut generator = CannedGenerator::replying("beep");
        generator.delay = Duration::from_millis(300);
        let orchestrator = Arc::new(Orchestrator::new(
            generator,
            echo_runner(),
            ForegroundApp::new(),
        ));

        let first = tokio::spawn({
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.execute("first").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(orchestrator.is_running());

        let second = orchestrator.execute("second").await;
        assert!(matches!(second, Err(PipelineError::Busy)));

        assert!(first.await.unwrap().is_ok());
        assert!(!orchestrator.is_running());
        assert!(orchestrator.execute("third").await.is_ok());
    }
}
