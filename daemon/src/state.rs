use shared::{CycleReport, StatusInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::{CaptureHandle, LiveTranscript, UtteranceCapturer};
use crate::compiler::{CodeGenerator, OpenAiClient};
use crate::config::Config;
use crate::monitor::ForegroundApp;
use crate::orchestrator::{Orchestrator, PipelineError};
use crate::speech::{ensure_model, MicrophoneSource, SpeechModel};

const UTTERANCE_QUEUE: usize = 8;

pub struct DaemonState<G = OpenAiClient> {
    pub config: Config,
    foreground: ForegroundApp,
    orchestrator: Arc<Orchestrator<G>>,
    capture: Mutex<Option<CaptureHandle>>,
    live: LiveTranscript,
    last_report: Arc<Mutex<Option<CycleReport>>>,
    utterance_tx: mpsc::Sender<String>,
    speech_model: OnceCell<SpeechModel>,
    dispatcher: JoinHandle<()>,
}

impl<G: CodeGenerator> DaemonState<G> {
    /// Must be called inside a tokio runtime: spawns the utterance dispatcher.
    pub fn new(config: Config, foreground: ForegroundApp, orchestrator: Orchestrator<G>) -> Self {
        let orchestrator = Arc::new(orchestrator);
        let last_report = Arc::new(Mutex::new(None));
        let (utterance_tx, utterance_rx) = mpsc::channel(UTTERANCE_QUEUE);
        let dispatcher = spawn_dispatcher(
            Arc::clone(&orchestrator),
            Arc::clone(&last_report),
            utterance_rx,
        );

        Self {
            config,
            foreground,
            orchestrator,
            capture: Mutex::new(None),
            live: Arc::new(Mutex::new(String::new())),
            last_report,
            utterance_tx,
            speech_model: OnceCell::new(),
            dispatcher,
        }
    }

    pub async fn get_status(&self) -> StatusInfo {
        let is_listening = self
            .capture
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false);

        StatusInfo {
            is_listening,
            is_running: self.orchestrator.is_running(),
            foreground_app: self.foreground.get().await,
            partial_utterance: self.live.lock().await.clone(),
        }
    }

    /// Run a typed command through the pipeline.
    pub async fn run_command(&self, utterance: &str) -> Result<CycleReport, PipelineError> {
        let report = self.orchestrator.execute(utterance).await?;
        *self.last_report.lock().await = Some(report.clone());
        Ok(report)
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.lock().await.clone()
    }

    /// Start capturing spoken commands, replacing any capture already running.
    ///
    /// The speech model is provisioned before the capture lock is taken, so
    /// status and stop requests are answered while a first-run download runs.
    pub async fn start_listening(&self) -> anyhow::Result<()> {
        let model = self.speech_model().await?;

        let mut capture = self.capture.lock().await;
        if let Some(previous) = capture.take() {
            info!("Restarting speech capture");
            previous.stop().await;
        }

        let capturer = UtteranceCapturer::new(
            MicrophoneSource::new(model, &self.config),
            self.config.capture.quiet_threshold(),
            self.config.capture.sample_interval(),
            self.utterance_tx.clone(),
            Arc::clone(&self.live),
        );
        *capture = Some(capturer.spawn());
        info!("Speech capture activated");
        Ok(())
    }

    async fn speech_model(&self) -> anyhow::Result<SpeechModel> {
        let model = self
            .speech_model
            .get_or_try_init(|| async {
                let path = ensure_model(
                    &self.config.speech,
                    Duration::from_secs(self.config.timeouts.model_download_timeout_seconds),
                )
                .await?;
                tokio::task::spawn_blocking(move || SpeechModel::load(&path)).await?
            })
            .await?;
        Ok(model.clone())
    }

    pub async fn stop_listening(&self) {
        if let Some(handle) = self.capture.lock().await.take() {
            handle.stop().await;
            info!("Speech capture deactivated");
        }
    }
}

impl<G> Drop for DaemonState<G> {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

/// Runs each finished utterance on its own task so capture keeps going.
fn spawn_dispatcher<G: CodeGenerator>(
    orchestrator: Arc<Orchestrator<G>>,
    last_report: Arc<Mutex<Option<CycleReport>>>,
    mut utterances: mpsc::Receiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(utterance) = utterances.recv().await {
            let orchestrator = Arc::clone(&orchestrator);
            let last_report = Arc::clone(&last_report);
            tokio::spawn(async move {
                match orchestrator.execute(&utterance).await {
                    Ok(report) => {
                        info!("Result of '{}':\n{}", utterance, report.outcome.display());
                        *last_report.lock().await = Some(report);
                    }
                    Err(e) => warn!("Command '{}' was not run: {}", utterance, e),
                }
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileError;
    use crate::runner::ScriptRunner;

    struct Fixed(&'static str);

    impl CodeGenerator for Fixed {
        async fn generate(&self, _prompt: &str) -> Result<String, CompileError> {
            Ok(self.0.to_string())
        }
    }

    fn state(reply: &'static str) -> DaemonState<Fixed> {
        let mut config = Config::default();
        config.runner.shell = "/bin/sh".to_string();
        config.runner.interpreter = "printf".to_string();
        config.runner.inline_flag = "%s".to_string();

        let foreground = ForegroundApp::with_name("Finder");
        let orchestrator = Orchestrator::new(
            Fixed(reply),
            ScriptRunner::new(config.runner.clone(), 5),
            foreground.clone(),
        );
        DaemonState::new(config, foreground, orchestrator)
    }

    #[tokio::test]
    async fn test_initial_status() {
        let state = state("beep");
        let status = state.get_status().await;
        assert!(!status.is_listening);
        assert!(!status.is_running);
        assert_eq!(status.foreground_app, Some("Finder".to_string()));
        assert_eq!(status.partial_utterance, "");
        assert!(state.last_report().await.is_none());
    }

    #[tokio::test]
    async fn test_run_command_records_last_report() {
        let state = state("```applescript\nempty trash\n```");
        let report = state.run_command("empty the trash").await.unwrap();
        assert_eq!(report.snippet, "empty trash");
        assert_eq!(state.last_report().await, Some(report));
    }

    #[tokio::test]
    async fn test_spoken_utterance_is_dispatched() {
        let state = state("beep");
        state.utterance_tx.send("make a sound".to_string()).await.unwrap();

        for _ in 0..50 {
            if state.last_report().await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let report = state.last_report().await.unwrap();
        assert_eq!(report.utterance, "make a sound");
        assert!(report.program.starts_with("tell application \"Finder\" to activate"));
    }

    #[tokio::test]
    async fn test_status_answers_while_model_downloads() {
        // Accepts the download request and never answers it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stalled = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let dir = tempfile::tempdir().unwrap();
        let mut state = state("beep");
        state.config.speech.model_path =
            Some(dir.path().join("ggml-test.bin").to_string_lossy().into_owned());
        state.config.speech.model_url = format!("http://{}/ggml-test.bin", addr);
        let state = Arc::new(state);

        let listening = tokio::spawn({
            let state = Arc::clone(&state);
            async move { state.start_listening().await }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!listening.is_finished());

        let status = tokio::time::timeout(Duration::from_secs(1), state.get_status())
            .await
            .expect("status blocked behind the model download");
        assert!(!status.is_listening);

        tokio::time::timeout(Duration::from_secs(1), state.stop_listening())
            .await
            .expect("stop blocked behind the model download");

        listening.abort();
        stalled.abort();
    }

    #[tokio::test]
    async fn test_stop_listening_when_idle_is_a_no_op() {
        let state = state("beep");
        state.stop_listening().await;
        assert!(!state.get_status().await.is_listening);
    }
}
