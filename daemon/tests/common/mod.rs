// Common fixtures for osgptd integration tests
//
// - ScriptedSource: a speech source replaying timed recognition events
// - CannedGenerator: a code generator with a fixed reply
// - echo_runner: a script runner that prints the program instead of running it

#![allow(dead_code)]

use osgptd::compiler::{CodeGenerator, CompileError};
use osgptd::config::RunnerConfig;
use osgptd::speech::{RecognitionEvent, SpeechSource};
use osgptd::ScriptRunner;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One recognition session: each event is sent after its delay, measured
/// from the previous event.
pub type Script = Vec<(Duration, RecognitionEvent)>;

pub fn partial(after_ms: u64, text: &str) -> (Duration, RecognitionEvent) {
    (
        Duration::from_millis(after_ms),
        RecognitionEvent::Partial(text.to_string()),
    )
}

pub fn final_result(after_ms: u64, text: &str) -> (Duration, RecognitionEvent) {
    (
        Duration::from_millis(after_ms),
        RecognitionEvent::Final(text.to_string()),
    )
}

pub fn engine_error(after_ms: u64, message: &str) -> (Duration, RecognitionEvent) {
    (
        Duration::from_millis(after_ms),
        RecognitionEvent::Error(message.to_string()),
    )
}

#[derive(Clone, Default)]
pub struct SourceProbe {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl SourceProbe {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Replays one script per session. Once the scripts run out, `start` fails
/// the way an unavailable microphone would. The event channel stays open
/// after the script ends, like a live microphone with nobody talking.
pub struct ScriptedSource {
    sessions: VecDeque<Script>,
    feeder: Option<JoinHandle<()>>,
    probe: SourceProbe,
}

impl ScriptedSource {
    pub fn new(sessions: Vec<Script>) -> (Self, SourceProbe) {
        let probe = SourceProbe::default();
        let source = Self {
            sessions: sessions.into(),
            feeder: None,
            probe: probe.clone(),
        };
        (source, probe)
    }
}

impl SpeechSource for ScriptedSource {
    fn start(&mut self) -> anyhow::Result<mpsc::UnboundedReceiver<RecognitionEvent>> {
        if self.feeder.is_some() {
            anyhow::bail!("previous session was not stopped");
        }
        let script = self
            .sessions
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("microphone unavailable"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.feeder = Some(tokio::spawn(async move {
            for (delay, event) in script {
                tokio::time::sleep(delay).await;
                if tx.send(event).is_err() {
                    return;
                }
            }
            std::future::pending::<()>().await;
        }));
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            let _ = feeder.await;
            self.probe.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct CannedGenerator {
    reply: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl CannedGenerator {
    pub fn new(reply: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let generator = Self {
            reply: reply.to_string(),
            prompts: Arc::clone(&prompts),
        };
        (generator, prompts)
    }
}

impl CodeGenerator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, CompileError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Runs `printf %s <program>` so the report's stdout is the program itself.
pub fn echo_runner() -> ScriptRunner {
    ScriptRunner::new(echo_runner_config(), 5)
}

pub fn echo_runner_config() -> RunnerConfig {
    RunnerConfig {
        shell: "/bin/sh".to_string(),
        interpreter: "printf".to_string(),
        inline_flag: "%s".to_string(),
    }
}
