pub mod model;
pub mod recognizer;
pub mod source;

use std::future::Future;
use std::sync::OnceLock;
use tokio::sync::mpsc;

pub use model::{ensure_model, SpeechModel};
pub use recognizer::{StepBuffer, StepSignal, WhisperRecognizer};
pub use source::MicrophoneSource;

/// What the recognition engine reports while an utterance is being spoken.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// Best transcript so far. Replaces any earlier partial.
    Partial(String),
    /// The engine has finished with this utterance.
    Final(String),
    Error(String),
}

impl RecognitionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecognitionEvent::Partial(_))
    }
}

/// Something that turns speech into a stream of recognition events.
pub trait SpeechSource: Send {
    /// Start a new recognition session.
    fn start(&mut self) -> anyhow::Result<mpsc::UnboundedReceiver<RecognitionEvent>>;

    /// Stop audio and end the recognition session. Completes once nothing
    /// from the session can produce further events.
    fn stop(&mut self) -> impl Future<Output = ()> + Send;
}

fn non_speech_markers() -> &'static regex::Regex {
    static MARKERS: OnceLock<regex::Regex> = OnceLock::new();
    MARKERS.get_or_init(|| {
        regex::Regex::new(r"\[.*?\]|\{.*?\}|\(.*?\)").expect("marker pattern is valid")
    })
}

/// Drop bracketed non-speech markers such as `[BLANK_AUDIO]` and collapse
/// immediately repeated words.
pub fn post_process_transcription(text: &str) -> String {
    let stripped = non_speech_markers().replace_all(text, " ");

    let mut words: Vec<&str> = Vec::new();
    for word in stripped.split_whitespace() {
        if words.last() != Some(&word) {
            words.push(word);
        }
    }
    let cleaned = words.join(" ");

    tracing::debug!("Post-processed: '{}' -> '{}'", text.trim(), cleaned);
    cleaned
}
