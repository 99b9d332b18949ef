use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{RecognitionEvent, SpeechModel, SpeechSource, WhisperRecognizer};
use crate::audio::AudioCapture;
use crate::config::Config;

/// Default microphone feeding a whisper recognizer.
pub struct MicrophoneSource {
    model: SpeechModel,
    language: String,
    gain: f32,
    broadcast_capacity: usize,
    step_ms: u32,
    max_utterance_ms: u32,
    capture: Option<AudioCapture>,
    recognizer: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    pub fn new(model: SpeechModel, config: &Config) -> Self {
        Self {
            model,
            language: config.speech.language.clone(),
            gain: config.audio.gain,
            broadcast_capacity: config.audio.broadcast_capacity,
            step_ms: config.capture.step_ms,
            max_utterance_ms: config.capture.max_utterance_ms,
            capture: None,
            recognizer: None,
        }
    }
}

impl SpeechSource for MicrophoneSource {
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>> {
        if self.capture.is_some() {
            return Err(anyhow::anyhow!("Speech source already started"));
        }

        let recognizer = WhisperRecognizer::new(
            &self.model,
            self.language.clone(),
            self.step_ms,
            self.max_utterance_ms,
        )?;

        let (audio_tx, audio_rx) = broadcast::channel(self.broadcast_capacity);
        let mut capture = AudioCapture::new(self.gain)?;
        capture.start(audio_tx)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = tokio::task::spawn_blocking(move || recognizer.run(audio_rx, events_tx));

        self.capture = Some(capture);
        self.recognizer = Some(handle);
        Ok(events_rx)
    }

    async fn stop(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(handle) = self.recognizer.take() {
            if let Err(e) = handle.await {
                error!("Recognizer thread failed: {}", e);
            }
            debug!("Recognition session ended");
        }
    }
}
