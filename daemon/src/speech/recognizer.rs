use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperState};

use super::{post_process_transcription, RecognitionEvent, SpeechModel};
use crate::audio::SAMPLE_RATE;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepSignal {
    /// Not enough new audio for another pass.
    Wait,
    /// Enough new audio arrived; transcribe again.
    Step,
    /// The utterance reached its length limit.
    Full,
}

/// Audio of the utterance so far, with a counter of samples added since the
/// last transcription pass.
#[derive(Debug)]
pub struct StepBuffer {
    samples: Vec<f32>,
    step_samples: usize,
    max_samples: usize,
    since_step: usize,
}

impl StepBuffer {
    pub fn new(step_ms: u32, max_utterance_ms: u32, sample_rate: u32) -> Self {
        let step_samples = (step_ms as usize * sample_rate as usize) / 1000;
        let max_samples = (max_utterance_ms as usize * sample_rate as usize) / 1000;

        Self {
            samples: Vec::with_capacity(max_samples),
            step_samples: step_samples.max(1),
            max_samples,
            since_step: 0,
        }
    }

    pub fn push(&mut self, chunk: &[f32]) -> StepSignal {
        let room = self.max_samples.saturating_sub(self.samples.len());
        let taken = chunk.len().min(room);
        self.samples.extend_from_slice(&chunk[..taken]);
        self.since_step += taken;

        if self.samples.len() >= self.max_samples {
            StepSignal::Full
        } else if self.since_step >= self.step_samples {
            self.since_step = 0;
            StepSignal::Step
        } else {
            StepSignal::Wait
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn has_unprocessed(&self) -> bool {
        self.since_step > 0
    }
}

/// Re-transcribes the growing utterance buffer and reports each changed
/// transcript as a partial result.
pub struct WhisperRecognizer {
    state: WhisperState,
    language: String,
    buffer: StepBuffer,
    last_text: String,
}

impl WhisperRecognizer {
    pub fn new(
        model: &SpeechModel,
        language: String,
        step_ms: u32,
        max_utterance_ms: u32,
    ) -> Result<Self> {
        Ok(Self {
            state: model.create_state()?,
            language,
            buffer: StepBuffer::new(step_ms, max_utterance_ms, SAMPLE_RATE),
            last_text: String::new(),
        })
    }

    /// Blocking loop; run it on a blocking thread. Ends after the first
    /// terminal event, or when nobody is listening for events any more.
    pub fn run(
        mut self,
        mut audio_rx: broadcast::Receiver<Vec<f32>>,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) {
        debug!("Recognizer started");
        loop {
            if events.is_closed() {
                debug!("Event receiver gone, recognizer exiting");
                return;
            }

            let event = match audio_rx.blocking_recv() {
                Ok(chunk) => match self.buffer.push(&chunk) {
                    StepSignal::Wait => continue,
                    StepSignal::Step => match self.transcribe() {
                        Ok(text) if text != self.last_text => {
                            self.last_text = text.clone();
                            RecognitionEvent::Partial(text)
                        }
                        Ok(_) => continue,
                        Err(e) => RecognitionEvent::Error(e.to_string()),
                    },
                    StepSignal::Full => {
                        info!("Utterance reached its length limit");
                        self.finish()
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Recognizer lagged, dropped {} audio chunks", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    if events.is_closed() {
                        return;
                    }
                    self.finish()
                }
            };

            let terminal = event.is_terminal();
            if events.send(event).is_err() || terminal {
                debug!("Recognizer finished");
                return;
            }
        }
    }

    fn finish(&mut self) -> RecognitionEvent {
        if !self.buffer.has_unprocessed() {
            return RecognitionEvent::Final(self.last_text.clone());
        }
        match self.transcribe() {
            Ok(text) => RecognitionEvent::Final(text),
            Err(e) => RecognitionEvent::Error(e.to_string()),
        }
    }

    fn transcribe(&mut self) -> Result<String> {
        debug!("Transcribing {} samples", self.buffer.samples().len());

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(Some(&self.language));
        params.set_single_segment(true);

        self.state
            .full(params, self.buffer.samples())
            .map_err(|e| anyhow::anyhow!("Transcription failed: {}", e))?;

        let mut transcription = String::new();
        for i in 0..self.state.full_n_segments() {
            if let Some(segment) = self.state.get_segment(i) {
                if let Ok(text) = segment.to_str() {
                    transcription.push_str(text);
                    transcription.push(' ');
                }
            }
        }

        Ok(post_process_transcription(&transcription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_buffer_sizes() {
        let buffer = StepBuffer::new(1000, 30000, 16000);
        assert_eq!(buffer.step_samples, 16000);
        assert_eq!(buffer.max_samples, 480000);
    }

    #[test]
    fn test_step_signalled_after_step_of_audio() {
        let mut buffer = StepBuffer::new(100, 1000, 16000);
        assert_eq!(buffer.push(&[0.0; 1000]), StepSignal::Wait);
        assert_eq!(buffer.push(&[0.0; 600]), StepSignal::Step);
        assert!(!buffer.has_unprocessed());
        assert_eq!(buffer.push(&[0.0; 10]), StepSignal::Wait);
        assert!(buffer.has_unprocessed());
        assert_eq!(buffer.samples().len(), 1610);
    }

    #[test]
    fn test_full_buffer_is_capped() {
        let mut buffer = StepBuffer::new(100, 500, 16000);
        assert_eq!(buffer.push(&[0.0; 7000]), StepSignal::Step);
        assert_eq!(buffer.push(&[0.0; 7000]), StepSignal::Full);
        assert_eq!(buffer.samples().len(), 8000);
    }
}
