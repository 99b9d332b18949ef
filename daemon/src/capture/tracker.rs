use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureState {
    Idle,
    Listening,
    Finalizing,
}

/// State of one utterance: Idle → Listening → Finalizing → Idle.
///
/// Both the quiet timer and a terminal recognition event try to end the
/// utterance; only the first one out of `Listening` gets the text back.
#[derive(Debug)]
pub struct UtteranceTracker {
    state: CaptureState,
    utterance: String,
    last_update: Option<Instant>,
    quiet_threshold: Duration,
}

impl UtteranceTracker {
    pub fn new(quiet_threshold: Duration) -> Self {
        Self {
            state: CaptureState::Idle,
            utterance: String::new(),
            last_update: None,
            quiet_threshold,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn utterance(&self) -> &str {
        &self.utterance
    }

    /// Start listening with an empty utterance.
    pub fn begin(&mut self) {
        self.utterance.clear();
        self.last_update = None;
        self.state = CaptureState::Listening;
        debug!("State transition: Idle → Listening");
    }

    /// Replace the utterance with the latest partial transcript. Returns false
    /// when not listening.
    pub fn on_partial(&mut self, text: String, now: Instant) -> bool {
        if self.state != CaptureState::Listening {
            return false;
        }
        self.utterance = text;
        self.last_update = Some(now);
        true
    }

    /// Quiet-timer check. The timer only runs once something has been heard.
    pub fn quiet_elapsed(&self, now: Instant) -> bool {
        self.last_update
            .map(|t| now.saturating_duration_since(t) >= self.quiet_threshold)
            .unwrap_or(false)
    }

    /// Finalize if the quiet period has passed.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        if self.state == CaptureState::Listening && self.quiet_elapsed(now) {
            info!("Quiet for {:?}, finalizing utterance", self.quiet_threshold);
            self.finalize()
        } else {
            None
        }
    }

    /// Leave `Listening`. The first call returns the utterance (possibly
    /// empty); later calls return `None` until the next `begin`.
    pub fn finalize(&mut self) -> Option<String> {
        if self.state != CaptureState::Listening {
            return None;
        }
        self.state = CaptureState::Finalizing;
        debug!("State transition: Listening → Finalizing");
        Some(std::mem::take(&mut self.utterance))
    }

    /// Back to `Idle` after the finalized utterance has been dispatched.
    pub fn rearm(&mut self) {
        self.utterance.clear();
        self.last_update = None;
        self.state = CaptureState::Idle;
        debug!("State transition: Finalizing → Idle");
    }
}
