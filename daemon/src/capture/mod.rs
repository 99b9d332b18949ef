pub mod session;
pub mod tracker;

pub use session::{CaptureHandle, LiveTranscript, UtteranceCapturer};
pub use tracker::{CaptureState, UtteranceTracker};
