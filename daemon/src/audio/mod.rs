pub mod capture;

pub use capture::{AudioCapture, SAMPLE_RATE};
