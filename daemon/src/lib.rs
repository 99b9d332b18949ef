pub mod audio;
pub mod capture;
pub mod compiler;
pub mod config;
pub mod extract;
pub mod monitor;
pub mod orchestrator;
pub mod runner;
pub mod server;
pub mod speech;
pub mod state;

pub use capture::{CaptureHandle, UtteranceCapturer, UtteranceTracker};
pub use compiler::{CodeGenerator, CompileError, OpenAiClient};
pub use extract::extract_snippet;
pub use monitor::{ForegroundApp, ForegroundMonitor};
pub use orchestrator::{Orchestrator, PipelineError};
pub use runner::ScriptRunner;
pub use server::DaemonServer;
pub use state::DaemonState;
