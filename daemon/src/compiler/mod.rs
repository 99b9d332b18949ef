pub mod openai;
pub mod prompt;

use std::future::Future;
use thiserror::Error;

pub use openai::OpenAiClient;
pub use prompt::{build_prompt, UNKNOWN_APP};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("No API key: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Code generation endpoint returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Code generation returned no choices")]
    EmptyResponse,

    #[error("Code generation timed out after {0}s")]
    Timeout(u64),
}

/// Turns a prompt into free-text model output.
pub trait CodeGenerator: Send + Sync + 'static {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, CompileError>> + Send;
}
