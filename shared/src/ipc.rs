use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::outcome::ScriptOutcome;

const SOCKET_NAME: &str = "osgptd.sock";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Command {
    Listen,
    StopListening,
    Run(String),
    Status,
    LastResult,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Busy,
    Error(String),
    Status(StatusInfo),
    Cycle(CycleReport),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusInfo {
    pub is_listening: bool,
    /// Advisory: a command cycle is between prompt construction and script completion.
    pub is_running: bool,
    pub foreground_app: Option<String>,
    pub partial_utterance: String,
}

/// Everything one command cycle produced, from utterance to script output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub utterance: String,
    pub foreground_app: Option<String>,
    pub snippet: String,
    pub program: String,
    pub outcome: ScriptOutcome,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused: is osgptd running?")]
    ConnectionRefused,

    #[error("Connection timeout")]
    Timeout,
}

/// Socket the daemon listens on. Uses the XDG runtime directory when there is
/// one, `/tmp` otherwise.
pub fn default_socket_path() -> PathBuf {
    match dirs::runtime_dir() {
        Some(runtime_dir) => runtime_dir.join(SOCKET_NAME),
        None => PathBuf::from("/tmp").join(SOCKET_NAME),
    }
}

/// `config.toml` shared by the daemon and the CLI.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("osgpt").join("config.toml"))
}

/// Encode a message as a single JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>, IpcError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, IpcError> {
    Ok(serde_json::from_str(line.trim_end())?)
}
