pub mod ipc;
pub mod outcome;

pub use ipc::{config_path, default_socket_path, Command, CycleReport, IpcError, Response, StatusInfo};
pub use outcome::ScriptOutcome;
