use shared::ipc::{decode_line, encode_line};
use shared::{Command, Response};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use crate::compiler::CodeGenerator;
use crate::orchestrator::PipelineError;
use crate::state::DaemonState;

pub struct DaemonServer<G> {
    socket_path: PathBuf,
    state: Arc<DaemonState<G>>,
}

impl<G: CodeGenerator> DaemonServer<G> {
    pub fn new(socket_path: PathBuf, state: Arc<DaemonState<G>>) -> Self {
        Self { socket_path, state }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        info!("Starting socket server at {}", self.socket_path.display());
        let listener = UnixListener::bind(&self.socket_path)?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("Connection accepted");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(state, stream).await {
                            error!("Error handling connection: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(state: Arc<DaemonState<G>>, stream: UnixStream) -> anyhow::Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let response = match decode_line::<Command>(&line) {
            Ok(command) => {
                info!("Received command: {:?}", command);
                Self::dispatch(&state, command).await
            }
            Err(e) => Response::Error(format!("Invalid command: {}", e)),
        };

        write_half.write_all(&encode_line(&response)?).await?;
        write_half.flush().await?;
        debug!("Sent response: {:?}", response);
        Ok(())
    }

    async fn dispatch(state: &DaemonState<G>, command: Command) -> Response {
        match command {
            Command::Listen => match state.start_listening().await {
                Ok(()) => Response::Ok,
                Err(e) => {
                    error!("Failed to start speech capture: {:#}", e);
                    Response::Error(format!("Failed to start listening: {:#}", e))
                }
            },
            Command::StopListening => {
                state.stop_listening().await;
                Response::Ok
            }
            Command::Run(utterance) => match state.run_command(&utterance).await {
                Ok(report) => Response::Cycle(report),
                Err(PipelineError::Busy) => Response::Busy,
                Err(e) => Response::Error(e.to_string()),
            },
            Command::Status => Response::Status(state.get_status().await),
            Command::LastResult => match state.last_report().await {
                Some(report) => Response::Cycle(report),
                None => Response::Error("No command has run yet".to_string()),
            },
        }
    }
}

impl<G> Drop for DaemonServer<G> {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}
