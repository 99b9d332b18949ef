use shared::ipc::{decode_line, encode_line, Command, IpcError, Response};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::timeouts::DaemonTimeouts;

/// Timeout for connecting, writing, and control-command replies.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DaemonClient {
    socket_path: PathBuf,
    socket_timeout: Duration,
    run_timeout: Duration,
    listen_timeout: Duration,
}

impl DaemonClient {
    pub fn new(timeouts: &DaemonTimeouts) -> Self {
        Self {
            socket_path: shared::default_socket_path(),
            socket_timeout: SOCKET_TIMEOUT,
            run_timeout: timeouts.run_reply(),
            listen_timeout: timeouts.listen_reply(),
        }
    }

    /// `run` waits for generation and the script, `listen` may wait for a
    /// first-run model download; everything else answers right away.
    fn reply_timeout(&self, cmd: &Command) -> Duration {
        match cmd {
            Command::Run(_) => self.run_timeout,
            Command::Listen => self.listen_timeout,
            _ => self.socket_timeout,
        }
    }

    pub async fn send_command(&self, cmd: Command) -> Result<Response, IpcError> {
        let stream = match timeout(self.socket_timeout, UnixStream::connect(&self.socket_path)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IpcError::ConnectionRefused);
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(IpcError::ConnectionRefused);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(
                    "Connection timeout: failed to connect to daemon at {} within {:?}",
                    self.socket_path.display(),
                    self.socket_timeout
                );
                return Err(IpcError::Timeout);
            }
        };
        let (read_half, mut write_half) = stream.into_split();

        let request = encode_line(&cmd)?;
        if timeout(self.socket_timeout, write_half.write_all(&request)).await.is_err() {
            warn!("Write timeout: failed to send command to daemon within {:?}", self.socket_timeout);
            return Err(IpcError::Timeout);
        }
        debug!("Sent {:?}", cmd);

        let wait = self.reply_timeout(&cmd);
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        match timeout(wait, reader.read_line(&mut line)).await {
            Ok(Ok(0)) => {
                return Err(IpcError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "daemon closed the connection without replying",
                )));
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!("Read timeout: no response from daemon within {:?}", wait);
                return Err(IpcError::Timeout);
            }
        }

        decode_line(&line)
    }
}
