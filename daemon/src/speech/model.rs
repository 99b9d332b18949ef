use anyhow::Result;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use whisper_rs::{WhisperContext, WhisperContextParameters, WhisperState};

use crate::config::SpeechConfig;

const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// A loaded whisper model. Cheap to clone; each recognition session gets its
/// own decoding state.
#[derive(Clone)]
pub struct SpeechModel {
    context: Arc<WhisperContext>,
}

impl SpeechModel {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading speech model from {:?}", path);
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Model path is not valid UTF-8: {:?}", path))?;

        let context = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| anyhow::anyhow!("Failed to load speech model: {}", e))?;

        info!("Speech model loaded");
        Ok(Self {
            context: Arc::new(context),
        })
    }

    pub fn create_state(&self) -> Result<WhisperState> {
        self.context
            .create_state()
            .map_err(|e| anyhow::anyhow!("Failed to create speech decoding state: {}", e))
    }
}

/// Make sure the configured model is on disk, downloading it when missing or
/// when its checksum does not match. Returns the model path.
pub async fn ensure_model(config: &SpeechConfig, download_timeout: Duration) -> Result<PathBuf> {
    let path = match &config.model_path {
        Some(path) => PathBuf::from(path),
        None => find_model_path(&config.model_url)?,
    };

    if path.exists() {
        match &config.model_checksum {
            Some(expected) => {
                let actual = file_checksum(&path).await?;
                if &actual == expected {
                    info!("Model checksum verified: {}", actual);
                    return Ok(path);
                }
                error!("Model checksum mismatch! Expected: {}, Got: {}", expected, actual);
                warn!("Re-downloading model");
            }
            None => return Ok(path),
        }
    } else {
        warn!("Model file not found at {:?}, downloading", path);
    }

    download_model(
        &config.model_url,
        &path,
        config.model_checksum.as_deref(),
        download_timeout,
    )
    .await?;
    Ok(path)
}

/// Look for the model file in the usual places, falling back to the data
/// directory when it is nowhere to be found.
pub fn find_model_path(model_url: &str) -> Result<PathBuf> {
    let filename = model_url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Invalid model URL: cannot extract filename"))?;

    let data_dir = dirs::data_dir().map(|dir| dir.join("osgpt").join(filename));
    let candidates = [
        data_dir.clone(),
        Some(PathBuf::from("./models").join(filename)),
        Some(PathBuf::from(filename)),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            info!("Found model at {:?}", candidate);
            return Ok(candidate);
        }
    }

    data_dir.ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))
}

async fn download_model(
    url: &str,
    path: &Path,
    checksum: Option<&str>,
    download_timeout: Duration,
) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let temp_path = path.with_extension("tmp");
    let client = reqwest::Client::builder()
        .timeout(download_timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

    let mut last_error = None;
    for attempt in 1..=MAX_DOWNLOAD_ATTEMPTS {
        info!(
            "Downloading model (attempt {}/{}): {}",
            attempt, MAX_DOWNLOAD_ATTEMPTS, url
        );

        let result = match stream_to_file(&client, url, &temp_path).await {
            Ok(actual) => match checksum {
                Some(expected) if actual != expected => Err(anyhow::anyhow!(
                    "Checksum mismatch: expected {}, got {}",
                    expected,
                    actual
                )),
                _ => Ok(()),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tokio::fs::rename(&temp_path, path).await?;
                info!("Model saved to {:?}", path);
                return Ok(());
            }
            Err(e) => {
                error!("Download attempt {} failed: {}", attempt, e);
                if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                    debug!("No partial download to clean up: {}", cleanup);
                }
                last_error = Some(e);

                if attempt < MAX_DOWNLOAD_ATTEMPTS {
                    let delay = Duration::from_millis(1000 * 2_u64.pow(attempt));
                    info!("Retrying in {:?}", delay);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Failed to download model")))
}

/// Stream `url` into `temp_path`, returning the SHA-256 of what was written.
async fn stream_to_file(client: &reqwest::Client, url: &str, temp_path: &Path) -> Result<String> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(anyhow::anyhow!("HTTP error: {}", response.status()));
    }

    let total = response.content_length();
    let mut stream = response.bytes_stream();
    let mut file = tokio::fs::File::create(temp_path).await?;
    let mut hasher = Sha256::new();
    let mut downloaded = 0u64;
    let mut last_logged_pct = 0u64;

    loop {
        let chunk = match timeout(CHUNK_TIMEOUT, stream.next()).await {
            Ok(Some(chunk)) => chunk?,
            Ok(None) => break,
            Err(_) => {
                return Err(anyhow::anyhow!(
                    "Server sent no data for {:?}",
                    CHUNK_TIMEOUT
                ))
            }
        };

        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total.filter(|t| *t > 0) {
            let pct = downloaded * 100 / total;
            if pct >= last_logged_pct + 10 {
                last_logged_pct = pct;
                info!("Download progress: {}%", pct);
            }
        }
    }

    file.flush().await?;

    if let Some(expected) = total {
        if downloaded != expected {
            return Err(anyhow::anyhow!(
                "Size mismatch: expected {} bytes, got {}",
                expected,
                downloaded
            ));
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

async fn file_checksum(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
