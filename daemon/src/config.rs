use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Our own process name; focus landing on it is not a target change.
    #[serde(default = "default_own_name")]
    pub own_name: String,
    #[serde(default = "default_excluded_apps")]
    pub excluded_apps: Vec<String>,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            own_name: default_own_name(),
            excluded_apps: default_excluded_apps(),
            query_timeout_ms: default_query_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}
fn default_own_name() -> String {
    "osgpt".to_string()
}
/// Terminals are where `osgpt run` is typed, so focus landing on one is the
/// tool itself, not the app the command is meant for.
fn default_excluded_apps() -> Vec<String> {
    [
        "Xcode",
        "Terminal",
        "iTerm2",
        "Alacritty",
        "kitty",
        "wezterm-gui",
        "Ghostty",
        "Warp",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}
fn default_query_timeout() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AudioConfig {
    #[serde(default = "default_gain")]
    pub gain: f32,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            gain: default_gain(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

fn default_gain() -> f32 {
    1.0
}
fn default_broadcast_capacity() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CaptureConfig {
    /// Quiet period after the last partial result that ends an utterance.
    #[serde(default = "default_quiet_threshold")]
    pub quiet_threshold_ms: u64,
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
    /// Amount of new audio between partial transcriptions.
    #[serde(default = "default_step")]
    pub step_ms: u32,
    #[serde(default = "default_max_utterance")]
    pub max_utterance_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            quiet_threshold_ms: default_quiet_threshold(),
            sample_interval_ms: default_sample_interval(),
            step_ms: default_step(),
            max_utterance_ms: default_max_utterance(),
        }
    }
}

impl CaptureConfig {
    pub fn quiet_threshold(&self) -> Duration {
        Duration::from_millis(self.quiet_threshold_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

fn default_quiet_threshold() -> u64 {
    2000
}
fn default_sample_interval() -> u64 {
    500
}
fn default_step() -> u32 {
    1000
}
fn default_max_utterance() -> u32 {
    30000
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SpeechConfig {
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default = "default_model_url")]
    pub model_url: String,
    #[serde(default)]
    pub model_checksum: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_url: default_model_url(),
            model_checksum: None,
            language: default_language(),
        }
    }
}

fn default_model_url() -> String {
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin".to_string()
}
fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CompilerConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RunnerConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_inline_flag")]
    pub inline_flag: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            interpreter: default_interpreter(),
            inline_flag: default_inline_flag(),
        }
    }
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}
fn default_interpreter() -> String {
    "osascript".to_string()
}
fn default_inline_flag() -> String {
    "-e".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TimeoutsConfig {
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_seconds: u64,
    #[serde(default = "default_script_timeout")]
    pub script_timeout_seconds: u64,
    #[serde(default = "default_model_download_timeout")]
    pub model_download_timeout_seconds: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            compile_timeout_seconds: default_compile_timeout(),
            script_timeout_seconds: default_script_timeout(),
            model_download_timeout_seconds: default_model_download_timeout(),
        }
    }
}

fn default_compile_timeout() -> u64 {
    60
}
fn default_script_timeout() -> u64 {
    30
}
fn default_model_download_timeout() -> u64 {
    300
}

impl Config {
    /// Reject values that parse but cannot drive a timer or a channel.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("monitor.poll_interval_ms", self.monitor.poll_interval_ms),
            ("capture.sample_interval_ms", self.capture.sample_interval_ms),
            ("capture.step_ms", self.capture.step_ms as u64),
            ("capture.max_utterance_ms", self.capture.max_utterance_ms as u64),
            ("audio.broadcast_capacity", self.audio.broadcast_capacity as u64),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", key);
            }
        }
        Ok(())
    }
}

pub fn load_config() -> Result<Config> {
    match get_config_path() {
        Some(path) => load_config_from(&path),
        None => {
            tracing::warn!("Could not determine config directory, using defaults");
            Ok(Config::default())
        }
    }
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", config_path);
        return Ok(Config::default());
    }

    tracing::info!("Loading config from {:?}", config_path);
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config file: {}", e))?;

    tracing::info!("Config loaded successfully");
    Ok(config)
}

fn get_config_path() -> Option<PathBuf> {
    shared::config_path()
}
