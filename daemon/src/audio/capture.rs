use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const SAMPLE_RATE: u32 = 16000;
const CHANNELS: u16 = 1;

type SharedSender = Arc<Mutex<Option<broadcast::Sender<Vec<f32>>>>>;

/// Microphone input, published as mono 16 kHz `f32` chunks.
pub struct AudioCapture {
    device: Device,
    gain: f32,
    stream: Option<Stream>,
    audio_tx: SharedSender,
    is_running: Arc<AtomicBool>,
}

impl AudioCapture {
    pub fn new(gain: f32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No default input device found"))?;

        tracing::info!("Using input device: {}", device.name()?);

        Ok(Self {
            device,
            gain,
            stream: None,
            audio_tx: Arc::new(Mutex::new(None)),
            is_running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn start(&mut self, audio_tx: broadcast::Sender<Vec<f32>>) -> Result<()> {
        if self.is_running() {
            return Err(anyhow::anyhow!("Audio capture already running"));
        }

        let final_config = self.find_config()?;
        let sample_format = self
            .device
            .default_input_config()
            .map(|c| c.sample_format())
            .unwrap_or(SampleFormat::F32);

        if let Ok(mut tx) = self.audio_tx.lock() {
            *tx = Some(audio_tx);
        }

        let audio_tx = Arc::clone(&self.audio_tx);
        let is_running = Arc::clone(&self.is_running);
        let gain = self.gain;
        let error_callback = |err| {
            tracing::error!("Audio stream error: {}", err);
        };

        let stream = match sample_format {
            SampleFormat::F32 => self.device.build_input_stream(
                &final_config,
                move |data: &[f32], _: &_| {
                    publish(data.iter().copied(), gain, &audio_tx, &is_running);
                },
                error_callback,
                None,
            )?,
            SampleFormat::I16 => self.device.build_input_stream(
                &final_config,
                move |data: &[i16], _: &_| {
                    let samples = data.iter().map(|&s| s as f32 / i16::MAX as f32);
                    publish(samples, gain, &audio_tx, &is_running);
                },
                error_callback,
                None,
            )?,
            SampleFormat::U16 => self.device.build_input_stream(
                &final_config,
                move |data: &[u16], _: &_| {
                    let samples = data
                        .iter()
                        .map(|&s| (s as f32 - 32768.0) / 32768.0);
                    publish(samples, gain, &audio_tx, &is_running);
                },
                error_callback,
                None,
            )?,
            format => {
                return Err(anyhow::anyhow!("Unsupported sample format: {:?}", format));
            }
        };

        stream.play()?;
        self.is_running.store(true, Ordering::SeqCst);
        self.stream = Some(stream);

        tracing::info!("Audio capture started");
        Ok(())
    }

    fn find_config(&self) -> Result<StreamConfig> {
        for supported in self.device.supported_input_configs()? {
            tracing::debug!("Supported config: {:?}", supported);
            if supported.channels() == CHANNELS
                && supported.min_sample_rate().0 <= SAMPLE_RATE
                && supported.max_sample_rate().0 >= SAMPLE_RATE
            {
                return Ok(supported
                    .with_sample_rate(cpal::SampleRate(SAMPLE_RATE))
                    .into());
            }
        }
        Err(anyhow::anyhow!("No suitable audio configuration found"))
    }

    /// Stop the stream and drop the sender so receivers see the channel close.
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.stream.take();
        if let Ok(mut tx) = self.audio_tx.lock() {
            tx.take();
        }
        tracing::info!("Audio capture stopped");
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn publish(
    samples: impl Iterator<Item = f32>,
    gain: f32,
    audio_tx: &SharedSender,
    is_running: &AtomicBool,
) {
    if !is_running.load(Ordering::Relaxed) {
        return;
    }
    let chunk: Vec<f32> = samples.map(|s| (s * gain).clamp(-1.0, 1.0)).collect();
    if let Ok(tx) = audio_tx.try_lock() {
        if let Some(sender) = tx.as_ref() {
            let _ = sender.send(chunk);
        }
    }
}

// cpal streams are !Send on some hosts; the stream is only created and
// dropped by the task that owns this struct.
unsafe impl Send for AudioCapture {}
