use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::tracker::UtteranceTracker;
use crate::speech::{RecognitionEvent, SpeechSource};

/// The utterance as currently heard, for status display.
pub type LiveTranscript = Arc<Mutex<String>>;

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

enum SessionEnd {
    Finalized(String),
    Shutdown,
}

/// Listens for one utterance at a time and hands each finished one to the
/// dispatcher, re-arming after every utterance.
pub struct UtteranceCapturer<S> {
    source: S,
    quiet_threshold: Duration,
    sample_interval: Duration,
    utterances: mpsc::Sender<String>,
    live: LiveTranscript,
}

impl<S: SpeechSource + 'static> UtteranceCapturer<S> {
    pub fn new(
        source: S,
        quiet_threshold: Duration,
        sample_interval: Duration,
        utterances: mpsc::Sender<String>,
        live: LiveTranscript,
    ) -> Self {
        Self {
            source,
            quiet_threshold,
            sample_interval,
            utterances,
            live,
        }
    }

    pub fn spawn(self) -> CaptureHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));
        CaptureHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Capture utterances until shut down or until the source fails to start.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let Self {
            mut source,
            quiet_threshold,
            sample_interval,
            utterances,
            live,
        } = self;
        let mut tracker = UtteranceTracker::new(quiet_threshold);

        loop {
            let events = match source.start() {
                Ok(events) => events,
                Err(e) => {
                    error!("Speech capture couldn't start: {}", e);
                    source.stop().await;
                    publish(&live, "").await;
                    return;
                }
            };
            tracker.begin();
            info!("Listening for a command");

            let end = listen(&mut tracker, events, &mut shutdown, sample_interval, &live).await;
            source.stop().await;
            publish(&live, "").await;

            match end {
                SessionEnd::Shutdown => {
                    info!("Speech capture stopped");
                    return;
                }
                SessionEnd::Finalized(text) => {
                    let utterance = text.trim();
                    if utterance.is_empty() {
                        debug!("Nothing was said, re-arming");
                    } else {
                        info!("Utterance complete: '{}'", utterance);
                        if utterances.send(utterance.to_string()).await.is_err() {
                            warn!("Utterance dispatcher is gone, stopping capture");
                            return;
                        }
                    }
                    tracker.rearm();
                }
            }
        }
    }
}

async fn listen(
    tracker: &mut UtteranceTracker,
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    shutdown: &mut oneshot::Receiver<()>,
    sample_interval: Duration,
    live: &LiveTranscript,
) -> SessionEnd {
    let mut ticker = interval(sample_interval.max(MIN_SAMPLE_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut *shutdown => return SessionEnd::Shutdown,
            event = events.recv() => {
                let finalized = match event {
                    Some(RecognitionEvent::Partial(text)) => {
                        if tracker.on_partial(text, Instant::now()) {
                            publish(live, tracker.utterance()).await;
                        }
                        None
                    }
                    Some(RecognitionEvent::Final(text)) => {
                        if !text.trim().is_empty() {
                            tracker.on_partial(text, Instant::now());
                        }
                        tracker.finalize()
                    }
                    Some(RecognitionEvent::Error(e)) => {
                        warn!("Speech recognition error: {}", e);
                        tracker.finalize()
                    }
                    None => {
                        debug!("Recognition stream ended");
                        tracker.finalize()
                    }
                };
                if let Some(text) = finalized {
                    return SessionEnd::Finalized(text);
                }
            }
            _ = ticker.tick() => {
                if let Some(text) = tracker.poll(Instant::now()) {
                    return SessionEnd::Finalized(text);
                }
            }
        }
    }
}

async fn publish(live: &LiveTranscript, text: &str) {
    let mut live = live.lock().await;
    live.clear();
    live.push_str(text);
}

/// Owner's end of a running capturer.
pub struct CaptureHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CaptureHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop capturing and wait until audio and recognition are torn down.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!("Capture task failed: {}", e);
        }
    }
}
