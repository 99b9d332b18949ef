//! Tracks which application the user is working in.
//!
//! The daemon never owns focus itself, so the last application that held it
//! is the target for generated scripts.

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

const FRONTMOST_SCRIPT: &str = r#"tell application "System Events"
    set frontmostProcess to first process where it is frontmost
    return name of frontmostProcess
end tell"#;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Last observed foreground application, shared between the monitor (writer)
/// and the orchestrator (reader).
#[derive(Debug, Clone, Default)]
pub struct ForegroundApp(Arc<RwLock<Option<String>>>);

impl ForegroundApp {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that starts out knowing `name`.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(Some(name.into()))))
    }

    pub async fn get(&self) -> Option<String> {
        self.0.read().await.clone()
    }

    async fn set(&self, name: String) -> bool {
        let mut current = self.0.write().await;
        if current.as_deref() == Some(name.as_str()) {
            return false;
        }
        *current = Some(name);
        true
    }
}

pub trait FocusQuery: Send + Sync + 'static {
    /// Name of the process currently holding focus.
    fn frontmost(&self) -> impl Future<Output = Result<String>> + Send;
}

/// Asks System Events through `osascript`.
pub struct OsascriptFocus {
    query_timeout: Duration,
}

impl OsascriptFocus {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }
}

impl FocusQuery for OsascriptFocus {
    async fn frontmost(&self) -> Result<String> {
        let output = timeout(
            self.query_timeout,
            Command::new("osascript")
                .args(["-e", FRONTMOST_SCRIPT])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("focus query timed out after {:?}", self.query_timeout))??;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "focus query failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() {
            return Err(anyhow::anyhow!("focus query returned no process name"));
        }
        Ok(name)
    }
}

pub struct ForegroundMonitor<Q> {
    query: Q,
    own_name: String,
    excluded: Vec<String>,
    current: ForegroundApp,
}

impl<Q: FocusQuery> ForegroundMonitor<Q> {
    pub fn new(query: Q, own_name: String, excluded: Vec<String>, current: ForegroundApp) -> Self {
        Self {
            query,
            own_name,
            excluded,
            current,
        }
    }

    fn is_ignored(&self, name: &str) -> bool {
        name == self.own_name || self.excluded.iter().any(|e| e == name)
    }

    /// Query once and record the result. Returns true when the cached name changed.
    pub async fn poll_once(&self) -> bool {
        match self.query.frontmost().await {
            Ok(name) if self.is_ignored(&name) => {
                debug!("Ignoring focus on {}", name);
                false
            }
            Ok(name) => {
                let changed = self.current.set(name.clone()).await;
                if changed {
                    info!("Frontmost app: {}", name);
                }
                changed
            }
            Err(e) => {
                warn!("Frontmost app query failed: {}", e);
                false
            }
        }
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Foreground monitor started, polling every {:?}", every);
            let mut ticker = interval(every.max(MIN_POLL_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedFocus(Mutex<VecDeque<Result<String>>>);

    impl ScriptedFocus {
        fn new(answers: Vec<Result<String>>) -> Self {
            Self(Mutex::new(answers.into()))
        }
    }

    impl FocusQuery for ScriptedFocus {
        async fn frontmost(&self) -> Result<String> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more answers")))
        }
    }

    fn monitor(answers: Vec<Result<String>>) -> (ForegroundMonitor<ScriptedFocus>, ForegroundApp) {
        let app = ForegroundApp::new();
        let monitor = ForegroundMonitor::new(
            ScriptedFocus::new(answers),
            "osgpt".to_string(),
            vec!["Xcode".to_string()],
            app.clone(),
        );
        (monitor, app)
    }

    #[tokio::test]
    async fn test_other_app_updates_cache() {
        let (monitor, app) = monitor(vec![Ok("Safari".to_string())]);
        assert!(monitor.poll_once().await);
        assert_eq!(app.get().await, Some("Safari".to_string()));
    }

    #[tokio::test]
    async fn test_own_and_excluded_names_are_ignored() {
        let (monitor, app) = monitor(vec![
            Ok("Notes".to_string()),
            Ok("osgpt".to_string()),
            Ok("Xcode".to_string()),
        ]);
        monitor.poll_once().await;
        assert!(!monitor.poll_once().await);
        assert!(!monitor.poll_once().await);
        assert_eq!(app.get().await, Some("Notes".to_string()));
    }

    #[tokio::test]
    async fn test_failed_query_keeps_previous_value() {
        let (monitor, app) = monitor(vec![
            Ok("Finder".to_string()),
            Err(anyhow::anyhow!("System Events not running")),
        ]);
        monitor.poll_once().await;
        assert!(!monitor.poll_once().await);
        assert_eq!(app.get().await, Some("Finder".to_string()));
    }

    #[tokio::test]
    async fn test_failed_first_query_leaves_cache_empty() {
        let (monitor, app) = monitor(vec![Err(anyhow::anyhow!("denied"))]);
        monitor.poll_once().await;
        assert_eq!(app.get().await, None);
    }

    #[tokio::test]
    async fn test_same_app_twice_is_not_a_change() {
        let (monitor, _app) = monitor(vec![Ok("Mail".to_string()), Ok("Mail".to_string())]);
        assert!(monitor.poll_once().await);
        assert!(!monitor.poll_once().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_monitor_polls_on_interval() {
        let (monitor, app) = monitor(vec![Ok("Music".to_string()), Ok("Maps".to_string())]);
        let handle = monitor.spawn(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(app.get().await, Some("Music".to_string()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(app.get().await, Some("Maps".to_string()));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_keeps_monitor_alive() {
        let (monitor, app) = monitor(vec![Ok("Calendar".to_string())]);
        let handle = monitor.spawn(Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(app.get().await, Some("Calendar".to_string()));
        assert!(!handle.is_finished());

        handle.abort();
    }
}
