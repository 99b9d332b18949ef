pub mod foreground;

pub use foreground::{FocusQuery, ForegroundApp, ForegroundMonitor, OsascriptFocus};
