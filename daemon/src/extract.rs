use regex::Regex;
use std::sync::OnceLock;

fn fenced_block() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:[a-zA-Z0-9]+)?\n(.*?)\n```").expect("fence pattern is valid")
    })
}

/// Body of the first fenced code block in `text`, or all of `text` when there
/// is no complete fence.
pub fn extract_snippet(text: &str) -> &str {
    fenced_block()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str())
        .unwrap_or(text)
}
