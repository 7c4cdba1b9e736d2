//! Small helpers shared across modules.

use std::time::Duration;

/// Truncate `s` to at most `max_chars` characters, appending "..." when cut.
///
/// Counts characters rather than bytes so multi-byte input never splits.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Unix-seconds start of a look-back `window` ending at `now`.
///
/// Windows longer than the representable range start at `i64::MIN`.
pub fn window_start(now: i64, window: Duration) -> i64 {
    now.saturating_sub(i64::try_from(window.as_secs()).unwrap_or(i64::MAX))
}
