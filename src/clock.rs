//! Monotonic time source and timeout sentinel values.
//!
//! Kept deliberately tiny: all of this crate's suspension points accept an
//! `Option<Duration>` or a raw millisecond count where `-1` means "infinite"
//! and `0`/absent means "use the primitive's configured default".

use std::time::{Duration, Instant};

/// Sentinel for "wait forever" in millisecond-based APIs.
pub const INFINITE: i64 = -1;

/// Sentinel for "use the primitive's configured default timeout".
pub const DEFAULT: i64 = 0;

/// Returns the monotonic "now" used throughout the crate.
///
/// A thin wrapper rather than calling `Instant::now()` at every call site so
/// that deadline math reads uniformly and any future fake-clock test hook
/// has one place to live.
#[inline]
pub fn now() -> Instant {
    Instant::now()
}

/// Resolves a millisecond timeout value (as accepted by the public API) into
/// an `Option<Duration>`, where `None` means "wait forever".
///
/// - `INFINITE` (`-1`) or any negative value -> `None`.
/// - `DEFAULT` (`0`) -> `fallback`.
/// - any positive value -> that many milliseconds.
pub fn resolve_timeout(timeout_ms: i64, fallback: Option<Duration>) -> Option<Duration> {
    if timeout_ms < 0 {
        None
    } else if timeout_ms == DEFAULT {
        fallback
    } else {
        Some(Duration::from_millis(timeout_ms as u64))
    }
}

/// A validated non-negative millisecond duration, used where a config field
/// must be meaningful (e.g. `cleanup_interval`, `max_buffer_age`).
pub fn validate_positive_ms(field: &str, ms: u64) -> crate::error::Result<Duration> {
    if ms == 0 {
        return Err(crate::error::Error::invalid_state(format!(
            "{field} must be > 0ms"
        )));
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_is_none() {
        assert_eq!(resolve_timeout(INFINITE, Some(Duration::from_millis(5))), None);
        assert_eq!(resolve_timeout(-42, None), None);
    }

    #[test]
    fn default_uses_fallback() {
        let fb = Some(Duration::from_millis(250));
        assert_eq!(resolve_timeout(DEFAULT, fb), fb);
        assert_eq!(resolve_timeout(DEFAULT, None), None);
    }

    #[test]
    fn explicit_value_wins() {
        assert_eq!(
            resolve_timeout(100, Some(Duration::from_millis(5))),
            Some(Duration::from_millis(100))
        );
    }

    #[test]
    fn positive_validation() {
        assert!(validate_positive_ms("max_buffer_age", 0).is_err());
        assert!(validate_positive_ms("max_buffer_age", 10).is_ok());
    }
}
