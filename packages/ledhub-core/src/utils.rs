//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Returns the current Unix timestamp in whole seconds.
#[must_use]
pub fn now_secs() -> u64 {
    now_millis() / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_plausible() {
        // Anything after 2020-01-01 in epoch millis.
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn now_secs_derives_from_millis() {
        assert_eq!(now_secs(), now_millis() / 1000);
    }
}
