//! Shared utilities for mesh-server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Global counter for generating unique nonces.
static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique nonce for discovery responses.
///
/// The nonce is `{timestamp_hex}-{counter_hex}`. The counter makes nonces
/// unique within the process; the timestamp keeps nonces from a restarted
/// process from matching ones a client still remembers.
pub fn generate_nonce() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    let count = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{timestamp:x}-{count:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_unique() {
        let n1 = generate_nonce();
        let n2 = generate_nonce();
        assert_ne!(n1, n2, "nonces should be unique");
    }

    #[test]
    fn nonce_format() {
        let nonce = generate_nonce();
        let (timestamp, counter) = nonce.split_once('-').unwrap();
        assert!(u64::from_str_radix(timestamp, 16).is_ok());
        assert!(u64::from_str_radix(counter, 16).is_ok());
    }
}
