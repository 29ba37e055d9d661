//! Utility functions for the arena service

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Exponential backoff delay with jitter for a retry attempt (0-based).
///
/// Doubles the base delay per attempt and adds up to 50% random jitter so
/// simultaneous retries don't stampede the same resource.
pub fn backoff_with_jitter(base_delay: Duration, attempt: u32) -> Duration {
    let exp = base_delay.saturating_mul(1u32 << attempt.min(16));
    let jitter_ms = rand::thread_rng().gen_range(0..=exp.as_millis().max(1) as u64 / 2);
    exp + Duration::from_millis(jitter_ms)
}

/// Derive a match seed from a unit id so redeliveries replay identically.
pub fn seed_from_unit_id(unit_id: &str) -> u64 {
    // FNV-1a over the id bytes; stability matters more than distribution here.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in unit_id.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_match_id();
        let id2 = generate_match_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let base = Duration::from_millis(100);
        let first = backoff_with_jitter(base, 0);
        let third = backoff_with_jitter(base, 2);

        assert!(first >= base);
        // Attempt 2 is at least 4x base before jitter
        assert!(third >= Duration::from_millis(400));
        // Jitter is bounded by 50% of the exponential delay
        assert!(third <= Duration::from_millis(600));
    }

    #[test]
    fn test_seed_is_stable_per_unit() {
        assert_eq!(seed_from_unit_id("unit-1"), seed_from_unit_id("unit-1"));
        assert_ne!(seed_from_unit_id("unit-1"), seed_from_unit_id("unit-2"));
    }
}
