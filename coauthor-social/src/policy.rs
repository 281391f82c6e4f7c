//! Cache policy: jittered TTLs and the empty-value marker.

use std::time::Duration;

use rand::Rng;

use crate::error::{SocialError, SocialResult};

/// Marker stored for documents the source does not know, so "known zero"
/// is distinguishable from "never looked up".
pub const EMPTY_CACHE_MARKER: i64 = -1;

/// Default TTL base for positive cache entries.
pub const BASE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default jitter range added to the base TTL.
pub const TTL_JITTER: Duration = Duration::from_secs(60 * 60);

/// Default TTL for the empty-value marker.
pub const NEGATIVE_TTL: Duration = Duration::from_secs(5 * 60);

/// A TTL in `[base, base + jitter)`, so entries written together do not
/// expire together.
pub fn jittered_ttl(base: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0..jitter.as_millis() as u64);
    base + Duration::from_millis(extra)
}

/// Parse a cached counter value. The empty-value marker reads as zero.
pub fn parse_cached_count(raw: &str) -> SocialResult<u64> {
    let value: i64 = raw
        .parse()
        .map_err(|_| SocialError::Malformed(raw.to_string()))?;
    if value == EMPTY_CACHE_MARKER {
        return Ok(0);
    }
    u64::try_from(value).map_err(|_| SocialError::Malformed(raw.to_string()))
}
