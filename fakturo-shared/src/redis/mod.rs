/// Redis layer for Fakturo
///
/// One hosted Redis instance backs three concerns, each with its own module:
///
/// - `client`: connection management (ConnectionManager wrapper, health check)
/// - `rate_limit`: fixed-window counters for auth-adjacent operations
/// - `cache`: read-through JSON caches for profile/organization reads
///
/// All three are secondary systems: every caller degrades gracefully when
/// Redis is unavailable (rate limiting fails open, caches fall through to
/// the database).

pub mod cache;
pub mod client;
pub mod rate_limit;
