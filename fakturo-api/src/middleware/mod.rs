/// Cross-cutting request plumbing
///
/// - `rate_limit`: fixed-window enforcement helper + client IP extraction
/// - `security`: OWASP response headers middleware

pub mod rate_limit;
pub mod security;
