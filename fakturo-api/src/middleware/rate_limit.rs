/// Rate-limit enforcement for request handlers
///
/// Most limited operations key on an identifier from the request *body*
/// (the email being registered or signed in), so enforcement happens inside
/// handlers rather than as a tower layer: validate, then
/// `enforce(&state, op, &email).await?`, then do the work. Anonymous
/// operations key on the client IP instead.
///
/// The limiter itself fails open; this helper only converts a denied
/// decision into the 429 response with its Retry-After.

use crate::app::AppState;
use crate::error::ApiError;
use axum::http::HeaderMap;
use fakturo_shared::redis::rate_limit::RateLimitOp;

/// Checks the fixed-window counter and rejects the request when exhausted
///
/// # Errors
///
/// `ApiError::RateLimitExceeded` with the window's retry-after when the
/// identifier has used up its budget
pub async fn enforce(state: &AppState, op: RateLimitOp, identifier: &str) -> Result<(), ApiError> {
    let decision = state.limiter.check(op, identifier).await;

    if decision.allowed {
        return Ok(());
    }

    tracing::info!(
        op = op.as_str(),
        retry_after = decision.retry_after,
        "Request rate limited"
    );

    Err(ApiError::RateLimitExceeded {
        retry_after: decision.retry_after,
        message: format!(
            "Too many requests. Try again in {} seconds",
            decision.retry_after
        ),
    })
}

/// Best-effort client IP for anonymous rate limiting and audit rows
///
/// Trusts the leftmost X-Forwarded-For entry (the edge proxy appends its
/// own), falling back to X-Real-IP.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_from_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_client_ip_from_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers), Some("198.51.100.4".to_string()));
    }

    #[test]
    fn test_client_ip_missing() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
