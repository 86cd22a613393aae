/// Security response headers
///
/// Applied to every response, following OWASP recommendations for a JSON
/// API serving a single-page frontend:
///
/// - `X-Content-Type-Options: nosniff`
/// - `X-Frame-Options: DENY`
/// - `Referrer-Policy: strict-origin-when-cross-origin`
/// - `Permissions-Policy` disabling unused browser features
/// - `Content-Security-Policy: default-src 'none'` (this server returns JSON)
/// - `Strict-Transport-Security` in production only

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const STATIC_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "permissions-policy",
        "geolocation=(), microphone=(), camera=(), payment=(), usb=()",
    ),
    (
        "content-security-policy",
        "default-src 'none'; frame-ancestors 'none'",
    ),
];

const HSTS: (&str, &str) = (
    "strict-transport-security",
    "max-age=31536000; includeSubDomains; preload",
);

/// Middleware function stamping the security headers onto every response
///
/// Wire it up with `axum::middleware::from_fn`, closing over the
/// production flag:
///
/// ```ignore
/// let production = state.config.api.production;
/// router.layer(axum::middleware::from_fn(move |req, next| async move {
///     security_headers(req, next, production).await
/// }))
/// ```
pub async fn security_headers(request: Request, next: Next, enable_hsts: bool) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in STATIC_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    if enable_hsts {
        headers.insert(
            HeaderName::from_static(HSTS.0),
            HeaderValue::from_static(HSTS.1),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::Service as _;

    fn test_router(production: bool) -> Router {
        Router::new()
            .route("/test", get(|| async { (StatusCode::OK, "test") }))
            .layer(axum::middleware::from_fn(move |req, next| async move {
                security_headers(req, next, production).await
            }))
    }

    #[tokio::test]
    async fn test_static_headers_applied() {
        let mut app = test_router(false);

        let response = app
            .call(
                axum::http::Request::builder()
                    .uri("/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert!(response.headers().get("strict-transport-security").is_none());
    }

    #[tokio::test]
    async fn test_hsts_only_in_production() {
        let mut app = test_router(true);

        let response = app
            .call(
                axum::http::Request::builder()
                    .uri("/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response
            .headers()
            .get("strict-transport-security")
            .is_some());
    }
}
