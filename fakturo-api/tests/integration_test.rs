/// Integration tests for the Fakturo API
///
/// End-to-end flow tests over the real router with the in-memory identity
/// provider: registration with deferred account creation, email
/// verification, login, session derivation and gating, the onboarding
/// wizard, consent recording, and webhook reconciliation.
///
/// All tests require live Postgres and Redis and are `#[ignore]`d for
/// plain `cargo test`; run them with `cargo test -- --ignored`.

mod common;

use axum::http::StatusCode;
use common::TestContext;
use fakturo_shared::identity::IdentityProvider;
use fakturo_shared::models::organization::Organization;
use fakturo_shared::models::pending_registration::PendingRegistration;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

/// Registers, pulls the verification token from the pending row, verifies,
/// and returns the access token from a follow-up login.
async fn register_verify_login(ctx: &TestContext, email: &str, password: &str) -> String {
    let response = ctx
        .request(
            "POST",
            "/v1/auth/register",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
    TestContext::json_body(response, StatusCode::OK).await;

    let pending = PendingRegistration::find_by_email(&ctx.db, email)
        .await
        .unwrap()
        .expect("Pending registration should exist");

    let response = ctx
        .request(
            "POST",
            "/v1/auth/verify-email",
            None,
            Some(json!({ "token": pending.verification_token })),
        )
        .await;
    TestContext::json_body(response, StatusCode::OK).await;

    let response = ctx
        .request(
            "POST",
            "/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
    let body = TestContext::json_body(response, StatusCode::OK).await;
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
#[ignore] // Requires running Postgres and Redis
async fn test_register_creates_pending_not_account() {
    let ctx = TestContext::new().await.unwrap();
    let email = TestContext::unique_email("register");

    let response = ctx
        .request(
            "POST",
            "/v1/auth/register",
            None,
            Some(json!({ "email": email, "password": "Abcdef1!" })),
        )
        .await;
    TestContext::json_body(response, StatusCode::OK).await;

    // Pending row exists with a ~24 h expiry...
    let pending = PendingRegistration::find_by_email(&ctx.db, &email)
        .await
        .unwrap()
        .expect("Pending registration should exist");
    let ttl = pending.expires_at - pending.created_at;
    assert!(ttl >= chrono::Duration::hours(23) && ttl <= chrono::Duration::hours(25));

    // ...but no provider account yet.
    assert!(ctx
        .identity
        .get_user_by_email(&email)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore] // Requires running Postgres and Redis
async fn test_duplicate_registration_rejected_while_pending() {
    let ctx = TestContext::new().await.unwrap();
    let email = TestContext::unique_email("duplicate");

    let response = ctx
        .request(
            "POST",
            "/v1/auth/register",
            None,
            Some(json!({ "email": email, "password": "Abcdef1!" })),
        )
        .await;
    TestContext::json_body(response, StatusCode::OK).await;

    let response = ctx
        .request(
            "POST",
            "/v1/auth/register",
            None,
            Some(json!({ "email": email, "password": "Abcdef1!" })),
        )
        .await;
    let body = TestContext::json_body(response, StatusCode::CONFLICT).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Registration already in progress"));
}

#[tokio::test]
#[ignore] // Requires running Postgres and Redis
async fn test_verify_email_creates_account_and_deletes_pending() {
    let ctx = TestContext::new().await.unwrap();
    let email = TestContext::unique_email("verify");

    register_verify_login(&ctx, &email, "Abcdef1!").await;

    // Provider account exists and is confirmed; pending row is gone.
    let user = ctx
        .identity
        .get_user_by_email(&email)
        .await
        .unwrap()
        .expect("Provider user should exist");
    assert!(user.is_confirmed());

    assert!(PendingRegistration::find_by_email(&ctx.db, &email)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore] // Requires running Postgres and Redis
async fn test_session_flags_and_onboarding_flow() {
    let ctx = TestContext::new().await.unwrap();
    let email = TestContext::unique_email("onboarding");
    let token = register_verify_login(&ctx, &email, "Abcdef1!").await;

    // Fresh session: verified, no organization.
    let response = ctx.request("GET", "/v1/session", Some(&token), None).await;
    let body = TestContext::json_body(response, StatusCode::OK).await;
    assert_eq!(body["flags"]["email_verified"], true);
    assert_eq!(body["flags"]["has_organization"], false);
    assert_eq!(body["flags"]["onboarding_complete"], false);

    // Create the organization.
    let response = ctx
        .request(
            "POST",
            "/v1/onboarding/organization",
            Some(&token),
            Some(json!({ "name": "Muster Treuhand AG" })),
        )
        .await;
    let body = TestContext::json_body(response, StatusCode::OK).await;
    let org_id = body["organization_id"].as_str().unwrap().to_string();

    // Save a draft, then load it back verbatim.
    let response = ctx
        .request(
            "PUT",
            "/v1/onboarding/draft",
            Some(&token),
            Some(json!({ "step": 2, "data": { "canton": "ZH", "iban": "CH93..." } })),
        )
        .await;
    TestContext::json_body(response, StatusCode::OK).await;

    let response = ctx
        .request("GET", "/v1/onboarding/draft", Some(&token), None)
        .await;
    let body = TestContext::json_body(response, StatusCode::OK).await;
    assert_eq!(body["data"]["canton"], "ZH");
    assert_eq!(body["step"], 2);

    // A later save shallow-merges over the earlier one.
    let response = ctx
        .request(
            "PUT",
            "/v1/onboarding/draft",
            Some(&token),
            Some(json!({ "step": 3, "data": { "vat_number": "CHE-123.456.789" } })),
        )
        .await;
    let body = TestContext::json_body(response, StatusCode::OK).await;
    assert_eq!(body["data"]["canton"], "ZH");
    assert_eq!(body["data"]["vat_number"], "CHE-123.456.789");

    // Complete onboarding twice; the second call changes nothing.
    for _ in 0..2 {
        let response = ctx
            .request(
                "POST",
                "/v1/onboarding/complete",
                Some(&token),
                Some(json!({ "iban": "CH9300762011623852957", "canton": "zh" })),
            )
            .await;
        let body = TestContext::json_body(response, StatusCode::OK).await;
        assert_eq!(body["onboarding_completed"], true);
    }

    let org = Organization::find_by_id(&ctx.db, org_id.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(org.onboarding_completed);
    assert_eq!(org.canton.as_deref(), Some("ZH"));
    assert_eq!(org.onboarding_draft, json!({}));

    // Exactly one terms grant despite the double completion.
    let (terms_count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM consent_records
         WHERE consent_type = 'terms' AND given AND withdrawn_at IS NULL
           AND user_id = (SELECT user_id FROM user_profiles WHERE email = $1)",
    )
    .bind(&email)
    .fetch_one(&ctx.db)
    .await
    .unwrap();
    assert_eq!(terms_count, 1);
}

#[tokio::test]
#[ignore] // Requires running Postgres and Redis
async fn test_magic_link_rate_limit_window() {
    let ctx = TestContext::new().await.unwrap();
    let email = TestContext::unique_email("ratelimit");

    // Limit for magic links is 3 per hour.
    for _ in 0..3 {
        let response = ctx
            .request(
                "POST",
                "/v1/auth/magic-link",
                None,
                Some(json!({ "email": email })),
            )
            .await;
        TestContext::json_body(response, StatusCode::OK).await;
    }

    let response = ctx
        .request(
            "POST",
            "/v1/auth/magic-link",
            None,
            Some(json!({ "email": email })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());
}

#[tokio::test]
#[ignore] // Requires running Postgres and Redis
async fn test_anonymous_consent_roundtrip() {
    let ctx = TestContext::new().await.unwrap();
    let visitor = format!("visitor-{}", uuid::Uuid::new_v4());

    let response = ctx
        .request(
            "POST",
            "/v1/consent",
            None,
            Some(json!({
                "consent_type": "cookies_analytics",
                "given": true,
                "method": "banner",
                "visitor_id": visitor,
            })),
        )
        .await;
    TestContext::json_body(response, StatusCode::OK).await;

    let response = ctx
        .request(
            "GET",
            &format!("/v1/consent?visitor_id={}", visitor),
            None,
            None,
        )
        .await;
    let body = TestContext::json_body(response, StatusCode::OK).await;
    assert_eq!(body["consents"].as_array().unwrap().len(), 1);

    let response = ctx
        .request(
            "POST",
            "/v1/consent/withdraw",
            None,
            Some(json!({ "consent_type": "cookies_analytics", "visitor_id": visitor })),
        )
        .await;
    let body = TestContext::json_body(response, StatusCode::OK).await;
    assert_eq!(body["withdrawn"], true);

    let response = ctx
        .request(
            "GET",
            &format!("/v1/consent?visitor_id={}", visitor),
            None,
            None,
        )
        .await;
    let body = TestContext::json_body(response, StatusCode::OK).await;
    assert!(body["consents"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires running Postgres and Redis
async fn test_webhook_checkout_completed_updates_org() {
    let ctx = TestContext::new().await.unwrap();

    let org = Organization::create(
        &ctx.db,
        fakturo_shared::models::organization::CreateOrganization {
            name: "Webhook AG".to_string(),
            plan: fakturo_shared::models::organization::OrgPlan::Free,
        },
    )
    .await
    .unwrap();

    let payload = json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "customer": "cus_test_1",
            "subscription": "sub_test_1",
            "metadata": { "organization_id": org.id.to_string(), "plan": "pro" }
        }}
    })
    .to_string();

    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(common::WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    let signature = format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()));

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/billing/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(axum::body::Body::from(payload))
        .unwrap();

    use tower::Service as _;
    let response = ctx.app.clone().call(request).await.unwrap();
    TestContext::json_body(response, StatusCode::OK).await;

    let updated = Organization::find_by_id(&ctx.db, org.id).await.unwrap().unwrap();
    assert_eq!(updated.plan, "pro");
    assert_eq!(updated.stripe_customer_id.as_deref(), Some("cus_test_1"));
    assert_eq!(updated.stripe_subscription_id.as_deref(), Some("sub_test_1"));
    assert_eq!(updated.subscription_status.as_deref(), Some("active"));

    // Redelivery of the same event is harmless (absolute values).
    let payload2 = json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "customer": "cus_test_1",
            "subscription": "sub_test_1",
            "metadata": { "organization_id": org.id.to_string(), "plan": "pro" }
        }}
    })
    .to_string();
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(common::WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload2).as_bytes());
    let signature = format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()));

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/billing/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(axum::body::Body::from(payload2))
        .unwrap();
    let response = ctx.app.clone().call(request).await.unwrap();
    TestContext::json_body(response, StatusCode::OK).await;

    let after_redelivery = Organization::find_by_id(&ctx.db, org.id).await.unwrap().unwrap();
    assert_eq!(after_redelivery.plan, "pro");
}
