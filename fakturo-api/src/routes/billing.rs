/// Billing endpoints
///
/// Checkout and portal creation are thin calls into the payments API; the
/// webhook endpoint reconciles processor events back onto organization
/// rows. Every reconciliation writes absolute values (plan, ids, status),
/// never deltas, so a redelivered event reapplies harmlessly; signature
/// verification is the only replay guard.
///
/// # Endpoints
///
/// - `POST /v1/billing/checkout` - Create a subscription checkout session
/// - `POST /v1/billing/portal` - Create a billing-portal session
/// - `POST /v1/billing/webhook` - Processor event delivery (signature verified)

use crate::{
    app::AppState,
    billing::{verify_webhook_signature, WebhookEvent},
    error::{ApiError, ApiResult},
    middleware::rate_limit::client_ip,
};
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use fakturo_shared::audit;
use fakturo_shared::email::{EmailJob, EmailTemplate};
use fakturo_shared::models::audit_log::events;
use fakturo_shared::models::membership::Membership;
use fakturo_shared::models::organization::{
    subscription_status, BillingUpdate, OrgPlan, Organization,
};
use fakturo_shared::models::profile::UserProfile;
use fakturo_shared::redis::cache::CacheKind;
use fakturo_shared::session::SessionRequirements;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Checkout request
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Plan to subscribe to ("starter" or "pro")
    pub plan: String,
}

/// Checkout/portal response: where to send the browser
#[derive(Debug, Serialize)]
pub struct RedirectUrlResponse {
    /// Hosted page URL
    pub url: String,
}

/// Webhook acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always true; the processor only needs a 2xx
    pub received: bool,
}

/// Session requirements for billing actions
///
/// Checkout happens from the onboarding wizard's plan step, so completion
/// is not required - only a verified email and an organization.
fn billing_requirements() -> SessionRequirements {
    SessionRequirements {
        email_verified: true,
        organization: true,
        onboarding: false,
    }
}

/// Creates a checkout session for the session's organization
///
/// # Errors
///
/// - `400 Bad Request`: Unknown or non-purchasable plan
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<RedirectUrlResponse>> {
    let session = state.session(&headers, billing_requirements()).await?;
    let org = session
        .organization
        .as_ref()
        .ok_or_else(|| ApiError::InternalError("Session passed gating without org".to_string()))?;

    let plan = OrgPlan::from_str(&req.plan)
        .filter(|p| *p != OrgPlan::Free)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown plan: {}", req.plan)))?;

    let success_url = state.config.app_url("/onboarding?checkout=success");
    let cancel_url = state.config.app_url("/onboarding?checkout=cancelled");

    let checkout = state
        .billing
        .create_checkout_session(org, plan, &success_url, &cancel_url)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    audit::record(
        &state.db,
        events::CHECKOUT_STARTED,
        &session.email,
        Some(org.id),
        serde_json::json!({ "plan": plan.as_str(), "checkout_session": checkout.id }),
        client_ip(&headers),
    )
    .await;

    Ok(Json(RedirectUrlResponse { url: checkout.url }))
}

/// Creates a billing-portal session for the session's organization
///
/// # Errors
///
/// - `409 Conflict`: The organization has never checked out
pub async fn create_portal(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<RedirectUrlResponse>> {
    let session = state.session(&headers, billing_requirements()).await?;
    let org = session
        .organization
        .as_ref()
        .ok_or_else(|| ApiError::InternalError("Session passed gating without org".to_string()))?;

    let customer_id = org.stripe_customer_id.as_deref().ok_or_else(|| {
        ApiError::Conflict("No billing account exists for this organization yet".to_string())
    })?;

    let return_url = state.config.app_url("/settings/billing");

    let portal = state
        .billing
        .create_portal_session(customer_id, &return_url)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(RedirectUrlResponse { url: portal.url }))
}

/// Values pulled out of a `checkout.session.completed` object
#[derive(Debug, PartialEq, Eq)]
struct CheckoutCompleted {
    org_id: Uuid,
    plan: Option<OrgPlan>,
    customer_id: Option<String>,
    subscription_id: Option<String>,
}

fn parse_checkout_completed(object: &JsonValue) -> Option<CheckoutCompleted> {
    let org_id = object["metadata"]["organization_id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())?;

    Some(CheckoutCompleted {
        org_id,
        plan: object["metadata"]["plan"].as_str().and_then(OrgPlan::from_str),
        customer_id: object["customer"].as_str().map(str::to_string),
        subscription_id: object["subscription"].as_str().map(str::to_string),
    })
}

/// Maps a subscription item's price id back onto a plan
fn plan_from_price(state: &AppState, object: &JsonValue) -> Option<OrgPlan> {
    let price_id = object["items"]["data"][0]["price"]["id"].as_str()?;
    let config = state.billing.config();

    if price_id == config.starter_price_id {
        Some(OrgPlan::Starter)
    } else if price_id == config.pro_price_id {
        Some(OrgPlan::Pro)
    } else {
        None
    }
}

/// Processor webhook delivery
///
/// Verifies the signature over the raw body, then maps event types onto
/// organization-row updates. Unknown event types are acknowledged and
/// logged; the processor retries on anything but a 2xx, so only signature
/// and parse failures are rejected.
///
/// # Errors
///
/// - `400 Bad Request`: Signature or payload rejected
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing signature header".to_string()))?;

    verify_webhook_signature(
        &body,
        signature,
        &state.billing.config().webhook_secret,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Webhook signature rejected");
        ApiError::BadRequest("Invalid signature".to_string())
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed event payload: {}", e)))?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing billing event");

    let object = &event.data.object;
    let updated_org = match event.event_type.as_str() {
        "checkout.session.completed" => {
            let Some(completed) = parse_checkout_completed(object) else {
                tracing::warn!(event_id = %event.id, "Checkout event without organization metadata");
                return Ok(Json(WebhookResponse { received: true }));
            };

            Organization::apply_billing_update(
                &state.db,
                completed.org_id,
                BillingUpdate {
                    plan: completed.plan,
                    stripe_customer_id: completed.customer_id.map(Some),
                    stripe_subscription_id: completed.subscription_id.map(Some),
                    subscription_status: Some(subscription_status::ACTIVE.to_string()),
                },
            )
            .await?
        }
        "customer.subscription.updated" => {
            let subscription_id = object["id"].as_str().unwrap_or_default();
            match Organization::find_by_stripe_subscription(&state.db, subscription_id).await? {
                Some(org) => {
                    Organization::apply_billing_update(
                        &state.db,
                        org.id,
                        BillingUpdate {
                            plan: plan_from_price(&state, object),
                            subscription_status: object["status"]
                                .as_str()
                                .map(str::to_string),
                            ..Default::default()
                        },
                    )
                    .await?
                }
                None => None,
            }
        }
        "customer.subscription.deleted" => {
            let subscription_id = object["id"].as_str().unwrap_or_default();
            match Organization::find_by_stripe_subscription(&state.db, subscription_id).await? {
                Some(org) => {
                    Organization::apply_billing_update(
                        &state.db,
                        org.id,
                        BillingUpdate {
                            plan: Some(OrgPlan::Free),
                            stripe_subscription_id: Some(None),
                            subscription_status: Some(
                                subscription_status::CANCELED.to_string(),
                            ),
                            ..Default::default()
                        },
                    )
                    .await?
                }
                None => None,
            }
        }
        "invoice.payment_failed" => {
            let customer_id = object["customer"].as_str().unwrap_or_default();
            match Organization::find_by_stripe_customer(&state.db, customer_id).await? {
                Some(org) => {
                    let updated = Organization::apply_billing_update(
                        &state.db,
                        org.id,
                        BillingUpdate {
                            subscription_status: Some(
                                subscription_status::PAST_DUE.to_string(),
                            ),
                            ..Default::default()
                        },
                    )
                    .await?;

                    notify_payment_failed(&state, &org).await;
                    updated
                }
                None => None,
            }
        }
        other => {
            tracing::debug!(event_type = other, "Ignoring unhandled billing event");
            None
        }
    };

    if let Some(org) = updated_org {
        state
            .cache
            .invalidate(CacheKind::Organization, &org.id.to_string())
            .await;

        audit::record(
            &state.db,
            events::SUBSCRIPTION_UPDATED,
            "stripe-webhook",
            Some(org.id),
            serde_json::json!({
                "event_id": event.id,
                "event_type": event.event_type,
                "plan": org.plan,
                "status": org.subscription_status,
            }),
            None,
        )
        .await;
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Emails the organization owner about a failed payment (best-effort)
async fn notify_payment_failed(state: &AppState, org: &Organization) {
    let memberships = match Membership::list_by_org(&state.db, org.id).await {
        Ok(memberships) => memberships,
        Err(e) => {
            tracing::warn!(org_id = %org.id, error = %e, "Owner lookup failed for payment notice");
            return;
        }
    };

    let Some(owner) = memberships.iter().find(|m| m.role == "owner" && m.is_active()) else {
        return;
    };

    match UserProfile::find_by_user_id(&state.db, owner.user_id).await {
        Ok(Some(profile)) => {
            state
                .queue
                .enqueue_best_effort(EmailJob::new(
                    &profile.email,
                    EmailTemplate::PaymentFailed {
                        organization: org.name.clone(),
                    },
                ))
                .await;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(org_id = %org.id, error = %e, "Profile lookup failed for payment notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_checkout_completed() {
        let org_id = Uuid::new_v4();
        let object = serde_json::json!({
            "customer": "cus_123",
            "subscription": "sub_456",
            "metadata": { "organization_id": org_id.to_string(), "plan": "pro" }
        });

        let parsed = parse_checkout_completed(&object).expect("Should parse");
        assert_eq!(parsed.org_id, org_id);
        assert_eq!(parsed.plan, Some(OrgPlan::Pro));
        assert_eq!(parsed.customer_id.as_deref(), Some("cus_123"));
        assert_eq!(parsed.subscription_id.as_deref(), Some("sub_456"));
    }

    #[test]
    fn test_parse_checkout_without_metadata() {
        let object = serde_json::json!({ "customer": "cus_123" });
        assert!(parse_checkout_completed(&object).is_none());
    }

    #[test]
    fn test_parse_checkout_with_unknown_plan() {
        let org_id = Uuid::new_v4();
        let object = serde_json::json!({
            "metadata": { "organization_id": org_id.to_string(), "plan": "enterprise" }
        });

        let parsed = parse_checkout_completed(&object).expect("Should parse");
        assert_eq!(parsed.plan, None);
        assert_eq!(parsed.customer_id, None);
    }
}
