/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Authentication flows (register, verify, login, magic link, reset)
/// - `session`: Derived session view
/// - `onboarding`: Organization creation, wizard draft, completion
/// - `billing`: Checkout, portal, and webhook reconciliation
/// - `consent`: Cookie/terms consent recording and withdrawal
/// - `email_preferences`: Marketing opt-outs and unsubscribe

pub mod auth;
pub mod billing;
pub mod consent;
pub mod email_preferences;
pub mod health;
pub mod onboarding;
pub mod session;
