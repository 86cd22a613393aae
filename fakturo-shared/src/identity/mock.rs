/// In-memory identity provider for tests and local development
///
/// Stores users in a `RwLock<HashMap>` and implements the full
/// `IdentityProvider` contract: password sign-in verifies the stored
/// Argon2id hash for real, and issued access tokens are genuine HS256 JWTs
/// signed with the mock's secret, so session-derivation code paths behave
/// exactly as they do against the hosted provider.
///
/// # Example
///
/// ```
/// use fakturo_shared::identity::{IdentityProvider, NewProviderUser};
/// use fakturo_shared::identity::mock::MockIdentityProvider;
/// use fakturo_shared::identity::password::hash_password;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let provider = MockIdentityProvider::new("test-secret-key-at-least-32-bytes-long");
///
/// provider.create_user(NewProviderUser {
///     email: "a@b.com".to_string(),
///     password_hash: hash_password("Abcdef1!")?,
///     email_confirmed: true,
///     user_metadata: serde_json::json!({}),
/// }).await?;
///
/// let session = provider.sign_in_with_password("a@b.com", "Abcdef1!").await?;
/// assert_eq!(session.user.email, "a@b.com");
/// # Ok(())
/// # }
/// ```

use super::jwt::{sign_access_token, AccessClaims};
use super::password::verify_password;
use super::{IdentityError, IdentityProvider, NewProviderUser, ProviderSession, ProviderUser};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;

#[derive(Clone)]
struct StoredUser {
    user: ProviderUser,
    password_hash: String,
}

/// In-memory implementation of `IdentityProvider`
#[derive(Clone)]
pub struct MockIdentityProvider {
    users: Arc<RwLock<HashMap<Uuid, StoredUser>>>,
    jwt_secret: String,
}

impl MockIdentityProvider {
    /// Creates an empty mock provider signing tokens with `jwt_secret`
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            jwt_secret: jwt_secret.to_string(),
        }
    }

    /// Number of users currently stored
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    async fn find_by_email(&self, email: &str) -> Option<StoredUser> {
        self.users
            .read()
            .await
            .values()
            .find(|s| s.user.email.eq_ignore_ascii_case(email))
            .cloned()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<ProviderUser>, IdentityError> {
        Ok(self.users.read().await.get(&id).map(|s| s.user.clone()))
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ProviderUser>, IdentityError> {
        Ok(self.find_by_email(email).await.map(|s| s.user))
    }

    async fn create_user(&self, data: NewProviderUser) -> Result<ProviderUser, IdentityError> {
        if self.find_by_email(&data.email).await.is_some() {
            return Err(IdentityError::Conflict);
        }

        let user = ProviderUser {
            id: Uuid::new_v4(),
            email: data.email,
            email_confirmed_at: data.email_confirmed.then(Utc::now),
            user_metadata: data.user_metadata,
            created_at: Utc::now(),
        };

        self.users.write().await.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash: data.password_hash,
            },
        );

        Ok(user)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, IdentityError> {
        let stored = self
            .find_by_email(email)
            .await
            .ok_or(IdentityError::InvalidCredentials)?;

        let valid = verify_password(password, &stored.password_hash)
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;
        if !valid {
            return Err(IdentityError::InvalidCredentials);
        }

        let claims = AccessClaims::new(
            stored.user.id,
            stored.user.email.clone(),
            stored.user.is_confirmed(),
            ACCESS_TOKEN_TTL_SECONDS,
        );
        let access_token = sign_access_token(&claims, &self.jwt_secret)
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        Ok(ProviderSession {
            access_token,
            refresh_token: hex::encode(Uuid::new_v4().as_bytes()),
            expires_in: ACCESS_TOKEN_TTL_SECONDS as u64,
            user: stored.user,
        })
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn generate_magic_link(&self, email: &str) -> Result<String, IdentityError> {
        let stored = self
            .find_by_email(email)
            .await
            .ok_or(IdentityError::UserNotFound)?;

        Ok(format!(
            "https://auth.mock.local/verify?type=magiclink&token={}",
            hex::encode(stored.user.id.as_bytes())
        ))
    }

    async fn update_password(&self, user_id: Uuid, password: &str) -> Result<(), IdentityError> {
        use super::password::hash_password;

        let mut users = self.users.write().await;
        let stored = users.get_mut(&user_id).ok_or(IdentityError::UserNotFound)?;

        stored.password_hash =
            hash_password(password).map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::jwt::verify_access_token;
    use crate::identity::password::hash_password;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn new_user(email: &str, password: &str, confirmed: bool) -> NewProviderUser {
        NewProviderUser {
            email: email.to_string(),
            password_hash: hash_password(password).expect("Hash should succeed"),
            email_confirmed: confirmed,
            user_metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let provider = MockIdentityProvider::new(SECRET);
        let user = provider
            .create_user(new_user("a@b.com", "Abcdef1!", true))
            .await
            .expect("Create should succeed");

        let by_id = provider.get_user_by_id(user.id).await.unwrap();
        assert_eq!(by_id.unwrap().email, "a@b.com");

        let by_email = provider.get_user_by_email("A@B.COM").await.unwrap();
        assert_eq!(by_email.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let provider = MockIdentityProvider::new(SECRET);
        provider
            .create_user(new_user("a@b.com", "Abcdef1!", true))
            .await
            .unwrap();

        let result = provider
            .create_user(new_user("a@b.com", "Other1Pw!", true))
            .await;
        assert!(matches!(result, Err(IdentityError::Conflict)));
    }

    #[tokio::test]
    async fn test_sign_in_verifies_password() {
        let provider = MockIdentityProvider::new(SECRET);
        provider
            .create_user(new_user("a@b.com", "Abcdef1!", true))
            .await
            .unwrap();

        let session = provider
            .sign_in_with_password("a@b.com", "Abcdef1!")
            .await
            .expect("Sign-in should succeed");

        let claims = verify_access_token(&session.access_token, SECRET)
            .expect("Token should verify");
        assert_eq!(claims.email, "a@b.com");
        assert!(claims.email_confirmed);

        let wrong = provider.sign_in_with_password("a@b.com", "Wrong1Pw!").await;
        assert!(matches!(wrong, Err(IdentityError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_magic_link_requires_user() {
        let provider = MockIdentityProvider::new(SECRET);
        let result = provider.generate_magic_link("nobody@b.com").await;
        assert!(matches!(result, Err(IdentityError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_update_password() {
        let provider = MockIdentityProvider::new(SECRET);
        let user = provider
            .create_user(new_user("a@b.com", "Abcdef1!", true))
            .await
            .unwrap();

        provider
            .update_password(user.id, "NewPass1!")
            .await
            .expect("Update should succeed");

        assert!(provider
            .sign_in_with_password("a@b.com", "NewPass1!")
            .await
            .is_ok());
        assert!(provider
            .sign_in_with_password("a@b.com", "Abcdef1!")
            .await
            .is_err());
    }
}
