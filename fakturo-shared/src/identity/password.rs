/// Password hashing for the registration flow
///
/// Login passwords are verified by the identity provider, never here. This
/// module exists for one hand-off: the registration form's password is
/// hashed with Argon2id before it is parked on `pending_registrations`, and
/// the hash is passed to the provider's admin create on verification. The
/// mock provider also uses `verify_password` so flow tests exercise the
/// real hand-off.
///
/// # Example
///
/// ```
/// use fakturo_shared::identity::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Abcdef1!")?;
/// assert!(verify_password("Abcdef1!", &hash)?);
/// assert!(!verify_password("wrong", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Failed to verify password
    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    /// Invalid password hash format
    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

/// Hashes a password using Argon2id with the default parameters
///
/// The hash goes to the identity provider, which accepts PHC-format
/// Argon2id strings, so parameters must stay within what it supports.
/// Defaults (19 MiB, 2 iterations) are fine.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verifies a password against an Argon2id hash
///
/// # Returns
///
/// `Ok(true)` if the password matches, `Ok(false)` if it doesn't
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| PasswordError::InvalidHash(format!("Failed to parse hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(format!(
            "Verification failed: {}",
            e
        ))),
    }
}

/// Validates password strength for the registration form
///
/// Requirements: at least 8 characters, one uppercase, one lowercase, one
/// digit. Matches the provider's own policy so a password accepted here is
/// accepted there.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_numeric()) {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_format() {
        let hash = hash_password("Abcdef1!").expect("Hash should succeed");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_hash_produces_different_salts() {
        let hash1 = hash_password("same_password").expect("Hash 1 should succeed");
        let hash2 = hash_password("same_password").expect("Hash 2 should succeed");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_password_roundtrip() {
        let hash = hash_password("Abcdef1!").expect("Hash should succeed");
        assert!(verify_password("Abcdef1!", &hash).expect("Verify should succeed"));
        assert!(!verify_password("Abcdef2!", &hash).expect("Verify should succeed"));
    }

    #[test]
    fn test_verify_invalid_hash() {
        assert!(verify_password("password", "not-a-hash").is_err());
    }

    #[test]
    fn test_strength_accepts_spec_example() {
        assert!(validate_password_strength("Abcdef1!").is_ok());
    }

    #[test]
    fn test_strength_rejections() {
        assert!(validate_password_strength("Ab1!").is_err());
        assert!(validate_password_strength("abcdef1!").is_err());
        assert!(validate_password_strength("ABCDEF1!").is_err());
        assert!(validate_password_strength("Abcdefg!").is_err());
    }
}
