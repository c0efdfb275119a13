//! Authentication service

use crate::facade::Storage;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use std::sync::Arc;
use vitals_core::{NewUser, Result, Role, StoreError, User};

/// Minimum password length accepted by [`AuthService`]
pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash a password into a PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| StoreError::Backend(format!("Failed to hash password: {}", e)))?
        .to_string();
    Ok(hash)
}

/// Check a password against a stored PHC string.
///
/// Hashes that do not parse never match.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is not a valid PHC string: {}", e);
            false
        }
    }
}

fn check_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StoreError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub struct AuthService {
    storage: Arc<Storage>,
}

impl AuthService {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn register(&self, username: &str, password: &str, role: Role) -> Result<User> {
        check_password_strength(password)?;
        let password_hash = hash_password(password)?;
        let user = self
            .storage
            .create_user(&NewUser::new(username, password_hash, role))
            .await?;

        tracing::info!("Registered {} account {}", user.role, user.username);
        Ok(user)
    }

    /// Verify credentials.
    ///
    /// Unknown users and wrong passwords both yield `AuthenticationFailed`.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let credentials = match self.storage.get_user_by_username(username).await {
            Ok(credentials) => credentials,
            Err(StoreError::NotFound(_)) => return Err(StoreError::AuthenticationFailed),
            Err(e) => return Err(e),
        };

        if verify_password(password, &credentials.password_hash) {
            Ok(credentials.user)
        } else {
            Err(StoreError::AuthenticationFailed)
        }
    }

    pub async fn change_password(&self, user_id: i64, new_password: &str) -> Result<()> {
        check_password_strength(new_password)?;
        let password_hash = hash_password(new_password)?;
        self.storage
            .update_user_password(user_id, &password_hash)
            .await?;

        tracing::info!("Password changed for user {}", user_id);
        Ok(())
    }
}
