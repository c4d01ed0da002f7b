use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::{info, warn};

use crate::Database;
use crate::error::{AuthError, PersistenceError};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Username → Argon2id password hash.
///
/// Hashing and verification are CPU-bound, so both run on the blocking
/// pool; the caller's task suspends while other connections carry on.
#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<Database>,
    argon2: Argon2<'static>,
}

impl CredentialStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_argon2(db, Argon2::default())
    }

    /// Use specific Argon2 parameters for new hashes. Verification always
    /// uses the parameters recorded in the stored hash.
    pub fn with_argon2(db: Arc<Database>, argon2: Argon2<'static>) -> Self {
        Self { db, argon2 }
    }

    /// Create an account. Returns the username on success.
    pub async fn register(&self, username: &str, password: &str) -> Result<String, AuthError> {
        if username.chars().count() < MIN_USERNAME_LEN || password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput);
        }

        if self
            .db
            .get_user_by_username(username)
            .map_err(PersistenceError::from)?
            .is_some()
        {
            return Err(AuthError::AlreadyExists);
        }

        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let password_hash = tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        })
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
        .map_err(|e| AuthError::Hash(e.to_string()))?;

        // Another registration for the same name may have finished while
        // we were hashing; the UNIQUE constraint settles it.
        let created_at = chrono::Utc::now().to_rfc3339();
        let inserted = self
            .db
            .create_user(username, &password_hash, &created_at)
            .map_err(PersistenceError::from)?;
        if !inserted {
            warn!("Registration race lost for {}", username);
            return Err(AuthError::AlreadyExists);
        }

        info!("User registered: {}", username);
        Ok(username.to_owned())
    }

    /// Check a password. `NotFound` if the user does not exist,
    /// `Ok(false)` on mismatch.
    pub async fn verify(&self, username: &str, password: &str) -> Result<bool, AuthError> {
        let user = self
            .db
            .get_user_by_username(username)
            .map_err(PersistenceError::from)?
            .ok_or(AuthError::NotFound)?;

        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed_hash =
                PasswordHash::new(&user.password).map_err(|e| AuthError::Hash(e.to_string()))?;
            Ok::<_, AuthError>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
    }
}

#[cfg(test)]
pub(crate) fn fast_argon2() -> Argon2<'static> {
    // Minimum cost; keeps debug-build tests quick.
    let params = argon2::Params::new(8, 1, 1, None).unwrap();
    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
}
