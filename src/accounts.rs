//! Email + password accounts.
//!
//! This module defines the `AccountProvider` trait that stands between the
//! directory and whatever holds credentials. Creating an account returns the
//! new account's id and nothing else: it never signs the new account in, so
//! an administrator creating accounts keeps acting as themselves.

use std::collections::HashMap;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::directory::UserId;
use crate::error::{BarangayError, Result};

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Trait for credential storage and sign-in.
///
/// # Errors
/// - `create_account` fails with `EmailAlreadyInUse` for a taken email and
///   with `Validation` for a malformed email or a weak password.
/// - `authenticate` fails with `InvalidCredentials` for an unknown email or
///   wrong password; the two cases are not distinguished.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// Create an account and return its id. Does not start a session.
    async fn create_account(&self, email: &str, password: &str) -> Result<UserId>;

    /// Check a password and return the account id it belongs to.
    async fn authenticate(&self, email: &str, password: &str) -> Result<UserId>;

    /// Remove an account. Removing an unknown account is not an error.
    async fn delete_account(&self, id: UserId) -> Result<()>;
}

/// Lowercase and trim an email, rejecting anything without a local part and
/// a domain.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(BarangayError::Validation(format!(
            "'{}' is not a valid email address",
            email
        ))),
    }
}

#[derive(Debug, Clone)]
struct StoredAccount {
    id: UserId,
    password_hash: String,
}

/// Account provider keeping argon2 password hashes in memory.
#[derive(Default)]
pub struct InMemoryAccountProvider {
    accounts: Mutex<HashMap<String, StoredAccount>>,
}

impl InMemoryAccountProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.lock().len()
    }

    fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to encode salt: {}", e))?;
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
        Ok(hash.to_string())
    }
}

#[async_trait]
impl AccountProvider for InMemoryAccountProvider {
    #[tracing::instrument(skip(self, password))]
    async fn create_account(&self, email: &str, password: &str) -> Result<UserId> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BarangayError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        // Hash outside the lock.
        let password_hash = Self::hash_password(password)?;

        let mut accounts = self.accounts.lock();
        if accounts.contains_key(&email) {
            return Err(BarangayError::EmailAlreadyInUse(email));
        }
        let id = UserId(Uuid::new_v4());
        accounts.insert(email, StoredAccount { id, password_hash });
        tracing::info!(user_id = %id, "Account created");
        Ok(id)
    }

    #[tracing::instrument(skip(self, password))]
    async fn authenticate(&self, email: &str, password: &str) -> Result<UserId> {
        let email = email.trim().to_lowercase();
        let account = self
            .accounts
            .lock()
            .get(&email)
            .cloned()
            .ok_or(BarangayError::InvalidCredentials)?;

        let parsed = PasswordHash::new(&account.password_hash)
            .map_err(|e| anyhow::anyhow!("Stored password hash is corrupt: {}", e))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| {
                tracing::debug!("Password verification failed");
                BarangayError::InvalidCredentials
            })?;
        Ok(account.id)
    }

    async fn delete_account(&self, id: UserId) -> Result<()> {
        self.accounts.lock().retain(|_, account| account.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let provider = InMemoryAccountProvider::new();
        let id = provider
            .create_account(" Secretary@Barangay.ph ", "hunter22")
            .await
            .unwrap();

        assert_eq!(
            provider
                .authenticate("secretary@barangay.ph", "hunter22")
                .await
                .unwrap(),
            id
        );
        assert!(matches!(
            provider
                .authenticate("secretary@barangay.ph", "wrong-password")
                .await,
            Err(BarangayError::InvalidCredentials)
        ));
        assert!(matches!(
            provider.authenticate("nobody@barangay.ph", "hunter22").await,
            Err(BarangayError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let provider = InMemoryAccountProvider::new();
        provider
            .create_account("resident@example.com", "secret1")
            .await
            .unwrap();
        let err = provider
            .create_account("RESIDENT@example.com", "secret2")
            .await
            .unwrap_err();
        assert!(matches!(err, BarangayError::EmailAlreadyInUse(_)));
        assert_eq!(provider.account_count(), 1);
    }

    #[tokio::test]
    async fn test_weak_password_and_bad_email() {
        let provider = InMemoryAccountProvider::new();
        assert!(matches!(
            provider.create_account("a@b.ph", "12345").await,
            Err(BarangayError::Validation(_))
        ));
        assert!(matches!(
            provider.create_account("not-an-email", "123456").await,
            Err(BarangayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_account() {
        let provider = InMemoryAccountProvider::new();
        let id = provider.create_account("x@y.ph", "password").await.unwrap();
        provider.delete_account(id).await.unwrap();
        assert!(provider.authenticate("x@y.ph", "password").await.is_err());
        // unknown ids are ignored
        provider.delete_account(id).await.unwrap();
    }
}
