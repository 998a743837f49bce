//! Login and first-login provisioning

use std::sync::Arc;

use crate::domain::{Account, Balance, NewAccount};
use crate::store::{AccountStore, StoreError};

use super::{PasswordError, PasswordHasher, TokenError, TokenManager};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Password hashing task failed: {0}")]
    Task(String),
}

/// Authenticates users, provisioning unseen usernames with the starting balance
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AccountStore>,
    hasher: PasswordHasher,
    tokens: Arc<TokenManager>,
    initial_coins: Balance,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        hasher: PasswordHasher,
        tokens: Arc<TokenManager>,
        initial_coins: Balance,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            initial_coins,
        }
    }

    /// Verify credentials (or register on first login) and issue a token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let account = match self.store.find_account_by_username(username).await? {
            Some(account) => self.check_password(account, password).await?,
            None => self.provision(username, password).await?,
        };

        let token = self.tokens.issue(account.id, &account.username)?;
        tracing::debug!(account_id = %account.id, username = %account.username, "Token issued");
        Ok(token)
    }

    async fn provision(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let hasher = self.hasher;
        let owned = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&owned))
            .await
            .map_err(|e| AuthError::Task(e.to_string()))??;

        let new = NewAccount::new(username.to_string(), password_hash, self.initial_coins);
        match self.store.create_account(new).await {
            Ok(account) => {
                tracing::info!(
                    account_id = %account.id,
                    username = %account.username,
                    initial_balance = %account.initial_balance,
                    "Account provisioned on first login"
                );
                Ok(account)
            }
            Err(e) if e.is_conflict() => {
                // Lost a race with a concurrent first login for the same name
                let account = self
                    .store
                    .find_account_by_username(username)
                    .await?
                    .ok_or(AuthError::InvalidCredentials)?;
                self.check_password(account, password).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn check_password(&self, account: Account, password: &str) -> Result<Account, AuthError> {
        let hasher = self.hasher;
        let owned = password.to_string();
        let stored = account.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&owned, &stored))
            .await
            .map_err(|e| AuthError::Task(e.to_string()))??;

        if matches {
            Ok(account)
        } else {
            tracing::debug!(username = %account.username, "Password mismatch");
            Err(AuthError::InvalidCredentials)
        }
    }
}
