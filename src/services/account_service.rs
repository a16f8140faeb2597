//! Account collaborator used by the create and sign-in pipeline.
//!
//! The pipeline only knows the [`AccountService`] trait. [`PgAccountService`]
//! is the PostgreSQL-backed implementation wired up in `main`.
//!
//! # Credentials
//!
//! - Passwords are stored as Argon2id PHC strings
//! - API keys are 64 hex characters (32 random bytes); only their SHA-256
//!   hash is stored, and every create or login issues a fresh key

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AccountError,
    models::account::{Account, AccountRow},
};

/// Parse, create and login operations the pipeline delegates to.
///
/// `create` and `login` may mutate the account; whatever state it is left in
/// is what the client receives.
#[async_trait]
pub trait AccountService: Send + Sync + 'static {
    type Account: Serialize + Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Build an account value from a raw request body.
    fn parse(&self, body: &[u8]) -> Result<Self::Account, Self::Error>;

    async fn create(&self, account: &mut Self::Account) -> Result<(), Self::Error>;

    async fn login(&self, account: &mut Self::Account) -> Result<(), Self::Error>;
}

/// Account collaborator backed by the `accounts` table.
#[derive(Debug, Clone)]
pub struct PgAccountService {
    pool: DbPool,
}

impl PgAccountService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountService for PgAccountService {
    type Account = Account;
    type Error = AccountError;

    fn parse(&self, body: &[u8]) -> Result<Account, AccountError> {
        Account::from_json(body)
    }

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists`: email is taken
    /// - `Hashing`: password could not be hashed
    /// - `Database`: any other database failure
    async fn create(&self, account: &mut Account) -> Result<(), AccountError> {
        let password_hash = hash_password(&account.password)?;
        let api_key = generate_api_key();

        let (id, created_at) = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            INSERT INTO accounts (email, password_hash, api_key_hash, first_name, last_name, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, created_at
            "#,
        )
        .bind(&account.email)
        .bind(&password_hash)
        .bind(hash_api_key(&api_key))
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AccountError::AlreadyExists
            }
            other => AccountError::Database(other),
        })?;

        account.id = Some(id);
        account.api_key = Some(api_key);
        account.created_at = Some(created_at);

        tracing::info!(account_id = %id, "account created");

        Ok(())
    }

    /// Verify credentials and rotate the account's API key.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials`: unknown email or wrong password
    /// - `Hashing`: stored hash is unreadable
    /// - `Database`: database failure
    async fn login(&self, account: &mut Account) -> Result<(), AccountError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, phone, created_at
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(&account.email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            // Keep timing close to the known-email path
            let _ = verify_password(&account.password, DUMMY_PASSWORD_HASH);
            return Err(AccountError::InvalidCredentials);
        };

        verify_password(&account.password, &row.password_hash)?;

        let api_key = generate_api_key();
        sqlx::query("UPDATE accounts SET api_key_hash = $1 WHERE id = $2")
            .bind(hash_api_key(&api_key))
            .bind(row.id)
            .execute(&self.pool)
            .await?;

        tracing::info!(account_id = %row.id, "account signed in");

        account.apply_row(row);
        account.api_key = Some(api_key);

        Ok(())
    }
}

const DUMMY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$MDEyMzQ1Njc4OWFiY2RlZg$gwN6hT1sNdk9kI95f7n2Gl3fL0qRmBf2Ffkj2r90/0M";

fn argon2() -> Result<Argon2<'static>, AccountError> {
    let params =
        Params::new(19 * 1024, 2, 1, None).map_err(|err| AccountError::Hashing(err.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into an Argon2id PHC string with a random salt.
pub fn hash_password(raw_password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = argon2()?
        .hash_password(raw_password.as_bytes(), &salt)
        .map_err(|err| AccountError::Hashing(err.to_string()))?;
    Ok(password_hash.to_string())
}

/// Check a password against a stored PHC string.
///
/// A mismatch is `InvalidCredentials`; an unreadable hash is `Hashing`.
pub fn verify_password(raw_password: &str, password_hash: &str) -> Result<(), AccountError> {
    let parsed_hash =
        PasswordHash::new(password_hash).map_err(|err| AccountError::Hashing(err.to_string()))?;
    argon2()?
        .verify_password(raw_password.as_bytes(), &parsed_hash)
        .map_err(|err| match err {
            PasswordHashError::Password => AccountError::InvalidCredentials,
            _ => AccountError::Hashing(err.to_string()),
        })
}

/// Generate a new API key: 64 hex characters (32 random bytes).
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// SHA-256 hash of an API key, hex encoded. This is what gets stored.
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}
