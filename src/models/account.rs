//! Account data model.
//!
//! This module defines:
//! - `Account`: the value parsed from request bodies and serialized back
//! - `AccountRow`: an `accounts` table row including the password hash

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AccountError;

/// Account value exchanged with clients.
///
/// # JSON Example (request)
///
/// ```json
/// {
///   "email": "ada@example.com",
///   "password": "correct horse battery staple",
///   "first_name": "Ada"
/// }
/// ```
///
/// # JSON Example (response)
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "email": "ada@example.com",
///   "first_name": "Ada",
///   "api_key": "9f86d081884c7d65...",
///   "created_at": "2025-12-20T10:00:00Z"
/// }
/// ```
///
/// The password is read from requests but never written back out. Server
/// assigned fields (`id`, `api_key`, `created_at`) are ignored on input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    #[serde(default)]
    pub email: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// API key issued by the last create or login.
    ///
    /// Only the SHA-256 hash is stored, so this is the one chance the client
    /// has to see the key.
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Parse a request body into an account.
    ///
    /// The email is trimmed and lowercased. Both email and password must be
    /// present.
    pub fn from_json(body: &[u8]) -> Result<Self, AccountError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AccountError::EmptyPayload);
        }

        let mut account: Account =
            serde_json::from_slice(body).map_err(AccountError::MalformedPayload)?;

        account.email = account.email.trim().to_lowercase();

        if account.email.is_empty() {
            return Err(AccountError::MissingEmail);
        }
        if account.password.is_empty() {
            return Err(AccountError::MissingPassword);
        }

        Ok(account)
    }

    /// Copy stored fields from a database row onto this account.
    ///
    /// The password supplied by the client is left untouched.
    pub fn apply_row(&mut self, row: AccountRow) {
        self.id = Some(row.id);
        self.email = row.email;
        self.first_name = row.first_name;
        self.last_name = row.last_name;
        self.phone = row.phone;
        self.created_at = Some(row.created_at);
    }
}

/// Represents an account record from the database.
///
/// Maps to the `accounts` table. The API key hash is never selected into
/// this struct; it is only written and matched in SQL.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub id: Uuid,

    /// Lowercased, unique
    pub email: String,

    /// Argon2id PHC string
    pub password_hash: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let mut account = Account::default();
        account.apply_row(row);
        account
    }
}
