//! Error types and HTTP error response handling.
//!
//! Three layers of errors live here:
//!
//! - [`AppError`]: JSON errors for the API key middleware and account lookup
//! - [`PipelineError`]: plain-text errors for the create and sign-in pipeline
//! - [`AccountError`]: failures raised by the Postgres account collaborator

use axum::{
    Json,
    http::{
        StatusCode,
        header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS},
    },
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Boxed error returned by an account collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Application-wide error type for the JSON endpoints.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Invalid or missing API keys
/// - **Resource Errors**: Requested account not found
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// Returns HTTP 500 and hides the details from the client.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing or does not belong to any account.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The authenticated account no longer exists.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Account not found")]
    AccountNotFound,
}

/// Convert AppError into an HTTP response.
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::AccountNotFound => {
                (StatusCode::NOT_FOUND, "account_not_found", self.to_string())
            }
            AppError::Database(ref err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Lifecycle operation invoked on a parsed account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOperation {
    Create,
    Login,
}

impl fmt::Display for AccountOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountOperation::Create => f.write_str("create"),
            AccountOperation::Login => f.write_str("login"),
        }
    }
}

/// Pipeline stage that produced a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transport,
    Parse,
    Operation,
    Serialization,
}

/// Failure of the read → parse → operate → serialize pipeline.
///
/// Every variant displays exactly the underlying error's text, which is what
/// the client receives as the response body.
///
/// # Status Code Mapping
///
/// - `Transport` → 400 Bad Request
/// - `Parse` → 500 Internal Server Error
/// - `Operation` → 500 Internal Server Error
/// - `Serialization` → 500 Internal Server Error
///
/// A payload the collaborator rejects is answered with 500, not 400.
/// Existing clients depend on that mapping.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The request body could not be read.
    #[error("{0}")]
    Transport(axum::Error),

    /// The collaborator rejected the raw body.
    #[error("{0}")]
    Parse(BoxError),

    /// `create` or `login` failed.
    #[error("{source}")]
    Operation {
        operation: AccountOperation,
        source: BoxError,
    },

    /// The account value could not be encoded as JSON.
    #[error("{0}")]
    Serialization(serde_json::Error),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Transport(_) => Stage::Transport,
            PipelineError::Parse(_) => Stage::Parse,
            PipelineError::Operation { .. } => Stage::Operation,
            PipelineError::Serialization(_) => Stage::Serialization,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.stage() {
            Stage::Transport => StatusCode::BAD_REQUEST,
            Stage::Parse | Stage::Operation | Stage::Serialization => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Record of a pipeline failure, attached to the error response's extensions.
///
/// Layers wrapping the account routes read it to log or count failures
/// without parsing the plain-text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub stage: Stage,
    pub message: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let stage = self.stage();
        let message = self.to_string();

        match &self {
            PipelineError::Operation { operation, .. } => {
                tracing::warn!(?stage, %operation, status = status.as_u16(), error = %message, "account request failed");
            }
            _ => {
                tracing::warn!(?stage, status = status.as_u16(), error = %message, "account request failed");
            }
        }

        let mut response = (
            status,
            [
                (CONTENT_TYPE, "text/plain; charset=utf-8"),
                (X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            message.clone(),
        )
            .into_response();

        response
            .extensions_mut()
            .insert(ErrorReport { stage, message });

        response
    }
}

/// Errors raised by the Postgres account collaborator.
///
/// The display text is sent to clients verbatim by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Request body was empty or only whitespace.
    #[error("invalid payload")]
    EmptyPayload,

    /// Request body was not a JSON account object.
    #[error("invalid payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("email is required")]
    MissingEmail,

    #[error("password is required")]
    MissingPassword,

    /// Another account already uses this email.
    #[error("account already exists")]
    AlreadyExists,

    /// Unknown email or wrong password. The two are not distinguished.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
