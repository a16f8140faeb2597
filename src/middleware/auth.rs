//! API key authentication middleware.
//!
//! Resolves the key issued by account create/login back to its account:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and look the hash up in `accounts`
//! 3. Inject authentication context into the request
//! 4. Reject unauthorized requests with HTTP 401

use crate::{db::DbPool, error::AppError, services::account_service::hash_api_key};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// ID of the account the key was issued to
    pub account_id: Uuid,

    pub email: String,
}

/// Extract the key from an `Authorization: Bearer <key>` header value.
fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// API key authentication middleware function.
///
/// Requests without a well-formed bearer header are rejected before the
/// database is queried.
///
/// # Returns
///
/// - `Ok(Response)` if the key matches an account (calls next handler)
/// - `Err(AppError::InvalidApiKey)` otherwise (returns 401)
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Step 1: Extract the bearer token from the Authorization header
    let api_key = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AppError::InvalidApiKey)?;

    // Step 2: Hash the key the same way create/login stored it
    let key_hash = hash_api_key(api_key);

    // Step 3: Lookup the hash; rotated keys no longer match
    let (account_id, email) = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, email FROM accounts WHERE api_key_hash = $1",
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    // Step 4: Inject context so handlers can extract Extension<AuthContext>
    request
        .extensions_mut()
        .insert(AuthContext { account_id, email });

    // Step 5: Call the next middleware/handler
    Ok(next.run(request).await)
}
