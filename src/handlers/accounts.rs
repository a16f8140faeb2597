//! Account HTTP handlers.
//!
//! This module implements the account endpoints:
//! - POST /api/v1/accounts - Create a new account
//! - POST /api/v1/accounts/signin - Sign in to an existing account
//! - GET /api/v1/accounts/me - Account owning the presented API key
//!
//! Create and sign-in run the same pipeline: read the whole body, let the
//! [`AccountService`] parse it, run one lifecycle operation, then serialize
//! the account as JSON. The first failing stage ends the request with a
//! plain-text [`PipelineError`].

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    body::{Body, to_bytes},
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    db::DbPool,
    error::{AccountOperation, AppError, PipelineError},
    middleware::auth::{AuthContext, auth_middleware},
    models::account::{Account, AccountRow},
    services::account_service::AccountService,
};

pub const CREATE_PATH: &str = "/api/v1/accounts";
pub const SIGNIN_PATH: &str = "/api/v1/accounts/signin";
pub const ME_PATH: &str = "/api/v1/accounts/me";

/// State shared by the create and sign-in handlers.
pub struct PipelineState<S> {
    pub service: Arc<S>,

    /// Bodies longer than this fail the read stage.
    pub max_body_bytes: usize,
}

impl<S> Clone for PipelineState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Router for the create and sign-in endpoints.
pub fn routes<S: AccountService>(service: Arc<S>, max_body_bytes: usize) -> Router {
    Router::new()
        .route(CREATE_PATH, post(create_account::<S>))
        .route(SIGNIN_PATH, post(signin_account::<S>))
        .with_state(PipelineState {
            service,
            max_body_bytes,
        })
}

/// Router for the endpoints that need a valid API key.
///
/// The key check runs as a route layer, so unknown paths still answer 404
/// instead of 401.
pub fn authenticated_routes(pool: DbPool) -> Router<DbPool> {
    Router::new()
        .route(ME_PATH, get(current_account))
        // Apply API key authentication to every route in this group
        .route_layer(axum::middleware::from_fn_with_state(pool, auth_middleware))
}

/// Create a new account.
///
/// # Endpoint
///
/// `POST /api/v1/accounts`
///
/// # Response
///
/// - **Success (200 OK)**: serialized account, `application/json`
/// - **Error (400)**: body could not be read
/// - **Error (500)**: payload rejected, create failed or serialization failed
///
/// Errors are plain text containing only the error message.
pub async fn create_account<S: AccountService>(
    State(state): State<PipelineState<S>>,
    body: Body,
) -> Result<Response, PipelineError> {
    run_pipeline(&state, body, AccountOperation::Create).await
}

/// Sign in to an existing account.
///
/// # Endpoint
///
/// `POST /api/v1/accounts/signin`
///
/// Same pipeline and status mapping as [`create_account`], running `login`
/// instead of `create`.
pub async fn signin_account<S: AccountService>(
    State(state): State<PipelineState<S>>,
    body: Body,
) -> Result<Response, PipelineError> {
    run_pipeline(&state, body, AccountOperation::Login).await
}

async fn run_pipeline<S: AccountService>(
    state: &PipelineState<S>,
    body: Body,
    operation: AccountOperation,
) -> Result<Response, PipelineError> {
    let bytes = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(PipelineError::Transport)?;

    let mut account = state
        .service
        .parse(&bytes)
        .map_err(|err| PipelineError::Parse(Box::new(err)))?;

    let outcome = match operation {
        AccountOperation::Create => state.service.create(&mut account).await,
        AccountOperation::Login => state.service.login(&mut account).await,
    };
    outcome.map_err(|err| PipelineError::Operation {
        operation,
        source: Box::new(err),
    })?;

    let json = serde_json::to_vec(&account).map_err(PipelineError::Serialization)?;

    tracing::debug!(%operation, bytes = json.len(), "account request succeeded");

    Ok(([(CONTENT_TYPE, "application/json")], json).into_response())
}

/// Get the account that owns the presented API key.
///
/// # Endpoint
///
/// `GET /api/v1/accounts/me`
///
/// # Authentication
///
/// Requires `Authorization: Bearer <api_key>` with a key from create/login.
///
/// # Response
///
/// - **Success (200 OK)**: account without `api_key`
/// - **Error (401)**: Invalid API key
/// - **Error (404)**: Account was removed after the key was checked
pub async fn current_account(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Account>, AppError> {
    tracing::debug!(account_id = %auth.account_id, email = %auth.email, "account lookup");

    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        SELECT id, email, password_hash, first_name, last_name, phone, created_at
        FROM accounts
        WHERE id = $1
        "#,
    )
    .bind(auth.account_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::AccountNotFound)?;

    Ok(Json(row.into()))
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{
        body::Bytes,
        http::{Method, Request, StatusCode},
    };
    use serde::{Deserialize, Serialize, Serializer, ser::Error as _};
    use tower::ServiceExt;

    use super::*;
    use crate::error::{ErrorReport, Stage};

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct FakeError(String);

    #[derive(Debug, Deserialize)]
    struct FakeInput {
        email: String,
        password: String,
    }

    #[derive(Debug, Serialize)]
    struct FakeAccount {
        email: String,
        #[serde(skip_serializing)]
        password: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        #[serde(serialize_with = "fail_when_poisoned")]
        poisoned: bool,
    }

    fn fail_when_poisoned<S: Serializer>(poisoned: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        if *poisoned {
            Err(S::Error::custom("account cannot be serialized"))
        } else {
            serializer.serialize_bool(false)
        }
    }

    /// Stub collaborator recording which lifecycle operation ran.
    #[derive(Default)]
    struct FakeAccounts {
        create_error: Option<&'static str>,
        poison_serialization: bool,
        calls: Mutex<Vec<AccountOperation>>,
    }

    impl FakeAccounts {
        fn calls(&self) -> Vec<AccountOperation> {
            self.calls.lock().expect("calls mutex poisoned").clone()
        }

        fn record(&self, operation: AccountOperation) {
            self.calls.lock().expect("calls mutex poisoned").push(operation);
        }
    }

    #[async_trait]
    impl AccountService for FakeAccounts {
        type Account = FakeAccount;
        type Error = FakeError;

        fn parse(&self, body: &[u8]) -> Result<FakeAccount, FakeError> {
            if body.is_empty() {
                return Err(FakeError("invalid payload".to_string()));
            }
            let input: FakeInput =
                serde_json::from_slice(body).map_err(|err| FakeError(err.to_string()))?;
            Ok(FakeAccount {
                email: input.email,
                password: input.password,
                api_key: None,
                poisoned: self.poison_serialization,
            })
        }

        async fn create(&self, account: &mut FakeAccount) -> Result<(), FakeError> {
            self.record(AccountOperation::Create);
            if let Some(message) = self.create_error {
                return Err(FakeError(message.to_string()));
            }
            account.api_key = Some(format!("created-{}", account.email));
            Ok(())
        }

        async fn login(&self, account: &mut FakeAccount) -> Result<(), FakeError> {
            self.record(AccountOperation::Login);
            if account.password != "x" {
                return Err(FakeError("invalid email or password".to_string()));
            }
            account.api_key = Some(format!("login-{}", account.email));
            Ok(())
        }
    }

    fn post_request(path: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    async fn send(accounts: Arc<FakeAccounts>, request: Request<Body>) -> Response {
        routes(accounts, 1024).oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    const VALID_BODY: &str = r#"{"email":"a@b.com","password":"x"}"#;

    #[tokio::test]
    async fn create_returns_serialized_account() {
        let accounts = Arc::new(FakeAccounts::default());

        let response = send(
            accounts.clone(),
            post_request(CREATE_PATH, Body::from(VALID_BODY)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert!(response.extensions().get::<ErrorReport>().is_none());

        let text = body_text(response).await;
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["email"], "a@b.com");
        assert_eq!(json["api_key"], "created-a@b.com");
        assert!(json.get("password").is_none());
        assert!(!text.contains("\"x\""));

        assert_eq!(accounts.calls(), vec![AccountOperation::Create]);
    }

    #[tokio::test]
    async fn signin_runs_login_not_create() {
        let accounts = Arc::new(FakeAccounts::default());

        let response = send(
            accounts.clone(),
            post_request(SIGNIN_PATH, Body::from(VALID_BODY)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["api_key"], "login-a@b.com");

        assert_eq!(accounts.calls(), vec![AccountOperation::Login]);
    }

    #[tokio::test]
    async fn empty_body_parse_error_is_500_with_exact_message() {
        let accounts = Arc::new(FakeAccounts::default());

        let response = send(accounts.clone(), post_request(CREATE_PATH, Body::empty())).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.extensions().get::<ErrorReport>().map(|r| r.stage),
            Some(Stage::Parse)
        );
        assert_eq!(body_text(response).await, "invalid payload");
        assert!(accounts.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_500_not_400() {
        let accounts = Arc::new(FakeAccounts::default());

        let response = send(
            accounts.clone(),
            post_request(SIGNIN_PATH, Body::from("{\"email\":")),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_text(response).await.is_empty());
        assert!(accounts.calls().is_empty());
    }

    #[tokio::test]
    async fn create_failure_is_500_with_exact_message() {
        let accounts = Arc::new(FakeAccounts {
            create_error: Some("account already exists"),
            ..FakeAccounts::default()
        });

        let response = send(
            accounts.clone(),
            post_request(CREATE_PATH, Body::from(VALID_BODY)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<ErrorReport>().map(|r| r.stage),
            Some(Stage::Operation)
        );
        assert_eq!(body_text(response).await, "account already exists");
    }

    #[tokio::test]
    async fn login_failure_is_500_with_exact_message() {
        let accounts = Arc::new(FakeAccounts::default());

        let response = send(
            accounts.clone(),
            post_request(
                SIGNIN_PATH,
                Body::from(r#"{"email":"a@b.com","password":"wrong"}"#),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "invalid email or password");
        assert_eq!(accounts.calls(), vec![AccountOperation::Login]);
    }

    #[tokio::test]
    async fn serialization_failure_is_500_with_serializer_message() {
        let accounts = Arc::new(FakeAccounts {
            poison_serialization: true,
            ..FakeAccounts::default()
        });

        let response = send(
            accounts.clone(),
            post_request(CREATE_PATH, Body::from(VALID_BODY)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.extensions().get::<ErrorReport>().map(|r| r.stage),
            Some(Stage::Serialization)
        );
        assert_eq!(body_text(response).await, "account cannot be serialized");
        assert_eq!(accounts.calls(), vec![AccountOperation::Create]);
    }

    #[tokio::test]
    async fn interrupted_body_is_400_with_transport_message() {
        let accounts = Arc::new(FakeAccounts::default());
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"email\":")),
            Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let response = send(accounts.clone(), post_request(CREATE_PATH, body)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_ne!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            response.extensions().get::<ErrorReport>().map(|r| r.stage),
            Some(Stage::Transport)
        );
        assert_eq!(body_text(response).await, "connection reset by peer");
        assert!(accounts.calls().is_empty());
    }

    #[tokio::test]
    async fn oversized_body_fails_the_read_stage() {
        let accounts = Arc::new(FakeAccounts::default());
        let padding = "a".repeat(2048);
        let body = format!(r#"{{"email":"{padding}@b.com","password":"x"}}"#);

        let response = send(accounts.clone(), post_request(CREATE_PATH, Body::from(body))).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!body_text(response).await.is_empty());
        assert!(accounts.calls().is_empty());
    }

    #[tokio::test]
    async fn repeated_requests_share_no_state() {
        let accounts = Arc::new(FakeAccounts::default());

        let first = send(
            accounts.clone(),
            post_request(CREATE_PATH, Body::from(VALID_BODY)),
        )
        .await;
        let second = send(
            accounts.clone(),
            post_request(
                CREATE_PATH,
                Body::from(r#"{"email":"c@d.com","password":"y"}"#),
            ),
        )
        .await;

        let first: serde_json::Value = serde_json::from_str(&body_text(first).await).unwrap();
        let second: serde_json::Value = serde_json::from_str(&body_text(second).await).unwrap();
        assert_eq!(first["email"], "a@b.com");
        assert_eq!(second["email"], "c@d.com");
        assert_eq!(
            accounts.calls(),
            vec![AccountOperation::Create, AccountOperation::Create]
        );
    }
}
