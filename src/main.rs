//! Account Gateway - Main Application Entry Point
//!
//! A small HTTP service for creating accounts and signing in to them. Both
//! endpoints read the raw JSON body, hand it to an account collaborator,
//! run one lifecycle operation and write the account back as JSON.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Credentials**: Argon2id password hashes, SHA-256 hashed API keys
//! - **Format**: JSON on success, plain text on pipeline errors
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod services;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::services::account_service::PgAccountService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging. Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!(
        port = config.server_port,
        max_body_bytes = config.max_body_bytes,
        "Configuration loaded"
    );

    // Create database pool
    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Account collaborator used by create and sign-in
    let accounts = Arc::new(PgAccountService::new(pool.clone()));

    let app = Router::new()
        // Public routes (no authentication required)
        .route("/health", get(handlers::health::health_check))
        // Routes behind the API key middleware
        .merge(handlers::accounts::authenticated_routes(pool.clone()))
        // Share database pool with health and lookup handlers
        .with_state(pool)
        // Create and sign-in carry their own state
        .merge(handlers::accounts::routes(accounts, config.max_body_bytes))
        // Add request tracing middleware for observability
        .layer(TraceLayer::new_for_http());

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Serve requests concurrently until the process is stopped
    axum::serve(listener, app).await?;

    Ok(())
}
