//! Health check endpoint for service monitoring.
//!
//! Reports whether a pooled connection can run a query and how busy the
//! pool is. An unreachable database answers 503 so load balancers can
//! take the instance out of rotation.

use crate::db::DbPool;
use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health report returned by `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// "healthy" or "degraded"
    pub status: &'static str,

    pub database: PoolHealth,

    pub checked_at: DateTime<Utc>,
}

/// Connection pool snapshot taken after the ping.
#[derive(Debug, Serialize)]
pub struct PoolHealth {
    /// "connected" or "unavailable"
    pub state: &'static str,

    /// Open connections, idle or in use
    pub connections: u32,

    pub idle_connections: usize,

    pub max_connections: u32,
}

/// Health check handler.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "database": {
///     "state": "connected",
///     "connections": 2,
///     "idle_connections": 1,
///     "max_connections": 5
///   },
///   "checked_at": "2025-12-21T19:00:00Z"
/// }
/// ```
///
/// # Response (503 Service Unavailable)
///
/// Same shape with `"status": "degraded"` and `"state": "unavailable"`.
pub async fn health_check(State(pool): State<DbPool>) -> (StatusCode, Json<HealthReport>) {
    let ping = sqlx::query("SELECT 1").execute(&pool).await;

    let (status_code, status, state) = match ping {
        Ok(_) => (StatusCode::OK, "healthy", "connected"),
        Err(err) => {
            tracing::warn!(error = %err, "health check could not reach the database");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        }
    };

    let report = HealthReport {
        status,
        database: PoolHealth {
            state,
            connections: pool.size(),
            idle_connections: pool.num_idle(),
            max_connections: pool.options().get_max_connections(),
        },
        checked_at: Utc::now(),
    };

    (status_code, Json(report))
}
