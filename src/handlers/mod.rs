//! HTTP request handlers (route handlers).

/// Account create, sign-in and lookup endpoints
pub mod accounts;
/// Service health endpoint
pub mod health;
