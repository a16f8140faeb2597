//! HTTP middleware components.

/// API key authentication middleware
pub mod auth;
