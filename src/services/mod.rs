//! Business logic services.
//!
//! Services sit behind the HTTP handlers and own database access.

pub mod account_service;
