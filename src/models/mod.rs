//! Data models representing database entities.

/// Account value and table row
pub mod account;
