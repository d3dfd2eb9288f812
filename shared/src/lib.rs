//! Shared types for CondoChiaro services
//!
//! Error types, response structures, billing status enums and small
//! utilities used by condo-cloud and its tooling.

pub mod billing;
pub mod error;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
