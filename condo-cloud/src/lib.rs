//! condo-cloud : CondoChiaro billing engine
//!
//! - Prices administrator subscriptions (base + per-condominium fee) and
//!   keeps the Stripe subscription quantity in step
//! - Issues marketplace payments to administrators and suppliers through
//!   Stripe Connect destination charges, with platform fee accounting
//! - Applies Stripe webhook events idempotently

pub mod api;
pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod state;
pub mod store;
pub mod stripe;
pub mod webhook;
