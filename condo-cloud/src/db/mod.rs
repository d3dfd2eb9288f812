//! Database access layer
//!
//! Plain query functions over `&PgPool`, one module per table.
//! Services reach them through [`crate::store::PgStore`].

pub mod admins;
pub mod condominiums;
pub mod payments;
pub mod subscriptions;
pub mod suppliers;
pub mod webhook_events;
