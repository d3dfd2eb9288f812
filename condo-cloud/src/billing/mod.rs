//! Billing services
//!
//! - [`fees`]: pure fee arithmetic
//! - [`recalculator`]: condominium-count subscription pricing
//! - [`payments`]: marketplace payment issuing
//! - [`checkout`]: recurring plan checkout sessions
//! - [`overview`]: read-only dashboard summary

pub mod checkout;
pub mod fees;
pub mod overview;
pub mod payments;
pub mod recalculator;

pub use fees::{FeeSchedule, Money, PlatformFees, SubscriptionPricing};
pub use payments::PaymentIssuer;
pub use recalculator::SubscriptionRecalculator;
