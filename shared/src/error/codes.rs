//! Unified error codes for CondoChiaro services
//!
//! This module defines all error codes shared between condo-cloud and the
//! web frontend. Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 3xxx: Account errors (administrators, condominiums, suppliers)
//! - 4xxx: Subscription errors
//! - 5xxx: Payment errors
//! - 6xxx: Webhook errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 3xxx: Account ====================
    /// Administrator not found
    AdminNotFound = 3001,
    /// Condominium not found
    CondominiumNotFound = 3002,
    /// Supplier not found
    SupplierNotFound = 3003,

    // ==================== 4xxx: Subscription ====================
    /// Unknown or non-purchasable plan
    InvalidPlan = 4002,

    // ==================== 5xxx: Payment ====================
    /// Payment amount is not a positive finite number
    PaymentInvalidAmount = 5002,
    /// Payment record not found
    PaymentNotFound = 5003,
    /// Payee has no connected Stripe account
    PayeeNotConnected = 5004,
    /// Unknown payment status
    PaymentInvalidStatus = 5006,

    // ==================== 6xxx: Webhook ====================
    /// Webhook signature missing or invalid
    WebhookSignatureInvalid = 6001,
    /// Webhook payload could not be parsed
    WebhookPayloadInvalid = 6002,

    // ==================== 9xxx: System ====================
    /// Database error
    DatabaseError = 9002,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// Upstream provider (Stripe) returned an error
    UpstreamError = 9006,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",

            // Auth
            ErrorCode::NotAuthenticated => "Caller is not authenticated",
            ErrorCode::TokenInvalid => "Authentication token is invalid",

            // Account
            ErrorCode::AdminNotFound => "Administrator not found",
            ErrorCode::CondominiumNotFound => "Condominium not found",
            ErrorCode::SupplierNotFound => "Supplier not found",

            // Subscription
            ErrorCode::InvalidPlan => "Plan is not available for purchase",

            // Payment
            ErrorCode::PaymentInvalidAmount => "Payment amount must be a positive number",
            ErrorCode::PaymentNotFound => "Payment not found",
            ErrorCode::PayeeNotConnected => "Payee has no connected payout account",
            ErrorCode::PaymentInvalidStatus => "Unknown payment status",

            // Webhook
            ErrorCode::WebhookSignatureInvalid => "Webhook signature is missing or invalid",
            ErrorCode::WebhookPayloadInvalid => "Webhook payload is malformed",

            // System
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::UpstreamError => "Payment provider error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Account
            3001 => Ok(ErrorCode::AdminNotFound),
            3002 => Ok(ErrorCode::CondominiumNotFound),
            3003 => Ok(ErrorCode::SupplierNotFound),

            // Subscription
            4002 => Ok(ErrorCode::InvalidPlan),

            // Payment
            5002 => Ok(ErrorCode::PaymentInvalidAmount),
            5003 => Ok(ErrorCode::PaymentNotFound),
            5004 => Ok(ErrorCode::PayeeNotConnected),
            5006 => Ok(ErrorCode::PaymentInvalidStatus),

            // Webhook
            6001 => Ok(ErrorCode::WebhookSignatureInvalid),
            6002 => Ok(ErrorCode::WebhookPayloadInvalid),

            // System
            9002 => Ok(ErrorCode::DatabaseError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),
            9006 => Ok(ErrorCode::UpstreamError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
