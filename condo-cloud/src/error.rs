//! Billing error type for condo-cloud
//!
//! `BillingError` is what services return. Converting it into the
//! HTTP-facing `AppError` picks the error code and logs dependency failures
//! with their source, so handlers can simply use `?`.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

use crate::store::StoreError;
use crate::stripe::StripeError;

/// Who has to act to fix a configuration gap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    /// The payee has not finished Stripe onboarding (client-actionable)
    Payee,
    /// The platform itself is misconfigured
    Platform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Admin,
    Condominium,
    Supplier,
    Payment,
}

impl Resource {
    fn error_code(self) -> ErrorCode {
        match self {
            Self::Admin => ErrorCode::AdminNotFound,
            Self::Condominium => ErrorCode::CondominiumNotFound,
            Self::Supplier => ErrorCode::SupplierNotFound,
            Self::Payment => ErrorCode::PaymentNotFound,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Admin => "administrator",
            Self::Condominium => "condominium",
            Self::Supplier => "supplier",
            Self::Payment => "payment",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Stripe(#[from] StripeError),
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("{message}")]
    Validation { code: ErrorCode, message: String },

    #[error("{} {id} not found", resource.name())]
    NotFound { resource: Resource, id: String },

    #[error("{message}")]
    Configuration { scope: ConfigScope, message: String },

    #[error("{context}: {source}")]
    Dependency {
        context: &'static str,
        #[source]
        source: DependencyError,
    },

    #[error("webhook signature rejected: {0}")]
    Signature(String),
}

pub type BillingResult<T> = Result<T, BillingError>;

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::ValidationFailed,
            message: message.into(),
        }
    }

    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::Validation {
            code: ErrorCode::PaymentInvalidAmount,
            message: message.into(),
        }
    }

    pub fn not_found(resource: Resource, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn payee_not_connected(message: impl Into<String>) -> Self {
        Self::Configuration {
            scope: ConfigScope::Payee,
            message: message.into(),
        }
    }

    pub fn platform_config(message: impl Into<String>) -> Self {
        Self::Configuration {
            scope: ConfigScope::Platform,
            message: message.into(),
        }
    }
}

/// Attach a context label to store / Stripe failures
pub trait DependencyExt<T> {
    fn dependency(self, context: &'static str) -> BillingResult<T>;
}

impl<T, E> DependencyExt<T> for Result<T, E>
where
    E: Into<DependencyError>,
{
    fn dependency(self, context: &'static str) -> BillingResult<T> {
        self.map_err(|e| BillingError::Dependency {
            context,
            source: e.into(),
        })
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation { code, message } => AppError::with_message(code, message),
            BillingError::NotFound { resource, id } => AppError::with_message(
                resource.error_code(),
                format!("{} {id} not found", resource.name()),
            )
            .with_detail("id", id),
            BillingError::Configuration {
                scope: ConfigScope::Payee,
                message,
            } => AppError::with_message(ErrorCode::PayeeNotConnected, message),
            BillingError::Configuration {
                scope: ConfigScope::Platform,
                message,
            } => {
                tracing::error!(%message, "Platform billing configuration missing");
                AppError::config(message)
            }
            BillingError::Dependency { context, source } => match source {
                DependencyError::Stripe(e) => {
                    tracing::error!(context, error = %e, "Stripe call failed");
                    AppError::upstream(e.to_string()).with_detail("context", context)
                }
                DependencyError::Store(StoreError::Timeout(d)) => {
                    tracing::error!(context, timeout = ?d, "Store call timed out");
                    AppError::with_message(ErrorCode::TimeoutError, "store call timed out")
                }
                DependencyError::Store(e) => {
                    tracing::error!(context, error = %e, "Store call failed");
                    AppError::new(ErrorCode::DatabaseError)
                }
            },
            BillingError::Signature(reason) => {
                AppError::with_message(ErrorCode::WebhookSignatureInvalid, reason)
            }
        }
    }
}

impl IntoResponse for BillingError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
