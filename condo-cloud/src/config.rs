//! Service configuration
//!
//! Loaded once at start-up from environment variables (after
//! `dotenvy::dotenv()`), then shared read-only. Numeric settings fall back
//! to their defaults when unset or unparsable; a value that parses but is
//! negative or non-finite aborts start-up.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::billing::fees::{FeeSchedule, Money};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} must be set in {environment} environment")]
    MissingSecret {
        name: &'static str,
        environment: String,
    },
    #[error("{name} must be a finite, non-negative number, got {value}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be between 0 and 100, got {value}")]
    PercentOutOfRange { name: &'static str, value: Decimal },
}

/// Stripe credentials and catalogue
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    /// Flat monthly base price (quantity 1)
    pub base_price_id: Option<String>,
    /// Per-condominium price (quantity = condo count)
    pub condo_price_id: Option<String>,
    pub supplier_pro_price_id: Option<String>,
    pub supplier_business_price_id: Option<String>,
    pub timeout: Duration,
}

/// Redirect targets for hosted checkout pages
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    pub stripe: StripeConfig,
    pub fees: FeeSchedule,
    /// ISO 4217 code, lowercase
    pub default_currency: String,
    /// Bearer token for the scheduled recalculation endpoint
    pub cron_secret: String,
    pub checkout: CheckoutUrls,
    pub store_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".into());

        let fees = FeeSchedule {
            base_fee: money(&var, "BILLING_BASE_FEE", Money::from_cents(2999))?,
            per_condo_fee: money(&var, "BILLING_PER_CONDO_FEE", Money::from_cents(800))?,
            platform_fee_percent: percent(&var, "PLATFORM_FEE_PERCENT", Decimal::new(100, 2))?,
            processor_fee_percent: percent(&var, "STRIPE_FEE_PERCENT", Decimal::new(25, 2))?,
        };

        Ok(Self {
            database_url: var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            http_port: parse_or(&var, "HTTP_PORT", 8080),
            stripe: StripeConfig {
                secret_key: require_secret(&var, "STRIPE_SECRET_KEY", &environment)?,
                webhook_secret: require_secret(&var, "STRIPE_WEBHOOK_SECRET", &environment)?,
                api_base: var("STRIPE_API_BASE")
                    .unwrap_or_else(|| "https://api.stripe.com".into()),
                base_price_id: var("STRIPE_BASE_PRICE_ID"),
                condo_price_id: var("STRIPE_CONDO_PRICE_ID"),
                supplier_pro_price_id: var("STRIPE_SUPPLIER_PRO_PRICE_ID"),
                supplier_business_price_id: var("STRIPE_SUPPLIER_BUSINESS_PRICE_ID"),
                timeout: Duration::from_secs(parse_or(&var, "STRIPE_TIMEOUT_SECS", 30)),
            },
            fees,
            default_currency: var("DEFAULT_CURRENCY")
                .map(|c| c.trim().to_ascii_lowercase())
                .unwrap_or_else(|| "eur".into()),
            cron_secret: require_secret(&var, "CRON_SECRET", &environment)?,
            checkout: CheckoutUrls {
                success_url: var("CHECKOUT_SUCCESS_URL")
                    .unwrap_or_else(|| "https://condochiaro.app/billing/success".into()),
                cancel_url: var("CHECKOUT_CANCEL_URL")
                    .unwrap_or_else(|| "https://condochiaro.app/billing/cancel".into()),
            },
            store_timeout: Duration::from_secs(parse_or(&var, "STORE_TIMEOUT_SECS", 10)),
            environment,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

/// Secrets must be set outside development; development gets a placeholder
fn require_secret(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    environment: &str,
) -> Result<String, ConfigError> {
    match var(name) {
        Some(v) => Ok(v),
        None if environment == "development" => Ok(format!("dev-{name}-not-for-production")),
        None => Err(ConfigError::MissingSecret {
            name,
            environment: environment.to_string(),
        }),
    }
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    match var(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(name, value = %raw, "Unparsable setting, using default");
            default
        }),
    }
}

/// Parse a non-negative decimal setting, keeping the literal's precision
fn decimal(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    let Some(raw) = var(name) else {
        return Ok(default);
    };
    let raw = raw.trim();
    let Ok(float) = raw.parse::<f64>() else {
        tracing::warn!(name, value = %raw, "Unparsable setting, using default");
        return Ok(default);
    };
    let invalid = || ConfigError::InvalidNumber {
        name,
        value: raw.to_string(),
    };
    if !float.is_finite() || float < 0.0 {
        return Err(invalid());
    }
    Decimal::from_str(raw)
        .ok()
        .or_else(|| Decimal::from_f64(float))
        .ok_or_else(invalid)
}

fn money(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Money,
) -> Result<Money, ConfigError> {
    let value = decimal(var, name, default.to_decimal())?;
    Money::from_decimal(value).ok_or_else(|| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}

fn percent(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    let value = decimal(var, name, default)?;
    if value > Decimal::ONE_HUNDRED {
        return Err(ConfigError::PercentOutOfRange { name, value });
    }
    Ok(value)
}
