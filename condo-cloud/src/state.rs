//! Application state for condo-cloud

use std::sync::Arc;

use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::billing::checkout::{CheckoutService, PriceCatalog};
use crate::billing::{FeeSchedule, PaymentIssuer, SubscriptionRecalculator};
use crate::config::Config;
use crate::store::{BillingStore, PgStore};
use crate::stripe::{PaymentProcessor, StripeClient};
use crate::webhook::WebhookProcessor;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BillingStore>,
    pub fees: FeeSchedule,
    pub recalculator: SubscriptionRecalculator,
    pub payments: Arc<PaymentIssuer>,
    pub checkout: Arc<CheckoutService>,
    pub webhooks: WebhookProcessor,
    /// SHA-256 of the cron bearer token
    cron_secret_digest: [u8; 32],
}

impl AppState {
    /// Connect to PostgreSQL, run migrations and build the Stripe client
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPool::connect(&config.database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let store: Arc<dyn BillingStore> = Arc::new(PgStore::new(pool, config.store_timeout));
        let processor: Arc<dyn PaymentProcessor> = Arc::new(StripeClient::new(&config.stripe)?);

        Ok(Self::from_parts(store, processor, config))
    }

    /// Wire services over an arbitrary store and processor
    pub fn from_parts(
        store: Arc<dyn BillingStore>,
        processor: Arc<dyn PaymentProcessor>,
        config: &Config,
    ) -> Self {
        let recalculator = SubscriptionRecalculator::new(
            store.clone(),
            processor.clone(),
            config.fees,
            config.stripe.condo_price_id.clone(),
        );
        let payments = PaymentIssuer::new(
            store.clone(),
            processor.clone(),
            config.fees,
            config.default_currency.clone(),
            config.checkout.clone(),
        );
        let checkout = CheckoutService::new(
            store.clone(),
            processor,
            recalculator.clone(),
            PriceCatalog::from(&config.stripe),
            config.checkout.clone(),
        );
        let webhooks = WebhookProcessor::new(store.clone(), config.stripe.webhook_secret.clone());

        Self {
            store,
            fees: config.fees,
            recalculator,
            payments: Arc::new(payments),
            checkout: Arc::new(checkout),
            webhooks,
            cron_secret_digest: Sha256::digest(config.cron_secret.as_bytes()).into(),
        }
    }

    /// Compare digests so the check does not leak the secret's length or prefix
    pub fn cron_token_matches(&self, token: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        candidate
            .iter()
            .zip(self.cron_secret_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
