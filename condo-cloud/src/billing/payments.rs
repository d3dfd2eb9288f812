//! Marketplace payment issuing
//!
//! Turns a payment request into a Stripe PaymentIntent or Checkout Session
//! that routes the gross amount to the payee's connected account and keeps
//! the platform fee as `application_fee_amount`. The pending payment row is
//! written only once Stripe has accepted the request.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::billing::{PayeeType, PaymentStatus};
use shared::error::ErrorCode;
use shared::util::now_millis;

use crate::billing::fees::{FeeSchedule, Money, PlatformFees};
use crate::config::CheckoutUrls;
use crate::error::{BillingError, BillingResult, DependencyExt, Resource};
use crate::store::{Admin, BillingStore, Condominium, Payment};
use crate::stripe::{CheckoutKind, CheckoutParams, PaymentIntentParams, PaymentProcessor};

/// Hard ceiling per payment (1,000,000.00)
pub const MAX_PAYMENT_AMOUNT: Money = Money::from_cents(100_000_000);
/// Caller metadata keys allowed per payment (Stripe caps the total at 50)
const MAX_METADATA_KEYS: usize = 40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// PaymentIntent confirmed client-side with the returned secret
    #[default]
    Intent,
    /// Hosted Stripe Checkout page
    Checkout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub payee_id: String,
    pub payee_type: PayeeType,
    #[serde(default)]
    pub condo_id: Option<String>,
    #[serde(default)]
    pub payer_id: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub mode: PaymentMode,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedPayment {
    pub payment_record_id: String,
    pub stripe_payment_id: String,
    pub mode: PaymentMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    pub currency: String,
    pub fees: PlatformFees,
}

/// Where the money settles
struct Destination {
    admin: Admin,
    account_id: String,
    condo_id: Option<String>,
}

pub struct PaymentIssuer {
    store: Arc<dyn BillingStore>,
    processor: Arc<dyn PaymentProcessor>,
    fees: FeeSchedule,
    default_currency: String,
    checkout: CheckoutUrls,
}

impl PaymentIssuer {
    pub fn new(
        store: Arc<dyn BillingStore>,
        processor: Arc<dyn PaymentProcessor>,
        fees: FeeSchedule,
        default_currency: String,
        checkout: CheckoutUrls,
    ) -> Self {
        Self {
            store,
            processor,
            fees,
            default_currency,
            checkout,
        }
    }

    pub async fn record_platform_payment(
        &self,
        req: CreatePaymentRequest,
    ) -> BillingResult<IssuedPayment> {
        let amount = validate_amount(req.amount)?;
        let currency = validate_currency(req.currency.as_deref(), &self.default_currency)?;
        if req.metadata.len() > MAX_METADATA_KEYS {
            return Err(BillingError::validation(format!(
                "at most {MAX_METADATA_KEYS} metadata keys are allowed"
            )));
        }

        let destination = self
            .resolve_destination(req.payee_type, &req.payee_id, req.condo_id.as_deref())
            .await?;

        let fees = self.fees.calculate_platform_fees(amount);
        if fees.net.is_negative() {
            tracing::warn!(
                payee_id = %req.payee_id,
                amount = %amount,
                net = %fees.net,
                "Processor fee exceeds platform fee, net is negative"
            );
        }

        let record_id = uuid::Uuid::new_v4().to_string();
        let idempotency_key = format!("payment-{record_id}");
        let mut stripe_metadata: Vec<(String, String)> = req
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        stripe_metadata.retain(|(k, _)| !is_reserved_key(k));
        stripe_metadata.extend([
            ("payment_record_id".to_string(), record_id.clone()),
            ("payee_id".to_string(), req.payee_id.clone()),
            ("payee_type".to_string(), req.payee_type.as_db().to_string()),
            ("admin_id".to_string(), destination.admin.id.clone()),
        ]);
        if let Some(ref condo_id) = destination.condo_id {
            stripe_metadata.push(("condo_id".to_string(), condo_id.clone()));
        }

        let (stripe_payment_id, client_secret, checkout_url) = match req.mode {
            PaymentMode::Intent => {
                let params = PaymentIntentParams {
                    amount,
                    currency: currency.clone(),
                    application_fee: fees.platform_fee,
                    destination: destination.account_id.clone(),
                    description: req.description.clone(),
                    metadata: stripe_metadata,
                    idempotency_key,
                };
                let intent = self
                    .processor
                    .create_payment_intent(&params)
                    .await
                    .dependency("create payment intent")?;
                (intent.id, intent.client_secret, None)
            }
            PaymentMode::Checkout => {
                let params = CheckoutParams {
                    kind: CheckoutKind::Payment {
                        product_name: req
                            .description
                            .clone()
                            .unwrap_or_else(|| "CondoChiaro payment".to_string()),
                        amount,
                        currency: currency.clone(),
                        application_fee: fees.platform_fee,
                        destination: destination.account_id.clone(),
                    },
                    customer_id: None,
                    success_url: self.checkout.success_url.clone(),
                    cancel_url: self.checkout.cancel_url.clone(),
                    metadata: stripe_metadata,
                    idempotency_key: Some(idempotency_key),
                };
                let session = self
                    .processor
                    .create_checkout_session(&params)
                    .await
                    .dependency("create checkout session")?;
                (session.id, None, session.url)
            }
        };

        let now = now_millis();
        let payment = Payment {
            id: record_id.clone(),
            payer_id: req.payer_id.clone(),
            payee_id: req.payee_id.clone(),
            payee_type: req.payee_type.as_db().to_string(),
            condo_id: destination.condo_id.clone(),
            amount_cents: amount.cents(),
            currency: currency.clone(),
            platform_fee_percent: fees.platform_fee_percent,
            platform_fee_cents: fees.platform_fee.cents(),
            stripe_fee_percent: fees.processor_fee_percent,
            stripe_fee_cents: fees.processor_fee.cents(),
            net_amount_cents: fees.net.cents(),
            stripe_payment_id: stripe_payment_id.clone(),
            status: PaymentStatus::Pending.as_db().to_string(),
            metadata: serde_json::json!({
                "mode": req.mode,
                "description": req.description,
                "caller": req.metadata,
            }),
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.store.insert_payment(&payment).await {
            // Stripe already holds the charge; the webhook will find no row
            tracing::error!(
                %stripe_payment_id,
                payment_record_id = %record_id,
                "Failed to record issued payment: {e}"
            );
            return Err(e).dependency("record payment");
        }

        tracing::info!(
            payment_record_id = %record_id,
            %stripe_payment_id,
            payee_id = %req.payee_id,
            amount = %amount,
            platform_fee = %fees.platform_fee,
            "Marketplace payment issued"
        );

        Ok(IssuedPayment {
            payment_record_id: record_id,
            stripe_payment_id,
            mode: req.mode,
            client_secret,
            checkout_url,
            currency,
            fees,
        })
    }

    /// Explicit status write. Succeeded payments are never moved again.
    pub async fn update_payment_status(
        &self,
        stripe_payment_id: &str,
        status: PaymentStatus,
    ) -> BillingResult<Payment> {
        let current = self
            .store
            .find_payment(stripe_payment_id)
            .await
            .dependency("load payment")?
            .ok_or_else(|| BillingError::not_found(Resource::Payment, stripe_payment_id))?;

        let current_status = PaymentStatus::from_db(&current.status);
        if current_status == Some(status) {
            return Ok(current);
        }
        if current_status.is_some_and(|s| s.is_terminal()) {
            return Err(BillingError::Validation {
                code: ErrorCode::PaymentInvalidStatus,
                message: format!(
                    "payment {stripe_payment_id} already succeeded and cannot become {}",
                    status.as_db()
                ),
            });
        }

        self.store
            .update_payment_status(stripe_payment_id, status)
            .await
            .dependency("update payment status")?;
        tracing::info!(stripe_payment_id, status = status.as_db(), "Payment status updated");

        self.store
            .find_payment(stripe_payment_id)
            .await
            .dependency("load payment")?
            .ok_or_else(|| BillingError::not_found(Resource::Payment, stripe_payment_id))
    }

    /// Payee -> administrator -> connected account.
    ///
    /// The payee chain and the optional explicit condominium are looked up
    /// concurrently; the steps inside the supplier chain stay sequential.
    async fn resolve_destination(
        &self,
        payee_type: PayeeType,
        payee_id: &str,
        condo_id: Option<&str>,
    ) -> BillingResult<Destination> {
        let explicit_condo = async {
            match condo_id {
                Some(id) => self.find_condominium(id).await.map(Some),
                None => Ok(None),
            }
        };
        let (explicit, (admin, supplier_condo)) = tokio::try_join!(
            explicit_condo,
            self.resolve_payee_chain(payee_type, payee_id)
        )?;

        if payee_type == PayeeType::Admin
            && let Some(ref condo) = explicit
            && condo.admin_id != admin.id
        {
            return Err(BillingError::validation(format!(
                "condominium {} is not managed by administrator {}",
                condo.id, admin.id
            )));
        }

        let account_id = admin
            .stripe_account_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                BillingError::payee_not_connected(format!(
                    "administrator {} has no connected Stripe account",
                    admin.id
                ))
            })?;

        let condo_id = explicit.or(supplier_condo).map(|c| c.id);
        Ok(Destination {
            admin,
            account_id,
            condo_id,
        })
    }

    /// Sequential lookups: supplier -> condominium -> administrator
    async fn resolve_payee_chain(
        &self,
        payee_type: PayeeType,
        payee_id: &str,
    ) -> BillingResult<(Admin, Option<Condominium>)> {
        match payee_type {
            PayeeType::Admin => Ok((self.find_admin(payee_id).await?, None)),
            PayeeType::Supplier => {
                let supplier = self
                    .store
                    .find_supplier(payee_id)
                    .await
                    .dependency("load supplier")?
                    .ok_or_else(|| BillingError::not_found(Resource::Supplier, payee_id))?;
                let condo_id = supplier.condo_id.ok_or_else(|| {
                    BillingError::not_found(
                        Resource::Condominium,
                        format!("of supplier {payee_id}"),
                    )
                })?;
                let condo = self.find_condominium(&condo_id).await?;
                let admin = self.find_admin(&condo.admin_id).await?;
                Ok((admin, Some(condo)))
            }
        }
    }

    async fn find_admin(&self, admin_id: &str) -> BillingResult<Admin> {
        self.store
            .find_admin(admin_id)
            .await
            .dependency("load administrator")?
            .ok_or_else(|| BillingError::not_found(Resource::Admin, admin_id))
    }

    async fn find_condominium(&self, condo_id: &str) -> BillingResult<Condominium> {
        self.store
            .find_condominium(condo_id)
            .await
            .dependency("load condominium")?
            .ok_or_else(|| BillingError::not_found(Resource::Condominium, condo_id))
    }
}

fn is_reserved_key(key: &str) -> bool {
    matches!(
        key,
        "payment_record_id" | "payee_id" | "payee_type" | "admin_id" | "condo_id"
    )
}

/// Finite, positive, at least one cent, at most [`MAX_PAYMENT_AMOUNT`]
pub fn validate_amount(amount: f64) -> BillingResult<Money> {
    if !amount.is_finite() {
        return Err(BillingError::invalid_amount(format!(
            "amount must be a finite number, got {amount}"
        )));
    }
    if amount <= 0.0 {
        return Err(BillingError::invalid_amount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    let money = Money::from_f64(amount)
        .filter(|m| *m <= MAX_PAYMENT_AMOUNT)
        .ok_or_else(|| {
            BillingError::invalid_amount(format!(
                "amount exceeds maximum allowed ({MAX_PAYMENT_AMOUNT}), got {amount}"
            ))
        })?;
    if money == Money::ZERO {
        return Err(BillingError::invalid_amount(format!(
            "amount rounds to zero, got {amount}"
        )));
    }
    Ok(money)
}

/// Lowercase ISO 4217 code; absent means the configured default
pub fn validate_currency(currency: Option<&str>, default: &str) -> BillingResult<String> {
    let code = currency.unwrap_or(default).trim().to_ascii_lowercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(BillingError::validation(format!(
            "currency must be a 3-letter ISO code, got {code:?}"
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigScope;
    use crate::store::memory::InMemoryStore;
    use crate::stripe::fake::{Call, FakeProcessor};

    fn setup() -> (Arc<InMemoryStore>, Arc<FakeProcessor>, PaymentIssuer) {
        let store = Arc::new(InMemoryStore::new());
        let processor = Arc::new(FakeProcessor::new());
        let issuer = PaymentIssuer::new(
            store.clone(),
            processor.clone(),
            FeeSchedule::default(),
            "eur".into(),
            CheckoutUrls {
                success_url: "https://app.test/ok".into(),
                cancel_url: "https://app.test/cancel".into(),
            },
        );
        store.seed_admin("adm_1", Some("acct_1"));
        store.seed_condominium("condo_1", "adm_1");
        store.seed_supplier("sup_1", Some("condo_1"));
        (store, processor, issuer)
    }

    fn request(payee_type: PayeeType, payee_id: &str, amount: f64) -> CreatePaymentRequest {
        CreatePaymentRequest {
            payee_id: payee_id.into(),
            payee_type,
            condo_id: None,
            payer_id: Some("tenant_1".into()),
            amount,
            currency: None,
            mode: PaymentMode::Intent,
            description: Some("Boiler repair".into()),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_intent_for_admin_payee() {
        let (store, processor, issuer) = setup();

        let issued = issuer
            .record_platform_payment(request(PayeeType::Admin, "adm_1", 1000.0))
            .await
            .unwrap();

        assert_eq!(issued.fees.platform_fee, Money::from_cents(1000));
        assert_eq!(issued.fees.processor_fee, Money::from_cents(250));
        assert_eq!(issued.fees.net, Money::from_cents(750));
        assert!(issued.client_secret.is_some());

        let Call::PaymentIntent(params) = &processor.calls()[0] else {
            panic!("expected a payment intent");
        };
        assert_eq!(params.destination, "acct_1");
        assert_eq!(params.application_fee, Money::from_cents(1000));
        assert_eq!(params.idempotency_key, format!("payment-{}", issued.payment_record_id));

        let payments = store.payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, "pending");
        assert_eq!(payments[0].stripe_payment_id, issued.stripe_payment_id);
        assert_eq!(payments[0].net_amount_cents, 750);
    }

    #[tokio::test]
    async fn test_supplier_payee_routes_through_condo_admin() {
        let (store, processor, issuer) = setup();

        issuer
            .record_platform_payment(request(PayeeType::Supplier, "sup_1", 250.0))
            .await
            .unwrap();

        let Call::PaymentIntent(params) = &processor.calls()[0] else {
            panic!("expected a payment intent");
        };
        assert_eq!(params.destination, "acct_1");
        assert_eq!(store.payments()[0].condo_id.as_deref(), Some("condo_1"));
        assert_eq!(store.payments()[0].payee_type, "supplier");
    }

    #[tokio::test]
    async fn test_checkout_mode_returns_url() {
        let (store, processor, issuer) = setup();
        let mut req = request(PayeeType::Admin, "adm_1", 80.0);
        req.mode = PaymentMode::Checkout;
        req.currency = Some("EUR".into());

        let issued = issuer.record_platform_payment(req).await.unwrap();

        assert!(issued.checkout_url.is_some());
        assert!(issued.client_secret.is_none());
        assert_eq!(issued.currency, "eur");
        assert!(matches!(processor.calls()[0], Call::Checkout(_)));
        assert_eq!(store.payments()[0].stripe_payment_id, issued.stripe_payment_id);
    }

    #[tokio::test]
    async fn test_payee_without_connected_account() {
        let (store, processor, issuer) = setup();
        store.seed_admin("adm_2", None);

        let err = issuer
            .record_platform_payment(request(PayeeType::Admin, "adm_2", 50.0))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BillingError::Configuration {
                scope: ConfigScope::Payee,
                ..
            }
        ));
        assert!(processor.calls().is_empty());
        assert!(store.payments().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_amounts() {
        let (store, processor, issuer) = setup();
        for amount in [0.0, -10.0, f64::NAN, f64::INFINITY, 0.001, 1_000_000.01] {
            let err = issuer
                .record_platform_payment(request(PayeeType::Admin, "adm_1", amount))
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    BillingError::Validation {
                        code: ErrorCode::PaymentInvalidAmount,
                        ..
                    }
                ),
                "amount {amount}"
            );
        }
        assert!(processor.calls().is_empty());
        assert!(store.payments().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_currency() {
        let (_, _, issuer) = setup();
        let mut req = request(PayeeType::Admin, "adm_1", 10.0);
        req.currency = Some("euro".into());
        assert!(matches!(
            issuer.record_platform_payment(req).await,
            Err(BillingError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_payee_chain_is_not_found() {
        let (store, _, issuer) = setup();
        store.seed_supplier("sup_orphan", None);

        let err = issuer
            .record_platform_payment(request(PayeeType::Supplier, "nobody", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFound { resource: Resource::Supplier, .. }));

        let err = issuer
            .record_platform_payment(request(PayeeType::Supplier, "sup_orphan", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFound { resource: Resource::Condominium, .. }));
    }

    #[tokio::test]
    async fn test_explicit_condo_must_belong_to_admin() {
        let (store, _, issuer) = setup();
        store.seed_admin("adm_2", Some("acct_2"));
        store.seed_condominium("condo_2", "adm_2");
        let mut req = request(PayeeType::Admin, "adm_1", 10.0);
        req.condo_id = Some("condo_2".into());

        assert!(matches!(
            issuer.record_platform_payment(req).await,
            Err(BillingError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_stripe_error_surfaces_without_row() {
        let (store, processor, issuer) = setup();
        processor.fail("create_payment_intent", 1);

        let err = issuer
            .record_platform_payment(request(PayeeType::Admin, "adm_1", 10.0))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Your card was declined."));
        assert!(store.payments().is_empty());
    }

    #[tokio::test]
    async fn test_update_status_never_downgrades_succeeded() {
        let (_, _, issuer) = setup();
        let issued = issuer
            .record_platform_payment(request(PayeeType::Admin, "adm_1", 10.0))
            .await
            .unwrap();
        let id = issued.stripe_payment_id.as_str();

        let p = issuer
            .update_payment_status(id, PaymentStatus::Processing)
            .await
            .unwrap();
        assert_eq!(p.status, "processing");
        let p = issuer
            .update_payment_status(id, PaymentStatus::Succeeded)
            .await
            .unwrap();
        assert_eq!(p.status, "succeeded");

        let err = issuer
            .update_payment_status(id, PaymentStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation {
                code: ErrorCode::PaymentInvalidStatus,
                ..
            }
        ));

        assert!(matches!(
            issuer.update_payment_status("pi_missing", PaymentStatus::Failed).await,
            Err(BillingError::NotFound { resource: Resource::Payment, .. })
        ));
    }
}
