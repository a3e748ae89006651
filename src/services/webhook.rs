use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::BillingError;
use crate::models::{
    common::BillingCycle,
    payment::{
        CustomData, NotificationData, Payment, PaymentNotification, PaymentSource, PaymentStatus,
        ReconcileOutcome, WebhookAck,
    },
    subscription::SubscriptionPlan,
    tenant::Tenant,
};
use crate::services::catalog::find_plan;
use crate::services::locks::TenantLocks;
use crate::services::store::{BillingStore, ChangeSet};

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body`, as the gateway sends it.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, BillingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Validation("webhook secret is unusable".to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of the signature header. A `sha256=` prefix is accepted.
pub fn verify_signature(secret: &str, body: &[u8], provided: Option<&str>) -> Result<(), BillingError> {
    let provided = provided
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(BillingError::InvalidSignature)?;
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let provided = hex::decode(provided).map_err(|_| BillingError::InvalidSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| BillingError::InvalidSignature)?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
        Ok(())
    } else {
        log::debug!("Webhook signature mismatch over {} bytes", body.len());
        Err(BillingError::InvalidSignature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentIdSource {
    Token,
    InvoiceToken,
    CustomData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaymentId {
    pub value: String,
    pub source: PaymentIdSource,
}

/// Picks the notification's payment key: `data.token`, then `data.invoice.token`,
/// then `data.custom_data.payment_id`.
pub struct PaymentIdResolver;

impl PaymentIdResolver {
    pub fn resolve(data: &NotificationData) -> Result<ResolvedPaymentId, BillingError> {
        Self::candidates(data)
            .into_iter()
            .next()
            .ok_or(BillingError::MissingPaymentId)
    }

    /// Every distinct key the notification carries, in resolution order.
    pub fn candidates(data: &NotificationData) -> Vec<ResolvedPaymentId> {
        let sources = [
            (data.token.as_deref(), PaymentIdSource::Token),
            (
                data.invoice.as_ref().and_then(|i| i.token.as_deref()),
                PaymentIdSource::InvoiceToken,
            ),
            (
                data.custom_data.as_ref().and_then(|c| c.payment_id.as_deref()),
                PaymentIdSource::CustomData,
            ),
        ];

        let mut keys: Vec<ResolvedPaymentId> = Vec::new();
        for (value, source) in sources {
            if let Some(value) = value {
                if !keys.iter().any(|k| k.value == value) {
                    keys.push(ResolvedPaymentId {
                        value: value.to_string(),
                        source,
                    });
                }
            }
        }
        keys
    }
}

/// Splits a notification's keys into the local idempotency key and the gateway's token.
fn row_keys(keys: &[ResolvedPaymentId]) -> (Option<&str>, Option<&str>) {
    let local = keys
        .iter()
        .find(|k| k.source == PaymentIdSource::CustomData)
        .map(|k| k.value.as_str());
    let gateway = keys
        .iter()
        .find(|k| k.source != PaymentIdSource::CustomData)
        .map(|k| k.value.as_str());
    (local, gateway)
}

/// The metadata every notification must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMetadata {
    pub gym_id: String,
    pub subscription_ref: String,
    pub billing_cycle: BillingCycle,
    pub amount: Decimal,
}

impl NotificationMetadata {
    pub fn extract(custom: Option<&CustomData>) -> Result<Self, BillingError> {
        let gym_id = custom.and_then(|c| c.gym_id.clone());
        let subscription_ref = custom.and_then(|c| c.subscription_id.clone());
        let billing_cycle = custom.and_then(|c| c.billing_cycle.clone());
        let amount = custom.and_then(|c| c.amount.clone());

        let mut missing = Vec::new();
        for (name, value) in [
            ("gym_id", &gym_id),
            ("subscription_id", &subscription_ref),
            ("billing_cycle", &billing_cycle),
            ("amount", &amount),
        ] {
            if value.is_none() {
                missing.push(name.to_string());
            }
        }

        match (gym_id, subscription_ref, billing_cycle, amount) {
            (Some(gym_id), Some(subscription_ref), Some(billing_cycle), Some(amount)) => {
                let amount = Decimal::from_str(&amount)
                    .map_err(|_| BillingError::Validation(format!("amount {:?} is not a number", amount)))?;
                Ok(Self {
                    gym_id,
                    subscription_ref,
                    billing_cycle: BillingCycle::parse(&billing_cycle),
                    amount,
                })
            }
            _ => Err(BillingError::MissingRequiredFields(missing)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NotificationStatus {
    Completed,
    Failed,
    Other(String),
}

impl NotificationStatus {
    fn parse(raw: Option<&str>) -> Self {
        let status = raw.unwrap_or_default().trim().to_ascii_lowercase();
        match status.as_str() {
            "completed" => NotificationStatus::Completed,
            "failed" => NotificationStatus::Failed,
            _ => NotificationStatus::Other(status),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            NotificationStatus::Completed => "completed",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Other(s) => s,
        }
    }
}

/// Turns gateway notifications into payment, plan and tenant state. Every delivery is
/// safe to repeat.
#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn BillingStore>,
    locks: TenantLocks,
    secret: String,
    enforce_signature: bool,
}

impl WebhookReconciler {
    pub fn new(
        store: Arc<dyn BillingStore>,
        locks: TenantLocks,
        secret: impl Into<String>,
        enforce_signature: bool,
    ) -> Self {
        if !enforce_signature {
            log::warn!("Webhook signature verification is disabled");
        }
        Self {
            store,
            locks,
            secret: secret.into(),
            enforce_signature,
        }
    }

    pub async fn receive(&self, raw_body: &[u8], signature: Option<&str>) -> Result<WebhookAck, BillingError> {
        if self.enforce_signature {
            verify_signature(&self.secret, raw_body, signature)?;
        }

        let notification: PaymentNotification = serde_json::from_slice(raw_body)
            .map_err(|e| BillingError::Validation(format!("malformed notification: {}", e)))?;
        let data = notification.data;

        let keys = PaymentIdResolver::candidates(&data);
        let resolved = keys.first().cloned().ok_or(BillingError::MissingPaymentId)?;
        log::debug!("Notification keyed by {:?} {}", resolved.source, resolved.value);
        let metadata = NotificationMetadata::extract(data.custom_data.as_ref())?;
        let status = NotificationStatus::parse(data.status.as_deref());

        let _guard = self.locks.acquire(&metadata.gym_id).await;

        let existing = self.lookup(&keys).await?;
        if let Some(payment) = &existing {
            if payment.tenant_id != metadata.gym_id {
                return Err(BillingError::Validation(format!(
                    "payment {} does not belong to gym {}",
                    payment.payment_id, metadata.gym_id
                )));
            }
        }

        let now = Utc::now();
        let (payment, outcome) = match &status {
            NotificationStatus::Completed => {
                let applied = self
                    .apply_completed(&keys, &metadata, existing, data.receipt_url, data.payment_method, now)
                    .await?;
                (Some(applied.0), applied.1)
            }
            NotificationStatus::Failed => self.apply_failed(existing, now).await?,
            NotificationStatus::Other(other) => {
                log::warn!(
                    "Ignoring notification for payment {} with unknown status {:?}",
                    resolved.value,
                    other
                );
                (existing, ReconcileOutcome::Ignored)
            }
        };

        Ok(WebhookAck {
            success: true,
            payment_id: payment
                .as_ref()
                .map(|p| p.payment_id.clone())
                .unwrap_or(resolved.value),
            gym_id: metadata.gym_id,
            status: status.as_str().to_string(),
            start_date: payment.as_ref().map(|p| p.start_date),
            end_date: payment.as_ref().map(|p| p.end_date),
            outcome,
        })
    }

    /// Tries every key the notification carries, in resolution order.
    async fn lookup(&self, keys: &[ResolvedPaymentId]) -> Result<Option<Payment>, BillingError> {
        for key in keys {
            if let Some(payment) = self.store.find_payment(&key.value).await? {
                return Ok(Some(payment));
            }
        }
        Ok(None)
    }

    async fn apply_completed(
        &self,
        keys: &[ResolvedPaymentId],
        metadata: &NotificationMetadata,
        existing: Option<Payment>,
        receipt_url: Option<String>,
        payment_method: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Payment, ReconcileOutcome), BillingError> {
        let tenant = self
            .store
            .get_tenant(&metadata.gym_id)
            .await?
            .ok_or_else(|| BillingError::TenantNotFound(metadata.gym_id.clone()))?;
        let plan = self.resolve_plan(metadata, existing.as_ref()).await?;
        let (local_key, gateway_key) = row_keys(keys);

        let payment = match existing {
            Some(payment) if payment.status == PaymentStatus::Completed => {
                // Redelivery: the first completion already wrote everything it owns.
                log::info!(
                    "Payment {} for gym {} already completed, nothing to do",
                    payment.payment_id,
                    payment.tenant_id
                );
                return Ok((payment, ReconcileOutcome::Duplicate));
            }
            Some(mut payment) => {
                if payment.gateway_token.is_none() {
                    payment.gateway_token = gateway_key
                        .filter(|token| *token != payment.payment_id)
                        .map(str::to_string);
                }
                payment.complete(receipt_url, payment_method, now);
                payment
            }
            None => {
                // No checkout row: the window starts now, once. Both keys are kept so a
                // later delivery carrying either one finds this row.
                let payment_id = local_key.or(gateway_key).unwrap_or_default().to_string();
                let mut payment = Payment::new(
                    payment_id,
                    metadata.gym_id.clone(),
                    plan.id,
                    metadata.amount,
                    plan.currency.clone(),
                    PaymentSource::Webhook,
                    now,
                    metadata.billing_cycle.compute_end(now),
                );
                payment.gateway_token = gateway_key
                    .filter(|token| *token != payment.payment_id)
                    .map(str::to_string);
                payment.complete(receipt_url, payment_method, now);
                payment
            }
        };

        let mut changes = ChangeSet::new().payment(payment.clone());

        let mut plan = plan;
        if plan.activate(now) {
            changes = changes.plan(plan.clone());
        }

        if let Some(tenant) = point_tenant_at(tenant, &plan, &payment, now) {
            changes = changes.tenant(tenant);
        }

        self.store.commit(changes).await?;

        log::info!(
            "Payment {} for gym {} completed, access until {}",
            payment.payment_id,
            payment.tenant_id,
            payment.end_date
        );
        Ok((payment, ReconcileOutcome::Applied))
    }

    /// A known payment keeps the plan it was opened on; the notification may not name another.
    async fn resolve_plan(
        &self,
        metadata: &NotificationMetadata,
        existing: Option<&Payment>,
    ) -> Result<SubscriptionPlan, BillingError> {
        let named = find_plan(self.store.as_ref(), &metadata.gym_id, &metadata.subscription_ref).await?;

        let Some(payment) = existing else {
            return named.ok_or_else(|| BillingError::PlanNotFound(metadata.subscription_ref.clone()));
        };

        let plan = self
            .store
            .get_plan(&metadata.gym_id, payment.subscription_id)
            .await?
            .ok_or_else(|| BillingError::PlanNotFound(payment.subscription_id.to_string()))?;
        if let Some(named) = named {
            if named.id != plan.id {
                return Err(BillingError::Validation(format!(
                    "notification names plan {} but payment {} was opened on plan {}",
                    named.plan_id, payment.payment_id, plan.plan_id
                )));
            }
        }
        Ok(plan)
    }

    async fn apply_failed(
        &self,
        existing: Option<Payment>,
        now: DateTime<Utc>,
    ) -> Result<(Option<Payment>, ReconcileOutcome), BillingError> {
        let Some(mut payment) = existing else {
            log::info!("Failed notification for an unknown payment, nothing to do");
            return Ok((None, ReconcileOutcome::Ignored));
        };

        match payment.status {
            PaymentStatus::Completed => {
                log::warn!(
                    "Ignoring failed notification for completed payment {}",
                    payment.payment_id
                );
                Ok((Some(payment), ReconcileOutcome::Ignored))
            }
            PaymentStatus::Failed => Ok((Some(payment), ReconcileOutcome::Duplicate)),
            PaymentStatus::Pending => {
                payment.fail(now);
                self.store.commit(ChangeSet::new().payment(payment.clone())).await?;
                log::info!("Payment {} for gym {} failed", payment.payment_id, payment.tenant_id);
                Ok((Some(payment), ReconcileOutcome::Applied))
            }
        }
    }
}

/// The tenant write for a newly completed payment, or `None` when it already points there.
fn point_tenant_at(
    mut tenant: Tenant,
    plan: &SubscriptionPlan,
    payment: &Payment,
    now: DateTime<Utc>,
) -> Option<Tenant> {
    let already_pointing = tenant.subscription_active
        && tenant.current_subscription_id == Some(plan.id)
        && tenant.current_subscription_start == Some(payment.start_date)
        && tenant.current_subscription_end == Some(payment.end_date);
    if already_pointing {
        return None;
    }

    tenant.apply_subscription(plan.id, payment.start_date, payment.end_date, now);
    Some(tenant)
}
