use serde::{Deserialize, Deserializer, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

/// Which write path created the row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSource {
    Checkout,
    Webhook,
    Admin,
}

/// One billing attempt. `payment_id` is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub payment_id: String,
    /// Invoice token returned by the gateway at checkout, if any.
    pub gateway_token: Option<String>,
    pub tenant_id: String,
    pub subscription_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub source: PaymentSource,
    /// Entitlement window granted by this payment, fixed when the row is created.
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub receipt_url: Option<String>,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once, when the payment first completes. Failures leave it empty.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payment_id: String,
        tenant_id: String,
        subscription_id: Uuid,
        amount: Decimal,
        currency: String,
        source: PaymentSource,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            gateway_token: None,
            tenant_id,
            subscription_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            source,
            start_date,
            end_date,
            receipt_url: None,
            payment_method: None,
            created_at: start_date,
            updated_at: start_date,
            completed_at: None,
        }
    }

    /// Locally generated idempotency key: `<prefix>_<unix millis>_<random>`.
    pub fn generate_id(prefix: &str, now: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", prefix, now.timestamp_millis(), &suffix[..12])
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.payment_id == key || self.gateway_token.as_deref() == Some(key)
    }

    /// Marks the row completed. The window is left untouched.
    pub fn complete(
        &mut self,
        receipt_url: Option<String>,
        payment_method: Option<String>,
        now: DateTime<Utc>,
    ) {
        if receipt_url.is_some() {
            self.receipt_url = receipt_url;
        }
        if payment_method.is_some() {
            self.payment_method = payment_method;
        }
        if self.status != PaymentStatus::Completed {
            self.status = PaymentStatus::Completed;
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }

    pub fn fail(&mut self, now: DateTime<Utc>) {
        self.status = PaymentStatus::Failed;
        self.updated_at = now;
    }
}

/// Who is paying, as handed to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchaser {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub gym_id: String,
}

impl CheckoutRequest {
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.subscription_id.trim().is_empty() {
            missing.push("subscription_id".to_string());
        }
        if self.gym_id.trim().is_empty() {
            missing.push("gym_id".to_string());
        }
        missing
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub payment_id: String,
}

/// Gateway payment-status notification.
#[derive(Debug, Default, Deserialize)]
pub struct PaymentNotification {
    #[serde(default)]
    pub data: NotificationData,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub token: Option<String>,
    #[serde(default)]
    pub invoice: Option<InvoiceRef>,
    #[serde(default)]
    pub custom_data: Option<CustomData>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receipt_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceRef {
    #[serde(default, deserialize_with = "lenient_string")]
    pub token: Option<String>,
}

/// Metadata echoed back by the gateway, as set at checkout.
#[derive(Debug, Default, Deserialize)]
pub struct CustomData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub gym_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subscription_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub billing_cycle: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount: Option<String>,
}

/// Accepts strings and numbers; blank strings and null become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileOutcome {
    Applied,
    Duplicate,
    Ignored,
}

/// Success body returned to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub success: bool,
    pub payment_id: String,
    pub gym_id: String,
    pub status: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub outcome: ReconcileOutcome,
}
