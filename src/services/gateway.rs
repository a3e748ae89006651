use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::BillingError;
use crate::models::payment::Purchaser;

/// What the gateway needs to open a hosted checkout.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceRequest {
    /// Local idempotency key, also sent as the `Idempotency-Key` header.
    pub payment_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub purchaser: Purchaser,
    /// Echoed back by the gateway as `custom_data` on every notification.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayInvoice {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<GatewayInvoice, BillingError>;
}

/// Exponential backoff for outbound gateway calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// `base_delay * 2^attempt`, capped at `max_delay`, plus up to 25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(multiplier);
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64));

        if !self.add_jitter {
            return delay;
        }
        let jitter_range = delay.as_millis() as u64 / 4;
        if jitter_range == 0 {
            return delay;
        }
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64;
        delay + Duration::from_millis(nanos % jitter_range)
    }
}

enum Attempt {
    Retryable(String),
    Fatal(BillingError),
}

/// reqwest client for the gateway's invoice API.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_key: String,
    success_url: Option<String>,
    cancel_url: Option<String>,
    retry: RetryConfig,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, BillingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BillingError::Gateway(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            retry: RetryConfig {
                max_retries: config.max_retries,
                ..RetryConfig::default()
            },
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn payload(&self, request: &InvoiceRequest) -> Value {
        let mut payload = json!({
            "amount": request.amount.to_string(),
            "currency": request.currency,
            "description": request.description,
            "customer": {
                "email": request.purchaser.email,
                "name": request.purchaser.name,
            },
            "custom_data": request.metadata,
        });
        if let Some(url) = &self.success_url {
            payload["success_url"] = json!(url);
        }
        if let Some(url) = &self.cancel_url {
            payload["cancel_url"] = json!(url);
        }
        payload
    }

    async fn attempt(&self, request: &InvoiceRequest, payload: &Value) -> Result<GatewayInvoice, Attempt> {
        let response = self
            .client
            .post(format!("{}/invoices", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &request.payment_id)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    Attempt::Retryable(format!("transport error: {}", e))
                } else {
                    Attempt::Fatal(BillingError::Gateway(e.to_string()))
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Retryable(format!("gateway returned {}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(Attempt::Fatal(BillingError::Gateway(format!(
                "gateway returned {}: {}",
                status, body
            ))));
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            Attempt::Fatal(BillingError::GatewayResponseInvalid(format!("body is not JSON: {}", e)))
        })?;
        Ok(parse_invoice(&parsed))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<GatewayInvoice, BillingError> {
        let payload = self.payload(request);
        let mut attempt = 0;

        loop {
            match self.attempt(request, &payload).await {
                Ok(invoice) => {
                    log::info!("Gateway invoice created for payment {}", request.payment_id);
                    return Ok(invoice);
                }
                Err(Attempt::Retryable(detail)) if attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    log::warn!(
                        "Gateway call for payment {} failed ({}), retrying in {:?}",
                        request.payment_id,
                        detail,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(Attempt::Retryable(detail)) => {
                    log::error!("Gateway call for payment {} gave up: {}", request.payment_id, detail);
                    return Err(BillingError::Gateway(detail));
                }
                Err(Attempt::Fatal(err)) => {
                    log::error!("Gateway call for payment {} failed: {}", request.payment_id, err);
                    return Err(err);
                }
            }
        }
    }
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .filter_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .next()
}

/// Reads the checkout URL and invoice token, at the top level or under `data`.
fn parse_invoice(body: &Value) -> GatewayInvoice {
    let url_keys = ["url", "checkout_url"];
    let token_keys = ["token", "id"];
    let data = body.get("data");

    GatewayInvoice {
        url: first_string(body, &url_keys).or_else(|| data.and_then(|d| first_string(d, &url_keys))),
        token: first_string(body, &token_keys)
            .or_else(|| data.and_then(|d| first_string(d, &token_keys))),
    }
}
