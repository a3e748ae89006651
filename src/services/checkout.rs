use chrono::Utc;
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::BillingError;
use crate::models::{
    payment::{CheckoutRequest, CheckoutResponse, Payment, PaymentSource, Purchaser},
    principal::Principal,
};
use crate::services::catalog::find_plan;
use crate::services::gateway::{InvoiceRequest, PaymentGateway};
use crate::services::store::BillingStore;

/// Opens a hosted checkout and records the pending payment.
#[derive(Clone)]
pub struct CheckoutInitiator {
    store: Arc<dyn BillingStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutInitiator {
    pub fn new(store: Arc<dyn BillingStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn initiate(
        &self,
        principal: &Principal,
        request: &CheckoutRequest,
    ) -> Result<CheckoutResponse, BillingError> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(BillingError::MissingRequiredFields(missing));
        }

        let gym_id = request.gym_id.trim();
        if !principal.can_access_gym(gym_id) {
            return Err(BillingError::Forbidden(format!(
                "user {} cannot buy for gym {}",
                principal.user_id, gym_id
            )));
        }

        let plan = find_plan(self.store.as_ref(), gym_id, &request.subscription_id)
            .await?
            .ok_or_else(|| BillingError::PlanNotFound(request.subscription_id.trim().to_string()))?;
        if plan.is_trial {
            return Err(BillingError::Validation(format!(
                "plan {} is a trial and cannot be purchased",
                plan.plan_id
            )));
        }

        // The key exists before the gateway is called so the notification can find its way back.
        let now = Utc::now();
        let payment_id = Payment::generate_id("pay", now);

        let mut metadata = BTreeMap::new();
        metadata.insert("gym_id".to_string(), gym_id.to_string());
        metadata.insert("subscription_id".to_string(), plan.id.to_string());
        metadata.insert("billing_cycle".to_string(), plan.billing_cycle.to_string());
        metadata.insert("payment_id".to_string(), payment_id.clone());
        metadata.insert("amount".to_string(), plan.price.to_string());

        let invoice = self
            .gateway
            .create_invoice(&InvoiceRequest {
                payment_id: payment_id.clone(),
                amount: plan.price,
                currency: plan.currency.clone(),
                description: plan.name.clone(),
                purchaser: Purchaser {
                    email: principal.email.clone(),
                    name: principal.name.clone(),
                },
                metadata,
            })
            .await?;

        let checkout_url = invoice
            .url
            .as_deref()
            .and_then(usable_url)
            .ok_or_else(|| {
                BillingError::GatewayResponseInvalid(format!(
                    "no usable checkout URL for payment {}",
                    payment_id
                ))
            })?;

        let mut payment = Payment::new(
            payment_id.clone(),
            gym_id.to_string(),
            plan.id,
            plan.price,
            plan.currency.clone(),
            PaymentSource::Checkout,
            now,
            plan.billing_cycle.compute_end(now),
        );
        payment.gateway_token = invoice.token;
        self.store.insert_payment(&payment).await?;

        log::info!(
            "Checkout opened for gym {}: payment {} on plan {} ({} {})",
            gym_id,
            payment_id,
            plan.plan_id,
            plan.price,
            plan.currency
        );

        Ok(CheckoutResponse {
            checkout_url,
            payment_id,
        })
    }
}

fn usable_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
