//! Fixtures shared by the service tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::BillingError;
use crate::models::payment::CheckoutRequest;
use crate::models::principal::{Principal, Role};
use crate::models::subscription::PlanTemplate;
use crate::services::admin::AdminOverride;
use crate::services::catalog::SubscriptionCatalog;
use crate::services::checkout::CheckoutInitiator;
use crate::services::gateway::{GatewayInvoice, InvoiceRequest, PaymentGateway};
use crate::services::locks::TenantLocks;
use crate::services::memory_store::MemoryStore;
use crate::services::trial::TrialManager;
use crate::services::webhook::WebhookReconciler;

pub const WEBHOOK_SECRET: &str = "whsec_test";

enum Behavior {
    Invoice { url: Option<String>, token_prefix: String },
    Fail(String),
}

/// Scripted gateway that records every request.
pub struct MockGateway {
    behavior: Behavior,
    requests: Mutex<Vec<InvoiceRequest>>,
}

impl MockGateway {
    /// Answers with `url` and a per-call token `<prefix>_<n>`.
    pub fn returning(url: &str, token_prefix: &str) -> Self {
        Self::new(Behavior::Invoice {
            url: Some(url.to_string()),
            token_prefix: token_prefix.to_string(),
        })
    }

    pub fn without_url() -> Self {
        Self::new(Behavior::Invoice {
            url: None,
            token_prefix: "inv".to_string(),
        })
    }

    pub fn failing(detail: &str) -> Self {
        Self::new(Behavior::Fail(detail.to_string()))
    }

    fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<InvoiceRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<GatewayInvoice, BillingError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        match &self.behavior {
            Behavior::Invoice { url, token_prefix } => Ok(GatewayInvoice {
                url: url.clone(),
                token: Some(format!("{}_{}", token_prefix, call)),
            }),
            Behavior::Fail(detail) => Err(BillingError::Gateway(detail.clone())),
        }
    }
}

/// Every component wired to one in-memory store.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub catalog: SubscriptionCatalog,
    pub checkout: CheckoutInitiator,
    pub webhook: WebhookReconciler,
    pub admin: AdminOverride,
    pub trials: TrialManager,
}

pub fn harness(gateway: MockGateway) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(gateway);
    let locks = TenantLocks::new();
    let template = PlanTemplate::standard("COP");

    let trials = TrialManager::new(store.clone(), locks.clone(), 30, true);
    let catalog = SubscriptionCatalog::new(store.clone(), locks.clone(), template.clone(), trials.clone());
    Harness {
        checkout: CheckoutInitiator::new(store.clone(), gateway.clone()),
        webhook: WebhookReconciler::new(store.clone(), locks.clone(), WEBHOOK_SECRET, true),
        admin: AdminOverride::new(store.clone(), locks, template, 30, "monthly"),
        catalog,
        trials,
        gateway,
        store,
    }
}

pub fn catalog() -> (Arc<MemoryStore>, SubscriptionCatalog) {
    let harness = harness(MockGateway::without_url());
    (harness.store, harness.catalog)
}

pub fn member(gym_id: &str) -> Principal {
    Principal {
        user_id: format!("owner_{}", gym_id),
        role: Role::Member,
        gym_id: Some(gym_id.to_string()),
        email: Some(format!("owner@{}.example", gym_id)),
        name: Some("Gym Owner".to_string()),
    }
}

pub fn checkout_request(gym_id: &str, subscription_id: &str) -> CheckoutRequest {
    CheckoutRequest {
        subscription_id: subscription_id.to_string(),
        gym_id: gym_id.to_string(),
    }
}
