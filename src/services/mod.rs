pub mod admin;
pub mod auth;
pub mod catalog;
pub mod checkout;
#[cfg(feature = "surreal")]
pub mod database;
pub mod entitlement;
pub mod gateway;
pub mod locks;
pub mod memory_store;
pub mod store;
pub mod trial;
pub mod webhook;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use crate::config::Config;
use crate::models::subscription::PlanTemplate;
use admin::AdminOverride;
use auth::Authenticator;
use catalog::SubscriptionCatalog;
use checkout::CheckoutInitiator;
use entitlement::EntitlementQuery;
use gateway::PaymentGateway;
use locks::TenantLocks;
use store::BillingStore;
use trial::TrialManager;
use webhook::WebhookReconciler;

/// Every billing component, wired to one store and one set of tenant locks.
#[derive(Clone)]
pub struct BillingServices {
    pub store: Arc<dyn BillingStore>,
    pub authenticator: Arc<dyn Authenticator>,
    pub trials: TrialManager,
    pub catalog: SubscriptionCatalog,
    pub checkout: CheckoutInitiator,
    pub webhook: WebhookReconciler,
    pub admin: AdminOverride,
    pub entitlement: EntitlementQuery,
    pub signature_header: String,
}

impl BillingServices {
    pub fn build(
        config: &Config,
        store: Arc<dyn BillingStore>,
        gateway: Arc<dyn PaymentGateway>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let locks = TenantLocks::new();
        let template = PlanTemplate::standard(config.app.default_currency.clone());

        let trials = TrialManager::new(
            store.clone(),
            locks.clone(),
            config.app.trial_days,
            config.app.extend_trial_clears_subscription,
        );
        let catalog = SubscriptionCatalog::new(store.clone(), locks.clone(), template.clone(), trials.clone());

        Self {
            checkout: CheckoutInitiator::new(store.clone(), gateway),
            webhook: WebhookReconciler::new(
                store.clone(),
                locks.clone(),
                config.gateway.webhook_secret.clone(),
                config.app.enforce_webhook_signature(),
            ),
            admin: AdminOverride::new(
                store.clone(),
                locks,
                template,
                config.app.admin_activation_days,
                config.app.admin_default_tier.clone(),
            ),
            entitlement: EntitlementQuery::new(store.clone()),
            signature_header: config.gateway.signature_header.clone(),
            trials,
            catalog,
            authenticator,
            store,
        }
    }
}
