use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::BillingError;
use crate::models::{
    payment::{Payment, PaymentSource},
    subscription::{PlanTemplate, SubscriptionPlan},
    tenant::Tenant,
};
use crate::services::locks::TenantLocks;
use crate::services::store::{BillingStore, ChangeSet};

/// Everything stored for one gym.
#[derive(Debug, Clone, Serialize)]
pub struct TenantSnapshot {
    pub tenant: Tenant,
    pub entitled: bool,
    pub plans: Vec<SubscriptionPlan>,
    pub payments: Vec<Payment>,
}

/// Manual activation and deactivation by a system administrator, bypassing the gateway.
/// Callers are expected to have checked the principal's role.
#[derive(Clone)]
pub struct AdminOverride {
    store: Arc<dyn BillingStore>,
    locks: TenantLocks,
    template: PlanTemplate,
    activation_days: i64,
    default_tier: String,
}

impl AdminOverride {
    pub fn new(
        store: Arc<dyn BillingStore>,
        locks: TenantLocks,
        template: PlanTemplate,
        activation_days: i64,
        default_tier: impl Into<String>,
    ) -> Self {
        Self {
            store,
            locks,
            template,
            activation_days,
            default_tier: default_tier.into(),
        }
    }

    pub async fn activate(&self, gym_id: &str) -> Result<Tenant, BillingError> {
        let _guard = self.locks.acquire(gym_id).await;
        let mut tenant = self.load_tenant(gym_id).await?;
        let now = Utc::now();

        let plan_id = PlanTemplate::tier_plan_id(&self.default_tier, gym_id);
        let mut changes = ChangeSet::new();
        let plan = match self.store.get_plan_by_plan_id(gym_id, &plan_id).await? {
            Some(mut plan) => {
                if plan.activate(now) {
                    changes = changes.plan(plan.clone());
                }
                plan
            }
            None => {
                let tier = self.template.tier(&self.default_tier).ok_or_else(|| {
                    BillingError::Validation(format!("unknown default tier {:?}", self.default_tier))
                })?;
                let plan = self.template.tier_plan(tier, gym_id, now);
                changes = changes.new_plan(plan.clone());
                plan
            }
        };

        let mut payment = Payment::new(
            Payment::generate_id("admin", now),
            gym_id.to_string(),
            plan.id,
            plan.price,
            plan.currency.clone(),
            PaymentSource::Admin,
            now,
            now + Duration::days(self.activation_days),
        );
        payment.complete(None, Some("admin".to_string()), now);

        if tenant.trial_open_at(now) {
            tenant.trial_used = true;
        }
        tenant.apply_subscription(plan.id, payment.start_date, payment.end_date, now);

        self.store
            .commit(changes.payment(payment.clone()).tenant(tenant.clone()))
            .await?;

        log::info!(
            "Gym {} activated by admin on plan {} until {}",
            gym_id,
            plan.plan_id,
            payment.end_date
        );
        Ok(tenant)
    }

    /// Clears the paid pointer. Plan and payment history stays as it is.
    pub async fn deactivate(&self, gym_id: &str) -> Result<Tenant, BillingError> {
        let _guard = self.locks.acquire(gym_id).await;
        let mut tenant = self.load_tenant(gym_id).await?;

        tenant.clear_subscription(Utc::now());
        self.store.commit(ChangeSet::new().tenant(tenant.clone())).await?;

        log::info!("Gym {} deactivated by admin", gym_id);
        Ok(tenant)
    }

    pub async fn snapshot(&self, gym_id: &str) -> Result<TenantSnapshot, BillingError> {
        let tenant = self.load_tenant(gym_id).await?;
        Ok(TenantSnapshot {
            entitled: tenant.is_entitled_at(Utc::now()),
            plans: self.store.list_plans(gym_id).await?,
            payments: self.store.list_payments(gym_id).await?,
            tenant,
        })
    }

    async fn load_tenant(&self, gym_id: &str) -> Result<Tenant, BillingError> {
        self.store
            .get_tenant(gym_id)
            .await?
            .ok_or_else(|| BillingError::TenantNotFound(gym_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentStatus;
    use crate::models::subscription::PlanStatus;
    use crate::services::test_support::{self, MockGateway};

    fn harness() -> test_support::Harness {
        test_support::harness(MockGateway::returning("https://pay.example/i/1", "inv"))
    }

    #[tokio::test]
    async fn test_activate_grants_window_and_consumes_trial() {
        let harness = harness();
        harness.catalog.onboard("gym_1").await.unwrap();

        let tenant = harness.admin.activate("gym_1").await.unwrap();
        let now = Utc::now();
        assert!(tenant.subscription_active);
        assert!(tenant.trial_used);
        assert!(tenant.is_entitled_at(now + Duration::days(29)));
        assert!(!tenant.is_entitled_at(now + Duration::days(31)));

        let plan = harness
            .store
            .get_plan_by_plan_id("gym_1", "monthly_gym_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tenant.current_subscription_id, Some(plan.id));
        assert_eq!(plan.status, PlanStatus::Active);

        let payments = harness.store.list_payments("gym_1").await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Completed);
        assert_eq!(payments[0].source, PaymentSource::Admin);
        assert!(payments[0].payment_id.starts_with("admin_"));
        assert_eq!(tenant.current_subscription_end, Some(payments[0].end_date));
    }

    #[tokio::test]
    async fn test_activate_creates_missing_tier_plan() {
        let harness = harness();
        let now = Utc::now();
        harness
            .store
            .insert_tenant_if_absent(&Tenant::new("gym_9", now))
            .await
            .unwrap();

        let tenant = harness.admin.activate("gym_9").await.unwrap();
        let plans = harness.store.list_plans("gym_9").await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].plan_id, "monthly_gym_9");
        assert_eq!(tenant.current_subscription_id, Some(plans[0].id));
        assert!(!tenant.trial_used);
    }

    #[tokio::test]
    async fn test_deactivate_keeps_history() {
        let harness = harness();
        harness.catalog.onboard("gym_1").await.unwrap();
        harness.admin.activate("gym_1").await.unwrap();

        let tenant = harness.admin.deactivate("gym_1").await.unwrap();
        assert!(!tenant.subscription_active);
        assert!(tenant.current_subscription_id.is_none());
        assert!(tenant.current_subscription_end.is_none());
        assert!(!tenant.is_entitled_at(Utc::now()));

        let payments = harness.store.list_payments("gym_1").await.unwrap();
        assert_eq!(payments[0].status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_found() {
        let harness = harness();
        assert!(matches!(
            harness.admin.activate("ghost").await,
            Err(BillingError::TenantNotFound(_))
        ));
        assert!(matches!(
            harness.admin.deactivate("ghost").await,
            Err(BillingError::TenantNotFound(_))
        ));
        assert_eq!(harness.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_lists_rows() {
        let harness = harness();
        harness.catalog.onboard("gym_1").await.unwrap();
        harness.admin.activate("gym_1").await.unwrap();

        let snapshot = harness.admin.snapshot("gym_1").await.unwrap();
        assert!(snapshot.entitled);
        assert_eq!(snapshot.plans.len(), 3);
        assert_eq!(snapshot.payments.len(), 1);
    }
}
