use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{
    subscription::{PlanTemplate, SubscriptionPlan},
    tenant::{is_valid_tenant_id, Tenant},
};
use crate::services::locks::TenantLocks;
use crate::services::store::BillingStore;
use crate::services::trial::TrialManager;

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedPlans {
    pub trial_plan: SubscriptionPlan,
    pub paid_plans: Vec<SubscriptionPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Onboarding {
    pub tenant: Tenant,
    /// False when the tenant already existed and only the catalog was re-checked.
    pub created: bool,
    pub plans: ProvisionedPlans,
}

/// Per-tenant plan catalog, provisioned from a `PlanTemplate`.
#[derive(Clone)]
pub struct SubscriptionCatalog {
    store: Arc<dyn BillingStore>,
    locks: TenantLocks,
    template: PlanTemplate,
    trials: TrialManager,
}

impl SubscriptionCatalog {
    pub fn new(
        store: Arc<dyn BillingStore>,
        locks: TenantLocks,
        template: PlanTemplate,
        trials: TrialManager,
    ) -> Self {
        Self {
            store,
            locks,
            template,
            trials,
        }
    }

    pub fn template(&self) -> &PlanTemplate {
        &self.template
    }

    /// Creates the tenant on first call, starting its trial, then provisions the catalog.
    /// Safe to repeat.
    pub async fn onboard(&self, gym_id: &str) -> Result<Onboarding, BillingError> {
        if !is_valid_tenant_id(gym_id) {
            return Err(BillingError::Validation(format!("invalid gym id {:?}", gym_id)));
        }

        let _guard = self.locks.acquire(gym_id).await;
        let now = Utc::now();
        let fresh = self.trials.start_trial(Tenant::new(gym_id, now), now);
        let (tenant, created) = self.store.insert_tenant_if_absent(&fresh).await?;
        if created {
            log::info!("Gym {} onboarded, trial ends {:?}", gym_id, tenant.trial_end_date);
        }

        let plans = self.provision(gym_id).await?;
        Ok(Onboarding {
            tenant,
            created,
            plans,
        })
    }

    /// Upserts the trial plan and every paid tier. Existing rows are returned untouched.
    pub async fn provision(&self, gym_id: &str) -> Result<ProvisionedPlans, BillingError> {
        let now = Utc::now();
        let (trial_plan, trial_created) = self
            .store
            .insert_plan_if_absent(&self.template.trial_plan(gym_id, now))
            .await?;

        let mut created = usize::from(trial_created);
        let mut paid_plans = Vec::with_capacity(self.template.tiers.len());
        for tier in &self.template.tiers {
            let (plan, was_created) = self
                .store
                .insert_plan_if_absent(&self.template.tier_plan(tier, gym_id, now))
                .await?;
            created += usize::from(was_created);
            paid_plans.push(plan);
        }

        if created > 0 {
            log::info!("Provisioned {} plans for gym {}", created, gym_id);
        } else {
            log::debug!("Catalog for gym {} already provisioned", gym_id);
        }

        Ok(ProvisionedPlans {
            trial_plan,
            paid_plans,
        })
    }

    pub async fn find_plan(
        &self,
        gym_id: &str,
        reference: &str,
    ) -> Result<Option<SubscriptionPlan>, BillingError> {
        find_plan(self.store.as_ref(), gym_id, reference).await
    }
}

/// Finds a tenant's plan by its UUID or by its stable `plan_id`.
pub async fn find_plan(
    store: &dyn BillingStore,
    gym_id: &str,
    reference: &str,
) -> Result<Option<SubscriptionPlan>, BillingError> {
    let reference = reference.trim();
    if let Ok(id) = Uuid::parse_str(reference) {
        if let Some(plan) = store.get_plan(gym_id, id).await? {
            return Ok(Some(plan));
        }
    }
    Ok(store.get_plan_by_plan_id(gym_id, reference).await?)
}
