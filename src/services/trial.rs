use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::error::BillingError;
use crate::models::tenant::Tenant;
use crate::services::locks::TenantLocks;
use crate::services::store::{BillingStore, ChangeSet};

pub const MAX_EXTENSION_DAYS: i64 = 365;

/// Free-trial window management.
#[derive(Clone)]
pub struct TrialManager {
    store: Arc<dyn BillingStore>,
    locks: TenantLocks,
    trial_days: i64,
    clears_subscription: bool,
}

impl TrialManager {
    pub fn new(
        store: Arc<dyn BillingStore>,
        locks: TenantLocks,
        trial_days: i64,
        clears_subscription: bool,
    ) -> Self {
        Self {
            store,
            locks,
            trial_days,
            clears_subscription,
        }
    }

    /// Opens a fresh trial window. Only called when the tenant is first created.
    pub fn start_trial(&self, mut tenant: Tenant, now: DateTime<Utc>) -> Tenant {
        tenant.trial_end_date = Some(now + Duration::days(self.trial_days));
        tenant.trial_used = false;
        tenant.updated_at = now;
        tenant
    }

    /// Pushes the trial end `days` past the later of `now` and the current end.
    pub fn apply_extension(&self, mut tenant: Tenant, days: i64, now: DateTime<Utc>) -> Tenant {
        let base = match tenant.trial_end_date {
            Some(end) if end > now => end,
            _ => now,
        };
        tenant.trial_end_date = Some(base + Duration::days(days));
        tenant.trial_used = false;
        if self.clears_subscription {
            tenant.clear_subscription(now);
        }
        tenant.updated_at = now;
        tenant
    }

    pub async fn extend_trial(&self, gym_id: &str, days: i64) -> Result<Tenant, BillingError> {
        if !(1..=MAX_EXTENSION_DAYS).contains(&days) {
            return Err(BillingError::Validation(format!(
                "days must be between 1 and {}",
                MAX_EXTENSION_DAYS
            )));
        }

        let _guard = self.locks.acquire(gym_id).await;
        let tenant = self
            .store
            .get_tenant(gym_id)
            .await?
            .ok_or_else(|| BillingError::TenantNotFound(gym_id.to_string()))?;

        let extended = self.apply_extension(tenant, days, Utc::now());
        self.store.commit(ChangeSet::new().tenant(extended.clone())).await?;

        log::info!(
            "Trial for gym {} extended by {} days, now ends {:?}",
            gym_id,
            days,
            extended.trial_end_date
        );
        Ok(extended)
    }
}
