use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::tenant::Tenant;
use crate::services::store::BillingStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntitlementStatus {
    pub gym_id: String,
    pub entitled: bool,
    pub trial_active: bool,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub subscription_active: bool,
    pub current_subscription_id: Option<Uuid>,
    pub current_subscription_end: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

/// Read-only access check. Takes no tenant lock.
#[derive(Clone)]
pub struct EntitlementQuery {
    store: Arc<dyn BillingStore>,
}

impl EntitlementQuery {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub fn is_entitled(tenant: &Tenant, now: DateTime<Utc>) -> bool {
        tenant.is_entitled_at(now)
    }

    pub async fn check(&self, gym_id: &str) -> Result<EntitlementStatus, BillingError> {
        let tenant = self
            .store
            .get_tenant(gym_id)
            .await?
            .ok_or_else(|| BillingError::TenantNotFound(gym_id.to_string()))?;
        let now = Utc::now();

        Ok(EntitlementStatus {
            gym_id: tenant.id.clone(),
            entitled: Self::is_entitled(&tenant, now),
            trial_active: tenant.trial_open_at(now),
            trial_end_date: tenant.trial_end_date,
            subscription_active: tenant.subscription_active,
            current_subscription_id: tenant.current_subscription_id,
            current_subscription_end: tenant.current_subscription_end,
            checked_at: now,
        })
    }
}
