use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    payment::Payment,
    subscription::SubscriptionPlan,
    tenant::Tenant,
};

/// Writes that must land together or not at all.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    /// Upserted on the unique `payment_id`.
    pub payments: Vec<Payment>,
    /// Replaced by `id`; the plan must already exist.
    pub plans: Vec<SubscriptionPlan>,
    /// New plans, skipped when `(tenant_id, plan_id)` already exists.
    pub new_plans: Vec<SubscriptionPlan>,
    pub tenant: Option<Tenant>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payment(mut self, payment: Payment) -> Self {
        self.payments.push(payment);
        self
    }

    pub fn plan(mut self, plan: SubscriptionPlan) -> Self {
        self.plans.push(plan);
        self
    }

    pub fn new_plan(mut self, plan: SubscriptionPlan) -> Self {
        self.new_plans.push(plan);
        self
    }

    pub fn tenant(mut self, tenant: Tenant) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
            && self.plans.is_empty()
            && self.new_plans.is_empty()
            && self.tenant.is_none()
    }
}

/// Persistence consumed by the billing components.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError>;

    /// Returns the stored row: the given one if inserted, the existing one otherwise.
    async fn insert_tenant_if_absent(&self, tenant: &Tenant) -> Result<(Tenant, bool), StoreError>;

    async fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;

    async fn get_plan(&self, tenant_id: &str, id: Uuid) -> Result<Option<SubscriptionPlan>, StoreError>;

    async fn get_plan_by_plan_id(
        &self,
        tenant_id: &str,
        plan_id: &str,
    ) -> Result<Option<SubscriptionPlan>, StoreError>;

    async fn list_plans(&self, tenant_id: &str) -> Result<Vec<SubscriptionPlan>, StoreError>;

    /// Upsert-or-skip on `(tenant_id, plan_id)`. Returns the stored row and whether it was created.
    async fn insert_plan_if_absent(
        &self,
        plan: &SubscriptionPlan,
    ) -> Result<(SubscriptionPlan, bool), StoreError>;

    /// Looks a payment up by `payment_id` or by gateway token.
    async fn find_payment(&self, key: &str) -> Result<Option<Payment>, StoreError>;

    /// Fails with `Conflict` when the `payment_id` is taken.
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn list_payments(&self, tenant_id: &str) -> Result<Vec<Payment>, StoreError>;

    /// Applies every change atomically.
    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Opens the store named by `DATABASE_URL`.
pub async fn connect(database_url: &str) -> Result<Arc<dyn BillingStore>, StoreError> {
    if database_url.starts_with("memory://") {
        log::info!("Using in-process billing store");
        return Ok(Arc::new(crate::services::memory_store::MemoryStore::new()));
    }

    #[cfg(feature = "surreal")]
    {
        let store = crate::services::database::SurrealStore::connect(database_url).await?;
        log::info!("Connected to SurrealDB billing store");
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "surreal"))]
    Err(StoreError::Backend(format!(
        "unsupported database URL {database_url:?}; build with the `surreal` feature for SurrealDB"
    )))
}
