use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    payment::Payment,
    subscription::SubscriptionPlan,
    tenant::Tenant,
};
use crate::services::store::{BillingStore, ChangeSet};

#[derive(Default)]
struct Tables {
    tenants: HashMap<String, Tenant>,
    plans: HashMap<Uuid, SubscriptionPlan>,
    /// Keyed by the unique `payment_id`.
    payments: HashMap<String, Payment>,
    writes: u64,
}

impl Tables {
    fn plan_by_key(&self, tenant_id: &str, plan_id: &str) -> Option<&SubscriptionPlan> {
        self.plans
            .values()
            .find(|p| p.tenant_id == tenant_id && p.plan_id == plan_id)
    }
}

/// In-process store. Every table sits behind one mutex, so a `commit` is atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    /// Number of successful write operations so far.
    pub fn write_count(&self) -> u64 {
        self.tables.lock().map(|t| t.writes).unwrap_or(0)
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(self.lock()?.tenants.get(tenant_id).cloned())
    }

    async fn insert_tenant_if_absent(&self, tenant: &Tenant) -> Result<(Tenant, bool), StoreError> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.tenants.get(&tenant.id) {
            return Ok((existing.clone(), false));
        }
        tables.tenants.insert(tenant.id.clone(), tenant.clone());
        tables.writes += 1;
        Ok((tenant.clone(), true))
    }

    async fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        match tables.tenants.get_mut(&tenant.id) {
            Some(row) => *row = tenant.clone(),
            None => return Err(StoreError::NotFound(format!("tenant {}", tenant.id))),
        }
        tables.writes += 1;
        Ok(())
    }

    async fn get_plan(&self, tenant_id: &str, id: Uuid) -> Result<Option<SubscriptionPlan>, StoreError> {
        Ok(self
            .lock()?
            .plans
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_plan_by_plan_id(
        &self,
        tenant_id: &str,
        plan_id: &str,
    ) -> Result<Option<SubscriptionPlan>, StoreError> {
        Ok(self.lock()?.plan_by_key(tenant_id, plan_id).cloned())
    }

    async fn list_plans(&self, tenant_id: &str) -> Result<Vec<SubscriptionPlan>, StoreError> {
        let tables = self.lock()?;
        let mut plans: Vec<SubscriptionPlan> = tables
            .plans
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.plan_id.cmp(&b.plan_id));
        Ok(plans)
    }

    async fn insert_plan_if_absent(
        &self,
        plan: &SubscriptionPlan,
    ) -> Result<(SubscriptionPlan, bool), StoreError> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.plan_by_key(&plan.tenant_id, &plan.plan_id) {
            return Ok((existing.clone(), false));
        }
        tables.plans.insert(plan.id, plan.clone());
        tables.writes += 1;
        Ok((plan.clone(), true))
    }

    async fn find_payment(&self, key: &str) -> Result<Option<Payment>, StoreError> {
        let tables = self.lock()?;
        if let Some(payment) = tables.payments.get(key) {
            return Ok(Some(payment.clone()));
        }
        Ok(tables.payments.values().find(|p| p.matches_key(key)).cloned())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.payments.contains_key(&payment.payment_id) {
            return Err(StoreError::Conflict(format!("payment_id {}", payment.payment_id)));
        }
        tables.payments.insert(payment.payment_id.clone(), payment.clone());
        tables.writes += 1;
        Ok(())
    }

    async fn list_payments(&self, tenant_id: &str) -> Result<Vec<Payment>, StoreError> {
        let tables = self.lock()?;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(payments)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tables = self.lock()?;

        // Validate everything before touching any table.
        for plan in &changes.plans {
            if !tables.plans.contains_key(&plan.id) {
                return Err(StoreError::NotFound(format!("plan {}", plan.id)));
            }
        }
        if let Some(tenant) = &changes.tenant {
            if !tables.tenants.contains_key(&tenant.id) {
                return Err(StoreError::NotFound(format!("tenant {}", tenant.id)));
            }
        }

        for mut payment in changes.payments {
            if let Some(existing) = tables.payments.get(&payment.payment_id) {
                payment.id = existing.id;
            }
            tables.payments.insert(payment.payment_id.clone(), payment);
        }
        for plan in changes.plans {
            tables.plans.insert(plan.id, plan);
        }
        for plan in changes.new_plans {
            if tables.plan_by_key(&plan.tenant_id, &plan.plan_id).is_none() {
                tables.plans.insert(plan.id, plan);
            }
        }
        if let Some(tenant) = changes.tenant {
            tables.tenants.insert(tenant.id.clone(), tenant);
        }
        tables.writes += 1;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
