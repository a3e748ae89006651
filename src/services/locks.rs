use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per tenant id. Writers for the same tenant queue up; other tenants proceed.
///
/// Idle entries (held by nobody, awaited by nobody) are dropped on the next `acquire`,
/// so ids that never name a real tenant do not accumulate.
#[derive(Clone, Default)]
pub struct TenantLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.table();
            // Every clone is taken under this guard, so a count of 1 means idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.table().len()
    }
}
