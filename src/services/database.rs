use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use surrealdb::engine::any::{connect, Any};
use surrealdb::Surreal;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    payment::Payment,
    subscription::SubscriptionPlan,
    tenant::Tenant,
};
use crate::services::store::{BillingStore, ChangeSet};

/// SurrealDB-backed store. Record ids are `tenant:<gym_id>`, `plan:<uuid>` and
/// `payment:<payment_id>`; the model's own `id` travels as `uid`.
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

fn backend(e: surrealdb::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn to_row<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    let mut row = serde_json::to_value(value).map_err(|e| StoreError::Backend(e.to_string()))?;
    if let Some(fields) = row.as_object_mut() {
        if let Some(id) = fields.remove("id") {
            fields.insert("uid".to_string(), id);
        }
    }
    Ok(row)
}

fn from_row<T: DeserializeOwned>(mut row: Value) -> Result<T, StoreError> {
    if let Some(fields) = row.as_object_mut() {
        if let Some(uid) = fields.remove("uid") {
            fields.insert("id".to_string(), uid);
        }
    }
    serde_json::from_value(row).map_err(|e| StoreError::Backend(format!("corrupt row: {}", e)))
}

fn from_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter().map(from_row).collect()
}

impl SurrealStore {
    /// Accepts any address the `any` engine understands, e.g. `mem://` or `http://host:8000`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let db = connect(database_url).await.map_err(backend)?;
        db.use_ns("gym_billing").use_db("billing").await.map_err(backend)?;

        let store = Self { db };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        self.db
            .query(
                "
                DEFINE TABLE tenant SCHEMALESS;
                DEFINE TABLE plan SCHEMALESS;
                DEFINE INDEX unique_plan_key ON plan COLUMNS tenant_id, plan_id UNIQUE;
                DEFINE TABLE payment SCHEMALESS;
                DEFINE INDEX unique_payment_id ON payment COLUMNS payment_id UNIQUE;
                DEFINE INDEX payment_gateway_token ON payment COLUMNS gateway_token;
                ",
            )
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;

        log::info!("Billing schema initialized");
        Ok(())
    }

    async fn select<T: DeserializeOwned>(
        &self,
        sql: &str,
        binds: Vec<(&'static str, Value)>,
    ) -> Result<Vec<T>, StoreError> {
        let mut query = self.db.query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let rows: Vec<Value> = query.await.map_err(backend)?.take(0).map_err(backend)?;
        from_rows(rows)
    }

    async fn execute(&self, sql: &str, binds: Vec<(String, Value)>) -> Result<(), StoreError> {
        let mut query = self.db.query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        query.await.map_err(backend)?.check().map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl BillingStore for SurrealStore {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, StoreError> {
        let rows = self
            .select(
                "SELECT * OMIT id FROM type::thing('tenant', $id)",
                vec![("id", Value::from(tenant_id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_tenant_if_absent(&self, tenant: &Tenant) -> Result<(Tenant, bool), StoreError> {
        if let Some(existing) = self.get_tenant(&tenant.id).await? {
            return Ok((existing, false));
        }
        self.execute(
            "CREATE type::thing('tenant', $id) CONTENT $row",
            vec![
                ("id".to_string(), Value::from(tenant.id.as_str())),
                ("row".to_string(), to_row(tenant)?),
            ],
        )
        .await?;
        Ok((tenant.clone(), true))
    }

    async fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        if self.get_tenant(&tenant.id).await?.is_none() {
            return Err(StoreError::NotFound(format!("tenant {}", tenant.id)));
        }
        self.execute(
            "UPDATE type::thing('tenant', $id) CONTENT $row",
            vec![
                ("id".to_string(), Value::from(tenant.id.as_str())),
                ("row".to_string(), to_row(tenant)?),
            ],
        )
        .await
    }

    async fn get_plan(&self, tenant_id: &str, id: Uuid) -> Result<Option<SubscriptionPlan>, StoreError> {
        let rows = self
            .select(
                "SELECT * OMIT id FROM type::thing('plan', $id) WHERE tenant_id = $tenant",
                vec![("id", Value::from(id.to_string())), ("tenant", Value::from(tenant_id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn get_plan_by_plan_id(
        &self,
        tenant_id: &str,
        plan_id: &str,
    ) -> Result<Option<SubscriptionPlan>, StoreError> {
        let rows = self
            .select(
                "SELECT * OMIT id FROM plan WHERE tenant_id = $tenant AND plan_id = $plan LIMIT 1",
                vec![("tenant", Value::from(tenant_id)), ("plan", Value::from(plan_id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_plans(&self, tenant_id: &str) -> Result<Vec<SubscriptionPlan>, StoreError> {
        self.select(
            "SELECT * OMIT id FROM plan WHERE tenant_id = $tenant ORDER BY plan_id",
            vec![("tenant", Value::from(tenant_id))],
        )
        .await
    }

    async fn insert_plan_if_absent(
        &self,
        plan: &SubscriptionPlan,
    ) -> Result<(SubscriptionPlan, bool), StoreError> {
        if let Some(existing) = self.get_plan_by_plan_id(&plan.tenant_id, &plan.plan_id).await? {
            return Ok((existing, false));
        }
        self.execute(
            "CREATE type::thing('plan', $id) CONTENT $row",
            vec![
                ("id".to_string(), Value::from(plan.id.to_string())),
                ("row".to_string(), to_row(plan)?),
            ],
        )
        .await?;
        Ok((plan.clone(), true))
    }

    async fn find_payment(&self, key: &str) -> Result<Option<Payment>, StoreError> {
        let rows = self
            .select(
                "SELECT * OMIT id FROM payment WHERE payment_id = $key OR gateway_token = $key LIMIT 1",
                vec![("key", Value::from(key))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        if self.find_payment(&payment.payment_id).await?.is_some() {
            return Err(StoreError::Conflict(format!("payment_id {}", payment.payment_id)));
        }
        self.execute(
            "CREATE type::thing('payment', $id) CONTENT $row",
            vec![
                ("id".to_string(), Value::from(payment.payment_id.as_str())),
                ("row".to_string(), to_row(payment)?),
            ],
        )
        .await
    }

    async fn list_payments(&self, tenant_id: &str) -> Result<Vec<Payment>, StoreError> {
        self.select(
            "SELECT * OMIT id FROM payment WHERE tenant_id = $tenant ORDER BY created_at",
            vec![("tenant", Value::from(tenant_id))],
        )
        .await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        for plan in &changes.plans {
            if self.get_plan(&plan.tenant_id, plan.id).await?.is_none() {
                return Err(StoreError::NotFound(format!("plan {}", plan.id)));
            }
        }
        if let Some(tenant) = &changes.tenant {
            if self.get_tenant(&tenant.id).await?.is_none() {
                return Err(StoreError::NotFound(format!("tenant {}", tenant.id)));
            }
        }

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        let mut binds = Vec::new();
        let mut push = |statement: &str, id: Value, row: Value| {
            let n = binds.len() / 2;
            sql.push_str(&statement.replace("$id", &format!("$id{}", n)).replace("$row", &format!("$row{}", n)));
            sql.push_str(";\n");
            binds.push((format!("id{}", n), id));
            binds.push((format!("row{}", n), row));
        };

        for mut payment in changes.payments {
            if let Some(existing) = self.find_payment(&payment.payment_id).await? {
                payment.id = existing.id;
            }
            push(
                "UPDATE type::thing('payment', $id) CONTENT $row",
                Value::from(payment.payment_id.as_str()),
                to_row(&payment)?,
            );
        }
        for plan in changes.plans {
            push(
                "UPDATE type::thing('plan', $id) CONTENT $row",
                Value::from(plan.id.to_string()),
                to_row(&plan)?,
            );
        }
        for plan in changes.new_plans {
            if self.get_plan_by_plan_id(&plan.tenant_id, &plan.plan_id).await?.is_none() {
                push(
                    "CREATE type::thing('plan', $id) CONTENT $row",
                    Value::from(plan.id.to_string()),
                    to_row(&plan)?,
                );
            }
        }
        if let Some(tenant) = changes.tenant {
            push(
                "UPDATE type::thing('tenant', $id) CONTENT $row",
                Value::from(tenant.id.as_str()),
                to_row(&tenant)?,
            );
        }
        sql.push_str("COMMIT TRANSACTION;");

        self.execute(&sql, binds).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.db.query("RETURN true").await.map_err(backend)?.check().map_err(backend)?;
        Ok(())
    }
}
