use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use rust_decimal::Decimal;

use crate::models::common::BillingCycle;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Inactive,
}

/// One offered tier for one gym.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub tenant_id: String,
    /// Stable, human-readable key, unique within the tenant.
    pub plan_id: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub currency: String,
    pub billing_cycle: BillingCycle,
    pub is_trial: bool,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionPlan {
    pub fn activate(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == PlanStatus::Active {
            return false;
        }
        self.status = PlanStatus::Active;
        self.updated_at = now;
        true
    }
}

/// A paid tier of the plan template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSpec {
    /// Prefix of the derived `plan_id`: `<key>_<gym_id>`.
    pub key: String,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub billing_cycle: BillingCycle,
}

/// What every gym gets at onboarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTemplate {
    pub currency: String,
    pub trial_name: String,
    pub trial_description: String,
    pub tiers: Vec<TierSpec>,
}

impl PlanTemplate {
    pub fn standard(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            trial_name: "Free trial".to_string(),
            trial_description: "Full access during the trial window".to_string(),
            tiers: vec![
                TierSpec {
                    key: "monthly".to_string(),
                    name: "Monthly plan".to_string(),
                    description: "Billed every month".to_string(),
                    price: Decimal::new(25_000, 0),
                    billing_cycle: BillingCycle::Monthly,
                },
                TierSpec {
                    key: "annual".to_string(),
                    name: "Annual plan".to_string(),
                    description: "Billed once a year".to_string(),
                    price: Decimal::new(250_000, 0),
                    billing_cycle: BillingCycle::Annually,
                },
            ],
        }
    }

    pub fn trial_plan_id(tenant_id: &str) -> String {
        format!("trial_{}", tenant_id)
    }

    pub fn tier_plan_id(key: &str, tenant_id: &str) -> String {
        format!("{}_{}", key, tenant_id)
    }

    pub fn tier(&self, key: &str) -> Option<&TierSpec> {
        self.tiers.iter().find(|t| t.key == key)
    }

    pub fn trial_plan(&self, tenant_id: &str, now: DateTime<Utc>) -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            plan_id: Self::trial_plan_id(tenant_id),
            name: self.trial_name.clone(),
            description: self.trial_description.clone(),
            price: Decimal::ZERO,
            currency: self.currency.clone(),
            billing_cycle: BillingCycle::Monthly,
            is_trial: true,
            status: PlanStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tier_plan(&self, tier: &TierSpec, tenant_id: &str, now: DateTime<Utc>) -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            plan_id: Self::tier_plan_id(&tier.key, tenant_id),
            name: tier.name.clone(),
            description: tier.description.clone(),
            price: tier.price,
            currency: self.currency.clone(),
            billing_cycle: tier.billing_cycle,
            is_trial: false,
            status: PlanStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}
