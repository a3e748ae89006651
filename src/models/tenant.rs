use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// A gym: the unit that pays and gets entitled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: String,
    pub subscription_active: bool,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub trial_used: bool,
    pub current_subscription_id: Option<Uuid>,
    pub current_subscription_start: Option<DateTime<Utc>>,
    pub current_subscription_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            subscription_active: false,
            trial_end_date: None,
            trial_used: false,
            current_subscription_id: None,
            current_subscription_start: None,
            current_subscription_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn trial_open_at(&self, now: DateTime<Utc>) -> bool {
        !self.trial_used && self.trial_end_date.map_or(false, |end| end > now)
    }

    pub fn paid_access_at(&self, now: DateTime<Utc>) -> bool {
        self.subscription_active && self.current_subscription_end.map_or(false, |end| end > now)
    }

    /// Open trial window or a paid window that has not ended yet.
    pub fn is_entitled_at(&self, now: DateTime<Utc>) -> bool {
        self.trial_open_at(now) || self.paid_access_at(now)
    }

    pub fn apply_subscription(
        &mut self,
        subscription_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        self.subscription_active = true;
        self.current_subscription_id = Some(subscription_id);
        self.current_subscription_start = Some(start);
        self.current_subscription_end = Some(end);
        self.updated_at = now;
    }

    pub fn clear_subscription(&mut self, now: DateTime<Utc>) {
        self.subscription_active = false;
        self.current_subscription_id = None;
        self.current_subscription_start = None;
        self.current_subscription_end = None;
        self.updated_at = now;
    }
}

fn tenant_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").unwrap_or_else(|e| unreachable!("{e}"))
    })
}

/// Gym ids feed derived `plan_id`s, so they are restricted to a safe alphabet.
pub fn is_valid_tenant_id(id: &str) -> bool {
    tenant_id_pattern().is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_trial_grants_entitlement_regardless_of_subscription() {
        let now = Utc::now();
        let mut tenant = Tenant::new("gym_1", now);
        tenant.trial_end_date = Some(now + Duration::days(3));
        tenant.subscription_active = false;
        assert!(tenant.is_entitled_at(now));

        tenant.subscription_active = true;
        tenant.current_subscription_end = Some(now - Duration::days(1));
        assert!(tenant.is_entitled_at(now));
    }

    #[test]
    fn test_used_or_elapsed_trial_no_longer_entitles() {
        let now = Utc::now();
        let mut tenant = Tenant::new("gym_1", now);
        tenant.trial_end_date = Some(now + Duration::days(3));
        tenant.trial_used = true;
        assert!(!tenant.is_entitled_at(now));

        tenant.trial_used = false;
        tenant.trial_end_date = Some(now);
        assert!(!tenant.is_entitled_at(now));
    }

    #[test]
    fn test_paid_window_entitles_until_it_ends() {
        let now = Utc::now();
        let mut tenant = Tenant::new("gym_1", now);
        tenant.apply_subscription(Uuid::new_v4(), now, now + Duration::days(30), now);
        assert!(tenant.is_entitled_at(now + Duration::days(29)));
        assert!(!tenant.is_entitled_at(now + Duration::days(30)));

        tenant.subscription_active = false;
        assert!(!tenant.is_entitled_at(now));
    }

    #[test]
    fn test_clear_subscription_resets_pointer() {
        let now = Utc::now();
        let mut tenant = Tenant::new("gym_1", now);
        tenant.apply_subscription(Uuid::new_v4(), now, now + Duration::days(30), now);
        tenant.clear_subscription(now);
        assert!(!tenant.subscription_active);
        assert!(tenant.current_subscription_id.is_none());
        assert!(tenant.current_subscription_start.is_none());
        assert!(tenant.current_subscription_end.is_none());
    }

    #[test]
    fn test_tenant_id_validation() {
        assert!(is_valid_tenant_id("gym_42"));
        assert!(is_valid_tenant_id("Iron-Temple"));
        assert!(!is_valid_tenant_id(""));
        assert!(!is_valid_tenant_id("_gym"));
        assert!(!is_valid_tenant_id("gym 42"));
        assert!(!is_valid_tenant_id(&"g".repeat(65)));
    }
}
