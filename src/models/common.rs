use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

/// Error body shared by every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Recurrence period of a subscription plan.
///
/// Unrecognized values deserialize as `Monthly` instead of failing, so a gateway
/// echoing an unexpected cycle never blocks reconciliation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Semiannually,
    Annually,
}

impl BillingCycle {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "quarterly" => BillingCycle::Quarterly,
            "semiannually" => BillingCycle::Semiannually,
            "annually" => BillingCycle::Annually,
            _ => BillingCycle::Monthly,
        }
    }

    pub fn months(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Quarterly => 3,
            BillingCycle::Semiannually => 6,
            BillingCycle::Annually => 12,
        }
    }

    /// End of the billing period starting at `from`.
    ///
    /// Calendar arithmetic: Jan 31 + 1 month is the last day of February.
    pub fn compute_end(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from.checked_add_months(Months::new(self.months()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Semiannually => "semiannually",
            BillingCycle::Annually => "annually",
        }
    }
}

impl From<String> for BillingCycle {
    fn from(value: String) -> Self {
        BillingCycle::parse(&value)
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_billing_cycle_advances_by_calendar_period() {
        let from = at(2024, 3, 15);
        assert_eq!(BillingCycle::Monthly.compute_end(from), at(2024, 4, 15));
        assert_eq!(BillingCycle::Quarterly.compute_end(from), at(2024, 6, 15));
        assert_eq!(BillingCycle::Semiannually.compute_end(from), at(2024, 9, 15));
        assert_eq!(BillingCycle::Annually.compute_end(from), at(2025, 3, 15));
    }

    #[test]
    fn test_month_end_is_clamped() {
        assert_eq!(BillingCycle::Monthly.compute_end(at(2024, 1, 31)), at(2024, 2, 29));
        assert_eq!(BillingCycle::Monthly.compute_end(at(2023, 1, 31)), at(2023, 2, 28));
        assert_eq!(BillingCycle::Annually.compute_end(at(2024, 2, 29)), at(2025, 2, 28));
    }

    #[test]
    fn test_unknown_cycle_defaults_to_monthly() {
        let from = at(2024, 5, 1);
        let unknown = BillingCycle::parse("fortnightly");
        assert_eq!(unknown, BillingCycle::Monthly);
        assert_eq!(unknown.compute_end(from), BillingCycle::Monthly.compute_end(from));
    }

    #[test]
    fn test_cycle_deserializes_leniently() {
        let cycle: BillingCycle = serde_json::from_str("\"Annually\"").unwrap();
        assert_eq!(cycle, BillingCycle::Annually);
        let cycle: BillingCycle = serde_json::from_str("\"weekly\"").unwrap();
        assert_eq!(cycle, BillingCycle::Monthly);
        assert_eq!(serde_json::to_string(&BillingCycle::Semiannually).unwrap(), "\"semiannually\"");
    }
}
