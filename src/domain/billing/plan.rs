//! Catalog plans and their feature lists.
//!
//! A plan's feature `limit` is the only numeric quota source: storage in MB,
//! seats as a member count, API calls per month.

use crate::domain::foundation::PlanId;
use serde::{Deserialize, Serialize};

/// Billing cadence for a plan price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "month" => Some(BillingInterval::Month),
            "year" => Some(BillingInterval::Year),
            _ => None,
        }
    }
}

/// One feature row on a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeature {
    pub key: String,
    pub included: bool,

    /// Absent means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl PlanFeature {
    pub fn included(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            included: true,
            limit: None,
        }
    }

    pub fn limited(key: impl Into<String>, limit: i64) -> Self {
        Self {
            key: key.into(),
            included: true,
            limit: Some(limit),
        }
    }
}

/// A catalog plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,

    /// Price in minor currency units.
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub is_active: bool,

    #[serde(default)]
    pub features: Vec<PlanFeature>,
}

impl Plan {
    /// Looks up a feature row by key.
    pub fn feature(&self, key: &str) -> Option<&PlanFeature> {
        self.features.iter().find(|f| f.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_deserializes_from_yaml_with_optional_limits() {
        let yaml = r#"
id: pro_monthly
name: Pro
price_cents: 2900
currency: usd
interval: month
is_active: true
features:
  - key: storage
    included: true
    limit: 1024
  - key: api_access
    included: true
"#;
        let plan: Plan = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(plan.feature("storage").and_then(|f| f.limit), Some(1024));
        assert_eq!(plan.feature("api_access").and_then(|f| f.limit), None);
        assert!(plan.feature("seats").is_none());
    }
}
