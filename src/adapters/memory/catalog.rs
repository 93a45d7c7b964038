//! Static plan and usage-metric catalog.
//!
//! Loaded from YAML:
//!
//! ```yaml
//! plans:
//!   - id: pro_monthly
//!     name: Pro
//!     price_cents: 2900
//!     currency: usd
//!     interval: month
//!     is_active: true
//!     features:
//!       - { key: storage, included: true, limit: 10240 }
//!       - { key: seats, included: true, limit: 5 }
//! metrics:
//!   - { key: api_calls, display_name: API Calls, unit: calls, aggregation: sum }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::domain::billing::Plan;
use crate::domain::foundation::{DomainError, ErrorCode, PlanId};
use crate::domain::usage::UsageMetric;
use crate::ports::PlanRepository;

/// Parsed catalog document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub plans: Vec<Plan>,

    #[serde(default)]
    pub metrics: Vec<UsageMetric>,
}

impl Catalog {
    /// # Errors
    ///
    /// `ValidationFailed` when the document is not a valid catalog.
    pub fn from_yaml(yaml: &str) -> Result<Self, DomainError> {
        serde_yaml::from_str(yaml).map_err(|e| {
            DomainError::new(ErrorCode::ValidationFailed, format!("Invalid catalog: {}", e))
        })
    }

    /// # Errors
    ///
    /// `InternalError` when the file can't be read, `ValidationFailed` when
    /// it doesn't parse.
    pub fn from_file(path: &Path) -> Result<Self, DomainError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("Failed to read catalog {}: {}", path.display(), e),
            )
        })?;
        Self::from_yaml(&yaml)
    }
}

/// Read-only plan catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPlanCatalog {
    plans: Arc<HashMap<PlanId, Plan>>,
}

impl InMemoryPlanCatalog {
    pub fn with_plans(plans: Vec<Plan>) -> Self {
        Self {
            plans: Arc::new(plans.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }

    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self::with_plans(catalog.plans.clone())
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanCatalog {
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        Ok(self.plans.get(id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Plan>, DomainError> {
        let mut plans: Vec<Plan> = self.plans.values().filter(|p| p.is_active).cloned().collect();
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plans)
    }
}
