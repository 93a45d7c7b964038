//! Plan catalog port.

use async_trait::async_trait;

use crate::domain::billing::Plan;
use crate::domain::foundation::{DomainError, PlanId};

/// Read access to the plan catalog.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Find a plan by id, active or not.
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<Plan>, DomainError>;

    /// Plans open for new subscriptions.
    async fn list_active(&self) -> Result<Vec<Plan>, DomainError>;
}
