//! Link between a local user and a provider customer record.

use crate::domain::foundation::{CustomerMappingId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use super::Provider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerMapping {
    pub id: CustomerMappingId,
    pub user_id: UserId,
    pub provider: Provider,
    pub provider_customer_id: String,
    pub created_at: Timestamp,
}

impl CustomerMapping {
    pub fn new(user_id: UserId, provider: Provider, provider_customer_id: impl Into<String>) -> Self {
        Self {
            id: CustomerMappingId::new(),
            user_id,
            provider,
            provider_customer_id: provider_customer_id.into(),
            created_at: Timestamp::now(),
        }
    }
}
