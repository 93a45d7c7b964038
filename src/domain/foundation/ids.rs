//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Declares a UUID-backed identifier with the usual constructors.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

/// Declares a non-empty string identifier owned by an external system.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning error if empty.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::empty_field($field));
                }
                Ok(Self(id))
            }

            /// Returns the inner string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a subscription record.
    SubscriptionId
);

uuid_id!(
    /// Unique identifier for a locally stored invoice.
    InvoiceId
);

uuid_id!(
    /// Unique identifier for a provider customer mapping.
    CustomerMappingId
);

uuid_id!(
    /// Unique identifier for a processed billing event.
    BillingEventId
);

uuid_id!(
    /// Unique identifier for a tenant membership (seat).
    MembershipId
);

string_id!(
    /// User identifier (typically from auth provider).
    UserId,
    "user_id"
);

string_id!(
    /// Catalog plan identifier, e.g. `pro_monthly`.
    PlanId,
    "plan_id"
);

string_id!(
    /// Tenant (organization/workspace) identifier that usage is metered against.
    TenantId,
    "tenant_id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_id_generates_unique_values() {
        let id1 = SubscriptionId::new();
        let id2 = SubscriptionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn subscription_id_parses_from_valid_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id: SubscriptionId = uuid_str.parse().unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn subscription_id_rejects_invalid_string() {
        let result: Result<SubscriptionId, _> = "not-a-uuid".parse();
        assert!(result.is_err());
    }

    #[test]
    fn user_id_rejects_empty_string() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
    }

    #[test]
    fn plan_id_round_trips_through_display() {
        let plan = PlanId::new("pro_monthly").unwrap();
        assert_eq!(plan.to_string(), "pro_monthly");
        assert_eq!(plan.as_str(), "pro_monthly");
    }

    #[test]
    fn tenant_id_serializes_transparently() {
        let tenant = TenantId::new("tenant-1").unwrap();
        let json = serde_json::to_string(&tenant).unwrap();
        assert_eq!(json, "\"tenant-1\"");
    }
}
