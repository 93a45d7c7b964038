//! Database row representations and their conversion into domain types.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::billing::{
    BillingEvent, CancelReason, CustomerMapping, DunningInfo, Invoice, InvoiceStatus, Provider,
    Subscription, SubscriptionStatus,
};
use crate::domain::foundation::{
    BillingEventId, CustomerMappingId, DomainError, ErrorCode, InvoiceId, MembershipId, PlanId,
    SubscriptionId, TenantId, Timestamp, UserId,
};
use crate::domain::usage::{AggregationType, UsageMetric, UsagePeriod, UsageSnapshot};
use crate::ports::TenantMembership;

pub(super) const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, provider, \
    provider_subscription_id, provider_customer_id, status, current_period_start, \
    current_period_end, cancel_at_period_end, canceled_at, trial_end, dunning_started_at, \
    dunning_last_failure_at, cancel_reason, metadata, created_at, updated_at";

pub(super) const INVOICE_COLUMNS: &str = "id, user_id, subscription_id, provider, \
    provider_invoice_id, status, amount_cents, currency, paid_at, created_at, updated_at";

pub(super) const SNAPSHOT_COLUMNS: &str =
    "tenant_id, metric_key, period_start, period_end, value, updated_at";

/// Maps an sqlx error into the shared domain error.
pub(super) fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

/// Name of the violated unique constraint, if `e` is a unique violation.
pub(super) fn unique_violation(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

fn corrupt(field: &str, value: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value in database: {}", field, value),
    )
}

fn parse_provider(value: &str) -> Result<Provider, DomainError> {
    value.parse().map_err(|_| corrupt("provider", value))
}

fn ts(value: DateTime<Utc>) -> Timestamp {
    Timestamp::from_datetime(value)
}

fn opt_ts(value: Option<DateTime<Utc>>) -> Option<Timestamp> {
    value.map(Timestamp::from_datetime)
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    plan_id: String,
    provider: String,
    provider_subscription_id: String,
    provider_customer_id: String,
    status: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    dunning_started_at: Option<DateTime<Utc>>,
    dunning_last_failure_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    metadata: Json<HashMap<String, String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row
            .status
            .parse()
            .map_err(|_| corrupt("status", &row.status))?;

        // Both dunning columns are written together
        let dunning = match (row.dunning_started_at, row.dunning_last_failure_at) {
            (Some(started_at), Some(last_failure_at)) => Some(DunningInfo {
                started_at: ts(started_at),
                last_failure_at: ts(last_failure_at),
            }),
            _ => None,
        };

        let cancel_reason = match row.cancel_reason.as_deref() {
            Some(reason) => {
                Some(CancelReason::parse(reason).ok_or_else(|| corrupt("cancel_reason", reason))?)
            }
            None => None,
        };

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(&row.user_id).map_err(|_| corrupt("user_id", &row.user_id))?,
            plan_id: PlanId::new(&row.plan_id).map_err(|_| corrupt("plan_id", &row.plan_id))?,
            provider: parse_provider(&row.provider)?,
            provider_subscription_id: row.provider_subscription_id,
            provider_customer_id: row.provider_customer_id,
            status,
            current_period_start: opt_ts(row.current_period_start),
            current_period_end: opt_ts(row.current_period_end),
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: opt_ts(row.canceled_at),
            trial_end: opt_ts(row.trial_end),
            dunning,
            cancel_reason,
            metadata: row.metadata.0,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct CustomerMappingRow {
    id: Uuid,
    user_id: String,
    provider: String,
    provider_customer_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerMappingRow> for CustomerMapping {
    type Error = DomainError;

    fn try_from(row: CustomerMappingRow) -> Result<Self, Self::Error> {
        Ok(CustomerMapping {
            id: CustomerMappingId::from_uuid(row.id),
            user_id: UserId::new(&row.user_id).map_err(|_| corrupt("user_id", &row.user_id))?,
            provider: parse_provider(&row.provider)?,
            provider_customer_id: row.provider_customer_id,
            created_at: ts(row.created_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct InvoiceRow {
    id: Uuid,
    user_id: String,
    subscription_id: Option<Uuid>,
    provider: String,
    provider_invoice_id: String,
    status: String,
    amount_cents: i64,
    currency: String,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            user_id: UserId::new(&row.user_id).map_err(|_| corrupt("user_id", &row.user_id))?,
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            provider: parse_provider(&row.provider)?,
            provider_invoice_id: row.provider_invoice_id,
            status: InvoiceStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?,
            amount_cents: row.amount_cents,
            currency: row.currency,
            paid_at: opt_ts(row.paid_at),
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct BillingEventRow {
    id: Uuid,
    provider: String,
    provider_event_id: String,
    event_type: String,
    processed_at: DateTime<Utc>,
}

impl TryFrom<BillingEventRow> for BillingEvent {
    type Error = DomainError;

    fn try_from(row: BillingEventRow) -> Result<Self, Self::Error> {
        Ok(BillingEvent {
            id: BillingEventId::from_uuid(row.id),
            provider: parse_provider(&row.provider)?,
            provider_event_id: row.provider_event_id,
            event_type: row.event_type,
            processed_at: ts(row.processed_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct UsageMetricRow {
    key: String,
    display_name: String,
    unit: String,
    aggregation: String,
}

impl From<UsageMetricRow> for UsageMetric {
    fn from(row: UsageMetricRow) -> Self {
        UsageMetric {
            key: row.key,
            display_name: row.display_name,
            unit: row.unit,
            aggregation: AggregationType::parse_lenient(&row.aggregation),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct UsageSnapshotRow {
    tenant_id: String,
    metric_key: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    value: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UsageSnapshotRow> for UsageSnapshot {
    type Error = DomainError;

    fn try_from(row: UsageSnapshotRow) -> Result<Self, Self::Error> {
        Ok(UsageSnapshot {
            tenant_id: TenantId::new(&row.tenant_id)
                .map_err(|_| corrupt("tenant_id", &row.tenant_id))?,
            metric_key: row.metric_key,
            period: UsagePeriod {
                start: ts(row.period_start),
                end: ts(row.period_end),
            },
            value: row.value.max(0),
            updated_at: ts(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TenantMembershipRow {
    id: Uuid,
    tenant_id: String,
    user_id: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TenantMembershipRow> for TenantMembership {
    type Error = DomainError;

    fn try_from(row: TenantMembershipRow) -> Result<Self, Self::Error> {
        Ok(TenantMembership {
            id: MembershipId::from_uuid(row.id),
            tenant_id: TenantId::new(&row.tenant_id)
                .map_err(|_| corrupt("tenant_id", &row.tenant_id))?,
            user_id: UserId::new(&row.user_id).map_err(|_| corrupt("user_id", &row.user_id))?,
            role: row.role,
            created_at: ts(row.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription_row() -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            plan_id: "pro_monthly".to_string(),
            provider: "stripe".to_string(),
            provider_subscription_id: "sub_1".to_string(),
            provider_customer_id: "cus_1".to_string(),
            status: "past_due".to_string(),
            current_period_start: Some(now),
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            trial_end: None,
            dunning_started_at: Some(now),
            dunning_last_failure_at: Some(now),
            cancel_reason: None,
            metadata: Json(HashMap::new()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn subscription_row_converts_with_dunning() {
        let sub = Subscription::try_from(subscription_row()).unwrap();

        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(sub.provider, Provider::Stripe);
        assert!(sub.dunning.is_some());
    }

    #[test]
    fn half_written_dunning_reads_as_none() {
        let mut row = subscription_row();
        row.dunning_last_failure_at = None;

        assert!(Subscription::try_from(row).unwrap().dunning.is_none());
    }

    #[test]
    fn unknown_status_is_database_error() {
        let mut row = subscription_row();
        row.status = "paused".to_string();

        let err = Subscription::try_from(row).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn negative_snapshot_value_is_clamped() {
        let now = Utc::now();
        let snapshot = UsageSnapshot::try_from(UsageSnapshotRow {
            tenant_id: "tenant-1".to_string(),
            metric_key: "api_calls".to_string(),
            period_start: now,
            period_end: now,
            value: -4,
            updated_at: now,
        })
        .unwrap();

        assert_eq!(snapshot.value, 0);
    }
}
