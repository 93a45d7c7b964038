//! Billing SQL shared by the pooled repository and the unit of work.
//!
//! Every query is generic over the executor, so the same statement runs
//! against a `PgPool` or inside an open transaction.

use sqlx::types::Json;
use sqlx::{PgConnection, PgExecutor};

use crate::domain::billing::{
    BillingEvent, CustomerMapping, Invoice, Provider, Subscription, SubscriptionStatus,
};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::SaveResult;

use super::rows::{
    db_error, unique_violation, CustomerMappingRow, InvoiceRow, SubscriptionRow, INVOICE_COLUMNS,
    SUBSCRIPTION_COLUMNS,
};

pub(super) const BILLING_EVENT_UNIQUE: &str = "billing_events_provider_event_key";
const SUBSCRIPTION_UNIQUE: &str = "subscriptions_provider_subscription_key";

// ════════════════════════════════════════════════════════════════════════════════
// Subscriptions
// ════════════════════════════════════════════════════════════════════════════════

pub(super) async fn find_subscription_by_id<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &SubscriptionId,
) -> Result<Option<Subscription>, DomainError> {
    let sql = format!("SELECT {} FROM subscriptions WHERE id = $1", SUBSCRIPTION_COLUMNS);
    let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
        .bind(id.as_uuid())
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error("Failed to find subscription", e))?;

    row.map(Subscription::try_from).transpose()
}

pub(super) async fn find_active_subscription_by_user<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: &UserId,
) -> Result<Option<Subscription>, DomainError> {
    let sql = format!(
        r#"
        SELECT {} FROM subscriptions
        WHERE user_id = $1 AND status IN ('trialing', 'active', 'past_due')
        ORDER BY created_at DESC
        LIMIT 1
        "#,
        SUBSCRIPTION_COLUMNS
    );
    let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
        .bind(user_id.as_str())
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error("Failed to find active subscription", e))?;

    row.map(Subscription::try_from).transpose()
}

pub(super) async fn find_subscription_by_provider_id<'e, E: PgExecutor<'e>>(
    executor: E,
    provider: Provider,
    provider_subscription_id: &str,
) -> Result<Option<Subscription>, DomainError> {
    let sql = format!(
        "SELECT {} FROM subscriptions WHERE provider = $1 AND provider_subscription_id = $2",
        SUBSCRIPTION_COLUMNS
    );
    let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
        .bind(provider.as_str())
        .bind(provider_subscription_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error("Failed to find subscription", e))?;

    row.map(Subscription::try_from).transpose()
}

pub(super) async fn find_past_due_subscriptions<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<Vec<Subscription>, DomainError> {
    let sql = format!(
        "SELECT {} FROM subscriptions WHERE status = 'past_due' ORDER BY updated_at",
        SUBSCRIPTION_COLUMNS
    );
    let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
        .fetch_all(executor)
        .await
        .map_err(|e| db_error("Failed to list past due subscriptions", e))?;

    rows.into_iter().map(Subscription::try_from).collect()
}

pub(super) async fn insert_subscription<'e, E: PgExecutor<'e>>(
    executor: E,
    sub: &Subscription,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            id, user_id, plan_id, provider, provider_subscription_id, provider_customer_id,
            status, current_period_start, current_period_end, cancel_at_period_end,
            canceled_at, trial_end, dunning_started_at, dunning_last_failure_at,
            cancel_reason, metadata, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        "#,
    )
    .bind(sub.id.as_uuid())
    .bind(sub.user_id.as_str())
    .bind(sub.plan_id.as_str())
    .bind(sub.provider.as_str())
    .bind(&sub.provider_subscription_id)
    .bind(&sub.provider_customer_id)
    .bind(sub.status.as_str())
    .bind(sub.current_period_start.map(|t| *t.as_datetime()))
    .bind(sub.current_period_end.map(|t| *t.as_datetime()))
    .bind(sub.cancel_at_period_end)
    .bind(sub.canceled_at.map(|t| *t.as_datetime()))
    .bind(sub.trial_end.map(|t| *t.as_datetime()))
    .bind(sub.dunning.map(|d| *d.started_at.as_datetime()))
    .bind(sub.dunning.map(|d| *d.last_failure_at.as_datetime()))
    .bind(sub.cancel_reason.map(|r| r.as_str()))
    .bind(Json(&sub.metadata))
    .bind(sub.created_at.as_datetime())
    .bind(sub.updated_at.as_datetime())
    .execute(executor)
    .await
    .map_err(|e| {
        if unique_violation(&e).as_deref() == Some(SUBSCRIPTION_UNIQUE) {
            return DomainError::new(
                ErrorCode::SubscriptionExists,
                format!(
                    "Subscription {} already exists for {}",
                    sub.provider_subscription_id, sub.provider
                ),
            );
        }
        db_error("Failed to create subscription", e)
    })?;

    Ok(())
}

pub(super) async fn update_subscription<'e, E: PgExecutor<'e>>(
    executor: E,
    sub: &Subscription,
) -> Result<(), DomainError> {
    if write_subscription(executor, sub, None).await? == 0 {
        return Err(subscription_not_found(sub));
    }
    Ok(())
}

/// Writes only while the stored status is `expected`. Zero rows written
/// means either a concurrent status change (`Ok(false)`) or a missing row.
pub(super) async fn update_subscription_if_status(
    conn: &mut PgConnection,
    sub: &Subscription,
    expected: SubscriptionStatus,
) -> Result<bool, DomainError> {
    if write_subscription(&mut *conn, sub, Some(expected)).await? > 0 {
        return Ok(true);
    }

    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM subscriptions WHERE id = $1)")
        .bind(sub.id.as_uuid())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| db_error("Failed to check subscription", e))?;

    if exists {
        Ok(false)
    } else {
        Err(subscription_not_found(sub))
    }
}

/// Returns the number of rows written. With `expected` set, the row is only
/// written while its stored status matches.
async fn write_subscription<'e, E: PgExecutor<'e>>(
    executor: E,
    sub: &Subscription,
    expected: Option<SubscriptionStatus>,
) -> Result<u64, DomainError> {
    let result = sqlx::query(
        r#"
        UPDATE subscriptions SET
            plan_id = $2,
            provider_customer_id = $3,
            status = $4,
            current_period_start = $5,
            current_period_end = $6,
            cancel_at_period_end = $7,
            canceled_at = $8,
            trial_end = $9,
            dunning_started_at = $10,
            dunning_last_failure_at = $11,
            cancel_reason = $12,
            metadata = $13,
            updated_at = $14
        WHERE id = $1 AND ($15::text IS NULL OR status = $15)
        "#,
    )
    .bind(sub.id.as_uuid())
    .bind(sub.plan_id.as_str())
    .bind(&sub.provider_customer_id)
    .bind(sub.status.as_str())
    .bind(sub.current_period_start.map(|t| *t.as_datetime()))
    .bind(sub.current_period_end.map(|t| *t.as_datetime()))
    .bind(sub.cancel_at_period_end)
    .bind(sub.canceled_at.map(|t| *t.as_datetime()))
    .bind(sub.trial_end.map(|t| *t.as_datetime()))
    .bind(sub.dunning.map(|d| *d.started_at.as_datetime()))
    .bind(sub.dunning.map(|d| *d.last_failure_at.as_datetime()))
    .bind(sub.cancel_reason.map(|r| r.as_str()))
    .bind(Json(&sub.metadata))
    .bind(sub.updated_at.as_datetime())
    .bind(expected.map(|s| s.as_str()))
    .execute(executor)
    .await
    .map_err(|e| db_error("Failed to update subscription", e))?;

    Ok(result.rows_affected())
}

fn subscription_not_found(sub: &Subscription) -> DomainError {
    DomainError::new(
        ErrorCode::SubscriptionNotFound,
        format!("Subscription {} not found", sub.id),
    )
}

// ════════════════════════════════════════════════════════════════════════════════
// Customer mappings
// ════════════════════════════════════════════════════════════════════════════════

pub(super) async fn find_customer_mapping<'e, E: PgExecutor<'e>>(
    executor: E,
    provider: Provider,
    provider_customer_id: &str,
) -> Result<Option<CustomerMapping>, DomainError> {
    let row: Option<CustomerMappingRow> = sqlx::query_as(
        r#"
        SELECT id, user_id, provider, provider_customer_id, created_at
        FROM customer_mappings
        WHERE provider = $1 AND provider_customer_id = $2
        "#,
    )
    .bind(provider.as_str())
    .bind(provider_customer_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| db_error("Failed to find customer mapping", e))?;

    row.map(CustomerMapping::try_from).transpose()
}

pub(super) async fn insert_customer_mapping<'e, E: PgExecutor<'e>>(
    executor: E,
    mapping: &CustomerMapping,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO customer_mappings (id, user_id, provider, provider_customer_id, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(mapping.id.as_uuid())
    .bind(mapping.user_id.as_str())
    .bind(mapping.provider.as_str())
    .bind(&mapping.provider_customer_id)
    .bind(mapping.created_at.as_datetime())
    .execute(executor)
    .await
    .map_err(|e| db_error("Failed to create customer mapping", e))?;

    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════════
// Invoices
// ════════════════════════════════════════════════════════════════════════════════

/// Keeps the id and creation time of an existing row.
pub(super) async fn upsert_invoice<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice: &Invoice,
) -> Result<Invoice, DomainError> {
    let sql = format!(
        r#"
        INSERT INTO invoices (
            id, user_id, subscription_id, provider, provider_invoice_id, status,
            amount_cents, currency, paid_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (provider, provider_invoice_id) DO UPDATE SET
            user_id = EXCLUDED.user_id,
            subscription_id = EXCLUDED.subscription_id,
            status = EXCLUDED.status,
            amount_cents = EXCLUDED.amount_cents,
            currency = EXCLUDED.currency,
            paid_at = EXCLUDED.paid_at,
            updated_at = EXCLUDED.updated_at
        RETURNING {}
        "#,
        INVOICE_COLUMNS
    );
    let row: InvoiceRow = sqlx::query_as(&sql)
        .bind(invoice.id.as_uuid())
        .bind(invoice.user_id.as_str())
        .bind(invoice.subscription_id.map(|id| *id.as_uuid()))
        .bind(invoice.provider.as_str())
        .bind(&invoice.provider_invoice_id)
        .bind(invoice.status.as_str())
        .bind(invoice.amount_cents)
        .bind(&invoice.currency)
        .bind(invoice.paid_at.map(|t| *t.as_datetime()))
        .bind(invoice.created_at.as_datetime())
        .bind(invoice.updated_at.as_datetime())
        .fetch_one(executor)
        .await
        .map_err(|e| db_error("Failed to upsert invoice", e))?;

    Invoice::try_from(row)
}

pub(super) async fn find_invoice<'e, E: PgExecutor<'e>>(
    executor: E,
    provider: Provider,
    provider_invoice_id: &str,
) -> Result<Option<Invoice>, DomainError> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE provider = $1 AND provider_invoice_id = $2",
        INVOICE_COLUMNS
    );
    let row: Option<InvoiceRow> = sqlx::query_as(&sql)
        .bind(provider.as_str())
        .bind(provider_invoice_id)
        .fetch_optional(executor)
        .await
        .map_err(|e| db_error("Failed to find invoice", e))?;

    row.map(Invoice::try_from).transpose()
}

// ════════════════════════════════════════════════════════════════════════════════
// Billing events (idempotency ledger)
// ════════════════════════════════════════════════════════════════════════════════

pub(super) async fn billing_event_exists<'e, E: PgExecutor<'e>>(
    executor: E,
    provider: Provider,
    provider_event_id: &str,
) -> Result<bool, DomainError> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM billing_events WHERE provider = $1 AND provider_event_id = $2
        )
        "#,
    )
    .bind(provider.as_str())
    .bind(provider_event_id)
    .fetch_one(executor)
    .await
    .map_err(|e| db_error("Failed to check billing event", e))
}

/// Insert-or-conflict on `(provider, provider_event_id)`. A concurrent
/// insert of the same key blocks until the other transaction finishes and
/// then reports `AlreadyExists`.
pub(super) async fn insert_billing_event<'e, E: PgExecutor<'e>>(
    executor: E,
    event: &BillingEvent,
) -> Result<SaveResult, DomainError> {
    let result = sqlx::query(
        r#"
        INSERT INTO billing_events (id, provider, provider_event_id, event_type, processed_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (provider, provider_event_id) DO NOTHING
        "#,
    )
    .bind(event.id.as_uuid())
    .bind(event.provider.as_str())
    .bind(&event.provider_event_id)
    .bind(&event.event_type)
    .bind(event.processed_at.as_datetime())
    .execute(executor)
    .await
    .map_err(|e| db_error("Failed to record billing event", e))?;

    Ok(if result.rows_affected() == 0 {
        SaveResult::AlreadyExists
    } else {
        SaveResult::Inserted
    })
}

pub(super) async fn delete_billing_events_before<'e, E: PgExecutor<'e>>(
    executor: E,
    timestamp: Timestamp,
) -> Result<u64, DomainError> {
    let result = sqlx::query("DELETE FROM billing_events WHERE processed_at < $1")
        .bind(timestamp.as_datetime())
        .execute(executor)
        .await
        .map_err(|e| db_error("Failed to prune billing events", e))?;

    Ok(result.rows_affected())
}
