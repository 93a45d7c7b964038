//! PostgreSQL implementation of the usage metering ports.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, TenantId, Timestamp};
use crate::domain::usage::{AggregationType, SnapshotKey, UsageMetric, UsageSnapshot};
use crate::ports::{UsageMetricRepository, UsageSnapshotRepository};

use super::rows::{db_error, UsageMetricRow, UsageSnapshotRow, SNAPSHOT_COLUMNS};

pub struct PostgresUsageRepository {
    pool: PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts catalog metrics so the table mirrors the configured catalog.
    pub async fn sync_metrics(&self, metrics: &[UsageMetric]) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        for metric in metrics {
            sqlx::query(
                r#"
                INSERT INTO usage_metrics (key, display_name, unit, aggregation)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (key) DO UPDATE SET
                    display_name = EXCLUDED.display_name,
                    unit = EXCLUDED.unit,
                    aggregation = EXCLUDED.aggregation
                "#,
            )
            .bind(&metric.key)
            .bind(&metric.display_name)
            .bind(&metric.unit)
            .bind(metric.aggregation.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to sync usage metric", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit usage metrics", e))?;

        tracing::info!(count = metrics.len(), "Usage metric catalog synced");
        Ok(())
    }
}

#[async_trait]
impl UsageMetricRepository for PostgresUsageRepository {
    async fn find_by_key(&self, key: &str) -> Result<Option<UsageMetric>, DomainError> {
        let row: Option<UsageMetricRow> = sqlx::query_as(
            "SELECT key, display_name, unit, aggregation FROM usage_metrics WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find usage metric", e))?;

        Ok(row.map(UsageMetric::from))
    }

    async fn find_all(&self) -> Result<Vec<UsageMetric>, DomainError> {
        let rows: Vec<UsageMetricRow> = sqlx::query_as(
            "SELECT key, display_name, unit, aggregation FROM usage_metrics ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list usage metrics", e))?;

        Ok(rows.into_iter().map(UsageMetric::from).collect())
    }
}

#[async_trait]
impl UsageSnapshotRepository for PostgresUsageRepository {
    async fn find_by_snapshot_key(
        &self,
        key: &SnapshotKey,
    ) -> Result<Option<UsageSnapshot>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM usage_snapshots
            WHERE tenant_id = $1 AND metric_key = $2
              AND period_start = $3 AND period_end = $4
            "#,
            SNAPSHOT_COLUMNS
        );
        let row: Option<UsageSnapshotRow> = sqlx::query_as(&sql)
            .bind(key.tenant_id.as_str())
            .bind(&key.metric_key)
            .bind(key.period.start.as_datetime())
            .bind(key.period.end.as_datetime())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find usage snapshot", e))?;

        row.map(UsageSnapshot::try_from).transpose()
    }

    async fn find_by_tenant_and_metric(
        &self,
        tenant_id: &TenantId,
        metric_key: &str,
    ) -> Result<Option<UsageSnapshot>, DomainError> {
        let sql = format!(
            r#"
            SELECT {} FROM usage_snapshots
            WHERE tenant_id = $1 AND metric_key = $2
            ORDER BY period_start DESC, period_end DESC
            LIMIT 1
            "#,
            SNAPSHOT_COLUMNS
        );
        let row: Option<UsageSnapshotRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_str())
            .bind(metric_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to find usage snapshot", e))?;

        row.map(UsageSnapshot::try_from).transpose()
    }

    async fn find_by_tenant_id(&self, tenant_id: &TenantId) -> Result<Vec<UsageSnapshot>, DomainError> {
        let sql = format!(
            "SELECT {} FROM usage_snapshots WHERE tenant_id = $1 ORDER BY metric_key, period_start, period_end",
            SNAPSHOT_COLUMNS
        );
        let rows: Vec<UsageSnapshotRow> = sqlx::query_as(&sql)
            .bind(tenant_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list usage snapshots", e))?;

        rows.into_iter().map(UsageSnapshot::try_from).collect()
    }

    /// Merges inside a single statement; concurrent deltas serialize on the
    /// row lock taken by `ON CONFLICT DO UPDATE`.
    async fn upsert(
        &self,
        key: &SnapshotKey,
        aggregation: AggregationType,
        delta: i64,
    ) -> Result<UsageSnapshot, DomainError> {
        let sql = format!(
            r#"
            INSERT INTO usage_snapshots (tenant_id, metric_key, period_start, period_end, value, updated_at)
            VALUES ($1, $2, $3, $4, GREATEST($5, 0), $6)
            ON CONFLICT (tenant_id, metric_key, period_start, period_end) DO UPDATE SET
                value = CASE $7
                    WHEN 'max' THEN GREATEST(usage_snapshots.value, $5, 0)
                    WHEN 'last' THEN GREATEST($5, 0)
                    ELSE GREATEST(usage_snapshots.value + $5, 0)
                END,
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            SNAPSHOT_COLUMNS
        );
        let row: UsageSnapshotRow = sqlx::query_as(&sql)
            .bind(key.tenant_id.as_str())
            .bind(&key.metric_key)
            .bind(key.period.start.as_datetime())
            .bind(key.period.end.as_datetime())
            .bind(delta)
            .bind(Timestamp::now().as_datetime())
            .bind(aggregation.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to upsert usage snapshot", e))?;

        UsageSnapshot::try_from(row)
    }
}
