//! Usage log database operations

use super::models::{DailyUsage, UsageLogEntry};
use super::pool::{DbPool, DbError};
use chrono::NaiveDate;
use uuid::Uuid;

/// Repository for usage tracking operations
#[derive(Clone)]
pub struct UsageRepository {
    pool: DbPool,
}

impl UsageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert the entry, or complete the existing row with the same id.
    ///
    /// The open and the final write may land in either order; `COALESCE`
    /// keeps whichever status/latency is known.
    pub async fn log_usage(&self, entry: &UsageLogEntry) -> Result<(), DbError> {
        let client = self.pool.get().await?;

        client.execute(
            r#"
            INSERT INTO usage_logs (
                id, user_id, api_key_id, endpoint, method,
                status_code, response_time, ip_address, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                status_code = COALESCE(EXCLUDED.status_code, usage_logs.status_code),
                response_time = COALESCE(EXCLUDED.response_time, usage_logs.response_time)
            "#,
            &[
                &entry.id,
                &entry.user_id,
                &entry.api_key_id,
                &entry.endpoint,
                &entry.method,
                &entry.status_code,
                &entry.response_time,
                &entry.ip_address,
                &entry.created_at,
            ]
        ).await?;

        Ok(())
    }

    /// Requests per UTC day for a user since `since`, oldest first
    pub async fn daily_usage(&self, user_id: Uuid, since: NaiveDate) -> Result<Vec<DailyUsage>, DbError> {
        let client = self.pool.get().await?;

        let rows = client.query(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day,
                   COUNT(*) AS requests,
                   COUNT(*) FILTER (WHERE status_code >= 400) AS errors,
                   AVG(response_time)::FLOAT8 AS avg_response_ms
            FROM usage_logs
            WHERE user_id = $1
              AND created_at >= ($2::DATE)::TIMESTAMP AT TIME ZONE 'UTC'
            GROUP BY day
            ORDER BY day
            "#,
            &[&user_id, &since]
        ).await?;

        Ok(rows.iter().map(DailyUsage::from_row).collect())
    }
}
