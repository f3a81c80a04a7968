//! API key database operations

use super::models::{ApiKey, ApiKeyPatch, NewApiKey, QuotaConsumption};
use super::pool::{DbPool, DbError};
use chrono::{NaiveDate, Utc};
use rand::RngCore;
use sha2::{Sha256, Digest};
use tracing::{info, warn};
use uuid::Uuid;

const KEY_COLUMNS: &str = "id, user_id, key_value, name, is_active, daily_limit, requests_today, last_reset_date, expires_at, created_at";

/// Generate a new API key value
/// Format: sk-<32 hex chars>-<base36 millisecond timestamp>
pub fn generate_key_value() -> String {
    let mut secret = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut secret);
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    format!("sk-{}-{}", hex::encode(secret), to_base36(millis))
}

/// Short SHA-256 fingerprint of a key value, safe to put in logs
pub fn key_fingerprint(key_value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_value.as_bytes());
    hex::encode(&hasher.finalize()[..6])
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Repository for API key operations
#[derive(Clone)]
pub struct ApiKeyRepository {
    pool: DbPool,
}

impl ApiKeyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new API key
    pub async fn create(&self, key: NewApiKey) -> Result<ApiKey, DbError> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        let today = Utc::now().date_naive();

        let row = client.query_one(
            &format!(
                r#"
                INSERT INTO api_keys (id, user_id, key_value, name, daily_limit, last_reset_date, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {KEY_COLUMNS}
                "#
            ),
            &[&id, &key.user_id, &key.key_value, &key.name, &key.daily_limit, &today, &key.expires_at]
        ).await?;

        info!(
            key_id = %id,
            user_id = %key.user_id,
            fingerprint = %key_fingerprint(&key.key_value),
            daily_limit = key.daily_limit,
            "Created new API key"
        );

        Ok(ApiKey::from_row(&row))
    }

    pub async fn get_by_value(&self, key_value: &str) -> Result<Option<ApiKey>, DbError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            &format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE key_value = $1"),
            &[&key_value]
        ).await?;

        Ok(row.as_ref().map(ApiKey::from_row))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ApiKey>, DbError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            &format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE id = $1"),
            &[&id]
        ).await?;

        Ok(row.as_ref().map(ApiKey::from_row))
    }

    /// List all API keys for a user, newest first
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<ApiKey>, DbError> {
        let client = self.pool.get().await?;

        let rows = client.query(
            &format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC"),
            &[&user_id]
        ).await?;

        Ok(rows.iter().map(ApiKey::from_row).collect())
    }

    pub async fn update(&self, id: Uuid, patch: ApiKeyPatch) -> Result<Option<ApiKey>, DbError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(
            &format!(
                r#"
                UPDATE api_keys SET
                    name = COALESCE($2, name),
                    is_active = COALESCE($3, is_active),
                    key_value = COALESCE($4, key_value),
                    daily_limit = COALESCE($5, daily_limit)
                WHERE id = $1
                RETURNING {KEY_COLUMNS}
                "#
            ),
            &[&id, &patch.name, &patch.is_active, &patch.key_value, &patch.daily_limit]
        ).await?;

        if patch.key_value.is_some() && row.is_some() {
            warn!(key_id = %id, "API key regenerated; previous value revoked");
        }

        Ok(row.as_ref().map(ApiKey::from_row))
    }

    /// Delete an API key permanently
    pub async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let client = self.pool.get().await?;

        let result = client.execute(
            "DELETE FROM api_keys WHERE id = $1",
            &[&id]
        ).await?;

        if result > 0 {
            warn!(key_id = %id, "API key deleted");
        }

        Ok(result > 0)
    }

    pub async fn set_daily_limit_for_user(&self, user_id: Uuid, daily_limit: i32) -> Result<u64, DbError> {
        let client = self.pool.get().await?;

        let result = client.execute(
            "UPDATE api_keys SET daily_limit = $2 WHERE user_id = $1",
            &[&user_id, &daily_limit]
        ).await?;

        Ok(result)
    }

    /// Roll over, check and count in one statement.
    ///
    /// The row lock taken by `UPDATE` makes concurrent callers on the same key
    /// re-evaluate the `WHERE` clause against the committed row, so two
    /// requests can never both take the last slot or both see the pre-reset
    /// count.
    pub async fn consume_daily_quota(
        &self,
        key_id: Uuid,
        today: NaiveDate,
    ) -> Result<Option<QuotaConsumption>, DbError> {
        let client = self.pool.get().await?;

        let admitted = client.query_opt(
            r#"
            UPDATE api_keys SET
                requests_today = CASE WHEN last_reset_date < $2 THEN 1 ELSE requests_today + 1 END,
                last_reset_date = GREATEST(last_reset_date, $2)
            WHERE id = $1
              AND (CASE WHEN last_reset_date < $2 THEN 0 ELSE requests_today END) < daily_limit
            RETURNING requests_today, daily_limit
            "#,
            &[&key_id, &today]
        ).await?;

        if let Some(row) = admitted {
            return Ok(Some(QuotaConsumption::Admitted {
                used: row.get("requests_today"),
                limit: row.get("daily_limit"),
            }));
        }

        // Either the key is gone or it is at its limit; nothing was written.
        let current = client.query_opt(
            r#"
            SELECT CASE WHEN last_reset_date < $2 THEN 0 ELSE requests_today END AS used,
                   daily_limit
            FROM api_keys
            WHERE id = $1
            "#,
            &[&key_id, &today]
        ).await?;

        Ok(current.map(|row| QuotaConsumption::Denied {
            used: row.get("used"),
            limit: row.get("daily_limit"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_format() {
        let key = generate_key_value();
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "sk");
        assert_eq!(parts[1].len(), 32);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_key_values_are_unique() {
        assert_ne!(generate_key_value(), generate_key_value());
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(u64::from_str_radix(&to_base36(1_700_000_000_000), 36).ok(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let fp = key_fingerprint("sk-abc");
        assert_eq!(fp, key_fingerprint("sk-abc"));
        assert_eq!(fp.len(), 12);
        assert_ne!(fp, key_fingerprint("sk-abd"));
    }
}
