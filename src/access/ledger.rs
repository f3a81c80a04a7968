//! Daily quota ledger
//!
//! One call = one linearizable "roll over, compare, count" step on a key. The
//! atomicity lives in [`Store::consume_daily_quota`]; this layer only decides
//! how the outcome is reported.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{DbError, QuotaConsumption, Store};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger store error: {0}")]
    Store(#[from] DbError),
    #[error("API key {0} vanished during quota check")]
    KeyNotFound(Uuid),
}

/// Result of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: i32,
    pub limit: i32,
    pub remaining: i32,
}

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn Store>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Count one request against today's (UTC) quota.
    pub async fn check_and_consume(&self, key_id: Uuid) -> Result<QuotaDecision, LedgerError> {
        self.check_and_consume_on(key_id, Utc::now().date_naive()).await
    }

    pub async fn check_and_consume_on(
        &self,
        key_id: Uuid,
        today: NaiveDate,
    ) -> Result<QuotaDecision, LedgerError> {
        let outcome = self
            .store
            .consume_daily_quota(key_id, today)
            .await?
            .ok_or(LedgerError::KeyNotFound(key_id))?;

        Ok(match outcome {
            QuotaConsumption::Admitted { used, limit } => QuotaDecision {
                allowed: true,
                used,
                limit,
                remaining: (limit - used).max(0),
            },
            QuotaConsumption::Denied { used, limit } => QuotaDecision {
                allowed: false,
                used,
                limit,
                remaining: 0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, NewApiKey, NewUser};
    use crate::domain::Plan;
    use chrono::Duration;

    async fn store_with_key(limit: i32) -> (Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                email: "ledger@example.com".to_string(),
                password_hash: "x".to_string(),
                full_name: "Ledger".to_string(),
                plan: Plan::Free,
            })
            .await
            .unwrap();
        let key = store
            .create_api_key(NewApiKey {
                user_id: user.id,
                key_value: "sk-ledger".to_string(),
                name: "test".to_string(),
                daily_limit: limit,
                expires_at: None,
            })
            .await
            .unwrap();
        (store, key.id)
    }

    #[tokio::test]
    async fn test_remaining_counts_down_then_denies() {
        let (store, key_id) = store_with_key(10).await;
        let ledger = QuotaLedger::new(store.clone());

        for expected in (0..10).rev() {
            let decision = ledger.check_and_consume(key_id).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected);
        }

        let denied = ledger.check_and_consume(key_id).await.unwrap();
        assert_eq!(
            denied,
            QuotaDecision { allowed: false, used: 10, limit: 10, remaining: 0 }
        );

        // Denial does not write
        let row = store.find_api_key_by_id(key_id).await.unwrap().unwrap();
        assert_eq!(row.requests_today, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_exceed_limit() {
        const LIMIT: i32 = 25;
        let (store, key_id) = store_with_key(LIMIT).await;
        let ledger = QuotaLedger::new(store.clone());

        let handles: Vec<_> = (0..LIMIT + 5)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.check_and_consume(key_id).await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, LIMIT);

        let row = store.find_api_key_by_id(key_id).await.unwrap().unwrap();
        assert_eq!(row.requests_today, LIMIT);
    }

    #[tokio::test]
    async fn test_rollover_from_yesterday() {
        let (store, key_id) = store_with_key(5).await;
        let today = Utc::now().date_naive();

        let mut row = store.find_api_key_by_id(key_id).await.unwrap().unwrap();
        row.requests_today = 5;
        row.last_reset_date = today - Duration::days(1);
        store.put_api_key(row);

        let ledger = QuotaLedger::new(store.clone());
        let decision = ledger.check_and_consume_on(key_id, today).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);

        let row = store.find_api_key_by_id(key_id).await.unwrap().unwrap();
        assert_eq!(row.last_reset_date, today);
        assert_eq!(row.requests_today, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rollover_resets_once() {
        let (store, key_id) = store_with_key(3).await;
        let today = Utc::now().date_naive();

        let mut row = store.find_api_key_by_id(key_id).await.unwrap().unwrap();
        row.requests_today = 3;
        row.last_reset_date = today - Duration::days(1);
        store.put_api_key(row);

        let ledger = QuotaLedger::new(store.clone());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.check_and_consume_on(key_id, today).await.unwrap() })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
    }

    #[tokio::test]
    async fn test_missing_key_is_ledger_error() {
        let store = Arc::new(MemoryStore::new());
        let ledger = QuotaLedger::new(store);
        let err = ledger.check_and_consume(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LedgerError::KeyNotFound(_)));
    }

    #[test]
    fn test_zero_limit_denies_without_error() {
        let (store, key_id) = tokio_test::block_on(store_with_key(0));
        let ledger = QuotaLedger::new(store);
        let decision = tokio_test::assert_ok!(tokio_test::block_on(ledger.check_and_consume(key_id)));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }
}
