//! Usage recorder
//!
//! Fire-and-forget writes of [`UsageLogEntry`] rows. Each admitted request
//! produces one row: opened at authentication and completed under the same
//! id when the response is known. Nothing here ever fails or delays the
//! request; write errors are logged and dropped.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::db::{Store, UsageLogEntry};
use crate::domain::RequestMeta;

#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn Store>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Start the row for an admitted request and return it for [`Self::finalize`].
    pub fn open(&self, user_id: Uuid, api_key_id: Uuid, meta: &RequestMeta) -> UsageLogEntry {
        let entry = UsageLogEntry {
            id: Uuid::new_v4(),
            user_id,
            api_key_id,
            endpoint: meta.endpoint.clone(),
            method: meta.method.clone(),
            status_code: None,
            response_time: None,
            ip_address: meta.client_ip.clone(),
            created_at: Utc::now(),
        };
        self.log(entry.clone());
        entry
    }

    /// Complete a row opened by [`Self::open`] with the response outcome.
    pub fn finalize(&self, mut entry: UsageLogEntry, status_code: u16, elapsed: Duration) {
        entry.status_code = Some(status_code as i32);
        entry.response_time = Some(elapsed.as_millis().min(i32::MAX as u128) as i32);
        self.log(entry);
    }

    /// Spawn the write and return immediately.
    pub fn log(&self, entry: UsageLogEntry) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(usage_id = %entry.id, "No async runtime; usage entry dropped");
            return;
        };
        let store = self.store.clone();
        runtime.spawn(async move {
            if let Err(e) = store.log_usage(&entry).await {
                warn!(
                    error = %e,
                    usage_id = %entry.id,
                    key_id = %entry.api_key_id,
                    "Failed to log usage"
                );
            }
        });
    }
}
