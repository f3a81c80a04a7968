//! Credential resolution
//!
//! Turns a bearer token or an API key into a [`Principal`]. For API keys the
//! full admission chain runs here: key checks, owner checks, burst limiter,
//! daily quota, then the usage row is opened.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::ledger::QuotaLedger;
use super::rate_limiter::SlidingWindowLimiter;
use super::recorder::UsageRecorder;
use super::{AccessError, JwtKeys};
use crate::config::RateLimitSettings;
use crate::db::{key_fingerprint, DbError, Store, UsageLogEntry};
use crate::domain::{KeyContext, Principal, RequestMeta, UsageSnapshot};

/// Everything an admitted API-key request carries forward
#[derive(Debug, Clone)]
pub struct ApiKeyAuthentication {
    pub principal: Principal,
    pub key: KeyContext,
    pub usage: UsageSnapshot,
    /// Open usage row, completed once the response is known
    pub entry: UsageLogEntry,
}

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn Store>,
    jwt: JwtKeys,
    ledger: QuotaLedger,
    recorder: UsageRecorder,
    limiter: Arc<SlidingWindowLimiter>,
    rate: RateLimitSettings,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn Store>,
        jwt: JwtKeys,
        recorder: UsageRecorder,
        limiter: Arc<SlidingWindowLimiter>,
        rate: RateLimitSettings,
    ) -> Self {
        Self {
            ledger: QuotaLedger::new(store.clone()),
            store,
            jwt,
            recorder,
            limiter,
            rate,
        }
    }

    pub fn recorder(&self) -> &UsageRecorder {
        &self.recorder
    }

    /// Resolve a bearer token to an active user. The user is always reloaded,
    /// so deactivation takes effect before the token expires.
    pub async fn authenticate_bearer(&self, token: Option<&str>) -> Result<Principal, AccessError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AccessError::TokenRequired)?;

        let claims = self.jwt.verify(token)?;
        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await
            .map_err(store_failure)?
            .ok_or(AccessError::UserNotFound)?;

        if !user.is_active {
            warn!(user_id = %user.id, "Bearer token for deactivated account");
            return Err(AccessError::AccountDeactivated);
        }

        Ok(Principal::from(&user))
    }

    /// Admit one API-key request: validates the key and its owner, applies the
    /// burst limiter and the daily quota, and opens the usage row.
    pub async fn authenticate_api_key(
        &self,
        key_value: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<ApiKeyAuthentication, AccessError> {
        let key_value = key_value
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AccessError::ApiKeyMissing)?;

        let key = match self.store.find_api_key_by_value(key_value).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                warn!(key = %key_fingerprint(key_value), "Unknown API key");
                return Err(AccessError::InvalidApiKey);
            }
            Err(e) => return Err(store_failure(e)),
        };

        if !key.is_active {
            warn!(key_id = %key.id, "Deactivated API key used");
            return Err(AccessError::ApiKeyDeactivated);
        }
        if let Some(expires_at) = key.expires_at.filter(|_| key.is_expired_at(Utc::now())) {
            warn!(key_id = %key.id, %expires_at, "Expired API key used");
            return Err(AccessError::ApiKeyExpired { expires_at });
        }

        // Owner is checked before the ledger so no quota is spent on a dead account
        let user = self
            .store
            .find_user_by_id(key.user_id)
            .await
            .map_err(store_failure)?
            .ok_or(AccessError::UserNotFound)?;
        if !user.is_active {
            return Err(AccessError::UserInactive);
        }

        if self.rate.enabled {
            let window = Duration::from_millis(self.rate.window_ms);
            let burst = self
                .limiter
                .check(&format!("key:{}", key.id), self.rate.max_requests, window);
            if !burst.allowed {
                debug!(key_id = %key.id, "Burst limit reached");
                return Err(AccessError::RateLimited {
                    limit: burst.limit,
                    retry_after_secs: burst.retry_after_secs(),
                });
            }
        }

        let decision = match self.ledger.check_and_consume(key.id).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(error = %e, key_id = %key.id, "Quota check failed");
                return Err(AccessError::UsageCheckFailed);
            }
        };
        if !decision.allowed {
            debug!(key_id = %key.id, used = decision.used, "Daily quota exhausted");
            return Err(AccessError::RateLimitExceeded {
                limit: decision.limit,
                used: decision.used,
            });
        }

        let entry = self.recorder.open(user.id, key.id, meta);

        Ok(ApiKeyAuthentication {
            principal: Principal::from(&user),
            key: KeyContext {
                daily_limit: decision.limit,
                ..KeyContext::from(&key)
            },
            usage: UsageSnapshot {
                used: decision.used,
                limit: decision.limit,
                remaining: decision.remaining,
            },
            entry,
        })
    }

    /// Charge a rejected credential to the caller's IP window, so keys and
    /// tokens cannot be guessed faster than the caller limit. Once that window
    /// is spent the rejection becomes `RateLimited`.
    pub fn charge_rejection(&self, err: AccessError, client_ip: Option<&str>) -> AccessError {
        if !self.rate.enabled || !err.is_credential_failure() {
            return err;
        }
        let ip = client_ip.unwrap_or("unknown");
        let decision = self.limiter.check(
            &format!("ip:{ip}"),
            self.rate.max_requests,
            Duration::from_millis(self.rate.window_ms),
        );
        if decision.allowed {
            return err;
        }
        warn!(%ip, code = err.code(), "Repeated credential failures from caller");
        AccessError::RateLimited {
            limit: decision.limit,
            retry_after_secs: decision.retry_after_secs(),
        }
    }

    /// Like [`Self::authenticate_api_key`] but never fails: any rejection
    /// leaves the request anonymous.
    pub async fn authenticate_api_key_optional(
        &self,
        key_value: Option<&str>,
        meta: &RequestMeta,
    ) -> Option<ApiKeyAuthentication> {
        key_value?;
        match self.authenticate_api_key(key_value, meta).await {
            Ok(auth) => Some(auth),
            Err(e) => {
                debug!(code = e.code(), "Optional API key rejected; continuing anonymously");
                None
            }
        }
    }
}

fn store_failure(e: DbError) -> AccessError {
    error!(error = %e, "Credential store unavailable");
    AccessError::AuthFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{MemoryStore, NewApiKey, NewUser, UserPatch};
    use crate::domain::Plan;
    use chrono::Duration as ChronoDuration;

    struct Fixture {
        store: Arc<MemoryStore>,
        auth: Authenticator,
        jwt: JwtKeys,
    }

    fn fixture_with(rate: RateLimitSettings) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let jwt = JwtKeys::new("authenticator-test-secret", 1);
        let auth = Authenticator::new(
            store.clone(),
            jwt.clone(),
            UsageRecorder::new(store.clone()),
            Arc::new(SlidingWindowLimiter::new(0.0)),
            rate,
        );
        Fixture { store, auth, jwt }
    }

    fn fixture() -> Fixture {
        fixture_with(Settings::default().rate_limit)
    }

    fn meta() -> RequestMeta {
        RequestMeta {
            endpoint: "/api/v1/ai/chat".to_string(),
            method: "GET".to_string(),
            client_ip: Some("198.51.100.4".to_string()),
            user_agent: Some("tests".to_string()),
        }
    }

    async fn seed(store: &MemoryStore, limit: i32) -> (crate::db::User, crate::db::ApiKey) {
        let user = store
            .create_user(NewUser {
                email: "owner@example.com".to_string(),
                password_hash: "x".to_string(),
                full_name: "Owner".to_string(),
                plan: Plan::Free,
            })
            .await
            .unwrap();
        let key = store
            .create_api_key(NewApiKey {
                user_id: user.id,
                key_value: "sk-test-key".to_string(),
                name: "default".to_string(),
                daily_limit: limit,
                expires_at: None,
            })
            .await
            .unwrap();
        (user, key)
    }

    #[tokio::test]
    async fn test_missing_and_unknown_keys() {
        let f = fixture();
        let (_, key) = seed(&f.store, 10).await;

        assert_eq!(
            f.auth.authenticate_api_key(None, &meta()).await.unwrap_err(),
            AccessError::ApiKeyMissing
        );
        assert_eq!(
            f.auth.authenticate_api_key(Some("sk-nope"), &meta()).await.unwrap_err(),
            AccessError::InvalidApiKey
        );

        let row = f.store.find_api_key_by_id(key.id).await.unwrap().unwrap();
        assert_eq!(row.requests_today, 0);
        assert!(f.store.usage_entries().is_empty());
    }

    #[tokio::test]
    async fn test_quota_counts_down_then_rejects() {
        let f = fixture();
        seed(&f.store, 10).await;

        for expected in (0..10).rev() {
            let admitted = f
                .auth
                .authenticate_api_key(Some("sk-test-key"), &meta())
                .await
                .unwrap();
            assert_eq!(admitted.usage.remaining, expected);
            assert_eq!(admitted.usage.limit, 10);
        }

        let err = f
            .auth
            .authenticate_api_key(Some("sk-test-key"), &meta())
            .await
            .unwrap_err();
        assert_eq!(err, AccessError::RateLimitExceeded { limit: 10, used: 10 });
    }

    #[tokio::test]
    async fn test_expired_key_reports_expiry() {
        let f = fixture();
        let (_, mut key) = seed(&f.store, 10).await;
        let expires_at = Utc::now() - ChronoDuration::minutes(5);
        key.expires_at = Some(expires_at);
        f.store.put_api_key(key);

        let err = f
            .auth
            .authenticate_api_key(Some("sk-test-key"), &meta())
            .await
            .unwrap_err();
        assert_eq!(err, AccessError::ApiKeyExpired { expires_at });
    }

    #[tokio::test]
    async fn test_inactive_owner_spends_no_quota() {
        let f = fixture();
        let (user, key) = seed(&f.store, 10).await;
        f.store
            .update_user(user.id, UserPatch { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();

        let err = f
            .auth
            .authenticate_api_key(Some("sk-test-key"), &meta())
            .await
            .unwrap_err();
        assert_eq!(err, AccessError::UserInactive);
        let row = f.store.find_api_key_by_id(key.id).await.unwrap().unwrap();
        assert_eq!(row.requests_today, 0);
    }

    #[tokio::test]
    async fn test_burst_limiter_runs_before_quota() {
        let mut rate = Settings::default().rate_limit;
        rate.max_requests = 2;
        let f = fixture_with(rate);
        let (_, key) = seed(&f.store, 10).await;

        for _ in 0..2 {
            f.auth.authenticate_api_key(Some("sk-test-key"), &meta()).await.unwrap();
        }
        let err = f
            .auth
            .authenticate_api_key(Some("sk-test-key"), &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::RateLimited { limit: 2, .. }));

        let row = f.store.find_api_key_by_id(key.id).await.unwrap().unwrap();
        assert_eq!(row.requests_today, 2);
    }

    #[tokio::test]
    async fn test_bearer_checks_account_state() {
        let f = fixture();
        let (user, _) = seed(&f.store, 10).await;
        let token = f.jwt.issue(user.id, &user.email, user.plan).unwrap();

        let principal = f.auth.authenticate_bearer(Some(&token)).await.unwrap();
        assert_eq!(principal.id, user.id);

        f.store
            .update_user(user.id, UserPatch { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(
            f.auth.authenticate_bearer(Some(&token)).await.unwrap_err(),
            AccessError::AccountDeactivated
        );
        assert_eq!(
            f.auth.authenticate_bearer(None).await.unwrap_err(),
            AccessError::TokenRequired
        );
    }

    #[tokio::test]
    async fn test_bearer_for_deleted_user() {
        let f = fixture();
        let token = f.jwt.issue(uuid::Uuid::new_v4(), "ghost@example.com", Plan::Free).unwrap();
        assert_eq!(
            f.auth.authenticate_bearer(Some(&token)).await.unwrap_err(),
            AccessError::UserNotFound
        );
    }

    #[tokio::test]
    async fn test_optional_mode_never_fails() {
        let f = fixture();
        seed(&f.store, 10).await;

        assert!(f.auth.authenticate_api_key_optional(None, &meta()).await.is_none());
        assert!(f
            .auth
            .authenticate_api_key_optional(Some("sk-bad"), &meta())
            .await
            .is_none());
        assert!(f
            .auth
            .authenticate_api_key_optional(Some("sk-test-key"), &meta())
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_rejections_spend_the_caller_window() {
        let mut rate = Settings::default().rate_limit;
        rate.max_requests = 2;
        let f = fixture_with(rate);
        seed(&f.store, 10).await;

        let mut codes = Vec::new();
        for i in 0..4 {
            let err = f
                .auth
                .authenticate_api_key(Some(&format!("sk-guess-{i}")), &meta())
                .await
                .unwrap_err();
            codes.push(f.auth.charge_rejection(err, Some("198.51.100.4")).code());
        }
        assert_eq!(codes, ["INVALID_API_KEY", "INVALID_API_KEY", "RATE_LIMITED", "RATE_LIMITED"]);

        // Other callers keep their own window
        let err = f.auth.authenticate_bearer(Some("garbage")).await.unwrap_err();
        assert_eq!(f.auth.charge_rejection(err, Some("203.0.113.1")), AccessError::InvalidToken);

        // Quota denials are not credential failures
        let quota = AccessError::RateLimitExceeded { limit: 10, used: 10 };
        assert_eq!(f.auth.charge_rejection(quota.clone(), Some("198.51.100.4")), quota);
    }
}
