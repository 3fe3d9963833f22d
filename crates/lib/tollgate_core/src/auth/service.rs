//! Token issuance and rotation.
//!
//! Per user the stored record goes `NoRecord -> Active` on first issuance and
//! `Active -> Active` on every rotation. Rotation replaces the hash in place,
//! so the previous refresh token stops verifying as soon as the new hash is
//! written. There is no grace window.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::AuthError;
use super::hasher::SecretHasher;
use super::jwt::generate_access_token;
use super::refresh::{generate_refresh_token, parse_refresh_token};
use crate::models::token::TokenPair;
use crate::notify::{Notifier, SUBJECT_ANOTHER_IP, ip_mismatch_body};
use crate::store::{StoreError, TokenStore};

/// Where address-mismatch warnings go.
struct Alerts {
    notifier: Arc<dyn Notifier>,
    from: String,
    to: String,
}

/// Issues and rotates access/refresh token pairs.
///
/// Holds no per-request state; share one instance behind an `Arc`.
pub struct TokenService {
    signing_key: Vec<u8>,
    hasher: SecretHasher,
    store: Arc<dyn TokenStore>,
    alerts: Option<Arc<Alerts>>,
}

impl TokenService {
    pub fn new(signing_key: impl Into<Vec<u8>>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            signing_key: signing_key.into(),
            hasher: SecretHasher::default(),
            store,
            alerts: None,
        }
    }

    /// Replace the default hasher (e.g. a lower cost in tests).
    pub fn with_hasher(mut self, hasher: SecretHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Send address-mismatch warnings through `notifier`.
    pub fn with_notifier(
        mut self,
        notifier: Arc<dyn Notifier>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.alerts = Some(Arc::new(Alerts {
            notifier,
            from: from.into(),
            to: to.into(),
        }));
        self
    }

    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    /// Issue a new pair for `user_id` and make its refresh token the only
    /// one that verifies.
    pub async fn issue_tokens(&self, user_id: &str, ip: &str) -> Result<TokenPair, AuthError> {
        let uid = Uuid::parse_str(user_id)
            .map_err(|_| AuthError::Validation(format!("user_id must be a UUID: {user_id}")))?;

        let pair = self.issue_for(uid, ip).await?;
        info!(%uid, ip, "tokens issued");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// A token presented from another address still succeeds; the warning
    /// mail is sent in the background on a best-effort basis.
    pub async fn refresh_tokens(
        &self,
        refresh_token: &str,
        ip: &str,
    ) -> Result<TokenPair, AuthError> {
        let payload = parse_refresh_token(refresh_token)?;
        let uid = Uuid::parse_str(&payload.user_id)
            .map_err(|_| AuthError::Unauthorized("Invalid refresh token".into()))?;

        let record = match self.store.get_by_user_id(uid).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                return Err(AuthError::Unauthorized("Invalid refresh token".into()));
            }
            Err(e) => return Err(AuthError::storage("get refresh token by user_id", e)),
        };

        if !self.hasher.verify(&record.hash, refresh_token)? {
            warn!(%uid, "refresh token does not match stored hash");
            return Err(AuthError::Unauthorized("Invalid refresh token".into()));
        }

        if payload.ip != ip {
            self.notify_ip_mismatch(&payload.user_id, &payload.ip, ip);
        }

        let pair = self.issue_for(uid, ip).await?;
        info!(%uid, ip, "tokens rotated");
        Ok(pair)
    }

    async fn issue_for(&self, uid: Uuid, ip: &str) -> Result<TokenPair, AuthError> {
        let user_id = uid.to_string();
        let access_token = generate_access_token(&user_id, ip, &self.signing_key)?;
        let refresh_token = generate_refresh_token(&user_id, ip);
        let hash = self.hasher.hash(&refresh_token)?;

        self.store
            .upsert_token(uid, &hash)
            .await
            .map_err(|e| AuthError::storage("upsert refresh token", e))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Log the mismatch and hand the warning mail to a background task so
    /// a slow relay never holds up the refresh.
    fn notify_ip_mismatch(&self, user_id: &str, issued_ip: &str, current_ip: &str) {
        warn!(user_id, issued_ip, current_ip, "refresh from another IP address");

        let Some(alerts) = &self.alerts else {
            warn!("mailer not configured, IP mismatch notification skipped");
            return;
        };

        let alerts = Arc::clone(alerts);
        let user_id = user_id.to_string();
        let body = ip_mismatch_body(&user_id, issued_ip, current_ip);
        tokio::spawn(async move {
            if let Err(e) = alerts
                .notifier
                .send_mail(&alerts.from, &alerts.to, SUBJECT_ANOTHER_IP, &body)
                .await
            {
                error!(user_id = %user_id, error = %e, "unable to send IP mismatch notification");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::cluster::ClusterError;
    use crate::models::token::TokenRecord;
    use crate::notify::NotifyError;
    use crate::store::memory::MemoryTokenStore;

    const USER: &str = "11111111-1111-1111-1111-111111111111";

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String, String, String)>>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl RecordingNotifier {
        /// Wait for the background delivery of `n` mails.
        async fn wait_for(&self, n: usize) {
            for _ in 0..100 {
                if self.sent.lock().unwrap().len() >= n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("expected {n} mails, got {}", self.sent.lock().unwrap().len());
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_mail(
            &self,
            from: &str,
            to: &str,
            subject: &str,
            body: &str,
        ) -> Result<(), NotifyError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.sent.lock().unwrap().push((
                from.to_string(),
                to.to_string(),
                subject.to_string(),
                body.to_string(),
            ));
            if self.fail {
                return Err(NotifyError::Address(
                    "smtp down".parse::<lettre::Address>().unwrap_err(),
                ));
            }
            Ok(())
        }
    }

    /// Store whose every call fails with a routing error.
    struct NoPrimaryStore;

    #[async_trait]
    impl TokenStore for NoPrimaryStore {
        async fn get_by_user_id(&self, _user_id: Uuid) -> Result<TokenRecord, StoreError> {
            Err(StoreError::Routing(ClusterError::NoNodeAvailable))
        }

        async fn upsert_token(&self, _user_id: Uuid, _hash: &str) -> Result<i32, StoreError> {
            Err(StoreError::Routing(ClusterError::NoPrimary))
        }
    }

    fn service(store: Arc<dyn TokenStore>) -> TokenService {
        TokenService::new("test-secret", store).with_hasher(SecretHasher::new(4))
    }

    #[tokio::test]
    async fn issue_rejects_non_uuid_user() {
        let svc = service(Arc::new(MemoryTokenStore::new()));
        let err = svc.issue_tokens("bob", "1.2.3.4").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_refresh_token() {
        let store = Arc::new(MemoryTokenStore::new());
        let svc = service(store.clone());

        let first = svc.issue_tokens(USER, "1.2.3.4").await.unwrap();
        let second = svc.issue_tokens(USER, "1.2.3.4").await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        let record = store
            .get_by_user_id(Uuid::parse_str(USER).unwrap())
            .await
            .unwrap();
        assert!(svc.hasher().verify(&record.hash, &second.refresh_token).unwrap());
        assert!(!svc.hasher().verify(&record.hash, &first.refresh_token).unwrap());
    }

    #[tokio::test]
    async fn refresh_for_unknown_user_is_unauthorized() {
        let svc = service(Arc::new(MemoryTokenStore::new()));
        let token = generate_refresh_token(USER, "1.2.3.4");
        let err = svc.refresh_tokens(&token, "1.2.3.4").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn refresh_with_non_uuid_payload_is_unauthorized() {
        let svc = service(Arc::new(MemoryTokenStore::new()));
        let token = generate_refresh_token("bob", "1.2.3.4");
        let err = svc.refresh_tokens(&token, "1.2.3.4").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn malformed_refresh_token_is_unauthorized() {
        let svc = service(Arc::new(MemoryTokenStore::new()));
        for token in ["", "garbage", "a.b.c", "Zm9v"] {
            let err = svc.refresh_tokens(token, "1.2.3.4").await.unwrap_err();
            assert!(err.is_unauthorized(), "token {token:?}");
        }
    }

    #[tokio::test]
    async fn forged_token_for_existing_user_is_unauthorized() {
        let svc = service(Arc::new(MemoryTokenStore::new()));
        svc.issue_tokens(USER, "1.2.3.4").await.unwrap();

        let forged = generate_refresh_token(USER, "1.2.3.4");
        let err = svc.refresh_tokens(&forged, "1.2.3.4").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn ip_mismatch_notifies_once_and_still_rotates() {
        let notifier = Arc::new(RecordingNotifier::default());
        let svc = service(Arc::new(MemoryTokenStore::new())).with_notifier(
            notifier.clone(),
            "alerts@example.com",
            "security@example.com",
        );

        let issued = svc.issue_tokens(USER, "1.2.3.4").await.unwrap();
        let rotated = svc
            .refresh_tokens(&issued.refresh_token, "5.6.7.8")
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token, issued.refresh_token);

        notifier.wait_for(1).await;
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (from, to, subject, body) = &sent[0];
        assert_eq!(from, "alerts@example.com");
        assert_eq!(to, "security@example.com");
        assert_eq!(subject, SUBJECT_ANOTHER_IP);
        assert!(body.contains("1.2.3.4") && body.contains("5.6.7.8"));

        // New refresh token is bound to the new address.
        let payload = parse_refresh_token(&rotated.refresh_token).unwrap();
        assert_eq!(payload.ip, "5.6.7.8");
    }

    #[tokio::test]
    async fn same_ip_refresh_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let svc = service(Arc::new(MemoryTokenStore::new())).with_notifier(
            notifier.clone(),
            "a@example.com",
            "b@example.com",
        );

        let issued = svc.issue_tokens(USER, "1.2.3.4").await.unwrap();
        svc.refresh_tokens(&issued.refresh_token, "1.2.3.4")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_does_not_abort_refresh() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let svc = service(Arc::new(MemoryTokenStore::new())).with_notifier(
            notifier.clone(),
            "a@example.com",
            "b@example.com",
        );

        let issued = svc.issue_tokens(USER, "1.2.3.4").await.unwrap();
        assert!(
            svc.refresh_tokens(&issued.refresh_token, "9.9.9.9")
                .await
                .is_ok()
        );
        notifier.wait_for(1).await;
    }

    #[tokio::test]
    async fn slow_mailer_does_not_delay_refresh() {
        let notifier = Arc::new(RecordingNotifier {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let svc = service(Arc::new(MemoryTokenStore::new())).with_notifier(
            notifier.clone(),
            "a@example.com",
            "b@example.com",
        );

        let issued = svc.issue_tokens(USER, "1.2.3.4").await.unwrap();
        let refreshed = tokio::time::timeout(
            Duration::from_secs(5),
            svc.refresh_tokens(&issued.refresh_token, "9.9.9.9"),
        )
        .await
        .expect("refresh must not wait for mail delivery");
        assert!(refreshed.is_ok());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_notifier_is_not_an_error() {
        let svc = service(Arc::new(MemoryTokenStore::new()));
        let issued = svc.issue_tokens(USER, "1.2.3.4").await.unwrap();
        assert!(
            svc.refresh_tokens(&issued.refresh_token, "9.9.9.9")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn routing_failures_surface_distinctly() {
        let svc = service(Arc::new(NoPrimaryStore));

        let err = svc.issue_tokens(USER, "1.2.3.4").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Routing {
                source: ClusterError::NoPrimary,
                ..
            }
        ));

        let token = generate_refresh_token(USER, "1.2.3.4");
        let err = svc.refresh_tokens(&token, "1.2.3.4").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Routing {
                source: ClusterError::NoNodeAvailable,
                ..
            }
        ));
    }
}
