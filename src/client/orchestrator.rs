//! Upload orchestration: select → token → transfer → listing refresh.
//!
//! State lives behind an async mutex that is never held across a remote
//! call. Each file selection bumps a generation counter; a remote call that
//! returns after its generation was superseded drops its result (and any
//! token it produced) instead of writing it back.

use super::{
    error::UploadError,
    listing::ListingService,
    token_authority::TokenAuthority,
    transfer::TransferStrategy,
};
use crate::{
    config::ClientConfig,
    models::{
        access_token::{AccessToken, PermissionSet},
        listing::ContainerListing,
        upload::{SourceFile, TransferPath, UploadStatus},
    },
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Attempt lifecycle. The token only exists inside the variants that may
/// legitimately hold one.
#[derive(Debug, Clone)]
enum AttemptState {
    Idle,
    TokenRequested,
    TokenReady(AccessToken),
    TokenFailed,
    Transferring {
        token: AccessToken,
        path: TransferPath,
    },
    TransferSucceeded {
        path: TransferPath,
    },
    TransferFailed {
        token: AccessToken,
        path: TransferPath,
    },
    ListingRefreshed {
        path: TransferPath,
    },
}

impl AttemptState {
    fn status(&self) -> UploadStatus {
        match self {
            AttemptState::Idle => UploadStatus::Idle,
            AttemptState::TokenRequested => UploadStatus::TokenRequested,
            AttemptState::TokenReady(_) => UploadStatus::TokenReady,
            AttemptState::TokenFailed => UploadStatus::TokenFailed,
            AttemptState::Transferring { .. } => UploadStatus::Transferring,
            AttemptState::TransferSucceeded { .. } => UploadStatus::TransferSucceeded,
            AttemptState::TransferFailed { .. } => UploadStatus::TransferFailed,
            AttemptState::ListingRefreshed { .. } => UploadStatus::ListingRefreshed,
        }
    }

    fn path(&self) -> Option<TransferPath> {
        match self {
            AttemptState::Transferring { path, .. }
            | AttemptState::TransferSucceeded { path }
            | AttemptState::TransferFailed { path, .. }
            | AttemptState::ListingRefreshed { path } => Some(*path),
            _ => None,
        }
    }

    fn token(&self) -> Option<&AccessToken> {
        match self {
            AttemptState::TokenReady(token)
            | AttemptState::Transferring { token, .. }
            | AttemptState::TransferFailed { token, .. } => Some(token),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct UploadAttempt {
    file: SourceFile,
    state: AttemptState,
}

#[derive(Debug, Default)]
struct Session {
    generation: u64,
    attempt: Option<UploadAttempt>,
    status_text: Option<String>,
    listing: Option<ContainerListing>,
}

impl Session {
    fn current_status(&self) -> UploadStatus {
        self.attempt
            .as_ref()
            .map(|a| a.state.status())
            .unwrap_or(UploadStatus::Idle)
    }
}

/// What a successful transfer produced. The listing outcome is reported
/// separately and never affects the transfer's success.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub path: TransferPath,
    pub object_key: String,
    pub listing: Option<ContainerListing>,
    pub listing_error: Option<String>,
}

/// Coordinates one upload attempt at a time. Cloning yields another handle
/// onto the same session.
#[derive(Clone)]
pub struct UploadOrchestrator {
    config: Arc<ClientConfig>,
    authority: Arc<dyn TokenAuthority>,
    listing: Arc<dyn ListingService>,
    session: Arc<Mutex<Session>>,
}

impl UploadOrchestrator {
    pub fn new(
        config: ClientConfig,
        authority: Arc<dyn TokenAuthority>,
        listing: Arc<dyn ListingService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            authority,
            listing,
            session: Arc::new(Mutex::new(Session::default())),
        }
    }

    /// Start a new attempt for `file`. Always lands in `Idle`, dropping any
    /// token and status text, even while a remote call is in flight.
    pub async fn select_file(&self, file: SourceFile) {
        let mut session = self.session.lock().await;
        session.generation += 1;
        debug!(
            file = %file.name,
            size = file.len(),
            generation = session.generation,
            "file selected"
        );
        session.attempt = Some(UploadAttempt {
            file,
            state: AttemptState::Idle,
        });
        session.status_text = None;
    }

    /// Request a write token for the selected file.
    ///
    /// Allowed from `Idle`, `TokenFailed` and `TransferFailed`; a fresh token
    /// replaces any previous one.
    pub async fn request_token(&self) -> Result<AccessToken, UploadError> {
        let (generation, object_key) = {
            let mut guard = self.session.lock().await;
            let session = &mut *guard;
            let attempt = session
                .attempt
                .as_mut()
                .ok_or(UploadError::NoFileSelected)?;
            match attempt.state {
                AttemptState::Idle
                | AttemptState::TokenFailed
                | AttemptState::TransferFailed { .. } => {}
                ref other => {
                    return Err(UploadError::InvalidState {
                        status: other.status(),
                        action: "request a token",
                    });
                }
            }
            attempt.state = AttemptState::TokenRequested;
            session.status_text = None;
            (session.generation, attempt.file.name.clone())
        };

        let result = self
            .authority
            .issue_token(
                &object_key,
                &PermissionSet::write_only(),
                self.config.ttl_minutes,
                &self.config.container,
            )
            .await;

        let mut guard = self.session.lock().await;
        let session = &mut *guard;
        let attempt = match session.attempt.as_mut() {
            Some(attempt) if session.generation == generation => attempt,
            _ => {
                debug!(object_key, "discarding token for superseded attempt");
                return Err(UploadError::Superseded);
            }
        };

        match result {
            Ok(token) => {
                attempt.state = AttemptState::TokenReady(token.clone());
                session.status_text = Some(format!("Access token ready for {}", object_key));
                Ok(token)
            }
            Err(err) => {
                warn!(object_key, error = %err, "token issuance failed");
                attempt.state = AttemptState::TokenFailed;
                session.status_text = Some(err.status_text());
                Err(err)
            }
        }
    }

    /// Write the selected file with the caller's chosen strategy, then
    /// refresh the listing once.
    ///
    /// Allowed from `TokenReady`, and from `TransferFailed` to retry with the
    /// same token while it is unexpired.
    pub async fn transfer(
        &self,
        strategy: &dyn TransferStrategy,
    ) -> Result<TransferReport, UploadError> {
        let path = strategy.path();

        let (generation, file, token) = {
            let mut guard = self.session.lock().await;
            let session = &mut *guard;
            let attempt = session
                .attempt
                .as_mut()
                .ok_or(UploadError::NoFileSelected)?;
            let token = match &attempt.state {
                AttemptState::TokenReady(token) | AttemptState::TransferFailed { token, .. } => {
                    token.clone()
                }
                other => {
                    return Err(UploadError::InvalidState {
                        status: other.status(),
                        action: "start a transfer",
                    });
                }
            };

            let local_check = if token.is_expired() {
                Err(UploadError::TokenExpired(token.target_object_key.clone()))
            } else {
                strategy.preflight(&attempt.file)
            };
            if let Err(err) = local_check {
                warn!(file = %attempt.file.name, %path, error = %err, "transfer refused locally");
                attempt.state = AttemptState::TransferFailed { token, path };
                session.status_text = Some(err.status_text());
                return Err(err);
            }

            attempt.state = AttemptState::Transferring {
                token: token.clone(),
                path,
            };
            session.status_text = Some(format!(
                "Uploading {} via {} transfer",
                attempt.file.name, path
            ));
            (session.generation, attempt.file.clone(), token)
        };

        let result = strategy.transfer(&file, &token).await;

        {
            let mut guard = self.session.lock().await;
            let session = &mut *guard;
            let attempt = match session.attempt.as_mut() {
                Some(attempt) if session.generation == generation => attempt,
                _ => {
                    debug!(file = %file.name, "discarding transfer result for superseded attempt");
                    return Err(UploadError::Superseded);
                }
            };
            match result {
                Ok(()) => {
                    info!(file = %file.name, %path, "transfer succeeded");
                    attempt.state = AttemptState::TransferSucceeded { path };
                    session.status_text =
                        Some(format!("Uploaded {} via {} transfer", file.name, path));
                }
                Err(err) => {
                    warn!(file = %file.name, %path, error = %err, "transfer failed");
                    attempt.state = AttemptState::TransferFailed { token, path };
                    session.status_text = Some(err.status_text());
                    return Err(err);
                }
            }
        }

        let mut report = TransferReport {
            path,
            object_key: file.name.clone(),
            listing: None,
            listing_error: None,
        };

        let listing = self.listing.list(&self.config.container).await;

        let mut guard = self.session.lock().await;
        let session = &mut *guard;
        match listing {
            Ok(listing) => {
                session.listing = Some(listing.clone());
                if session.generation == generation {
                    if let Some(attempt) = session.attempt.as_mut() {
                        attempt.state = AttemptState::ListingRefreshed { path };
                    }
                }
                report.listing = Some(listing);
            }
            Err(err) => {
                warn!(
                    container = %self.config.container,
                    error = %err,
                    "listing refresh failed, keeping previous listing"
                );
                report.listing_error = Some(err.status_text());
            }
        }
        Ok(report)
    }

    /// Select, request a token and transfer in one go.
    pub async fn upload(
        &self,
        file: SourceFile,
        strategy: &dyn TransferStrategy,
    ) -> Result<TransferReport, UploadError> {
        self.select_file(file).await;
        self.request_token().await?;
        self.transfer(strategy).await
    }

    pub async fn status(&self) -> UploadStatus {
        self.session.lock().await.current_status()
    }

    pub async fn status_text(&self) -> Option<String> {
        self.session.lock().await.status_text.clone()
    }

    /// Path of the current attempt's latest transfer, once one has started.
    pub async fn transfer_path(&self) -> Option<TransferPath> {
        let session = self.session.lock().await;
        session.attempt.as_ref().and_then(|a| a.state.path())
    }

    /// The token currently owned by the attempt, if any.
    pub async fn token(&self) -> Option<AccessToken> {
        let session = self.session.lock().await;
        session
            .attempt
            .as_ref()
            .and_then(|a| a.state.token().cloned())
    }

    /// Last successfully fetched listing.
    pub async fn listing(&self) -> Option<ContainerListing> {
        self.session.lock().await.listing.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transfer::DirectTransfer;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::{
        collections::VecDeque,
        sync::{
            Mutex as StdMutex,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tokio::sync::Notify;

    struct MockAuthority {
        calls: AtomicUsize,
        failure: Option<String>,
        ttl_override: Option<Duration>,
        started: Notify,
        gate: Option<Notify>,
    }

    impl MockAuthority {
        fn build(
            failure: Option<String>,
            ttl_override: Option<Duration>,
            gated: bool,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failure,
                ttl_override,
                started: Notify::new(),
                gate: gated.then(Notify::new),
            })
        }

        fn ok() -> Arc<Self> {
            Self::build(None, None, false)
        }

        fn failing(message: &str) -> Arc<Self> {
            Self::build(Some(message.to_string()), None, false)
        }

        fn expired() -> Arc<Self> {
            Self::build(None, Some(Duration::minutes(-1)), false)
        }

        /// Blocks inside `issue_token` until `gate` is notified.
        fn gated() -> Arc<Self> {
            Self::build(None, None, true)
        }
    }

    #[async_trait]
    impl TokenAuthority for MockAuthority {
        async fn issue_token(
            &self,
            object_key: &str,
            permissions: &PermissionSet,
            ttl_minutes: i64,
            container: &str,
        ) -> Result<AccessToken, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(message) = &self.failure {
                return Err(UploadError::TokenIssuance {
                    message: message.clone(),
                    trace: Some("mock trace".into()),
                });
            }
            let ttl = self
                .ttl_override
                .unwrap_or_else(|| Duration::minutes(ttl_minutes));
            Ok(AccessToken {
                target_object_key: object_key.to_string(),
                container: container.to_string(),
                permissions: permissions.clone(),
                expiry: Utc::now() + ttl,
                endpoint: format!("https://store/{}/{}?sig=mock", container, object_key),
            })
        }
    }

    #[derive(Default)]
    struct MockListing {
        calls: AtomicUsize,
        responses: StdMutex<VecDeque<Result<Vec<String>, String>>>,
    }

    impl MockListing {
        fn with(responses: Vec<Result<Vec<String>, String>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: StdMutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl ListingService for MockListing {
        async fn list(&self, container: &str) -> Result<ContainerListing, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            next.map(|entries| ContainerListing {
                container_name: container.to_string(),
                entries,
            })
            .map_err(|message| UploadError::listing(message))
        }
    }

    struct MockStrategy {
        path: TransferPath,
        calls: AtomicUsize,
        failure: Option<String>,
        started: Notify,
        gate: Option<Notify>,
    }

    impl MockStrategy {
        fn new(path: TransferPath) -> Arc<Self> {
            Arc::new(Self {
                path,
                calls: AtomicUsize::new(0),
                failure: None,
                started: Notify::new(),
                gate: None,
            })
        }

        fn failing(path: TransferPath, message: &str) -> Arc<Self> {
            Arc::new(Self {
                path,
                calls: AtomicUsize::new(0),
                failure: Some(message.to_string()),
                started: Notify::new(),
                gate: None,
            })
        }

        fn gated(path: TransferPath) -> Arc<Self> {
            Arc::new(Self {
                path,
                calls: AtomicUsize::new(0),
                failure: None,
                started: Notify::new(),
                gate: Some(Notify::new()),
            })
        }
    }

    #[async_trait]
    impl TransferStrategy for MockStrategy {
        fn path(&self) -> TransferPath {
            self.path
        }

        async fn transfer(
            &self,
            _file: &SourceFile,
            _token: &AccessToken,
        ) -> Result<(), UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.failure {
                Some(message) => Err(UploadError::transfer(self.path, message.clone())),
                None => Ok(()),
            }
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new("http://api", "http://proxy").with_container("c")
    }

    fn orchestrator(
        authority: Arc<MockAuthority>,
        listing: Arc<MockListing>,
    ) -> UploadOrchestrator {
        UploadOrchestrator::new(config(), authority, listing)
    }

    fn photo() -> SourceFile {
        SourceFile::new("photo.jpg", vec![7u8; 10_000])
    }

    #[tokio::test]
    async fn scenario_direct_upload_refreshes_listing() {
        let authority = MockAuthority::ok();
        let listing = MockListing::with(vec![Ok(vec!["https://store/c/photo.jpg".into()])]);
        let orch = orchestrator(authority.clone(), listing.clone());
        let direct = MockStrategy::new(TransferPath::Direct);

        orch.select_file(photo()).await;
        let token = orch.request_token().await.unwrap();
        assert_eq!(token.target_object_key, "photo.jpg");
        assert_eq!(token.permissions, PermissionSet::write_only());
        assert_eq!(orch.status().await, UploadStatus::TokenReady);

        let report = orch.transfer(direct.as_ref()).await.unwrap();
        assert_eq!(report.path, TransferPath::Direct);
        assert_eq!(direct.calls.load(Ordering::SeqCst), 1);
        assert_eq!(listing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.status().await, UploadStatus::ListingRefreshed);
        assert!(orch.token().await.is_none());

        let shown = orch.listing().await.unwrap();
        assert_eq!(shown.entries, vec!["https://store/c/photo.jpg"]);
        assert!(ContainerListing::is_image(&shown.entries[0]));
    }

    #[tokio::test]
    async fn oversized_direct_file_fails_locally_and_keeps_token() {
        let listing = MockListing::with(vec![]);
        let orch = orchestrator(MockAuthority::ok(), listing.clone());
        // Points nowhere; any network attempt would surface as a Transfer error.
        let direct = DirectTransfer::new(reqwest::Client::new(), 256_000);

        orch.select_file(SourceFile::new("doc.pdf", vec![0u8; 300_000]))
            .await;
        orch.request_token().await.unwrap();

        let err = orch.transfer(&direct).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::PayloadTooLarge {
                size: 300_000,
                limit: 256_000
            }
        ));
        assert_eq!(orch.status().await, UploadStatus::TransferFailed);
        assert!(orch.status_text().await.unwrap().contains("256000"));
        assert!(orch.token().await.is_some());
        assert_eq!(listing.calls.load(Ordering::SeqCst), 0);

        // Same token may still be used through the proxy.
        let proxied = MockStrategy::new(TransferPath::Proxied);
        orch.transfer(proxied.as_ref()).await.unwrap();
        assert_eq!(orch.status().await, UploadStatus::ListingRefreshed);
    }

    #[tokio::test]
    async fn token_failure_blocks_transfer_and_listing() {
        let listing = MockListing::with(vec![]);
        let orch = orchestrator(MockAuthority::failing("network unreachable"), listing.clone());
        let direct = MockStrategy::new(TransferPath::Direct);

        orch.select_file(photo()).await;
        let err = orch.request_token().await.unwrap_err();
        assert!(matches!(err, UploadError::TokenIssuance { .. }));
        assert_eq!(orch.status().await, UploadStatus::TokenFailed);
        let text = orch.status_text().await.unwrap();
        assert!(text.contains("network unreachable"));
        assert!(text.contains("mock trace"));

        let err = orch.transfer(direct.as_ref()).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::InvalidState {
                status: UploadStatus::TokenFailed,
                ..
            }
        ));
        assert_eq!(direct.calls.load(Ordering::SeqCst), 0);
        assert_eq!(listing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn proxied_failure_reports_server_text_without_listing() {
        let listing = MockListing::with(vec![]);
        let orch = orchestrator(MockAuthority::ok(), listing.clone());
        let proxied = MockStrategy::failing(TransferPath::Proxied, "502 Bad Gateway: disk full");

        orch.select_file(photo()).await;
        orch.request_token().await.unwrap();
        let err = orch.transfer(proxied.as_ref()).await.unwrap_err();

        assert!(matches!(
            err,
            UploadError::Transfer {
                path: TransferPath::Proxied,
                ..
            }
        ));
        assert_eq!(orch.status().await, UploadStatus::TransferFailed);
        assert!(orch.status_text().await.unwrap().contains("disk full"));
        assert_eq!(listing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listing_failure_keeps_success_and_previous_listing() {
        let listing = MockListing::with(vec![
            Ok(vec!["https://store/c/first.png".into()]),
            Err("500 Internal Server Error".into()),
        ]);
        let orch = orchestrator(MockAuthority::ok(), listing.clone());
        let direct = MockStrategy::new(TransferPath::Direct);

        orch.upload(SourceFile::new("first.png", vec![1u8; 3]), direct.as_ref())
            .await
            .unwrap();
        let report = orch
            .upload(SourceFile::new("second.png", vec![1u8; 3]), direct.as_ref())
            .await
            .unwrap();

        assert!(report.listing.is_none());
        assert!(report.listing_error.unwrap().contains("500"));
        assert_eq!(orch.status().await, UploadStatus::TransferSucceeded);
        assert_eq!(
            orch.listing().await.unwrap().entries,
            vec!["https://store/c/first.png"]
        );
        assert_eq!(listing.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn each_successful_transfer_lists_exactly_once() {
        for path in [TransferPath::Direct, TransferPath::Proxied] {
            let listing = MockListing::with(vec![]);
            let orch = orchestrator(MockAuthority::ok(), listing.clone());
            let strategy = MockStrategy::new(path);
            orch.upload(photo(), strategy.as_ref()).await.unwrap();
            assert_eq!(listing.calls.load(Ordering::SeqCst), 1, "{}", path);
        }
    }

    #[tokio::test]
    async fn reselection_clears_token_and_status_from_any_state() {
        let orch = orchestrator(MockAuthority::ok(), MockListing::with(vec![]));
        let failing = MockStrategy::failing(TransferPath::Direct, "boom");

        orch.select_file(photo()).await;
        orch.request_token().await.unwrap();
        assert!(orch.token().await.is_some());
        orch.select_file(photo()).await;
        assert_eq!(orch.status().await, UploadStatus::Idle);
        assert!(orch.token().await.is_none());
        assert!(orch.status_text().await.is_none());

        orch.request_token().await.unwrap();
        let _ = orch.transfer(failing.as_ref()).await;
        assert_eq!(orch.status().await, UploadStatus::TransferFailed);
        orch.select_file(photo()).await;
        assert_eq!(orch.status().await, UploadStatus::Idle);
        assert!(orch.token().await.is_none());
        assert!(orch.status_text().await.is_none());
    }

    #[tokio::test]
    async fn reselection_mid_transfer_supersedes_the_attempt() {
        let listing = MockListing::with(vec![]);
        let orch = orchestrator(MockAuthority::ok(), listing.clone());
        let gated = MockStrategy::gated(TransferPath::Direct);

        orch.select_file(photo()).await;
        orch.request_token().await.unwrap();

        let task = {
            let orch = orch.clone();
            let gated = gated.clone();
            tokio::spawn(async move { orch.transfer(gated.as_ref()).await })
        };
        gated.started.notified().await;
        assert_eq!(orch.status().await, UploadStatus::Transferring);

        // A concurrent second transfer is refused.
        let second = MockStrategy::new(TransferPath::Proxied);
        assert!(matches!(
            orch.transfer(second.as_ref()).await,
            Err(UploadError::InvalidState {
                status: UploadStatus::Transferring,
                ..
            })
        ));

        orch.select_file(SourceFile::new("other.png", vec![1u8; 5]))
            .await;
        assert_eq!(orch.status().await, UploadStatus::Idle);
        assert!(orch.token().await.is_none());

        if let Some(gate) = &gated.gate {
            gate.notify_one();
        }
        let result = task.await.unwrap();
        assert!(matches!(result, Err(UploadError::Superseded)));
        assert_eq!(orch.status().await, UploadStatus::Idle);
        assert!(orch.token().await.is_none());
        assert_eq!(listing.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transfer_requires_a_ready_token() {
        let orch = orchestrator(MockAuthority::ok(), MockListing::with(vec![]));
        let direct = MockStrategy::new(TransferPath::Direct);

        assert!(matches!(
            orch.transfer(direct.as_ref()).await,
            Err(UploadError::NoFileSelected)
        ));
        orch.select_file(photo()).await;
        assert!(matches!(
            orch.transfer(direct.as_ref()).await,
            Err(UploadError::InvalidState {
                status: UploadStatus::Idle,
                ..
            })
        ));
        assert_eq!(direct.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_transfer_may_retry_with_same_unexpired_token() {
        let authority = MockAuthority::ok();
        let orch = orchestrator(authority.clone(), MockListing::with(vec![]));
        let failing = MockStrategy::failing(TransferPath::Direct, "503");
        let working = MockStrategy::new(TransferPath::Direct);

        orch.select_file(photo()).await;
        let first = orch.request_token().await.unwrap();
        assert!(orch.transfer(failing.as_ref()).await.is_err());
        assert_eq!(orch.token().await, Some(first));

        orch.transfer(working.as_ref()).await.unwrap();
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.status().await, UploadStatus::ListingRefreshed);
    }

    #[tokio::test]
    async fn expired_token_fails_locally_and_a_fresh_one_can_be_requested() {
        let orch = orchestrator(MockAuthority::expired(), MockListing::with(vec![]));
        let direct = MockStrategy::new(TransferPath::Direct);

        orch.select_file(photo()).await;
        orch.request_token().await.unwrap();
        let err = orch.transfer(direct.as_ref()).await.unwrap_err();
        assert!(matches!(err, UploadError::TokenExpired(_)));
        assert_eq!(direct.calls.load(Ordering::SeqCst), 0);
        assert_eq!(orch.status().await, UploadStatus::TransferFailed);

        orch.request_token().await.unwrap();
        assert_eq!(orch.status().await, UploadStatus::TokenReady);
    }

    #[tokio::test]
    async fn token_cannot_be_requested_twice_for_one_attempt() {
        let authority = MockAuthority::ok();
        let orch = orchestrator(authority.clone(), MockListing::with(vec![]));

        orch.select_file(photo()).await;
        orch.request_token().await.unwrap();
        assert!(matches!(
            orch.request_token().await,
            Err(UploadError::InvalidState {
                status: UploadStatus::TokenReady,
                ..
            })
        ));
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reselection_while_token_is_pending_drops_the_late_token() {
        let authority = MockAuthority::gated();
        let orch = orchestrator(authority.clone(), MockListing::with(vec![]));

        orch.select_file(photo()).await;
        let task = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.request_token().await })
        };
        authority.started.notified().await;
        assert_eq!(orch.status().await, UploadStatus::TokenRequested);

        orch.select_file(SourceFile::new("other.png", vec![1u8; 5]))
            .await;
        assert_eq!(orch.status().await, UploadStatus::Idle);

        if let Some(gate) = &authority.gate {
            gate.notify_one();
        }
        let result = task.await.unwrap();
        assert!(matches!(result, Err(UploadError::Superseded)));
        assert_eq!(orch.status().await, UploadStatus::Idle);
        assert!(orch.token().await.is_none());
        assert!(orch.status_text().await.is_none());
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transfer_path_follows_the_latest_transfer() {
        let orch = orchestrator(MockAuthority::ok(), MockListing::with(vec![]));
        let failing = MockStrategy::failing(TransferPath::Direct, "503");
        let proxied = MockStrategy::new(TransferPath::Proxied);

        orch.select_file(photo()).await;
        assert_eq!(orch.transfer_path().await, None);
        orch.request_token().await.unwrap();
        assert_eq!(orch.transfer_path().await, None);

        let _ = orch.transfer(failing.as_ref()).await;
        assert_eq!(orch.transfer_path().await, Some(TransferPath::Direct));
        orch.transfer(proxied.as_ref()).await.unwrap();
        assert_eq!(orch.transfer_path().await, Some(TransferPath::Proxied));

        orch.select_file(photo()).await;
        assert_eq!(orch.transfer_path().await, None);
    }
}
