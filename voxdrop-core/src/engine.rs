//! Chunked transfer with tiered retries.
//!
//! Every attempt performs a full resumable transfer of the staged payload.
//! Attempt `k` uses chunk tier `(k - 1) mod ladder_len`, so a connection that
//! keeps breaking on large requests gets smaller ones next time round, and a
//! slow but stable one gets larger ones.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    classify, AttemptOutcome, ContainerId, ErrorClass, NewObject, RemoteRef, RemoteStore,
    RetryPolicy, StagedArtifact, StorePhase, TransferAttempt, TransferConfig, UploadError,
    UploadResult,
};

/// Waits out a backoff delay
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().push(delay);
    }
}

/// Ordered chunk sizes cycled through by successive attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkLadder {
    tiers: Vec<u64>,
}

impl ChunkLadder {
    pub fn new(tiers: Vec<u64>) -> UploadResult<Self> {
        TransferConfig::default()
            .with_chunk_ladder(tiers.clone())
            .validate()?;
        Ok(Self { tiers })
    }

    /// Chunk size for attempt number `attempt` (1-indexed)
    pub fn tier_for(&self, attempt: u32) -> u64 {
        let index = (attempt.max(1) - 1) as usize % self.tiers.len();
        self.tiers[index]
    }

    pub fn tiers(&self) -> &[u64] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

/// A successful transfer and the attempts it took
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub reference: RemoteRef,
    pub attempts: Vec<TransferAttempt>,
}

impl TransferReport {
    /// Chunk size used by each attempt, in order
    pub fn tiers_used(&self) -> Vec<u64> {
        self.attempts.iter().map(|a| a.chunk_size).collect()
    }
}

enum TransferState {
    Idle,
    Attempting { attempt: u32, chunk_size: u64 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded(RemoteRef),
    Failed(UploadError),
}

/// Resumable, retried transfer of staged payloads
#[derive(Clone)]
pub struct ChunkedTransferEngine {
    store: Arc<dyn RemoteStore>,
    ladder: ChunkLadder,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ChunkedTransferEngine {
    pub fn new(store: Arc<dyn RemoteStore>, config: &TransferConfig) -> UploadResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            ladder: ChunkLadder::new(config.chunk_ladder.clone())?,
            policy: config.retry.clone(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn ladder(&self) -> &ChunkLadder {
        &self.ladder
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload `content` as `name` into `container`
    pub async fn upload(
        &self,
        content: &StagedArtifact,
        name: &str,
        container: &ContainerId,
    ) -> UploadResult<TransferReport> {
        self.upload_object(content, &NewObject::new(name, container.clone()))
            .await
    }

    /// Upload `content` with full object metadata.
    ///
    /// Transient failures are retried with capped exponential backoff and the
    /// next chunk tier until success or `max_attempts`; fatal failures return
    /// at once without sleeping.
    #[instrument(skip(self, content, object), fields(name = %object.name, container = %object.parent, size_bytes = content.len()))]
    pub async fn upload_object(
        &self,
        content: &StagedArtifact,
        object: &NewObject,
    ) -> UploadResult<TransferReport> {
        let mut attempts: Vec<TransferAttempt> = Vec::new();
        let mut state = TransferState::Idle;

        loop {
            state = match state {
                TransferState::Idle => TransferState::Attempting {
                    attempt: 1,
                    chunk_size: self.ladder.tier_for(1),
                },

                TransferState::Attempting { attempt, chunk_size } => {
                    debug!(attempt, chunk_size, "transfer attempt started");
                    self.attempt(content, object, attempt, chunk_size, &mut attempts)
                        .await
                }

                TransferState::Backoff { attempt, delay } => {
                    self.sleeper.sleep(delay).await;
                    let next = attempt.saturating_add(1);
                    TransferState::Attempting {
                        attempt: next,
                        chunk_size: self.ladder.tier_for(next),
                    }
                }

                TransferState::Succeeded(reference) => {
                    info!(
                        reference = %reference,
                        attempts = attempts.len(),
                        "transfer complete"
                    );
                    return Ok(TransferReport {
                        reference,
                        attempts,
                    });
                }

                TransferState::Failed(err) => return Err(err),
            };
        }
    }

    async fn attempt(
        &self,
        content: &StagedArtifact,
        object: &NewObject,
        attempt: u32,
        chunk_size: u64,
        attempts: &mut Vec<TransferAttempt>,
    ) -> TransferState {
        let err = match self.store.create_object(object, content, chunk_size).await {
            Ok(reference) => {
                attempts.push(TransferAttempt {
                    sequence: attempt,
                    chunk_size,
                    outcome: AttemptOutcome::Success,
                    backoff: None,
                });
                return TransferState::Succeeded(reference);
            }
            Err(err) => err,
        };

        match classify(StorePhase::Transfer, &err) {
            ErrorClass::Transient if self.policy.allows_retry_after(attempt) => {
                let delay = self.policy.delay_for(attempt);
                warn!(
                    attempt,
                    chunk_size,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "transfer attempt failed, retrying"
                );
                attempts.push(TransferAttempt {
                    sequence: attempt,
                    chunk_size,
                    outcome: AttemptOutcome::Transient {
                        reason: err.to_string(),
                    },
                    backoff: Some(delay),
                });
                TransferState::Backoff { attempt, delay }
            }
            ErrorClass::Transient => {
                error!(attempt, error = %err, "transfer failed, no attempts left");
                attempts.push(TransferAttempt {
                    sequence: attempt,
                    chunk_size,
                    outcome: AttemptOutcome::Transient {
                        reason: err.to_string(),
                    },
                    backoff: None,
                });
                TransferState::Failed(UploadError::RetryExhausted {
                    attempts: attempt,
                    last: err,
                })
            }
            ErrorClass::Fatal | ErrorClass::Configuration => {
                error!(attempt, error = %err, "transfer failed permanently");
                attempts.push(TransferAttempt {
                    sequence: attempt,
                    chunk_size,
                    outcome: AttemptOutcome::Fatal {
                        reason: err.to_string(),
                    },
                    backoff: None,
                });
                TransferState::Failed(UploadError::fatal(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryRemoteStore, StagingStore, StoreError, TieredStagingStore};
    use bytes::Bytes;
    use proptest::prelude::*;

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    fn engine_with(
        store: Arc<MemoryRemoteStore>,
        config: TransferConfig,
    ) -> (ChunkedTransferEngine, RecordingSleeper) {
        let sleeper = RecordingSleeper::new();
        let engine = ChunkedTransferEngine::new(store, &config)
            .unwrap()
            .with_sleeper(Arc::new(sleeper.clone()));
        (engine, sleeper)
    }

    async fn staged(payload: &'static [u8]) -> StagedArtifact {
        TieredStagingStore::memory_only()
            .stage(Bytes::from_static(payload))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_attempt_uses_smallest_tier() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        let (engine, sleeper) = engine_with(store.clone(), TransferConfig::default());

        let content = staged(b"abc").await;
        let report = engine
            .upload(&content, "x.mp3", &ContainerId::new("C1"))
            .await
            .unwrap();

        assert_eq!(report.reference, RemoteRef::new("R1"));
        assert_eq!(report.tiers_used(), vec![256 * KIB]);
        assert!(sleeper.delays().is_empty());
        assert_eq!(store.object(&report.reference).unwrap().content, Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn two_transient_failures_walk_up_the_ladder() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        store.fail_creates([
            StoreError::connection("connection reset by peer"),
            StoreError::truncated("EOF occurred in violation of protocol"),
        ]);
        let (engine, sleeper) = engine_with(store.clone(), TransferConfig::default());

        let content = staged(b"abc").await;
        let report = engine
            .upload(&content, "x.mp3", &ContainerId::new("C1"))
            .await
            .unwrap();

        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.tiers_used(), vec![256 * KIB, 512 * KIB, MIB]);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert!(report.attempts[2].is_success());
        assert_eq!(report.attempts[0].backoff, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn tiers_cycle_after_the_largest() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        store.fail_creates((0..7).map(|_| StoreError::unavailable(503, "backend error")));
        let config = TransferConfig::default().with_retry(
            RetryPolicy::default()
                .with_max_exponent(4)
                .with_max_delay(Duration::from_secs(10)),
        );
        let (engine, sleeper) = engine_with(store.clone(), config.clone());

        let content = staged(b"abc").await;
        let report = engine
            .upload(&content, "x.mp3", &ContainerId::new("C1"))
            .await
            .unwrap();

        assert_eq!(report.attempts.len(), 8);
        let expected: Vec<u64> = (1..=8)
            .map(|k| config.chunk_ladder[(k - 1) % config.chunk_ladder.len()])
            .collect();
        assert_eq!(report.tiers_used(), expected);

        let expected_sleep: Duration = (1..=7u32)
            .map(|k| Duration::from_secs(1u64 << k.min(4)).min(Duration::from_secs(10)))
            .sum();
        assert_eq!(sleeper.total(), expected_sleep);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        store.fail_every_create(StoreError::permission_denied("insufficient permissions"));
        let (engine, sleeper) = engine_with(store.clone(), TransferConfig::default());

        let content = staged(b"abc").await;
        let err = engine
            .upload(&content, "x.mp3", &ContainerId::new("C1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Fatal {
                source: StoreError::PermissionDenied(_)
            }
        ));
        assert_eq!(store.calls().create_chunk_sizes.len(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn unreadable_staged_payload_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        let (engine, sleeper) = engine_with(store.clone(), TransferConfig::default());

        let content = TieredStagingStore::disk_only(dir.path())
            .stage(Bytes::from_static(b"abc"))
            .await
            .unwrap();
        std::fs::remove_file(content.path().unwrap()).unwrap();

        let err = engine
            .upload(&content, "x.mp3", &ContainerId::new("C1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::Fatal {
                source: StoreError::Io(_)
            }
        ));
        assert_eq!(store.calls().create_chunk_sizes.len(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn bounded_policy_gives_up() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        store.fail_every_create(StoreError::Timeout);
        let config = TransferConfig::default()
            .with_retry(RetryPolicy::default().with_max_attempts(3));
        let (engine, sleeper) = engine_with(store.clone(), config);

        let content = staged(b"abc").await;
        let err = engine
            .upload(&content, "x.mp3", &ContainerId::new("C1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UploadError::RetryExhausted {
                attempts: 3,
                last: StoreError::Timeout
            }
        ));
        assert_eq!(sleeper.delays().len(), 2);
        assert_eq!(store.calls().create_chunk_sizes, vec![256 * KIB, 512 * KIB, MIB]);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_waits_out_the_backoff() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        store.fail_creates([StoreError::Timeout, StoreError::Timeout]);
        let engine = ChunkedTransferEngine::new(store, &TransferConfig::default()).unwrap();

        let content = staged(b"abc").await;
        let started = tokio::time::Instant::now();
        engine
            .upload(&content, "x.mp3", &ContainerId::new("C1"))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[test]
    fn ladder_rejects_bad_tiers() {
        assert!(ChunkLadder::new(vec![]).is_err());
        assert!(ChunkLadder::new(vec![1000]).is_err());
        assert!(ChunkLadder::new(vec![256 * KIB]).is_ok());
    }

    proptest! {
        #[test]
        fn tier_selection_is_a_function_of_the_attempt(attempt in 1u32..10_000) {
            let ladder = ChunkLadder::new(TransferConfig::default().chunk_ladder).unwrap();
            let expected = ladder.tiers()[((attempt - 1) as usize) % ladder.len()];
            prop_assert_eq!(ladder.tier_for(attempt), expected);
            prop_assert_eq!(ladder.tier_for(attempt), ladder.tier_for(attempt));
        }
    }
}
