use std::path::PathBuf;
use std::time::Duration;

use crate::{UploadError, UploadResult};

/// Resumable uploads require chunk sizes in multiples of this
pub const CHUNK_ALIGNMENT: u64 = 256 * 1024;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Configuration for the whole upload pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub transfer: TransferConfig,
    pub staging: StagingConfig,

    /// Upper bound for one transfer (all attempts). None waits forever.
    pub deadline: Option<Duration>,

    /// Content type sent for uploaded objects
    pub upload_mime_type: String,

    /// Send the recording's own MIME type instead of `upload_mime_type`
    pub detect_mime: bool,

    /// Fallback link when the store reports none. `{id}` is replaced.
    pub link_template: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            staging: StagingConfig::default(),
            deadline: None,
            upload_mime_type: "application/octet-stream".to_string(),
            detect_mime: false,
            link_template: "https://drive.google.com/file/d/{id}/view".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_staging(mut self, staging: StagingConfig) -> Self {
        self.staging = staging;
        self
    }

    /// Abort a transfer still running after `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_upload_mime_type<S: Into<String>>(mut self, mime: S) -> Self {
        self.upload_mime_type = mime.into();
        self
    }

    pub fn detect_mime(mut self) -> Self {
        self.detect_mime = true;
        self
    }

    pub fn with_link_template<S: Into<String>>(mut self, template: S) -> Self {
        self.link_template = template.into();
        self
    }

    /// Check the values a pipeline cannot run with
    pub fn validate(&self) -> UploadResult<()> {
        self.transfer.validate()?;
        if !self.link_template.contains("{id}") {
            return Err(UploadError::invalid(format!(
                "Link template '{}' has no {{id}} placeholder",
                self.link_template
            )));
        }
        Ok(())
    }
}

/// Chunk ladder and retry policy of the transfer engine
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Chunk sizes in bytes, smallest first. Attempt k uses tier (k-1) mod len.
    pub chunk_ladder: Vec<u64>,
    pub retry: RetryPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_ladder: vec![256 * KIB, 512 * KIB, MIB, 2 * MIB, 5 * MIB],
            retry: RetryPolicy::default(),
        }
    }
}

impl TransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_ladder(mut self, ladder: Vec<u64>) -> Self {
        self.chunk_ladder = ladder;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> UploadResult<()> {
        if self.chunk_ladder.is_empty() {
            return Err(UploadError::invalid("Chunk ladder must have at least one tier"));
        }
        if let Some(bad) = self
            .chunk_ladder
            .iter()
            .find(|size| **size == 0 || **size % CHUNK_ALIGNMENT != 0)
        {
            return Err(UploadError::invalid(format!(
                "Chunk size {} is not a non-zero multiple of {}",
                bad, CHUNK_ALIGNMENT
            )));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(UploadError::invalid("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Backoff for transient transfer failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Cap on a single backoff delay
    pub max_delay: Duration,

    /// Cap on the exponent: delay = min(max_delay, 2^min(attempt, max_exponent)) seconds
    pub max_exponent: u32,

    /// Give up after this many attempts. None retries until success or deadline.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(60),
            max_exponent: 6,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_max_exponent(mut self, max_exponent: u32) -> Self {
        self.max_exponent = max_exponent;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay after the failed attempt number `attempt` (1-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // keep the shift in range
        let exponent = attempt.min(self.max_exponent).min(63);
        let secs = 1u64 << exponent;
        Duration::from_secs(secs).min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failed
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// Where staged payloads live
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Payloads smaller than this stay in memory, others spill to disk
    pub memory_threshold_bytes: u64,

    /// Directory for spilled payloads. None uses the OS temp dir.
    pub spill_dir: Option<PathBuf>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            memory_threshold_bytes: 8 * MIB,
            spill_dir: None,
        }
    }
}

impl StagingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_threshold(mut self, bytes: u64) -> Self {
        self.memory_threshold_bytes = bytes;
        self
    }

    pub fn with_spill_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Directory spilled payloads are written to
    pub fn spill_dir(&self) -> PathBuf {
        self.spill_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
