use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    AccessValidator, AudioFormat, ChunkedTransferEngine, ContainerId, LinkPublisher, NewObject,
    PipelineConfig, PublicLink, RemoteRef, RemoteStore, Sleeper, StagingStore, TransferAttempt,
    UploadError, UploadRequest, UploadResult,
};

/// Result of one completed upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub name: String,
    pub reference: RemoteRef,
    pub link: PublicLink,
    pub attempts: Vec<TransferAttempt>,
    pub size_bytes: u64,
}

/// Verify, stage, transfer, release and publish, in that order.
///
/// Built once and shared; every component is behind an `Arc`, so clones are
/// cheap and each call owns its own staged artifact.
#[derive(Clone)]
pub struct UploadPipeline {
    validator: AccessValidator,
    staging: Arc<dyn StagingStore>,
    engine: ChunkedTransferEngine,
    publisher: LinkPublisher,
    config: PipelineConfig,
}

impl UploadPipeline {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        staging: Arc<dyn StagingStore>,
        config: PipelineConfig,
    ) -> UploadResult<Self> {
        config.validate()?;
        Ok(Self {
            validator: AccessValidator::new(Arc::clone(&store)),
            engine: ChunkedTransferEngine::new(Arc::clone(&store), &config.transfer)?,
            publisher: LinkPublisher::new(store, config.link_template.clone()),
            staging,
            config,
        })
    }

    /// Replace the sleeper used between transfer attempts
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.engine = self.engine.with_sleeper(sleeper);
        self
    }

    pub fn validator(&self) -> &AccessValidator {
        &self.validator
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Upload one payload and return its public link
    #[instrument(skip(self, request), fields(name = %request.name, container = %request.container, size_bytes = request.payload.len()))]
    pub async fn upload(&self, request: UploadRequest) -> UploadResult<UploadReceipt> {
        let format = check_name(&request.name)?;
        self.validator.verify(&request.container).await?;
        self.transfer_and_publish(request.name, request.payload, &request.container, format)
            .await
    }

    /// Upload several payloads into one container.
    ///
    /// Names are checked and the container verified once, up front. Files then
    /// run one after another; the first failure stops the batch.
    #[instrument(skip(self, files), fields(container = %container, files = files.len()))]
    pub async fn upload_batch(
        &self,
        container: &ContainerId,
        files: Vec<(String, Bytes)>,
    ) -> UploadResult<Vec<UploadReceipt>> {
        let formats = files
            .iter()
            .map(|(name, _)| check_name(name))
            .collect::<UploadResult<Vec<_>>>()?;

        self.validator.verify(container).await?;

        let mut receipts = Vec::with_capacity(files.len());
        for ((name, payload), format) in files.into_iter().zip(formats) {
            let receipt = self
                .transfer_and_publish(name, payload, container, format)
                .await?;
            receipts.push(receipt);
        }

        info!(uploaded = receipts.len(), "batch complete");
        Ok(receipts)
    }

    async fn transfer_and_publish(
        &self,
        name: String,
        payload: Bytes,
        container: &ContainerId,
        format: AudioFormat,
    ) -> UploadResult<UploadReceipt> {
        let size_bytes = payload.len() as u64;
        let artifact = self.staging.stage(payload).await?;

        let mime_type = if self.config.detect_mime {
            format.mime_type()
        } else {
            self.config.upload_mime_type.as_str()
        };
        let object = NewObject::new(name.clone(), container.clone()).with_mime_type(mime_type);

        let transfer = self.engine.upload_object(&artifact, &object);
        let outcome = match self.config.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, transfer).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(name = %name, after_secs = deadline.as_secs(), "transfer deadline exceeded");
                    Err(UploadError::DeadlineExceeded { after: deadline })
                }
            },
            None => transfer.await,
        };

        if let Err(err) = artifact.release() {
            warn!(name = %name, error = %err, "could not release staged payload");
        }

        let report = outcome?;
        let link = self.publisher.publish(&report.reference).await;

        info!(
            name = %name,
            reference = %report.reference,
            url = %link.url,
            attempts = report.attempts.len(),
            "upload complete"
        );

        Ok(UploadReceipt {
            name,
            reference: report.reference,
            link,
            attempts: report.attempts,
            size_bytes,
        })
    }
}

fn check_name(name: &str) -> UploadResult<AudioFormat> {
    if name.trim().is_empty() {
        return Err(UploadError::invalid("object name is empty"));
    }
    AudioFormat::from_filename(name)
}
