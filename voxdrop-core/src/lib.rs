//! # voxdrop-core: Resilient recording uploads
//!
//! `voxdrop-core` moves audio recordings from a caller's buffer into a remote
//! object store and hands back a shareable link. It is built for flaky uplinks:
//! the destination is checked before any bytes move, the payload is staged so
//! every attempt can replay it, and transient failures are retried with
//! capped exponential backoff while the chunk size walks a ladder.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use voxdrop_core::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> UploadResult<()> {
//! let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
//! let staging = Arc::new(TieredStagingStore::default());
//! let pipeline = UploadPipeline::new(store, staging, PipelineConfig::default())?;
//!
//! let receipt = pipeline
//!     .upload(UploadRequest::new(&b"abc"[..], "x.mp3", ContainerId::new("C1")))
//!     .await?;
//!
//! assert_eq!(receipt.link.url, "https://store/view/R1");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │    UploadPipeline    │  ← verify, stage, transfer, release, publish
//! ├──────────┬───────────┤
//! │ Access   │ Chunked   │
//! │ Validator│ Transfer  │  ← probe once / tiered retries
//! │          │ Engine    │
//! ├──────────┴───────────┤
//! │ StagingStore         │  ← memory or temp file per payload
//! ├──────────────────────┤
//! │ RemoteStore          │  ← metadata, resumable create, permissions
//! └──────────────────────┘
//! ```
//!
//! `RemoteStore` is the only seam to the outside world. `MemoryRemoteStore`
//! ships here; the Drive v3 implementation lives in `voxdrop-drive`.

mod config;
mod engine;
mod error;
mod memory_store;
pub mod naming;
mod pipeline;
mod publisher;
pub mod staging;
pub mod store;
mod types;
mod validator;

pub use config::{PipelineConfig, RetryPolicy, StagingConfig, TransferConfig, CHUNK_ALIGNMENT};
pub use engine::{
    ChunkLadder, ChunkedTransferEngine, RecordingSleeper, Sleeper, TokioSleeper, TransferReport,
};
pub use error::{classify, ErrorClass, StoreError, StorePhase, StoreResult, UploadError, UploadResult};
pub use memory_store::{MemoryRemoteStore, StoreCalls, StoredObject};
pub use naming::{links_cell, object_name, AudioFormat};
pub use pipeline::{UploadPipeline, UploadReceipt};
pub use publisher::{GrantStatus, LinkPublisher, LinkSource, PublicLink};
pub use staging::{StagedArtifact, StagingKind, StagingStore, TieredStagingStore};
pub use store::{RemoteStore, LINK_FIELDS, PROBE_FIELDS};
pub use types::{
    AttemptOutcome, ContainerId, Grantee, MetadataField, NewObject, ObjectMetadata, Permission,
    RemoteRef, Role, TransferAttempt, UploadRequest,
};
pub use validator::AccessValidator;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ContainerId, MemoryRemoteStore, PipelineConfig, PublicLink, RemoteStore, StagingStore,
        TieredStagingStore, UploadError, UploadPipeline, UploadReceipt, UploadRequest,
        UploadResult,
    };
}
