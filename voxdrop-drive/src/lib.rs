//! # voxdrop-drive: Google Drive remote store
//!
//! Implements [`voxdrop_core::RemoteStore`] against the Drive v3 REST API with
//! `reqwest`. Shared drives are supported on every call.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxdrop_core::prelude::*;
//! use voxdrop_drive::{DriveConfig, DriveStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(DriveStore::new(DriveConfig::new("ya29.token"))?);
//! let staging = Arc::new(TieredStagingStore::default());
//! let pipeline = UploadPipeline::new(store, staging, PipelineConfig::default())?;
//!
//! let receipt = pipeline
//!     .upload(UploadRequest::new(std::fs::read("call.m4a")?, "call.m4a", ContainerId::new("1AbC")))
//!     .await?;
//! println!("{}", receipt.link.url);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod store;

pub use config::{DriveConfig, DEFAULT_API_BASE, DEFAULT_UPLOAD_BASE};
pub use error::from_status;
pub use store::{parse_range_end, DriveStore};
