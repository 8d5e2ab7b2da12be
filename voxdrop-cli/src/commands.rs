use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;
use voxdrop_core::{
    links_cell, object_name, AccessValidator, AudioFormat, ContainerId, MemoryRemoteStore,
    ObjectMetadata, RemoteStore, TieredStagingStore, UploadPipeline, UploadReceipt,
};
use voxdrop_drive::DriveStore;

use crate::config::Settings;

/// Options of `voxdrop upload`
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub files: Vec<PathBuf>,
    pub client: Option<String>,
    pub date: Option<NaiveDate>,
    pub meeting_type: Option<String>,
    pub folder: Option<String>,
    pub dry_run: bool,
    pub detect_mime: bool,
}

/// What `voxdrop upload` reports
#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub container: ContainerId,
    pub receipts: Vec<UploadReceipt>,
    /// All links joined for a single spreadsheet cell
    pub links: String,
}

const DRY_RUN_CONTAINER: &str = "dry-run";

fn remote_store(settings: &Settings, dry_run: bool, container: &ContainerId) -> Result<Arc<dyn RemoteStore>> {
    if dry_run {
        let store = MemoryRemoteStore::new().with_container(container.as_str(), DRY_RUN_CONTAINER);
        return Ok(Arc::new(store));
    }
    let store = DriveStore::new(settings.drive_config()?).context("failed to create Drive client")?;
    Ok(Arc::new(store))
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("not a file path: {}", path.display()))
}

/// Upload every file into one container and collect the links
pub async fn upload(settings: &Settings, options: UploadOptions) -> Result<UploadSummary> {
    if options.files.is_empty() {
        return Err(anyhow!("no files to upload"));
    }

    let container = match settings.folder_for(options.meeting_type.as_deref(), options.folder.as_deref()) {
        Ok(container) => container,
        Err(_) if options.dry_run => ContainerId::new(DRY_RUN_CONTAINER),
        Err(err) => return Err(err),
    };

    // reject unsupported files before reading any of them
    let mut names = Vec::with_capacity(options.files.len());
    for path in &options.files {
        let original = file_name(path)?;
        AudioFormat::from_filename(&original)?;
        names.push(original);
    }

    let date = options.date.unwrap_or_else(|| settings.today());
    let mut files = Vec::with_capacity(options.files.len());
    for (path, original) in options.files.iter().zip(names) {
        let payload = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let client = options.client.as_deref().unwrap_or_default();
        files.push((object_name(client, date, &original), Bytes::from(payload)));
    }

    let config = settings.pipeline_config(options.detect_mime);
    let store = remote_store(settings, options.dry_run, &container)?;
    let staging = Arc::new(TieredStagingStore::new(config.staging.clone()));
    let pipeline = UploadPipeline::new(store, staging, config)?;

    info!(container = %container, files = files.len(), dry_run = options.dry_run, "uploading recordings");
    let receipts = pipeline
        .upload_batch(&container, files)
        .await
        .with_context(|| format!("upload to {} failed", container))?;

    let links = links_cell(&receipts.iter().map(|r| r.link.clone()).collect::<Vec<_>>());
    Ok(UploadSummary {
        container,
        receipts,
        links,
    })
}

/// Probe a destination container without uploading anything
pub async fn check(settings: &Settings, meeting_type: Option<&str>, folder: Option<&str>) -> Result<ObjectMetadata> {
    let container = settings.folder_for(meeting_type, folder)?;
    let store = remote_store(settings, false, &container)?;
    let meta = AccessValidator::new(store).verify(&container).await?;
    Ok(meta)
}
