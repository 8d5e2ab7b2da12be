use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use voxdrop_core::{
    MetadataField, NewObject, ObjectMetadata, Permission, RemoteRef, RemoteStore, StagedArtifact,
    StoreError, StoreResult,
};

use crate::error::{from_reqwest, from_response};
use crate::DriveConfig;

const SUPPORTS_ALL_DRIVES: (&str, &str) = ("supportsAllDrives", "true");

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// [`RemoteStore`] backed by the Google Drive v3 REST API.
///
/// Objects are created with resumable upload sessions. Every chunk is sent
/// as its own `PUT`; the server's `Range` acknowledgement decides where the
/// next chunk starts, so a partially persisted chunk is resent from the first
/// missing byte.
#[derive(Clone)]
pub struct DriveStore {
    client: Client,
    config: DriveConfig,
}

impl DriveStore {
    pub fn new(config: DriveConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            // 308 is the resumable "keep going" reply, not a redirect
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| StoreError::invalid(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    async fn start_session(&self, object: &NewObject, total: u64) -> StoreResult<String> {
        let metadata = json!({
            "name": object.name,
            "parents": [object.parent.as_str()],
            "mimeType": object.mime_type,
        });

        let response = self
            .client
            .post(format!("{}/files", self.config.upload_base))
            .bearer_auth(&self.config.access_token)
            .query(&[("uploadType", "resumable"), SUPPORTS_ALL_DRIVES, ("fields", "id")])
            .header("X-Upload-Content-Type", object.mime_type.as_str())
            .header("X-Upload-Content-Length", total.to_string())
            .json(&metadata)
            .send()
            .await
            .map_err(from_reqwest)?;

        if !response.status().is_success() {
            return Err(from_response(response).await);
        }

        response
            .headers()
            .get(LOCATION)
            .ok_or_else(|| StoreError::protocol("missing Location header in resumable upload start"))?
            .to_str()
            .map(str::to_string)
            .map_err(|e| StoreError::protocol(format!("unreadable Location header: {}", e)))
    }

    /// Send one chunk (or a status query when `chunk` is empty)
    async fn put_chunk(
        &self,
        session: &str,
        offset: u64,
        chunk: Bytes,
        total: u64,
    ) -> StoreResult<ChunkOutcome> {
        let range = if chunk.is_empty() {
            format!("bytes */{}", total)
        } else {
            format!("bytes {}-{}/{}", offset, offset + chunk.len() as u64 - 1, total)
        };

        let response = self
            .client
            .put(session)
            .bearer_auth(&self.config.access_token)
            .header(CONTENT_RANGE, range.as_str())
            .body(chunk)
            .send()
            .await
            .map_err(from_reqwest)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let created: CreatedFile = response.json().await.map_err(from_reqwest)?;
                Ok(ChunkOutcome::Complete(RemoteRef::new(created.id)))
            }
            StatusCode::PERMANENT_REDIRECT => {
                let next = response
                    .headers()
                    .get(RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_range_end)
                    .map(|end| end + 1)
                    .unwrap_or(0);
                Ok(ChunkOutcome::Incomplete { next })
            }
            _ => Err(from_response(response).await),
        }
    }
}

enum ChunkOutcome {
    Complete(RemoteRef),
    Incomplete { next: u64 },
}

/// Last persisted byte from a `Range: bytes=0-N` acknowledgement
pub fn parse_range_end(header: &str) -> Option<u64> {
    let (start, end) = header.trim().strip_prefix("bytes=")?.split_once('-')?;
    if start.trim() != "0" {
        return None;
    }
    end.trim().parse().ok()
}

#[async_trait]
impl RemoteStore for DriveStore {
    async fn get_metadata(
        &self,
        id: &str,
        fields: &[MetadataField],
    ) -> StoreResult<ObjectMetadata> {
        let response = self
            .client
            .get(format!("{}/files/{}", self.config.api_base, id))
            .bearer_auth(&self.config.access_token)
            .query(&[("fields", MetadataField::selector(fields).as_str()), SUPPORTS_ALL_DRIVES])
            .send()
            .await
            .map_err(from_reqwest)?;

        if !response.status().is_success() {
            return Err(from_response(response).await);
        }
        response.json().await.map_err(from_reqwest)
    }

    #[instrument(skip(self, object, content), fields(name = %object.name, total = content.len()))]
    async fn create_object(
        &self,
        object: &NewObject,
        content: &StagedArtifact,
        chunk_size: u64,
    ) -> StoreResult<RemoteRef> {
        if chunk_size == 0 {
            return Err(StoreError::invalid("chunk size must be positive"));
        }

        let total = content.len();
        let session = self.start_session(object, total).await?;
        debug!("resumable session opened");

        let mut offset = 0u64;
        loop {
            let chunk = if offset >= total {
                Bytes::new()
            } else {
                content.read_range(offset, chunk_size).await?
            };
            if chunk.is_empty() && offset < total {
                return Err(StoreError::truncated(format!(
                    "staged payload ended at byte {} of {}",
                    offset, total
                )));
            }

            let sent = chunk.len() as u64;
            match self.put_chunk(&session, offset, chunk, total).await? {
                ChunkOutcome::Complete(reference) => return Ok(reference),
                ChunkOutcome::Incomplete { next } => {
                    debug!(offset, sent, next, "chunk acknowledged");
                    // a chunk that persisted nothing cannot make progress at this size
                    if sent > 0 && next <= offset {
                        return Err(StoreError::truncated(format!(
                            "server kept no bytes of chunk at offset {}",
                            offset
                        )));
                    }
                    if sent == 0 && next >= total {
                        return Err(StoreError::protocol(
                            "server acknowledged every byte but did not finish the upload",
                        ));
                    }
                    offset = next;
                }
            }
        }
    }

    async fn create_permission(&self, id: &str, permission: &Permission) -> StoreResult<()> {
        let response = self
            .client
            .post(format!("{}/files/{}/permissions", self.config.api_base, id))
            .bearer_auth(&self.config.access_token)
            .query(&[SUPPORTS_ALL_DRIVES])
            .json(permission)
            .send()
            .await
            .map_err(from_reqwest)?;

        if !response.status().is_success() {
            return Err(from_response(response).await);
        }
        Ok(())
    }
}
