use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::{
    ContainerId, MetadataField, NewObject, ObjectMetadata, Permission, RemoteRef, RemoteStore,
    StagedArtifact, StoreError, StoreResult,
};

/// An object held by [`MemoryRemoteStore`]
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: RemoteRef,
    pub name: String,
    pub parent: ContainerId,
    pub mime_type: String,
    pub content: Bytes,
    pub permissions: Vec<Permission>,
}

/// Calls seen by [`MemoryRemoteStore`]
#[derive(Debug, Clone, Default)]
pub struct StoreCalls {
    pub metadata: Vec<String>,
    pub create_chunk_sizes: Vec<u64>,
    pub permissions: Vec<String>,
}

#[derive(Default)]
struct MemoryState {
    containers: HashMap<String, String>,
    objects: BTreeMap<String, StoredObject>,
    next_id: u64,
    scripted_create_failures: VecDeque<StoreError>,
    persistent_create_failure: Option<StoreError>,
    permission_failure: Option<StoreError>,
    metadata_failure: Option<StoreError>,
    calls: StoreCalls,
}

/// In-process remote store.
///
/// Ids are assigned as `R1`, `R2`, ... and view links as `{view_base}{id}`.
/// Failures can be scripted per operation, which makes it the store used by
/// tests and by dry runs.
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
    view_base: String,
    include_links: bool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                ..MemoryState::default()
            }),
            view_base: "https://store/view/".to_string(),
            include_links: true,
        }
    }

    pub fn with_view_base<S: Into<String>>(mut self, base: S) -> Self {
        self.view_base = base.into();
        self
    }

    /// Report no view/content links, forcing callers onto their fallback
    pub fn without_links(mut self) -> Self {
        self.include_links = false;
        self
    }

    /// Register a container objects can be created in
    pub fn with_container<I: Into<String>, N: Into<String>>(self, id: I, name: N) -> Self {
        self.state.lock().containers.insert(id.into(), name.into());
        self
    }

    /// Fail the next create calls with these errors, in order
    pub fn fail_creates<I: IntoIterator<Item = StoreError>>(&self, errors: I) {
        self.state.lock().scripted_create_failures.extend(errors);
    }

    /// Fail every create call (after scripted failures run out) with `error`
    pub fn fail_every_create(&self, error: StoreError) {
        self.state.lock().persistent_create_failure = Some(error);
    }

    pub fn fail_permissions(&self, error: StoreError) {
        self.state.lock().permission_failure = Some(error);
    }

    pub fn fail_metadata(&self, error: StoreError) {
        self.state.lock().metadata_failure = Some(error);
    }

    pub fn object(&self, id: &RemoteRef) -> Option<StoredObject> {
        self.state.lock().objects.get(id.as_str()).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn calls(&self) -> StoreCalls {
        self.state.lock().calls.clone()
    }

    fn metadata_for(
        &self,
        id: &str,
        name: &str,
        mime_type: Option<&str>,
        fields: &[MetadataField],
    ) -> ObjectMetadata {
        let mut meta = ObjectMetadata::default();
        for field in fields {
            match field {
                MetadataField::Id => meta.id = id.to_string(),
                MetadataField::Name => meta.name = name.to_string(),
                MetadataField::MimeType => meta.mime_type = mime_type.map(str::to_string),
                MetadataField::WebViewLink if self.include_links => {
                    meta.web_view_link = Some(format!("{}{}", self.view_base, id));
                }
                MetadataField::WebContentLink if self.include_links => {
                    meta.web_content_link = Some(format!("{}{}?download=1", self.view_base, id));
                }
                MetadataField::WebViewLink | MetadataField::WebContentLink => {}
            }
        }
        meta
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_metadata(
        &self,
        id: &str,
        fields: &[MetadataField],
    ) -> StoreResult<ObjectMetadata> {
        let mut state = self.state.lock();
        state.calls.metadata.push(id.to_string());

        if let Some(err) = state.metadata_failure.clone() {
            return Err(err);
        }

        if let Some(name) = state.containers.get(id) {
            return Ok(self.metadata_for(id, name, Some("application/vnd.google-apps.folder"), fields));
        }

        match state.objects.get(id) {
            Some(obj) => Ok(self.metadata_for(id, &obj.name, Some(obj.mime_type.as_str()), fields)),
            None => Err(StoreError::not_found(id)),
        }
    }

    async fn create_object(
        &self,
        object: &NewObject,
        content: &StagedArtifact,
        chunk_size: u64,
    ) -> StoreResult<RemoteRef> {
        {
            let mut state = self.state.lock();
            state.calls.create_chunk_sizes.push(chunk_size);

            if let Some(err) = state.scripted_create_failures.pop_front() {
                return Err(err);
            }
            if let Some(err) = state.persistent_create_failure.clone() {
                return Err(err);
            }
            if !state.containers.contains_key(object.parent.as_str()) {
                return Err(StoreError::not_found(object.parent.as_str()));
            }
        }

        if chunk_size == 0 {
            return Err(StoreError::invalid("chunk size must be positive"));
        }

        // Read the payload the way a resumable upload would
        let mut buf = BytesMut::with_capacity(content.len() as usize);
        let mut offset = 0;
        while offset < content.len() {
            let chunk = content.read_range(offset, chunk_size).await?;
            if chunk.is_empty() {
                return Err(StoreError::truncated(format!("payload ended at byte {}", offset)));
            }
            offset += chunk.len() as u64;
            buf.extend_from_slice(&chunk);
        }

        let mut state = self.state.lock();
        let id = RemoteRef::new(format!("R{}", state.next_id));
        state.next_id += 1;
        state.objects.insert(
            id.as_str().to_string(),
            StoredObject {
                id: id.clone(),
                name: object.name.clone(),
                parent: object.parent.clone(),
                mime_type: object.mime_type.clone(),
                content: buf.freeze(),
                permissions: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn create_permission(&self, id: &str, permission: &Permission) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.calls.permissions.push(id.to_string());

        if let Some(err) = state.permission_failure.clone() {
            return Err(err);
        }

        match state.objects.get_mut(id) {
            Some(obj) => {
                obj.permissions.push(*permission);
                Ok(())
            }
            None => Err(StoreError::not_found(id)),
        }
    }
}
