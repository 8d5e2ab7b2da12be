use async_trait::async_trait;

use crate::{
    ContainerId, MetadataField, NewObject, ObjectMetadata, Permission, RemoteRef, StagedArtifact,
    StoreResult,
};

/// Remote object store operations consumed by the pipeline.
///
/// Implementations report raw [`StoreError`](crate::StoreError)s; retry and
/// fatal decisions are made by the caller through [`classify`](crate::classify).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read metadata of an object or container, limited to `fields`
    async fn get_metadata(
        &self,
        id: &str,
        fields: &[MetadataField],
    ) -> StoreResult<ObjectMetadata>;

    /// Create an object from a staged payload with a resumable upload that
    /// sends `chunk_size` bytes per request
    async fn create_object(
        &self,
        object: &NewObject,
        content: &StagedArtifact,
        chunk_size: u64,
    ) -> StoreResult<RemoteRef>;

    /// Grant a permission on an object
    async fn create_permission(&self, id: &str, permission: &Permission) -> StoreResult<()>;
}

/// Fields requested when probing a destination container
pub const PROBE_FIELDS: &[MetadataField] = &[
    MetadataField::Id,
    MetadataField::Name,
    MetadataField::MimeType,
];

/// Fields requested when resolving a public link
pub const LINK_FIELDS: &[MetadataField] = &[MetadataField::WebViewLink, MetadataField::WebContentLink];

/// Convenience for probing a container by id
pub(crate) async fn probe_container(
    store: &dyn RemoteStore,
    container: &ContainerId,
) -> StoreResult<ObjectMetadata> {
    store.get_metadata(container.as_str(), PROBE_FIELDS).await
}
