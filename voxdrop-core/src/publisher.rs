use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{classify, Permission, RemoteRef, RemoteStore, StorePhase, LINK_FIELDS};

/// Whether the public-read grant went through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GrantStatus {
    Granted,
    /// The grant failed; the link may only work for accounts with access.
    /// `transient` is set when granting again later may succeed.
    Degraded { reason: String, transient: bool },
}

/// Where a published link came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    ViewLink,
    ContentLink,
    Template,
}

/// A shareable link for an uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicLink {
    pub url: String,
    pub grant: GrantStatus,
    pub source: LinkSource,
}

impl PublicLink {
    pub fn is_degraded(&self) -> bool {
        matches!(self.grant, GrantStatus::Degraded { .. })
    }
}

/// Grants public read access and resolves a shareable link.
///
/// Publishing never fails: a refused grant degrades the result and missing
/// links fall back to the configured template.
#[derive(Clone)]
pub struct LinkPublisher {
    store: Arc<dyn RemoteStore>,
    link_template: String,
}

impl LinkPublisher {
    pub fn new<S: Into<String>>(store: Arc<dyn RemoteStore>, link_template: S) -> Self {
        Self {
            store,
            link_template: link_template.into(),
        }
    }

    pub async fn publish(&self, reference: &RemoteRef) -> PublicLink {
        let grant = match self
            .store
            .create_permission(reference.as_str(), &Permission::anyone_reader())
            .await
        {
            Ok(()) => GrantStatus::Granted,
            Err(err) => {
                let class = classify(StorePhase::Publish, &err);
                warn!(reference = %reference, error = %err, ?class, "could not make object public");
                GrantStatus::Degraded {
                    reason: err.to_string(),
                    transient: class.is_transient(),
                }
            }
        };

        let (url, source) = match self.store.get_metadata(reference.as_str(), LINK_FIELDS).await {
            Ok(meta) => match (meta.web_view_link, meta.web_content_link) {
                (Some(view), _) if !view.is_empty() => (view, LinkSource::ViewLink),
                (_, Some(content)) if !content.is_empty() => (content, LinkSource::ContentLink),
                _ => (self.from_template(reference), LinkSource::Template),
            },
            Err(err) => {
                warn!(reference = %reference, error = %err, "link lookup failed, using template");
                (self.from_template(reference), LinkSource::Template)
            }
        };

        debug!(reference = %reference, url = %url, ?source, "link published");
        PublicLink { url, grant, source }
    }

    fn from_template(&self, reference: &RemoteRef) -> String {
        self.link_template.replace("{id}", reference.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ContainerId, MemoryRemoteStore, NewObject, StagingStore, StoreError, TieredStagingStore,
    };
    use bytes::Bytes;

    const TEMPLATE: &str = "https://drive.google.com/file/d/{id}/view";

    async fn stored(store: &MemoryRemoteStore) -> RemoteRef {
        let artifact = TieredStagingStore::memory_only()
            .stage(Bytes::from_static(b"abc"))
            .await
            .unwrap();
        store
            .create_object(&NewObject::new("x.mp3", ContainerId::new("C1")), &artifact, 262_144)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn view_link_is_preferred() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        let reference = stored(&store).await;

        let link = LinkPublisher::new(store.clone(), TEMPLATE).publish(&reference).await;

        assert_eq!(link.url, "https://store/view/R1");
        assert_eq!(link.source, LinkSource::ViewLink);
        assert_eq!(link.grant, GrantStatus::Granted);
        assert_eq!(
            store.object(&reference).unwrap().permissions,
            vec![Permission::anyone_reader()]
        );
    }

    #[tokio::test]
    async fn refused_grant_still_yields_a_link() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        let reference = stored(&store).await;
        store.fail_permissions(StoreError::permission_denied("sharing disabled by domain policy"));

        let link = LinkPublisher::new(store.clone(), TEMPLATE).publish(&reference).await;

        assert!(link.is_degraded());
        assert_eq!(link.url, "https://store/view/R1");
        assert!(matches!(link.grant, GrantStatus::Degraded { transient: false, .. }));
    }

    #[tokio::test]
    async fn grant_timeout_is_marked_transient() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        let reference = stored(&store).await;
        store.fail_permissions(StoreError::Timeout);

        let link = LinkPublisher::new(store.clone(), TEMPLATE).publish(&reference).await;

        assert_eq!(
            link.grant,
            GrantStatus::Degraded {
                reason: "Request timed out".to_string(),
                transient: true,
            }
        );
        assert_eq!(link.source, LinkSource::ViewLink);
    }

    #[tokio::test]
    async fn missing_links_fall_back_to_template() {
        let store = Arc::new(
            MemoryRemoteStore::new()
                .with_container("C1", "Recordings")
                .without_links(),
        );
        let reference = stored(&store).await;

        let link = LinkPublisher::new(store.clone(), TEMPLATE).publish(&reference).await;

        assert_eq!(link.url, "https://drive.google.com/file/d/R1/view");
        assert_eq!(link.source, LinkSource::Template);
    }

    #[tokio::test]
    async fn failed_lookup_falls_back_to_template() {
        let store = Arc::new(MemoryRemoteStore::new().with_container("C1", "Recordings"));
        let reference = stored(&store).await;
        store.fail_metadata(StoreError::Timeout);

        let link = LinkPublisher::new(store.clone(), TEMPLATE).publish(&reference).await;

        assert_eq!(link.url, "https://drive.google.com/file/d/R1/view");
        assert_eq!(link.grant, GrantStatus::Granted);
    }
}
