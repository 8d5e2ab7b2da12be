use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::probe_container;
use crate::{ContainerId, ObjectMetadata, RemoteStore, StoreError, UploadError, UploadResult};

/// Confirms a destination container is reachable before any transfer starts
#[derive(Clone)]
pub struct AccessValidator {
    store: Arc<dyn RemoteStore>,
}

impl AccessValidator {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Probe the container once. Any failure is a configuration error and is
    /// never retried.
    pub async fn verify(&self, container: &ContainerId) -> UploadResult<ObjectMetadata> {
        if container.as_str().trim().is_empty() {
            return Err(UploadError::configuration(
                container.as_str(),
                StoreError::invalid("container id is empty"),
            ));
        }

        match probe_container(self.store.as_ref(), container).await {
            Ok(meta) => {
                debug!(container = %container, name = %meta.name, "destination container accessible");
                Ok(meta)
            }
            Err(err) => {
                warn!(container = %container, error = %err, "destination container not accessible");
                Err(UploadError::configuration(container.as_str(), err))
            }
        }
    }
}
