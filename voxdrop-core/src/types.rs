use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier of a remote container (folder) objects are uploaded into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier the remote store assigns to a created object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteRef(pub String);

impl RemoteRef {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payload to upload. Immutable once built.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub payload: Bytes,
    pub name: String,
    pub container: ContainerId,
}

impl UploadRequest {
    pub fn new<B, N>(payload: B, name: N, container: ContainerId) -> Self
    where
        B: Into<Bytes>,
        N: Into<String>,
    {
        Self {
            payload: payload.into(),
            name: name.into(),
            container,
        }
    }
}

/// Metadata fields that can be requested from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    Id,
    Name,
    MimeType,
    WebViewLink,
    WebContentLink,
}

impl MetadataField {
    /// Wire name of the field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::MimeType => "mimeType",
            Self::WebViewLink => "webViewLink",
            Self::WebContentLink => "webContentLink",
        }
    }

    /// Comma-separated field selector
    pub fn selector(fields: &[MetadataField]) -> String {
        fields
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Metadata about a remote object or container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_content_link: Option<String>,
}

/// Metadata for an object about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObject {
    pub name: String,
    pub parent: ContainerId,
    pub mime_type: String,
}

impl NewObject {
    pub fn new<S: Into<String>>(name: S, parent: ContainerId) -> Self {
        Self {
            name: name.into(),
            parent,
            mime_type: "application/octet-stream".to_string(),
        }
    }

    pub fn with_mime_type<S: Into<String>>(mut self, mime_type: S) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

/// Who a permission is granted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grantee {
    Anyone,
}

/// Access level of a permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
}

/// A permission to create on an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "type")]
    pub grantee: Grantee,
    pub role: Role,
}

impl Permission {
    /// Anyone with the link can read
    pub fn anyone_reader() -> Self {
        Self {
            grantee: Grantee::Anyone,
            role: Role::Reader,
        }
    }
}

/// Outcome of one transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Success,
    Transient { reason: String },
    Fatal { reason: String },
}

/// Record of one transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAttempt {
    /// Starts at 1
    pub sequence: u32,
    pub chunk_size: u64,
    pub outcome: AttemptOutcome,
    /// Delay slept before the next attempt, when one followed
    pub backoff: Option<Duration>,
}

impl TransferAttempt {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }
}
