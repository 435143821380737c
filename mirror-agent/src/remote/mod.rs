//! Narrow interfaces to the remote hierarchy service.
//!
//! The engine only sees [`TokenProvider`] and [`RemoteHierarchy`]; the
//! vendor-specific JSON shapes stay in [`http`].

pub mod auth;
pub mod http;

use crate::utils::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a remote object, qualified by the unit (project) that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub scope: String,
    pub id: String,
}

impl NodeId {
    pub fn new(scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// One entry of a folder listing. Fetched per session, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
}

/// Metadata of a file object, as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Byte size, `None` when the service does not report one
    pub size: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Storage location; turned into a signed URL before transfer
    pub content_url: String,
}

/// A top-level unit (project) subject to the include/exclude lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUnit {
    pub id: String,
    pub name: String,
    /// Container the unit was listed under (hub)
    pub container: String,
}

/// Supplies a bearer token. Called once per outbound request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// Read-only view of the remote project tree.
#[async_trait]
pub trait RemoteHierarchy: Send + Sync {
    /// Every top-level unit visible to the credentials, in service order.
    async fn list_units(&self) -> Result<Vec<RemoteUnit>>;

    /// Folder the mirror of `unit` starts from. Only called for included units.
    async fn unit_root(&self, unit: &RemoteUnit) -> Result<NodeId>;

    /// Children of a folder, in the order the service returns them.
    async fn list_children(&self, folder: &NodeId) -> Result<Vec<RemoteNode>>;

    async fn object_metadata(&self, file: &NodeId) -> Result<ObjectMetadata>;

    /// A pre-authorized content URL valid for `expiry_minutes`.
    async fn signed_download_url(
        &self,
        file: &NodeId,
        metadata: &ObjectMetadata,
        expiry_minutes: u32,
    ) -> Result<String>;
}
