//! HTTP implementation of [`RemoteHierarchy`] for a hubs/projects/folders
//! data-management API.

use super::{NodeId, NodeKind, ObjectMetadata, RemoteHierarchy, RemoteNode, RemoteUnit, TokenProvider};
use crate::utils::errors::{MirrorError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    top_folder: String,
    tokens: Arc<dyn TokenProvider>,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: Vec<T>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attributes {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl Attributes {
    fn label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct ItemDocument {
    included: Vec<VersionResource>,
}

#[derive(Debug, Deserialize)]
struct VersionResource {
    attributes: VersionAttributes,
    relationships: VersionRelationships,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionAttributes {
    #[serde(default)]
    storage_size: Option<u64>,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
    last_modified_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct VersionRelationships {
    storage: StorageRelationship,
}

#[derive(Debug, Deserialize)]
struct StorageRelationship {
    meta: StorageMeta,
}

#[derive(Debug, Deserialize)]
struct StorageMeta {
    link: Link,
}

#[derive(Debug, Deserialize)]
struct SignedDownload {
    url: String,
}

impl HttpRemote {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        top_folder: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            top_folder: top_folder.into(),
            tokens,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| MirrorError::Network(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Network(format!("GET {} returned {}", url, status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MirrorError::Network(format!("GET {}: malformed body: {}", url, e)))
    }

    /// Follows `links.next` until the listing is exhausted.
    async fn get_all(&self, url: String) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page: Listing<Resource> = self.get_json(&url).await?;
            resources.extend(page.data);
            next = page.links.and_then(|l| l.next).map(|l| l.href);
        }

        Ok(resources)
    }
}

#[async_trait]
impl RemoteHierarchy for HttpRemote {
    async fn list_units(&self) -> Result<Vec<RemoteUnit>> {
        let hubs = self.get_all(format!("{}/project/v1/hubs", self.base_url)).await?;
        let mut units = Vec::new();

        for hub in hubs {
            debug!("Hub: {} / {}", hub.attributes.label(), hub.id);
            let url = format!("{}/project/v1/hubs/{}/projects", self.base_url, hub.id);
            match self.get_all(url).await {
                Ok(projects) => units.extend(projects.into_iter().map(|p| RemoteUnit {
                    name: p.attributes.label(),
                    id: p.id,
                    container: hub.id.clone(),
                })),
                Err(e) => warn!("Skipping hub {}: {}", hub.id, e),
            }
        }

        Ok(units)
    }

    async fn unit_root(&self, unit: &RemoteUnit) -> Result<NodeId> {
        let url = format!(
            "{}/project/v1/hubs/{}/projects/{}/topFolders",
            self.base_url, unit.container, unit.id
        );
        let folders = self.get_all(url).await?;

        folders
            .into_iter()
            .find(|f| f.attributes.label() == self.top_folder)
            .map(|f| NodeId::new(unit.id.clone(), f.id))
            .ok_or_else(|| {
                MirrorError::Network(format!(
                    "project {} has no top folder named {:?}",
                    unit.name, self.top_folder
                ))
            })
    }

    async fn list_children(&self, folder: &NodeId) -> Result<Vec<RemoteNode>> {
        let url = format!(
            "{}/data/v1/projects/{}/folders/{}/contents",
            self.base_url, folder.scope, folder.id
        );
        let entries = self.get_all(url).await?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let kind = match entry.kind.as_str() {
                    "folders" => NodeKind::Folder,
                    "items" => NodeKind::File,
                    other => {
                        debug!("Ignoring {} entry {}", other, entry.id);
                        return None;
                    }
                };
                Some(RemoteNode {
                    name: entry.attributes.label(),
                    id: NodeId::new(folder.scope.clone(), entry.id),
                    kind,
                    parent_id: Some(folder.clone()),
                })
            })
            .collect())
    }

    async fn object_metadata(&self, file: &NodeId) -> Result<ObjectMetadata> {
        let url = format!("{}/data/v1/projects/{}/items/{}", self.base_url, file.scope, file.id);
        let document: ItemDocument = self.get_json(&url).await?;
        let version = document
            .included
            .into_iter()
            .next()
            .ok_or_else(|| MirrorError::Network(format!("item {} has no version", file)))?;

        let modified_at = version.attributes.last_modified_time;
        Ok(ObjectMetadata {
            size: version.attributes.storage_size,
            created_at: version.attributes.create_time.unwrap_or(modified_at),
            modified_at,
            content_url: version.relationships.storage.meta.link.href,
        })
    }

    async fn signed_download_url(
        &self,
        _file: &NodeId,
        metadata: &ObjectMetadata,
        expiry_minutes: u32,
    ) -> Result<String> {
        let storage = metadata
            .content_url
            .split('?')
            .next()
            .unwrap_or(&metadata.content_url);
        let url = format!("{}/signeds3download?minutesExpiration={}", storage, expiry_minutes);
        let signed: SignedDownload = self.get_json(&url).await?;
        Ok(signed.url)
    }
}
