//! Shared fixtures: an in-memory remote hierarchy and an axum server that
//! answers ranged content requests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path as UrlPath, State};
use axum::http::header::{CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use mirror_agent::config::Config;
use mirror_agent::remote::{NodeId, NodeKind, ObjectMetadata, RemoteHierarchy, RemoteNode, RemoteUnit};
use mirror_agent::MirrorError;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const PROBE_SIZE: usize = 64 * 1024;

#[derive(Default)]
pub struct ContentState {
    files: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
}

impl ContentState {
    pub fn requests_for(&self, id: &str) -> usize {
        self.requests.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().values().sum()
    }

    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }
}

pub struct ContentServer {
    pub addr: SocketAddr,
    pub state: Arc<ContentState>,
}

impl ContentServer {
    pub async fn start() -> Self {
        let state = Arc::new(ContentState::default());
        let app = Router::new()
            .route("/content/{id}", get(ranged))
            .route("/whole/{id}", get(whole))
            .route("/probe", get(probe))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn put(&self, id: &str, content: Vec<u8>) {
        self.state.files.lock().unwrap().insert(id.to_string(), content);
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let bounds = value.strip_prefix("bytes=")?;
    let (start, end) = bounds.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn ranged(
    State(state): State<Arc<ContentState>>,
    UrlPath(id): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    *state.requests.lock().unwrap().entry(id.clone()).or_default() += 1;
    if state.failing.lock().unwrap().contains(&id) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let files = state.files.lock().unwrap();
    let Some(data) = files.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let len = data.len() as u64;

    match headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range)
    {
        Some((start, end)) => {
            if start >= len {
                return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
            }
            let end = end.min(len - 1);
            let body = data[start as usize..=end as usize].to_vec();
            (
                StatusCode::PARTIAL_CONTENT,
                [(CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, len))],
                body,
            )
                .into_response()
        }
        None => (StatusCode::OK, data.clone()).into_response(),
    }
}

/// Ignores the Range header entirely.
async fn whole(State(state): State<Arc<ContentState>>, UrlPath(id): UrlPath<String>) -> Response {
    *state.requests.lock().unwrap().entry(id.clone()).or_default() += 1;
    match state.files.lock().unwrap().get(&id) {
        Some(data) => (StatusCode::OK, data.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn probe() -> Vec<u8> {
    vec![0u8; PROBE_SIZE]
}

pub fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
}

pub fn payload(size: usize, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

struct FakeFile {
    size: Option<u64>,
    modified: DateTime<Utc>,
}

#[derive(Default)]
struct Tree {
    units: Vec<(RemoteUnit, NodeId)>,
    children: HashMap<NodeId, Vec<RemoteNode>>,
    files: HashMap<NodeId, FakeFile>,
    broken_listings: HashSet<NodeId>,
}

/// In-memory [`RemoteHierarchy`] whose file content lives on a [`ContentServer`].
pub struct FakeRemote {
    content_base: String,
    server_state: Arc<ContentState>,
    tree: Mutex<Tree>,
}

impl FakeRemote {
    pub fn new(server: &ContentServer) -> Self {
        Self {
            content_base: server.url("/content"),
            server_state: Arc::clone(&server.state),
            tree: Mutex::new(Tree::default()),
        }
    }

    /// Add a unit and return its root folder.
    pub fn unit(&self, name: &str) -> NodeId {
        let root = NodeId::new(name, format!("{}-root", name));
        let unit = RemoteUnit {
            id: name.to_string(),
            name: name.to_string(),
            container: "hub".to_string(),
        };
        let mut tree = self.tree.lock().unwrap();
        tree.units.push((unit, root.clone()));
        tree.children.entry(root.clone()).or_default();
        root
    }

    pub fn folder(&self, parent: &NodeId, id: &str, name: &str) -> NodeId {
        let node = NodeId::new(parent.scope.clone(), id);
        let mut tree = self.tree.lock().unwrap();
        tree.children.entry(parent.clone()).or_default().push(RemoteNode {
            id: node.clone(),
            name: name.to_string(),
            kind: NodeKind::Folder,
            parent_id: Some(parent.clone()),
        });
        tree.children.entry(node.clone()).or_default();
        node
    }

    /// Add a file; `content` must also be `put` on the server under `id`.
    pub fn file(&self, parent: &NodeId, id: &str, name: &str, size: u64, modified: DateTime<Utc>) -> NodeId {
        let node = NodeId::new(parent.scope.clone(), id);
        let mut tree = self.tree.lock().unwrap();
        tree.children.entry(parent.clone()).or_default().push(RemoteNode {
            id: node.clone(),
            name: name.to_string(),
            kind: NodeKind::File,
            parent_id: Some(parent.clone()),
        });
        tree.files.insert(
            node.clone(),
            FakeFile {
                size: Some(size),
                modified,
            },
        );
        node
    }

    pub fn touch(&self, file: &NodeId, modified: DateTime<Utc>) {
        if let Some(f) = self.tree.lock().unwrap().files.get_mut(file) {
            f.modified = modified;
        }
    }

    /// Change the reported size and nothing else.
    pub fn resize(&self, file: &NodeId, size: u64) {
        if let Some(f) = self.tree.lock().unwrap().files.get_mut(file) {
            f.size = Some(size);
        }
    }

    /// Stop reporting a size for `file`, as for versions without `storageSize`.
    pub fn forget_size(&self, file: &NodeId) {
        if let Some(f) = self.tree.lock().unwrap().files.get_mut(file) {
            f.size = None;
        }
    }

    pub fn break_listing(&self, folder: &NodeId) {
        self.tree.lock().unwrap().broken_listings.insert(folder.clone());
    }

    pub fn content_requests(&self, file: &NodeId) -> usize {
        self.server_state.requests_for(&file.id)
    }
}

#[async_trait]
impl RemoteHierarchy for FakeRemote {
    async fn list_units(&self) -> mirror_agent::Result<Vec<RemoteUnit>> {
        Ok(self.tree.lock().unwrap().units.iter().map(|(u, _)| u.clone()).collect())
    }

    async fn unit_root(&self, unit: &RemoteUnit) -> mirror_agent::Result<NodeId> {
        self.tree
            .lock()
            .unwrap()
            .units
            .iter()
            .find(|(u, _)| u.id == unit.id)
            .map(|(_, root)| root.clone())
            .ok_or_else(|| MirrorError::Network(format!("no unit {}", unit.name)))
    }

    async fn list_children(&self, folder: &NodeId) -> mirror_agent::Result<Vec<RemoteNode>> {
        let tree = self.tree.lock().unwrap();
        if tree.broken_listings.contains(folder) {
            return Err(MirrorError::Network(format!("listing {} failed", folder)));
        }
        Ok(tree.children.get(folder).cloned().unwrap_or_default())
    }

    async fn object_metadata(&self, file: &NodeId) -> mirror_agent::Result<ObjectMetadata> {
        let tree = self.tree.lock().unwrap();
        let f = tree
            .files
            .get(file)
            .ok_or_else(|| MirrorError::Network(format!("no item {}", file)))?;
        Ok(ObjectMetadata {
            size: f.size,
            created_at: f.modified,
            modified_at: f.modified,
            content_url: format!("{}/{}", self.content_base, file.id),
        })
    }

    async fn signed_download_url(
        &self,
        _file: &NodeId,
        metadata: &ObjectMetadata,
        expiry_minutes: u32,
    ) -> mirror_agent::Result<String> {
        assert!((2..=60).contains(&expiry_minutes));
        Ok(metadata.content_url.clone())
    }
}

pub fn test_config(root: &Path, probe_url: &str, chunk_size: u64, retention: usize) -> Config {
    test_config_comparing(root, probe_url, chunk_size, retention, "modified_time")
}

pub fn test_config_comparing(
    root: &Path,
    probe_url: &str,
    chunk_size: u64,
    retention: usize,
    compare: &str,
) -> Config {
    let text = format!(
        r#"
        [credentials]
        client_id = "test"
        client_secret = "test"

        [backup]
        root_dir = "{}"
        retention = {}
        compare = "{}"

        [remote]
        speed_probe_url = "{}"
        chunk_size = {}
        request_timeout_secs = 10
        transfer_timeout_secs = 10
        "#,
        root.display().to_string().replace('\\', "\\\\"),
        retention,
        compare,
        probe_url,
        chunk_size
    );
    Config::from_toml_str(&text).unwrap()
}
