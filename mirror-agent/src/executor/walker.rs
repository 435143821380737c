//! Depth-first traversal of the remote tree.
//!
//! Uses an explicit stack of pending directory frames instead of recursion,
//! so depth is bounded only by memory. Each frame holds the not-yet-visited
//! entries of one listing, in the order the service returned them.

use super::dedup::DedupResolver;
use crate::events::{EventSender, FileEvent, FileOutcome, MirrorEvent};
use crate::fs::naming::sanitize_name;
use crate::remote::{NodeId, NodeKind, RemoteHierarchy, RemoteNode};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Totals for one traversal. Combined by the orchestrator with [`WalkStats::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub folders: usize,
    pub downloaded: usize,
    pub referenced: usize,
    pub failed: usize,
    pub bytes_transferred: u64,
    /// Directories whose listing or local creation failed; their subtrees were skipped
    pub skipped_branches: usize,
}

impl WalkStats {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Downloaded { bytes } => {
                self.downloaded += 1;
                self.bytes_transferred += bytes;
            }
            FileOutcome::Referenced { .. } => self.referenced += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: WalkStats) {
        self.folders += other.folders;
        self.downloaded += other.downloaded;
        self.referenced += other.referenced;
        self.failed += other.failed;
        self.bytes_transferred += other.bytes_transferred;
        self.skipped_branches += other.skipped_branches;
    }

    pub fn files(&self) -> usize {
        self.downloaded + self.referenced + self.failed
    }
}

struct Frame {
    entries: VecDeque<RemoteNode>,
    relative: PathBuf,
}

pub struct TreeWalker<'a> {
    remote: &'a dyn RemoteHierarchy,
    resolver: &'a DedupResolver,
    cancel: &'a CancellationToken,
    events: Option<&'a EventSender>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(
        remote: &'a dyn RemoteHierarchy,
        resolver: &'a DedupResolver,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            remote,
            resolver,
            cancel,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<&'a EventSender>) -> Self {
        self.events = events;
        self
    }

    /// Mirror the subtree under `root` into `<set>/<relative_root>`.
    ///
    /// The local directory for `relative_root` must already exist.
    pub async fn walk(&self, root: &NodeId, relative_root: &Path) -> WalkStats {
        let mut stats = WalkStats::default();
        let mut stack = Vec::new();

        if let Some(frame) = self.open(root, relative_root.to_path_buf(), &mut stats).await {
            stack.push(frame);
        }

        loop {
            if self.cancel.is_cancelled() {
                warn!("Traversal of {} cancelled", relative_root.display());
                break;
            }

            let next = stack
                .last_mut()
                .map(|frame| (frame.entries.pop_front(), frame.relative.clone()));
            let Some((next, parent)) = next else {
                break;
            };
            let Some(node) = next else {
                stack.pop();
                continue;
            };

            let relative = parent.join(sanitize_name(&node.name));
            match node.kind {
                NodeKind::Folder => {
                    let local = self.resolver.current().root.join(&relative);
                    if let Err(e) = tokio::fs::create_dir_all(&local).await {
                        error!("Cannot create {}: {}", local.display(), e);
                        stats.skipped_branches += 1;
                        continue;
                    }
                    stats.folders += 1;
                    debug!("Folder {}", relative.display());

                    if let Some(frame) = self.open(&node.id, relative, &mut stats).await {
                        stack.push(frame);
                    }
                }
                NodeKind::File => {
                    let outcome = self.resolver.resolve(&node, &relative, self.cancel).await;
                    stats.record(&outcome);
                    self.emit(MirrorEvent::File(FileEvent {
                        path: relative,
                        outcome,
                    }));
                }
            }
        }

        info!(
            "Walked {}: {} folders, {} files ({} downloaded, {} unchanged, {} failed)",
            relative_root.display(),
            stats.folders,
            stats.files(),
            stats.downloaded,
            stats.referenced,
            stats.failed
        );
        stats
    }

    async fn open(&self, folder: &NodeId, relative: PathBuf, stats: &mut WalkStats) -> Option<Frame> {
        match self.remote.list_children(folder).await {
            Ok(children) => Some(Frame {
                entries: children.into(),
                relative,
            }),
            Err(e) => {
                warn!("Skipping {}: listing failed: {}", relative.display(), e);
                stats.skipped_branches += 1;
                None
            }
        }
    }

    fn emit(&self, event: MirrorEvent) {
        if let Some(events) = self.events {
            let _ = events.send(event);
        }
    }
}
