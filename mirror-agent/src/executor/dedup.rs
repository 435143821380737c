//! Per-file choice between transferring content and referencing the baseline.
//!
//! | Situation                                   | Action    |
//! |---------------------------------------------|-----------|
//! | current set is the baseline                 | download  |
//! | no baseline                                 | download  |
//! | path absent from the baseline               | download  |
//! | baseline copy matches under the policy      | reference |
//! | baseline copy differs                       | download  |

use super::rotation::BackupSet;
use crate::events::FileOutcome;
use crate::fs::links::LinkChain;
use crate::fs::metadata::{LocalRecord, RemoteTimestamps};
use crate::remote::{ObjectMetadata, RemoteHierarchy, RemoteNode};
use crate::transfer::bandwidth::{transfer_window_minutes, Throughput, MAX_WINDOW_MINUTES};
use crate::transfer::chunked::ChunkedDownloader;
use crate::utils::errors::MirrorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What "unchanged since the baseline" means.
///
/// Timestamps compare at millisecond precision, the finest the remote
/// service reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparePolicy {
    /// Remote modified-time equals the baseline copy's modified-time
    #[default]
    ModifiedTime,
    /// As above, and the sizes agree too. An unreported remote size never agrees.
    ModifiedTimeAndSize,
}

impl ComparePolicy {
    pub fn unchanged(&self, local: &LocalRecord, remote: &ObjectMetadata) -> bool {
        let same_time = local.modified.timestamp_millis() == remote.modified_at.timestamp_millis();
        match self {
            ComparePolicy::ModifiedTime => same_time,
            ComparePolicy::ModifiedTimeAndSize => same_time && remote.size == Some(local.size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadReason {
    BaselineRun,
    NoBaseline,
    NotInBaseline,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Download(DownloadReason),
    Reference { source: PathBuf },
}

pub struct DedupResolver {
    remote: Arc<dyn RemoteHierarchy>,
    downloader: Arc<ChunkedDownloader>,
    links: Arc<LinkChain>,
    policy: ComparePolicy,
    current: BackupSet,
    baseline: Option<BackupSet>,
    throughput: Option<Throughput>,
}

impl DedupResolver {
    pub fn new(
        remote: Arc<dyn RemoteHierarchy>,
        downloader: Arc<ChunkedDownloader>,
        links: Arc<LinkChain>,
        policy: ComparePolicy,
        current: BackupSet,
        baseline: Option<BackupSet>,
    ) -> Self {
        Self {
            remote,
            downloader,
            links,
            policy,
            current,
            baseline,
            throughput: None,
        }
    }

    pub fn with_throughput(mut self, throughput: Option<Throughput>) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn current(&self) -> &BackupSet {
        &self.current
    }

    /// Evaluate the decision table for the file at `relative`.
    pub fn decide(&self, relative: &Path, metadata: &ObjectMetadata) -> Decision {
        if self.current.is_baseline() {
            return Decision::Download(DownloadReason::BaselineRun);
        }
        let Some(baseline) = &self.baseline else {
            return Decision::Download(DownloadReason::NoBaseline);
        };

        let source = baseline.root.join(relative);
        match LocalRecord::read(&source) {
            Ok(Some(record)) if self.policy.unchanged(&record, metadata) => {
                Decision::Reference { source }
            }
            Ok(Some(_)) => Decision::Download(DownloadReason::Changed),
            Ok(None) => Decision::Download(DownloadReason::NotInBaseline),
            Err(e) => {
                debug!("Cannot read baseline copy {}: {}", source.display(), e);
                Decision::Download(DownloadReason::NotInBaseline)
            }
        }
    }

    /// Fetch metadata for `node`, decide, and carry out the decision.
    pub async fn resolve(
        &self,
        node: &RemoteNode,
        relative: &Path,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let metadata = match self.remote.object_metadata(&node.id).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Metadata for {} unavailable: {}", relative.display(), e);
                return failed(e);
            }
        };

        let dest = self.current.root.join(relative);
        match self.decide(relative, &metadata) {
            Decision::Reference { source } => match self.links.link(&source, &dest) {
                Ok(strategy) => FileOutcome::Referenced { strategy },
                Err(e) => {
                    error!("No reference for {}: {}", relative.display(), e);
                    failed(e)
                }
            },
            Decision::Download(reason) => {
                debug!("Downloading {} ({:?})", relative.display(), reason);
                self.download(node, &metadata, &dest, cancel).await
            }
        }
    }

    async fn download(
        &self,
        node: &RemoteNode,
        metadata: &ObjectMetadata,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let minutes = match metadata.size {
            Some(size) => transfer_window_minutes(size, self.throughput),
            None => MAX_WINDOW_MINUTES,
        };
        let url = match self.remote.signed_download_url(&node.id, metadata, minutes).await {
            Ok(url) => url,
            Err(e) => {
                warn!("No download URL for {}: {}", dest.display(), e);
                return failed(e);
            }
        };

        let report = match self.downloader.download(&url, metadata.size, dest, cancel).await {
            Ok(report) => report,
            Err(MirrorError::Cancelled) => return failed(MirrorError::Cancelled),
            Err(e) => {
                error!("Transfer of {} failed, left unstamped: {}", dest.display(), e);
                return failed(e);
            }
        };

        if let Err(e) = RemoteTimestamps::from_metadata(metadata).apply_to_path(dest) {
            warn!("Cannot stamp {}, it will be fetched again next session: {}", dest.display(), e);
        }

        FileOutcome::Downloaded {
            bytes: report.bytes_written,
        }
    }
}

fn failed(error: MirrorError) -> FileOutcome {
    FileOutcome::Failed {
        reason: error.to_string(),
    }
}
