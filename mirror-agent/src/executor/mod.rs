//! Session orchestration.
//!
//! One session: rotate, probe bandwidth, then walk every included top-level
//! unit into the current set and summarize. Every step runs one at a time;
//! failures are logged where they happen and the session keeps going.

pub mod dedup;
pub mod rotation;
pub mod walker;

use crate::config::Config;
use crate::events::{EventSender, MirrorEvent};
use crate::fs::links::LinkChain;
use crate::fs::naming::sanitize_name;
use crate::remote::RemoteHierarchy;
use crate::transfer::bandwidth::BandwidthEstimator;
use crate::transfer::chunked::ChunkedDownloader;
use crate::transfer::progress::{format_bit_rate, format_bytes, format_duration};
use dedup::DedupResolver;
use rotation::{RotationManager, SetKind};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use walker::{TreeWalker, WalkStats};

/// Result of one session, returned instead of kept in shared counters
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub set_id: String,
    pub set_kind: SetKind,
    pub set_root: PathBuf,
    /// Units walked (after include/exclude filtering)
    pub units: usize,
    pub stats: WalkStats,
    pub pruned_sets: usize,
    pub measured_bits_per_second: Option<f64>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

pub struct Session {
    config: Config,
    remote: Arc<dyn RemoteHierarchy>,
    client: reqwest::Client,
    links: Arc<LinkChain>,
    cancel: CancellationToken,
    events: Option<EventSender>,
}

impl Session {
    pub fn new(config: Config, remote: Arc<dyn RemoteHierarchy>, client: reqwest::Client) -> Self {
        Self {
            config,
            remote,
            client,
            links: Arc::new(LinkChain::default()),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_links(mut self, links: LinkChain) -> Self {
        self.links = Arc::new(links);
        self
    }

    pub async fn run(&self) -> SessionSummary {
        let start = Instant::now();
        let backup = &self.config.backup;

        let rotation = RotationManager::new(&backup.root_dir, backup.retention).rotate();
        let current = rotation.current.clone();
        info!(
            "Session writing to {} ({} incremental sets retained)",
            current.root.display(),
            backup.retention
        );
        self.emit(MirrorEvent::SessionStarted {
            set_id: current.id.clone(),
            kind: current.kind,
        });

        let estimator = BandwidthEstimator::new(
            self.client.clone(),
            self.config.remote.speed_probe_url.clone(),
            self.config.remote.transfer_timeout(),
        );
        let throughput = estimator.measure().await;

        let downloader = ChunkedDownloader::new(
            self.client.clone(),
            self.config.remote.chunk_size,
            self.config.remote.transfer_timeout(),
        );
        let resolver = DedupResolver::new(
            Arc::clone(&self.remote),
            Arc::new(downloader),
            Arc::clone(&self.links),
            backup.compare,
            rotation.current,
            rotation.baseline,
        )
        .with_throughput(throughput);

        let mut stats = WalkStats::default();
        let mut units_walked = 0;

        let units = match self.remote.list_units().await {
            Ok(units) => units,
            Err(e) => {
                error!("Cannot list projects: {}", e);
                Vec::new()
            }
        };

        for name in &backup.include {
            if !units.iter().any(|u| &u.name == name) {
                warn!("Included project {:?} not found", name);
            }
        }

        let walker = TreeWalker::new(self.remote.as_ref(), &resolver, &self.cancel)
            .with_events(self.events.as_ref());

        for unit in units.iter().filter(|u| self.config.includes_unit(&u.name)) {
            if self.cancel.is_cancelled() {
                break;
            }
            self.emit(MirrorEvent::UnitStarted {
                name: unit.name.clone(),
            });

            let root = match self.remote.unit_root(unit).await {
                Ok(root) => root,
                Err(e) => {
                    warn!("Skipping project {}: {}", unit.name, e);
                    stats.skipped_branches += 1;
                    continue;
                }
            };

            let relative = PathBuf::from(sanitize_name(&unit.name));
            let local = current.root.join(&relative);
            if let Err(e) = tokio::fs::create_dir_all(&local).await {
                error!("Cannot create {}: {}", local.display(), e);
                stats.skipped_branches += 1;
                continue;
            }

            stats.merge(walker.walk(&root, &relative).await);
            units_walked += 1;
        }

        let summary = SessionSummary {
            set_id: current.id.clone(),
            set_kind: current.kind,
            set_root: current.root.clone(),
            units: units_walked,
            stats,
            pruned_sets: rotation.pruned.len(),
            measured_bits_per_second: throughput.map(|t| t.bits_per_second()),
            elapsed: start.elapsed(),
            cancelled: self.cancel.is_cancelled(),
        };

        info!(
            "Session {} complete: {} in {} ({} files, {} unchanged, {} failed, speed {})",
            summary.set_id,
            format_bytes(summary.stats.bytes_transferred),
            format_duration(summary.elapsed),
            summary.stats.files(),
            summary.stats.referenced,
            summary.stats.failed,
            summary
                .measured_bits_per_second
                .map(format_bit_rate)
                .unwrap_or_else(|| "unmeasured".to_string()),
        );
        self.emit(MirrorEvent::SessionCompleted(summary.clone()));

        summary
    }

    fn emit(&self, event: MirrorEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
