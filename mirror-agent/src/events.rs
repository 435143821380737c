//! Structured session events.
//!
//! The engine emits one [`MirrorEvent`] per notable step onto an unbounded
//! channel; presentation lives entirely in the consumer. [`spawn_reporter`]
//! is the default consumer and renders events through `tracing`.

use crate::executor::rotation::SetKind;
use crate::executor::SessionSummary;
use crate::transfer::progress::{format_bytes, format_duration};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub type EventSender = mpsc::UnboundedSender<MirrorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<MirrorEvent>;

/// What happened to one remote file in this session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Content transferred and stamped
    Downloaded { bytes: u64 },
    /// Unchanged since the baseline; linked instead of copied
    Referenced { strategy: &'static str },
    /// Nothing usable left at the mirror path
    Failed { reason: String },
}

impl FileOutcome {
    pub fn marker(&self) -> &'static str {
        match self {
            FileOutcome::Downloaded { .. } => "downloaded",
            FileOutcome::Referenced { .. } => "unchanged",
            FileOutcome::Failed { .. } => "failed",
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        match self {
            FileOutcome::Downloaded { bytes } => *bytes,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEvent {
    /// Path relative to the set root
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum MirrorEvent {
    #[serde(rename = "session:started")]
    SessionStarted { set_id: String, kind: SetKind },

    #[serde(rename = "unit:started")]
    UnitStarted { name: String },

    #[serde(rename = "file")]
    File(FileEvent),

    #[serde(rename = "session:completed")]
    SessionCompleted(SessionSummary),
}

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Log every event until all senders are dropped.
pub fn spawn_reporter(mut rx: EventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render(&event);
        }
    })
}

fn render(event: &MirrorEvent) {
    match event {
        MirrorEvent::SessionStarted { set_id, kind } => {
            info!("Backup set {} ({:?})", set_id, kind);
        }
        MirrorEvent::UnitStarted { name } => {
            info!("Project: {}", name);
        }
        MirrorEvent::File(FileEvent { path, outcome }) => match outcome {
            FileOutcome::Downloaded { bytes } => {
                info!("[{}] {} ({})", outcome.marker(), path.display(), format_bytes(*bytes));
            }
            FileOutcome::Referenced { strategy } => {
                info!("[{}] {} ({})", outcome.marker(), path.display(), strategy);
            }
            FileOutcome::Failed { reason } => {
                warn!("[{}] {}: {}", outcome.marker(), path.display(), reason);
            }
        },
        MirrorEvent::SessionCompleted(summary) => {
            info!(
                "Finished in {}: {} transferred, {} downloaded, {} unchanged, {} failed",
                format_duration(summary.elapsed),
                format_bytes(summary.stats.bytes_transferred),
                summary.stats.downloaded,
                summary.stats.referenced,
                summary.stats.failed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_event_serialization() {
        let event = MirrorEvent::File(FileEvent {
            path: PathBuf::from("Tower/plans/site.dwg"),
            outcome: FileOutcome::Referenced { strategy: "symlink" },
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["payload"]["outcome"], "referenced");
        assert_eq!(json["payload"]["strategy"], "symlink");
        assert_eq!(json["payload"]["path"], "Tower/plans/site.dwg");
    }

    #[test]
    fn test_only_downloads_count_bytes() {
        assert_eq!(FileOutcome::Downloaded { bytes: 42 }.bytes_transferred(), 42);
        assert_eq!(FileOutcome::Referenced { strategy: "hardlink" }.bytes_transferred(), 0);
        assert_eq!(FileOutcome::Failed { reason: "x".into() }.bytes_transferred(), 0);
    }

    #[tokio::test]
    async fn test_reporter_drains_until_senders_drop() {
        let (tx, rx) = channel();
        let handle = spawn_reporter(rx);
        tx.send(MirrorEvent::UnitStarted { name: "Tower".into() }).unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
