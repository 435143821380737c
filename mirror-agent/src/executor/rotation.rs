//! Backup set generations.
//!
//! Layout under the backup root:
//!
//! ```text
//! <root>/baseline/                       permanent, never pruned
//! <root>/incremental_<YYYYmmddTHHMMSS.mmmZ>/
//! ```
//!
//! Every set carries a `.backup-set.json` marker. Failures are logged and the
//! session continues with whatever state resulted.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const BASELINE_DIR: &str = "baseline";
pub const INCREMENTAL_PREFIX: &str = "incremental_";
pub const SET_MARKER: &str = ".backup-set.json";

const ID_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetKind {
    Baseline,
    Incremental,
}

/// One backup generation on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSet {
    /// Creation timestamp, also part of the directory name of incrementals
    pub id: String,
    pub kind: SetKind,
    pub created_at: DateTime<Utc>,
    pub permanent: bool,
    #[serde(skip)]
    pub root: PathBuf,
}

impl BackupSet {
    fn new(kind: SetKind, created_at: DateTime<Utc>, root: PathBuf) -> Self {
        Self {
            id: format_id(created_at),
            kind,
            created_at,
            permanent: kind == SetKind::Baseline,
            root,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.kind == SetKind::Baseline
    }
}

/// Result of [`RotationManager::rotate`]
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    /// Set this session writes into
    pub current: BackupSet,
    /// The permanent baseline, if one exists (equal to `current` on the first run)
    pub baseline: Option<BackupSet>,
    /// Incremental sets deleted by retention
    pub pruned: Vec<PathBuf>,
}

pub struct RotationManager {
    root: PathBuf,
    retention: usize,
}

impl RotationManager {
    pub fn new(root: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            root: root.into(),
            retention: retention.max(1),
        }
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.root.join(BASELINE_DIR)
    }

    pub fn rotate(&self) -> RotationOutcome {
        self.rotate_at(Utc::now())
    }

    /// Create this session's set as of `now` and prune old incrementals.
    pub fn rotate_at(&self, now: DateTime<Utc>) -> RotationOutcome {
        if let Err(e) = fs::create_dir_all(&self.root) {
            error!("Rotation: cannot create backup root {}: {}", self.root.display(), e);
        }

        if let Some(baseline) = self.baseline() {
            let current = self.create_incremental(now);
            let pruned = self.prune(&current);
            return RotationOutcome {
                current,
                baseline: Some(baseline),
                pruned,
            };
        }

        let baseline = BackupSet::new(SetKind::Baseline, now, self.baseline_path());
        match create_set(&baseline) {
            Ok(()) => info!("Created permanent baseline at {}", baseline.root.display()),
            Err(e) => error!("Rotation: cannot create baseline {}: {}", baseline.root.display(), e),
        }

        RotationOutcome {
            current: baseline.clone(),
            baseline: Some(baseline),
            pruned: Vec::new(),
        }
    }

    /// The permanent baseline, when its directory exists.
    pub fn baseline(&self) -> Option<BackupSet> {
        let path = self.baseline_path();
        if !path.is_dir() {
            return None;
        }

        match read_marker(&path) {
            Some(mut set) => {
                set.root = path;
                Some(set)
            }
            None => {
                let created_at = dir_created_at(&path).unwrap_or_else(Utc::now);
                Some(BackupSet::new(SetKind::Baseline, created_at, path))
            }
        }
    }

    /// Incremental sets, oldest first.
    pub fn list_incrementals(&self) -> io::Result<Vec<BackupSet>> {
        let mut sets = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(id) = name.strip_prefix(INCREMENTAL_PREFIX) else {
                continue;
            };

            let path = entry.path();
            let created_at = parse_id(id)
                .or_else(|| dir_created_at(&path))
                .unwrap_or_default();

            sets.push(BackupSet {
                id: id.to_string(),
                kind: SetKind::Incremental,
                created_at,
                permanent: false,
                root: path,
            });
        }

        sets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sets)
    }

    fn create_incremental(&self, now: DateTime<Utc>) -> BackupSet {
        let mut created_at = now;
        let mut set = self.incremental_at(created_at);
        while set.root.exists() {
            created_at += Duration::milliseconds(1);
            set = self.incremental_at(created_at);
        }

        match create_set(&set) {
            Ok(()) => info!("Created incremental set {}", set.root.display()),
            Err(e) => error!("Rotation: cannot create incremental set {}: {}", set.root.display(), e),
        }
        set
    }

    fn incremental_at(&self, created_at: DateTime<Utc>) -> BackupSet {
        let id = format_id(created_at);
        let root = self.root.join(format!("{}{}", INCREMENTAL_PREFIX, id));
        BackupSet::new(SetKind::Incremental, created_at, root)
    }

    /// Delete the oldest incrementals until at most `retention` remain.
    /// The set being written this session is never a candidate.
    fn prune(&self, current: &BackupSet) -> Vec<PathBuf> {
        let sets = match self.list_incrementals() {
            Ok(sets) => sets,
            Err(e) => {
                error!("Rotation: cannot list sets in {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        let mut excess = sets.len().saturating_sub(self.retention);
        let mut pruned = Vec::new();

        for set in sets.into_iter().filter(|s| s.root != current.root) {
            if excess == 0 {
                break;
            }
            match fs::remove_dir_all(&set.root) {
                Ok(()) => {
                    info!("Pruned incremental set {}", set.root.display());
                    pruned.push(set.root);
                    excess -= 1;
                }
                Err(e) => {
                    warn!("Rotation: cannot prune {}: {}", set.root.display(), e);
                    excess -= 1;
                }
            }
        }

        pruned
    }
}

fn create_set(set: &BackupSet) -> io::Result<()> {
    fs::create_dir_all(&set.root)?;
    let marker = serde_json::to_vec_pretty(set)?;
    fs::write(set.root.join(SET_MARKER), marker)
}

fn read_marker(dir: &Path) -> Option<BackupSet> {
    let content = fs::read(dir.join(SET_MARKER)).ok()?;
    match serde_json::from_slice(&content) {
        Ok(set) => Some(set),
        Err(e) => {
            warn!("Ignoring unreadable marker in {}: {}", dir.display(), e);
            None
        }
    }
}

fn format_id(at: DateTime<Utc>) -> String {
    at.format(ID_FORMAT).to_string()
}

fn parse_id(id: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(id, ID_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn dir_created_at(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = fs::metadata(path).ok()?;
    let time = metadata.created().or_else(|_| metadata.modified()).ok()?;
    Some(DateTime::<Utc>::from(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, minute, 0).unwrap()
    }

    #[test]
    fn test_first_rotation_creates_permanent_baseline() {
        let dir = TempDir::new().unwrap();
        let manager = RotationManager::new(dir.path(), 3);

        let outcome = manager.rotate_at(at(0));
        assert!(outcome.current.is_baseline());
        assert!(outcome.current.permanent);
        assert_eq!(outcome.current.root, dir.path().join(BASELINE_DIR));
        assert!(dir.path().join(BASELINE_DIR).join(SET_MARKER).exists());

        let reloaded = manager.baseline().unwrap();
        assert!(reloaded.permanent);
        assert_eq!(reloaded.created_at, at(0));
    }

    #[test]
    fn test_second_rotation_is_incremental() {
        let dir = TempDir::new().unwrap();
        let manager = RotationManager::new(dir.path(), 3);
        manager.rotate_at(at(0));

        let outcome = manager.rotate_at(at(1));
        assert_eq!(outcome.current.kind, SetKind::Incremental);
        assert_eq!(outcome.current.id, "20240601T100100.000Z");
        assert!(outcome.current.root.is_dir());
        assert!(outcome.baseline.unwrap().is_baseline());
    }

    #[test]
    fn test_retention_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let manager = RotationManager::new(dir.path(), 3);
        manager.rotate_at(at(0));
        std::fs::write(dir.path().join(BASELINE_DIR).join("keep.txt"), b"x").unwrap();

        for minute in 1..=5 {
            manager.rotate_at(at(minute));
        }

        let remaining = manager.list_incrementals().unwrap();
        let ids: Vec<_> = remaining.iter().map(|s| s.created_at).collect();
        assert_eq!(ids, vec![at(3), at(4), at(5)]);
        assert!(dir.path().join(BASELINE_DIR).join("keep.txt").exists());
    }

    #[test]
    fn test_rotation_bound_for_various_retentions() {
        for retention in 1..=4 {
            let dir = TempDir::new().unwrap();
            let manager = RotationManager::new(dir.path(), retention);
            let sessions = retention as u32 + 3;
            let mut pruned = 0;
            for minute in 0..sessions {
                pruned += manager.rotate_at(at(minute)).pruned.len();
            }

            let remaining = manager.list_incrementals().unwrap();
            assert_eq!(remaining.len(), retention);
            assert_eq!(pruned, sessions as usize - 1 - retention);
            assert_eq!(remaining.last().unwrap().created_at, at(sessions - 1));
            assert!(manager.baseline().is_some());
        }
    }

    #[test]
    fn test_same_instant_gets_distinct_sets() {
        let dir = TempDir::new().unwrap();
        let manager = RotationManager::new(dir.path(), 5);
        manager.rotate_at(at(0));

        let a = manager.rotate_at(at(1)).current;
        let b = manager.rotate_at(at(1)).current;
        assert_ne!(a.root, b.root);
        assert!(b.created_at > a.created_at);
    }

    #[test]
    fn test_unrelated_directories_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        let manager = RotationManager::new(dir.path(), 1);
        manager.rotate_at(at(0));
        manager.rotate_at(at(1));
        manager.rotate_at(at(2));

        assert!(dir.path().join("logs").is_dir());
        assert_eq!(manager.list_incrementals().unwrap().len(), 1);
    }

    #[test]
    fn test_id_round_trip() {
        let now = Utc.timestamp_millis_opt(1_717_236_000_123).unwrap();
        assert_eq!(parse_id(&format_id(now)), Some(now));
    }
}
