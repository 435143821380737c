//! Timestamp preservation for mirrored files.
//!
//! The modification time stamped here is exactly what a later session reads
//! back through [`LocalRecord::read`] to decide whether a baseline copy is
//! still current. A file that was never stamped never matches.

use crate::remote::ObjectMetadata;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::fs;
use std::io;
use std::path::Path;

/// Timestamps reported by the remote service for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTimestamps {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl RemoteTimestamps {
    pub fn from_metadata(metadata: &ObjectMetadata) -> Self {
        Self {
            created: metadata.created_at,
            modified: metadata.modified_at,
        }
    }

    /// Stamp these timestamps onto a local file.
    ///
    /// Access and modification times are set to `modified`. `created` is
    /// deliberately not written: `filetime` has no setter for creation time,
    /// so it keeps whatever the OS assigned. Nothing downstream reads it.
    pub fn apply_to_path(&self, path: &Path) -> io::Result<()> {
        let modified = to_file_time(self.modified);
        filetime::set_file_times(path, modified, modified)
    }
}

/// What the local filesystem records about a mirrored file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalRecord {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl LocalRecord {
    /// Read the record for `path`, or `None` when nothing exists there.
    pub fn read(path: &Path) -> io::Result<Option<Self>> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        if !metadata.is_file() {
            return Ok(None);
        }

        let mtime = FileTime::from_last_modification_time(&metadata);
        let modified = DateTime::from_timestamp(mtime.unix_seconds(), mtime.nanoseconds())
            .unwrap_or_default();

        Ok(Some(Self {
            size: metadata.len(),
            modified,
        }))
    }
}

fn to_file_time(at: DateTime<Utc>) -> FileTime {
    FileTime::from_unix_time(at.timestamp(), at.timestamp_subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_stamp_and_read_back() -> io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let modified = Utc.with_ymd_and_hms(2023, 5, 17, 12, 30, 0).unwrap();
        let stamps = RemoteTimestamps {
            created: Utc.with_ymd_and_hms(2023, 5, 1, 8, 0, 0).unwrap(),
            modified,
        };
        stamps.apply_to_path(temp_file.path())?;

        let record = LocalRecord::read(temp_file.path())?.unwrap();
        assert_eq!(record.size, 12);
        assert_eq!(record.modified, modified);

        Ok(())
    }

    #[test]
    fn test_millisecond_precision_survives() -> io::Result<()> {
        let temp_file = NamedTempFile::new()?;
        let modified = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        RemoteTimestamps { created: modified, modified }.apply_to_path(temp_file.path())?;

        let record = LocalRecord::read(temp_file.path())?.unwrap();
        assert_eq!(record.modified.timestamp_millis(), 1_700_000_000_123);

        Ok(())
    }

    #[test]
    fn test_access_time_follows_modified_not_created() -> io::Result<()> {
        let temp_file = NamedTempFile::new()?;
        let stamps = RemoteTimestamps {
            created: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            modified: Utc.with_ymd_and_hms(2023, 5, 17, 12, 30, 0).unwrap(),
        };
        stamps.apply_to_path(temp_file.path())?;

        let metadata = fs::metadata(temp_file.path())?;
        let accessed = FileTime::from_last_access_time(&metadata);
        assert_eq!(accessed.unix_seconds(), stamps.modified.timestamp());
        Ok(())
    }

    #[test]
    fn test_missing_path_has_no_record() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(LocalRecord::read(&dir.path().join("absent"))?.is_none());
        assert!(LocalRecord::read(dir.path())?.is_none());
        Ok(())
    }
}
