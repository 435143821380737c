//! Filesystem references from an incremental set into the baseline.
//!
//! Strategies are tried in order; the first one that is supported for the
//! source and succeeds wins. Nothing here falls back to copying bytes.

use crate::utils::errors::{MirrorError, Result};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// One way of making `link` show the content of `source`.
pub trait LinkStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Capability probe, evaluated before every attempt.
    fn supports(&self, source: &Path) -> bool;

    fn create(&self, source: &Path, link: &Path) -> io::Result<()>;
}

/// Symbolic link to the canonical source path.
pub struct Symlink;

impl LinkStrategy for Symlink {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn supports(&self, _source: &Path) -> bool {
        cfg!(any(unix, windows))
    }

    fn create(&self, source: &Path, link: &Path) -> io::Result<()> {
        let target = fs::canonicalize(source)?;

        #[cfg(unix)]
        return std::os::unix::fs::symlink(&target, link);

        #[cfg(windows)]
        return std::os::windows::fs::symlink_file(&target, link);

        #[cfg(not(any(unix, windows)))]
        {
            let _ = (target, link);
            Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks unavailable"))
        }
    }
}

/// NTFS directory junction. Only applies to directory sources on Windows.
pub struct Junction;

impl LinkStrategy for Junction {
    fn name(&self) -> &'static str {
        "junction"
    }

    fn supports(&self, source: &Path) -> bool {
        cfg!(windows) && source.is_dir()
    }

    fn create(&self, source: &Path, link: &Path) -> io::Result<()> {
        let status = std::process::Command::new("cmd")
            .arg("/C")
            .arg("mklink")
            .arg("/J")
            .arg(link)
            .arg(source)
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("mklink /J exited with {}", status),
            ))
        }
    }
}

/// Hard link. Requires source and link on the same volume.
pub struct HardLink;

impl LinkStrategy for HardLink {
    fn name(&self) -> &'static str {
        "hardlink"
    }

    fn supports(&self, source: &Path) -> bool {
        source.is_file()
    }

    fn create(&self, source: &Path, link: &Path) -> io::Result<()> {
        fs::hard_link(source, link)
    }
}

/// Ordered list of strategies behind one entry point.
pub struct LinkChain {
    strategies: Vec<Box<dyn LinkStrategy>>,
}

impl LinkChain {
    pub fn new(strategies: Vec<Box<dyn LinkStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Create `link` referring to `source`, returning the strategy that worked.
    pub fn link(&self, source: &Path, link: &Path) -> Result<&'static str> {
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            if !strategy.supports(source) {
                continue;
            }
            match strategy.create(source, link) {
                Ok(()) => return Ok(strategy.name()),
                Err(e) => {
                    debug!("{} failed for {}: {}", strategy.name(), link.display(), e);
                    attempts.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        if attempts.is_empty() {
            attempts.push("no supported strategy".to_string());
        }

        Err(MirrorError::Filesystem(format!(
            "could not reference {} from {} ({})",
            source.display(),
            link.display(),
            attempts.join("; ")
        )))
    }
}

impl Default for LinkChain {
    fn default() -> Self {
        Self::new(vec![Box::new(Symlink), Box::new(Junction), Box::new(HardLink)])
    }
}
