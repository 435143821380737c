//! Mirror Agent Library
//!
//! Incremental mirror of a remote project tree onto local storage, with a
//! permanent baseline and a bounded number of incremental sets.

pub mod config;
pub mod daemon;
pub mod events;
pub mod executor;
pub mod fs;
pub mod remote;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{Session, SessionSummary};
pub use utils::errors::MirrorError;
pub type Result<T> = std::result::Result<T, MirrorError>;
