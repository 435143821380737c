//! Installs the global subscriber, so it lives in its own test binary.

use mirror_agent::utils::logger;
use tempfile::TempDir;

#[test]
fn warnings_reach_error_log_below_configured_level() {
    let dir = TempDir::new().unwrap();
    // A session started in the same millisecond must not truncate this one
    let session_id = "20240101T000000.000Z";
    std::fs::write(dir.path().join(format!("session-{}.log", session_id)), "earlier run\n").unwrap();

    let files = logger::init("error", dir.path(), session_id).unwrap();

    tracing::info!("Walking Tower");
    tracing::warn!("Metadata for P/a.txt unavailable: timed out");
    tracing::error!("Transfer of P/b.txt failed");

    let errors = std::fs::read_to_string(&files.error_log).unwrap();
    assert!(errors.contains("Metadata for P/a.txt unavailable"), "{:?}", errors);
    assert!(errors.contains("Transfer of P/b.txt failed"));
    assert!(!errors.contains("Walking Tower"));

    let session = std::fs::read_to_string(&files.session_log).unwrap();
    assert!(session.starts_with("earlier run\n"));
    assert!(session.contains("Transfer of P/b.txt failed"));
    if std::env::var_os("RUST_LOG").is_none() {
        assert!(!session.contains("Metadata for P/a.txt unavailable"));
    }
}
