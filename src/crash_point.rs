//! Crash point injection for durability testing
//!
//! When `CHRONOSYNC_CRASH_POINT` names a point reached by the running
//! process, the process terminates immediately via `std::process::abort()`:
//! no cleanup, no unwinding, no watermark flush.
//!
//! ```bash
//! CHRONOSYNC_CRASH_POINT=sync_before_commit chronosync once --config sync.json
//! ```

use std::sync::OnceLock;

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var("CHRONOSYNC_CRASH_POINT").ok())
        .as_deref()
}

/// Returns true if `CHRONOSYNC_CRASH_POINT` equals the given name.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Coordinator
    pub const SYNC_AFTER_DELIVERY: &str = "sync_after_delivery";
    pub const SYNC_BEFORE_COMMIT: &str = "sync_before_commit";
    pub const SYNC_AFTER_COMMIT: &str = "sync_after_commit";

    // File watermark store
    pub const WATERMARK_BEFORE_RENAME: &str = "watermark_before_rename";
    pub const WATERMARK_AFTER_RENAME: &str = "watermark_after_rename";

    // Skip journal
    pub const JOURNAL_AFTER_APPEND: &str = "journal_after_append";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            SYNC_AFTER_DELIVERY,
            SYNC_BEFORE_COMMIT,
            SYNC_AFTER_COMMIT,
            WATERMARK_BEFORE_RENAME,
            WATERMARK_AFTER_RENAME,
            JOURNAL_AFTER_APPEND,
        ]
    }
}
