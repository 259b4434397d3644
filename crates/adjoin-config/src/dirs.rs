//! State directory initialization.

use std::path::Path;

use adjoin_common::paths;

/// Ensure the state directory and its `logs/` subdirectory exist.
///
/// Errors are logged but not fatal here; the operations that actually need
/// the directory report their own failure.
pub fn ensure_state_dir(state_dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(state_dir) {
        tracing::warn!(
            path = %state_dir.display(),
            error = %e,
            "Could not create state directory"
        );
        return;
    }

    let logs = paths::log_dir(state_dir);
    if let Err(e) = std::fs::create_dir_all(&logs) {
        tracing::warn!(
            path = %logs.display(),
            error = %e,
            "Could not create log directory"
        );
    }

    tracing::debug!(path = %state_dir.display(), "State directory ready");
}
