pub mod deps;
pub mod doctor;
pub mod init;
pub mod issue;
pub mod new;

use specledger_core::{hooks, paths};

/// Install the session-capture hook into the user's agent settings. Failure
/// never aborts the calling command.
pub(crate) fn install_hook_advisory() {
    let path = match paths::home_dir() {
        Ok(home) => home.join(paths::CLAUDE_SETTINGS_FILE),
        Err(e) => {
            tracing::warn!(error = %e, "skipping session capture hook");
            return;
        }
    };
    match hooks::install_session_capture_hook(&path) {
        Ok(true) => tracing::info!(path = %path.display(), "installed session capture hook"),
        Ok(false) => tracing::debug!("session capture hook already present"),
        Err(e) => tracing::warn!(error = %e, "failed to install session capture hook"),
    }
}
