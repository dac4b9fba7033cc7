//! Process-wide tracing setup for the commands.

use std::path::Path;

use utils::logging::WorkerGuard;

/// Installs the global subscriber. With a log path, events are mirrored into
/// a rotated file and the returned guard keeps the writer alive.
pub fn init(log_path: Option<&Path>) -> Option<WorkerGuard> {
    let Some(log_path) = log_path else {
        utils::logging::init();
        return None;
    };

    match utils::logging::init_with_file(log_path) {
        Ok(guard) => Some(guard),
        Err(e) => {
            utils::logging::init();
            tracing::warn!("File logging disabled: {e}");
            None
        }
    }
}
