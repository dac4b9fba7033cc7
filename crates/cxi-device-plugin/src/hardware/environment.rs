use std::io;
use std::path::Path;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use tracing::debug;
use tracing::warn;

use super::HardwareError;

/// Layout of the optional environment file:
///
/// ```yaml
/// env:
///   - FI_PROVIDER=cxi
///   - FI_CXI_RX_MATCH_MODE=hybrid
/// ```
#[derive(Debug, Default, Deserialize)]
struct EnvFile {
    #[serde(default)]
    env: Vec<String>,
}

/// Reads `KEY=VALUE` entries to merge into generated manifests.
///
/// No path or a missing file yields an empty list. A file that exists but
/// cannot be read or parsed is an error.
pub fn discover_environment(path: Option<&Path>) -> Result<Vec<String>, Report<HardwareError>> {
    let Some(path) = path else {
        debug!("No environment variables file specified, skipping discovery");
        return Ok(Vec::new());
    };

    let error = || HardwareError::EnvironmentFile {
        path: path.display().to_string(),
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("Environment variables file {} does not exist", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(Report::new(e).change_context(error())),
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let file: EnvFile = serde_yaml::from_str(&content).change_context_lazy(error)?;
    Ok(file.env)
}
