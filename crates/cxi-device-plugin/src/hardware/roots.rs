//! Resolution of the sysfs, devfs and library roots.

use std::io;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;

use super::HardwareError;

/// Picks `override_root` when `override_root/probe` exists, `default_root`
/// otherwise.
pub fn resolve_root(override_root: Option<&Path>, probe: &str, default_root: &Path) -> PathBuf {
    if let Some(root) = override_root {
        let candidate = root.join(probe);
        if candidate.exists() {
            debug!("using custom root {} for {probe}", root.display());
            return root.to_path_buf();
        }
        debug!(
            "could not find {} from override, falling back to {}",
            candidate.display(),
            default_root.display()
        );
    }
    debug!("using default root {} for {probe}", default_root.display());
    default_root.to_path_buf()
}

/// A userspace library that must be present on the host before its
/// devices can be handed to containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRoot {
    /// library name and mount prefix, e.g. `libfabric`
    pub name: &'static str,
    /// file name prefix proving the library is installed, e.g. `libfabric.so`
    pub marker: &'static str,
    /// directory taken from the environment, tried first
    pub override_root: Option<PathBuf>,
    pub default_root: PathBuf,
}

impl LibraryRoot {
    /// Returns the first directory holding the library.
    ///
    /// An unreadable directory is an error, not a miss.
    pub fn resolve(&self) -> Result<PathBuf, Report<HardwareError>> {
        let candidates = self
            .override_root
            .iter()
            .chain(std::iter::once(&self.default_root));

        for root in candidates {
            if contains_entry_with_prefix(root, self.marker)? {
                debug!("using {} root {}", self.name, root.display());
                return Ok(root.clone());
            }
        }

        Err(Report::new(HardwareError::LibraryNotFound {
            name: self.name.to_string(),
        })
        .attach_printable(format!("no entry starting with {}", self.marker)))
    }
}

fn contains_entry_with_prefix(dir: &Path, prefix: &str) -> Result<bool, Report<HardwareError>> {
    let entries = std::fs::read_dir(dir).change_context_lazy(|| HardwareError::LibraryDirectory {
        path: dir.display().to_string(),
    })?;

    let found = entries
        .filter_map(io::Result::ok)
        .any(|entry| entry.file_name().to_string_lossy().starts_with(prefix));
    Ok(found)
}
