use std::fs;
use std::io;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use tempfile::NamedTempFile;
use tracing::debug;
use tracing::warn;

use super::Manifest;
use super::ManifestError;

/// Mode every manifest ends up with, so unprivileged runtimes can read it.
pub const MANIFEST_FILE_MODE: u32 = 0o644;

const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// A manifest together with the file it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredManifest {
    pub path: PathBuf,
    pub manifest: Manifest,
}

/// Directory of CDI manifests, e.g. `/etc/cdi`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parses every manifest file in the directory, sorted by path.
    ///
    /// A missing directory holds no manifests. Files that fail to parse are
    /// logged and skipped: they may belong to other vendors.
    pub fn load_all(&self) -> Result<Vec<StoredManifest>, Report<ManifestError>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Manifest directory {} does not exist", self.dir.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Report::new(e).change_context(ManifestError::Directory {
                    path: self.dir.display().to_string(),
                }))
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(io::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_manifest_file(path))
            .collect();
        paths.sort();

        let mut manifests = Vec::with_capacity(paths.len());
        for path in paths {
            match read_manifest(&path) {
                Ok(manifest) => manifests.push(StoredManifest { path, manifest }),
                Err(e) => warn!("Skipping manifest {}: {e:?}", path.display()),
            }
        }
        Ok(manifests)
    }

    /// Manifests whose kind is exactly `kind`.
    pub fn manifests_of_kind(
        &self,
        kind: &str,
    ) -> Result<Vec<StoredManifest>, Report<ManifestError>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|stored| stored.manifest.kind == kind)
            .collect())
    }

    /// Writes `manifest` as `<dir>/<name>.yaml` and returns the path.
    pub fn write(&self, manifest: &Manifest, name: &str) -> Result<PathBuf, Report<ManifestError>> {
        if name.is_empty() || name.contains('/') {
            return Err(Report::new(ManifestError::InvalidName {
                name: name.to_string(),
            }));
        }
        let path = self.path_for(name);
        self.write_at(manifest, &path)?;
        Ok(path)
    }

    /// Path `write` uses for `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.yaml"))
    }

    /// Deletes a manifest file. An already missing file is not an error.
    pub fn remove(&self, path: &Path) -> Result<(), Report<ManifestError>> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed manifest {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Report::new(e).change_context(ManifestError::Remove {
                path: path.display().to_string(),
            })),
        }
    }

    /// Atomically replaces `path` with `manifest` and fixes its permissions.
    ///
    /// The content goes to a temporary file in the same directory first, so
    /// readers see either the old or the new manifest, never a partial one.
    pub fn write_at(&self, manifest: &Manifest, path: &Path) -> Result<(), Report<ManifestError>> {
        let write_error = || ManifestError::Write {
            path: path.display().to_string(),
        };
        let dir = path.parent().unwrap_or(&self.dir);

        let content = if has_extension(path, "json") {
            serde_json::to_string_pretty(manifest).change_context_lazy(|| ManifestError::Serialize {
                name: path.display().to_string(),
            })?
        } else {
            serde_yaml::to_string(manifest).change_context_lazy(|| ManifestError::Serialize {
                name: path.display().to_string(),
            })?
        };

        fs::create_dir_all(dir).change_context_lazy(write_error)?;
        let mut file = NamedTempFile::new_in(dir).change_context_lazy(write_error)?;
        file.write_all(content.as_bytes())
            .change_context_lazy(write_error)?;
        file.as_file().sync_all().change_context_lazy(write_error)?;
        file.persist(path)
            .map_err(|e| e.error)
            .change_context_lazy(write_error)?;

        debug!("Wrote manifest {}", path.display());
        fix_permissions(path)
    }
}

/// Makes a manifest readable by group and others.
pub fn fix_permissions(path: &Path) -> Result<(), Report<ManifestError>> {
    fs::set_permissions(path, fs::Permissions::from_mode(MANIFEST_FILE_MODE)).change_context_lazy(
        || ManifestError::Permissions {
            path: path.display().to_string(),
        },
    )
}

/// Loads a YAML or JSON manifest, chosen by file extension.
pub fn read_manifest(path: &Path) -> Result<Manifest, Report<ManifestError>> {
    let content = fs::read_to_string(path).change_context_lazy(|| ManifestError::Read {
        path: path.display().to_string(),
    })?;

    let parse_error = || ManifestError::Parse {
        path: path.display().to_string(),
    };
    if has_extension(path, "json") {
        serde_json::from_str(&content).change_context_lazy(parse_error)
    } else {
        serde_yaml::from_str(&content).change_context_lazy(parse_error)
    }
}

fn is_manifest_file(path: &Path) -> bool {
    path.is_file()
        && MANIFEST_EXTENSIONS
            .iter()
            .any(|extension| has_extension(path, extension))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|e| e == extension)
}
