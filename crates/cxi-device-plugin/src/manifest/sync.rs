use std::path::PathBuf;
use std::sync::Arc;

use error_stack::Report;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::version::minimum_required_version;
use super::ContainerEdits;
use super::DeviceNode;
use super::Manifest;
use super::ManifestDevice;
use super::ManifestError;
use super::ManifestStore;
use super::Mount;
use crate::config::host::MANIFEST_KIND;
use crate::config::HostConfig;
use crate::hardware::DeviceSet;
use crate::hardware::MountRecord;

/// Name of the synthetic device entry aggregating every NIC.
pub const ALL_DEVICES: &str = "all";

const CHAR_DEVICE: &str = "c";

/// What happens when a manifest for the kind is already on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReconcilePolicy {
    /// leave existing manifests untouched
    #[default]
    Keep,
    /// rewrite the canonical manifest from the current discovery and delete
    /// any other manifest of the kind
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// no manifest existed, a new one was written here
    Created(PathBuf),
    /// manifests already existed and were left alone
    Kept(Vec<PathBuf>),
    /// the canonical manifest was rebuilt. `written` is `None` when it was
    /// already up to date; other files of the kind were deleted
    Replaced {
        written: Option<PathBuf>,
        removed: Vec<PathBuf>,
    },
}

/// Keeps the on-disk manifest in line with discovered hardware.
#[derive(Debug, Clone)]
pub struct ManifestSynchronizer {
    store: ManifestStore,
    host: Arc<HostConfig>,
    policy: ReconcilePolicy,
}

impl ManifestSynchronizer {
    pub fn new(store: ManifestStore, host: Arc<HostConfig>, policy: ReconcilePolicy) -> Self {
        Self {
            store,
            host,
            policy,
        }
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    #[tracing::instrument(
        skip_all,
        fields(dir = %self.store.dir().display(), policy = ?self.policy)
    )]
    pub fn sync(
        &self,
        devices: &DeviceSet,
        mounts: &[MountRecord],
        env: &[String],
    ) -> Result<SyncOutcome, Report<ManifestError>> {
        let existing = self.store.manifests_of_kind(MANIFEST_KIND)?;

        if existing.is_empty() {
            debug!("No existing manifest for {MANIFEST_KIND}, creating new");
            let manifest = build_manifest(&self.host, devices, mounts, env);
            let path = self.store.write(&manifest, &canonical_name(&manifest)?)?;
            info!(
                "Wrote manifest {} with {} devices",
                path.display(),
                devices.len()
            );
            return Ok(SyncOutcome::Created(path));
        }

        match self.policy {
            ReconcilePolicy::Keep => {
                let paths: Vec<PathBuf> =
                    existing.into_iter().map(|stored| stored.path).collect();
                info!(
                    "Manifest for {MANIFEST_KIND} already exists in {paths:?}, \
                     update and removal of entries is not implemented"
                );
                Ok(SyncOutcome::Kept(paths))
            }
            ReconcilePolicy::Replace => {
                let manifest = build_manifest(&self.host, devices, mounts, env);
                let path = self.store.path_for(&canonical_name(&manifest)?);

                let up_to_date = existing
                    .iter()
                    .any(|stored| stored.path == path && stored.manifest == manifest);
                let written = if up_to_date {
                    debug!("Manifest {} is up to date", path.display());
                    None
                } else {
                    warn!("Replacing manifest {}", path.display());
                    self.store.write_at(&manifest, &path)?;
                    Some(path.clone())
                };

                // one file per kind, device names must not repeat across files
                let mut removed = Vec::new();
                for stored in existing.into_iter().filter(|stored| stored.path != path) {
                    warn!("Removing duplicate manifest {}", stored.path.display());
                    self.store.remove(&stored.path)?;
                    removed.push(stored.path);
                }
                Ok(SyncOutcome::Replaced { written, removed })
            }
        }
    }
}

fn canonical_name(manifest: &Manifest) -> Result<String, Report<ManifestError>> {
    manifest.canonical_name().ok_or_else(|| {
        Report::new(ManifestError::InvalidKind {
            kind: manifest.kind.clone(),
        })
    })
}

/// Builds a complete manifest for the discovered hardware.
///
/// One entry per NIC named after its device index, in index order, then an
/// `all` entry with every NIC's node. Library mounts, the xpmem node and the
/// extra environment go to the container-wide edits.
pub fn build_manifest(
    host: &HostConfig,
    devices: &DeviceSet,
    mounts: &[MountRecord],
    env: &[String],
) -> Manifest {
    let mut ordered: Vec<_> = devices.values().collect();
    ordered.sort_by_key(|device| device.device_index);

    let mut entries = Vec::with_capacity(ordered.len() + 1);
    let mut all_nodes = Vec::with_capacity(ordered.len());
    for device in ordered {
        let node = DeviceNode {
            path: device.container_node_path(),
            host_path: Some(device.host_node_path(&host.devfs_root).display().to_string()),
            node_type: Some(CHAR_DEVICE.to_string()),
        };
        entries.push(ManifestDevice {
            name: device.device_index.to_string(),
            container_edits: ContainerEdits {
                device_nodes: vec![node.clone()],
                ..ContainerEdits::default()
            },
            ..ManifestDevice::default()
        });
        all_nodes.push(node);
    }
    entries.push(ManifestDevice {
        name: ALL_DEVICES.to_string(),
        container_edits: ContainerEdits {
            device_nodes: all_nodes,
            ..ContainerEdits::default()
        },
        ..ManifestDevice::default()
    });

    let mounts = mounts
        .iter()
        .map(|mount| {
            let tag = mount.kind.tag();
            Mount {
                host_path: mount.host_path.display().to_string(),
                container_path: mount.container_path.display().to_string(),
                options: host.mount_options.clone(),
                mount_type: (!tag.is_empty()).then(|| tag.to_string()),
            }
        })
        .collect();

    let xpmem = host.xpmem_path().display().to_string();
    let mut manifest = Manifest {
        kind: MANIFEST_KIND.to_string(),
        devices: entries,
        container_edits: ContainerEdits {
            env: env.to_vec(),
            device_nodes: vec![DeviceNode {
                path: xpmem.clone(),
                host_path: Some(xpmem),
                node_type: Some(CHAR_DEVICE.to_string()),
            }],
            mounts,
        },
        ..Manifest::default()
    };
    manifest.version = minimum_required_version(&manifest).to_string();
    manifest
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::hardware::device::sample_device;
    use crate::hardware::FileKind;

    fn devices(indices: &[u64]) -> DeviceSet {
        indices
            .iter()
            .map(|i| {
                let device = sample_device(*i);
                (device.uid.clone(), device)
            })
            .collect()
    }

    fn library_mount(path: &str, kind: FileKind) -> MountRecord {
        MountRecord {
            name: "libcxi".to_string(),
            host_path: PathBuf::from(path),
            container_path: PathBuf::from(path),
            options: vec!["ro".to_string()],
            kind,
        }
    }

    fn host() -> Arc<HostConfig> {
        Arc::new(HostConfig::default())
    }

    #[test]
    fn aggregates_every_device_under_all() {
        let manifest = build_manifest(&host(), &devices(&[1, 0, 2]), &[], &[]);

        let names: Vec<&str> = manifest.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "2", "all"]);

        let (all, individual) = manifest.devices.split_last().expect("has entries");
        let union: Vec<DeviceNode> = individual
            .iter()
            .flat_map(|d| d.container_edits.device_nodes.clone())
            .collect();
        assert_eq!(all.container_edits.device_nodes, union);

        assert_eq!(
            individual[2].container_edits.device_nodes,
            vec![DeviceNode {
                path: "/dev/cxi2".to_string(),
                host_path: Some("/dev/cxi2".to_string()),
                node_type: Some("c".to_string()),
            }]
        );
    }

    #[test]
    fn container_wide_edits() {
        let mounts = vec![
            library_mount("/usr/lib64/libcxi.so", FileKind::Symlink),
            library_mount("/usr/lib64/libcxi.so.1", FileKind::Regular),
        ];
        let env = vec!["FI_PROVIDER=cxi".to_string()];
        let manifest = build_manifest(&host(), &devices(&[0]), &mounts, &env);

        assert_eq!(manifest.kind, "hpe.com/cxi");
        assert_eq!(manifest.version, "0.5.0");
        assert_eq!(manifest.container_edits.env, env);
        assert_eq!(
            manifest.container_edits.device_nodes,
            vec![DeviceNode {
                path: "/dev/xpmem".to_string(),
                host_path: Some("/dev/xpmem".to_string()),
                node_type: Some("c".to_string()),
            }]
        );
        assert_eq!(
            manifest.container_edits.mounts[0],
            Mount {
                host_path: "/usr/lib64/libcxi.so".to_string(),
                container_path: "/usr/lib64/libcxi.so".to_string(),
                options: vec!["ro", "nosuid", "nodev", "bind", "relatime"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                mount_type: Some("l".to_string()),
            }
        );
        assert_eq!(
            manifest.container_edits.mounts[1].mount_type.as_deref(),
            Some("-")
        );
    }

    #[test]
    fn no_devices_still_has_all_entry() {
        let manifest = build_manifest(&host(), &DeviceSet::new(), &[], &[]);
        assert_eq!(manifest.devices.len(), 1);
        assert_eq!(manifest.devices[0].name, ALL_DEVICES);
        assert!(manifest.devices[0].container_edits.device_nodes.is_empty());
        assert!(manifest.container_edits.env.is_empty());
    }

    #[test]
    fn creates_manifest_when_absent() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let synchronizer = ManifestSynchronizer::new(
            ManifestStore::new(dir.path()),
            host(),
            ReconcilePolicy::Keep,
        );

        let outcome = synchronizer
            .sync(&devices(&[0, 1]), &[], &[])
            .expect("should sync");
        let path = dir.path().join("hpe.com-cxi.yaml");
        assert_eq!(outcome, SyncOutcome::Created(path.clone()));

        let mode = fs::metadata(&path).expect("should stat").permissions().mode();
        assert_eq!(mode & 0o044, 0o044);

        let stored = synchronizer
            .store()
            .manifests_of_kind(MANIFEST_KIND)
            .expect("should load");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].manifest.devices.len(), 3);
    }

    #[test]
    fn keep_leaves_existing_manifest_alone() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = ManifestStore::new(dir.path());
        let synchronizer = ManifestSynchronizer::new(store.clone(), host(), ReconcilePolicy::Keep);

        synchronizer
            .sync(&devices(&[0]), &[], &[])
            .expect("first sync");
        let path = dir.path().join("hpe.com-cxi.yaml");
        let before = fs::read_to_string(&path).expect("should read");

        let outcome = synchronizer
            .sync(&devices(&[0, 1, 2]), &[], &[])
            .expect("second sync");
        assert_eq!(outcome, SyncOutcome::Kept(vec![path.clone()]));
        assert_eq!(fs::read_to_string(&path).expect("should read"), before);
    }

    #[test]
    fn replace_rewrites_stale_manifest() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = ManifestStore::new(dir.path());
        ManifestSynchronizer::new(store.clone(), host(), ReconcilePolicy::Keep)
            .sync(&devices(&[0]), &[], &[])
            .expect("first sync");

        let synchronizer =
            ManifestSynchronizer::new(store.clone(), host(), ReconcilePolicy::Replace);
        let path = dir.path().join("hpe.com-cxi.yaml");

        let outcome = synchronizer
            .sync(&devices(&[0, 1]), &[], &[])
            .expect("replace sync");
        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                written: Some(path.clone()),
                removed: vec![],
            }
        );

        let stored = store.manifests_of_kind(MANIFEST_KIND).expect("should load");
        let names: BTreeSet<&str> = stored[0]
            .manifest
            .devices
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, BTreeSet::from(["0", "1", "all"]));

        let outcome = synchronizer
            .sync(&devices(&[0, 1]), &[], &[])
            .expect("no-op sync");
        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                written: None,
                removed: vec![],
            }
        );
    }

    #[test]
    fn replace_keeps_a_single_manifest_per_kind() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = ManifestStore::new(dir.path());
        let stale = build_manifest(&host(), &devices(&[0]), &[], &[]);
        let canonical = store.write(&stale, "hpe.com-cxi").expect("should write");
        let legacy = store.write(&stale, "legacy-cxi").expect("should write");

        let outcome = ManifestSynchronizer::new(store.clone(), host(), ReconcilePolicy::Replace)
            .sync(&devices(&[0, 1]), &[], &[])
            .expect("replace sync");
        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                written: Some(canonical.clone()),
                removed: vec![legacy.clone()],
            }
        );

        let stored = store.manifests_of_kind(MANIFEST_KIND).expect("should load");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].path, canonical);
        assert_eq!(stored[0].manifest.devices.len(), 3);
        assert!(!legacy.exists());
    }

    #[test]
    fn replace_moves_a_lone_legacy_manifest_to_the_canonical_name() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let store = ManifestStore::new(dir.path());
        let current = build_manifest(&host(), &devices(&[0]), &[], &[]);
        let legacy = store.write(&current, "legacy-cxi").expect("should write");

        let outcome = ManifestSynchronizer::new(store.clone(), host(), ReconcilePolicy::Replace)
            .sync(&devices(&[0]), &[], &[])
            .expect("replace sync");
        assert_eq!(
            outcome,
            SyncOutcome::Replaced {
                written: Some(store.path_for("hpe.com-cxi")),
                removed: vec![legacy],
            }
        );
        assert_eq!(
            store.manifests_of_kind(MANIFEST_KIND).expect("should load").len(),
            1
        );
    }

    #[test]
    fn other_vendors_do_not_count_as_existing() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        fs::write(
            dir.path().join("nvidia.yaml"),
            "cdiVersion: 0.5.0\nkind: nvidia.com/gpu\ndevices: []\n",
        )
        .expect("should write");

        let synchronizer = ManifestSynchronizer::new(
            ManifestStore::new(dir.path()),
            host(),
            ReconcilePolicy::Keep,
        );
        let outcome = synchronizer
            .sync(&devices(&[0]), &[], &[])
            .expect("should sync");
        assert!(matches!(outcome, SyncOutcome::Created(_)));
    }
}
