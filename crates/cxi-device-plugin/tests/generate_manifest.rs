//! End-to-end runs of the manifest generator against a fake host tree.

use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use cxi_device_plugin::cmd::generate_manifest::generate;
use cxi_device_plugin::config::GenerateManifestArgs;
use cxi_device_plugin::config::HostConfig;
use cxi_device_plugin::manifest::store::read_manifest;
use cxi_device_plugin::manifest::ManifestEdits;
use cxi_device_plugin::manifest::ReconcilePolicy;
use cxi_device_plugin::manifest::SyncOutcome;
use similar_asserts::assert_eq;
use tempfile::TempDir;
use test_log::test;

struct FakeHost {
    dir: TempDir,
    config: HostConfig,
}

impl FakeHost {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let root = dir.path();
        let fabric = root.join("opt/cray/lib64");
        let cxi = root.join("usr/lib64");
        for path in [root.join("sys/class/cxi"), root.join("dev"), fabric.clone(), cxi.clone()] {
            fs::create_dir_all(path).expect("should create dir");
        }
        fs::write(fabric.join("libfabric.so.1"), "").expect("should write lib");
        fs::write(cxi.join("libcxi.so.1"), "").expect("should write lib");
        fs::write(root.join("dev/xpmem"), "").expect("should write xpmem");

        let mut config = HostConfig {
            sysfs_root: root.join("sys"),
            devfs_root: root.join("dev"),
            ..HostConfig::default()
        };
        config.libfabric.default_root = fabric;
        config.libcxi.default_root = cxi;
        Self { dir, config }
    }

    fn add_nic(&self, index: u64, pci_address: &str) {
        let device = self
            .config
            .topology_path()
            .join(format!("cxi{index}"))
            .join("device");
        fs::create_dir_all(device.join(format!("cxi/cxi{index}"))).expect("should create nic");
        fs::write(device.join("vendor"), "0x17db\n").expect("should write vendor");
        fs::write(device.join("device"), "0x0501\n").expect("should write device id");
        fs::write(
            device.join("uevent"),
            format!("DRIVER=cxi_core\nPCI_SLOT_NAME={pci_address}\n"),
        )
        .expect("should write uevent");
        fs::write(self.config.devfs_root.join(format!("cxi{index}")), "")
            .expect("should write node");
    }

    fn args(&self, env_vars: Option<PathBuf>, dry_run: bool) -> GenerateManifestArgs {
        GenerateManifestArgs {
            manifest_dir: self.manifest_dir(),
            env_vars,
            dry_run,
            reconcile: ReconcilePolicy::Keep,
            log_path: None,
        }
    }

    fn manifest_dir(&self) -> PathBuf {
        self.dir.path().join("etc/cdi")
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

#[test]
fn writes_manifest_for_discovered_nics() {
    let host = FakeHost::new();
    host.add_nic(0, "0000:00:1f.0");
    host.add_nic(1, "0000:01:00.0");
    let env_file = host.root().join("env.yaml");
    fs::write(&env_file, "env:\n  - FI_PROVIDER=cxi\n").expect("should write env file");

    let outcome = generate(&host.args(Some(env_file), false), Arc::new(host.config.clone()))
        .expect("should generate");
    let path = host.manifest_dir().join("hpe.com-cxi.yaml");
    assert_eq!(outcome, Some(SyncOutcome::Created(path.clone())));

    let mode = fs::metadata(&path).expect("should stat").permissions().mode();
    assert_eq!(mode & 0o777, 0o644);

    let manifest = read_manifest(&path).expect("should parse written manifest");
    assert_eq!(manifest.kind, "hpe.com/cxi");
    assert_eq!(manifest.version, "0.5.0");
    let names: Vec<&str> = manifest.devices.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["0", "1", "all"]);
    assert_eq!(manifest.container_edits.env, vec!["FI_PROVIDER=cxi"]);
    assert_eq!(manifest.container_edits.mounts.len(), 2);

    let edits = ManifestEdits::from_manifest(&manifest);
    let nodes: BTreeSet<&str> = edits.device_nodes.iter().map(|n| n.path.as_str()).collect();
    let xpmem = host.config.xpmem_path().display().to_string();
    assert_eq!(nodes, BTreeSet::from(["/dev/cxi0", "/dev/cxi1", xpmem.as_str()]));
}

#[test]
fn dry_run_leaves_directory_alone() {
    let host = FakeHost::new();
    host.add_nic(0, "0000:00:1f.0");

    let outcome =
        generate(&host.args(None, true), Arc::new(host.config.clone())).expect("should run");
    assert_eq!(outcome, None);
    assert!(!host.manifest_dir().exists());
}

#[test]
fn second_run_keeps_existing_manifest() {
    let host = FakeHost::new();
    host.add_nic(0, "0000:00:1f.0");
    let config = Arc::new(host.config.clone());

    generate(&host.args(None, false), config.clone()).expect("first run");
    let path = host.manifest_dir().join("hpe.com-cxi.yaml");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).expect("should chmod");

    host.add_nic(1, "0000:01:00.0");
    let outcome = generate(&host.args(None, false), config).expect("second run");
    assert_eq!(outcome, Some(SyncOutcome::Kept(vec![path.clone()])));

    let manifest = read_manifest(&path).expect("should parse");
    assert_eq!(manifest.devices.len(), 2);
    let mode = fs::metadata(&path).expect("should stat").permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[test]
fn missing_library_fails_generation() {
    let host = FakeHost::new();
    host.add_nic(0, "0000:00:1f.0");
    fs::remove_file(host.config.libcxi.default_root.join("libcxi.so.1")).expect("should remove");

    let err = generate(&host.args(None, false), Arc::new(host.config.clone()))
        .expect_err("libcxi is missing");
    assert!(err.to_string().contains("libcxi"));
    assert!(!host.manifest_dir().join("hpe.com-cxi.yaml").exists());
}
