//! sysfs/devfs/library tree fixtures shared by unit tests

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::HostConfig;

pub(crate) struct HostFixture {
    pub dir: TempDir,
    pub config: HostConfig,
}

impl HostFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let root = dir.path();

        let sysfs = root.join("sys");
        let devfs = root.join("dev");
        let fabric = root.join("opt/cray/lib64");
        let cxi = root.join("usr/lib64");
        for path in [&sysfs.join("class/cxi"), &devfs, &fabric, &cxi] {
            fs::create_dir_all(path).expect("should create fixture dir");
        }

        write(&fabric.join("libfabric.so.1"), "");
        symlink(fabric.join("libfabric.so.1"), fabric.join("libfabric.so"))
            .expect("should link libfabric");
        write(&cxi.join("libcxi.so.1"), "");
        write(&cxi.join("libcxiutils.so.0"), "");
        write(&cxi.join("libz.so.1"), "");
        symlink(cxi.join("libcxi.so.1"), cxi.join("libcxi.so")).expect("should link libcxi");
        write(&devfs.join("xpmem"), "");

        let mut config = HostConfig {
            sysfs_root: sysfs,
            devfs_root: devfs,
            ..HostConfig::default()
        };
        config.libfabric.default_root = fabric;
        config.libcxi.default_root = cxi;

        Self { dir, config }
    }

    pub fn config(&self) -> Arc<HostConfig> {
        Arc::new(self.config.clone())
    }

    pub fn libcxi_dir(&self) -> PathBuf {
        self.config.libcxi.default_root.clone()
    }

    /// Creates `class/cxi/<name>/device` with every attribute and a
    /// matching `cxiN` node in devfs.
    pub fn add_device(&self, name: &str, vendor: &str, pci_address: &str, index: u64) {
        let device_dir = self.config.topology_path().join(name).join("device");
        fs::create_dir_all(device_dir.join("properties")).expect("should create device dir");
        fs::create_dir_all(device_dir.join("cxi").join(format!("cxi{index}")))
            .expect("should create index dir");

        write(&device_dir.join("vendor"), &format!("{vendor}\n"));
        write(
            &device_dir.join("uevent"),
            &format!("DRIVER=cxi_core\nPCI_SLOT_NAME={pci_address}\n"),
        );
        write(&device_dir.join("device"), "0x0501\n");
        write(&device_dir.join("local_cpus"), "ffff0000\n");
        write(&device_dir.join("local_cpulist"), "0-15\n");
        write(&device_dir.join("numa_node"), "0\n");
        write(&device_dir.join("properties/cassini_version"), "1.2.3\n");
        write(&device_dir.join("properties/speed"), "200000\n");

        write(&self.config.devfs_root.join(format!("cxi{index}")), "");
    }

    pub fn remove_device_node(&self, index: u64) {
        fs::remove_file(self.config.devfs_root.join(format!("cxi{index}")))
            .expect("should remove device node");
    }
}

fn write(path: &Path, content: &str) {
    fs::write(path, content).expect("should write fixture file");
}
