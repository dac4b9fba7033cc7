//! Host layout the plugin reads devices and libraries from.
//!
//! Built once at startup from the environment and handed to discovery, the
//! manifest synchronizer and the resource session. Nothing mutates it later.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::path::PathBuf;

use crate::hardware::roots::resolve_root;
use crate::hardware::roots::LibraryRoot;

/// PCI vendor id of HPE Cassini NICs.
pub const VENDOR_ID: &str = "0x17db";

/// Topology namespace below the sysfs root.
pub const SYSFS_CLASS_PATH: &str = "class/cxi";

/// Cross-process shared memory device exposed next to every NIC.
pub const XPMEM_DEVICE_NAME: &str = "xpmem";

pub const MANIFEST_VENDOR: &str = "hpe.com";
pub const MANIFEST_CLASS: &str = "cxi";
pub const MANIFEST_KIND: &str = "hpe.com/cxi";

pub const RESOURCE_NAMESPACE: &str = "beta.hpe.com";

pub const DEFAULT_MOUNT_OPTIONS: [&str; 5] = ["ro", "nosuid", "nodev", "bind", "relatime"];

pub const SYSFS_ROOT_ENV: &str = "SYSFS_ROOT";
pub const DEVFS_ROOT_ENV: &str = "DEVFS_ROOT";
pub const LIBFABRIC_ROOT_ENV: &str = "OFI_ROOT";
pub const LIBCXI_ROOT_ENV: &str = "CXI_ROOT";
pub const VIRTUAL_DEVICES_ENV: &str = "CXI_VIRTUAL_DEVICES";

const SYSFS_DEFAULT_ROOT: &str = "/sys";
const DEVFS_DEFAULT_ROOT: &str = "/dev";
const LIBFABRIC_DEFAULT_ROOT: &str = "/opt/cray/lib64";
const LIBCXI_DEFAULT_ROOT: &str = "/usr/lib64";
const LIVE_LD_LIBRARY_PATH: &str = "/opt/cray/lib64:/usr/lib64";

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// resolved sysfs root, the topology namespace lives below it
    pub sysfs_root: PathBuf,
    /// resolved devfs root holding `cxiN` and `xpmem`
    pub devfs_root: PathBuf,
    pub libfabric: LibraryRoot,
    pub libcxi: LibraryRoot,
    /// options attached to every library mount written to a manifest
    pub mount_options: Vec<String>,
    /// environment handed to containers when allocating without a manifest
    pub live_envs: BTreeMap<String, String>,
    /// raw `CXI_VIRTUAL_DEVICES` value; the multiplexer treats 0 as 1
    pub virtual_devices_per_physical: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(SYSFS_DEFAULT_ROOT),
            devfs_root: PathBuf::from(DEVFS_DEFAULT_ROOT),
            libfabric: LibraryRoot {
                name: "libfabric",
                marker: "libfabric.so",
                override_root: None,
                default_root: PathBuf::from(LIBFABRIC_DEFAULT_ROOT),
            },
            libcxi: LibraryRoot {
                name: "libcxi",
                marker: "libcxi.so",
                override_root: None,
                default_root: PathBuf::from(LIBCXI_DEFAULT_ROOT),
            },
            mount_options: DEFAULT_MOUNT_OPTIONS.iter().map(|o| o.to_string()).collect(),
            live_envs: BTreeMap::from([(
                "LD_LIBRARY_PATH".to_string(),
                LIVE_LD_LIBRARY_PATH.to_string(),
            )]),
            virtual_devices_per_physical: 0,
        }
    }
}

impl HostConfig {
    /// Reads the root overrides and the virtual device count from the
    /// process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        let sysfs_override = env::var_os(SYSFS_ROOT_ENV).map(PathBuf::from);
        config.sysfs_root = resolve_root(
            sysfs_override.as_deref(),
            SYSFS_CLASS_PATH,
            Path::new(SYSFS_DEFAULT_ROOT),
        );

        let devfs_override = env::var_os(DEVFS_ROOT_ENV).map(PathBuf::from);
        config.devfs_root = resolve_root(
            devfs_override.as_deref(),
            "",
            Path::new(DEVFS_DEFAULT_ROOT),
        );

        config.libfabric.override_root = env::var_os(LIBFABRIC_ROOT_ENV).map(PathBuf::from);
        config.libcxi.override_root = env::var_os(LIBCXI_ROOT_ENV).map(PathBuf::from);

        config.virtual_devices_per_physical =
            parse_virtual_devices(env::var(VIRTUAL_DEVICES_ENV).ok().as_deref());

        config
    }

    /// Directory enumerated for candidate devices, e.g. `/sys/class/cxi`.
    pub fn topology_path(&self) -> PathBuf {
        self.sysfs_root.join(SYSFS_CLASS_PATH)
    }

    /// Host path of the shared memory device, e.g. `/dev/xpmem`.
    pub fn xpmem_path(&self) -> PathBuf {
        self.devfs_root.join(XPMEM_DEVICE_NAME)
    }
}

/// Absent or unparseable values count as 0.
pub fn parse_virtual_devices(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return 0;
    };
    match raw.trim().parse::<usize>() {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Error parsing {VIRTUAL_DEVICES_ENV}={raw:?}: {e}");
            0
        }
    }
}
