use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// Name of a CXI device node, both in devfs and under the sysfs device dir.
pub const DEVICE_NODE_PREFIX: &str = "cxi";

/// Directory the device nodes appear under inside a container.
pub const CONTAINER_DEV_DIR: &str = "/dev";

/// One physical CXI NIC as seen in sysfs.
///
/// Records are rebuilt on every discovery pass and never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// sysfs class name, e.g. `cxi0`
    pub name: String,
    /// UID derived from the PCI address and device id, e.g. `0000-00-00-0-0x0000`
    pub uid: String,
    /// device number, e.g. 0 for `/dev/cxi0`
    pub device_index: u64,
    /// PCI address in DBDF notation, e.g. `0000:00:00.0`
    pub pci_address: String,
    /// CPU mask local to the device, e.g. `ffff0000,00000000`
    pub local_cpus: String,
    /// CPU list local to the device, e.g. `0-3,8-11`
    pub local_cpu_list: String,
    /// NUMA node number, `-1` when the platform has none
    pub numa_node: String,
    /// Cassini firmware version
    pub version: String,
    /// link speed
    pub speed: String,
}

impl DeviceRecord {
    /// Name of the device node, e.g. `cxi0`.
    pub fn node_name(&self) -> String {
        format!("{DEVICE_NODE_PREFIX}{}", self.device_index)
    }

    /// Path of the device node on the host.
    pub fn host_node_path(&self, devfs_root: &Path) -> PathBuf {
        devfs_root.join(self.node_name())
    }

    /// Path the device node is exposed at inside a container.
    pub fn container_node_path(&self) -> String {
        format!("{CONTAINER_DEV_DIR}/{}", self.node_name())
    }

    /// NUMA node as a number, if the platform reports one.
    pub fn numa_node_id(&self) -> Option<i64> {
        self.numa_node.parse::<i64>().ok().filter(|node| *node >= 0)
    }
}

/// Devices keyed by UID.
pub type DeviceSet = BTreeMap<String, DeviceRecord>;

/// Extracts the device number from a device node path such as `/dev/cxi3`.
pub fn device_index_from_path(path: &str) -> Option<u64> {
    let file_name = Path::new(path).file_name()?.to_str()?;
    let digits = file_name.strip_prefix(DEVICE_NODE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
pub(crate) fn sample_device(index: u64) -> DeviceRecord {
    DeviceRecord {
        name: format!("cxi{index}"),
        uid: format!("0000-0{index}-00-0-0x0501"),
        device_index: index,
        pci_address: format!("0000:0{index}:00.0"),
        local_cpus: "ffff0000".to_string(),
        local_cpu_list: "0-15".to_string(),
        numa_node: "0".to_string(),
        version: "1.1".to_string(),
        speed: "200000".to_string(),
    }
}
