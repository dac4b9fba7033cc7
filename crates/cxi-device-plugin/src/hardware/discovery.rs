use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::device::DEVICE_NODE_PREFIX;
use super::identity::device_uid;
use super::DeviceRecord;
use super::DeviceSet;
use super::FileKind;
use super::HardwareError;
use super::MountRecord;
use crate::config::host::VENDOR_ID;
use crate::config::HostConfig;

const PCI_SLOT_KEY: &str = "PCI_SLOT_NAME=";

/// Scans the host for CXI NICs and the libraries they need.
#[derive(Debug, Clone)]
pub struct Discovery {
    config: Arc<HostConfig>,
}

impl Discovery {
    pub fn new(config: Arc<HostConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Builds one record per HPE NIC below the topology namespace.
    ///
    /// A missing namespace means no devices. A device whose index cannot be
    /// resolved fails the whole pass.
    pub fn discover_devices(&self) -> Result<DeviceSet, Report<HardwareError>> {
        let topology = self.config.topology_path();
        let entries = match fs::read_dir(&topology) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "No HPE CXI devices found on this host, {} does not exist",
                    topology.display()
                );
                return Ok(DeviceSet::new());
            }
            Err(e) => {
                return Err(Report::new(e).change_context(HardwareError::Topology {
                    path: topology.display().to_string(),
                }))
            }
        };

        let mut cards: Vec<String> = entries
            .filter_map(io::Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        cards.sort();

        let mut devices = DeviceSet::new();
        for card in cards {
            let device_dir = topology.join(&card).join("device");
            let vendor = read_attribute(&device_dir, "vendor");
            if vendor != VENDOR_ID {
                debug!("{card} is not a HPE NIC (vendor {vendor:?})");
                continue;
            }
            debug!("Found HPE CXI PCI device: {card}");

            let device = build_device(&device_dir, &card)?;
            devices.insert(device.uid.clone(), device);
        }

        Ok(devices)
    }

    /// Lists the libfabric and libcxi files that have to be mounted into
    /// containers.
    pub fn discover_mounts(&self) -> Result<Vec<MountRecord>, Report<HardwareError>> {
        let mut mounts = Vec::new();
        for library in [&self.config.libfabric, &self.config.libcxi] {
            let root = library.resolve()?;
            info!("Using {} root: {}", library.name, root.display());
            mounts.extend(build_mounts(
                &root,
                library.name,
                &self.config.mount_options,
            )?);
        }
        Ok(mounts)
    }
}

/// Reads every attribute of one device directory into a record.
pub fn build_device(device_dir: &Path, name: &str) -> Result<DeviceRecord, Report<HardwareError>> {
    let pci_address = read_pci_slot(&device_dir.join("uevent"));
    let device_id = read_attribute(device_dir, "device");
    let device_index = read_device_index(device_dir)?;

    Ok(DeviceRecord {
        name: name.to_string(),
        uid: device_uid(&pci_address, &device_id),
        device_index,
        pci_address,
        local_cpus: read_attribute(device_dir, "local_cpus"),
        local_cpu_list: read_attribute(device_dir, "local_cpulist"),
        numa_node: read_attribute(device_dir, "numa_node"),
        version: read_attribute(device_dir, "properties/cassini_version"),
        speed: read_attribute(device_dir, "properties/speed"),
    })
}

/// Trimmed content of an attribute file, empty when it cannot be read.
fn read_attribute(device_dir: &Path, attribute: &str) -> String {
    let path = device_dir.join(attribute);
    match fs::read_to_string(&path) {
        Ok(content) => content.trim().to_string(),
        Err(e) => {
            warn!("Failed reading device file {}: {e}", path.display());
            String::new()
        }
    }
}

/// Bus address from the first `PCI_SLOT_NAME=` line of a uevent file.
fn read_pci_slot(uevent: &Path) -> String {
    let content = match fs::read_to_string(uevent) {
        Ok(content) => content,
        Err(e) => {
            warn!("Error opening {}: {e}", uevent.display());
            return String::new();
        }
    };

    content
        .lines()
        .find_map(|line| line.strip_prefix(PCI_SLOT_KEY))
        .map(|slot| slot.trim().to_string())
        .unwrap_or_default()
}

/// Lowest `cxiN` entry below `<device>/cxi`.
fn read_device_index(device_dir: &Path) -> Result<u64, Report<HardwareError>> {
    let node_dir = device_dir.join(DEVICE_NODE_PREFIX);
    let not_found = || HardwareError::DeviceIndexNotFound {
        path: device_dir.display().to_string(),
    };

    let entries = fs::read_dir(&node_dir).change_context_lazy(not_found)?;
    let index = entries
        .filter_map(io::Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            name.to_str()?
                .strip_prefix(DEVICE_NODE_PREFIX)?
                .parse::<u64>()
                .ok()
        })
        .min();

    match index {
        Some(index) => {
            debug!("Found device cxi{index} in {}", node_dir.display());
            Ok(index)
        }
        None => Err(Report::new(not_found())),
    }
}

fn build_mounts(
    root: &Path,
    prefix: &str,
    options: &[String],
) -> Result<Vec<MountRecord>, Report<HardwareError>> {
    let entries = fs::read_dir(root).change_context_lazy(|| HardwareError::LibraryDirectory {
        path: root.display().to_string(),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(io::Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .collect();
    paths.sort();

    let mounts = paths
        .into_iter()
        .map(|path| {
            let kind = match fs::symlink_metadata(&path) {
                Ok(metadata) => FileKind::from_file_type(metadata.file_type()),
                Err(e) => {
                    warn!("Failed to stat mount point {}: {e}", path.display());
                    FileKind::Unknown
                }
            };
            if kind == FileKind::Unknown {
                warn!("Unknown file type for {}", path.display());
            }
            MountRecord {
                name: prefix.to_string(),
                host_path: path.clone(),
                container_path: path,
                options: options.to_vec(),
                kind,
            }
        })
        .collect();
    Ok(mounts)
}
