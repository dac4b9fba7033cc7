use std::collections::HashMap;

use device_plugin_pb::api::ContainerAllocateResponse;
use device_plugin_pb::api::DeviceSpec;
use device_plugin_pb::api::Mount;
use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;

use super::PluginError;
use crate::hardware::device::device_index_from_path;
use crate::hardware::Discovery;
use crate::manifest::ManifestEdits;
use crate::virtualization::VirtualDeviceMap;

const DEVICE_PERMISSIONS: &str = "rw";

/// Where container edits come from. Picked once when the session starts.
#[derive(Debug)]
pub enum AllocationSource {
    /// edits loaded from a CDI manifest at startup
    Manifest(ManifestEdits),
    /// edits built from a fresh discovery on every request
    Live(Discovery),
}

impl AllocationSource {
    /// Edits for one container asking for `virtual_ids`.
    ///
    /// Library resolution failures in live mode are reported as
    /// [`PluginError::Libraries`].
    pub fn container_response(
        &self,
        map: &VirtualDeviceMap,
        virtual_ids: &[String],
    ) -> Result<ContainerAllocateResponse, Report<PluginError>> {
        match self {
            Self::Manifest(edits) => Ok(from_manifest(edits, map, virtual_ids)),
            Self::Live(discovery) => from_discovery(discovery, map, virtual_ids),
        }
    }
}

fn from_manifest(
    edits: &ManifestEdits,
    map: &VirtualDeviceMap,
    virtual_ids: &[String],
) -> ContainerAllocateResponse {
    let nodes = map.filter_by_index(edits.device_nodes.clone(), virtual_ids, |node| {
        device_index_from_path(&node.path)
    });

    let devices = nodes
        .into_iter()
        .map(|node| DeviceSpec {
            container_path: node.path.clone(),
            host_path: node.path,
            permissions: DEVICE_PERMISSIONS.to_string(),
        })
        .collect();

    let mounts = edits
        .mounts
        .iter()
        .map(|mount| Mount {
            container_path: mount.container_path.clone(),
            host_path: mount.host_path.clone(),
            read_only: true,
        })
        .collect();

    ContainerAllocateResponse {
        envs: edits.envs.clone().into_iter().collect(),
        mounts,
        devices,
        annotations: HashMap::new(),
        cdi_devices: Vec::new(),
    }
}

fn from_discovery(
    discovery: &Discovery,
    map: &VirtualDeviceMap,
    virtual_ids: &[String],
) -> Result<ContainerAllocateResponse, Report<PluginError>> {
    let host = discovery.config();
    let devices = discovery
        .discover_devices()
        .change_context(PluginError::Discovery)?;
    let selected = map.filter_devices(&devices, virtual_ids);
    debug!(
        "Virtual devices {virtual_ids:?} resolve to {:?}",
        selected.values().map(|d| d.node_name()).collect::<Vec<_>>()
    );

    let devices = selected
        .values()
        .map(|device| DeviceSpec {
            container_path: device.container_node_path(),
            host_path: device.host_node_path(&host.devfs_root).display().to_string(),
            permissions: DEVICE_PERMISSIONS.to_string(),
        })
        .collect();

    let mounts = discovery
        .discover_mounts()
        .change_context(PluginError::Libraries)?
        .into_iter()
        .map(|mount| Mount {
            container_path: mount.container_path.display().to_string(),
            host_path: mount.host_path.display().to_string(),
            read_only: true,
        })
        .collect();

    Ok(ContainerAllocateResponse {
        envs: host.live_envs.clone().into_iter().collect(),
        mounts,
        devices,
        annotations: HashMap::new(),
        cdi_devices: Vec::new(),
    })
}
