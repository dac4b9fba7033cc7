use std::collections::BTreeMap;
use std::path::Path;

use error_stack::Report;
use tracing::error;
use tracing::warn;

use super::store::read_manifest;
use super::DeviceNode;
use super::Manifest;
use super::ManifestError;
use super::Mount;

/// Container edits extracted from a manifest for serving allocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestEdits {
    /// every device node, de-duplicated by container path
    pub device_nodes: Vec<DeviceNode>,
    pub mounts: Vec<Mount>,
    pub envs: BTreeMap<String, String>,
}

impl ManifestEdits {
    pub fn load(path: &Path) -> Result<Self, Report<ManifestError>> {
        let manifest = read_manifest(path)?;
        Ok(Self::from_manifest(&manifest))
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        if manifest.devices.is_empty() {
            error!("No devices in the manifest");
        }

        let mut nodes: BTreeMap<&str, &DeviceNode> = BTreeMap::new();
        let device_nodes = manifest
            .devices
            .iter()
            .flat_map(|device| &device.container_edits.device_nodes);
        for node in device_nodes.chain(&manifest.container_edits.device_nodes) {
            nodes.entry(node.path.as_str()).or_insert(node);
        }

        let envs = manifest
            .container_edits
            .env
            .iter()
            .filter_map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => Some((key.to_string(), value.to_string())),
                _ => {
                    warn!("Ignoring malformed environment entry {entry:?}");
                    None
                }
            })
            .collect();

        Self {
            device_nodes: nodes.into_values().cloned().collect(),
            mounts: manifest.container_edits.mounts.clone(),
            envs,
        }
    }
}
