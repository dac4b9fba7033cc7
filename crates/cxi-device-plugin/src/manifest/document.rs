use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// A CDI manifest as stored on disk.
///
/// ```yaml
/// cdiVersion: 0.5.0
/// kind: hpe.com/cxi
/// devices:
///   - name: "0"
///     containerEdits:
///       deviceNodes:
///         - path: /dev/cxi0
///           hostPath: /dev/cxi0
///           type: c
/// containerEdits:
///   deviceNodes:
///     - path: /dev/xpmem
///       hostPath: /dev/xpmem
///       type: c
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(rename = "cdiVersion")]
    pub version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub devices: Vec<ManifestDevice>,
    #[serde(default, skip_serializing_if = "ContainerEdits::is_empty")]
    pub container_edits: ContainerEdits,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDevice {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub container_edits: ContainerEdits,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEdits {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_nodes: Vec<DeviceNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

impl ContainerEdits {
    pub fn is_empty(&self) -> bool {
        self.env.is_empty() && self.device_nodes.is_empty() && self.mounts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNode {
    /// path inside the container
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub host_path: String,
    pub container_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mount_type: Option<String>,
}

impl Manifest {
    /// `(vendor, class)` of a well-formed `vendor/class` kind.
    pub fn vendor_class(&self) -> Option<(&str, &str)> {
        parse_kind(&self.kind)
    }

    /// Storage key of the manifest, `vendor-class`.
    pub fn canonical_name(&self) -> Option<String> {
        let (vendor, class) = self.vendor_class()?;
        Some(format!("{vendor}-{class}"))
    }
}

/// Splits a kind such as `hpe.com/cxi`.
///
/// The vendor is a dotted domain, the class an alphanumeric name that may
/// also contain `-`, `_` and `.`. Both must start with a letter and end with
/// a letter or digit.
pub fn parse_kind(kind: &str) -> Option<(&str, &str)> {
    let (vendor, class) = kind.split_once('/')?;
    let valid_vendor = vendor
        .split('.')
        .all(|label| valid_name(label, &['-', '_']));
    let valid_class = valid_name(class, &['-', '_', '.']);
    (valid_vendor && valid_class).then_some((vendor, class))
}

fn valid_name(name: &str, extra: &[char]) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let last = name.chars().last().unwrap_or(first);
    first.is_ascii_alphabetic()
        && last.is_ascii_alphanumeric()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || extra.contains(&c))
}
