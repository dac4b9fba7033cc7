//! Minimum CDI version a manifest needs.
//!
//! Consumers reject manifests declaring a version newer than they support,
//! so a manifest always declares the oldest version that can express it.

use super::ContainerEdits;
use super::Manifest;

pub const V030: &str = "0.3.0";
pub const V040: &str = "0.4.0";
pub const V050: &str = "0.5.0";
pub const V060: &str = "0.6.0";

pub fn minimum_required_version(manifest: &Manifest) -> &'static str {
    if requires_v060(manifest) {
        V060
    } else if requires_v050(manifest) {
        V050
    } else if requires_v040(manifest) {
        V040
    } else {
        V030
    }
}

/// Annotations anywhere, or a dotted class name.
fn requires_v060(manifest: &Manifest) -> bool {
    if !manifest.annotations.is_empty()
        || manifest.devices.iter().any(|d| !d.annotations.is_empty())
    {
        return true;
    }
    manifest
        .vendor_class()
        .is_some_and(|(_, class)| class.contains('.'))
}

/// Device names starting with a digit, or device nodes with a host path.
fn requires_v050(manifest: &Manifest) -> bool {
    let numeric_name = manifest
        .devices
        .iter()
        .any(|d| d.name.starts_with(|c: char| c.is_ascii_digit()));

    numeric_name
        || all_edits(manifest).any(|edits| edits.device_nodes.iter().any(|n| n.host_path.is_some()))
}

/// Mounts with an explicit type.
fn requires_v040(manifest: &Manifest) -> bool {
    all_edits(manifest).any(|edits| edits.mounts.iter().any(|m| m.mount_type.is_some()))
}

fn all_edits(manifest: &Manifest) -> impl Iterator<Item = &ContainerEdits> {
    std::iter::once(&manifest.container_edits)
        .chain(manifest.devices.iter().map(|d| &d.container_edits))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::manifest::DeviceNode;
    use crate::manifest::ManifestDevice;
    use crate::manifest::Mount;

    fn named_device(name: &str) -> ManifestDevice {
        ManifestDevice {
            name: name.to_string(),
            container_edits: ContainerEdits {
                device_nodes: vec![DeviceNode {
                    path: "/dev/cxi0".to_string(),
                    ..DeviceNode::default()
                }],
                ..ContainerEdits::default()
            },
            ..ManifestDevice::default()
        }
    }

    fn base() -> Manifest {
        Manifest {
            kind: "hpe.com/cxi".to_string(),
            devices: vec![named_device("nic")],
            ..Manifest::default()
        }
    }

    #[test]
    fn plain_manifest_is_v030() {
        assert_eq!(minimum_required_version(&base()), V030);
    }

    #[test]
    fn typed_mount_is_v040() {
        let mut manifest = base();
        manifest.container_edits.mounts.push(Mount {
            host_path: "/usr/lib64/libcxi.so".to_string(),
            container_path: "/usr/lib64/libcxi.so".to_string(),
            options: vec![],
            mount_type: Some("l".to_string()),
        });
        assert_eq!(minimum_required_version(&manifest), V040);
    }

    #[test]
    fn numeric_names_and_host_paths_are_v050() {
        let mut manifest = base();
        manifest.devices.push(named_device("0"));
        assert_eq!(minimum_required_version(&manifest), V050);

        let mut manifest = base();
        manifest.container_edits.device_nodes.push(DeviceNode {
            path: "/dev/xpmem".to_string(),
            host_path: Some("/dev/xpmem".to_string()),
            node_type: Some("c".to_string()),
        });
        assert_eq!(minimum_required_version(&manifest), V050);
    }

    #[test]
    fn annotations_and_dotted_class_are_v060() {
        let mut manifest = base();
        manifest.devices[0].annotations =
            BTreeMap::from([("owner".to_string(), "hpe".to_string())]);
        assert_eq!(minimum_required_version(&manifest), V060);

        let mut manifest = base();
        manifest.kind = "hpe.com/cxi.v2".to_string();
        assert_eq!(minimum_required_version(&manifest), V060);
    }
}
