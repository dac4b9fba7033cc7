use std::sync::Arc;

use tracing::debug;

use crate::config::host::RESOURCE_NAMESPACE;
use crate::config::HostConfig;

/// Resource offered for the NICs, advertised as `beta.hpe.com/cxi`.
pub const RESOURCE_CXI: &str = "cxi";

/// Decides which resources of the namespace this node offers.
#[derive(Debug, Clone)]
pub struct ResourceLister {
    host: Arc<HostConfig>,
}

impl ResourceLister {
    pub fn new(host: Arc<HostConfig>) -> Self {
        Self { host }
    }

    pub fn resource_namespace(&self) -> &'static str {
        RESOURCE_NAMESPACE
    }

    /// Resources present on this node. The topology namespace is checked
    /// once; devices appearing later need a plugin restart.
    pub fn discover(&self) -> Vec<String> {
        let topology = self.host.topology_path();
        if topology.exists() {
            vec![RESOURCE_CXI.to_string()]
        } else {
            debug!("{} does not exist, offering no resources", topology.display());
            Vec::new()
        }
    }

    /// Fully qualified resource name, e.g. `beta.hpe.com/cxi`.
    pub fn resource_name(&self, resource: &str) -> String {
        format!("{}/{resource}", self.resource_namespace())
    }

    /// Socket file name the plugin serves on, e.g. `beta.hpe.com_cxi.sock`.
    pub fn endpoint(&self, resource: &str) -> String {
        format!("{}_{resource}.sock", self.resource_namespace())
    }
}
