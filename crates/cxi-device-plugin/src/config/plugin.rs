use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
pub struct DevicePluginArgs {
    #[arg(
        long,
        env = "CXI_PULSE",
        default_value_t = 0,
        help = "Seconds between device health checks, 0 disables health polling"
    )]
    pub pulse: u64,

    #[arg(
        long,
        env = "CXI_MANIFEST",
        value_hint = clap::ValueHint::FilePath,
        help = "Serve allocations from this CDI manifest instead of live discovery, e.g. /etc/cdi/hpe.com-cxi.yaml"
    )]
    pub manifest: Option<PathBuf>,

    #[arg(
        long,
        env = "DEVICE_PLUGIN_DIR",
        default_value = "/var/lib/kubelet/device-plugins",
        value_hint = clap::ValueHint::DirPath,
        help = "Directory holding the kubelet socket and the plugin sockets"
    )]
    pub device_plugin_dir: PathBuf,

    #[arg(
        long,
        env = "KUBELET_SOCKET",
        default_value = "/var/lib/kubelet/device-plugins/kubelet.sock",
        value_hint = clap::ValueHint::FilePath,
        help = "Kubelet registration socket"
    )]
    pub kubelet_socket: PathBuf,

    #[arg(
        long,
        env = "CXI_LOG_PATH",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this file, rotated daily"
    )]
    pub log_path: Option<PathBuf>,
}

impl DevicePluginArgs {
    /// Heartbeat period, `None` when health polling is disabled.
    pub fn heartbeat(&self) -> Option<Duration> {
        (self.pulse > 0).then(|| Duration::from_secs(self.pulse))
    }
}
