use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use utils::version;

use crate::app::spawn_heartbeat;
use crate::app::spawn_signal_listener;
use crate::config::DevicePluginArgs;
use crate::config::HostConfig;
use crate::hardware::Discovery;
use crate::logging;
use crate::plugin::CxiDevicePlugin;
use crate::plugin::ResourceLister;
use crate::plugin::ResourceSession;

pub async fn run_device_plugin(args: DevicePluginArgs) -> Result<()> {
    let _guard = logging::init(args.log_path.as_deref());
    info!("HPE Slingshot device plugin for Kubernetes {}", &**version::VERSION);

    let host = Arc::new(HostConfig::from_env());
    let token = CancellationToken::new();
    let signal_task = spawn_signal_listener(token.clone())?;

    let heartbeat = args.heartbeat().map(|pulse| spawn_heartbeat(pulse, token.clone()));
    let (heartbeat_rx, heartbeat_task) = match heartbeat {
        Some((rx, task)) => (Some(rx), Some(task)),
        None => {
            info!("Health polling disabled");
            (None, None)
        }
    };

    let lister = ResourceLister::new(host.clone());
    let resources = lister.discover();
    let Some(resource) = resources.first() else {
        warn!(
            "No {} resources on this node, waiting for termination",
            lister.resource_namespace()
        );
        token.cancelled().await;
        return Ok(());
    };

    let session = Arc::new(ResourceSession::new(
        Discovery::new(host),
        args.manifest.clone(),
        heartbeat_rx,
        token.clone(),
    ));
    session
        .start()
        .map_err(|e| anyhow::anyhow!("failed to start resource session: {e:?}"))?;

    let plugin = CxiDevicePlugin::new(
        lister.endpoint(resource),
        lister.resource_name(resource),
        session.clone(),
    );
    let socket_path = args.device_plugin_dir.join(plugin.endpoint());
    plugin.start(&socket_path, token.clone()).await?;
    if let Err(e) = plugin.register_with_kubelet(&args.kubelet_socket).await {
        token.cancel();
        return Err(e);
    }

    token.cancelled().await;
    info!("Shutting down device plugin");

    signal_task.abort();
    if let Some(task) = heartbeat_task {
        if let Err(e) = task.await {
            warn!("Heartbeat task failed during shutdown: {e}");
        }
    }
    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!("Failed to remove socket {}: {e}", socket_path.display());
    }

    if session.failed() {
        anyhow::bail!("device plugin stopped after a fatal session error");
    }
    Ok(())
}
