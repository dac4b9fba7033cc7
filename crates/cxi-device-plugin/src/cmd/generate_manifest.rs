use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use utils::version;

use crate::config::host::MANIFEST_KIND;
use crate::config::GenerateManifestArgs;
use crate::config::HostConfig;
use crate::hardware::discover_environment;
use crate::hardware::Discovery;
use crate::logging;
use crate::manifest::store::fix_permissions;
use crate::manifest::ManifestStore;
use crate::manifest::ManifestSynchronizer;
use crate::manifest::SyncOutcome;

pub async fn run_generate_manifest(args: GenerateManifestArgs) -> Result<()> {
    let _guard = logging::init(args.log_path.as_deref());
    info!("HPE Slingshot CDI generator {}", &**version::VERSION);

    let host = Arc::new(HostConfig::from_env());
    let outcome = tokio::task::spawn_blocking(move || generate(&args, host)).await??;
    match outcome {
        Some(SyncOutcome::Created(path)) => info!("Created manifest {}", path.display()),
        Some(SyncOutcome::Kept(paths)) => info!("Kept existing manifests {paths:?}"),
        Some(SyncOutcome::Replaced { written, removed }) => {
            info!("Replaced manifest {written:?}, removed {removed:?}")
        }
        None => {}
    }
    Ok(())
}

/// Discovers the hardware and, unless dry-running, syncs the manifest
/// directory and fixes permissions of every manifest of the kind.
pub fn generate(args: &GenerateManifestArgs, host: Arc<HostConfig>) -> Result<Option<SyncOutcome>> {
    let discovery = Discovery::new(host.clone());

    let devices = discovery
        .discover_devices()
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    for device in devices.values() {
        info!(
            "Discovered device: {}, PCI Address: {}",
            device.uid, device.pci_address
        );
    }

    let mounts = discovery
        .discover_mounts()
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    for mount in &mounts {
        info!("Discovered mount: {}, Path: {}", mount.name, mount.host_path.display());
    }

    let env = discover_environment(args.env_vars.as_deref()).map_err(|e| anyhow::anyhow!("{e:?}"))?;
    for entry in &env {
        info!("Discovered environment variable: {entry}");
    }

    if args.dry_run {
        info!("Dry run, not touching {}", args.manifest_dir.display());
        return Ok(None);
    }

    let synchronizer = ManifestSynchronizer::new(
        ManifestStore::new(&args.manifest_dir),
        host,
        args.reconcile,
    );
    let outcome = synchronizer
        .sync(&devices, &mounts, &env)
        .map_err(|e| {
            anyhow::anyhow!("unable to sync detected devices to the CDI registry: {e:?}")
        })?;

    for stored in synchronizer
        .store()
        .manifests_of_kind(MANIFEST_KIND)
        .map_err(|e| anyhow::anyhow!("{e:?}"))?
    {
        fix_permissions(&stored.path).map_err(|e| anyhow::anyhow!("{e:?}"))?;
    }

    Ok(Some(outcome))
}
