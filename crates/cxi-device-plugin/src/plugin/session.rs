//! Advertise/allocate state machine behind one kubelet resource.
//!
//! A session moves `Created -> Started -> Advertising -> Terminated`. The
//! virtual device map is rebuilt when advertising starts and replaced as a
//! whole, so allocations always see one consistent snapshot.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::OnceLock;

use device_plugin_pb::api::AllocateRequest;
use device_plugin_pb::api::AllocateResponse;
use device_plugin_pb::api::Device;
use device_plugin_pb::api::ListAndWatchResponse;
use device_plugin_pb::api::NumaNode;
use device_plugin_pb::api::TopologyInfo;
use device_plugin_pb::HEALTHY;
use device_plugin_pb::UNHEALTHY;
use error_stack::Report;
use error_stack::ResultExt;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::AllocationSource;
use super::PluginError;
use crate::hardware::DeviceSet;
use crate::hardware::Discovery;
use crate::manifest::ManifestEdits;
use crate::virtualization::VirtualDeviceMap;

pub type AdvertiseSender = mpsc::Sender<Result<ListAndWatchResponse, Status>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Started,
    Advertising,
    Terminated,
}

#[derive(Debug)]
pub struct ResourceSession {
    discovery: Discovery,
    manifest: Option<PathBuf>,
    state: watch::Sender<SessionState>,
    source: OnceLock<Arc<AllocationSource>>,
    map: watch::Sender<Arc<VirtualDeviceMap>>,
    heartbeat: Mutex<Option<mpsc::Receiver<()>>>,
    shutdown: CancellationToken,
    failed: AtomicBool,
}

impl ResourceSession {
    /// `heartbeat` drives health checks, `None` disables them. Cancelling
    /// `shutdown` ends advertising.
    pub fn new(
        discovery: Discovery,
        manifest: Option<PathBuf>,
        heartbeat: Option<mpsc::Receiver<()>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            discovery,
            manifest,
            state: watch::Sender::new(SessionState::Created),
            source: OnceLock::new(),
            map: watch::Sender::new(Arc::new(VirtualDeviceMap::default())),
            heartbeat: Mutex::new(heartbeat),
            shutdown,
            failed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Snapshot of the map built by the latest advertise cycle.
    pub fn virtual_devices(&self) -> Arc<VirtualDeviceMap> {
        self.map.borrow().clone()
    }

    /// Whether the session hit an error that should take the process down.
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Picks the allocation source. With a manifest configured it is loaded
    /// here, and a load failure aborts the start.
    pub fn start(&self) -> Result<(), Report<PluginError>> {
        let state = self.state();
        if state != SessionState::Created {
            return Err(not_created(state));
        }

        let source = match &self.manifest {
            Some(path) => {
                info!("Serving allocations from manifest {}", path.display());
                let edits = ManifestEdits::load(path).change_context(PluginError::Manifest)?;
                AllocationSource::Manifest(edits)
            }
            None => {
                info!("Serving allocations from live discovery");
                AllocationSource::Live(self.discovery.clone())
            }
        };
        // a concurrent start that got here first owns the session
        if self.source.set(Arc::new(source)).is_err() {
            return Err(not_created(self.state()));
        }

        let started = self.state.send_if_modified(|state| {
            if *state == SessionState::Created {
                *state = SessionState::Started;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(not_created(self.state()));
        }
        Ok(())
    }

    /// Streams the device list until shutdown or until the receiver goes
    /// away. The full list is sent once up front and again after every
    /// heartbeat.
    ///
    /// The session always ends up `Terminated`. Losing the stream for any
    /// reason other than shutdown marks the session failed and cancels the
    /// shutdown token: the kubelet only comes back through a new
    /// registration, so the process has to restart.
    #[tracing::instrument(skip_all)]
    pub async fn advertise(&self, tx: AdvertiseSender) -> Result<(), Report<PluginError>> {
        match self.state() {
            SessionState::Started | SessionState::Advertising => {}
            state => {
                return Err(Report::new(PluginError::InvalidState {
                    state,
                    expected: SessionState::Started,
                }))
            }
        }
        // one advertise loop at a time owns the heartbeat
        let mut heartbeat = self.heartbeat.lock().await;
        self.state.send_replace(SessionState::Advertising);

        let result = self.stream_devices(&tx, heartbeat.as_mut()).await;
        self.state.send_replace(SessionState::Terminated);

        if !self.shutdown.is_cancelled() {
            match &result {
                Ok(()) => warn!("Advertise stream closed by kubelet"),
                Err(e) => error!("Advertising stopped: {e:?}"),
            }
            self.fail();
        }
        result
    }

    async fn stream_devices(
        &self,
        tx: &AdvertiseSender,
        mut heartbeat: Option<&mut mpsc::Receiver<()>>,
    ) -> Result<(), Report<PluginError>> {
        let discovery = self.discovery.clone();
        let devices = tokio::task::spawn_blocking(move || discovery.discover_devices())
            .await
            .change_context(PluginError::Task)?
            .change_context(PluginError::Discovery)?;
        info!("Found {} HPE Slingshot NICs", devices.len());

        let map = Arc::new(VirtualDeviceMap::expand(
            devices.values(),
            self.discovery.config().virtual_devices_per_physical,
        ));
        self.map.send_replace(map.clone());

        let numa_nodes = numa_nodes(&devices);
        let health: BTreeMap<u64, bool> = numa_nodes.keys().map(|index| (*index, true)).collect();
        send(tx, advertised_devices(&map, &health, &numa_nodes)).await?;

        let mut ticking = heartbeat.is_some();
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Received termination signal, stopping advertising");
                    return Ok(());
                }
                _ = tx.closed() => return Ok(()),
                tick = next_tick(heartbeat.as_deref_mut()), if ticking => {
                    if tick.is_none() {
                        debug!("Heartbeat stopped, health polling disabled");
                        ticking = false;
                        continue;
                    }
                    let health = self.check_health(numa_nodes.keys().copied()).await;
                    send(tx, advertised_devices(&map, &health, &numa_nodes)).await?;
                }
            }
        }
    }

    /// One response per container request, in request order.
    #[tracing::instrument(skip_all, fields(containers = request.container_requests.len()))]
    pub async fn allocate(
        &self,
        request: AllocateRequest,
    ) -> Result<AllocateResponse, Report<PluginError>> {
        let Some(source) = self.source.get().cloned() else {
            return Err(Report::new(PluginError::InvalidState {
                state: self.state(),
                expected: SessionState::Started,
            }));
        };
        let map = self.virtual_devices();

        let result = tokio::task::spawn_blocking(move || {
            request
                .container_requests
                .iter()
                .map(|container| {
                    info!("Allocating virtual devices {:?}", container.devices_ids);
                    source.container_response(&map, &container.devices_ids)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .change_context(PluginError::Task)?;

        match result {
            Ok(container_responses) => Ok(AllocateResponse {
                container_responses,
            }),
            Err(e) => {
                if matches!(e.current_context(), PluginError::Libraries) {
                    error!("Cannot serve allocations without the CXI libraries: {e:?}");
                    self.fail();
                }
                Err(e)
            }
        }
    }

    /// Probes each device node once, keyed by device index.
    async fn check_health(&self, indices: impl Iterator<Item = u64>) -> BTreeMap<u64, bool> {
        let devfs = &self.discovery.config().devfs_root;
        let mut health = BTreeMap::new();
        for index in indices {
            let path = devfs.join(format!("cxi{index}"));
            let healthy = match tokio::fs::File::open(&path).await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Error opening {}: {e}", path.display());
                    false
                }
            };
            info!(
                "[Health Check] cxi{index}: {}",
                if healthy { HEALTHY } else { UNHEALTHY }
            );
            health.insert(index, healthy);
        }
        health
    }

    /// Takes the whole process down.
    fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

fn not_created(state: SessionState) -> Report<PluginError> {
    Report::new(PluginError::InvalidState {
        state,
        expected: SessionState::Created,
    })
}

async fn next_tick(heartbeat: Option<&mut mpsc::Receiver<()>>) -> Option<()> {
    match heartbeat {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send(tx: &AdvertiseSender, devices: Vec<Device>) -> Result<(), Report<PluginError>> {
    tx.send(Ok(ListAndWatchResponse { devices }))
        .await
        .map_err(|_| Report::new(PluginError::StreamClosed))
}

fn numa_nodes(devices: &DeviceSet) -> BTreeMap<u64, Option<i64>> {
    devices
        .values()
        .map(|device| (device.device_index, device.numa_node_id()))
        .collect()
}

fn advertised_devices(
    map: &VirtualDeviceMap,
    health: &BTreeMap<u64, bool>,
    numa_nodes: &BTreeMap<u64, Option<i64>>,
) -> Vec<Device> {
    map.iter()
        .map(|(id, index)| {
            let healthy = health.get(&index).copied().unwrap_or(false);
            let topology = numa_nodes
                .get(&index)
                .copied()
                .flatten()
                .map(|node| TopologyInfo {
                    nodes: vec![NumaNode { id: node }],
                });
            Device {
                id,
                health: if healthy { HEALTHY } else { UNHEALTHY }.to_string(),
                topology,
            }
        })
        .collect()
}
