use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use device_plugin_pb::api::device_plugin_server::DevicePlugin;
use device_plugin_pb::api::device_plugin_server::DevicePluginServer;
use device_plugin_pb::api::registration_client::RegistrationClient;
use device_plugin_pb::api::AllocateRequest;
use device_plugin_pb::api::AllocateResponse;
use device_plugin_pb::api::DevicePluginOptions;
use device_plugin_pb::api::Empty;
use device_plugin_pb::api::ListAndWatchResponse;
use device_plugin_pb::api::PreStartContainerRequest;
use device_plugin_pb::api::PreStartContainerResponse;
use device_plugin_pb::api::PreferredAllocationRequest;
use device_plugin_pb::api::PreferredAllocationResponse;
use device_plugin_pb::api::RegisterRequest;
use device_plugin_pb::API_VERSION;
use futures::Stream;
use hyper_util::rt::TokioIo;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::transport::Uri;
use tonic::Request;
use tonic::Response;
use tonic::Result as TonicResult;
use tonic::Status;
use tower::service_fn;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::ResourceSession;

/// Buffered advertise messages before the session waits for the kubelet.
const ADVERTISE_BUFFER: usize = 4;

/// Kubelet device plugin serving one resource from a [`ResourceSession`].
#[derive(Debug)]
pub struct CxiDevicePlugin {
    /// socket file name inside the device plugin directory
    endpoint: String,
    /// resource name (e.g. "beta.hpe.com/cxi")
    resource_name: String,
    session: Arc<ResourceSession>,
}

impl CxiDevicePlugin {
    pub fn new(
        endpoint: String,
        resource_name: String,
        session: Arc<ResourceSession>,
    ) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            resource_name,
            session,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// start device plugin server
    pub async fn start(
        self: &Arc<Self>,
        socket_path: &Path,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<()> {
        info!("start device plugin server: {}", socket_path.display());

        // clean up old socket file if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;
        let device_plugin_server = DevicePluginServer::new(DevicePluginService::new(self.clone()));

        info!("gRPC server is bound to: {}", socket_path.display());

        tokio::spawn(async move {
            let result = tonic::transport::Server::builder()
                .add_service(device_plugin_server)
                .serve_with_incoming_shutdown(
                    tokio_stream::wrappers::UnixListenerStream::new(listener),
                    async move {
                        cancellation_token.cancelled().await;
                        info!("shutting down gRPC server");
                    },
                )
                .await;
            if let Err(e) = result {
                error!("device plugin server failed: {e}");
            }
        });

        Ok(())
    }

    /// register device plugin with kubelet
    pub async fn register_with_kubelet(&self, kubelet_socket: &Path) -> anyhow::Result<()> {
        info!(
            "registering device plugin with kubelet: {}",
            kubelet_socket.display()
        );

        let channel = create_uds_channel(kubelet_socket).await?;
        let mut client = RegistrationClient::new(channel);

        let request = RegisterRequest {
            version: API_VERSION.to_string(),
            endpoint: self.endpoint.clone(),
            resource_name: self.resource_name.clone(),
            options: Some(DevicePluginOptions::default()),
        };

        match client.register(Request::new(request)).await {
            Ok(_) => {
                info!(
                    "successfully registered {} with kubelet",
                    self.resource_name
                );
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("registration failed: {e}")),
        }
    }
}

/// create Unix Domain Socket client connection
pub async fn create_uds_channel(socket_path: &Path) -> anyhow::Result<Channel> {
    let socket_path = socket_path.to_path_buf();

    // The HTTP URL is a placeholder since we're using Unix socket connector
    let channel = Endpoint::from_static("http://tonic")
        .connect_with_connector(service_fn(move |_: Uri| {
            let socket_path = socket_path.clone();
            async move {
                match UnixStream::connect(socket_path).await {
                    Ok(stream) => Ok(TokioIo::new(stream)),
                    Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
                }
            }
        }))
        .await?;

    Ok(channel)
}

/// gRPC face of a [`CxiDevicePlugin`].
#[derive(Debug)]
pub struct DevicePluginService {
    device_plugin: Arc<CxiDevicePlugin>,
}

impl DevicePluginService {
    pub fn new(device_plugin: Arc<CxiDevicePlugin>) -> Self {
        Self { device_plugin }
    }
}

#[tonic::async_trait]
impl DevicePlugin for DevicePluginService {
    async fn get_device_plugin_options(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<DevicePluginOptions>> {
        debug!("getting device plugin options");
        Ok(Response::new(DevicePluginOptions::default()))
    }

    type ListAndWatchStream =
        Pin<Box<dyn Stream<Item = Result<ListAndWatchResponse, Status>> + Send>>;

    async fn list_and_watch(
        &self,
        _request: Request<Empty>,
    ) -> TonicResult<Response<Self::ListAndWatchStream>> {
        info!("starting to watch device list");

        let (tx, rx) = mpsc::channel(ADVERTISE_BUFFER);
        let session = self.device_plugin.session.clone();

        tokio::spawn(async move {
            if let Err(e) = session.advertise(tx.clone()).await {
                error!("advertising devices failed: {e:?}");
                let _ = tx.send(Err(Status::internal(e.to_string()))).await;
            }
            info!("device watch task stopped");
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream)))
    }

    async fn get_preferred_allocation(
        &self,
        request: Request<PreferredAllocationRequest>,
    ) -> TonicResult<Response<PreferredAllocationResponse>> {
        debug!("getting preferred device allocation: {:?}", request.into_inner());
        Ok(Response::new(PreferredAllocationResponse {
            container_responses: vec![],
        }))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> TonicResult<Response<AllocateResponse>> {
        let req = request.into_inner();
        info!("allocating devices: {:?}", req);

        match self.device_plugin.session.allocate(req).await {
            Ok(response) => {
                info!(
                    "device allocation completed for {} containers",
                    response.container_responses.len()
                );
                Ok(Response::new(response))
            }
            Err(e) => {
                error!("allocation failed: {e:?}");
                Err(Status::internal(e.to_string()))
            }
        }
    }

    async fn pre_start_container(
        &self,
        request: Request<PreStartContainerRequest>,
    ) -> TonicResult<Response<PreStartContainerResponse>> {
        debug!("pre-start container: {:?}", request.into_inner());
        Ok(Response::new(PreStartContainerResponse {}))
    }
}
