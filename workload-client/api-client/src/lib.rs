// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::default_trait_access,
    clippy::let_unit_value,
    clippy::missing_errors_doc,
    clippy::similar_names,
    clippy::too_many_lines
)]

pub mod convert;
pub mod error;
pub mod watcher;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use core_objects::SpiffeId;
use endpoint::{BackoffPolicy, SocketAddress};
use error::{classify_status, Error};
use log::{debug, info, warn};
#[cfg(feature = "tests")]
use mockall::automock;
use svid::JwtSvid;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio::time::sleep;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use trust_bundle::{JwtBundleSet, X509BundleSet};
use workload_api::spiffe_workload_api_client::SpiffeWorkloadApiClient;
use workload_api::{
    JwtBundlesRequest, JwtsvidRequest, ValidateJwtsvidRequest, X509BundlesRequest,
    X509svidRequest,
};

pub use convert::X509Context;
pub use watcher::{JwtBundlesWatcher, X509BundlesWatcher, X509ContextWatcher};

/// Required on every Workload API call; the server rejects calls without it.
const SECURITY_HEADER: &str = "workload.spiffe.io";

type SecurityHeaderInterceptor =
    fn(tonic::Request<()>) -> Result<tonic::Request<()>, tonic::Status>;
type GrpcClient = SpiffeWorkloadApiClient<InterceptedService<Channel, SecurityHeaderInterceptor>>;

fn security_header(
    mut request: tonic::Request<()>,
) -> Result<tonic::Request<()>, tonic::Status> {
    request.metadata_mut().insert(
        SECURITY_HEADER,
        tonic::metadata::MetadataValue::from_static("true"),
    );

    Ok(request)
}

/// The Workload API seam the identity sources consume. Implemented by
/// `WorkloadApiClient`; mocked in source tests.
#[cfg_attr(feature = "tests", automock)]
#[async_trait]
pub trait WorkloadApi: Sync + Send {
    async fn fetch_x509_context(&self) -> Result<X509Context, Error>;

    async fn fetch_x509_bundles(&self) -> Result<X509BundleSet, Error>;

    async fn fetch_jwt_svid(
        &self,
        audiences: Vec<String>,
        subject: Option<SpiffeId>,
    ) -> Result<JwtSvid, Error>;

    async fn fetch_jwt_svids(
        &self,
        audiences: Vec<String>,
        subject: Option<SpiffeId>,
    ) -> Result<Vec<JwtSvid>, Error>;

    async fn fetch_jwt_bundles(&self) -> Result<JwtBundleSet, Error>;

    async fn validate_jwt_svid(&self, token: String, audience: String) -> Result<JwtSvid, Error>;

    async fn watch_x509_context(&self, watcher: Arc<dyn X509ContextWatcher>)
        -> Result<(), Error>;

    async fn watch_x509_bundles(&self, watcher: Arc<dyn X509BundlesWatcher>)
        -> Result<(), Error>;

    async fn watch_jwt_bundles(&self, watcher: Arc<dyn JwtBundlesWatcher>) -> Result<(), Error>;

    async fn close(&self);
}

pub struct WorkloadApiClientFactory {}

impl WorkloadApiClientFactory {
    /// Builds a client for the given endpoint URI, falling back to
    /// `SPIFFE_ENDPOINT_SOCKET` when none is given.
    pub async fn get(socket_path: Option<&str>) -> Result<Arc<dyn WorkloadApi>, Error> {
        let socket_path = match socket_path {
            Some(socket_path) => socket_path.to_string(),
            None => endpoint::default_socket_path()?,
        };

        let client = WorkloadApiClient::connect(&socket_path).await?;
        Ok(Arc::new(client))
    }
}

/// Streaming client for the SPIFFE Workload API. One-shot fetches read the
/// first streamed response; watches keep a server stream open and retry
/// with exponential backoff until `close` or a terminal error.
pub struct WorkloadApiClient {
    grpc: GrpcClient,
    backoff: BackoffPolicy,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    closed: AtomicBool,
}

impl WorkloadApiClient {
    pub async fn connect(socket_path: &str) -> Result<Self, Error> {
        WorkloadApiClient::connect_with_backoff(socket_path, BackoffPolicy::default()).await
    }

    pub async fn connect_with_backoff(
        socket_path: &str,
        backoff: BackoffPolicy,
    ) -> Result<Self, Error> {
        let address = endpoint::parse_socket_path(socket_path)?;

        let channel = match address {
            SocketAddress::Unix(socket) => {
                // The endpoint URI is a placeholder; the connector dials the
                // Unix socket instead.
                Endpoint::try_from("http://[::]:50051")
                    .map_err(Error::InvalidUri)?
                    .connect_with_connector(service_fn(move |_: Uri| {
                        UnixStream::connect(socket.clone())
                    }))
                    .await
                    .map_err(Error::Connect)?
            }
            SocketAddress::Tcp(ip, port) => {
                Endpoint::try_from(format!("http://{}", SocketAddr::new(ip, port)))
                    .map_err(Error::InvalidUri)?
                    .connect()
                    .await
                    .map_err(Error::Connect)?
            }
        };

        let grpc = SpiffeWorkloadApiClient::with_interceptor(
            channel,
            security_header as SecurityHeaderInterceptor,
        );

        let (shutdown, shutdown_rx) = watch::channel(false);

        info!("Connected to the workload API at {socket_path}");

        Ok(WorkloadApiClient {
            grpc,
            backoff,
            shutdown,
            shutdown_rx,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WorkloadApi for WorkloadApiClient {
    async fn fetch_x509_context(&self) -> Result<X509Context, Error> {
        self.ensure_open()?;
        let mut grpc = self.grpc.clone();

        let mut stream = grpc
            .fetch_x509svid(X509svidRequest::default())
            .await
            .map_err(classify_status)?
            .into_inner();

        let response = stream
            .message()
            .await
            .map_err(classify_status)?
            .ok_or(Error::EmptyResponse)?;

        convert::x509_context_from_response(response)
    }

    async fn fetch_x509_bundles(&self) -> Result<X509BundleSet, Error> {
        self.ensure_open()?;
        let mut grpc = self.grpc.clone();

        let mut stream = grpc
            .fetch_x509_bundles(X509BundlesRequest::default())
            .await
            .map_err(classify_status)?
            .into_inner();

        let response = stream
            .message()
            .await
            .map_err(classify_status)?
            .ok_or(Error::EmptyResponse)?;

        convert::x509_bundles_from_response(response)
    }

    async fn fetch_jwt_svid(
        &self,
        audiences: Vec<String>,
        subject: Option<SpiffeId>,
    ) -> Result<JwtSvid, Error> {
        let mut svids = self.fetch_jwt_svids(audiences, subject).await?;

        if svids.is_empty() {
            Err(Error::EmptyResponse)
        } else {
            Ok(svids.remove(0))
        }
    }

    async fn fetch_jwt_svids(
        &self,
        audiences: Vec<String>,
        subject: Option<SpiffeId>,
    ) -> Result<Vec<JwtSvid>, Error> {
        self.ensure_open()?;
        let mut grpc = self.grpc.clone();

        let request = JwtsvidRequest {
            audience: audiences.clone(),
            spiffe_id: subject.map(|id| id.to_string()).unwrap_or_default(),
        };

        let response = grpc
            .fetch_jwtsvid(request)
            .await
            .map_err(classify_status)?
            .into_inner();

        if response.svids.is_empty() {
            return Err(Error::EmptyResponse);
        }

        response
            .svids
            .iter()
            .map(|message| convert::jwt_svid_from_message(message, &audiences))
            .collect()
    }

    async fn fetch_jwt_bundles(&self) -> Result<JwtBundleSet, Error> {
        self.ensure_open()?;
        let mut grpc = self.grpc.clone();

        let mut stream = grpc
            .fetch_jwt_bundles(JwtBundlesRequest::default())
            .await
            .map_err(classify_status)?
            .into_inner();

        let response = stream
            .message()
            .await
            .map_err(classify_status)?
            .ok_or(Error::EmptyResponse)?;

        convert::jwt_bundles_from_response(response)
    }

    /// Asks the server to validate the token, then re-parses it locally.
    /// Both checks must pass.
    async fn validate_jwt_svid(&self, token: String, audience: String) -> Result<JwtSvid, Error> {
        self.ensure_open()?;
        let mut grpc = self.grpc.clone();

        let request = ValidateJwtsvidRequest {
            audience: audience.clone(),
            svid: token.clone(),
        };
        grpc.validate_jwtsvid(request)
            .await
            .map_err(classify_status)?;

        let svid = JwtSvid::parse_insecure(&token, &[audience.as_str()])?;
        Ok(svid)
    }

    async fn watch_x509_context(
        &self,
        watcher: Arc<dyn X509ContextWatcher>,
    ) -> Result<(), Error> {
        self.ensure_open()?;
        let mut grpc = self.grpc.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let mut backoff = self.backoff.clone();

        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                match run_x509_context_stream(&mut grpc, &watcher, &mut backoff, &mut shutdown)
                    .await
                {
                    StreamOutcome::Shutdown => break,
                    StreamOutcome::Terminal(error) => {
                        watcher.on_error(error).await;
                        break;
                    }
                    StreamOutcome::Retry(error) => {
                        let delay = backoff.next_delay();
                        if backoff.did_exceed_max_attempts() {
                            watcher.on_error(error).await;
                            break;
                        }
                        warn!("X.509 context stream failed: {error}, retrying in {delay:?}");
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = shutdown.changed() => break,
                        }
                    }
                }
            }
            debug!("X.509 context watch ended");
        });

        Ok(())
    }

    async fn watch_x509_bundles(
        &self,
        watcher: Arc<dyn X509BundlesWatcher>,
    ) -> Result<(), Error> {
        self.ensure_open()?;
        let mut grpc = self.grpc.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let mut backoff = self.backoff.clone();

        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                match run_x509_bundles_stream(&mut grpc, &watcher, &mut backoff, &mut shutdown)
                    .await
                {
                    StreamOutcome::Shutdown => break,
                    StreamOutcome::Terminal(error) => {
                        watcher.on_error(error).await;
                        break;
                    }
                    StreamOutcome::Retry(error) => {
                        let delay = backoff.next_delay();
                        if backoff.did_exceed_max_attempts() {
                            watcher.on_error(error).await;
                            break;
                        }
                        warn!("X.509 bundles stream failed: {error}, retrying in {delay:?}");
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = shutdown.changed() => break,
                        }
                    }
                }
            }
            debug!("X.509 bundles watch ended");
        });

        Ok(())
    }

    async fn watch_jwt_bundles(&self, watcher: Arc<dyn JwtBundlesWatcher>) -> Result<(), Error> {
        self.ensure_open()?;
        let mut grpc = self.grpc.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let mut backoff = self.backoff.clone();

        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                match run_jwt_bundles_stream(&mut grpc, &watcher, &mut backoff, &mut shutdown)
                    .await
                {
                    StreamOutcome::Shutdown => break,
                    StreamOutcome::Terminal(error) => {
                        watcher.on_error(error).await;
                        break;
                    }
                    StreamOutcome::Retry(error) => {
                        let delay = backoff.next_delay();
                        if backoff.did_exceed_max_attempts() {
                            watcher.on_error(error).await;
                            break;
                        }
                        warn!("JWT bundles stream failed: {error}, retrying in {delay:?}");
                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = shutdown.changed() => break,
                        }
                    }
                }
            }
            debug!("JWT bundles watch ended");
        });

        Ok(())
    }

    /// Idempotent; cancels every watch stream. Operations after close
    /// fail with `Closed`.
    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown.send(true);
            info!("Workload API client closed");
        }
    }
}

enum StreamOutcome {
    Shutdown,
    Terminal(Error),
    Retry(Error),
}

/// Runs a watcher callback in its own task so a panicking callback is
/// contained and logged instead of tearing down the stream loop.
async fn deliver<F>(callback: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Err(error) = tokio::spawn(callback).await {
        warn!("Watcher callback failed: {error}");
    }
}

fn classify_stream_error(status: tonic::Status) -> StreamOutcome {
    let error = classify_status(status);
    if error.is_terminal() {
        StreamOutcome::Terminal(error)
    } else {
        StreamOutcome::Retry(error)
    }
}

async fn run_x509_context_stream(
    grpc: &mut GrpcClient,
    watcher: &Arc<dyn X509ContextWatcher>,
    backoff: &mut BackoffPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamOutcome {
    let mut stream = match grpc.fetch_x509svid(X509svidRequest::default()).await {
        Ok(response) => response.into_inner(),
        Err(status) => return classify_stream_error(status),
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => return StreamOutcome::Shutdown,
            message = stream.message() => match message {
                Ok(Some(response)) => match convert::x509_context_from_response(response) {
                    Ok(context) => {
                        backoff.reset();
                        let watcher = watcher.clone();
                        deliver(async move { watcher.on_update(context).await }).await;
                    }
                    Err(error) => {
                        warn!("Rejected X.509 context update: {error}");
                        let watcher = watcher.clone();
                        deliver(async move { watcher.on_error(error).await }).await;
                    }
                },
                Ok(None) => return StreamOutcome::Retry(Error::EmptyResponse),
                Err(status) => return classify_stream_error(status),
            }
        }
    }
}

async fn run_x509_bundles_stream(
    grpc: &mut GrpcClient,
    watcher: &Arc<dyn X509BundlesWatcher>,
    backoff: &mut BackoffPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamOutcome {
    let mut stream = match grpc.fetch_x509_bundles(X509BundlesRequest::default()).await {
        Ok(response) => response.into_inner(),
        Err(status) => return classify_stream_error(status),
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => return StreamOutcome::Shutdown,
            message = stream.message() => match message {
                Ok(Some(response)) => match convert::x509_bundles_from_response(response) {
                    Ok(bundles) => {
                        backoff.reset();
                        let watcher = watcher.clone();
                        deliver(async move { watcher.on_update(bundles).await }).await;
                    }
                    Err(error) => {
                        warn!("Rejected X.509 bundles update: {error}");
                        let watcher = watcher.clone();
                        deliver(async move { watcher.on_error(error).await }).await;
                    }
                },
                Ok(None) => return StreamOutcome::Retry(Error::EmptyResponse),
                Err(status) => return classify_stream_error(status),
            }
        }
    }
}

async fn run_jwt_bundles_stream(
    grpc: &mut GrpcClient,
    watcher: &Arc<dyn JwtBundlesWatcher>,
    backoff: &mut BackoffPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamOutcome {
    let mut stream = match grpc.fetch_jwt_bundles(JwtBundlesRequest::default()).await {
        Ok(response) => response.into_inner(),
        Err(status) => return classify_stream_error(status),
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => return StreamOutcome::Shutdown,
            message = stream.message() => match message {
                Ok(Some(response)) => match convert::jwt_bundles_from_response(response) {
                    Ok(bundles) => {
                        backoff.reset();
                        let watcher = watcher.clone();
                        deliver(async move { watcher.on_update(bundles).await }).await;
                    }
                    Err(error) => {
                        warn!("Rejected JWT bundles update: {error}");
                        let watcher = watcher.clone();
                        deliver(async move { watcher.on_error(error).await }).await;
                    }
                },
                Ok(None) => return StreamOutcome::Retry(Error::EmptyResponse),
                Err(status) => return classify_stream_error(status),
            }
        }
    }
}
