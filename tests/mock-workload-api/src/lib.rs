// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::default_trait_access,
    clippy::let_unit_value,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::similar_names,
    clippy::too_many_lines
)]

pub mod fixtures;

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tempdir::TempDir;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::{UnboundedReceiverStream, UnixListenerStream};
use tokio_stream::StreamExt;
use tonic::transport::server::Connected;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use workload_api::spiffe_workload_api_server::{SpiffeWorkloadApi, SpiffeWorkloadApiServer};
use workload_api::{
    JwtBundlesRequest, JwtBundlesResponse, JwtsvidRequest, JwtsvidResponse,
    ValidateJwtsvidRequest, ValidateJwtsvidResponse, X509BundlesRequest, X509BundlesResponse,
    X509svidRequest, X509svidResponse,
};

type ResponseStream<T> = UnboundedReceiverStream<Result<T, Status>>;

/// Scripted in-process Workload API. Streaming RPCs emit their scripted
/// responses and then stay open (so a fake with no scripted responses
/// never emits, which is what bootstrap-timeout tests need), unless
/// `hold_streams_open` is cleared, in which case they end after the
/// scripted responses and exercise the client's reconnect path.
pub struct FakeWorkloadApi {
    pub x509_responses: Vec<X509svidResponse>,
    pub x509_status: Option<Status>,
    pub x509_calls: Arc<AtomicUsize>,
    pub x509_bundles_responses: Vec<X509BundlesResponse>,
    pub jwt_bundles_responses: Vec<JwtBundlesResponse>,
    pub jwt_svid_response: Option<JwtsvidResponse>,
    pub validate_status: Option<Status>,
    pub validate_response: ValidateJwtsvidResponse,
    pub hold_streams_open: bool,
    pub require_header: bool,
    pub x509_senders: Mutex<Vec<mpsc::UnboundedSender<Result<X509svidResponse, Status>>>>,
    pub x509_bundles_senders: Mutex<Vec<mpsc::UnboundedSender<Result<X509BundlesResponse, Status>>>>,
    pub jwt_bundles_senders: Mutex<Vec<mpsc::UnboundedSender<Result<JwtBundlesResponse, Status>>>>,
}

impl Default for FakeWorkloadApi {
    fn default() -> Self {
        FakeWorkloadApi {
            x509_responses: Vec::new(),
            x509_status: None,
            x509_calls: Arc::new(AtomicUsize::new(0)),
            x509_bundles_responses: Vec::new(),
            jwt_bundles_responses: Vec::new(),
            jwt_svid_response: None,
            validate_status: None,
            validate_response: ValidateJwtsvidResponse::default(),
            hold_streams_open: true,
            require_header: true,
            x509_senders: Mutex::new(Vec::new()),
            x509_bundles_senders: Mutex::new(Vec::new()),
            jwt_bundles_senders: Mutex::new(Vec::new()),
        }
    }
}

impl FakeWorkloadApi {
    fn check_header<T>(&self, request: &Request<T>) -> Result<(), Status> {
        if !self.require_header {
            return Ok(());
        }

        let present = request
            .metadata()
            .get("workload.spiffe.io")
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| value == "true");

        if present {
            Ok(())
        } else {
            Err(Status::invalid_argument(
                "security header missing from request",
            ))
        }
    }

    fn scripted_stream<T: Clone>(
        &self,
        responses: &[T],
        senders: &Mutex<Vec<mpsc::UnboundedSender<Result<T, Status>>>>,
    ) -> ResponseStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        for response in responses {
            let _ = tx.send(Ok(response.clone()));
        }

        if self.hold_streams_open {
            senders.lock().unwrap().push(tx);
        }

        UnboundedReceiverStream::new(rx)
    }
}

#[tonic::async_trait]
impl SpiffeWorkloadApi for FakeWorkloadApi {
    type FetchX509SVIDStream = ResponseStream<X509svidResponse>;
    type FetchX509BundlesStream = ResponseStream<X509BundlesResponse>;
    type FetchJWTBundlesStream = ResponseStream<JwtBundlesResponse>;

    async fn fetch_x509svid(
        &self,
        request: Request<X509svidRequest>,
    ) -> Result<Response<Self::FetchX509SVIDStream>, Status> {
        self.check_header(&request)?;
        self.x509_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(status) = &self.x509_status {
            return Err(Status::new(status.code(), status.message()));
        }

        Ok(Response::new(
            self.scripted_stream(&self.x509_responses, &self.x509_senders),
        ))
    }

    async fn fetch_x509_bundles(
        &self,
        request: Request<X509BundlesRequest>,
    ) -> Result<Response<Self::FetchX509BundlesStream>, Status> {
        self.check_header(&request)?;

        Ok(Response::new(self.scripted_stream(
            &self.x509_bundles_responses,
            &self.x509_bundles_senders,
        )))
    }

    async fn fetch_jwtsvid(
        &self,
        request: Request<JwtsvidRequest>,
    ) -> Result<Response<JwtsvidResponse>, Status> {
        self.check_header(&request)?;

        Ok(Response::new(
            self.jwt_svid_response.clone().unwrap_or_default(),
        ))
    }

    async fn fetch_jwt_bundles(
        &self,
        request: Request<JwtBundlesRequest>,
    ) -> Result<Response<Self::FetchJWTBundlesStream>, Status> {
        self.check_header(&request)?;

        Ok(Response::new(self.scripted_stream(
            &self.jwt_bundles_responses,
            &self.jwt_bundles_senders,
        )))
    }

    async fn validate_jwtsvid(
        &self,
        request: Request<ValidateJwtsvidRequest>,
    ) -> Result<Response<ValidateJwtsvidResponse>, Status> {
        self.check_header(&request)?;

        if let Some(status) = &self.validate_status {
            return Err(Status::new(status.code(), status.message()));
        }

        Ok(Response::new(self.validate_response.clone()))
    }
}

/// A running fake server on a Unix socket in a fresh tempdir. The server
/// shuts down when the handle drops.
pub struct ServerHandle {
    pub socket_uri: String,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: TempDir,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Wraps a Unix socket connection so it satisfies tonic's `Connected` bound,
/// which tonic only implements for TCP streams out of the box.
struct UdsConnection(UnixStream);

impl Connected for UdsConnection {
    type ConnectInfo = ();

    fn connect_info(&self) -> Self::ConnectInfo {}
}

impl AsyncRead for UdsConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for UdsConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

pub async fn serve(api: FakeWorkloadApi) -> ServerHandle {
    let dir = TempDir::new("workload-api").unwrap();
    let socket_path = dir.path().join("workload_api.sock");

    let listener = UnixListener::bind(&socket_path).unwrap();
    let incoming = UnixListenerStream::new(listener).map(|res| res.map(UdsConnection));

    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = Server::builder()
            .add_service(SpiffeWorkloadApiServer::new(api))
            .serve_with_incoming_shutdown(incoming, async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    ServerHandle {
        socket_uri: format!("unix://{}", socket_path.display()),
        shutdown: Some(shutdown),
        _dir: dir,
    }
}
