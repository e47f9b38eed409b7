// Copyright (c) Microsoft. All rights reserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use core_objects::{SpiffeId, TrustDomain};
use log::{debug, info, warn};
use svid::JwtSvid;
use tokio::sync::{mpsc, RwLock};
use trust_bundle::{JwtBundle, JwtBundleSet};
use workload_api_client::{JwtBundlesWatcher, WorkloadApi, WorkloadApiClientFactory};

use crate::error::Error;
use crate::{resolve_timeout, JWT_SOURCE_TIMEOUT_ENV};

#[derive(Default)]
pub struct JwtSourceOptions {
    pub spiffe_socket_path: Option<String>,
    pub client: Option<Arc<dyn WorkloadApi>>,
    pub timeout: Option<Duration>,
}

/// Continuously updated JWT bundle source. Bundle reads come from the
/// latest snapshot; JWT SVID fetches go to the Workload API directly
/// because tokens are minted per audience.
pub struct JwtSource {
    bundles: RwLock<Option<Arc<JwtBundleSet>>>,
    closed: AtomicBool,
    client: Arc<dyn WorkloadApi>,
    owns_client: bool,
}

impl std::fmt::Debug for JwtSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSource")
            .field("closed", &self.closed)
            .field("owns_client", &self.owns_client)
            .finish_non_exhaustive()
    }
}

impl JwtSource {
    pub async fn new(options: JwtSourceOptions) -> Result<Arc<Self>, Error> {
        let (client, owns_client) = match options.client {
            Some(client) => (client, false),
            None => {
                let client =
                    WorkloadApiClientFactory::get(options.spiffe_socket_path.as_deref())
                        .await
                        .map_err(Error::WorkloadApi)?;
                (client, true)
            }
        };

        let source = Arc::new(JwtSource {
            bundles: RwLock::new(None),
            closed: AtomicBool::new(false),
            client,
            owns_client,
        });

        let (ready, mut ready_rx) = mpsc::channel::<Result<(), Error>>(1);
        let watcher = Arc::new(SourceWatcher {
            source: Arc::downgrade(&source),
            ready,
        });

        if let Err(error) = source.client.watch_jwt_bundles(watcher).await {
            source.close().await;
            return Err(Error::WorkloadApi(error));
        }

        let timeout = resolve_timeout(options.timeout, JWT_SOURCE_TIMEOUT_ENV);
        let first = if timeout.is_zero() {
            ready_rx.recv().await
        } else {
            match tokio::time::timeout(timeout, ready_rx.recv()).await {
                Ok(first) => first,
                Err(_) => {
                    source.close().await;
                    return Err(Error::BootstrapTimeout);
                }
            }
        };

        match first {
            Some(Ok(())) => {
                info!("JWT source ready");
                Ok(source)
            }
            Some(Err(error)) => {
                source.close().await;
                Err(error)
            }
            None => {
                source.close().await;
                Err(Error::WatchClosed)
            }
        }
    }

    /// Fetches a freshly minted JWT SVID from the Workload API.
    pub async fn fetch_jwt_svid(
        &self,
        audiences: Vec<String>,
        subject: Option<SpiffeId>,
    ) -> Result<JwtSvid, Error> {
        self.ensure_open()?;

        self.client
            .fetch_jwt_svid(audiences, subject)
            .await
            .map_err(Error::WorkloadApi)
    }

    pub async fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<JwtBundle, Error> {
        self.ensure_open()?;

        let bundles = self
            .bundles
            .read()
            .await
            .clone()
            .ok_or(Error::NoSnapshot)?;

        let bundle = bundles.get_bundle_for_trust_domain(trust_domain)?;
        Ok(bundle.clone())
    }

    /// The whole latest bundle snapshot, for token validation paths that
    /// need every trust domain.
    pub async fn bundles(&self) -> Result<Arc<JwtBundleSet>, Error> {
        self.ensure_open()?;

        self.bundles.read().await.clone().ok_or(Error::NoSnapshot)
    }

    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if self.owns_client {
                self.client.close().await;
            }
            info!("JWT source closed");
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    async fn install(&self, bundles: JwtBundleSet) {
        *self.bundles.write().await = Some(Arc::new(bundles));
        debug!("Installed a new JWT bundle snapshot");
    }
}

struct SourceWatcher {
    source: Weak<JwtSource>,
    ready: mpsc::Sender<Result<(), Error>>,
}

#[async_trait]
impl JwtBundlesWatcher for SourceWatcher {
    async fn on_update(&self, bundles: JwtBundleSet) {
        if let Some(source) = self.source.upgrade() {
            source.install(bundles).await;
            let _ = self.ready.try_send(Ok(()));
        }
    }

    async fn on_error(&self, error: workload_api_client::error::Error) {
        warn!("JWT bundles watch error: {error}");

        if error.is_terminal() {
            let _ = self.ready.try_send(Err(Error::WorkloadApi(error)));
        }
    }
}
