// Copyright (c) Microsoft. All rights reserved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use core_objects::TrustDomain;
use log::{debug, info, warn};
use svid::X509Svid;
use tokio::sync::{mpsc, RwLock};
use trust_bundle::{X509Bundle, X509BundleSet};
use workload_api_client::{
    X509Context, X509ContextWatcher, WorkloadApi, WorkloadApiClientFactory,
};

use crate::error::Error;
use crate::{resolve_timeout, X509_SOURCE_TIMEOUT_ENV};

/// Chooses the default SVID from an updated list; `None` falls back to
/// the first entry.
pub type SvidPicker = Box<dyn Fn(&[X509Svid]) -> Option<usize> + Send + Sync>;

#[derive(Default)]
pub struct X509SourceOptions {
    pub spiffe_socket_path: Option<String>,
    pub client: Option<Arc<dyn WorkloadApi>>,
    pub picker: Option<SvidPicker>,
    pub timeout: Option<Duration>,
}

struct Snapshot {
    svids: Vec<X509Svid>,
    default_svid: usize,
    bundles: X509BundleSet,
}

/// Continuously updated X.509 identity source. Construction blocks until
/// the first update from the Workload API has been applied; afterwards
/// reads return the latest installed snapshot while the internal watcher
/// keeps it current.
pub struct X509Source {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    closed: AtomicBool,
    client: Arc<dyn WorkloadApi>,
    owns_client: bool,
    picker: Option<SvidPicker>,
}

impl std::fmt::Debug for X509Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X509Source")
            .field("closed", &self.closed)
            .field("owns_client", &self.owns_client)
            .finish_non_exhaustive()
    }
}

impl X509Source {
    pub async fn new(options: X509SourceOptions) -> Result<Arc<Self>, Error> {
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

        let source = Arc::new(X509Source {
            snapshot: RwLock::new(None),
            closed: AtomicBool::new(false),
            client,
            owns_client,
            picker: options.picker,
        });

        let (ready, mut ready_rx) = mpsc::channel::<Result<(), Error>>(1);
        let watcher = Arc::new(SourceWatcher {
            source: Arc::downgrade(&source),
            ready,
        });

        if let Err(error) = source.client.watch_x509_context(watcher).await {
            source.close().await;
            return Err(Error::WorkloadApi(error));
        }

        let timeout = resolve_timeout(options.timeout, X509_SOURCE_TIMEOUT_ENV);
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
                info!("X.509 source ready");
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

    /// The default SVID of the latest snapshot.
    pub async fn svid(&self) -> Result<X509Svid, Error> {
        self.ensure_open()?;

        let snapshot = self
            .snapshot
            .read()
            .await
            .clone()
            .ok_or(Error::NoSnapshot)?;

        Ok(snapshot.svids[snapshot.default_svid].clone())
    }

    /// All SVIDs of the latest snapshot.
    pub async fn svids(&self) -> Result<Vec<X509Svid>, Error> {
        self.ensure_open()?;

        let snapshot = self
            .snapshot
            .read()
            .await
            .clone()
            .ok_or(Error::NoSnapshot)?;

        Ok(snapshot.svids.clone())
    }

    pub async fn bundle_for_trust_domain(
        &self,
        trust_domain: &TrustDomain,
    ) -> Result<X509Bundle, Error> {
        self.ensure_open()?;

        let snapshot = self
            .snapshot
            .read()
            .await
            .clone()
            .ok_or(Error::NoSnapshot)?;

        let bundle = snapshot.bundles.get_bundle_for_trust_domain(trust_domain)?;
        Ok(bundle.clone())
    }

    /// Idempotent; drops the client when this source owns it. Reads after
    /// close fail.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if self.owns_client {
                self.client.close().await;
            }
            info!("X.509 source closed");
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    async fn install(&self, context: X509Context) {
        let (svids, bundles) = context.into_parts();

        let default_svid = self
            .picker
            .as_ref()
            .and_then(|picker| picker(&svids))
            .unwrap_or(0)
            .min(svids.len().saturating_sub(1));

        let snapshot = Arc::new(Snapshot {
            svids,
            default_svid,
            bundles,
        });

        *self.snapshot.write().await = Some(snapshot);
        debug!("Installed a new X.509 snapshot");
    }
}

struct SourceWatcher {
    source: Weak<X509Source>,
    ready: mpsc::Sender<Result<(), Error>>,
}

#[async_trait]
impl X509ContextWatcher for SourceWatcher {
    async fn on_update(&self, context: X509Context) {
        if let Some(source) = self.source.upgrade() {
            source.install(context).await;
            let _ = self.ready.try_send(Ok(()));
        }
    }

    async fn on_error(&self, error: workload_api_client::error::Error) {
        warn!("X.509 context watch error: {error}");

        // A terminal error during bootstrap fails the construction; after
        // bootstrap the receiver is gone and readers keep the last-good
        // snapshot while the client retries transient failures.
        if error.is_terminal() {
            let _ = self.ready.try_send(Err(Error::WorkloadApi(error)));
        }
    }
}
