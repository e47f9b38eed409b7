// Copyright (c) Microsoft. All rights reserved.

use async_trait::async_trait;
#[cfg(feature = "tests")]
use mockall::automock;
use trust_bundle::{JwtBundleSet, X509BundleSet};

use crate::convert::X509Context;
use crate::error::Error;

/// Receives X.509 context updates from a watch stream. Updates are
/// delivered in the server's emission order; a delivery failure in the
/// stream surfaces through `on_error` and, unless terminal, the stream
/// keeps retrying.
#[cfg_attr(feature = "tests", automock)]
#[async_trait]
pub trait X509ContextWatcher: Send + Sync {
    async fn on_update(&self, context: X509Context);
    async fn on_error(&self, error: Error);
}

#[cfg_attr(feature = "tests", automock)]
#[async_trait]
pub trait X509BundlesWatcher: Send + Sync {
    async fn on_update(&self, bundles: X509BundleSet);
    async fn on_error(&self, error: Error);
}

#[cfg_attr(feature = "tests", automock)]
#[async_trait]
pub trait JwtBundlesWatcher: Send + Sync {
    async fn on_update(&self, bundles: JwtBundleSet);
    async fn on_error(&self, error: Error);
}
