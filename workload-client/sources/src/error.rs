// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Timed out waiting for the first update from the workload API")]
    BootstrapTimeout,
    #[error("The watch stream ended before the first update was applied")]
    WatchClosed,
    #[error("The source is closed")]
    Closed,
    #[error("No identity snapshot is available")]
    NoSnapshot,
    #[error("Error from the workload API client: {0}")]
    WorkloadApi(workload_api_client::error::Error),
    #[error(transparent)]
    Bundle(#[from] trust_bundle::error::Error),
}
