// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    InvalidAddress(String),
    #[error("Workload endpoint socket address is not configured, set {0}")]
    MissingEndpointSocket(&'static str),
}
