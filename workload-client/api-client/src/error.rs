// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Error connecting to the workload endpoint: {0}")]
    Connect(tonic::transport::Error),
    #[error("The workload endpoint address is not a valid URI: {0}")]
    InvalidUri(tonic::codegen::http::uri::InvalidUri),
    #[error(transparent)]
    Endpoint(#[from] endpoint::error::Error),
    #[error("The workload API call failed: {0}")]
    Rpc(tonic::Status),
    #[error("The workload API rejected the request: {0}")]
    InvalidArgument(tonic::Status),
    #[error("The workload API returned an empty response")]
    EmptyResponse,
    #[error("Received an X.509 context with no SVID or no bundle")]
    InvalidX509Context,
    #[error("Unable to parse an SVID in the response: {0}")]
    InvalidX509Svid(#[from] svid::X509SvidError),
    #[error("Unable to parse a JWT SVID in the response: {0}")]
    InvalidJwtSvid(#[from] svid::JwtSvidError),
    #[error("Unable to parse a bundle in the response: {0}")]
    InvalidBundle(#[from] trust_bundle::error::Error),
    #[error("Invalid trust domain key in the response: {0}")]
    InvalidTrustDomain(#[from] core_objects::SpiffeIdError),
    #[error("The client is closed")]
    Closed,
}

impl Error {
    /// Terminal errors are not retried by the watch loops.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::InvalidArgument(_) | Error::Closed)
    }
}

pub(crate) fn classify_status(status: tonic::Status) -> Error {
    if status.code() == tonic::Code::InvalidArgument {
        Error::InvalidArgument(status)
    } else {
        Error::Rpc(status)
    }
}
