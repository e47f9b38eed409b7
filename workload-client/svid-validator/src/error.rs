// Copyright (c) Microsoft. All rights reserved.

use core_objects::{SpiffeId, SpiffeIdError};
use openssl::error::ErrorStack;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to verify the certificate chain: {0}")]
    ChainVerification(String),
    #[error("Error during certificate verification: {0}")]
    Verify(ErrorStack),
    #[error(transparent)]
    Bundle(#[from] trust_bundle::error::Error),
    #[error("SPIFFE ID is not accepted: {0}")]
    SpiffeIdRejected(SpiffeId),
    #[error("Invalid SPIFFE ID in the accepted list: {0}")]
    InvalidAcceptedId(SpiffeIdError),
}
