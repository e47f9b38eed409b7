// Copyright (c) Microsoft. All rights reserved.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SpiffeIdError {
    #[error("SPIFFE ID is malformed: {0}")]
    Malformed(String),
    #[error("SPIFFE ID scheme must be spiffe, found: {0}")]
    WrongScheme(String),
    #[error("Trust domain is empty")]
    EmptyTrustDomain,
    #[error("Trust domain contains an invalid character: {0:?}")]
    InvalidTrustDomainCharacter(char),
    #[error("SPIFFE ID path contains an empty segment")]
    EmptyPathSegment,
    #[error("SPIFFE ID path contains a relative segment")]
    RelativePathSegment,
    #[error("SPIFFE ID path contains an invalid character: {0:?}")]
    InvalidPathCharacter(char),
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unsupported JWT algorithm: {0}")]
pub struct UnsupportedAlgorithm(pub String);
