// Copyright (c) Microsoft. All rights reserved.

use std::io;

use base64::DecodeError;
use core_objects::TrustDomain;
use openssl::error::ErrorStack;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No bundle found for trust domain: {0}")]
    BundleNotFound(TrustDomain),
    #[error("No authority found for key id: {0}")]
    AuthorityNotFound(String),
    #[error("Unable to deserialize JWKS document: {0}")]
    DeserializeJwks(serde_json::Error),
    #[error("JWK is missing a key id")]
    MissingKeyId,
    #[error("JWK is missing the {0} parameter")]
    MissingKeyParameter(&'static str),
    #[error("Error decoding JWK parameter from base64: {0}")]
    DecodeKeyParameter(DecodeError),
    #[error("Cannot construct a public key from the JWK parameters: {0}")]
    KeyFromJwk(ErrorStack),
    #[error("Malformed DER certificate bundle")]
    MalformedDerBundle,
    #[error("Unable to parse DER certificate: {0}")]
    CertificateFromDer(ErrorStack),
    #[error("Unable to parse PEM certificates: {0}")]
    CertificateFromPem(ErrorStack),
    #[error("Unable to serialize authority certificate: {0}")]
    SerializeAuthority(ErrorStack),
    #[error("Error reading bundle file: {0}")]
    FileRead(io::Error),
}
