// Copyright (c) Microsoft. All rights reserved.

use std::io;
use std::str::Utf8Error;

use base64::DecodeError;
use core_objects::{SpiffeIdError, UnsupportedAlgorithm};
use openssl::error::ErrorStack;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum X509SvidError {
    #[error("Unable to parse the DER certificate chain")]
    MalformedCertificateChain,
    #[error("Unable to parse PEM certificates: {0}")]
    CertificateFromPem(ErrorStack),
    #[error("Unable to serialize certificate: {0}")]
    SerializeCertificate(ErrorStack),
    #[error("Unable to parse the PKCS#8 private key: {0}")]
    PrivateKeyParse(ErrorStack),
    #[error("The certificate chain is empty")]
    EmptyChain,
    #[error("Unable to read certificate extensions")]
    MalformedExtensions,
    #[error("Leaf certificate does not carry a SPIFFE URI SAN")]
    MissingSpiffeUri,
    #[error("Leaf certificate carries more than one URI SAN")]
    MultipleSpiffeUris,
    #[error("Leaf certificate SPIFFE ID is invalid: {0}")]
    InvalidSpiffeId(SpiffeIdError),
    #[error("Leaf certificate must not have CA set")]
    LeafIsCa,
    #[error("Leaf certificate key usage must include digitalSignature")]
    LeafMissingDigitalSignature,
    #[error("Leaf certificate key usage must not include keyCertSign")]
    LeafHasKeyCertSign,
    #[error("Leaf certificate key usage must not include cRLSign")]
    LeafHasCrlSign,
    #[error("Signing certificate must have CA set")]
    IntermediateNotCa,
    #[error("Signing certificate key usage must include keyCertSign")]
    IntermediateMissingKeyCertSign,
    #[error("The private key does not match the leaf certificate public key")]
    KeyMismatch,
    #[error("Unable to compare the private key with the leaf public key: {0}")]
    KeyCompare(ErrorStack),
    #[error("Error reading SVID file: {0}")]
    FileRead(io::Error),
}

#[derive(Error, Debug)]
pub enum JwtSvidError {
    #[error("Expected 3 parts separated by '.', found: {0}")]
    InvalidJoseEncoding(usize),
    #[error("Error decoding from base64: {0}")]
    InvalidBase64Encoding(DecodeError),
    #[error("Error decoding from UTF-8: {0}")]
    InvalidUtf8Encoding(Utf8Error),
    #[error("Unable to deserialize Json: {0}")]
    DeserializeJson(serde_json::Error),
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),
    #[error("Invalid header typ: {0}")]
    InvalidTyp(String),
    #[error("Token header is missing a key id")]
    MissingKeyId,
    #[error("Token is missing the sub claim")]
    MissingSubject,
    #[error("Token is missing the exp claim")]
    MissingExpiry,
    #[error("Token aud claim is malformed")]
    MalformedAudienceClaim,
    #[error("Token sub claim is not a SPIFFE ID: {0}")]
    InvalidSubject(SpiffeIdError),
    #[error("Audience {expected:?} is not in the aud claim")]
    AudienceMismatch { expected: String },
    #[error("Token is expired: current time {current}, expiry time {expiry}")]
    Expired { expiry: u64, current: u64 },
    #[error(transparent)]
    Bundle(#[from] trust_bundle::error::Error),
    #[error("The authority key type does not match the token algorithm: {0}")]
    KeyTypeMismatch(ErrorStack),
    #[error("Error while verifying the signature: {0}")]
    SignatureVerification(ErrorStack),
    #[error("The signature doesn't match the expected signature")]
    InvalidSignature,
}
