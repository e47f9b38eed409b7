// Copyright (c) Microsoft. All rights reserved.

use std::fmt;
use std::path::Path;

use core_objects::SpiffeId;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

use crate::error::X509SvidError;

/// An X.509 SVID: a certificate chain whose leaf carries a single SPIFFE
/// URI SAN, together with the private key paired with the leaf.
#[derive(Clone)]
pub struct X509Svid {
    spiffe_id: SpiffeId,
    chain: Vec<X509>,
    chain_der: Vec<Vec<u8>>,
    private_key: PKey<Private>,
}

impl X509Svid {
    /// Parses an SVID from PEM encoded certificates and a PEM encoded
    /// PKCS#8 private key.
    pub fn parse(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, X509SvidError> {
        let chain = X509::stack_from_pem(cert_pem).map_err(X509SvidError::CertificateFromPem)?;
        let private_key =
            PKey::private_key_from_pem(key_pem).map_err(X509SvidError::PrivateKeyParse)?;

        X509Svid::from_parts(chain, private_key)
    }

    /// Parses an SVID from concatenated ASN.1 DER certificates and a DER
    /// encoded PKCS#8 private key, the form the Workload API delivers.
    pub fn parse_from_der(cert_der: &[u8], key_der: &[u8]) -> Result<Self, X509SvidError> {
        let chain = trust_bundle::x509::certificates_from_der(cert_der)
            .map_err(|_| X509SvidError::MalformedCertificateChain)?;
        let private_key =
            PKey::private_key_from_pkcs8(key_der).map_err(X509SvidError::PrivateKeyParse)?;

        X509Svid::from_parts(chain, private_key)
    }

    /// Reads PEM files from disk and delegates to `parse`.
    pub async fn load(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, X509SvidError> {
        let cert_pem = tokio::fs::read(cert_path.as_ref())
            .await
            .map_err(X509SvidError::FileRead)?;
        let key_pem = tokio::fs::read(key_path.as_ref())
            .await
            .map_err(X509SvidError::FileRead)?;

        X509Svid::parse(&cert_pem, &key_pem)
    }

    fn from_parts(chain: Vec<X509>, private_key: PKey<Private>) -> Result<Self, X509SvidError> {
        if chain.is_empty() {
            return Err(X509SvidError::EmptyChain);
        }

        let mut chain_der = Vec::with_capacity(chain.len());
        for certificate in &chain {
            chain_der.push(
                certificate
                    .to_der()
                    .map_err(X509SvidError::SerializeCertificate)?,
            );
        }

        let spiffe_id = check_leaf(&chain_der[0])?;
        for der in &chain_der[1..] {
            check_signing_certificate(der)?;
        }

        let leaf_public_key = chain[0]
            .public_key()
            .map_err(X509SvidError::KeyCompare)?;
        if !private_key.public_eq(&leaf_public_key) {
            return Err(X509SvidError::KeyMismatch);
        }

        Ok(X509Svid {
            spiffe_id,
            chain,
            chain_der,
            private_key,
        })
    }

    #[must_use]
    pub fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// Certificate chain, leaf first.
    #[must_use]
    pub fn cert_chain(&self) -> &[X509] {
        &self.chain
    }

    #[must_use]
    pub fn leaf(&self) -> &X509 {
        &self.chain[0]
    }

    #[must_use]
    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// Copy of the chain as concatenated ASN.1 DER.
    #[must_use]
    pub fn marshal(&self) -> Vec<u8> {
        let mut der = Vec::new();
        for certificate in &self.chain_der {
            der.extend_from_slice(certificate);
        }

        der
    }

    /// Copy of the private key as DER encoded PKCS#8.
    pub fn marshal_private_key(&self) -> Result<Vec<u8>, X509SvidError> {
        self.private_key
            .private_key_to_pkcs8()
            .map_err(X509SvidError::SerializeCertificate)
    }
}

impl fmt::Debug for X509Svid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509Svid")
            .field("spiffe_id", &self.spiffe_id)
            .field("chain", &self.chain.len())
            .finish()
    }
}

/// Enforces the X.509-SVID leaf profile and extracts the SPIFFE ID: one
/// URI SAN holding a SPIFFE ID, not a CA, digitalSignature without
/// keyCertSign or cRLSign.
fn check_leaf(der: &[u8]) -> Result<SpiffeId, X509SvidError> {
    let (_, certificate) =
        parse_x509_certificate(der).map_err(|_| X509SvidError::MalformedCertificateChain)?;

    let spiffe_id = leaf_spiffe_id(&certificate)?;

    if is_ca(&certificate)? {
        return Err(X509SvidError::LeafIsCa);
    }

    let key_usage = certificate
        .key_usage()
        .map_err(|_| X509SvidError::MalformedExtensions)?
        .ok_or(X509SvidError::LeafMissingDigitalSignature)?;

    if !key_usage.value.digital_signature() {
        return Err(X509SvidError::LeafMissingDigitalSignature);
    }
    if key_usage.value.key_cert_sign() {
        return Err(X509SvidError::LeafHasKeyCertSign);
    }
    if key_usage.value.crl_sign() {
        return Err(X509SvidError::LeafHasCrlSign);
    }

    Ok(spiffe_id)
}

fn check_signing_certificate(der: &[u8]) -> Result<(), X509SvidError> {
    let (_, certificate) =
        parse_x509_certificate(der).map_err(|_| X509SvidError::MalformedCertificateChain)?;

    if !is_ca(&certificate)? {
        return Err(X509SvidError::IntermediateNotCa);
    }

    let key_usage = certificate
        .key_usage()
        .map_err(|_| X509SvidError::MalformedExtensions)?
        .ok_or(X509SvidError::IntermediateMissingKeyCertSign)?;

    if !key_usage.value.key_cert_sign() {
        return Err(X509SvidError::IntermediateMissingKeyCertSign);
    }

    Ok(())
}

fn leaf_spiffe_id(certificate: &X509Certificate<'_>) -> Result<SpiffeId, X509SvidError> {
    let san = certificate
        .subject_alternative_name()
        .map_err(|_| X509SvidError::MalformedExtensions)?
        .ok_or(X509SvidError::MissingSpiffeUri)?;

    let mut uris = san.value.general_names.iter().filter_map(|name| match name {
        GeneralName::URI(uri) => Some(*uri),
        _ => None,
    });

    let uri = uris.next().ok_or(X509SvidError::MissingSpiffeUri)?;
    if uris.next().is_some() {
        return Err(X509SvidError::MultipleSpiffeUris);
    }

    SpiffeId::parse(uri).map_err(X509SvidError::InvalidSpiffeId)
}

fn is_ca(certificate: &X509Certificate<'_>) -> Result<bool, X509SvidError> {
    let constraints = certificate
        .basic_constraints()
        .map_err(|_| X509SvidError::MalformedExtensions)?;

    Ok(constraints.map_or(false, |extension| extension.value.ca))
}
