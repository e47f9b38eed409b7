// Copyright (c) Microsoft. All rights reserved.

use std::fmt;
use std::path::Path;

use core_objects::TrustDomain;
use openssl::x509::X509;

use crate::error::Error;
use crate::Bundle;

/// X.509 authorities trusted for one trust domain. Authorities are trust
/// anchors; order is irrelevant and duplicates are collapsed.
#[derive(Clone, Debug)]
pub struct X509Bundle {
    trust_domain: TrustDomain,
    authorities: Vec<X509>,
}

impl X509Bundle {
    #[must_use]
    pub fn new(trust_domain: TrustDomain) -> Self {
        X509Bundle {
            trust_domain,
            authorities: Vec::new(),
        }
    }

    /// Builds a bundle from concatenated ASN.1 DER certificates, the form
    /// the Workload API delivers bundles in.
    pub fn parse(trust_domain: TrustDomain, bundle_der: &[u8]) -> Result<Self, Error> {
        let mut bundle = X509Bundle::new(trust_domain);
        for authority in certificates_from_der(bundle_der)? {
            bundle.add_authority(authority)?;
        }

        Ok(bundle)
    }

    /// Builds a bundle from PEM encoded certificates.
    pub fn parse_pem(trust_domain: TrustDomain, bundle_pem: &[u8]) -> Result<Self, Error> {
        let authorities = X509::stack_from_pem(bundle_pem).map_err(Error::CertificateFromPem)?;

        let mut bundle = X509Bundle::new(trust_domain);
        for authority in authorities {
            bundle.add_authority(authority)?;
        }

        Ok(bundle)
    }

    pub async fn load(
        trust_domain: TrustDomain,
        bundle_path: impl AsRef<Path>,
    ) -> Result<Self, Error> {
        let bundle_pem = tokio::fs::read(bundle_path.as_ref())
            .await
            .map_err(Error::FileRead)?;

        X509Bundle::parse_pem(trust_domain, &bundle_pem)
    }

    pub fn add_authority(&mut self, authority: X509) -> Result<(), Error> {
        let der = authority.to_der().map_err(Error::SerializeAuthority)?;
        for existing in &self.authorities {
            if existing.to_der().map_err(Error::SerializeAuthority)? == der {
                return Ok(());
            }
        }

        self.authorities.push(authority);
        Ok(())
    }

    #[must_use]
    pub fn authorities(&self) -> &[X509] {
        &self.authorities
    }
}

impl Bundle for X509Bundle {
    fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }
}

impl fmt::Debug for X509Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X509Bundle")
            .field("trust_domain", &self.trust_domain)
            .field("authorities", &self.authorities.len())
            .finish()
    }
}

/// Splits concatenated ASN.1 DER certificates, preserving order.
pub fn certificates_from_der(der: &[u8]) -> Result<Vec<X509>, Error> {
    let mut certificates = Vec::new();

    let mut input = der;
    while !input.is_empty() {
        let remainder = x509_parser::parse_x509_certificate(input)
            .map(|(remainder, _)| remainder)
            .map_err(|_| Error::MalformedDerBundle)?;

        let consumed = input.len() - remainder.len();
        let certificate =
            X509::from_der(&input[..consumed]).map_err(Error::CertificateFromDer)?;
        certificates.push(certificate);

        input = remainder;
    }

    Ok(certificates)
}
