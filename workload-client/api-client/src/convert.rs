// Copyright (c) Microsoft. All rights reserved.

use core_objects::TrustDomain;
use svid::{JwtSvid, X509Svid};
use trust_bundle::{JwtBundle, JwtBundleSet, X509Bundle, X509BundleSet};
use workload_api::{JwtBundlesResponse, X509BundlesResponse, X509svidResponse};

use crate::error::Error;

/// The latest X.509 identity material of a workload: one or more SVIDs
/// plus the bundles of every trust domain the workload should trust.
#[derive(Clone)]
pub struct X509Context {
    svids: Vec<X509Svid>,
    bundle_set: X509BundleSet,
}

impl X509Context {
    #[must_use]
    pub fn new(svids: Vec<X509Svid>, bundle_set: X509BundleSet) -> Self {
        X509Context { svids, bundle_set }
    }

    #[must_use]
    pub fn svids(&self) -> &[X509Svid] {
        &self.svids
    }

    /// The first SVID in the list, unless a source picker chose another.
    #[must_use]
    pub fn default_svid(&self) -> Option<&X509Svid> {
        self.svids.first()
    }

    #[must_use]
    pub fn bundle_set(&self) -> &X509BundleSet {
        &self.bundle_set
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<X509Svid>, X509BundleSet) {
        (self.svids, self.bundle_set)
    }
}

/// Converts a streamed X.509 response into a validated context. A context
/// without at least one SVID and one bundle is rejected.
pub fn x509_context_from_response(response: X509svidResponse) -> Result<X509Context, Error> {
    let mut svids = Vec::with_capacity(response.svids.len());
    let mut bundle_set = X509BundleSet::new();

    for message in &response.svids {
        let parsed = X509Svid::parse_from_der(&message.x509_svid, &message.x509_svid_key)?;

        if !message.bundle.is_empty() {
            let trust_domain = parsed.spiffe_id().trust_domain().clone();
            bundle_set.put(X509Bundle::parse(trust_domain, &message.bundle)?);
        }

        svids.push(parsed);
    }

    for (key, bundle_der) in &response.federated_bundles {
        let trust_domain = TrustDomain::parse(key)?;
        bundle_set.put(X509Bundle::parse(trust_domain, bundle_der)?);
    }

    if svids.is_empty() || bundle_set.is_empty() {
        return Err(Error::InvalidX509Context);
    }

    Ok(X509Context::new(svids, bundle_set))
}

pub fn x509_bundles_from_response(response: X509BundlesResponse) -> Result<X509BundleSet, Error> {
    let mut bundle_set = X509BundleSet::new();
    for (key, bundle_der) in &response.bundles {
        let trust_domain = TrustDomain::parse(key)?;
        bundle_set.put(X509Bundle::parse(trust_domain, bundle_der)?);
    }

    if bundle_set.is_empty() {
        return Err(Error::EmptyResponse);
    }

    Ok(bundle_set)
}

pub fn jwt_bundles_from_response(response: JwtBundlesResponse) -> Result<JwtBundleSet, Error> {
    let mut bundle_set = JwtBundleSet::new();
    for (key, document) in &response.bundles {
        let trust_domain = TrustDomain::parse(key)?;
        bundle_set.put(JwtBundle::from_jwks_document(trust_domain, document)?);
    }

    if bundle_set.is_empty() {
        return Err(Error::EmptyResponse);
    }

    Ok(bundle_set)
}

/// Builds a JWT SVID from a fetched token: the token is parsed with the
/// audience it was requested for, and the response hint is attached.
pub fn jwt_svid_from_message(
    message: &workload_api::Jwtsvid,
    audiences: &[String],
) -> Result<JwtSvid, Error> {
    let expected = audiences.iter().map(String::as_str).collect::<Vec<_>>();
    let parsed = JwtSvid::parse_insecure(&message.svid, &expected)?;

    let hint = if message.hint.is_empty() {
        None
    } else {
        Some(message.hint.clone())
    };

    Ok(parsed.with_hint(hint))
}
