// Copyright (c) Microsoft. All rights reserved.

#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::default_trait_access,
    clippy::let_unit_value,
    clippy::missing_errors_doc,
    clippy::similar_names,
    clippy::too_many_lines
)]

pub mod error;
pub mod jwt;
pub mod x509;

use std::collections::HashMap;

use core_objects::TrustDomain;
use error::Error;

pub use jwt::JwtBundle;
pub use x509::X509Bundle;

/// A per-trust-domain container of authorities.
pub trait Bundle {
    fn trust_domain(&self) -> &TrustDomain;
}

/// Trust bundles indexed by trust domain. Inserting a bundle for a trust
/// domain that already has one replaces it.
#[derive(Clone, Debug)]
pub struct BundleSet<B: Bundle> {
    bundles: HashMap<TrustDomain, B>,
}

pub type X509BundleSet = BundleSet<X509Bundle>;
pub type JwtBundleSet = BundleSet<JwtBundle>;

impl<B: Bundle> BundleSet<B> {
    #[must_use]
    pub fn new() -> Self {
        BundleSet {
            bundles: HashMap::new(),
        }
    }

    pub fn put(&mut self, bundle: B) {
        self.bundles
            .insert(bundle.trust_domain().clone(), bundle);
    }

    pub fn get_bundle_for_trust_domain(&self, trust_domain: &TrustDomain) -> Result<&B, Error> {
        self.bundles
            .get(trust_domain)
            .ok_or_else(|| Error::BundleNotFound(trust_domain.clone()))
    }

    #[must_use]
    pub fn has_bundle_for_trust_domain(&self, trust_domain: &TrustDomain) -> bool {
        self.bundles.contains_key(trust_domain)
    }

    pub fn trust_domains(&self) -> impl Iterator<Item = &TrustDomain> {
        self.bundles.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

impl<B: Bundle> Default for BundleSet<B> {
    fn default() -> Self {
        BundleSet::new()
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;

    #[test]
    fn put_and_lookup_by_trust_domain() {
        let trust_domain = TrustDomain::new("example.org").unwrap();
        let bundle = X509Bundle::new(trust_domain.clone());

        let mut bundles = X509BundleSet::new();
        bundles.put(bundle);

        assert!(bundles.has_bundle_for_trust_domain(&trust_domain));
        let found = bundles.get_bundle_for_trust_domain(&trust_domain).unwrap();
        assert_eq!(&trust_domain, found.trust_domain());
    }

    #[test]
    fn lookup_of_unknown_trust_domain_fails() {
        let bundles = X509BundleSet::new();
        let trust_domain = TrustDomain::new("unknown.org").unwrap();

        let error = bundles
            .get_bundle_for_trust_domain(&trust_domain)
            .unwrap_err();
        assert_matches!(error, Error::BundleNotFound(_));
    }

    #[test]
    fn put_replaces_the_previous_bundle() {
        let trust_domain = TrustDomain::new("example.org").unwrap();

        let mut bundles = JwtBundleSet::new();
        bundles.put(JwtBundle::new(trust_domain.clone()));
        assert_eq!(1, bundles.len());

        // Re-inserting for the same trust domain does not grow the set.
        bundles.put(JwtBundle::new(trust_domain.clone()));
        assert_eq!(1, bundles.len());
    }
}
