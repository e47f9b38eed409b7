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

use core_objects::SpiffeId;
use error::Error;
use log::debug;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::X509StoreContext;
use svid::X509Svid;
use trust_bundle::X509BundleSet;

/// Verifies an X.509 SVID chain against the authorities of the leaf's
/// trust domain. Revocation is not checked: SPIFFE rotates roots through
/// the bundle stream instead of publishing CRLs.
pub fn verify_chain(svid: &X509Svid, bundles: &X509BundleSet) -> Result<(), Error> {
    let trust_domain = svid.spiffe_id().trust_domain();
    let bundle = bundles.get_bundle_for_trust_domain(trust_domain)?;

    let mut store = X509StoreBuilder::new().map_err(Error::Verify)?;
    for authority in bundle.authorities() {
        store.add_cert(authority.clone()).map_err(Error::Verify)?;
    }
    let store = store.build();

    let mut intermediates = Stack::new().map_err(Error::Verify)?;
    for certificate in &svid.cert_chain()[1..] {
        intermediates
            .push(certificate.clone())
            .map_err(Error::Verify)?;
    }

    let mut context = X509StoreContext::new().map_err(Error::Verify)?;
    let (verified, reason) = context
        .init(&store, svid.leaf(), &intermediates, |context| {
            let verified = context.verify_cert()?;
            Ok((verified, context.error()))
        })
        .map_err(Error::Verify)?;

    if verified {
        debug!("Verified certificate chain for {}", svid.spiffe_id());
        Ok(())
    } else {
        Err(Error::ChainVerification(reason.error_string().to_string()))
    }
}

/// Checks the SVID's SPIFFE ID against a caller supplied predicate.
pub fn verify_spiffe_id<F>(svid: &X509Svid, accepted: F) -> Result<(), Error>
where
    F: Fn(&SpiffeId) -> bool,
{
    if accepted(svid.spiffe_id()) {
        Ok(())
    } else {
        Err(Error::SpiffeIdRejected(svid.spiffe_id().clone()))
    }
}

/// Parses a pipe or comma separated list of accepted SPIFFE IDs, the
/// format TLS adapters receive from their configuration surface.
pub fn parse_accepted_ids(raw: &str) -> Result<Vec<SpiffeId>, Error> {
    raw.split(|character| character == '|' || character == ',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| SpiffeId::parse(entry).map_err(Error::InvalidAcceptedId))
        .collect()
}

#[cfg(test)]
mod tests {
    use core_objects::TrustDomain;
    use matches::assert_matches;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::pkey::{PKey, PKeyRef, Private};
    use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
    use openssl::x509::{X509Builder, X509NameBuilder, X509Ref, X509};
    use trust_bundle::X509Bundle;

    use super::*;

    fn new_key() -> PKey<Private> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
    }

    fn ca_certificate(key: &PKeyRef<Private>, common_name: &str) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", common_name).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder.sign(key, MessageDigest::sha256()).unwrap();

        builder.build()
    }

    fn leaf_certificate(
        key: &PKeyRef<Private>,
        ca: &X509Ref,
        ca_key: &PKeyRef<Private>,
        spiffe_id: &str,
    ) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "workload").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(2).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(ca.subject_name()).unwrap();
        builder.set_pubkey(key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .digital_signature()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let san = SubjectAlternativeName::new()
            .uri(spiffe_id)
            .build(&builder.x509v3_context(Some(ca), None))
            .unwrap();
        builder.append_extension(san).unwrap();
        builder.sign(ca_key, MessageDigest::sha256()).unwrap();

        builder.build()
    }

    fn init() -> (X509Svid, X509) {
        let ca_key = new_key();
        let ca = ca_certificate(&ca_key, "test-ca");
        let leaf_key = new_key();
        let leaf = leaf_certificate(&leaf_key, &ca, &ca_key, "spiffe://example.org/workload");

        let mut der = leaf.to_der().unwrap();
        der.extend(ca.to_der().unwrap());
        let svid =
            X509Svid::parse_from_der(&der, &leaf_key.private_key_to_pkcs8().unwrap()).unwrap();

        (svid, ca)
    }

    fn bundle_set_with(trust_domain: &str, authority: &X509) -> X509BundleSet {
        let mut bundle = X509Bundle::new(TrustDomain::new(trust_domain).unwrap());
        bundle.add_authority(authority.clone()).unwrap();

        let mut bundles = X509BundleSet::new();
        bundles.put(bundle);
        bundles
    }

    #[test]
    fn verify_chain_happy_path() {
        let (svid, ca) = init();
        let bundles = bundle_set_with("example.org", &ca);

        verify_chain(&svid, &bundles).unwrap();
    }

    #[test]
    fn verify_chain_against_wrong_authority_fails() {
        let (svid, _ca) = init();

        let other_key = new_key();
        let other_ca = ca_certificate(&other_key, "other-ca");
        let bundles = bundle_set_with("example.org", &other_ca);

        let error = verify_chain(&svid, &bundles).unwrap_err();
        assert_matches!(error, Error::ChainVerification(_));
    }

    #[test]
    fn verify_chain_without_bundle_fails() {
        let (svid, ca) = init();
        let bundles = bundle_set_with("other.org", &ca);

        let error = verify_chain(&svid, &bundles).unwrap_err();
        assert_matches!(
            error,
            Error::Bundle(trust_bundle::error::Error::BundleNotFound(_))
        );
    }

    #[test]
    fn verify_spiffe_id_predicate() {
        let (svid, _ca) = init();

        verify_spiffe_id(&svid, |id| id.path() == "/workload").unwrap();

        let error = verify_spiffe_id(&svid, |_| false).unwrap_err();
        assert_matches!(error, Error::SpiffeIdRejected(_));
    }

    #[test]
    fn parse_accepted_ids_pipe_and_comma_separated() {
        let ids =
            parse_accepted_ids("spiffe://example.org/a|spiffe://example.org/b").unwrap();
        assert_eq!(2, ids.len());

        let ids =
            parse_accepted_ids("spiffe://example.org/a, spiffe://example.org/b").unwrap();
        assert_eq!(2, ids.len());
        assert_eq!("spiffe://example.org/b", ids[1].to_string());

        let error = parse_accepted_ids("not-an-id").unwrap_err();
        assert_matches!(error, Error::InvalidAcceptedId(_));
    }
}
