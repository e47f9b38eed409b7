// Copyright (c) Microsoft. All rights reserved.

use std::collections::HashMap;

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroup, EcKey};
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::sha;
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509NameBuilder, X509Ref, X509};
use workload_api::{JwtBundlesResponse, X509BundlesResponse, X509svid, X509svidResponse};

/// A CA plus one issued leaf carrying the given SPIFFE ID, ready to be
/// served through the fake Workload API.
pub struct TestIdentity {
    pub spiffe_id: String,
    pub trust_domain: String,
    pub ca: X509,
    pub ca_key: PKey<Private>,
    pub leaf: X509,
    pub leaf_key: PKey<Private>,
}

impl TestIdentity {
    pub fn new(spiffe_id: &str) -> Self {
        let trust_domain = spiffe_id
            .strip_prefix("spiffe://")
            .and_then(|rest| rest.split('/').next())
            .expect("test identity needs a spiffe:// ID")
            .to_string();

        let ca_key = ec_key();
        let ca = ca_certificate(&ca_key, &format!("{trust_domain} ca"));
        let leaf_key = ec_key();
        let leaf = leaf_certificate(&leaf_key, &ca, &ca_key, spiffe_id);

        TestIdentity {
            spiffe_id: spiffe_id.to_string(),
            trust_domain,
            ca,
            ca_key,
            leaf,
            leaf_key,
        }
    }

    pub fn x509svid_message(&self) -> X509svid {
        X509svid {
            spiffe_id: self.spiffe_id.clone(),
            x509_svid: self.leaf.to_der().unwrap(),
            x509_svid_key: self.leaf_key.private_key_to_pkcs8().unwrap(),
            bundle: self.ca.to_der().unwrap(),
            hint: String::new(),
        }
    }

    pub fn response(&self) -> X509svidResponse {
        X509svidResponse {
            svids: vec![self.x509svid_message()],
            crl: Vec::new(),
            federated_bundles: HashMap::new(),
        }
    }

    pub fn bundles_response(&self) -> X509BundlesResponse {
        let mut bundles = HashMap::new();
        bundles.insert(self.trust_domain.clone(), self.ca.to_der().unwrap());

        X509BundlesResponse {
            crl: Vec::new(),
            bundles,
        }
    }
}

/// An EC P-256 JWT signing authority with a JWKS document and an ES256
/// token factory.
pub struct TestJwtAuthority {
    pub kid: String,
    key: EcKey<Private>,
}

impl TestJwtAuthority {
    pub fn new(kid: &str) -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        TestJwtAuthority {
            kid: kid.to_string(),
            key: EcKey::generate(&group).unwrap(),
        }
    }

    pub fn jwks_document(&self) -> Vec<u8> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let mut ctx = BigNumContext::new().unwrap();
        let mut x = BigNum::new().unwrap();
        let mut y = BigNum::new().unwrap();
        self.key
            .public_key()
            .affine_coordinates_gfp(&group, &mut x, &mut y, &mut ctx)
            .unwrap();

        let document = serde_json::json!({
            "keys": [{
                "kty": "EC",
                "kid": self.kid,
                "use": "jwt-svid",
                "crv": "P-256",
                "x": base64::encode_config(x.to_vec(), base64::URL_SAFE_NO_PAD),
                "y": base64::encode_config(y.to_vec(), base64::URL_SAFE_NO_PAD),
            }]
        });

        serde_json::to_vec(&document).unwrap()
    }

    pub fn bundles_response(&self, trust_domain: &str) -> JwtBundlesResponse {
        let mut bundles = HashMap::new();
        bundles.insert(trust_domain.to_string(), self.jwks_document());

        JwtBundlesResponse { bundles }
    }

    /// Signs an ES256 JWT SVID for the given subject and audiences.
    pub fn token(&self, subject: &str, audiences: &[&str], expiry: u64) -> String {
        let header = serde_json::json!({
            "alg": "ES256",
            "kid": self.kid,
            "typ": "JWT",
        });
        let claims = serde_json::json!({
            "sub": subject,
            "aud": audiences,
            "exp": expiry,
        });

        let signing_input = format!(
            "{}.{}",
            base64::encode_config(
                serde_json::to_string(&header).unwrap().as_bytes(),
                base64::URL_SAFE_NO_PAD
            ),
            base64::encode_config(
                serde_json::to_string(&claims).unwrap().as_bytes(),
                base64::URL_SAFE_NO_PAD
            )
        );

        let digest = sha::sha256(signing_input.as_bytes());
        let signature = EcdsaSig::sign(&digest, &self.key).unwrap();
        let mut raw = signature.r().to_vec_padded(32).unwrap();
        raw.extend(signature.s().to_vec_padded(32).unwrap());

        format!(
            "{}.{}",
            signing_input,
            base64::encode_config(&raw, base64::URL_SAFE_NO_PAD)
        )
    }
}

pub fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub fn ca_certificate(key: &PKeyRef<Private>, common_name: &str) -> X509 {
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

pub fn leaf_certificate(
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
