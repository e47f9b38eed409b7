// Copyright (c) Microsoft. All rights reserved.

use std::str::FromStr;

use core_objects::{get_epoch_time, AlgorithmFamily, JwtAlgorithm, SpiffeId};
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Public};
use openssl::rsa::Padding;
use openssl::sha;
use openssl::sign::{RsaPssSaltlen, Verifier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use trust_bundle::JwtBundleSet;

use crate::error::JwtSvidError;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct JoseHeader {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// A JWT SVID: a JWS compact token whose `sub` claim is a SPIFFE ID.
#[derive(Clone, Debug)]
pub struct JwtSvid {
    spiffe_id: SpiffeId,
    audience: Vec<String>,
    expiry: u64,
    claims: Map<String, Value>,
    token: String,
    hint: Option<String>,
}

struct Parsed {
    header: JoseHeader,
    algorithm: JwtAlgorithm,
    claims: Map<String, Value>,
    spiffe_id: SpiffeId,
    audience: Vec<String>,
    expiry: u64,
    signing_input: String,
    signature: Vec<u8>,
}

impl JwtSvid {
    /// Parses and validates the token claims against the expected audience
    /// without checking the signature. Validation of the `alg` header
    /// against the accepted registry still applies.
    pub fn parse_insecure(token: &str, expected_audience: &[&str]) -> Result<Self, JwtSvidError> {
        Self::parse_insecure_inner(token, expected_audience, get_epoch_time())
    }

    /// Parses the token, validates the claims against the expected
    /// audience, and verifies the signature against the JWT authority the
    /// `kid` header names in the bundle of the subject's trust domain.
    pub fn parse_and_validate(
        token: &str,
        bundles: &JwtBundleSet,
        expected_audience: &[&str],
    ) -> Result<Self, JwtSvidError> {
        Self::parse_and_validate_inner(token, bundles, expected_audience, get_epoch_time())
    }

    fn parse_insecure_inner(
        token: &str,
        expected_audience: &[&str],
        time: u64,
    ) -> Result<Self, JwtSvidError> {
        let parsed = parse_token(token, expected_audience, time)?;

        Ok(JwtSvid::from_parsed(parsed, token))
    }

    fn parse_and_validate_inner(
        token: &str,
        bundles: &JwtBundleSet,
        expected_audience: &[&str],
        time: u64,
    ) -> Result<Self, JwtSvidError> {
        let parsed = parse_token(token, expected_audience, time)?;

        let kid = parsed
            .header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(JwtSvidError::MissingKeyId)?;

        let bundle = bundles.get_bundle_for_trust_domain(parsed.spiffe_id.trust_domain())?;
        let key = bundle.find_key(kid)?;

        verify_signature(
            parsed.algorithm,
            key,
            parsed.signing_input.as_bytes(),
            &parsed.signature,
        )?;

        Ok(JwtSvid::from_parsed(parsed, token))
    }

    fn from_parsed(parsed: Parsed, token: &str) -> Self {
        JwtSvid {
            spiffe_id: parsed.spiffe_id,
            audience: parsed.audience,
            expiry: parsed.expiry,
            claims: parsed.claims,
            token: token.to_string(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }

    #[must_use]
    pub fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// Copy of the token audience set.
    #[must_use]
    pub fn audience(&self) -> Vec<String> {
        self.audience.clone()
    }

    /// Expiry as seconds since the epoch.
    #[must_use]
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    #[must_use]
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// The exact token the SVID was parsed from.
    #[must_use]
    pub fn marshal(&self) -> &str {
        &self.token
    }
}

fn parse_token(token: &str, expected_audience: &[&str], time: u64) -> Result<Parsed, JwtSvidError> {
    let split = token.split('.').collect::<Vec<&str>>();
    if split.len() != 3 {
        return Err(JwtSvidError::InvalidJoseEncoding(split.len()));
    }

    let signing_input = format!("{}.{}", split[0], split[1]);

    let header_compact = base64::decode_config(split[0], base64::URL_SAFE_NO_PAD)
        .map_err(JwtSvidError::InvalidBase64Encoding)?;
    let claims_compact = base64::decode_config(split[1], base64::URL_SAFE_NO_PAD)
        .map_err(JwtSvidError::InvalidBase64Encoding)?;
    let signature = base64::decode_config(split[2], base64::URL_SAFE_NO_PAD)
        .map_err(JwtSvidError::InvalidBase64Encoding)?;

    let header_compact =
        std::str::from_utf8(&header_compact).map_err(JwtSvidError::InvalidUtf8Encoding)?;
    let claims_compact =
        std::str::from_utf8(&claims_compact).map_err(JwtSvidError::InvalidUtf8Encoding)?;

    let header: JoseHeader =
        serde_json::from_str(header_compact).map_err(JwtSvidError::DeserializeJson)?;
    let claims: Map<String, Value> =
        serde_json::from_str(claims_compact).map_err(JwtSvidError::DeserializeJson)?;

    if let Some(typ) = header.typ.as_deref() {
        if typ != "JWT" && typ != "JOSE" {
            return Err(JwtSvidError::InvalidTyp(typ.to_string()));
        }
    }

    let algorithm = JwtAlgorithm::from_str(&header.alg)?;

    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .ok_or(JwtSvidError::MissingSubject)?;
    let spiffe_id = SpiffeId::parse(subject).map_err(JwtSvidError::InvalidSubject)?;

    let expiry = claims
        .get("exp")
        .and_then(Value::as_u64)
        .ok_or(JwtSvidError::MissingExpiry)?;

    // Check token is not expired.
    if expiry < time {
        return Err(JwtSvidError::Expired {
            expiry,
            current: time,
        });
    }

    let audience = audience_claim(&claims)?;
    for expected in expected_audience {
        if !audience.iter().any(|claimed| claimed == expected) {
            return Err(JwtSvidError::AudienceMismatch {
                expected: (*expected).to_string(),
            });
        }
    }

    Ok(Parsed {
        header,
        algorithm,
        claims,
        spiffe_id,
        audience,
        expiry,
        signing_input,
        signature,
    })
}

/// The `aud` claim is treated as a set; a single string is a set of one.
fn audience_claim(claims: &Map<String, Value>) -> Result<Vec<String>, JwtSvidError> {
    match claims.get("aud") {
        None => Ok(Vec::new()),
        Some(Value::String(audience)) => Ok(vec![audience.clone()]),
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .map(ToString::to_string)
                    .ok_or(JwtSvidError::MalformedAudienceClaim)
            })
            .collect(),
        Some(_) => Err(JwtSvidError::MalformedAudienceClaim),
    }
}

fn verify_signature(
    algorithm: JwtAlgorithm,
    key: &PKey<Public>,
    signing_input: &[u8],
    signature: &[u8],
) -> Result<(), JwtSvidError> {
    match algorithm.family() {
        AlgorithmFamily::Ec => {
            let ec_key = key.ec_key().map_err(JwtSvidError::KeyTypeMismatch)?;

            let digest = match algorithm {
                JwtAlgorithm::ES256 => sha::sha256(signing_input).to_vec(),
                JwtAlgorithm::ES384 => sha::sha384(signing_input).to_vec(),
                _ => sha::sha512(signing_input).to_vec(),
            };

            // JWS ECDSA signatures are the raw r || s concatenation, both
            // halves padded to the field width.
            if signature.is_empty() || signature.len() % 2 != 0 {
                return Err(JwtSvidError::InvalidSignature);
            }
            let (r, s) = signature.split_at(signature.len() / 2);
            let r = BigNum::from_slice(r).map_err(JwtSvidError::SignatureVerification)?;
            let s = BigNum::from_slice(s).map_err(JwtSvidError::SignatureVerification)?;
            let ecdsa_signature = EcdsaSig::from_private_components(r, s)
                .map_err(JwtSvidError::SignatureVerification)?;

            ecdsa_signature
                .verify(&digest, &ec_key)
                .map_err(JwtSvidError::SignatureVerification)?
                .then(|| ())
                .ok_or(JwtSvidError::InvalidSignature)
        }
        AlgorithmFamily::Rsa => {
            key.rsa().map_err(JwtSvidError::KeyTypeMismatch)?;

            let digest = match algorithm {
                JwtAlgorithm::RS256 | JwtAlgorithm::PS256 => MessageDigest::sha256(),
                JwtAlgorithm::RS384 | JwtAlgorithm::PS384 => MessageDigest::sha384(),
                _ => MessageDigest::sha512(),
            };

            let mut verifier =
                Verifier::new(digest, key).map_err(JwtSvidError::SignatureVerification)?;
            if matches!(
                algorithm,
                JwtAlgorithm::PS256 | JwtAlgorithm::PS384 | JwtAlgorithm::PS512
            ) {
                verifier
                    .set_rsa_padding(Padding::PKCS1_PSS)
                    .map_err(JwtSvidError::SignatureVerification)?;
                verifier
                    .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                    .map_err(JwtSvidError::SignatureVerification)?;
            }

            verifier
                .update(signing_input)
                .map_err(JwtSvidError::SignatureVerification)?;

            match verifier.verify(signature) {
                Ok(true) => Ok(()),
                _ => Err(JwtSvidError::InvalidSignature),
            }
        }
    }
}
