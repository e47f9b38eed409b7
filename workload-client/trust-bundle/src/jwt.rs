// Copyright (c) Microsoft. All rights reserved.

use std::collections::HashMap;
use std::fmt;

use core_objects::{Crv, JWKSet, KeyUse, Kty, TrustDomain, JWK};
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Public};
use openssl::rsa::Rsa;

use crate::error::Error;
use crate::Bundle;

/// JWT authorities trusted for one trust domain, keyed by key id.
#[derive(Clone)]
pub struct JwtBundle {
    trust_domain: TrustDomain,
    keys: HashMap<String, PKey<Public>>,
}

impl JwtBundle {
    #[must_use]
    pub fn new(trust_domain: TrustDomain) -> Self {
        JwtBundle {
            trust_domain,
            keys: HashMap::new(),
        }
    }

    /// Builds a bundle from a trust domain JWKS document, the form the
    /// Workload API delivers JWT bundles in. Entries marked for X.509 use
    /// are skipped; every JWT entry must carry a key id.
    pub fn from_jwks_document(trust_domain: TrustDomain, document: &[u8]) -> Result<Self, Error> {
        let jwk_set: JWKSet = serde_json::from_slice(document).map_err(Error::DeserializeJwks)?;

        let mut bundle = JwtBundle::new(trust_domain);
        for jwk in &jwk_set.keys {
            if jwk.key_use == Some(KeyUse::X509Svid) {
                continue;
            }

            let kid = jwk.kid.as_deref().ok_or(Error::MissingKeyId)?;
            let key = public_key_from_jwk(jwk)?;
            bundle.add_authority(kid, key)?;
        }

        Ok(bundle)
    }

    pub fn add_authority(&mut self, kid: &str, key: PKey<Public>) -> Result<(), Error> {
        if kid.is_empty() {
            return Err(Error::MissingKeyId);
        }

        self.keys.insert(kid.to_string(), key);
        Ok(())
    }

    /// Looks up a JWT authority by exact key id match.
    pub fn find_key(&self, kid: &str) -> Result<&PKey<Public>, Error> {
        self.keys
            .get(kid)
            .ok_or_else(|| Error::AuthorityNotFound(kid.to_string()))
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Bundle for JwtBundle {
    fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }
}

impl fmt::Debug for JwtBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtBundle")
            .field("trust_domain", &self.trust_domain)
            .field("key_ids", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn public_key_from_jwk(jwk: &JWK) -> Result<PKey<Public>, Error> {
    match jwk.kty {
        Kty::EC => {
            let crv = jwk.crv.ok_or(Error::MissingKeyParameter("crv"))?;
            let nid = match crv {
                Crv::P256 => Nid::X9_62_PRIME256V1,
                Crv::P384 => Nid::SECP384R1,
                Crv::P521 => Nid::SECP521R1,
            };
            let group = EcGroup::from_curve_name(nid).map_err(Error::KeyFromJwk)?;

            let x = decode_key_parameter(jwk.x.as_deref(), "x")?;
            let y = decode_key_parameter(jwk.y.as_deref(), "y")?;

            let key = EcKey::from_public_key_affine_coordinates(&group, &x, &y)
                .map_err(Error::KeyFromJwk)?;
            PKey::from_ec_key(key).map_err(Error::KeyFromJwk)
        }
        Kty::RSA => {
            let n = decode_key_parameter(jwk.n.as_deref(), "n")?;
            let e = decode_key_parameter(jwk.e.as_deref(), "e")?;

            let key = Rsa::from_public_components(n, e).map_err(Error::KeyFromJwk)?;
            PKey::from_rsa(key).map_err(Error::KeyFromJwk)
        }
    }
}

fn decode_key_parameter(value: Option<&str>, name: &'static str) -> Result<BigNum, Error> {
    let value = value.ok_or(Error::MissingKeyParameter(name))?;
    let bytes = base64::decode_config(value, base64::URL_SAFE_NO_PAD)
        .map_err(Error::DecodeKeyParameter)?;

    BigNum::from_slice(&bytes).map_err(Error::KeyFromJwk)
}
