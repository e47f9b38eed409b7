// Copyright (c) Microsoft. All rights reserved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnsupportedAlgorithm;

/// Whitelist of JWT-SVID signature algorithms. Anything outside this set,
/// HMAC families in particular, is rejected before signature verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    ES256,
    ES384,
    ES512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlgorithmFamily {
    Ec,
    Rsa,
}

impl JwtAlgorithm {
    #[must_use]
    pub fn family(self) -> AlgorithmFamily {
        match self {
            JwtAlgorithm::ES256 | JwtAlgorithm::ES384 | JwtAlgorithm::ES512 => AlgorithmFamily::Ec,
            JwtAlgorithm::RS256
            | JwtAlgorithm::RS384
            | JwtAlgorithm::RS512
            | JwtAlgorithm::PS256
            | JwtAlgorithm::PS384
            | JwtAlgorithm::PS512 => AlgorithmFamily::Rsa,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JwtAlgorithm::ES256 => "ES256",
            JwtAlgorithm::ES384 => "ES384",
            JwtAlgorithm::ES512 => "ES512",
            JwtAlgorithm::RS256 => "RS256",
            JwtAlgorithm::RS384 => "RS384",
            JwtAlgorithm::RS512 => "RS512",
            JwtAlgorithm::PS256 => "PS256",
            JwtAlgorithm::PS384 => "PS384",
            JwtAlgorithm::PS512 => "PS512",
        }
    }
}

impl FromStr for JwtAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "ES256" => Ok(JwtAlgorithm::ES256),
            "ES384" => Ok(JwtAlgorithm::ES384),
            "ES512" => Ok(JwtAlgorithm::ES512),
            "RS256" => Ok(JwtAlgorithm::RS256),
            "RS384" => Ok(JwtAlgorithm::RS384),
            "RS512" => Ok(JwtAlgorithm::RS512),
            "PS256" => Ok(JwtAlgorithm::PS256),
            "PS384" => Ok(JwtAlgorithm::PS384),
            "PS512" => Ok(JwtAlgorithm::PS512),
            other => Err(UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for JwtAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_algorithms_round_trip() {
        for name in [
            "ES256", "ES384", "ES512", "RS256", "RS384", "RS512", "PS256", "PS384", "PS512",
        ] {
            let algorithm: JwtAlgorithm = name.parse().unwrap();
            assert_eq!(name, algorithm.as_str());
        }
    }

    #[test]
    fn families() {
        assert_eq!(
            AlgorithmFamily::Ec,
            "ES512".parse::<JwtAlgorithm>().unwrap().family()
        );
        assert_eq!(
            AlgorithmFamily::Rsa,
            "RS256".parse::<JwtAlgorithm>().unwrap().family()
        );
        assert_eq!(
            AlgorithmFamily::Rsa,
            "PS384".parse::<JwtAlgorithm>().unwrap().family()
        );
    }

    #[test]
    fn hmac_is_rejected_with_exact_message() {
        let error = "HS256".parse::<JwtAlgorithm>().unwrap_err();
        assert_eq!("Unsupported JWT algorithm: HS256", error.to_string());
    }

    #[test]
    fn none_is_rejected() {
        let error = "none".parse::<JwtAlgorithm>().unwrap_err();
        assert_eq!("Unsupported JWT algorithm: none", error.to_string());
    }
}
