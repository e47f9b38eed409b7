// Copyright (c) Microsoft. All rights reserved.

use std::fmt;

use crate::error::SpiffeIdError;

const SPIFFE_SCHEME: &str = "spiffe";

/// Administrative boundary of an identity: the authority portion of a
/// SPIFFE ID. Always lowercase, never carries a scheme, path or port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrustDomain {
    name: String,
}

impl TrustDomain {
    pub fn new(name: &str) -> Result<Self, SpiffeIdError> {
        if name.is_empty() {
            return Err(SpiffeIdError::EmptyTrustDomain);
        }

        for character in name.chars() {
            if !matches!(character, 'a'..='z' | '0'..='9' | '.' | '-' | '_') {
                return Err(SpiffeIdError::InvalidTrustDomainCharacter(character));
            }
        }

        Ok(TrustDomain {
            name: name.to_string(),
        })
    }

    /// Accepts either a bare trust domain name or a full `spiffe://` URI,
    /// the form the Workload API uses to key federated bundle maps.
    pub fn parse(input: &str) -> Result<Self, SpiffeIdError> {
        if input.contains("://") {
            Ok(SpiffeId::parse(input)?.trust_domain().clone())
        } else {
            TrustDomain::new(input)
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TrustDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A workload identity parsed from `spiffe://<trust-domain>[/<path>]`.
/// `Display` reproduces the canonical URI bit-exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpiffeId {
    trust_domain: TrustDomain,
    path: String,
}

impl SpiffeId {
    pub fn parse(id: &str) -> Result<Self, SpiffeIdError> {
        let (scheme, rest) = id
            .split_once("://")
            .ok_or_else(|| SpiffeIdError::Malformed(id.to_string()))?;

        if scheme != SPIFFE_SCHEME {
            return Err(SpiffeIdError::WrongScheme(scheme.to_string()));
        }

        let (authority, path) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, ""),
        };

        let trust_domain = TrustDomain::new(authority)?;
        validate_path(path)?;

        Ok(SpiffeId {
            trust_domain,
            path: path.to_string(),
        })
    }

    pub fn new(trust_domain: TrustDomain, path: &str) -> Result<Self, SpiffeIdError> {
        validate_path(path)?;

        Ok(SpiffeId {
            trust_domain,
            path: path.to_string(),
        })
    }

    #[must_use]
    pub fn trust_domain(&self) -> &TrustDomain {
        &self.trust_domain
    }

    /// Empty, or begins with `/`. Segments are compared byte-wise.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_member_of(&self, trust_domain: &TrustDomain) -> bool {
        &self.trust_domain == trust_domain
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", SPIFFE_SCHEME, self.trust_domain, self.path)
    }
}

fn validate_path(path: &str) -> Result<(), SpiffeIdError> {
    if path.is_empty() {
        return Ok(());
    }

    for segment in path[1..].split('/') {
        if segment.is_empty() {
            return Err(SpiffeIdError::EmptyPathSegment);
        }

        if segment == "." || segment == ".." {
            return Err(SpiffeIdError::RelativePathSegment);
        }

        for character in segment.chars() {
            if !matches!(character, 'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_') {
                return Err(SpiffeIdError::InvalidPathCharacter(character));
            }
        }
    }

    Ok(())
}
