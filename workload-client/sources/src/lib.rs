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

pub mod cached_jwt_source;
pub mod error;
pub mod jwt_source;
pub mod x509_source;

use std::time::Duration;

use log::warn;

pub use cached_jwt_source::CachedJwtSource;
pub use jwt_source::{JwtSource, JwtSourceOptions};
pub use x509_source::{SvidPicker, X509Source, X509SourceOptions};

/// Environment override for the X.509 source bootstrap timeout, in seconds.
pub const X509_SOURCE_TIMEOUT_ENV: &str = "SPIFFE_NEW_X509_SOURCE_TIMEOUT";
/// Environment override for the JWT source bootstrap timeout, in seconds.
pub const JWT_SOURCE_TIMEOUT_ENV: &str = "SPIFFE_NEW_JWT_SOURCE_TIMEOUT";

const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);

/// Explicit option first, then the environment, then the default. A zero
/// duration waits forever.
pub(crate) fn resolve_timeout(timeout: Option<Duration>, env_var: &str) -> Duration {
    if let Some(timeout) = timeout {
        return timeout;
    }

    if let Ok(value) = std::env::var(env_var) {
        match value.parse::<u64>() {
            Ok(seconds) => return Duration::from_secs(seconds),
            Err(_) => warn!("Ignoring non-numeric {env_var}: {value}"),
        }
    }

    DEFAULT_BOOTSTRAP_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_timeout_wins() {
        assert_eq!(
            Duration::from_secs(5),
            resolve_timeout(Some(Duration::from_secs(5)), "UNSET_TIMEOUT_VAR")
        );
    }

    #[test]
    fn default_timeout_applies_without_option_or_environment() {
        assert_eq!(
            DEFAULT_BOOTSTRAP_TIMEOUT,
            resolve_timeout(None, "UNSET_TIMEOUT_VAR")
        );
    }
}
