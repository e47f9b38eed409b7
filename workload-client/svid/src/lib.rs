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

pub use error::{JwtSvidError, X509SvidError};
pub use jwt::JwtSvid;
pub use x509::X509Svid;
