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

mod address;
mod backoff;
pub mod error;

pub use address::{default_socket_path, parse_socket_path, SocketAddress, ENDPOINT_SOCKET_ENV};
pub use backoff::BackoffPolicy;
