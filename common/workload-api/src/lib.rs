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

// Checked-in code generated from the SPIFFE Workload API proto
// (spiffe/go-spiffe proto/spiffe/workload/workload.proto).
pub mod generated;

pub use generated::{
    spiffe_workload_api_client, spiffe_workload_api_server, JwtBundlesRequest, JwtBundlesResponse,
    Jwtsvid, JwtsvidRequest, JwtsvidResponse, ValidateJwtsvidRequest, ValidateJwtsvidResponse,
    X509svid, X509BundlesRequest, X509BundlesResponse, X509svidRequest, X509svidResponse,
};
