//! SBI (Service Based Interface) plumbing for the AUSF.
//!
//! HTTP/2 client and server over hyper, the 3GPP JSON models the AUSF
//! exchanges with NRF, UDM and AMF, and the NF discovery cache.
//!
//! # Modules
//!
//! - [`message`] - SBI request/response structures and problem responses
//! - [`models`] - 3GPP TS 29.509 / 29.510 / 29.503 JSON models
//! - [`client`] - HTTP client (HTTP/2 for SBI peers, HTTP/1.1 optional)
//! - [`server`] - HTTP/2 server
//! - [`cache`] - NF discovery cache with TTL eviction
//! - [`tls`] - rustls configuration and certificate loading
//! - [`error`] - Error types

pub mod cache;
pub mod client;
pub mod error;
pub mod message;
pub mod models;
pub mod server;
pub mod tls;

pub use cache::NfDiscoveryCache;
pub use client::{SbiClient, SbiClientConfig};
pub use error::{SbiError, SbiResult};
pub use message::{
    send_bad_request, send_error, send_forbidden, send_internal_error, send_method_not_allowed,
    send_not_found, ProblemDetails, SbiHeader, SbiHttpMessage, SbiRequest, SbiResponse,
};
pub use server::{SbiRequestHandler, SbiServer, SbiServerConfig};
