//! AUSF (Authentication Server Function)
//!
//! The AUSF authenticates UEs on behalf of the serving network:
//! - runs the 5G-AKA and EAP-AKA' procedures against the UE
//! - obtains authentication vectors from UDM and reports outcomes back
//! - registers itself with the NRF and keeps the registration alive
//! - discovers peers through the NRF, with optional result caching
//! - tracks the desired PLMN configuration published by the webconsole

pub mod config;
pub mod consumer;
pub mod context;
pub mod metrics;
pub mod polling;
pub mod producer;
pub mod registration;
pub mod sbi;
