//! Cryptographic primitives for the AUSF.
//!
//! This crate implements the key derivation functions of 3GPP TS 33.501
//! Annex A that the AUSF performs itself, together with the EAP-AKA' layer
//! (RFC 5448 / RFC 9048): packet encoding, the PRF' key schedule and AT_MAC
//! computation.
//!
//! # Modules
//!
//! - [`kdf`] - K_SEAF and HXRES* derivation
//! - [`eap`] - EAP-AKA' packets, attributes and key material

pub mod eap;
pub mod kdf;

pub use eap::{
    calculate_at_mac, eap_aka_prime_prf, verify_at_mac, AkaPrimeSubtype, EapAkaPrimeKeys,
    EapCode, EapError, EapPacket,
};
pub use kdf::{kdf_hxres_star, kdf_kseaf};
