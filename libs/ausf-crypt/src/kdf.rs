//! Key derivation functions
//!
//! Implements the generic KDF of 3GPP TS 33.220 clause B.2.0 and the
//! TS 33.501 Annex A derivations performed at the AUSF.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 digest size in bytes.
pub const SHA256_DIGEST_SIZE: usize = 32;
/// RAND length in bytes.
pub const RAND_LEN: usize = 16;
/// XRES* / HXRES* length in bytes.
pub const RES_STAR_LEN: usize = 16;

/// FC value for Kseaf derivation (TS 33.501 Annex A.6).
const FC_FOR_KSEAF_DERIVATION: u8 = 0x6C;

/// Common KDF as defined in TS 33.220 clause B.2.0.
///
/// S = FC || P0 || L0 || P1 || L1 || ... with the lengths encoded as
/// two-byte big-endian values; the output is HMAC-SHA-256(key, S).
fn kdf_common(key: &[u8], fc: u8, params: &[&[u8]]) -> [u8; SHA256_DIGEST_SIZE] {
    let mut s = Vec::with_capacity(1 + params.iter().map(|p| p.len() + 2).sum::<usize>());
    s.push(fc);
    for param in params {
        s.extend_from_slice(param);
        s.extend_from_slice(&(param.len() as u16).to_be_bytes());
    }

    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(&s);
    let result = mac.finalize();

    let mut output = [0u8; SHA256_DIGEST_SIZE];
    output.copy_from_slice(&result.into_bytes());
    output
}

/// TS 33.501 Annex A.6: Kseaf derivation.
///
/// Kseaf = KDF(Kausf, FC=0x6C, P0=serving network name, L0=len(P0)).
pub fn kdf_kseaf(serving_network_name: &str, kausf: &[u8]) -> [u8; SHA256_DIGEST_SIZE] {
    kdf_common(
        kausf,
        FC_FOR_KSEAF_DERIVATION,
        &[serving_network_name.as_bytes()],
    )
}

/// TS 33.501 Annex A.5: HXRES* derivation.
///
/// HXRES* = SHA-256(RAND || XRES*)[16..32].
pub fn kdf_hxres_star(rand: &[u8; RAND_LEN], xres_star: &[u8; RES_STAR_LEN]) -> [u8; RES_STAR_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(rand);
    hasher.update(xres_star);
    let digest = hasher.finalize();

    let mut hxres_star = [0u8; RES_STAR_LEN];
    hxres_star.copy_from_slice(&digest[RES_STAR_LEN..]);
    hxres_star
}
