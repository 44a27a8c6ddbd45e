//! EAP-AKA' protocol layer
//!
//! Packet encoding/decoding, the PRF' key schedule and AT_MAC handling for
//! EAP-AKA' as used by the 5G AUSF:
//! - RFC 3748 (EAP packet framing)
//! - RFC 5448 / RFC 9048 (EAP-AKA', PRF' with HMAC-SHA-256)
//! - 3GPP TS 33.501 (EAP-AKA' as a 5G primary authentication method)

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// EAP method type number for EAP-AKA' (RFC 5448 section 8.2).
pub const EAP_TYPE_AKA_PRIME: u8 = 50;

/// AT_MAC value length in bytes (HMAC-SHA-256-128).
pub const AT_MAC_LEN: usize = 16;

// Attribute types (RFC 4187 section 11, reused by EAP-AKA').
pub const AT_RAND: u8 = 1;
pub const AT_AUTN: u8 = 2;
pub const AT_RES: u8 = 3;
pub const AT_AUTS: u8 = 4;
pub const AT_MAC: u8 = 11;
pub const AT_NOTIFICATION: u8 = 12;
pub const AT_IDENTITY: u8 = 14;
pub const AT_KDF_INPUT: u8 = 23;
pub const AT_KDF: u8 = 24;

/// AT_NOTIFICATION code "General failure" (S and P bits clear).
const NOTIFICATION_GENERAL_FAILURE: u16 = 0x4000;

/// AT_KDF value selecting the HMAC-SHA-256 KDF.
const KDF_HMAC_SHA256: u16 = 1;

/// EAP packet decode errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EapError {
    #[error("EAP packet too short")]
    TooShort,
    #[error("invalid EAP code: {0}")]
    InvalidCode(u8),
    #[error("unsupported EAP method type: {0}")]
    UnsupportedType(u8),
    #[error("invalid EAP-AKA' subtype: {0}")]
    InvalidSubtype(u8),
    #[error("truncated EAP-AKA' attribute")]
    TruncatedAttribute,
    #[error("missing EAP-AKA' attribute: {0}")]
    MissingAttribute(&'static str),
    #[error("malformed AT_RES value")]
    InvalidRes,
}

/// EAP packet code (RFC 3748 section 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EapCode {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
}

impl EapCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Success),
            4 => Some(Self::Failure),
            _ => None,
        }
    }
}

/// EAP-AKA' subtype (RFC 4187 section 11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AkaPrimeSubtype {
    Challenge = 1,
    AuthenticationReject = 2,
    SynchronizationFailure = 4,
    Identity = 5,
    Notification = 12,
    Reauthentication = 13,
    ClientError = 14,
}

impl AkaPrimeSubtype {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Challenge),
            2 => Some(Self::AuthenticationReject),
            4 => Some(Self::SynchronizationFailure),
            5 => Some(Self::Identity),
            12 => Some(Self::Notification),
            13 => Some(Self::Reauthentication),
            14 => Some(Self::ClientError),
            _ => None,
        }
    }
}

/// An EAP packet carrying EAP-AKA' data.
///
/// Attribute values are stored exactly as they appear on the wire after the
/// two-byte (type, length) header, reserved bytes included, so that
/// encode(decode(x)) reproduces x byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPacket {
    pub code: EapCode,
    pub identifier: u8,
    pub subtype: Option<AkaPrimeSubtype>,
    pub attributes: Vec<(u8, Vec<u8>)>,
}

impl EapPacket {
    /// Create an EAP-Success packet.
    pub fn new_success(identifier: u8) -> Self {
        Self {
            code: EapCode::Success,
            identifier,
            subtype: None,
            attributes: Vec::new(),
        }
    }

    /// Create an EAP-Failure packet.
    pub fn new_failure(identifier: u8) -> Self {
        Self {
            code: EapCode::Failure,
            identifier,
            subtype: None,
            attributes: Vec::new(),
        }
    }

    /// Create an EAP-Request/AKA'-Notification carrying "General failure".
    ///
    /// The identifier is the previous round's identifier plus one, as the
    /// notification opens a new request/response pair.
    pub fn new_failure_notification(prev_identifier: u8) -> Self {
        Self {
            code: EapCode::Request,
            identifier: prev_identifier.wrapping_add(1),
            subtype: Some(AkaPrimeSubtype::Notification),
            attributes: vec![(
                AT_NOTIFICATION,
                NOTIFICATION_GENERAL_FAILURE.to_be_bytes().to_vec(),
            )],
        }
    }

    /// Build an EAP-Request/AKA'-Challenge.
    ///
    /// The AT_MAC attribute is first encoded as all zeroes, the MAC is
    /// computed over the full packet with `k_aut`, and the attribute is then
    /// replaced with the real value (RFC 5448 section 10.1).
    pub fn new_aka_challenge(
        identifier: u8,
        rand: &[u8; 16],
        autn: &[u8; 16],
        kdf_input: &str,
        k_aut: &[u8],
    ) -> Self {
        let mut packet = Self {
            code: EapCode::Request,
            identifier,
            subtype: Some(AkaPrimeSubtype::Challenge),
            attributes: vec![
                (AT_RAND, reserved_prefixed(rand)),
                (AT_AUTN, reserved_prefixed(autn)),
                (AT_MAC, reserved_prefixed(&[0u8; AT_MAC_LEN])),
                (AT_KDF, KDF_HMAC_SHA256.to_be_bytes().to_vec()),
                (AT_KDF_INPUT, kdf_input_value(kdf_input)),
            ],
        };

        let mac = calculate_at_mac(k_aut, &packet.encode());
        packet.set_attribute(AT_MAC, reserved_prefixed(&mac));
        packet
    }

    /// Encode to wire format.
    pub fn encode(&self) -> Vec<u8> {
        match self.code {
            EapCode::Success | EapCode::Failure => {
                let mut buf = Vec::with_capacity(4);
                buf.push(self.code as u8);
                buf.push(self.identifier);
                buf.extend_from_slice(&4u16.to_be_bytes());
                buf
            }
            _ => {
                let mut data = Vec::new();
                for (attr_type, attr_data) in &self.attributes {
                    let attr_len = (attr_data.len() + 2).div_ceil(4) as u8;
                    data.push(*attr_type);
                    data.push(attr_len);
                    data.extend_from_slice(attr_data);
                    while data.len() % 4 != 0 {
                        data.push(0);
                    }
                }

                // Code(1) + Id(1) + Length(2) + Type(1) + Subtype(1) + Reserved(2)
                let total_len = 8 + data.len();
                let mut buf = Vec::with_capacity(total_len);
                buf.push(self.code as u8);
                buf.push(self.identifier);
                buf.extend_from_slice(&(total_len as u16).to_be_bytes());
                buf.push(EAP_TYPE_AKA_PRIME);
                buf.push(self.subtype.map(|s| s as u8).unwrap_or(0));
                buf.extend_from_slice(&[0u8; 2]);
                buf.extend_from_slice(&data);
                buf
            }
        }
    }

    /// Decode from wire format.
    pub fn decode(data: &[u8]) -> Result<Self, EapError> {
        if data.len() < 4 {
            return Err(EapError::TooShort);
        }

        let code = EapCode::from_u8(data[0]).ok_or(EapError::InvalidCode(data[0]))?;
        let identifier = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if length < 4 || data.len() < length {
            return Err(EapError::TooShort);
        }

        match code {
            EapCode::Success | EapCode::Failure => Ok(Self {
                code,
                identifier,
                subtype: None,
                attributes: Vec::new(),
            }),
            _ => {
                if length < 8 {
                    return Err(EapError::TooShort);
                }
                if data[4] != EAP_TYPE_AKA_PRIME {
                    return Err(EapError::UnsupportedType(data[4]));
                }
                let subtype =
                    AkaPrimeSubtype::from_u8(data[5]).ok_or(EapError::InvalidSubtype(data[5]))?;

                let mut attributes = Vec::new();
                let mut offset = 8;
                while offset + 2 <= length {
                    let attr_type = data[offset];
                    let attr_len = data[offset + 1] as usize * 4;
                    if attr_len == 0 || offset + attr_len > length {
                        return Err(EapError::TruncatedAttribute);
                    }
                    attributes.push((attr_type, data[offset + 2..offset + attr_len].to_vec()));
                    offset += attr_len;
                }

                Ok(Self {
                    code,
                    identifier,
                    subtype: Some(subtype),
                    attributes,
                })
            }
        }
    }

    /// Find an attribute value by type.
    pub fn find_attribute(&self, attr_type: u8) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|(t, _)| *t == attr_type)
            .map(|(_, data)| data.as_slice())
    }

    /// Replace an attribute value, keeping its position.
    pub fn set_attribute(&mut self, attr_type: u8, value: Vec<u8>) {
        if let Some(entry) = self.attributes.iter_mut().find(|(t, _)| *t == attr_type) {
            entry.1 = value;
        } else {
            self.attributes.push((attr_type, value));
        }
    }

    /// Extract the RES value from an AT_RES attribute.
    ///
    /// The first two value bytes carry the RES length in bits.
    pub fn res(&self) -> Result<Vec<u8>, EapError> {
        let data = self
            .find_attribute(AT_RES)
            .ok_or(EapError::MissingAttribute("AT_RES"))?;
        if data.len() < 2 {
            return Err(EapError::InvalidRes);
        }
        let res_bits = u16::from_be_bytes([data[0], data[1]]) as usize;
        let res_len = res_bits.div_ceil(8);
        if res_len == 0 || 2 + res_len > data.len() {
            return Err(EapError::InvalidRes);
        }
        Ok(data[2..2 + res_len].to_vec())
    }
}

/// Two reserved bytes followed by the value, the layout of AT_RAND, AT_AUTN
/// and AT_MAC.
fn reserved_prefixed(value: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 2 + value.len()];
    data[2..].copy_from_slice(value);
    data
}

/// AT_KDF_INPUT value: two-byte actual length, the network name, zero padding
/// so the whole attribute lands on a 4-octet boundary.
fn kdf_input_value(kdf_input: &str) -> Vec<u8> {
    let name = kdf_input.as_bytes();
    let mut data = Vec::with_capacity(2 + name.len() + 3);
    data.extend_from_slice(&(name.len() as u16).to_be_bytes());
    data.extend_from_slice(name);
    while data.len() % 4 != 2 {
        data.push(0);
    }
    data
}

/// Compute AT_MAC over an encoded EAP packet: HMAC-SHA-256-128 keyed by K_aut
/// (RFC 5448 section 10.1). The packet must carry a zeroed MAC field.
pub fn calculate_at_mac(k_aut: &[u8], eap_data: &[u8]) -> [u8; AT_MAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(k_aut).expect("HMAC can take key of any size");
    mac.update(eap_data);
    let result = mac.finalize().into_bytes();

    let mut value = [0u8; AT_MAC_LEN];
    value.copy_from_slice(&result[..AT_MAC_LEN]);
    value
}

/// Verify the AT_MAC of a received packet.
///
/// Re-encodes the packet with the MAC field zeroed and compares the computed
/// value against the received one.
pub fn verify_at_mac(k_aut: &[u8], packet: &EapPacket) -> bool {
    let received = match packet.find_attribute(AT_MAC) {
        Some(data) if data.len() >= 2 + AT_MAC_LEN => &data[2..2 + AT_MAC_LEN],
        _ => return false,
    };
    let received: [u8; AT_MAC_LEN] = match received.try_into() {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    let mut zeroed = packet.clone();
    zeroed.set_attribute(AT_MAC, reserved_prefixed(&[0u8; AT_MAC_LEN]));
    calculate_at_mac(k_aut, &zeroed.encode()) == received
}

/// Key material produced by the EAP-AKA' PRF' (RFC 5448 section 3.3).
#[derive(Clone)]
pub struct EapAkaPrimeKeys {
    pub k_encr: [u8; 16],
    pub k_aut: [u8; 32],
    pub k_re: [u8; 32],
    pub msk: [u8; 64],
    pub emsk: [u8; 64],
}

impl EapAkaPrimeKeys {
    /// K_AUSF for 5G is the first 32 bytes of the EMSK (TS 33.501 Annex F).
    pub fn k_ausf(&self) -> [u8; 32] {
        let mut k = [0u8; 32];
        k.copy_from_slice(&self.emsk[..32]);
        k
    }
}

/// EAP-AKA' PRF' key schedule (RFC 5448 section 3.4).
///
/// MK = PRF'(IK' || CK', "EAP-AKA'" || identity) where
/// T1 = HMAC-SHA-256(key, S || 0x01) and Tn = HMAC-SHA-256(key, Tn-1 || S || n);
/// MK is split into K_encr(16) K_aut(32) K_re(32) MSK(64) EMSK(64).
pub fn eap_aka_prime_prf(ik_prime: &[u8], ck_prime: &[u8], identity: &str) -> EapAkaPrimeKeys {
    let mut key = Vec::with_capacity(ik_prime.len() + ck_prime.len());
    key.extend_from_slice(ik_prime);
    key.extend_from_slice(ck_prime);

    let mut s = b"EAP-AKA'".to_vec();
    s.extend_from_slice(identity.as_bytes());

    const MK_LEN: usize = 208;
    let rounds = MK_LEN / 32 + 1;

    let mut mk = Vec::with_capacity(rounds * 32);
    let mut prev: Vec<u8> = Vec::new();
    for i in 0..rounds {
        let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC can take key of any size");
        mac.update(&prev);
        mac.update(&s);
        mac.update(&[(i + 1) as u8]);
        prev = mac.finalize().into_bytes().to_vec();
        mk.extend_from_slice(&prev);
    }

    let mut keys = EapAkaPrimeKeys {
        k_encr: [0u8; 16],
        k_aut: [0u8; 32],
        k_re: [0u8; 32],
        msk: [0u8; 64],
        emsk: [0u8; 64],
    };
    keys.k_encr.copy_from_slice(&mk[0..16]);
    keys.k_aut.copy_from_slice(&mk[16..48]);
    keys.k_re.copy_from_slice(&mk[48..80]);
    keys.msk.copy_from_slice(&mk[80..144]);
    keys.emsk.copy_from_slice(&mk[144..208]);
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    const SN_NAME: &str = "5G:mnc001.mcc001.3gppnetwork.org";

    #[test]
    fn test_success_failure_encode_decode() {
        let success = EapPacket::new_success(42);
        let encoded = success.encode();
        assert_eq!(encoded, vec![3, 42, 0, 4]);
        assert_eq!(EapPacket::decode(&encoded).unwrap(), success);

        let failure = EapPacket::new_failure(7);
        let encoded = failure.encode();
        assert_eq!(encoded, vec![4, 7, 0, 4]);
        assert_eq!(EapPacket::decode(&encoded).unwrap(), failure);
    }

    #[test]
    fn test_challenge_round_trip_is_byte_identical() {
        let rand = [0x11u8; 16];
        let autn = [0x22u8; 16];
        let k_aut = [0xAAu8; 32];

        let challenge = EapPacket::new_aka_challenge(10, &rand, &autn, SN_NAME, &k_aut);
        let encoded = challenge.encode();
        assert_eq!(encoded[0], 1); // Request
        assert_eq!(encoded[1], 10);
        assert_eq!(encoded[4], EAP_TYPE_AKA_PRIME);
        assert_eq!(encoded[5], AkaPrimeSubtype::Challenge as u8);
        assert_eq!(encoded.len() % 4, 0);

        let decoded = EapPacket::decode(&encoded).unwrap();
        assert_eq!(decoded.encode(), encoded);

        let at_rand = decoded.find_attribute(AT_RAND).unwrap();
        assert_eq!(&at_rand[2..18], &rand);
        let at_autn = decoded.find_attribute(AT_AUTN).unwrap();
        assert_eq!(&at_autn[2..18], &autn);
        assert!(decoded.find_attribute(AT_KDF).is_some());
        assert!(decoded.find_attribute(AT_KDF_INPUT).is_some());
    }

    #[test]
    fn test_challenge_mac_verifies() {
        let k_aut = [0x5Cu8; 32];
        let challenge =
            EapPacket::new_aka_challenge(3, &[0x10u8; 16], &[0x20u8; 16], SN_NAME, &k_aut);
        assert!(verify_at_mac(&k_aut, &challenge));
        assert!(!verify_at_mac(&[0u8; 32], &challenge));
    }

    #[test]
    fn test_verify_mac_rejects_tampered_packet() {
        let k_aut = [0x5Cu8; 32];
        let mut challenge =
            EapPacket::new_aka_challenge(3, &[0x10u8; 16], &[0x20u8; 16], SN_NAME, &k_aut);
        challenge.set_attribute(AT_RAND, reserved_prefixed(&[0xFFu8; 16]));
        assert!(!verify_at_mac(&k_aut, &challenge));
    }

    #[test]
    fn test_kdf_input_padding() {
        // Attribute value must end 2 bytes short of the 4-octet boundary so
        // the (type, length) header completes it.
        for name in ["ab", "abc", "abcd", "abcde", SN_NAME] {
            let value = kdf_input_value(name);
            assert_eq!(value.len() % 4, 2, "padding broken for {name}");
            let len = u16::from_be_bytes([value[0], value[1]]) as usize;
            assert_eq!(&value[2..2 + len], name.as_bytes());
        }
    }

    #[test]
    fn test_res_extraction() {
        let res = [0x30u8; 8];
        let mut value = Vec::new();
        value.extend_from_slice(&((res.len() * 8) as u16).to_be_bytes());
        value.extend_from_slice(&res);

        let packet = EapPacket {
            code: EapCode::Response,
            identifier: 1,
            subtype: Some(AkaPrimeSubtype::Challenge),
            attributes: vec![(AT_RES, value)],
        };
        assert_eq!(packet.res().unwrap(), res.to_vec());
    }

    #[test]
    fn test_res_extraction_rejects_short_value() {
        let packet = EapPacket {
            code: EapCode::Response,
            identifier: 1,
            subtype: Some(AkaPrimeSubtype::Challenge),
            attributes: vec![(AT_RES, vec![0x00, 0x40, 0x01])],
        };
        assert_eq!(packet.res(), Err(EapError::InvalidRes));
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(EapPacket::decode(&[1, 2]), Err(EapError::TooShort));
        assert_eq!(
            EapPacket::decode(&[9, 1, 0, 4]),
            Err(EapError::InvalidCode(9))
        );
        // EAP-TLS type is not accepted.
        assert_eq!(
            EapPacket::decode(&[2, 1, 0, 8, 13, 1, 0, 0]),
            Err(EapError::UnsupportedType(13))
        );
        // Zero-length attribute.
        assert_eq!(
            EapPacket::decode(&[2, 1, 0, 12, 50, 1, 0, 0, 3, 0, 0, 0]),
            Err(EapError::TruncatedAttribute)
        );
    }

    #[test]
    fn test_failure_notification_shape() {
        let noti = EapPacket::new_failure_notification(9);
        assert_eq!(noti.code, EapCode::Request);
        assert_eq!(noti.identifier, 10);
        assert_eq!(noti.subtype, Some(AkaPrimeSubtype::Notification));
        assert_eq!(noti.find_attribute(AT_NOTIFICATION).unwrap(), &[0x40, 0x00]);

        let decoded = EapPacket::decode(&noti.encode()).unwrap();
        assert_eq!(decoded, noti);
    }

    #[test]
    fn test_prf_key_schedule() {
        let ik_prime = [0x11u8; 16];
        let ck_prime = [0x22u8; 16];

        let keys = eap_aka_prime_prf(&ik_prime, &ck_prime, "imsi-001010000000001");
        let again = eap_aka_prime_prf(&ik_prime, &ck_prime, "imsi-001010000000001");
        assert_eq!(keys.k_aut, again.k_aut);
        assert_eq!(keys.emsk, again.emsk);
        assert_eq!(keys.k_ausf(), again.k_ausf());
        assert_eq!(keys.k_ausf().len(), 32);

        // Identity is mixed into every block.
        let other = eap_aka_prime_prf(&ik_prime, &ck_prime, "imsi-999999999999999");
        assert_ne!(keys.k_aut, other.k_aut);
        assert_ne!(keys.k_ausf(), other.k_ausf());

        // The schedule slices distinct regions of MK.
        assert_ne!(keys.k_aut[..16], keys.k_encr);
        assert_ne!(keys.msk[..32], keys.emsk[..32]);
    }
}
