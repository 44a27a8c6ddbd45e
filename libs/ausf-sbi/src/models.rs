//! 3GPP OpenAPI models
//!
//! JSON models exchanged over the SBI, limited to what the AUSF produces and
//! consumes: TS 29.509 (Nausf_UEAuthentication), TS 29.510 (Nnrf_NFManagement
//! and Nnrf_NFDiscovery) and TS 29.503 (Nudm_UEAuthentication). Field names
//! follow the 3GPP camelCase wire format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// NF type strings (TS 29.510).
pub mod nf_type {
    pub const AUSF: &str = "AUSF";
    pub const UDM: &str = "UDM";
    pub const NRF: &str = "NRF";
    pub const AMF: &str = "AMF";
}

/// Service names offered or consumed by the AUSF.
pub mod service_name {
    pub const NAUSF_AUTH: &str = "nausf-auth";
    pub const NUDM_UEAU: &str = "nudm-ueau";
}

/// NF status notification event for a deregistered peer.
pub const NOTIFICATION_EVENT_DEREGISTERED: &str = "NF_DEREGISTERED";

/// A PLMN identity: (MCC, MNC) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlmnId {
    pub mcc: String,
    pub mnc: String,
}

impl PlmnId {
    pub fn new(mcc: impl Into<String>, mnc: impl Into<String>) -> Self {
        Self {
            mcc: mcc.into(),
            mnc: mnc.into(),
        }
    }
}

/// AUSF-specific profile information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AusfInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfServiceVersion {
    pub api_version_in_uri: String,
    pub api_full_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpEndPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfService {
    pub service_instance_id: String,
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<NfServiceVersion>,
    pub scheme: String,
    pub nf_service_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_end_points: Option<Vec<IpEndPoint>>,
}

/// NF profile registered with or discovered from the NRF (TS 29.510).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfProfile {
    pub nf_instance_id: String,
    pub nf_type: String,
    pub nf_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_beat_timer: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv4_addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plmn_list: Option<Vec<PlmnId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nf_services: Option<Vec<NfService>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ausf_info: Option<AusfInfo>,
}

/// Result of an NRF discovery search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(default)]
    pub validity_period: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nf_instances: Vec<NfProfile>,
}

/// Subscription condition on a single NF instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfInstanceIdCond {
    pub nf_instance_id: String,
}

/// NRF status-change subscription (TS 29.510).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NrfSubscriptionData {
    pub nf_status_notification_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscr_cond: Option<NfInstanceIdCond>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_nf_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

/// NF status notification delivered by the NRF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub nf_instance_uri: String,
}

/// JSON Patch item used by the NF heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchItem {
    pub op: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl PatchItem {
    /// The heartbeat patch: replace `/nfStatus` with `REGISTERED`.
    pub fn nf_status_registered() -> Self {
        Self {
            op: "replace".to_string(),
            path: "/nfStatus".to_string(),
            value: Some(serde_json::Value::String("REGISTERED".to_string())),
        }
    }
}

/// Authentication method selected by UDM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    #[serde(rename = "5G_AKA")]
    FiveGAka,
    #[serde(rename = "EAP_AKA_PRIME")]
    EapAkaPrime,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FiveGAka => "5G_AKA",
            Self::EapAkaPrime => "EAP_AKA_PRIME",
        }
    }
}

/// Authentication outcome as reported to the AMF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthResult {
    #[serde(rename = "AUTHENTICATION_SUCCESS")]
    Success,
    #[serde(rename = "AUTHENTICATION_FAILURE")]
    Failure,
    #[serde(rename = "AUTHENTICATION_ONGOING")]
    Ongoing,
}

/// Resynchronization token presented by the UE (AUTS plus the prior RAND).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResynchronizationInfo {
    #[serde(default)]
    pub rand: String,
    #[serde(default)]
    pub auts: String,
}

/// Body of `POST /nausf-auth/v1/ue-authentications` (TS 29.509).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationInfo {
    pub supi_or_suci: String,
    pub serving_network_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resynchronization_info: Option<ResynchronizationInfo>,
}

/// Request forwarded to UDM generate-auth-data (TS 29.503).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationInfoRequest {
    pub serving_network_name: String,
    pub ausf_instance_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resynchronization_info: Option<ResynchronizationInfo>,
}

/// Authentication vector returned by UDM. Hex-encoded fields; the populated
/// subset depends on the selected method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationVector {
    #[serde(default)]
    pub rand: String,
    #[serde(default)]
    pub autn: String,
    // 5G-AKA
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub xres_star: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kausf: String,
    // EAP-AKA'
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ck_prime: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ik_prime: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub xres: String,
}

/// Response of UDM generate-auth-data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationInfoResult {
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub supi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_vector: Option<AuthenticationVector>,
}

/// Authentication outcome reported to UDM auth-events (TS 29.503).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    pub nf_instance_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,
    pub auth_type: AuthType,
    pub serving_network_name: String,
}

/// 5G-AKA challenge material inside `UeAuthenticationCtx`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Av5gAka {
    pub rand: String,
    pub hxres_star: String,
    pub autn: String,
}

/// Either a 5G-AKA vector or a base64 EAP payload, depending on the method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Av5gAuthData {
    Av5gAka(Av5gAka),
    EapPayload(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinksValueSchema {
    pub href: String,
}

/// Body of the 201 response to `POST /ue-authentications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UeAuthenticationCtx {
    pub auth_type: AuthType,
    #[serde(rename = "5gAuthData")]
    pub var5g_auth_data: Av5gAuthData,
    #[serde(rename = "_links")]
    pub links: HashMap<String, LinksValueSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_network_name: Option<String>,
}

/// Body of the 5G-AKA confirmation PUT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationData {
    #[serde(default)]
    pub res_star: String,
}

/// Response to the 5G-AKA confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationDataResponse {
    pub auth_result: AuthResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kseaf: Option<String>,
}

/// EAP session body, both directions of the eap-session PUT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EapSession {
    #[serde(default)]
    pub eap_payload: String,
    #[serde(rename = "kSeaf", skip_serializing_if = "Option::is_none")]
    pub k_seaf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_result: Option<AuthResult>,
}
