//! AUSF context
//!
//! Process-wide state built once at startup and passed as `Arc` to every
//! operation that needs it: the self identity registered at the NRF, the
//! in-memory UE authentication contexts, the SUCI to SUPI bindings, the peer
//! status subscriptions and the discovery cache handle. Nothing here
//! survives a restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use regex::Regex;
use uuid::Uuid;

use ausf_sbi::cache::NfDiscoveryCache;
use ausf_sbi::models::{AuthResult, PlmnId};

use crate::config::AusfConfig;

/// Serving network name pattern (TS 24.501).
const SERVING_NETWORK_PATTERN: &str = r"^5G:mnc[0-9]{3}\.mcc[0-9]{3}\.3gppnetwork\.org$";

/// Per-UE authentication state, keyed by SUPI. Hex string fields carry the
/// wire encoding of the corresponding key material.
#[derive(Debug, Clone, Default)]
pub struct AusfUeContext {
    pub supi: String,
    pub serving_network_name: String,
    pub auth_status: Option<AuthResult>,
    pub udm_ueau_url: String,
    pub kausf: String,
    pub kseaf: String,
    /// RAND delivered in the challenge, retained for resynchronization.
    pub rand: String,
    // 5G-AKA
    pub xres_star: String,
    // EAP-AKA'
    pub k_aut: String,
    pub xres: String,
}

impl AusfUeContext {
    pub fn new(supi: impl Into<String>) -> Self {
        Self {
            supi: supi.into(),
            ..Default::default()
        }
    }
}

/// Process-wide AUSF state.
pub struct AusfContext {
    nf_id: RwLock<String>,
    pub group_id: String,
    pub register_ipv4: String,
    pub binding_ipv4: String,
    pub sbi_port: u16,
    pub uri_scheme: String,
    pub nrf_uri: String,
    pub webui_uri: String,
    pub tls_pem: Option<String>,
    pub tls_key: Option<String>,
    pub enable_nrf_caching: bool,
    pub nrf_cache_eviction_interval: Duration,

    sn_regex: Regex,
    ue_pool: RwLock<HashMap<String, AusfUeContext>>,
    suci_supi_map: RwLock<HashMap<String, String>>,
    nf_status_subscriptions: RwLock<HashMap<String, String>>,
    plmn_list: RwLock<Vec<PlmnId>>,
    cache: Option<Arc<NfDiscoveryCache>>,
}

impl AusfContext {
    /// Build the context from a validated configuration. The instance id is
    /// a fresh UUID until the NRF assigns one on registration.
    pub fn new(config: &AusfConfig) -> Arc<Self> {
        let sn_regex = Regex::new(SERVING_NETWORK_PATTERN).expect("serving network pattern");
        let cache = config
            .configuration
            .enable_nrf_caching
            .then(|| Arc::new(NfDiscoveryCache::new()));

        let tls = config
            .configuration
            .sbi
            .as_ref()
            .and_then(|sbi| sbi.tls.clone());

        Arc::new(Self {
            nf_id: RwLock::new(Uuid::new_v4().to_string()),
            group_id: config.configuration.group_id.clone(),
            register_ipv4: config.register_ipv4().to_string(),
            binding_ipv4: config.binding_ipv4(),
            sbi_port: config.sbi_port(),
            uri_scheme: config.sbi_scheme().to_string(),
            nrf_uri: config.configuration.nrf_uri.clone(),
            webui_uri: config.configuration.webui_uri.clone(),
            tls_pem: tls.as_ref().map(|t| t.pem.clone()).filter(|p| !p.is_empty()),
            tls_key: tls.as_ref().map(|t| t.key.clone()).filter(|k| !k.is_empty()),
            enable_nrf_caching: config.configuration.enable_nrf_caching,
            nrf_cache_eviction_interval: Duration::from_secs(
                config.nrf_cache_eviction_interval(),
            ),
            sn_regex,
            ue_pool: RwLock::new(HashMap::new()),
            suci_supi_map: RwLock::new(HashMap::new()),
            nf_status_subscriptions: RwLock::new(HashMap::new()),
            plmn_list: RwLock::new(config.configuration.plmn_support_list.clone()),
            cache,
        })
    }

    /// The NF instance id currently registered (or about to be).
    pub fn nf_id(&self) -> String {
        self.nf_id.read().expect("nf_id lock poisoned").clone()
    }

    /// Adopt the instance id assigned by the NRF on a 201.
    pub fn set_nf_id(&self, nf_id: impl Into<String>) {
        *self.nf_id.write().expect("nf_id lock poisoned") = nf_id.into();
    }

    /// Own SBI base URI as advertised to peers.
    pub fn ipv4_uri(&self) -> String {
        format!(
            "{}://{}:{}",
            self.uri_scheme, self.register_ipv4, self.sbi_port
        )
    }

    pub fn is_serving_network_authorized(&self, lookup: &str) -> bool {
        self.sn_regex.is_match(lookup)
    }

    pub fn discovery_cache(&self) -> Option<Arc<NfDiscoveryCache>> {
        self.cache.clone()
    }

    // UE pool

    /// Insert a UE context, replacing any prior attempt for the same SUPI.
    pub fn add_ue_context(&self, ue: AusfUeContext) {
        self.ue_pool
            .write()
            .expect("ue pool lock poisoned")
            .insert(ue.supi.clone(), ue);
    }

    pub fn ue_context_exists(&self, supi: &str) -> bool {
        self.ue_pool
            .read()
            .expect("ue pool lock poisoned")
            .contains_key(supi)
    }

    pub fn get_ue_context(&self, supi: &str) -> Option<AusfUeContext> {
        self.ue_pool
            .read()
            .expect("ue pool lock poisoned")
            .get(supi)
            .cloned()
    }

    /// Mutate a UE context in place under the pool lock.
    pub fn with_ue_context_mut<F, R>(&self, supi: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut AusfUeContext) -> R,
    {
        self.ue_pool
            .write()
            .expect("ue pool lock poisoned")
            .get_mut(supi)
            .map(f)
    }

    pub fn remove_ue_context(&self, supi: &str) -> Option<AusfUeContext> {
        self.ue_pool
            .write()
            .expect("ue pool lock poisoned")
            .remove(supi)
    }

    // SUCI to SUPI bindings

    pub fn add_suci_supi_pair(&self, supi_or_suci: impl Into<String>, supi: impl Into<String>) {
        self.suci_supi_map
            .write()
            .expect("suci map lock poisoned")
            .insert(supi_or_suci.into(), supi.into());
    }

    pub fn suci_supi_pair_exists(&self, supi_or_suci: &str) -> bool {
        self.suci_supi_map
            .read()
            .expect("suci map lock poisoned")
            .contains_key(supi_or_suci)
    }

    pub fn supi_from_suci(&self, supi_or_suci: &str) -> Option<String> {
        self.suci_supi_map
            .read()
            .expect("suci map lock poisoned")
            .get(supi_or_suci)
            .cloned()
    }

    pub fn remove_suci_supi_pair(&self, supi_or_suci: &str) -> Option<String> {
        self.suci_supi_map
            .write()
            .expect("suci map lock poisoned")
            .remove(supi_or_suci)
    }

    // Peer status subscriptions

    pub fn add_subscription(&self, nf_instance_id: impl Into<String>, subscription_id: impl Into<String>) {
        self.nf_status_subscriptions
            .write()
            .expect("subscription map lock poisoned")
            .insert(nf_instance_id.into(), subscription_id.into());
    }

    pub fn has_subscription(&self, nf_instance_id: &str) -> bool {
        self.nf_status_subscriptions
            .read()
            .expect("subscription map lock poisoned")
            .contains_key(nf_instance_id)
    }

    pub fn subscription_id(&self, nf_instance_id: &str) -> Option<String> {
        self.nf_status_subscriptions
            .read()
            .expect("subscription map lock poisoned")
            .get(nf_instance_id)
            .cloned()
    }

    pub fn remove_subscription(&self, nf_instance_id: &str) -> Option<String> {
        self.nf_status_subscriptions
            .write()
            .expect("subscription map lock poisoned")
            .remove(nf_instance_id)
    }

    // PLMN snapshot

    pub fn plmn_list(&self) -> Vec<PlmnId> {
        self.plmn_list.read().expect("plmn lock poisoned").clone()
    }

    pub fn set_plmn_list(&self, plmns: Vec<PlmnId>) {
        *self.plmn_list.write().expect("plmn lock poisoned") = plmns;
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> Arc<AusfContext> {
    let yaml = r#"
info:
  version: 1.0.0
configuration:
  sbi:
    scheme: http
    registerIPv4: 127.0.0.9
    bindingIPv4: 0.0.0.0
    port: 8000
  nrfUri: http://nrf:29510
  webuiUri: http://webui:5001
  groupId: ausfGroup001
  enableNrfCaching: true
"#;
    let config = AusfConfig::from_yaml(yaml).expect("test config");
    AusfContext::new(&config)
}
