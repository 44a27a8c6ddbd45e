//! NRF discovery with caching and subscription side effects
//!
//! Wraps the raw discovery search: when caching is enabled, results are
//! served from the NF discovery cache until they expire. A live search (never
//! a cache hit) additionally subscribes to status notifications for every
//! returned peer that is not yet in the subscription map.

use std::sync::Arc;
use std::time::Duration;

use ausf_sbi::cache::CacheKey;
use ausf_sbi::models::{
    nf_type, service_name, NfInstanceIdCond, NfProfile, NrfSubscriptionData, SearchResult,
};
use ausf_sbi::{SbiError, SbiResult};

use crate::consumer::nf_management::NrfClient;
use crate::context::AusfContext;

/// Fallback UDM endpoint when discovery yields nothing usable.
const DEFAULT_UDM_URL: &str = "https://localhost:29503";

fn cache_key(target_nf_type: &str, requester_nf_type: &str, service_names: &str) -> CacheKey {
    CacheKey::new(
        target_nf_type,
        format!("requester-nf-type={requester_nf_type}&service-names={service_names}"),
    )
}

/// Search for NF instances, through the cache when enabled.
///
/// On a live search every returned profile gets a status subscription if one
/// is not already held; subscription failures are logged and do not fail the
/// discovery. A 307 answer is processed the same way and then surfaced as
/// [`SbiError::TemporaryRedirect`].
pub async fn search_nf_instances(
    ctx: &Arc<AusfContext>,
    nrf: &dyn NrfClient,
    target_nf_type: &str,
    service_names: &str,
) -> SbiResult<SearchResult> {
    let requester = nf_type::AUSF;
    let key = cache_key(target_nf_type, requester, service_names);

    if let Some(cache) = ctx.discovery_cache() {
        if let Some(profiles) = cache.lookup(&key) {
            log::debug!(
                "discovery cache hit for {target_nf_type} ({} instances)",
                profiles.len()
            );
            return Ok(SearchResult {
                validity_period: 0,
                nf_instances: profiles,
            });
        }
    }

    let outcome = nrf
        .search_nf_instances(target_nf_type, requester, service_names)
        .await?;

    // Subscriptions are created from whatever body the NRF returned, a
    // redirect included; the redirect itself is reported afterwards.
    for profile in &outcome.result.nf_instances {
        ensure_subscription(ctx, nrf, profile).await;
    }

    if outcome.redirected {
        return Err(SbiError::TemporaryRedirect);
    }

    if let Some(cache) = ctx.discovery_cache() {
        if outcome.result.validity_period > 0 {
            cache.insert(
                key,
                outcome.result.nf_instances.clone(),
                Duration::from_secs(outcome.result.validity_period as u64),
            );
        }
    }

    Ok(outcome.result)
}

async fn ensure_subscription(ctx: &Arc<AusfContext>, nrf: &dyn NrfClient, profile: &NfProfile) {
    if ctx.has_subscription(&profile.nf_instance_id) {
        return;
    }

    let data = NrfSubscriptionData {
        nf_status_notification_uri: format!(
            "{}/nausf-callback/v1/nf-status-notify",
            ctx.ipv4_uri()
        ),
        subscr_cond: Some(NfInstanceIdCond {
            nf_instance_id: profile.nf_instance_id.clone(),
        }),
        req_nf_type: Some(nf_type::AUSF.to_string()),
        subscription_id: None,
    };

    match nrf.create_subscription(&data).await {
        Ok(created) => match created.subscription_id {
            Some(id) if !id.is_empty() => {
                log::debug!(
                    "subscribed to NF status of {} (subscription {id})",
                    profile.nf_instance_id
                );
                ctx.add_subscription(&profile.nf_instance_id, id);
            }
            _ => log::warn!(
                "NRF subscription for {} returned no subscription id",
                profile.nf_instance_id
            ),
        },
        Err(e) => log::error!(
            "create NF status subscription for {} failed: {e}",
            profile.nf_instance_id
        ),
    }
}

/// Resolve the UDM authentication endpoint: first discovered instance, first
/// `nudm-ueau` service. Falls back to a fixed local URL so the failure
/// surfaces on the UDM call itself.
pub async fn get_udm_url(ctx: &Arc<AusfContext>, nrf: &dyn NrfClient) -> String {
    let result =
        match search_nf_instances(ctx, nrf, nf_type::UDM, service_name::NUDM_UEAU).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("[search UDM ueau] {e}, using default UDM URL {DEFAULT_UDM_URL}");
                return DEFAULT_UDM_URL.to_string();
            }
        };

    let Some(udm) = result.nf_instances.first() else {
        log::error!("[search UDM ueau] no UDM instances found");
        return DEFAULT_UDM_URL.to_string();
    };

    let service = udm
        .nf_services
        .as_ref()
        .and_then(|services| {
            services
                .iter()
                .find(|s| s.service_name == service_name::NUDM_UEAU)
        });

    let Some(service) = service else {
        log::error!(
            "[search UDM ueau] instance {} offers no nudm-ueau service",
            udm.nf_instance_id
        );
        return DEFAULT_UDM_URL.to_string();
    };

    if let Some(endpoint) = service
        .ip_end_points
        .as_ref()
        .and_then(|eps| eps.first())
    {
        if let (Some(addr), Some(port)) = (&endpoint.ipv4_address, endpoint.port) {
            return format!("{}://{}:{}", service.scheme, addr, port);
        }
    }
    if let Some(prefix) = service.api_prefix.as_ref().filter(|p| !p.is_empty()) {
        return prefix.clone();
    }

    log::error!(
        "[search UDM ueau] instance {} has no usable endpoint",
        udm.nf_instance_id
    );
    DEFAULT_UDM_URL.to_string()
}
