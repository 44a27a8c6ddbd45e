//! NF status notification callback
//!
//! Handles `POST /nausf-callback/v1/nf-status-notify` from the NRF. A peer
//! deregistration invalidates its cached profiles and tears down the status
//! subscription held for it.

use std::sync::Arc;

use ausf_sbi::models::{NotificationData, NOTIFICATION_EVENT_DEREGISTERED};
use ausf_sbi::ProblemDetails;

use crate::consumer::NrfClient;
use crate::context::AusfContext;

/// Process a status notification. Returns `None` for 204, a problem for 400.
pub async fn nf_subscription_status_notify(
    ctx: &Arc<AusfContext>,
    nrf: &dyn NrfClient,
    notification: NotificationData,
) -> Option<ProblemDetails> {
    log::debug!("NF status notification: {notification:?}");

    if notification.event.is_empty() || notification.nf_instance_uri.is_empty() {
        return Some(
            ProblemDetails::new(400, "MANDATORY_IE_MISSING")
                .with_detail("Missing IE [Event]/[NfInstanceUri] in NotificationData"),
        );
    }

    let nf_instance_id = notification
        .nf_instance_uri
        .rsplit('/')
        .next()
        .unwrap_or(&notification.nf_instance_uri)
        .to_string();

    log::info!(
        "NF status notification from NRF: {} for {nf_instance_id}",
        notification.event
    );

    if notification.event != NOTIFICATION_EVENT_DEREGISTERED {
        return None;
    }

    // Drop the cached profile first so the next discovery goes back to the
    // NRF for a fresh view of the peer.
    if let Some(cache) = ctx.discovery_cache() {
        let removed = cache.remove_nf_instance(&nf_instance_id);
        log::debug!("NF instance {nf_instance_id} removed from cache: {removed}");
    }

    match ctx.subscription_id(&nf_instance_id) {
        Some(subscription_id) => {
            log::debug!("subscription of {nf_instance_id} is {subscription_id}");
            match nrf.remove_subscription(&subscription_id).await {
                Ok(()) => {
                    log::info!("removed NF status subscription {subscription_id}");
                    ctx.remove_subscription(&nf_instance_id);
                }
                Err(e) => log::error!("remove NF status subscription failed: {e}"),
            }
        }
        None => log::info!("NF instance {nf_instance_id} not found in subscription map"),
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::nf_management::{NfRegistrationOutcome, SearchOutcome};
    use crate::context::test_context;
    use async_trait::async_trait;
    use ausf_sbi::cache::CacheKey;
    use ausf_sbi::models::{NfProfile, NrfSubscriptionData, PatchItem, SearchResult};
    use ausf_sbi::{SbiError, SbiResult};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockNrf {
        remove_calls: AtomicUsize,
        removed_ids: Mutex<Vec<String>>,
        fail_remove: AtomicBool,
    }

    #[async_trait]
    impl NrfClient for MockNrf {
        async fn register_nf_instance(
            &self,
            _id: &str,
            profile: &NfProfile,
        ) -> SbiResult<NfRegistrationOutcome> {
            Ok(NfRegistrationOutcome::Updated(profile.clone()))
        }
        async fn update_nf_instance(
            &self,
            _id: &str,
            _patch: &[PatchItem],
        ) -> SbiResult<(Option<NfProfile>, Option<ProblemDetails>)> {
            Ok((None, None))
        }
        async fn deregister_nf_instance(&self, _id: &str) -> SbiResult<()> {
            Ok(())
        }
        async fn search_nf_instances(
            &self,
            _target: &str,
            _requester: &str,
            _services: &str,
        ) -> SbiResult<SearchOutcome> {
            Ok(SearchOutcome::default())
        }
        async fn create_subscription(
            &self,
            data: &NrfSubscriptionData,
        ) -> SbiResult<NrfSubscriptionData> {
            Ok(data.clone())
        }
        async fn remove_subscription(&self, subscription_id: &str) -> SbiResult<()> {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(SbiError::ConnectionError("nrf unreachable".into()));
            }
            self.removed_ids
                .lock()
                .unwrap()
                .push(subscription_id.to_string());
            Ok(())
        }
    }

    fn notification(event: &str, uri: &str) -> NotificationData {
        NotificationData {
            event: event.to_string(),
            nf_instance_uri: uri.to_string(),
        }
    }

    #[tokio::test]
    async fn test_deregistered_peer_is_fully_invalidated() {
        let ctx = test_context();
        let nrf = MockNrf::default();
        ctx.add_subscription("peerA", "sub-1");

        let cache = ctx.discovery_cache().unwrap();
        cache.insert(
            CacheKey::new("UDM", "service-names=nudm-ueau"),
            vec![NfProfile {
                nf_instance_id: "peerA".to_string(),
                nf_type: "UDM".to_string(),
                nf_status: "REGISTERED".to_string(),
                ..Default::default()
            }],
            Duration::from_secs(60),
        );

        let problem = nf_subscription_status_notify(
            &ctx,
            &nrf,
            notification(
                NOTIFICATION_EVENT_DEREGISTERED,
                "http://nrf:29510/nnrf-nfm/v1/nf-instances/peerA",
            ),
        )
        .await;

        assert!(problem.is_none());
        assert_eq!(nrf.remove_calls.load(Ordering::SeqCst), 1);
        assert_eq!(nrf.removed_ids.lock().unwrap().as_slice(), ["sub-1"]);
        assert!(!ctx.has_subscription("peerA"));
        assert!(cache
            .lookup(&CacheKey::new("UDM", "service-names=nudm-ueau"))
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_mandatory_ie_is_rejected() {
        let ctx = test_context();
        let nrf = MockNrf::default();

        let problem =
            nf_subscription_status_notify(&ctx, &nrf, notification("", "peerA")).await;
        assert_eq!(problem.as_ref().and_then(|p| p.status), Some(400));
        assert_eq!(
            problem.and_then(|p| p.cause),
            Some("MANDATORY_IE_MISSING".to_string())
        );

        let problem = nf_subscription_status_notify(
            &ctx,
            &nrf,
            notification(NOTIFICATION_EVENT_DEREGISTERED, ""),
        )
        .await;
        assert_eq!(problem.and_then(|p| p.status), Some(400));
        assert_eq!(nrf.remove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let ctx = test_context();
        let nrf = MockNrf::default();
        ctx.add_subscription("peerA", "sub-1");

        let problem =
            nf_subscription_status_notify(&ctx, &nrf, notification("NF_REGISTERED", "peerA"))
                .await;
        assert!(problem.is_none());
        assert_eq!(nrf.remove_calls.load(Ordering::SeqCst), 0);
        assert!(ctx.has_subscription("peerA"));
    }

    #[tokio::test]
    async fn test_unknown_peer_is_a_no_op() {
        let ctx = test_context();
        let nrf = MockNrf::default();

        let problem = nf_subscription_status_notify(
            &ctx,
            &nrf,
            notification(NOTIFICATION_EVENT_DEREGISTERED, "peerB"),
        )
        .await;
        assert!(problem.is_none());
        assert_eq!(nrf.remove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_map_entry_kept_when_removal_fails() {
        let ctx = test_context();
        let nrf = MockNrf::default();
        nrf.fail_remove.store(true, Ordering::SeqCst);
        ctx.add_subscription("peerA", "sub-1");

        let problem = nf_subscription_status_notify(
            &ctx,
            &nrf,
            notification(NOTIFICATION_EVENT_DEREGISTERED, "peerA"),
        )
        .await;
        assert!(problem.is_none());
        // The entry is only deleted once the NRF removal succeeds.
        assert!(ctx.has_subscription("peerA"));
    }
}
