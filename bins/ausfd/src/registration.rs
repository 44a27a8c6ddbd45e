//! NRF registration controller
//!
//! Keeps at most one active registration with the NRF, reflecting the latest
//! PLMN snapshot from the configuration poller. A new snapshot preempts any
//! in-flight registration attempt; an empty snapshot deregisters and stops
//! the heartbeat. After a successful registration a heartbeat loop PATCHes
//! the NF status on the server-suggested period and falls back to a full
//! re-registration when the NRF answers 5xx, 404, 400 or is unreachable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ausf_sbi::models::{PatchItem, PlmnId};
use ausf_sbi::{ProblemDetails, SbiError};

use crate::consumer::nf_management::{build_nf_profile, NfRegistrationOutcome, NrfClient};
use crate::context::AusfContext;

/// Seconds between registration retries.
pub const RETRY_TIME: Duration = Duration::from_secs(10);
/// Heartbeat period when the NRF suggests none.
pub const DEFAULT_HEARTBEAT_TIMER: u64 = 60;

/// Shared heartbeat timer state. `None` iff the last PLMN snapshot was empty
/// or deregistration has completed.
#[derive(Default)]
pub struct HeartbeatState {
    interval: Mutex<Option<u64>>,
}

impl HeartbeatState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set(&self, secs: Option<u64>) {
        *self.interval.lock().expect("heartbeat lock poisoned") = secs;
    }

    /// Current heartbeat period in seconds, when the timer is armed.
    pub fn interval(&self) -> Option<u64> {
        *self.interval.lock().expect("heartbeat lock poisoned")
    }

    pub fn is_running(&self) -> bool {
        self.interval().is_some()
    }
}

/// Run the registration service until the token is cancelled. Snapshots are
/// processed in arrival order; only one registration task is alive at a time.
pub async fn start_nf_registration_service(
    ctx: Arc<AusfContext>,
    nrf: Arc<dyn NrfClient>,
    mut plmn_rx: mpsc::Receiver<Vec<PlmnId>>,
    cancel: CancellationToken,
    heartbeat: Arc<HeartbeatState>,
) {
    let mut register_cancel: Option<CancellationToken> = None;
    let mut register_handle: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            snapshot = plmn_rx.recv() => {
                let Some(new_plmn_config) = snapshot else {
                    log::warn!("PLMN config channel closed, waiting for shutdown");
                    cancel.cancelled().await;
                    break;
                };

                // Preempt the in-flight attempt and wait for it to unwind so
                // a single registration drives the NRF at any time.
                if let Some(token) = register_cancel.take() {
                    log::info!("NF registration context cancelled");
                    token.cancel();
                }
                if let Some(handle) = register_handle.take() {
                    let _ = handle.await;
                }

                if new_plmn_config.is_empty() {
                    log::info!("PLMN config is empty, AUSF will deregister");
                    deregister_nf(&ctx, nrf.as_ref(), &heartbeat).await;
                } else {
                    log::info!("PLMN config updated, AUSF will register");
                    let token = cancel.child_token();
                    register_cancel = Some(token.clone());
                    register_handle = Some(tokio::spawn(register_nf(
                        ctx.clone(),
                        nrf.clone(),
                        new_plmn_config,
                        token,
                        heartbeat.clone(),
                    )));
                }
            }
        }
    }

    if let Some(token) = register_cancel.take() {
        token.cancel();
    }
    if let Some(handle) = register_handle.take() {
        let _ = handle.await;
    }
    deregister_nf(&ctx, nrf.as_ref(), &heartbeat).await;
    log::info!("NF registration service shutting down");
}

/// Register with the NRF, retrying every [`RETRY_TIME`] until success or
/// cancellation, then run the heartbeat loop.
async fn register_nf(
    ctx: Arc<AusfContext>,
    nrf: Arc<dyn NrfClient>,
    plmn_config: Vec<PlmnId>,
    cancel: CancellationToken,
    heartbeat: Arc<HeartbeatState>,
) {
    loop {
        if cancel.is_cancelled() {
            log::info!("registration cancelled before completion");
            return;
        }

        let profile = build_nf_profile(&ctx, &plmn_config);
        match nrf.register_nf_instance(&ctx.nf_id(), &profile).await {
            Ok(outcome) => {
                adopt_outcome(&ctx, &outcome);
                ctx.set_plmn_list(plmn_config.clone());
                log::info!("registered AUSF instance {} with NRF", ctx.nf_id());

                let interval = heartbeat_interval(outcome.profile().heart_beat_timer);
                heartbeat.set(Some(interval));
                log::info!("started heartbeat timer: {interval} sec");
                heartbeat_loop(ctx, nrf, plmn_config, cancel, heartbeat, interval).await;
                return;
            }
            Err(e) => {
                log::error!("register AUSF instance with NRF failed, will retry: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(RETRY_TIME) => {}
                }
            }
        }
    }
}

fn adopt_outcome(ctx: &AusfContext, outcome: &NfRegistrationOutcome) {
    if let NfRegistrationOutcome::Created {
        resource_nrf_uri,
        nf_instance_id,
        ..
    } = outcome
    {
        log::info!("NRF {resource_nrf_uri} assigned NF instance id {nf_instance_id}");
        ctx.set_nf_id(nf_instance_id.clone());
    }
}

fn heartbeat_interval(profile_timer: Option<i32>) -> u64 {
    match profile_timer {
        Some(timer) if timer > 0 => timer as u64,
        _ => DEFAULT_HEARTBEAT_TIMER,
    }
}

/// One heartbeat iteration per period: PATCH the NF status, re-register when
/// the NRF lost or rejected the registration, rearm with the freshest
/// server-suggested period.
async fn heartbeat_loop(
    ctx: Arc<AusfContext>,
    nrf: Arc<dyn NrfClient>,
    plmn_config: Vec<PlmnId>,
    cancel: CancellationToken,
    heartbeat: Arc<HeartbeatState>,
    mut interval: u64,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
        }
        if !heartbeat.is_running() {
            log::info!("heartbeat timer has been stopped, heartbeat will not be sent");
            return;
        }

        let patch = vec![PatchItem::nf_status_registered()];
        let result = nrf.update_nf_instance(&ctx.nf_id(), &patch).await;

        let mut profile_timer = None;
        let (problem, err) = match &result {
            Ok((profile, problem)) => {
                profile_timer = profile.as_ref().and_then(|p| p.heart_beat_timer);
                (problem.as_ref(), None)
            }
            Err(e) => (None, Some(e)),
        };

        if should_register(problem, err) {
            log::debug!("NF heartbeat failed, registering again");
            let profile = build_nf_profile(&ctx, &plmn_config);
            match nrf.register_nf_instance(&ctx.nf_id(), &profile).await {
                Ok(outcome) => {
                    adopt_outcome(&ctx, &outcome);
                    profile_timer = outcome.profile().heart_beat_timer;
                    log::info!("re-registered AUSF instance with NRF");
                }
                Err(e) => log::error!("register AUSF instance with NRF failed: {e}"),
            }
        } else {
            log::debug!("AUSF update NF instance (heartbeat) succeeded");
        }

        interval = heartbeat_interval(profile_timer);
        heartbeat.set(Some(interval));
        log::debug!("restarted heartbeat timer: {interval} sec");
    }
}

fn should_register(problem: Option<&ProblemDetails>, err: Option<&SbiError>) -> bool {
    if let Some(problem) = problem {
        log::warn!("AUSF update NF instance (heartbeat) problem details: {problem:?}");
        let status = problem.status.unwrap_or(0);
        return status / 100 == 5 || status == 404 || status == 400;
    }
    if let Some(err) = err {
        log::warn!("AUSF update NF instance (heartbeat) error: {err}");
        return true;
    }
    false
}

/// Stop the heartbeat and deregister from the NRF.
async fn deregister_nf(ctx: &AusfContext, nrf: &dyn NrfClient, heartbeat: &HeartbeatState) {
    heartbeat.set(None);
    log::info!("stopped heartbeat timer");
    match nrf.deregister_nf_instance(&ctx.nf_id()).await {
        Ok(()) => log::info!("deregistered instance from NRF"),
        Err(e) => log::warn!("deregister instance from NRF failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::nf_management::SearchOutcome;
    use crate::context::test_context;
    use async_trait::async_trait;
    use ausf_sbi::models::{NfProfile, NrfSubscriptionData, SearchResult};
    use ausf_sbi::SbiResult;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum UpdateBehavior {
        Ok,
        Problem(i32),
        TransportError,
    }

    struct RecordingNrf {
        register_calls: AtomicUsize,
        update_calls: AtomicUsize,
        deregister_calls: AtomicUsize,
        register_failures: AtomicUsize,
        heartbeat_timer: Option<i32>,
        update_behaviors: Mutex<VecDeque<UpdateBehavior>>,
    }

    impl RecordingNrf {
        fn new(heartbeat_timer: Option<i32>) -> Arc<Self> {
            Arc::new(Self {
                register_calls: AtomicUsize::new(0),
                update_calls: AtomicUsize::new(0),
                deregister_calls: AtomicUsize::new(0),
                register_failures: AtomicUsize::new(0),
                heartbeat_timer,
                update_behaviors: Mutex::new(VecDeque::new()),
            })
        }

        fn fail_next_registers(&self, count: usize) {
            self.register_failures.store(count, Ordering::SeqCst);
        }

        fn queue_update(&self, behavior: UpdateBehavior) {
            self.update_behaviors.lock().unwrap().push_back(behavior);
        }

        fn registers(&self) -> usize {
            self.register_calls.load(Ordering::SeqCst)
        }

        fn deregisters(&self) -> usize {
            self.deregister_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NrfClient for RecordingNrf {
        async fn register_nf_instance(
            &self,
            _id: &str,
            profile: &NfProfile,
        ) -> SbiResult<NfRegistrationOutcome> {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            let failures = self.register_failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.register_failures.store(failures - 1, Ordering::SeqCst);
                return Err(SbiError::ConnectionError("nrf down".into()));
            }
            let mut registered = profile.clone();
            registered.heart_beat_timer = self.heartbeat_timer;
            Ok(NfRegistrationOutcome::Updated(registered))
        }

        async fn update_nf_instance(
            &self,
            _id: &str,
            _patch: &[PatchItem],
        ) -> SbiResult<(Option<NfProfile>, Option<ProblemDetails>)> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            match self.update_behaviors.lock().unwrap().pop_front() {
                Some(UpdateBehavior::Problem(status)) => {
                    Ok((None, Some(ProblemDetails::with_status(status))))
                }
                Some(UpdateBehavior::TransportError) => {
                    Err(SbiError::ConnectionError("nrf down".into()))
                }
                Some(UpdateBehavior::Ok) | None => Ok((
                    Some(NfProfile {
                        heart_beat_timer: self.heartbeat_timer,
                        ..Default::default()
                    }),
                    None,
                )),
            }
        }

        async fn deregister_nf_instance(&self, _id: &str) -> SbiResult<()> {
            self.deregister_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn search_nf_instances(
            &self,
            _target: &str,
            _requester: &str,
            _services: &str,
        ) -> SbiResult<SearchOutcome> {
            Ok(SearchOutcome {
                result: SearchResult::default(),
                redirected: false,
            })
        }

        async fn create_subscription(
            &self,
            data: &NrfSubscriptionData,
        ) -> SbiResult<NrfSubscriptionData> {
            Ok(data.clone())
        }

        async fn remove_subscription(&self, _id: &str) -> SbiResult<()> {
            Ok(())
        }
    }

    struct Harness {
        tx: mpsc::Sender<Vec<PlmnId>>,
        cancel: CancellationToken,
        heartbeat: Arc<HeartbeatState>,
        handle: JoinHandle<()>,
    }

    fn spawn_service(nrf: Arc<RecordingNrf>) -> Harness {
        let ctx = test_context();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let heartbeat = HeartbeatState::new();
        let handle = tokio::spawn(start_nf_registration_service(
            ctx,
            nrf,
            rx,
            cancel.clone(),
            heartbeat.clone(),
        ));
        Harness {
            tx,
            cancel,
            heartbeat,
            handle,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_registers_and_arms_heartbeat() {
        let nrf = RecordingNrf::new(Some(30));
        let harness = spawn_service(nrf.clone());

        harness.tx.send(vec![PlmnId::new("001", "01")]).await.unwrap();
        settle().await;

        assert_eq!(nrf.registers(), 1);
        assert_eq!(harness.heartbeat.interval(), Some(30));

        harness.cancel.cancel();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_heartbeat_timer_defaults_to_60() {
        let nrf = RecordingNrf::new(Some(0));
        let harness = spawn_service(nrf.clone());

        harness.tx.send(vec![PlmnId::new("001", "01")]).await.unwrap();
        settle().await;
        assert_eq!(harness.heartbeat.interval(), Some(DEFAULT_HEARTBEAT_TIMER));

        harness.cancel.cancel();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_snapshot_deregisters_then_refill_registers() {
        let nrf = RecordingNrf::new(Some(30));
        let harness = spawn_service(nrf.clone());

        harness.tx.send(vec![]).await.unwrap();
        settle().await;
        assert_eq!(nrf.deregisters(), 1);
        assert_eq!(nrf.registers(), 0);
        assert!(!harness.heartbeat.is_running());

        harness.tx.send(vec![PlmnId::new("001", "01")]).await.unwrap();
        settle().await;
        assert_eq!(nrf.registers(), 1);
        assert_eq!(nrf.deregisters(), 1);
        assert!(harness.heartbeat.is_running());

        harness.cancel.cancel();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_5xx_triggers_exactly_one_reregistration() {
        let nrf = RecordingNrf::new(Some(10));
        nrf.queue_update(UpdateBehavior::Problem(500));
        let harness = spawn_service(nrf.clone());

        harness.tx.send(vec![PlmnId::new("001", "01")]).await.unwrap();
        settle().await;
        assert_eq!(nrf.registers(), 1);

        // First heartbeat: PATCH answers 500, the controller re-registers
        // once and rearms the timer from the register response.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(nrf.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(nrf.registers(), 2);
        assert_eq!(harness.heartbeat.interval(), Some(10));

        // Second heartbeat succeeds; no further registration.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(nrf.update_calls.load(Ordering::SeqCst), 2);
        assert_eq!(nrf.registers(), 2);

        harness.cancel.cancel();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_transport_error_triggers_reregistration() {
        let nrf = RecordingNrf::new(Some(10));
        nrf.queue_update(UpdateBehavior::TransportError);
        let harness = spawn_service(nrf.clone());

        harness.tx.send(vec![PlmnId::new("001", "01")]).await.unwrap();
        settle().await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(nrf.registers(), 2);

        harness.cancel.cancel();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_403_does_not_reregister() {
        let nrf = RecordingNrf::new(Some(10));
        nrf.queue_update(UpdateBehavior::Problem(403));
        let harness = spawn_service(nrf.clone());

        harness.tx.send(vec![PlmnId::new("001", "01")]).await.unwrap();
        settle().await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(nrf.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(nrf.registers(), 1);

        harness.cancel.cancel();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_registration_retries_until_new_snapshot() {
        let nrf = RecordingNrf::new(Some(30));
        nrf.fail_next_registers(usize::MAX);
        let harness = spawn_service(nrf.clone());

        harness.tx.send(vec![PlmnId::new("001", "01")]).await.unwrap();
        settle().await;
        // Two retry periods pass: the attempt keeps retrying.
        tokio::time::sleep(RETRY_TIME * 2 + Duration::from_secs(1)).await;
        let attempts = nrf.registers();
        assert!(attempts >= 2, "expected retries, saw {attempts}");
        assert!(!harness.heartbeat.is_running());

        // A new snapshot preempts the failing attempt; registration now
        // succeeds on the first try of the new task.
        nrf.fail_next_registers(0);
        harness.tx.send(vec![PlmnId::new("002", "02")]).await.unwrap();
        settle().await;
        assert!(harness.heartbeat.is_running());

        harness.cancel.cancel();
        harness.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_issues_best_effort_deregistration() {
        let nrf = RecordingNrf::new(Some(30));
        let harness = spawn_service(nrf.clone());

        harness.tx.send(vec![PlmnId::new("001", "01")]).await.unwrap();
        settle().await;
        assert_eq!(nrf.registers(), 1);

        harness.cancel.cancel();
        harness.handle.await.unwrap();
        assert_eq!(nrf.deregisters(), 1);
        assert!(!harness.heartbeat.is_running());
    }

    #[test]
    fn test_should_register_matrix() {
        let p = |status| Some(ProblemDetails::with_status(status));
        assert!(should_register(p(500).as_ref(), None));
        assert!(should_register(p(503).as_ref(), None));
        assert!(should_register(p(404).as_ref(), None));
        assert!(should_register(p(400).as_ref(), None));
        assert!(!should_register(p(403).as_ref(), None));
        assert!(!should_register(p(409).as_ref(), None));
        let err = SbiError::Timeout;
        assert!(should_register(None, Some(&err)));
        assert!(!should_register(None, None));
    }

    #[test]
    fn test_heartbeat_interval_defaults() {
        assert_eq!(heartbeat_interval(None), DEFAULT_HEARTBEAT_TIMER);
        assert_eq!(heartbeat_interval(Some(0)), DEFAULT_HEARTBEAT_TIMER);
        assert_eq!(heartbeat_interval(Some(-1)), DEFAULT_HEARTBEAT_TIMER);
        assert_eq!(heartbeat_interval(Some(20)), 20);
    }
}
