//! Refresh coordinator
//!
//! Owns the recovery path for requests rejected with a stale credential.
//! Drives one `machine::handle_event` state machine per request and
//! executes the actions it returns: cooldown waits, the refresh call,
//! replay, or session termination.
//!
//! At most one refresh call is in flight per coordinator. The first request
//! to need a refresh starts it as a shared future; every request that fails
//! while it runs awaits the same future instead of starting another. The
//! cooldown timestamp and the in-flight marker live under one mutex, so the
//! check-then-start sequence cannot race. A request that was sent with an
//! older credential epoch than the store holds skips the refresh entirely
//! and replays with the newer pair.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::Secret;
use futures_util::FutureExt;
use futures_util::future::Shared;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use session_auth::{CredentialPair, CredentialStore, TokenRefresher};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use transport::RequestDescriptor;

use crate::error::{Error, Result};
use crate::machine::{RefreshAction, RefreshEvent, RefreshState, handle_event};
use crate::policy::RetryPolicy;
use crate::terminator::{SessionEndReason, SessionTerminator};

type RefreshOutcome = std::result::Result<(CredentialPair, u64), session_auth::Error>;
type SharedRefresh = Shared<Pin<Box<dyn Future<Output = RefreshOutcome> + Send>>>;

/// Cooldown timestamp and in-flight refresh, guarded together.
#[derive(Default)]
struct RefreshSlot {
    last_attempt_at: Option<Instant>,
    in_flight: Option<(u64, SharedRefresh)>,
    next_id: u64,
}

impl RefreshSlot {
    /// The in-flight refresh, if it has not resolved yet.
    fn running(&self) -> Option<(u64, SharedRefresh)> {
        self.in_flight
            .as_ref()
            .filter(|(_, fut)| fut.peek().is_none())
            .cloned()
    }
}

/// Result of one pass through the Refreshing state.
enum RefreshStep {
    Fresh(CredentialPair, u64),
    Missing,
    Failed(session_auth::Error),
}

pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    terminator: Arc<dyn SessionTerminator>,
    policy: RetryPolicy,
    slot: Mutex<RefreshSlot>,
    session_ended: AtomicBool,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        terminator: Arc<dyn SessionTerminator>,
        policy: RetryPolicy,
    ) -> Self {
        info!(
            max_attempts = policy.max_attempts,
            cooldown_window_ms = policy.cooldown_window_ms,
            inter_retry_delay_ms = policy.inter_retry_delay_ms,
            "refresh coordinator initialized"
        );
        Self {
            store,
            refresher,
            terminator,
            policy,
            slot: Mutex::new(RefreshSlot::default()),
            session_ended: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Recover a request rejected as unauthorized.
    ///
    /// On `Ok(())` the descriptor carries a fresh bearer header and is ready
    /// to be replayed. On `Err` the session has been terminated (or was
    /// already) and the error is the one to surface to the caller.
    #[instrument(skip_all, fields(request_id = %request.id))]
    pub async fn recover(&self, request: &mut RequestDescriptor) -> Result<()> {
        request.terminal = true;
        let mut state = RefreshState::Idle;
        let mut last_error: Option<session_auth::Error> = None;

        loop {
            request.retry_count += 1;

            let cooldown_remaining = self.cooldown_remaining(request).await;
            let (mut next, mut action) = self.step(
                request,
                state,
                RefreshEvent::Unauthorized { cooldown_remaining },
            );
            if let RefreshAction::WaitCooldown(wait) = action {
                debug!(
                    wait_ms = wait.as_millis() as u64,
                    "refresh attempted recently, cooling down"
                );
                tokio::time::sleep(wait).await;
                (next, action) = self.step(request, next, RefreshEvent::CooldownElapsed);
            }
            debug_assert_eq!(action, RefreshAction::IssueRefresh);
            state = next;

            let event = match self.refresh_once(request).await {
                RefreshStep::Fresh(pair, epoch) => {
                    attach_bearer(request, &pair)?;
                    request.credential_epoch = epoch;
                    RefreshEvent::RefreshSucceeded
                }
                RefreshStep::Missing => RefreshEvent::RefreshCredentialMissing,
                RefreshStep::Failed(e) => {
                    warn!(retry_count = request.retry_count, error = %e, "refresh attempt failed");
                    let error = e.to_string();
                    last_error = Some(e);
                    RefreshEvent::RefreshFailed {
                        retry_count: request.retry_count,
                        error,
                    }
                }
            };

            let (next, action) = self.step(request, state, event);
            state = next;

            match action {
                RefreshAction::Replay { delay } => {
                    metrics::counter!("auth_requests_replayed_total").increment(1);
                    tokio::time::sleep(delay).await;
                    return Ok(());
                }
                RefreshAction::RetryAfter(delay) => {
                    tokio::time::sleep(delay).await;
                }
                RefreshAction::Abort(reason) => {
                    self.end_session(&reason).await;
                    return Err(match reason {
                        SessionEndReason::NoRefreshToken => Error::NoRefreshToken,
                        SessionEndReason::SessionCancelled(message) => {
                            Error::SessionCancelled(message)
                        }
                        SessionEndReason::AttemptsExhausted {
                            attempts,
                            last_error: message,
                        } => Error::RefreshExhausted {
                            attempts,
                            source: last_error
                                .take()
                                .unwrap_or(session_auth::Error::RefreshFailed(message)),
                        },
                    });
                }
                other => unreachable!("refresh machine emitted {other:?} after a refresh outcome"),
            }
        }
    }

    /// Tear the session down and notify the terminator.
    ///
    /// Only the first call per session does anything; later calls (from
    /// other requests failing in the same burst) are suppressed so the host
    /// sees a single re-authentication prompt. Returns whether this call
    /// was the one that ended the session.
    pub async fn end_session(&self, reason: &SessionEndReason) -> bool {
        if self.session_ended.swap(true, Ordering::SeqCst) {
            debug!(reason = %reason, "session already ended, suppressing duplicate termination");
            return false;
        }
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear credential store on session end");
        }
        metrics::counter!("auth_session_terminations_total", "reason" => reason.label())
            .increment(1);
        warn!(reason = %reason, "session ended");
        self.terminator.on_session_end(reason);
        true
    }

    /// Re-enable termination after a fresh login.
    pub fn rearm(&self) {
        self.session_ended.store(false, Ordering::SeqCst);
    }

    /// End the session on the host's request: clear the store without
    /// notifying the terminator. Requests still recovering fail quietly.
    pub async fn close_session(&self) -> Result<()> {
        self.session_ended.store(true, Ordering::SeqCst);
        self.store.clear().await?;
        Ok(())
    }

    pub fn session_ended(&self) -> bool {
        self.session_ended.load(Ordering::SeqCst)
    }

    fn step(
        &self,
        request: &RequestDescriptor,
        state: RefreshState,
        event: RefreshEvent,
    ) -> (RefreshState, RefreshAction) {
        let (next, action) = handle_event(state, event, &self.policy);
        debug!(
            retry_count = request.retry_count,
            from = state.label(),
            to = next.label(),
            "refresh transition"
        );
        (next, action)
    }

    /// How long this request must wait before it may start a new refresh.
    ///
    /// Zero when a refresh is already running (the request will join it)
    /// or when the store already holds a newer pair than the request used.
    async fn cooldown_remaining(&self, request: &RequestDescriptor) -> Duration {
        let slot = self.slot.lock().await;
        if slot.running().is_some() || self.store.epoch() > request.credential_epoch {
            return Duration::ZERO;
        }
        match slot.last_attempt_at {
            Some(at) => self.policy.cooldown_window().saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Obtain a fresh pair: join the running refresh, reuse a pair another
    /// request already obtained, or start a new refresh.
    async fn refresh_once(&self, request: &RequestDescriptor) -> RefreshStep {
        let (id, shared) = {
            let mut slot = self.slot.lock().await;
            if let Some(running) = slot.running() {
                debug!(refresh_id = running.0, "joining in-flight refresh");
                running
            } else {
                // Read before the snapshot: a clear in between leaves this stale,
                // which discards the refreshed pair instead of reviving the session
                let generation = self.store.generation();
                let (pair, epoch) = match self.store.snapshot().await {
                    Ok(Some(snapshot)) => snapshot,
                    Ok(None) => return RefreshStep::Missing,
                    Err(e) => return RefreshStep::Failed(e),
                };
                if epoch > request.credential_epoch {
                    debug!(epoch, "credential already rotated, reusing");
                    return RefreshStep::Fresh(pair, epoch);
                }

                slot.next_id += 1;
                let id = slot.next_id;
                // Recorded before the call resolves so overlapping callers see the cooldown
                slot.last_attempt_at = Some(Instant::now());
                let fut = self.start_refresh(
                    id,
                    Secret::new(pair.refresh_token().to_string()),
                    generation,
                );
                slot.in_flight = Some((id, fut.clone()));
                (id, fut)
            }
        };

        let outcome = shared.await;

        {
            let mut slot = self.slot.lock().await;
            if slot.in_flight.as_ref().is_some_and(|(current, _)| *current == id) {
                slot.in_flight = None;
            }
        }

        match outcome {
            Ok((pair, epoch)) => RefreshStep::Fresh(pair, epoch),
            Err(e) => RefreshStep::Failed(e),
        }
    }

    /// Build the shared refresh future. It persists the new pair itself so
    /// every joined caller observes the same stored epoch. The write only
    /// happens if the store is still on session `generation`; a logout or
    /// session end while the call runs discards the result.
    fn start_refresh(
        &self,
        id: u64,
        refresh_token: Secret<String>,
        generation: u64,
    ) -> SharedRefresh {
        let refresher = self.refresher.clone();
        let store = self.store.clone();

        let fut: Pin<Box<dyn Future<Output = RefreshOutcome> + Send>> = Box::pin(async move {
            info!(refresh_id = id, "issuing token refresh");
            let result = refresher.refresh(refresh_token.expose()).await;
            let pair = match result {
                Ok(pair) => pair,
                Err(e) => {
                    metrics::counter!("auth_refresh_attempts_total", "outcome" => "failure")
                        .increment(1);
                    return Err(e);
                }
            };
            let Some(epoch) = store.set_if_generation(&pair, generation).await? else {
                metrics::counter!("auth_refresh_attempts_total", "outcome" => "discarded")
                    .increment(1);
                warn!(refresh_id = id, "session cleared while refresh was in flight, discarding");
                return Err(session_auth::Error::RefreshFailed(
                    "session cleared while refresh was in flight".into(),
                ));
            };
            metrics::counter!("auth_refresh_attempts_total", "outcome" => "success").increment(1);
            info!(refresh_id = id, epoch, "token refresh succeeded");
            Ok((pair, epoch))
        });
        fut.shared()
    }
}

/// Set `Authorization: Bearer <access>` on the descriptor.
pub(crate) fn attach_bearer(request: &mut RequestDescriptor, pair: &CredentialPair) -> Result<()> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", pair.access_token()))
        .map_err(|e| Error::InvalidCredential(e.to_string()))?;
    value.set_sensitive(true);
    request.headers.insert(AUTHORIZATION, value);
    Ok(())
}
