//! Scripted collaborators shared by the coordinator and client tests.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use session_auth::{ClearPolicy, CredentialPair, CredentialStore, MemoryStore, TokenRefresher};
use tokio::time::Instant;
use transport::{ApiResponse, RequestDescriptor, Transport, TransportError};

use crate::terminator::{SessionEndReason, SessionTerminator};

pub(crate) async fn memory_store() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::new(
        Arc::new(MemoryStore::new()),
        ClearPolicy::default(),
    ))
}

/// Refresher that pops scripted outcomes in order and rejects once empty.
pub(crate) struct ScriptedRefresher {
    script: Mutex<VecDeque<session_auth::Result<CredentialPair>>>,
    latency: Duration,
    calls: Mutex<Vec<(Instant, String)>>,
}

impl ScriptedRefresher {
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn succeed_with(self, access: &str, refresh: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(CredentialPair::new(access, refresh)));
        self
    }

    pub(crate) fn fail_with(self, error: session_auth::Error) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub(crate) fn tokens_used(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, token)| token.clone())
            .collect()
    }
}

impl TokenRefresher for ScriptedRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<CredentialPair>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), refresh_token.to_string()));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| {
                Err(session_auth::Error::RefreshRejected(
                    "refresh token expired".into(),
                ))
            })
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingTerminator {
    reasons: Mutex<Vec<SessionEndReason>>,
}

impl RecordingTerminator {
    pub(crate) fn reasons(&self) -> Vec<SessionEndReason> {
        self.reasons.lock().unwrap().clone()
    }
}

impl SessionTerminator for RecordingTerminator {
    fn on_session_end(&self, reason: &SessionEndReason) {
        self.reasons.lock().unwrap().push(reason.clone());
    }
}

/// API double: 200 for bearer tokens in the valid set, 401 otherwise.
pub(crate) struct FakeApi {
    valid: Mutex<HashSet<String>>,
    fixed: Mutex<Option<ApiResponse>>,
    unreachable: bool,
    latency: Duration,
    seen: Mutex<Vec<Option<String>>>,
    sent: Mutex<Vec<(u32, bool)>>,
}

impl FakeApi {
    pub(crate) fn accepting(tokens: &[&str]) -> Self {
        Self {
            valid: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            fixed: Mutex::new(None),
            unreachable: false,
            latency: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Every request gets `response`, whatever it carries.
    pub(crate) fn always(response: ApiResponse) -> Self {
        let api = Self::accepting(&[]);
        *api.fixed.lock().unwrap() = Some(response);
        api
    }

    /// Every send fails before a response exists.
    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::accepting(&[])
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn accept(&self, token: &str) {
        self.valid.lock().unwrap().insert(token.to_string());
    }

    pub(crate) fn respond_with(&self, response: ApiResponse) {
        *self.fixed.lock().unwrap() = Some(response);
    }

    /// `(retry_count, terminal)` of each request as it arrived.
    pub(crate) fn retry_states(&self) -> Vec<(u32, bool)> {
        self.sent.lock().unwrap().clone()
    }

    /// Bearer token carried by each request, in arrival order.
    pub(crate) fn seen(&self) -> Vec<Option<String>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transport for FakeApi {
    fn id(&self) -> &str {
        "fake"
    }

    fn send<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = transport::Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.unreachable {
                return Err(TransportError::Connect("connection refused".into()));
            }
            let token = request
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string);
            self.seen.lock().unwrap().push(token.clone());
            self.sent
                .lock()
                .unwrap()
                .push((request.retry_count, request.terminal));

            if let Some(fixed) = self.fixed.lock().unwrap().clone() {
                return Ok(fixed);
            }
            let accepted = token
                .as_deref()
                .is_some_and(|t| self.valid.lock().unwrap().contains(t));
            if accepted {
                Ok(ApiResponse::new(200, r#"{"success":true,"data":[]}"#))
            } else {
                Ok(ApiResponse::new(
                    401,
                    r#"{"success":false,"message":"Unauthorized"}"#,
                ))
            }
        })
    }
}
