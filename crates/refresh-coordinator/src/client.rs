//! Authenticated request dispatcher
//!
//! `AuthedClient` is the entry point hosts call. Every request gets the
//! current access token attached, goes out through the transport, and has
//! its response classified. Unauthorized responses are handed to the
//! `RefreshCoordinator` and replayed once it has a fresh pair; revoked
//! sessions end immediately; everything else is returned unchanged.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use session_auth::{CredentialPair, CredentialStore, TokenRefresher};
use tracing::{debug, info, instrument};
use transport::{ApiResponse, RequestDescriptor, Transport};

use crate::classify::{Classifier, Disposition};
use crate::coordinator::{RefreshCoordinator, attach_bearer};
use crate::error::{Error, Result};
use crate::policy::RetryPolicy;
use crate::terminator::{SessionEndReason, SessionTerminator};

pub struct AuthedClient {
    transport: Arc<dyn Transport>,
    coordinator: RefreshCoordinator,
    classifier: Classifier,
}

pub struct AuthedClientBuilder {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    terminator: Arc<dyn SessionTerminator>,
    policy: RetryPolicy,
    classifier: Classifier,
}

impl AuthedClientBuilder {
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> common::Result<AuthedClient> {
        self.policy.validate()?;
        Ok(AuthedClient {
            coordinator: RefreshCoordinator::new(
                self.store,
                self.refresher,
                self.terminator,
                self.policy,
            ),
            transport: self.transport,
            classifier: self.classifier,
        })
    }
}

impl AuthedClient {
    /// Start building a client. The terminator is fixed for the client's
    /// lifetime.
    pub fn builder(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> AuthedClientBuilder {
        AuthedClientBuilder {
            transport,
            store,
            refresher,
            terminator,
            policy: RetryPolicy::default(),
            classifier: Classifier::default(),
        }
    }

    /// Store a pair obtained from an interactive login and re-arm session
    /// termination.
    pub async fn login(&self, pair: &CredentialPair) -> Result<()> {
        let epoch = self.coordinator.store().begin_session(pair).await?;
        self.coordinator.rearm();
        info!(epoch, "logged in");
        Ok(())
    }

    /// Clear the session without invoking the terminator. A refresh still
    /// in flight is discarded rather than stored.
    pub async fn logout(&self) -> Result<()> {
        self.coordinator.close_session().await?;
        info!("logged out");
        Ok(())
    }

    /// Send a request, recovering from a stale access token at most once.
    #[instrument(skip_all, fields(transport = self.transport.id(), request_id = %request.id, method = %request.method, path = %request.path))]
    pub async fn send(&self, mut request: RequestDescriptor) -> Result<ApiResponse> {
        self.attach_current(&mut request).await?;

        loop {
            let response = self.transport.send(&request).await?;

            match self
                .classifier
                .classify(&response, &request, self.coordinator.policy())
            {
                Disposition::Success => {
                    debug!(status = response.status, retry_count = request.retry_count, "request succeeded");
                    return Ok(response);
                }
                Disposition::SessionCancelled(message) => {
                    self.coordinator
                        .end_session(&SessionEndReason::SessionCancelled(message.clone()))
                        .await;
                    return Err(Error::SessionCancelled(message));
                }
                Disposition::Unauthorized => {
                    debug!(status = response.status, "credential rejected, entering refresh path");
                    self.coordinator.recover(&mut request).await?;
                }
                Disposition::Failed => {
                    debug!(status = response.status, terminal = request.terminal, "propagating upstream failure");
                    return Err(Error::Upstream(Box::new(response)));
                }
            }
        }
    }

    /// Attach the stored access token, if any, and record its epoch.
    async fn attach_current(&self, request: &mut RequestDescriptor) -> Result<()> {
        match self.coordinator.store().snapshot().await? {
            Some((pair, epoch)) => {
                attach_bearer(request, &pair)?;
                request.credential_epoch = epoch;
            }
            None => {
                debug!("no stored credential, sending without authorization");
                request.headers.remove(AUTHORIZATION);
                request.credential_epoch = self.coordinator.store().epoch();
            }
        }
        Ok(())
    }
}
