//! Refresh credential exchange
//!
//! POSTs `{"refreshToken": "..."}` to the refresh endpoint and expects
//! `{"data": {"accessToken": "...", "refreshToken": "..."}}` back. Both
//! tokens are required: a response carrying only one of them is treated as
//! a failed refresh so the stored pair is never half-replaced.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Refresh endpoint response body.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub data: Option<RefreshData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl RefreshResponse {
    /// Extract the new pair, rejecting responses missing either token.
    pub fn into_pair(self) -> Result<CredentialPair> {
        let data = self
            .data
            .ok_or_else(|| Error::IncompleteRefresh("response has no data object".into()))?;
        let access = data
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::IncompleteRefresh("missing accessToken".into()))?;
        let refresh = data
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::IncompleteRefresh("missing refreshToken".into()))?;
        Ok(CredentialPair::new(access, refresh))
    }
}

/// Exchange a refresh token for a new credential pair.
pub async fn refresh_token(
    client: &reqwest::Client,
    endpoint: &str,
    refresh: &str,
) -> Result<CredentialPair> {
    let response = client
        .post(endpoint)
        .json(&RefreshRequest {
            refresh_token: refresh,
        })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403 means the refresh token is revoked or expired
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::RefreshRejected(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }

        return Err(Error::RefreshFailed(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let parsed = response
        .json::<RefreshResponse>()
        .await
        .map_err(|e| Error::RefreshFailed(format!("invalid refresh response: {e}")))?;

    debug!("refresh endpoint issued new credentials");
    parsed.into_pair()
}

/// The refresh call the coordinator issues.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn TokenRefresher>`).
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialPair>> + Send + 'a>>;
}

/// Refresher that calls the HTTP refresh endpoint.
pub struct HttpRefresher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRefresher {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl TokenRefresher for HttpRefresher {
    fn refresh<'a>(
        &'a self,
        refresh: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CredentialPair>> + Send + 'a>> {
        Box::pin(refresh_token(&self.client, &self.endpoint, refresh))
    }
}
