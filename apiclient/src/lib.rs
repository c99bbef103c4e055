// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP client for the log server's REST contract plus the websocket push
//! channel. Authentication is a bearer token minted on demand by an
//! external provider; this crate never inspects its content.

pub mod groups;
pub mod logs;
pub mod ws;

use std::{sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::error;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ApiClientError {
    /// Non-success HTTP status with the response body for diagnostics.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    /// The response body did not match the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The request hit its deadline; always retriable.
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure; retriable.
    #[error("network error: {0}")]
    Network(String),
    /// The base URL could not be parsed or joined.
    #[error("malformed url")]
    Url,
}

impl ApiClientError {
    /// Conflicting append (another writer took the index).
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiClientError::Status { status: 409, .. })
    }

    pub fn is_retriable(&self) -> bool {
        match self {
            ApiClientError::Timeout | ApiClientError::Network(_) => true,
            ApiClientError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ApiClientError::Timeout
        } else {
            ApiClientError::Network(error.to_string())
        }
    }
}

/// Mints the bearer token attached to every request. Token contents and
/// refresh are entirely the provider's business.
pub trait AuthTokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// No-op provider for unauthenticated setups and tests.
pub struct NoAuth;

impl AuthTokenProvider for NoAuth {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    auth: Arc<dyn AuthTokenProvider>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        auth: Arc<dyn AuthTokenProvider>,
    ) -> Result<Self, ApiClientError> {
        let base_url = Url::parse(base_url).map_err(|_| ApiClientError::Url)?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ApiClientError::from)?;
        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn auth_provider(&self) -> &dyn AuthTokenProvider {
        self.auth.as_ref()
    }

    fn url(&self, path: &str) -> Result<Url, ApiClientError> {
        self.base_url.join(path).map_err(|_| ApiClientError::Url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub(crate) async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, ApiClientError> {
        let request = self.authorize(self.client.get(self.url(path)?)).query(query);
        let response = request.send().await?;
        Self::decode(response).await
    }

    pub(crate) async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiClientError> {
        let request = self.authorize(self.client.post(self.url(path)?)).json(body);
        let response = request.send().await?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<R, ApiClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "request failed");
            return Err(ApiClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ApiClientError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_retriable_classification() {
        let conflict = ApiClientError::Status {
            status: 409,
            body: String::new(),
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_retriable());

        assert!(ApiClientError::Timeout.is_retriable());
        assert!(
            ApiClientError::Status {
                status: 503,
                body: String::new()
            }
            .is_retriable()
        );
        assert!(
            !ApiClientError::Status {
                status: 400,
                body: String::new()
            }
            .is_retriable()
        );
    }

    #[test]
    fn url_joining() {
        let client = ApiClient::new("https://logs.example.com/", Arc::new(NoAuth)).unwrap();
        assert_eq!(
            client.url("self/logs/db1/head").unwrap().as_str(),
            "https://logs.example.com/self/logs/db1/head"
        );
    }
}
