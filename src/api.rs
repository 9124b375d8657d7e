//! # HTTP request capability.
//!
//! The core only ever needs "issue a request, give me the response body".
//! [`RequestClient`] is that capability; [`ApiClient`] is the production
//! implementation over [`reqwest`]. Tests substitute in-memory stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Wire configuration for one request-issuing handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientConfig {
    /// Target URL.
    pub url: String,
    /// Content type sent with POST requests.
    pub content_type: String,
}

/// Request → response-body operation consumed by the drivers.
#[async_trait]
pub trait RequestClient: Send + Sync + 'static {
    /// Target URL, for logs and diagnostics.
    fn url(&self) -> &str;

    /// Issues a POST with the configured content type and an empty body.
    async fn post(&self) -> Result<String, ClientError>;

    /// Issues a GET and returns the response body.
    async fn get(&self) -> Result<String, ClientError>;
}

/// reqwest-backed [`RequestClient`].
pub struct ApiClient {
    url: String,
    content_type: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Creates a client for one endpoint.
    pub fn new(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        let url = url.into();
        crate::assert::ensure(!url.is_empty(), "client url can not be empty");
        Self {
            url,
            content_type: content_type.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Builds a client from wire configuration.
    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self::new(cfg.url.clone(), cfg.content_type.clone())
    }

    async fn read_body(&self, resp: reqwest::Response) -> Result<String, ClientError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl RequestClient for ApiClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self) -> Result<String, ClientError> {
        let resp = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, self.content_type.as_str())
            .send()
            .await?;
        self.read_body(resp).await
    }

    async fn get(&self) -> Result<String, ClientError> {
        let resp = self.http.get(&self.url).send().await?;
        self.read_body(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_uses_camel_case() {
        let cfg: ClientConfig = serde_json::from_str(
            r#"{"url": "https://example.com/api", "contentType": "application/json"}"#,
        )
        .expect("parse");
        assert_eq!(cfg.url, "https://example.com/api");
        assert_eq!(cfg.content_type, "application/json");

        let back = serde_json::to_value(&cfg).expect("serialize");
        assert!(back.get("contentType").is_some());
    }

    #[test]
    fn unknown_client_fields_are_rejected() {
        let res: Result<ClientConfig, _> = serde_json::from_str(
            r#"{"url": "https://example.com", "contentType": "application/json", "verb": "PUT"}"#,
        );
        assert!(res.is_err());
    }
}
