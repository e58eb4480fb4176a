//! HTTP Transport
//!
//! The cookie-persisting client the login sequence runs against. Redirects
//! are never followed so callers can observe the login POST's 302.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Url};
use std::sync::Arc;
use std::time::Duration;

/// Raw response as seen by the session and API layers
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8, for error messages
    pub fn body_snippet(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        text.chars().take(200).collect()
    }
}

/// Cookie-bearing HTTP collaborator.
///
/// Paths are relative to the service base URL.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> SyncResult<HttpResponse>;

    async fn post_form(
        &self,
        path: &str,
        query: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> SyncResult<HttpResponse>;
}

#[async_trait]
impl<T: SessionTransport + ?Sized> SessionTransport for Arc<T> {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> SyncResult<HttpResponse> {
        (**self).get(path, query).await
    }

    async fn post_form(
        &self,
        path: &str,
        query: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> SyncResult<HttpResponse> {
        (**self).post_form(path, query, form).await
    }
}

/// `reqwest` implementation with an in-memory cookie jar
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Create a transport with a fresh, empty cookie jar
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("healthsync/", env!("CARGO_PKG_VERSION")))
            .cookie_store(true)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> SyncResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SyncError::Config(format!("invalid path {}: {}", path, e)))
    }

    async fn read(response: reqwest::Response) -> SyncResult<HttpResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl SessionTransport for ReqwestTransport {
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> SyncResult<HttpResponse> {
        let url = self.url(path)?;
        let response = self.client.get(url).query(query).send().await?;
        Self::read(response).await
    }

    async fn post_form(
        &self,
        path: &str,
        query: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> SyncResult<HttpResponse> {
        let url = self.url(path)?;
        let response = self
            .client
            .post(url)
            .query(query)
            .form(form)
            .send()
            .await?;
        Self::read(response).await
    }
}

/// Parse a base URL, making sure relative joins keep its path
pub(crate) fn parse_base_url(base_url: &str) -> SyncResult<Url> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };
    Url::parse(&normalized)
        .map_err(|e| SyncError::Config(format!("invalid base URL {}: {}", base_url, e)))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_join_keeps_path() {
        let transport =
            ReqwestTransport::new("http://localhost:9000/planet", Duration::from_secs(5)).unwrap();
        let url = transport.url("/oauth/auth").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/planet/oauth/auth");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            parse_base_url("not a url"),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_response_success_range() {
        let ok = HttpResponse {
            status: 204,
            content_type: None,
            body: Vec::new(),
        };
        assert!(ok.is_success());

        let redirect = HttpResponse { status: 302, ..ok };
        assert!(!redirect.is_success());
    }
}
