use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING};
use reqwest::Client;

use crate::core::error::UpdateResult;

const APP_USER_AGENT: &str = concat!("cresc-client/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .build()
}

/// Raw answer of the update server: status plus the unparsed body.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Network seam used by the check pipeline and the endpoint resolver.
///
/// `Err` means the request never produced a response (connection refused,
/// DNS, TLS...). A response with any status is `Ok`.
#[async_trait]
pub trait CheckTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> UpdateResult<TransportResponse>;

    async fn get_json(&self, url: &str) -> UpdateResult<serde_json::Value>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CheckTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> UpdateResult<TransportResponse> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }

    async fn get_json(&self, url: &str) -> UpdateResult<serde_json::Value> {
        let value = self.client.get(url).send().await?.json().await?;
        Ok(value)
    }
}
