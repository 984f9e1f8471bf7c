use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::types::{PathConfigBody, RelayPathDetail, RelayPathList, RelayPathSummary};
use super::RelayApi;
use crate::config::RelayConfig;
use crate::errors::{RelayApiError, RelayResult};

/// HTTP client for the media-relay control API
#[derive(Clone)]
pub struct MediaRelayClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl MediaRelayClient {
    pub fn new(config: &RelayConfig) -> RelayResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| RelayApiError::transport(&config.api_url, &e))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> RelayResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| RelayApiError::transport(url, &e))?;

        let status = response.status();
        trace!("{} -> {}", url, status);
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RelayApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_json<T: DeserializeOwned>(&self, endpoint: &str, subject: &str) -> RelayResult<T> {
        let url = self.url(endpoint);
        debug!("Fetching {}", url);
        let response = self.send(self.request(Method::GET, &url), &url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayApiError::transport(&url, &e))?;
        serde_json::from_slice(&bytes).map_err(|e| RelayApiError::malformed(subject, e.to_string()))
    }

    async fn write_config(&self, method: Method, endpoint: &str, name: &str) -> RelayResult<()> {
        let url = self.url(endpoint);
        let builder = self
            .request(method, &url)
            .json(&PathConfigBody::publisher(name));
        self.send(builder, &url).await.map(|_| ())
    }

    async fn delete(&self, endpoint: &str) -> RelayResult<()> {
        let url = self.url(endpoint);
        self.send(self.request(Method::DELETE, &url), &url)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RelayApi for MediaRelayClient {
    async fn list_paths(&self) -> RelayResult<Vec<RelayPathSummary>> {
        let list: RelayPathList = self.fetch_json("paths/list", "paths/list").await?;
        Ok(list.items)
    }

    async fn get_path(&self, name: &str) -> RelayResult<RelayPathDetail> {
        self.fetch_json(&format!("paths/get/{name}"), name).await
    }

    async fn get_path_config(&self, name: &str) -> RelayResult<serde_json::Value> {
        self.fetch_json(&format!("config/paths/get/{name}"), name)
            .await
    }

    async fn add_path_config(&self, name: &str) -> RelayResult<()> {
        self.write_config(Method::POST, &format!("config/paths/add/{name}"), name)
            .await
    }

    async fn patch_path_config(&self, name: &str) -> RelayResult<()> {
        self.write_config(Method::PATCH, &format!("config/paths/patch/{name}"), name)
            .await
    }

    async fn delete_path_config(&self, name: &str) -> RelayResult<()> {
        self.delete(&format!("config/paths/delete/{name}")).await
    }

    async fn delete_path(&self, name: &str) -> RelayResult<()> {
        self.delete(&format!("paths/delete/{name}")).await
    }

    async fn health_check(&self) -> RelayResult<()> {
        let url = self.url("config/paths/list");
        self.send(self.request(Method::GET, &url), &url)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_url_joining_ignores_extra_slashes() {
        let config = RelayConfig {
            api_url: "http://relay:9997/v3/".to_string(),
            ..RelayConfig::default()
        };
        let client = MediaRelayClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://relay:9997/v3");
        assert_eq!(client.url("/paths/list"), "http://relay:9997/v3/paths/list");
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_transport_error() {
        let config = RelayConfig {
            // Nothing listens on port 1
            api_url: "http://127.0.0.1:1/v3".to_string(),
            request_timeout: Duration::from_secs(1),
            ..RelayConfig::default()
        };
        let client = MediaRelayClient::new(&config).unwrap();
        let err = client.list_paths().await.unwrap_err();
        assert!(matches!(err, RelayApiError::Transport { .. }));
    }
}
