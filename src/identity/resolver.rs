use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use super::{IdentityError, IdentityKey};
use crate::config::IdentityConfig;

/// One-shot source of the caller's identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self) -> Result<IdentityKey, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct IpEcho {
    ip: String,
}

/// Asks a public IP-echo service (`GET` → `{"ip": "..."}`) for the caller's
/// address. One request per call, no retries.
#[derive(Clone)]
pub struct IpEchoClient {
    client: reqwest::Client,
    url: String,
}

impl IpEchoClient {
    pub fn new(config: &IdentityConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.echo_url.clone(),
        })
    }
}

#[async_trait]
impl IdentityResolver for IpEchoClient {
    async fn resolve(&self) -> Result<IdentityKey, IdentityError> {
        let echo = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json::<IpEcho>()
            .await?;

        let ip = echo
            .ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| IdentityError::Malformed(echo.ip.clone()))?;

        tracing::debug!(%ip, url = %self.url, "resolved visitor identity");
        Ok(IdentityKey::from(ip))
    }
}

/// Identity already known to the caller (e.g. taken from the request socket).
#[derive(Debug, Clone)]
pub struct StaticResolver(pub IdentityKey);

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve(&self) -> Result<IdentityKey, IdentityError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_echo(body: Value) -> String {
        let app = Router::new().route("/", get(move || async move { Json(body) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn client_for(url: String) -> IpEchoClient {
        IpEchoClient::new(&IdentityConfig {
            echo_url: url,
            timeout_secs: 2,
            ..IdentityConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolves_echoed_ip() {
        let url = spawn_echo(json!({"ip": "203.0.113.7"})).await;
        let key = client_for(url).resolve().await.unwrap();
        assert_eq!(key.as_str(), "203.0.113.7");
    }

    #[tokio::test]
    async fn test_rejects_non_ip_payload() {
        let url = spawn_echo(json!({"ip": "definitely not an address"})).await;
        let err = client_for(url).resolve().await.unwrap_err();
        assert!(matches!(err, IdentityError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_echo_is_request_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(format!("http://{addr}/")).resolve().await.unwrap_err();
        assert!(matches!(err, IdentityError::Request(_)));
    }
}
