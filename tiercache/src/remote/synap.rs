//! Synap StreamableHTTP client used for the secondary remote tier
//!
//! All commands go to `POST {base}/api/v1/command` as
//! ```json
//! { "command": "kv.get", "request_id": "uuid", "payload": { ... } }
//! ```
//! Binary payloads are carried as base64 strings.

use super::RemoteStore;
use crate::core::{LayerError, LayerResult};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

/// Synap client configuration
#[derive(Debug, Clone)]
pub struct SynapStoreConfig {
    /// Base URL of the Synap server
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Optional authentication token
    pub auth_token: Option<String>,
}

impl SynapStoreConfig {
    /// Create a new configuration with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            auth_token: None,
        }
    }

    /// Set the timeout for requests
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Key-value client for a Synap server
#[derive(Clone)]
pub struct SynapStore {
    http_client: Client,
    command_url: Url,
}

impl SynapStore {
    /// Create a new Synap client
    pub fn new(config: SynapStoreConfig) -> LayerResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| LayerError::Unavailable(format!("invalid synap url: {}", e)))?;
        let command_url = base_url
            .join("api/v1/command")
            .map_err(|e| LayerError::Unavailable(format!("invalid synap url: {}", e)))?;

        let mut http_client_builder = Client::builder().timeout(config.timeout);

        if let Some(ref token) = config.auth_token {
            let mut headers = reqwest::header::HeaderMap::new();
            let value: reqwest::header::HeaderValue = format!("Bearer {}", token)
                .parse()
                .map_err(|_| LayerError::Unavailable("invalid auth token".to_string()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
            http_client_builder = http_client_builder.default_headers(headers);
        }

        let http_client = http_client_builder
            .build()
            .map_err(|e| LayerError::Unavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            command_url,
        })
    }

    /// Send a StreamableHTTP command and return its payload
    async fn send_command(&self, command: &str, payload: Value) -> LayerResult<Value> {
        let body = json!({
            "command": command,
            "request_id": uuid::Uuid::new_v4().to_string(),
            "payload": payload,
        });

        let response = self
            .http_client
            .post(self.command_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LayerError::Backend(format!("{}: {}", status, error_text)));
        }

        let result: Value = response.json().await.map_err(map_http_error)?;

        if !result["success"].as_bool().unwrap_or(false) {
            let error_msg = result["error"].as_str().unwrap_or("Unknown error");
            return Err(LayerError::Backend(error_msg.to_string()));
        }

        Ok(result["payload"].clone())
    }
}

fn map_http_error(e: reqwest::Error) -> LayerError {
    if e.is_connect() || e.is_timeout() {
        LayerError::Unavailable(e.to_string())
    } else {
        LayerError::Backend(e.to_string())
    }
}

/// Decode a `kv.get` payload back into the bytes written by `set_with_ttl`.
///
/// The server stores the JSON text of the value and returns it as a string,
/// so a base64 string written by this client comes back JSON-quoted.
fn decode_value(payload: &Value) -> LayerResult<Option<Vec<u8>>> {
    let text = match payload {
        Value::Null => return Ok(None),
        Value::String(s) => s,
        other => {
            return Err(LayerError::Backend(format!(
                "unexpected kv.get payload: {}",
                other
            )));
        }
    };

    let encoded = serde_json::from_str::<String>(text).unwrap_or_else(|_| text.clone());
    STANDARD
        .decode(encoded.as_bytes())
        .map(Some)
        .map_err(|e| LayerError::Backend(format!("invalid base64 payload: {}", e)))
}

#[async_trait]
impl RemoteStore for SynapStore {
    fn name(&self) -> &str {
        "synap"
    }

    async fn ping(&self) -> LayerResult<()> {
        self.send_command("kv.dbsize", json!({})).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> LayerResult<Option<Vec<u8>>> {
        let payload = self.send_command("kv.get", json!({ "key": key })).await?;
        decode_value(&payload)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> LayerResult<bool> {
        let payload = json!({
            "key": key,
            "value": STANDARD.encode(value),
            "ttl": ttl_secs.max(1),
        });
        self.send_command("kv.set", payload).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> LayerResult<bool> {
        let response = self.send_command("kv.del", json!({ "key": key })).await?;
        Ok(response["deleted"].as_bool().unwrap_or(false))
    }

    async fn flush_all(&self) -> LayerResult<bool> {
        self.send_command("kv.flushall", json!({})).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_url() {
        let store = SynapStore::new(SynapStoreConfig::new("http://localhost:15500")).unwrap();
        assert_eq!(
            store.command_url.as_str(),
            "http://localhost:15500/api/v1/command"
        );
    }

    #[test]
    fn test_invalid_url_is_unavailable() {
        let result = SynapStore::new(SynapStoreConfig::new("not a url"));
        assert!(matches!(result, Err(LayerError::Unavailable(_))));
    }

    #[test]
    fn test_decode_value_variants() {
        let bytes = vec![0u8, 159, 146, 150];
        let encoded = STANDARD.encode(&bytes);

        // JSON-quoted, as returned by the server
        let quoted = Value::String(format!("\"{}\"", encoded));
        assert_eq!(decode_value(&quoted).unwrap(), Some(bytes.clone()));

        // Bare base64
        assert_eq!(
            decode_value(&Value::String(encoded)).unwrap(),
            Some(bytes)
        );

        assert_eq!(decode_value(&Value::Null).unwrap(), None);
        assert!(decode_value(&json!(42)).is_err());
    }

    #[tokio::test]
    async fn test_get_decodes_server_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/command")
            .match_body(mockito::Matcher::PartialJson(
                json!({ "command": "kv.get", "payload": { "key": "user:1" } }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "success": true, "payload": "\"AQID\"" }).to_string())
            .create_async()
            .await;

        let store = SynapStore::new(SynapStoreConfig::new(server.url())).unwrap();
        assert_eq!(store.get("user:1").await.unwrap(), Some(vec![1, 2, 3]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_sends_base64_and_ttl() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/command")
            .match_body(mockito::Matcher::PartialJson(json!({
                "command": "kv.set",
                "payload": { "key": "k", "value": "AQID", "ttl": 30 }
            })))
            .with_status(200)
            .with_body(json!({ "success": true, "payload": { "success": true } }).to_string())
            .create_async()
            .await;

        let store = SynapStore::new(SynapStoreConfig::new(server.url())).unwrap();
        assert!(store.set_with_ttl("k", &[1, 2, 3], 30).await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_command_failure_is_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/command")
            .with_status(200)
            .with_body(json!({ "success": false, "error": "Key too long" }).to_string())
            .create_async()
            .await;

        let store = SynapStore::new(SynapStoreConfig::new(server.url())).unwrap();
        assert_eq!(
            store.delete("k").await,
            Err(LayerError::Backend("Key too long".to_string()))
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/command")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let store = SynapStore::new(SynapStoreConfig::new(server.url())).unwrap();
        assert!(matches!(store.ping().await, Err(LayerError::Backend(_))));
    }

    #[test]
    fn test_config_builder() {
        let config = SynapStoreConfig::new("http://cache:15500")
            .with_timeout(Duration::from_millis(250))
            .with_auth_token("secret");
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert!(SynapStore::new(config).is_ok());
    }
}
