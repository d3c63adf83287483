//! PurpleAir API client
//!
//! One call: `GET {api_base}/sensors/{sensor_index}` with the read key in
//! `X-API-Key`. The JSON body is handed over as-is; flattening happens in
//! the core.

use crate::config::SensorConfig;
use crate::credentials::ApiKey;
use airwatch_core::{NestedRecord, SensorSource, SourceError};
use anyhow::Result;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-API-Key";

pub struct PurpleAirClient {
    http: reqwest::Client,
    api_base: String,
    key: ApiKey,
}

impl PurpleAirClient {
    pub fn new(config: &SensorConfig, key: ApiKey) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("airwatch-agent/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self::from_parts(builder.build()?, &config.api_base, key))
    }

    fn from_parts(http: reqwest::Client, api_base: &str, key: ApiKey) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            key,
        }
    }

    pub fn sensor_url(&self, sensor_id: &str) -> String {
        format!("{}/sensors/{}", self.api_base, sensor_id)
    }
}

impl SensorSource for PurpleAirClient {
    async fn fetch_reading(&self, sensor_id: &str) -> Result<NestedRecord, SourceError> {
        let url = self.sensor_url(sensor_id);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, self.key.expose())
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        match body {
            Value::Object(reading) => Ok(reading),
            other => Err(SourceError::Malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves one canned HTTP response and hands back the raw request.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        });

        (format!("http://{addr}/v1"), rx)
    }

    // Local test servers must not go through a proxy picked up from the environment.
    fn client(api_base: String) -> PurpleAirClient {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        PurpleAirClient::from_parts(http, &api_base, ApiKey::new("TEST-KEY"))
    }

    #[test]
    fn test_new_applies_config() {
        let config = SensorConfig {
            request_timeout_secs: Some(30),
            ..SensorConfig::default()
        };
        let c = PurpleAirClient::new(&config, ApiKey::new("k")).unwrap();
        assert_eq!(c.sensor_url("143856"), "https://api.purpleair.com/v1/sensors/143856");
    }

    #[tokio::test]
    async fn test_fetch_reading_ok() {
        let (base, request) = serve_once(
            "200 OK",
            r#"{"api_version":"V1.0.11","sensor":{"sensor_index":143856,"stats":{"pm2.5":4.2}}}"#,
        )
        .await;

        let reading = client(base).fetch_reading("143856").await.unwrap();
        assert_eq!(reading["sensor"]["sensor_index"], 143856);

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /v1/sensors/143856 "));
        assert!(request.to_ascii_lowercase().contains("x-api-key: test-key"));
    }

    #[tokio::test]
    async fn test_rejected_key_is_auth_error() {
        let (base, _request) = serve_once("403 Forbidden", r#"{"error":"ApiKeyInvalidError"}"#).await;

        let err = client(base).fetch_reading("143856").await.unwrap_err();
        assert!(matches!(err, SourceError::Auth { status: 403 }));
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let (base, _request) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;

        let err = client(base).fetch_reading("143856").await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_non_object_body_is_malformed() {
        let (base, _request) = serve_once("200 OK", "[1,2,3]").await;

        let err = client(base).fetch_reading("143856").await.unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{addr}/v1")).fetch_reading("1").await.unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }

    #[test]
    fn test_sensor_url_trims_slash() {
        let c = client("https://api.purpleair.com/v1/".into());
        assert_eq!(c.sensor_url("143856"), "https://api.purpleair.com/v1/sensors/143856");
    }
}
