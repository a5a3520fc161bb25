use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ProxySettings;
use crate::error::GatewayError;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub type ByteStream = BoxStream<'static, Result<Bytes, GatewayError>>;

#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body, `Null` when the device sent nothing.
    pub body: Value,
}

impl GatewayResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.body.clone()).ok()
    }
}

/// Outbound access to one device. Request failures of any kind come back as `None`.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn request(&self, url: &str, body: Option<&Value>, method: Method) -> Option<GatewayResponse>;

    async fn open_stream(&self, url: &str) -> Result<ByteStream, GatewayError>;
}

pub struct HttpGateway {
    name: String,
    client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(name: impl Into<String>, proxy: Option<&ProxySettings>) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        let mut stream_builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);

        if let Some(proxy) = proxy {
            let url = proxy.url();
            builder = builder.proxy(reqwest::Proxy::http(&url).map_err(GatewayError::Proxy)?);
            stream_builder =
                stream_builder.proxy(reqwest::Proxy::http(&url).map_err(GatewayError::Proxy)?);
        }

        Ok(Self {
            name: name.into(),
            client: builder.build().map_err(GatewayError::Client)?,
            stream_client: stream_builder.build().map_err(GatewayError::Client)?,
        })
    }

    async fn send(&self, url: &str, body: Option<&Value>, method: Method) -> Result<GatewayResponse, GatewayError> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                debug!("[{}] Response from {} is not JSON: {}", self.name, url, e);
                Value::Null
            })
        };

        Ok(GatewayResponse { status, headers, body })
    }
}

#[async_trait]
impl DeviceTransport for HttpGateway {
    async fn request(&self, url: &str, body: Option<&Value>, method: Method) -> Option<GatewayResponse> {
        debug!("[{}] {} {}", self.name, method, url);
        match self.send(url, body, method.clone()).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("[{}] Error on HTTP request {} {}: {}", self.name, method, url, e);
                None
            }
        }
    }

    async fn open_stream(&self, url: &str) -> Result<ByteStream, GatewayError> {
        let response = self.stream_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(GatewayError::from))
            .boxed())
    }
}
