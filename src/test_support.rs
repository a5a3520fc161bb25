//! Scripted device transport and helpers shared by the unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{DeviceConfig, DeviceSettings, NumberOrString, SpeakerGroupConfig};
use crate::device::SpeakerGroup;
use crate::endpoints::{DeviceEndpoints, Endpoint};
use crate::error::GatewayError;
use crate::gateway::{ByteStream, DeviceTransport, GatewayResponse};
use crate::hub::CharacteristicSink;
use crate::mapper::CharacteristicUpdate;
use crate::resolver::JID_HEADER;
use crate::session::DeviceSession;

pub const DEVICE_IP: &str = "192.168.1.100";
pub const DEVICE_JID: &str = "2714.1200298.28143357@products.bang-olufsen.com";
pub const HDMI_ID: &str = "hdmi:1111.2222.3333@products.bang-olufsen.com";
pub const SPOTIFY_ID: &str = "spotify:1111.2222.3333@products.bang-olufsen.com";

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<CharacteristicUpdate>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<CharacteristicUpdate> {
        self.updates.lock().clone()
    }

    pub fn clear(&self) {
        self.updates.lock().clear();
    }
}

impl CharacteristicSink for RecordingSink {
    fn publish(&self, update: CharacteristicUpdate) {
        self.updates.lock().push(update);
    }
}

/// Unscripted GETs fail; unscripted writes succeed with an empty body.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<(Method, String), Option<GatewayResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
    streams: Mutex<VecDeque<ByteStream>>,
    stream_opens: AtomicUsize,
    sink: Arc<RecordingSink>,
}

fn ok_response(body: Value, headers: HeaderMap) -> GatewayResponse {
    GatewayResponse {
        status: StatusCode::OK,
        headers,
        body,
    }
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: Method, url: &str, body: Value) {
        self.responses
            .lock()
            .insert((method, url.to_string()), Some(ok_response(body, HeaderMap::new())));
    }

    pub fn respond_with_header(&self, method: Method, url: &str, body: Value, name: &'static str, value: &str) {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
        self.responses
            .lock()
            .insert((method, url.to_string()), Some(ok_response(body, headers)));
    }

    pub fn fail(&self, method: Method, url: &str) {
        self.responses.lock().insert((method, url.to_string()), None);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: Method, url: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.url == url)
            .collect()
    }

    pub fn writes(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method != Method::GET)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Queue a notification stream for the next `open_stream`; send chunks on the returned end.
    pub fn push_stream(&self) -> mpsc::UnboundedSender<Result<Bytes, GatewayError>> {
        let (tx, rx) = mpsc::unbounded();
        self.streams.lock().push_back(rx.boxed());
        tx
    }

    pub fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    pub fn sink(&self) -> Arc<RecordingSink> {
        self.sink.clone()
    }
}

#[async_trait]
impl DeviceTransport for FakeTransport {
    async fn request(&self, url: &str, body: Option<&Value>, method: Method) -> Option<GatewayResponse> {
        self.calls.lock().push(RecordedCall {
            method: method.clone(),
            url: url.to_string(),
            body: body.cloned(),
        });

        let scripted = self.responses.lock().get(&(method.clone(), url.to_string())).cloned();
        match scripted {
            Some(response) => response,
            None if method == Method::GET => None,
            None => Some(ok_response(Value::Null, HeaderMap::new())),
        }
    }

    async fn open_stream(&self, _url: &str) -> Result<ByteStream, GatewayError> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        self.streams
            .lock()
            .pop_front()
            .ok_or(GatewayError::Status(StatusCode::SERVICE_UNAVAILABLE))
    }
}

pub fn script_device_info(transport: &FakeTransport, endpoints: &DeviceEndpoints) {
    transport.respond_with_header(
        Method::GET,
        endpoints.url(Endpoint::DeviceInfo),
        json!({"beoDevice": {"productId": {"productType": "BeoVision Eclipse", "serialNumber": "28143357"}}}),
        JID_HEADER,
        DEVICE_JID,
    );
}

pub fn script_sources(transport: &FakeTransport, endpoints: &DeviceEndpoints, sources: &[(&str, &str, &str)]) {
    let sources: Vec<Value> = sources
        .iter()
        .map(|(id, name, kind)| json!([id, {"friendlyName": name, "sourceType": {"type": kind}}]))
        .collect();
    transport.respond(Method::GET, endpoints.url(Endpoint::SourceList), json!({ "sources": sources }));
}

/// An initialized session for `kind`, with call history cleared. Televisions
/// report an HDMI and a Spotify source, everything else only Spotify.
pub async fn session(
    transport: &Arc<FakeTransport>,
    kind: &str,
    configure: impl FnOnce(&mut DeviceConfig),
) -> DeviceSession {
    let mut config = DeviceConfig {
        name: Some("Test".to_string()),
        ip: Some(DEVICE_IP.to_string()),
        kind: Some(kind.to_string()),
        ..Default::default()
    };
    configure(&mut config);
    let settings = DeviceSettings::from_config(&config).unwrap();

    let endpoints = DeviceEndpoints::new(DEVICE_IP).unwrap();
    script_device_info(transport, &endpoints);
    if kind == "tv" {
        script_sources(
            transport,
            &endpoints,
            &[(HDMI_ID, "HDMI 1", "HDMI"), (SPOTIFY_ID, "Spotify", "SPOTIFY")],
        );
    } else {
        script_sources(transport, &endpoints, &[(SPOTIFY_ID, "Spotify", "SPOTIFY")]);
    }

    let device: Arc<dyn DeviceTransport> = transport.clone();
    let sink: Arc<dyn CharacteristicSink> = transport.sink();
    let mut session = DeviceSession::new(settings, device, sink).unwrap();
    session.initialize().await.unwrap();
    transport.clear_calls();
    session
}

pub async fn speaker_session(transport: &Arc<FakeTransport>) -> DeviceSession {
    session(transport, "speaker", |_| {}).await
}

pub async fn tv_session(transport: &Arc<FakeTransport>) -> DeviceSession {
    session(transport, "tv", |_| {}).await
}

/// A television with the given speaker groups configured, the first one active.
pub async fn tv_session_with_groups(transport: &Arc<FakeTransport>, groups: Vec<SpeakerGroup>) -> DeviceSession {
    let endpoints = DeviceEndpoints::new(DEVICE_IP).unwrap();
    transport.respond(
        Method::GET,
        endpoints.url(Endpoint::SpeakerGroupStatus),
        json!({"speakerGroup": {"list": [], "active": groups.first().map(|g| g.id)}}),
    );

    session(transport, "tv", |config| {
        config.speakergroups = groups
            .iter()
            .map(|g| SpeakerGroupConfig {
                id: Some(NumberOrString::Number(i64::from(g.id))),
                name: Some(g.name.clone()),
            })
            .collect();
    })
    .await
}
