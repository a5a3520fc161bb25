//! Newline-delimited JSON records from `/BeoNotify/Notifications`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::NotificationError;
use crate::wire::{ActiveSources, ProgressInformation, SpeakerVolume};

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Volume(SpeakerVolume),
    Source(ActiveSources),
    Shutdown,
    ProgressInformation(ProgressInformation),
    NowPlaying { kind: String, data: Value },
    Other(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    notification: Notification,
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, NotificationError> {
    serde_json::from_value(data).map_err(|source| NotificationError::Payload {
        kind: kind.to_string(),
        source,
    })
}

pub fn parse_line(line: &str) -> Result<NotificationEvent, NotificationError> {
    let Envelope { notification } = serde_json::from_str(line)?;
    let Notification { kind, data } = notification;

    let event = match kind.as_str() {
        "VOLUME" => NotificationEvent::Volume(payload(&kind, data)?),
        "SOURCE" => NotificationEvent::Source(payload(&kind, data)?),
        "SHUTDOWN" => NotificationEvent::Shutdown,
        "PROGRESS_INFORMATION" => NotificationEvent::ProgressInformation(payload(&kind, data)?),
        k if k.starts_with("NOW_PLAYING") => NotificationEvent::NowPlaying { kind, data },
        _ => NotificationEvent::Other(kind),
    };
    Ok(event)
}

/// Longest record kept while waiting for its newline.
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

/// Reassembles lines from arbitrarily split stream chunks. Blank lines are
/// heartbeats and are dropped. A record longer than [`MAX_RECORD_BYTES`] is
/// discarded up to its terminating newline.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    discarding: bool,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.pending.len() + head.len() > MAX_RECORD_BYTES {
                warn!("Dropping notification record over {} bytes", MAX_RECORD_BYTES);
                self.pending.clear();
                continue;
            }

            self.pending.extend_from_slice(head);
            let line = std::mem::take(&mut self.pending);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }

        if !self.discarding {
            if self.pending.len() + rest.len() > MAX_RECORD_BYTES {
                warn!("Dropping notification record over {} bytes", MAX_RECORD_BYTES);
                self.pending.clear();
                self.discarding = true;
            } else {
                self.pending.extend_from_slice(rest);
            }
        }
        lines
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}
