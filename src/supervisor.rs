use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::device::{AccessoryKind, MediaState};
use crate::error::GatewayError;
use crate::gateway::ByteStream;
use crate::notifications::{parse_line, LineBuffer, NotificationEvent};
use crate::session::DeviceSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Disconnected,
    Connecting,
    Streaming,
}

/// Keeps the notification stream of one device open.
///
/// Every `interval` (first tick immediately) the current stream is dropped,
/// power is polled and the stream is reopened. A stream that fails or ends
/// stays down until the next reset.
pub struct StreamSupervisor {
    session: Arc<DeviceSession>,
    interval: Duration,
    state: watch::Sender<StreamState>,
}

pub struct SupervisorHandle {
    state: watch::Receiver<StreamState>,
    task_handle: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    pub fn shutdown(&self) {
        self.task_handle.abort();
    }
}

impl StreamSupervisor {
    pub fn new(session: Arc<DeviceSession>, interval: Duration) -> Self {
        let (state, _) = watch::channel(StreamState::Disconnected);
        Self {
            session,
            interval,
            state,
        }
    }

    pub fn start(self) -> SupervisorHandle {
        let state = self.state.subscribe();
        let task_handle = tokio::spawn(self.run());
        SupervisorHandle { state, task_handle }
    }

    fn set_state(&self, state: StreamState) {
        self.state.send_replace(state);
    }

    async fn run(self) {
        let name = self.session.name().to_string();
        info!(
            "[{}] Starting notification stream (reset every {:?})",
            name, self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stream: Option<ByteStream> = None;
        let mut lines = LineBuffer::default();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if stream.take().is_some() {
                        debug!("[{}] Resetting notification stream", name);
                    }
                    lines.clear();
                    self.set_state(StreamState::Disconnected);

                    self.session.refresh_power().await;

                    self.set_state(StreamState::Connecting);
                    match self.session.open_notifications().await {
                        Ok(opened) => {
                            debug!("[{}] Notification stream connected", name);
                            stream = Some(opened);
                            self.set_state(StreamState::Streaming);
                        }
                        Err(e) => {
                            warn!("[{}] Opening notification stream failed: {}", name, e);
                            self.set_state(StreamState::Disconnected);
                        }
                    }
                }
                chunk = next_chunk(&mut stream) => match chunk {
                    Some(Ok(bytes)) => {
                        for line in lines.push(&bytes) {
                            self.handle_line(&line).await;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("[{}] Notification stream error: {}", name, e);
                        stream = None;
                        self.set_state(StreamState::Disconnected);
                    }
                    None => {
                        warn!("[{}] Notification stream closed", name);
                        stream = None;
                        self.set_state(StreamState::Disconnected);
                    }
                },
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        if self.session.settings().debug {
            info!("[{}] Notification: {}", self.session.name(), line);
        }
        match parse_line(line) {
            Ok(event) => dispatch(&self.session, event).await,
            Err(e) => warn!("[{}] Skipping notification: {}", self.session.name(), e),
        }
    }
}

async fn next_chunk(stream: &mut Option<ByteStream>) -> Option<Result<Bytes, GatewayError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => futures::future::pending().await,
    }
}

/// Apply one device notification to the session.
pub async fn dispatch(session: &DeviceSession, event: NotificationEvent) {
    match event {
        NotificationEvent::Volume(volume) => {
            session.update_volume(volume.level, volume.range.maximum).await;
            session.update_mute(volume.muted).await;
        }
        NotificationEvent::Source(sources) => {
            if session.kind() == AccessoryKind::Tv {
                session
                    .update_input(sources.primary.filter(|id| !id.is_empty()))
                    .await;
            }
        }
        NotificationEvent::Shutdown => {
            session.update_power(false).await;
        }
        NotificationEvent::ProgressInformation(progress) => {
            let Some(media_state) = progress.media_state() else {
                debug!("[{}] Unknown playback state {}", session.name(), progress.state);
                return;
            };
            if media_state == MediaState::Play && !session.cached_state().await.power {
                session.update_power(true).await;
            }
            session.update_media_state(media_state).await;
        }
        NotificationEvent::NowPlaying { kind, data } => {
            debug!("[{}] {}: {}", session.name(), kind, data);
        }
        NotificationEvent::Other(kind) => {
            debug!("[{}] Ignoring {} notification", session.name(), kind);
        }
    }
}
