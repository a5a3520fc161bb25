use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DeviceSettings;
use crate::device::{
    AccessoryKind, CachedDeviceState, ControlMode, DeviceInfo, InputSource, MediaState, PowerOnMethod,
    SpeakerGroup,
};
use crate::endpoints::{DeviceEndpoints, Endpoint};
use crate::error::{GatewayError, SetupError};
use crate::gateway::{ByteStream, DeviceTransport, GatewayResponse};
use crate::hub::{accessory_uuid, CharacteristicSink};
use crate::mapper::{self, Binding, CharacteristicUpdate, Dimension, Polarity};
use crate::resolver;
use crate::wire::{self, ActiveSourcesBody, PowerBody, SpeakerGroupBody, VolumeBody};

/// One device: its resolved capabilities, the cached device state and the
/// commands that keep both sides in sync.
///
/// Commands write through the transport and update the cache only after the
/// device accepts them. `update_*` methods apply state reported by the device
/// and publish to the hub only when the cached value changes. The cache lock is
/// never held across a device request.
pub struct DeviceSession {
    settings: DeviceSettings,
    endpoints: DeviceEndpoints,
    transport: Arc<dyn DeviceTransport>,
    sink: Arc<dyn CharacteristicSink>,
    accessory_id: Uuid,
    bindings: Vec<Binding>,
    info: DeviceInfo,
    inputs: Vec<InputSource>,
    speaker_groups: Vec<SpeakerGroup>,
    power_on: PowerOnMethod,
    default_input: u32,
    state: RwLock<CachedDeviceState>,
}

impl DeviceSession {
    pub fn new(
        settings: DeviceSettings,
        transport: Arc<dyn DeviceTransport>,
        sink: Arc<dyn CharacteristicSink>,
    ) -> Result<Self, SetupError> {
        let endpoints = DeviceEndpoints::new(&settings.ip)?;
        let accessory_id = accessory_uuid(&settings.name, &settings.ip, settings.kind);
        let bindings = mapper::bindings(settings.kind, settings.mode);

        Ok(Self {
            endpoints,
            transport,
            sink,
            accessory_id,
            bindings,
            info: DeviceInfo::default(),
            inputs: settings.inputs.clone(),
            speaker_groups: settings.speaker_groups.clone(),
            power_on: settings.power_on,
            default_input: settings.default_input,
            state: RwLock::new(CachedDeviceState::default()),
            settings,
        })
    }

    /// Resolve identity and capabilities. Must complete before the session is
    /// wired to an accessory.
    pub async fn initialize(&mut self) -> Result<(), SetupError> {
        let resolved = resolver::resolve(self.transport.as_ref(), &self.endpoints, &self.settings).await?;

        self.info = resolved.info;
        self.inputs = resolved.inputs;
        self.speaker_groups = resolved.speaker_groups;
        self.power_on = resolved.power_on;
        self.default_input = resolved.default_input;
        self.state.get_mut().speaker_group = resolved.active_speaker_group;

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn kind(&self) -> AccessoryKind {
        self.settings.kind
    }

    pub fn mode(&self) -> ControlMode {
        self.settings.mode
    }

    pub fn power_on_method(&self) -> PowerOnMethod {
        self.power_on
    }

    pub fn default_input(&self) -> u32 {
        self.default_input
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn endpoints(&self) -> &DeviceEndpoints {
        &self.endpoints
    }

    pub fn accessory_id(&self) -> Uuid {
        self.accessory_id
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn inputs(&self) -> &[InputSource] {
        &self.inputs
    }

    pub fn speaker_groups(&self) -> &[SpeakerGroup] {
        &self.speaker_groups
    }

    pub fn max_volume_scaling(&self) -> bool {
        self.settings.max_volume_scaling
    }

    pub async fn cached_state(&self) -> CachedDeviceState {
        self.state.read().await.clone()
    }

    pub async fn open_notifications(&self) -> Result<ByteStream, GatewayError> {
        self.transport
            .open_stream(self.endpoints.url(Endpoint::Notifications))
            .await
    }

    async fn call(&self, endpoint: Endpoint, body: Option<Value>, method: Method) -> Option<GatewayResponse> {
        self.transport
            .request(self.endpoints.url(endpoint), body.as_ref(), method)
            .await
    }

    fn publish(&self, dimension: Dimension, state: &CachedDeviceState) {
        for binding in self.bindings.iter().filter(|b| b.dimension == dimension) {
            if let Some(value) =
                mapper::hub_value(binding, state, &self.inputs, self.settings.max_volume_scaling)
            {
                self.sink.publish(CharacteristicUpdate {
                    accessory: self.accessory_id,
                    service: binding.service,
                    characteristic: binding.characteristic,
                    value,
                });
            }
        }
    }

    /// Apply an accepted command to the cache and publish the touched dimensions.
    async fn commit(&self, dimensions: &[Dimension], apply: impl FnOnce(&mut CachedDeviceState)) {
        let snapshot = {
            let mut state = self.state.write().await;
            apply(&mut state);
            state.clone()
        };
        for dimension in dimensions {
            self.publish(*dimension, &snapshot);
        }
    }

    // Commands

    pub async fn set_mute_state(&self, value: bool, polarity: Polarity) -> bool {
        let muted = mapper::device_muted_from(polarity, value);

        if self
            .call(Endpoint::MuteSet, Some(wire::muted_body(muted)), Method::PUT)
            .await
            .is_none()
        {
            warn!("[{}] set_mute_state() request failed", self.name());
            return false;
        }

        self.commit(&[Dimension::Mute], |state| state.muted = muted).await;
        info!(
            "[{}] Mute state set to {}",
            self.name(),
            if muted { "MUTED" } else { "NOT MUTED" }
        );
        true
    }

    pub async fn set_power_state(&self, value: bool, polarity: Polarity) -> bool {
        let on = mapper::device_on_from(polarity, value);
        let current = self.state.read().await.power;

        if on && current {
            debug!("[{}] Device is already on", self.name());
            return true;
        }

        if on {
            match self.power_on {
                PowerOnMethod::Input => {
                    info!("[{}] Powering on via setting input {}", self.name(), self.default_input);
                    let ok = self.set_input(self.default_input).await;
                    if ok {
                        self.commit(&[Dimension::Power], |state| state.power = true).await;
                    }
                    return ok;
                }
                PowerOnMethod::Join => {
                    info!("[{}] Powering on via joining experience", self.name());
                    let ok = self.join_experience().await;
                    if ok {
                        self.commit(&[Dimension::Power], |state| state.power = true).await;
                    }
                    return ok;
                }
                PowerOnMethod::On => {}
            }
        }

        if self
            .call(Endpoint::PowerSet, Some(wire::standby_body(on)), Method::PUT)
            .await
            .is_none()
        {
            warn!("[{}] set_power_state() request failed", self.name());
            return false;
        }

        self.commit(&[Dimension::Power], |state| state.power = on).await;
        info!(
            "[{}] Power state set to {}",
            self.name(),
            if on { "ON" } else { "STANDBY" }
        );
        true
    }

    /// `value` is a hub volume: a percentage when max volume scaling is on,
    /// otherwise a raw device level. The hub is sent the level actually
    /// written, so a scaled value snaps to the nearest device step.
    pub async fn set_volume(&self, value: u32) -> bool {
        let max = self.state.read().await.max_volume;
        let scaling = self.settings.max_volume_scaling;

        let requested = if scaling {
            mapper::scale_to_device(value, max)
        } else {
            value
        };
        let level = mapper::clamp_volume(requested, max);

        if self
            .call(Endpoint::VolumeSet, Some(wire::level_body(level)), Method::PUT)
            .await
            .is_none()
        {
            warn!("[{}] set_volume() request failed", self.name());
            return false;
        }

        if level != requested {
            debug!("[{}] Volume {} was limited to {}", self.name(), requested, level);
        }
        self.commit(&[Dimension::Volume], |state| state.volume = level).await;
        info!("[{}] Volume set to {}", self.name(), level);
        true
    }

    /// Move the raw device level by one step.
    pub async fn step_volume(&self, up: bool) -> bool {
        let (current, max) = {
            let state = self.state.read().await;
            (state.volume, state.max_volume)
        };
        info!(
            "[{}] Volume {} pressed, current volume: {}, limit: {}",
            self.name(),
            if up { "Up" } else { "Down" },
            current,
            max
        );

        let level = if up {
            current.saturating_add(1).min(max)
        } else {
            current.saturating_sub(1)
        };
        if level == current {
            return false;
        }

        if self
            .call(Endpoint::VolumeSet, Some(wire::level_body(level)), Method::PUT)
            .await
            .is_none()
        {
            warn!("[{}] step_volume() request failed", self.name());
            return false;
        }

        self.commit(&[Dimension::Volume], |state| state.volume = level).await;
        info!("[{}] Volume set to {}", self.name(), level);
        true
    }

    /// Select the input at a 1-based index. The "None" entry and unknown
    /// indexes are not written; the hub is corrected from the device instead.
    pub async fn set_input(&self, index: u32) -> bool {
        let input = index
            .checked_sub(1)
            .and_then(|i| self.inputs.get(i as usize))
            .filter(|input| !input.is_none_entry());

        let Some(input) = input else {
            warn!("[{}] Input {} cannot be selected", self.name(), index);
            self.refresh_input(true).await;
            return false;
        };

        let body = wire::input_body(&input.api_id, &self.info.jid);
        if self.call(Endpoint::InputSet, Some(body), Method::POST).await.is_none() {
            warn!("[{}] set_input() request failed", self.name());
            return false;
        }

        let api_id = input.api_id.clone();
        self.commit(&[Dimension::Input], |state| state.active_input = Some(api_id)).await;
        info!("[{}] Input set to {}", self.name(), input.name);
        true
    }

    pub async fn set_speaker_group(&self, id: u32) -> bool {
        if self.state.read().await.speaker_group == Some(id) {
            debug!("[{}] Speaker group {} already active", self.name(), id);
            return true;
        }

        if self
            .call(Endpoint::SpeakerGroupSet, Some(wire::speaker_group_body(id)), Method::PUT)
            .await
            .is_none()
        {
            warn!("[{}] set_speaker_group() request failed", self.name());
            return false;
        }

        self.commit(&[], |state| state.speaker_group = Some(id)).await;
        let name = self
            .speaker_groups
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.name.as_str())
            .unwrap_or("unknown");
        info!("[{}] Speaker group set to {} ({})", self.name(), id, name);
        true
    }

    /// Step to the next or previous speaker group, wrapping around.
    pub async fn cycle_speaker_group(&self, forward: bool) -> bool {
        if self.speaker_groups.is_empty() {
            debug!("[{}] No speaker groups to cycle through", self.name());
            return false;
        }

        let len = self.speaker_groups.len();
        let active = self.state.read().await.speaker_group;
        let position = active.and_then(|id| self.speaker_groups.iter().position(|g| g.id == id));
        let next = match (position, forward) {
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
            (None, true) => 0,
            (None, false) => len - 1,
        };

        self.set_speaker_group(self.speaker_groups[next].id).await
    }

    pub async fn toggle_mute(&self) -> bool {
        let muted = self.state.read().await.muted;
        self.set_mute_state(!muted, Polarity::Muted).await
    }

    pub async fn join_experience(&self) -> bool {
        if self.call(Endpoint::Join, None, Method::POST).await.is_none() {
            warn!("[{}] join_experience() request failed", self.name());
            return false;
        }
        info!("[{}] Joined multiroom experience", self.name());
        true
    }

    pub async fn leave_experience(&self) -> bool {
        if self.call(Endpoint::Leave, None, Method::DELETE).await.is_none() {
            warn!("[{}] leave_experience() request failed", self.name());
            return false;
        }
        info!("[{}] Left multiroom experience", self.name());
        true
    }

    async fn transport_command(&self, endpoint: Endpoint, label: &str, media_state: Option<MediaState>) -> bool {
        if self.call(endpoint, None, Method::POST).await.is_none() {
            warn!("[{}] {} request failed", self.name(), label);
            return false;
        }
        if let Some(media_state) = media_state {
            self.commit(&[Dimension::Media], |state| state.media_state = media_state)
                .await;
        }
        info!("[{}] {}", self.name(), label);
        true
    }

    pub async fn play(&self) -> bool {
        self.transport_command(Endpoint::Play, "Play", Some(MediaState::Play)).await
    }

    pub async fn pause(&self) -> bool {
        self.transport_command(Endpoint::Pause, "Pause", Some(MediaState::Pause)).await
    }

    pub async fn stop(&self) -> bool {
        self.transport_command(Endpoint::Stop, "Stop", Some(MediaState::Stop)).await
    }

    pub async fn forward(&self) -> bool {
        self.transport_command(Endpoint::Forward, "Forward", None).await
    }

    pub async fn back(&self) -> bool {
        self.transport_command(Endpoint::Back, "Back", None).await
    }

    pub async fn toggle_playback(&self) -> bool {
        if self.state.read().await.media_state == MediaState::Play {
            self.pause().await
        } else {
            self.play().await
        }
    }

    // Polls

    /// Seed the cache from the device after setup.
    pub async fn poll(&self) {
        self.refresh_power().await;
        self.refresh_volume().await;
        if self.bindings.iter().any(|b| b.dimension == Dimension::Input) {
            self.refresh_input(false).await;
        }
        if !self.speaker_groups.is_empty() {
            self.refresh_speaker_group().await;
        }
    }

    pub async fn refresh_power(&self) -> Option<bool> {
        let Some(body) = self
            .call(Endpoint::PowerStatus, None, Method::GET)
            .await
            .and_then(|r| r.parse::<PowerBody>())
        else {
            warn!("[{}] refresh_power() request failed", self.name());
            return None;
        };

        let on = body.profile.power_management.standby.is_on();
        debug!(
            "[{}] Device is currently {}",
            self.name(),
            body.profile.power_management.standby.power_state
        );
        self.update_power(on).await;
        Some(on)
    }

    pub async fn refresh_volume(&self) -> Option<u32> {
        let Some(body) = self
            .call(Endpoint::VolumeStatus, None, Method::GET)
            .await
            .and_then(|r| r.parse::<VolumeBody>())
        else {
            warn!("[{}] refresh_volume() request failed", self.name());
            return None;
        };

        let speaker = body.volume.speaker;
        self.update_volume(speaker.level, speaker.range.maximum).await;
        self.update_mute(speaker.muted).await;
        Some(speaker.level)
    }

    /// Read the active input. With `force` the hub is updated even when the
    /// cache already agrees, to undo a rejected selection.
    pub async fn refresh_input(&self, force: bool) -> Option<String> {
        let Some(body) = self
            .call(Endpoint::InputStatus, None, Method::GET)
            .await
            .and_then(|r| r.parse::<ActiveSourcesBody>())
        else {
            warn!("[{}] refresh_input() request failed", self.name());
            return None;
        };

        let primary = body.active_sources.primary.filter(|id| !id.is_empty());
        self.apply_input(primary.clone(), force).await;
        primary
    }

    pub async fn refresh_speaker_group(&self) -> Option<u32> {
        let Some(body) = self
            .call(Endpoint::SpeakerGroupStatus, None, Method::GET)
            .await
            .and_then(|r| r.parse::<SpeakerGroupBody>())
        else {
            warn!("[{}] refresh_speaker_group() request failed", self.name());
            return None;
        };

        let active = body.speaker_group.active;
        self.update_speaker_group(active).await;
        active
    }

    // Reconciliation

    pub async fn update_volume(&self, level: u32, max: u32) -> bool {
        let snapshot = {
            let mut state = self.state.write().await;
            if state.volume == level && state.max_volume == max {
                return false;
            }
            state.volume = level;
            state.max_volume = max;
            state.clone()
        };
        info!("[{}] Volume is at {} (maximum {})", self.name(), level, max);
        self.publish(Dimension::Volume, &snapshot);
        true
    }

    pub async fn update_mute(&self, muted: bool) -> bool {
        let snapshot = {
            let mut state = self.state.write().await;
            if state.muted == muted {
                return false;
            }
            state.muted = muted;
            state.clone()
        };
        info!(
            "[{}] Device is {}",
            self.name(),
            if muted { "muted" } else { "unmuted" }
        );
        self.publish(Dimension::Mute, &snapshot);
        true
    }

    pub async fn update_power(&self, on: bool) -> bool {
        let snapshot = {
            let mut state = self.state.write().await;
            if state.power == on {
                return false;
            }
            state.power = on;
            state.clone()
        };
        info!("[{}] Device is {}", self.name(), if on { "on" } else { "in standby" });
        self.publish(Dimension::Power, &snapshot);
        true
    }

    pub async fn update_input(&self, primary: Option<String>) -> bool {
        self.apply_input(primary, false).await
    }

    async fn apply_input(&self, primary: Option<String>, force: bool) -> bool {
        let (changed, snapshot) = {
            let mut state = self.state.write().await;
            let changed = state.active_input != primary;
            state.active_input = primary;
            (changed, state.clone())
        };
        if !changed && !force {
            return false;
        }

        match snapshot.active_input.as_deref() {
            Some(id) => info!(
                "[{}] Active input is {}",
                self.name(),
                self.inputs
                    .iter()
                    .find(|i| i.api_id == id)
                    .map(|i| i.name.as_str())
                    .unwrap_or(id)
            ),
            None => info!("[{}] No active input currently set", self.name()),
        }
        self.publish(Dimension::Input, &snapshot);
        changed
    }

    pub async fn update_speaker_group(&self, id: Option<u32>) -> bool {
        let mut state = self.state.write().await;
        if state.speaker_group == id {
            return false;
        }
        state.speaker_group = id;
        info!("[{}] Active speaker group is {:?}", self.name(), id);
        true
    }

    pub async fn update_media_state(&self, media_state: MediaState) -> bool {
        let snapshot = {
            let mut state = self.state.write().await;
            if state.media_state == media_state {
                return false;
            }
            state.media_state = media_state;
            state.clone()
        };
        debug!("[{}] Media state is {:?}", self.name(), media_state);
        self.publish(Dimension::Media, &snapshot);
        true
    }
}
