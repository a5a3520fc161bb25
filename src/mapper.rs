use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::device::{
    AccessoryKind, CachedDeviceState, ControlMode, InputSource, InputType, MediaState, UnknownVariant,
};
use crate::error::WriteError;
use crate::hub::{Accessory, Service};
use crate::session::DeviceSession;

pub const MANUFACTURER: &str = "Bang & Olufsen";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceKind {
    Speaker,
    Lightbulb,
    Fan,
    Switch,
    SmartSpeaker,
    Television,
    TelevisionSpeaker,
    InputSource,
    AccessoryInformation,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 9] = [
        ServiceKind::Speaker,
        ServiceKind::Lightbulb,
        ServiceKind::Fan,
        ServiceKind::Switch,
        ServiceKind::SmartSpeaker,
        ServiceKind::Television,
        ServiceKind::TelevisionSpeaker,
        ServiceKind::InputSource,
        ServiceKind::AccessoryInformation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Speaker => "Speaker",
            Self::Lightbulb => "Lightbulb",
            Self::Fan => "Fan",
            Self::Switch => "Switch",
            Self::SmartSpeaker => "SmartSpeaker",
            Self::Television => "Television",
            Self::TelevisionSpeaker => "TelevisionSpeaker",
            Self::InputSource => "InputSource",
            Self::AccessoryInformation => "AccessoryInformation",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Characteristic {
    On,
    Mute,
    Active,
    Volume,
    Brightness,
    RotationSpeed,
    ActiveIdentifier,
    RemoteKey,
    VolumeSelector,
    CurrentMediaState,
    TargetMediaState,
    Identifier,
    ConfiguredName,
    InputSourceType,
    IsConfigured,
    Manufacturer,
    Model,
    SerialNumber,
    FirmwareRevision,
}

impl Characteristic {
    pub const ALL: [Characteristic; 19] = [
        Characteristic::On,
        Characteristic::Mute,
        Characteristic::Active,
        Characteristic::Volume,
        Characteristic::Brightness,
        Characteristic::RotationSpeed,
        Characteristic::ActiveIdentifier,
        Characteristic::RemoteKey,
        Characteristic::VolumeSelector,
        Characteristic::CurrentMediaState,
        Characteristic::TargetMediaState,
        Characteristic::Identifier,
        Characteristic::ConfiguredName,
        Characteristic::InputSourceType,
        Characteristic::IsConfigured,
        Characteristic::Manufacturer,
        Characteristic::Model,
        Characteristic::SerialNumber,
        Characteristic::FirmwareRevision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Mute => "Mute",
            Self::Active => "Active",
            Self::Volume => "Volume",
            Self::Brightness => "Brightness",
            Self::RotationSpeed => "RotationSpeed",
            Self::ActiveIdentifier => "ActiveIdentifier",
            Self::RemoteKey => "RemoteKey",
            Self::VolumeSelector => "VolumeSelector",
            Self::CurrentMediaState => "CurrentMediaState",
            Self::TargetMediaState => "TargetMediaState",
            Self::Identifier => "Identifier",
            Self::ConfiguredName => "ConfiguredName",
            Self::InputSourceType => "InputSourceType",
            Self::IsConfigured => "IsConfigured",
            Self::Manufacturer => "Manufacturer",
            Self::Model => "Model",
            Self::SerialNumber => "SerialNumber",
            Self::FirmwareRevision => "FirmwareRevision",
        }
    }

    /// Which hub value means "true" for this characteristic. A `Mute` switched on
    /// means the device is muted; everything else reads as "on" when true.
    pub fn polarity(self) -> Polarity {
        match self {
            Self::Mute => Polarity::Muted,
            _ => Polarity::On,
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Characteristic {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl CharacteristicValue {
    /// HomeKit clients send booleans as `0`/`1` as often as `true`/`false`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicUpdate {
    pub accessory: Uuid,
    pub service: ServiceKind,
    pub characteristic: Characteristic,
    pub value: CharacteristicValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Muted,
    On,
}

/// The session state a characteristic follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Power,
    Mute,
    Volume,
    Input,
    RemoteKey,
    VolumeStep,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub service: ServiceKind,
    pub characteristic: Characteristic,
    pub dimension: Dimension,
}

impl Binding {
    const fn new(service: ServiceKind, characteristic: Characteristic, dimension: Dimension) -> Self {
        Self {
            service,
            characteristic,
            dimension,
        }
    }
}

pub fn primary_service(kind: AccessoryKind) -> ServiceKind {
    match kind {
        AccessoryKind::Speaker => ServiceKind::Speaker,
        AccessoryKind::Bulb => ServiceKind::Lightbulb,
        AccessoryKind::Fan => ServiceKind::Fan,
        AccessoryKind::Switch => ServiceKind::Switch,
        AccessoryKind::SmartSpeaker => ServiceKind::SmartSpeaker,
        AccessoryKind::Tv => ServiceKind::Television,
    }
}

/// Characteristic bindings for an accessory kind. In power mode the off/mute
/// characteristic drives standby, in mute mode it drives the speaker mute.
pub fn bindings(kind: AccessoryKind, mode: ControlMode) -> Vec<Binding> {
    use Characteristic as C;
    use ServiceKind as S;

    let off = match mode {
        ControlMode::Mute => Dimension::Mute,
        ControlMode::Power => Dimension::Power,
    };

    match kind {
        AccessoryKind::Speaker => vec![
            Binding::new(S::Speaker, C::Mute, off),
            Binding::new(S::Speaker, C::Volume, Dimension::Volume),
        ],
        AccessoryKind::Bulb => vec![
            Binding::new(S::Lightbulb, C::On, off),
            Binding::new(S::Lightbulb, C::Brightness, Dimension::Volume),
        ],
        AccessoryKind::Fan => vec![
            Binding::new(S::Fan, C::On, off),
            Binding::new(S::Fan, C::RotationSpeed, Dimension::Volume),
        ],
        AccessoryKind::Switch => vec![
            Binding::new(S::Switch, C::On, off),
            Binding::new(S::Switch, C::Volume, Dimension::Volume),
        ],
        AccessoryKind::SmartSpeaker => vec![
            Binding::new(S::SmartSpeaker, C::Mute, Dimension::Mute),
            Binding::new(S::SmartSpeaker, C::Volume, Dimension::Volume),
            Binding::new(S::SmartSpeaker, C::CurrentMediaState, Dimension::Media),
            Binding::new(S::SmartSpeaker, C::TargetMediaState, Dimension::Media),
        ],
        AccessoryKind::Tv => vec![
            Binding::new(S::Television, C::Active, off),
            Binding::new(S::Television, C::ActiveIdentifier, Dimension::Input),
            Binding::new(S::Television, C::RemoteKey, Dimension::RemoteKey),
            Binding::new(S::TelevisionSpeaker, C::Mute, Dimension::Mute),
            Binding::new(S::TelevisionSpeaker, C::Volume, Dimension::Volume),
            Binding::new(S::TelevisionSpeaker, C::VolumeSelector, Dimension::VolumeStep),
        ],
    }
}

pub fn device_muted_from(polarity: Polarity, value: bool) -> bool {
    match polarity {
        Polarity::Muted => value,
        Polarity::On => !value,
    }
}

pub fn hub_value_from_muted(polarity: Polarity, muted: bool) -> bool {
    match polarity {
        Polarity::Muted => muted,
        Polarity::On => !muted,
    }
}

pub fn device_on_from(polarity: Polarity, value: bool) -> bool {
    match polarity {
        Polarity::On => value,
        Polarity::Muted => !value,
    }
}

pub fn hub_value_from_power(polarity: Polarity, on: bool) -> bool {
    match polarity {
        Polarity::On => on,
        Polarity::Muted => !on,
    }
}

pub fn scale_to_device(percent: u32, max: u32) -> u32 {
    (f64::from(percent) * f64::from(max) / 100.0).round() as u32
}

pub fn scale_to_hub(level: u32, max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    (f64::from(level) * 100.0 / f64::from(max)).round() as u32
}

pub fn clamp_volume(level: u32, max: u32) -> u32 {
    level.min(max)
}

pub fn hub_volume(level: u32, max: u32, scaling: bool) -> u32 {
    if scaling {
        scale_to_hub(level, max)
    } else {
        level
    }
}

/// HomeKit `InputSourceType` codes.
pub fn hap_input_type(input_type: InputType) -> i64 {
    match input_type {
        InputType::Other => 0,
        InputType::Tv | InputType::Tuner => 2,
        InputType::Hdmi => 3,
        InputType::Airplay => 8,
        InputType::Application => 10,
    }
}

fn current_media_code(state: MediaState) -> i64 {
    match state {
        MediaState::Play => 0,
        MediaState::Pause => 1,
        MediaState::Stop => 2,
        MediaState::Loading => 4,
    }
}

fn target_media_code(state: MediaState) -> i64 {
    match state {
        MediaState::Play | MediaState::Loading => 0,
        MediaState::Pause => 1,
        MediaState::Stop => 2,
    }
}

/// `Active` is a 0/1 integer in HomeKit, the other switches are booleans.
pub fn bool_value(characteristic: Characteristic, value: bool) -> CharacteristicValue {
    match characteristic {
        Characteristic::Active => CharacteristicValue::Int(i64::from(value)),
        _ => CharacteristicValue::Bool(value),
    }
}

/// The hub value a binding shows for the cached state. Write-only bindings have none.
pub fn hub_value(
    binding: &Binding,
    state: &CachedDeviceState,
    inputs: &[InputSource],
    scaling: bool,
) -> Option<CharacteristicValue> {
    let polarity = binding.characteristic.polarity();
    let value = match binding.dimension {
        Dimension::Power => bool_value(
            binding.characteristic,
            hub_value_from_power(polarity, state.power),
        ),
        Dimension::Mute => bool_value(
            binding.characteristic,
            hub_value_from_muted(polarity, state.muted),
        ),
        Dimension::Volume => {
            CharacteristicValue::Int(i64::from(hub_volume(state.volume, state.max_volume, scaling)))
        }
        Dimension::Input => CharacteristicValue::Int(i64::from(state.active_input_index(inputs))),
        Dimension::Media => match binding.characteristic {
            Characteristic::TargetMediaState => {
                CharacteristicValue::Int(target_media_code(state.media_state))
            }
            _ => CharacteristicValue::Int(current_media_code(state.media_state)),
        },
        Dimension::RemoteKey | Dimension::VolumeStep => return None,
    };
    Some(value)
}

/// Television remote keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAction {
    Rewind,
    FastForward,
    NextTrack,
    PreviousTrack,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Select,
    Back,
    Exit,
    PlayPause,
    Information,
}

impl RemoteAction {
    pub fn from_key(key: i64) -> Option<Self> {
        match key {
            0 => Some(Self::Rewind),
            1 => Some(Self::FastForward),
            2 => Some(Self::NextTrack),
            3 => Some(Self::PreviousTrack),
            4 => Some(Self::ArrowUp),
            5 => Some(Self::ArrowDown),
            6 => Some(Self::ArrowLeft),
            7 => Some(Self::ArrowRight),
            8 => Some(Self::Select),
            9 => Some(Self::Back),
            10 => Some(Self::Exit),
            11 => Some(Self::PlayPause),
            15 => Some(Self::Information),
            _ => None,
        }
    }
}

pub async fn perform_remote_action(session: &DeviceSession, action: RemoteAction) {
    info!("[{}] Remote key {:?}", session.name(), action);
    match action {
        RemoteAction::Rewind | RemoteAction::FastForward | RemoteAction::Exit => {}
        RemoteAction::NextTrack | RemoteAction::ArrowRight => {
            session.forward().await;
        }
        RemoteAction::PreviousTrack | RemoteAction::ArrowLeft => {
            session.back().await;
        }
        RemoteAction::ArrowUp => {
            session.cycle_speaker_group(true).await;
        }
        RemoteAction::ArrowDown => {
            session.cycle_speaker_group(false).await;
        }
        RemoteAction::Select => {
            session.toggle_mute().await;
        }
        RemoteAction::Back => {
            session.leave_experience().await;
        }
        RemoteAction::PlayPause => {
            session.toggle_playback().await;
        }
        RemoteAction::Information => {
            session.join_experience().await;
        }
    }
}

fn invalid(binding: &Binding, reason: impl Into<String>) -> WriteError {
    WriteError::InvalidValue {
        characteristic: binding.characteristic.to_string(),
        reason: reason.into(),
    }
}

/// Route a hub write to the matching session command. Only malformed values
/// fail; device errors are logged by the session and the write still completes.
pub async fn write(
    session: &DeviceSession,
    binding: &Binding,
    value: &CharacteristicValue,
) -> Result<(), WriteError> {
    let polarity = binding.characteristic.polarity();
    debug!(
        "[{}] Set {}.{} to {}",
        session.name(),
        binding.service,
        binding.characteristic,
        value
    );

    match binding.dimension {
        Dimension::Power => {
            let on = value.as_bool().ok_or_else(|| invalid(binding, "expected a boolean"))?;
            session.set_power_state(on, polarity).await;
        }
        Dimension::Mute => {
            let on = value.as_bool().ok_or_else(|| invalid(binding, "expected a boolean"))?;
            session.set_mute_state(on, polarity).await;
        }
        Dimension::Volume => {
            let level = value
                .as_int()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid(binding, "expected a non-negative integer"))?;
            session.set_volume(level).await;
        }
        Dimension::Input => {
            let index = value
                .as_int()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid(binding, "expected an input identifier"))?;
            session.set_input(index).await;
        }
        Dimension::RemoteKey => {
            let key = value.as_int().ok_or_else(|| invalid(binding, "expected a key code"))?;
            match RemoteAction::from_key(key) {
                Some(action) => perform_remote_action(session, action).await,
                None => debug!("[{}] Ignoring unsupported remote key {}", session.name(), key),
            }
        }
        Dimension::VolumeStep => match value.as_int() {
            Some(0) => {
                session.step_volume(true).await;
            }
            Some(1) => {
                session.step_volume(false).await;
            }
            _ => return Err(invalid(binding, "expected 0 (increment) or 1 (decrement)")),
        },
        Dimension::Media => {
            if binding.characteristic != Characteristic::TargetMediaState {
                return Err(WriteError::ReadOnly(binding.characteristic.to_string()));
            }
            match value.as_int() {
                Some(0) => {
                    session.play().await;
                }
                Some(1) => {
                    session.pause().await;
                }
                Some(2) => {
                    session.stop().await;
                }
                _ => return Err(invalid(binding, "expected 0 (play), 1 (pause) or 2 (stop)")),
            }
        }
    }

    Ok(())
}

/// Assemble the services a session exposes, seeded from `state`.
pub fn build_accessory(session: &DeviceSession, state: &CachedDeviceState) -> Accessory {
    let name = session.name();
    let info = session.info();
    let kind = session.kind();

    let mut services = vec![Service::new(ServiceKind::AccessoryInformation, name)
        .with(Characteristic::Manufacturer, CharacteristicValue::Text(MANUFACTURER.to_string()))
        .with(Characteristic::Model, CharacteristicValue::Text(info.model.clone()))
        .with(Characteristic::SerialNumber, CharacteristicValue::Text(info.serial_number.clone()))
        .with(
            Characteristic::FirmwareRevision,
            CharacteristicValue::Text(env!("CARGO_PKG_VERSION").to_string()),
        )];

    let primary = primary_service(kind);
    let mut primary_service = Service::new(primary, name);
    let mut speaker_service = Service::new(ServiceKind::TelevisionSpeaker, &format!("{name} Volume"));

    for binding in session.bindings() {
        let value = hub_value(binding, state, session.inputs(), session.max_volume_scaling())
            .unwrap_or(CharacteristicValue::Int(0));
        if binding.service == ServiceKind::TelevisionSpeaker {
            speaker_service = speaker_service.with(binding.characteristic, value);
        } else {
            primary_service = primary_service.with(binding.characteristic, value);
        }
    }
    services.push(primary_service);

    if kind == AccessoryKind::Tv {
        services.push(speaker_service);
        for (i, input) in session.inputs().iter().enumerate() {
            if input.is_none_entry() {
                continue;
            }
            let identifier = i as i64 + 1;
            services.push(
                Service::new(ServiceKind::InputSource, &input.name)
                    .subtype(format!("input{identifier}"))
                    .with(Characteristic::Identifier, CharacteristicValue::Int(identifier))
                    .with(Characteristic::ConfiguredName, CharacteristicValue::Text(input.name.clone()))
                    .with(
                        Characteristic::InputSourceType,
                        CharacteristicValue::Int(hap_input_type(input.input_type)),
                    )
                    .with(Characteristic::IsConfigured, CharacteristicValue::Int(1)),
            );
        }
    }

    Accessory {
        id: session.accessory_id(),
        name: name.to_string(),
        kind,
        services,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SpeakerGroup;
    use crate::test_support::{self, FakeTransport};
    use reqwest::Method;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(AccessoryKind::Speaker, ControlMode::Mute, Characteristic::Mute, Dimension::Mute)]
    #[case(AccessoryKind::Speaker, ControlMode::Power, Characteristic::Mute, Dimension::Power)]
    #[case(AccessoryKind::Bulb, ControlMode::Mute, Characteristic::On, Dimension::Mute)]
    #[case(AccessoryKind::Fan, ControlMode::Power, Characteristic::On, Dimension::Power)]
    #[case(AccessoryKind::Switch, ControlMode::Mute, Characteristic::On, Dimension::Mute)]
    #[case(AccessoryKind::SmartSpeaker, ControlMode::Power, Characteristic::Mute, Dimension::Mute)]
    #[case(AccessoryKind::Tv, ControlMode::Power, Characteristic::Active, Dimension::Power)]
    fn test_off_characteristic_binding(
        #[case] kind: AccessoryKind,
        #[case] mode: ControlMode,
        #[case] characteristic: Characteristic,
        #[case] dimension: Dimension,
    ) {
        let table = bindings(kind, mode);
        assert_eq!(table[0].service, primary_service(kind));
        assert_eq!(table[0].characteristic, characteristic);
        assert_eq!(table[0].dimension, dimension);
    }

    #[test]
    fn test_volume_characteristics() {
        let volume_of = |kind| {
            bindings(kind, ControlMode::Power)
                .into_iter()
                .find(|b| b.dimension == Dimension::Volume)
                .map(|b| (b.service, b.characteristic))
        };
        assert_eq!(volume_of(AccessoryKind::Bulb), Some((ServiceKind::Lightbulb, Characteristic::Brightness)));
        assert_eq!(volume_of(AccessoryKind::Fan), Some((ServiceKind::Fan, Characteristic::RotationSpeed)));
        assert_eq!(
            volume_of(AccessoryKind::Tv),
            Some((ServiceKind::TelevisionSpeaker, Characteristic::Volume))
        );
    }

    #[test]
    fn test_polarity_functions() {
        // bulb/fan On=false means muted
        assert!(device_muted_from(Polarity::On, false));
        assert!(!device_muted_from(Polarity::On, true));
        // speaker Mute is literal
        assert!(device_muted_from(Polarity::Muted, true));
        // speaker Mute in power mode: true means standby
        assert!(!device_on_from(Polarity::Muted, true));
        assert!(device_on_from(Polarity::On, true));

        for value in [true, false] {
            for polarity in [Polarity::On, Polarity::Muted] {
                assert_eq!(hub_value_from_muted(polarity, device_muted_from(polarity, value)), value);
                assert_eq!(hub_value_from_power(polarity, device_on_from(polarity, value)), value);
            }
        }
    }

    #[rstest]
    #[case(50, 60, 30)]
    #[case(100, 90, 90)]
    #[case(0, 90, 0)]
    #[case(33, 60, 20)]
    fn test_scale_to_device(#[case] percent: u32, #[case] max: u32, #[case] expected: u32) {
        assert_eq!(scale_to_device(percent, max), expected);
    }

    #[test]
    fn test_scale_to_hub() {
        assert_eq!(scale_to_hub(30, 60), 50);
        assert_eq!(scale_to_hub(90, 90), 100);
        assert_eq!(scale_to_hub(10, 0), 0);
    }

    #[test]
    fn test_scaling_is_stable_on_round_trip() {
        for max in [20, 60, 90, 100] {
            for percent in 0..=100 {
                let hub = scale_to_hub(scale_to_device(percent, max), max);
                assert_eq!(scale_to_hub(scale_to_device(hub, max), max), hub);
            }
        }
    }

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(95, 90), 90);
        assert_eq!(clamp_volume(40, 90), 40);
        assert_eq!(clamp_volume(5, 0), 0);
    }

    #[test]
    fn test_remote_keys() {
        assert_eq!(RemoteAction::from_key(2), Some(RemoteAction::NextTrack));
        assert_eq!(RemoteAction::from_key(11), Some(RemoteAction::PlayPause));
        assert_eq!(RemoteAction::from_key(15), Some(RemoteAction::Information));
        assert_eq!(RemoteAction::from_key(12), None);
    }

    #[test]
    fn test_hub_values() {
        let state = CachedDeviceState {
            power: true,
            muted: true,
            volume: 30,
            max_volume: 60,
            ..Default::default()
        };
        let bulb = bindings(AccessoryKind::Bulb, ControlMode::Mute);
        assert_eq!(hub_value(&bulb[0], &state, &[], false), Some(CharacteristicValue::Bool(false)));
        assert_eq!(hub_value(&bulb[1], &state, &[], true), Some(CharacteristicValue::Int(50)));

        let tv = bindings(AccessoryKind::Tv, ControlMode::Power);
        assert_eq!(hub_value(&tv[0], &state, &[], false), Some(CharacteristicValue::Int(1)));
        assert_eq!(hub_value(&tv[2], &state, &[], false), None);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("TelevisionSpeaker".parse::<ServiceKind>(), Ok(ServiceKind::TelevisionSpeaker));
        assert_eq!("RotationSpeed".parse::<Characteristic>(), Ok(Characteristic::RotationSpeed));
        assert!("Thermostat".parse::<ServiceKind>().is_err());
    }

    #[tokio::test]
    async fn test_build_tv_accessory() {
        let transport = FakeTransport::new();
        let session = test_support::tv_session(&transport).await;
        let state = session.cached_state().await;
        let accessory = build_accessory(&session, &state);

        let kinds: Vec<ServiceKind> = accessory.services.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ServiceKind::AccessoryInformation,
                ServiceKind::Television,
                ServiceKind::TelevisionSpeaker,
                ServiceKind::InputSource,
                ServiceKind::InputSource,
            ]
        );
        let hdmi = &accessory.services[3];
        assert_eq!(
            hdmi.characteristics.get(&Characteristic::InputSourceType),
            Some(&CharacteristicValue::Int(3))
        );
        assert_eq!(
            accessory.services[0].characteristics.get(&Characteristic::Manufacturer),
            Some(&CharacteristicValue::Text("Bang & Olufsen".to_string()))
        );
    }

    #[tokio::test]
    async fn test_write_rejects_wrong_types() {
        let transport = FakeTransport::new();
        let session = test_support::speaker_session(&transport).await;
        let mute = bindings(AccessoryKind::Speaker, ControlMode::Mute)[0];

        let result = write(&session, &mute, &CharacteristicValue::Text("yes".into())).await;
        assert!(matches!(result, Err(WriteError::InvalidValue { .. })));
        assert!(transport.writes().is_empty());

        write(&session, &mute, &CharacteristicValue::Int(1)).await.unwrap();
        let writes = transport.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].body, Some(json!({"muted": true})));
    }

    #[tokio::test]
    async fn test_remote_key_select_toggles_mute() {
        let transport = FakeTransport::new();
        let session = test_support::tv_session(&transport).await;
        let remote = bindings(AccessoryKind::Tv, ControlMode::Power)[2];

        write(&session, &remote, &CharacteristicValue::Int(8)).await.unwrap();
        let writes = transport.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].method, Method::PUT);
        assert_eq!(writes[0].body, Some(json!({"muted": true})));
    }

    #[tokio::test]
    async fn test_remote_key_up_cycles_speaker_group() {
        let transport = FakeTransport::new();
        let session = test_support::tv_session_with_groups(
            &transport,
            vec![
                SpeakerGroup { id: 1, name: "Default".into() },
                SpeakerGroup { id: 2, name: "Movie".into() },
            ],
        )
        .await;
        let remote = bindings(AccessoryKind::Tv, ControlMode::Power)[2];

        write(&session, &remote, &CharacteristicValue::Int(4)).await.unwrap();
        assert_eq!(transport.writes()[0].body, Some(json!({"active": 2})));
    }
}
