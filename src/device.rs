use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a device is presented to HomeKit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryKind {
    Speaker,
    Bulb,
    Fan,
    Tv,
    SmartSpeaker,
    Switch,
}

/// Whether "off" on the accessory mutes the device or puts it into standby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Mute,
    Power,
}

/// How "power on" is achieved on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerOnMethod {
    On,
    Input,
    Join,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl FromStr for AccessoryKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speaker" => Ok(Self::Speaker),
            "bulb" => Ok(Self::Bulb),
            "fan" => Ok(Self::Fan),
            "tv" => Ok(Self::Tv),
            "smartspeaker" => Ok(Self::SmartSpeaker),
            "switch" => Ok(Self::Switch),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl FromStr for ControlMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mute" => Ok(Self::Mute),
            "power" => Ok(Self::Power),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl FromStr for PowerOnMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "input" => Ok(Self::Input),
            "join" => Ok(Self::Join),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl AccessoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Speaker => "speaker",
            Self::Bulb => "bulb",
            Self::Fan => "fan",
            Self::Tv => "tv",
            Self::SmartSpeaker => "smartspeaker",
            Self::Switch => "switch",
        }
    }

    pub fn default_mode(self) -> ControlMode {
        match self {
            Self::Tv => ControlMode::Power,
            Self::Speaker | Self::SmartSpeaker => ControlMode::Mute,
            Self::Bulb | Self::Fan | Self::Switch => ControlMode::Power,
        }
    }

    pub fn default_power_on(self) -> PowerOnMethod {
        match self {
            Self::Tv => PowerOnMethod::Input,
            _ => PowerOnMethod::On,
        }
    }
}

impl fmt::Display for AccessoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputType {
    Tv,
    Hdmi,
    Application,
    Airplay,
    Tuner,
    Other,
}

impl InputType {
    /// Maps a `sourceType.type` reported by the device.
    pub fn from_source_type(source_type: &str) -> Self {
        match source_type {
            "TV" => Self::Tv,
            "HDMI" => Self::Hdmi,
            "YOUTUBE" | "TUNEIN" | "DEEZER" | "SPOTIFY" => Self::Application,
            "AIRPLAY" => Self::Airplay,
            _ => Self::Other,
        }
    }

    /// Parses the type name used in the configuration file.
    pub fn from_config(value: &str) -> Option<Self> {
        match value {
            "TV" => Some(Self::Tv),
            "HDMI" => Some(Self::Hdmi),
            "APPLICATION" => Some(Self::Application),
            "AIRPLAY" => Some(Self::Airplay),
            "TUNER" => Some(Self::Tuner),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn is_tv_like(self) -> bool {
        matches!(self, Self::Tv | Self::Hdmi)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSource {
    pub name: String,
    pub input_type: InputType,
    pub api_id: String,
}

impl InputSource {
    pub const NONE_NAME: &'static str = "None";

    pub fn new(name: impl Into<String>, input_type: InputType, api_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_type,
            api_id: api_id.into(),
        }
    }

    /// The synthetic "no active source" entry.
    pub fn none() -> Self {
        Self::new(Self::NONE_NAME, InputType::Other, "")
    }

    pub fn is_none_entry(&self) -> bool {
        self.api_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerGroup {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaState {
    Play,
    Pause,
    Stop,
    Loading,
}

impl MediaState {
    pub fn from_device(state: &str) -> Option<Self> {
        match state {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "stop" => Some(Self::Stop),
            "loading" | "preparing" => Some(Self::Loading),
            _ => None,
        }
    }
}

/// Identity reported by `/BeoDevice`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub serial_number: String,
    pub jid: String,
}

pub const DEFAULT_MAX_VOLUME: u32 = 90;

/// Runtime cache of what the device last reported or acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedDeviceState {
    pub power: bool,
    pub muted: bool,
    pub volume: u32,
    pub max_volume: u32,
    pub speaker_group: Option<u32>,
    pub active_input: Option<String>,
    pub media_state: MediaState,
}

impl Default for CachedDeviceState {
    fn default() -> Self {
        Self {
            power: false,
            muted: false,
            volume: 0,
            max_volume: DEFAULT_MAX_VOLUME,
            speaker_group: None,
            active_input: None,
            media_state: MediaState::Stop,
        }
    }
}

impl CachedDeviceState {
    /// 1-based position of the active input. Unknown inputs resolve to the "None"
    /// entry when present, otherwise to the first input.
    pub fn active_input_index(&self, inputs: &[InputSource]) -> u32 {
        let found = self
            .active_input
            .as_deref()
            .and_then(|id| inputs.iter().position(|input| input.api_id == id))
            .or_else(|| inputs.iter().position(InputSource::is_none_entry));

        found.map(|i| i as u32 + 1).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Vec<InputSource> {
        vec![
            InputSource::new("HDMI 1", InputType::Hdmi, "hdmi:1111.2222.3333@products.bang-olufsen.com"),
            InputSource::new("Spotify", InputType::Application, "spotify:1111.2222.3333@products.bang-olufsen.com"),
        ]
    }

    #[test]
    fn test_source_type_mapping() {
        assert_eq!(InputType::from_source_type("TV"), InputType::Tv);
        assert_eq!(InputType::from_source_type("HDMI"), InputType::Hdmi);
        assert_eq!(InputType::from_source_type("YOUTUBE"), InputType::Application);
        assert_eq!(InputType::from_source_type("SPOTIFY"), InputType::Application);
        assert_eq!(InputType::from_source_type("AIRPLAY"), InputType::Airplay);
        assert_eq!(InputType::from_source_type("BLUETOOTH"), InputType::Other);
    }

    #[test]
    fn test_kind_defaults() {
        assert_eq!(AccessoryKind::Tv.default_mode(), ControlMode::Power);
        assert_eq!(AccessoryKind::Tv.default_power_on(), PowerOnMethod::Input);
        assert_eq!(AccessoryKind::Speaker.default_mode(), ControlMode::Mute);
        assert_eq!(AccessoryKind::SmartSpeaker.default_mode(), ControlMode::Mute);
        assert_eq!(AccessoryKind::Fan.default_mode(), ControlMode::Power);
        assert_eq!(AccessoryKind::Fan.default_power_on(), PowerOnMethod::On);
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("smartspeaker".parse::<AccessoryKind>(), Ok(AccessoryKind::SmartSpeaker));
        assert!("light".parse::<AccessoryKind>().is_err());
        assert!("standby".parse::<ControlMode>().is_err());
        assert_eq!("join".parse::<PowerOnMethod>(), Ok(PowerOnMethod::Join));
    }

    #[test]
    fn test_cache_defaults() {
        let state = CachedDeviceState::default();
        assert_eq!(state.max_volume, 90);
        assert!(!state.power);
        assert_eq!(state.media_state, MediaState::Stop);
    }

    #[test]
    fn test_active_input_index_is_recomputed() {
        let mut list = inputs();
        let mut state = CachedDeviceState::default();
        assert_eq!(state.active_input_index(&list), 1);

        state.active_input = Some("spotify:1111.2222.3333@products.bang-olufsen.com".into());
        assert_eq!(state.active_input_index(&list), 2);

        list.push(InputSource::none());
        state.active_input = Some("unknown:1.2.3@products.bang-olufsen.com".into());
        assert_eq!(state.active_input_index(&list), 3);
    }
}
