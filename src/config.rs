use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::device::{AccessoryKind, ControlMode, InputSource, InputType, PowerOnMethod, SpeakerGroup};
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "beoplay.toml";
pub const DEFAULT_API_PORT: u16 = 8080;
pub const DEFAULT_PROXY_PORT: u16 = 8080;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 60_000;

static API_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+:\d+\.\d+\.\d+@products\.bang-olufsen\.com$").expect("valid API ID pattern")
});

pub fn is_valid_api_id(api_id: &str) -> bool {
    API_ID_PATTERN.is_match(api_id)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_name")]
    pub name: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_bridge_name() -> String {
    "Beoplay Bridge".to_string()
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_bridge_name(),
            port: DEFAULT_API_PORT,
        }
    }
}

/// A value the configuration file may give either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    Text(String),
}

impl NumberOrString {
    fn as_positive(&self) -> Option<u32> {
        match self {
            NumberOrString::Number(n) => u32::try_from(*n).ok().filter(|n| *n >= 1),
            NumberOrString::Text(s) => s.trim().parse::<u32>().ok().filter(|n| *n >= 1),
        }
    }

    fn describe(&self) -> String {
        match self {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::Text(s) => s.clone(),
        }
    }
}

/// One `[[devices]]` entry exactly as written in the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    pub name: Option<String>,
    pub ip: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub mode: Option<String>,
    pub on: Option<String>,
    pub default: Option<NumberOrString>,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub speakergroups: Vec<SpeakerGroupConfig>,
    #[serde(default)]
    pub maxvolumescaling: bool,
    pub interval: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    pub debugproxy: Option<String>,
    pub debugproxyport: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputConfig {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "apiID")]
    pub api_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeakerGroupConfig {
    pub id: Option<NumberOrString>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
}

impl ProxySettings {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Validated settings for one device session.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub name: String,
    pub ip: String,
    pub kind: AccessoryKind,
    pub mode: ControlMode,
    pub power_on: PowerOnMethod,
    /// `false` when `power_on` came from the type default and may be
    /// reclassified once the device's sources are known.
    pub power_on_explicit: bool,
    pub default_input: u32,
    pub inputs: Vec<InputSource>,
    pub exclude: Vec<String>,
    pub speaker_groups: Vec<SpeakerGroup>,
    pub max_volume_scaling: bool,
    pub refresh_interval: Duration,
    pub debug: bool,
    pub proxy: Option<ProxySettings>,
}

impl Config {
    pub fn load_from_env() -> Result<Self> {
        let path = env::var("BEOPLAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(&path)?;

        if let Ok(port) = env::var("BRIDGE_PORT") {
            config.bridge.port = port
                .parse()
                .with_context(|| format!("BRIDGE_PORT '{port}' is not a valid port"))?;
        }

        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration file {}", path.as_ref().display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration")
    }
}

impl DeviceSettings {
    pub fn from_config(config: &DeviceConfig) -> Result<Self, ConfigError> {
        let name = config
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "B&O Device".to_string());

        let ip = config
            .ip
            .as_deref()
            .ok_or_else(|| ConfigError::MissingIp(name.clone()))?;
        ip.trim()
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidIp(ip.to_string()))?;

        let kind = match config.kind.as_deref() {
            None => AccessoryKind::Fan,
            Some(kind) => kind
                .parse()
                .map_err(|_| ConfigError::InvalidType(kind.to_string()))?,
        };

        let mut mode = match config.mode.as_deref() {
            None => kind.default_mode(),
            Some(mode) => mode
                .parse()
                .map_err(|_| ConfigError::InvalidMode(mode.to_string()))?,
        };
        if kind == AccessoryKind::SmartSpeaker && mode == ControlMode::Power {
            warn!("[{}] Smart speakers only support mute mode, ignoring mode 'power'", name);
            mode = ControlMode::Mute;
        }

        let (power_on, power_on_explicit) = match config.on.as_deref() {
            None => (kind.default_power_on(), false),
            Some(on) => (
                on.parse()
                    .map_err(|_| ConfigError::InvalidPowerOn(on.to_string()))?,
                true,
            ),
        };

        let default_input = match &config.default {
            None => 1,
            Some(value) => value
                .as_positive()
                .ok_or_else(|| ConfigError::InvalidDefaultInput(value.describe()))?,
        };

        let inputs = config
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| parse_input(i + 1, input))
            .collect::<Result<Vec<_>, _>>()?;

        for api_id in &config.exclude {
            if !is_valid_api_id(api_id) {
                return Err(ConfigError::InvalidExclude(api_id.clone()));
            }
        }
        let exclude = if !inputs.is_empty() && !config.exclude.is_empty() {
            warn!("[{}] Both inputs and exclude were supplied, ignoring exclude", name);
            Vec::new()
        } else {
            config.exclude.clone()
        };

        let speaker_groups = config
            .speakergroups
            .iter()
            .map(parse_speaker_group)
            .collect::<Result<Vec<_>, _>>()?;

        let interval_ms = config.interval.unwrap_or(DEFAULT_REFRESH_INTERVAL_MS);
        if interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        let proxy = config.debugproxy.as_ref().map(|host| ProxySettings {
            host: host.clone(),
            port: config.debugproxyport.unwrap_or(DEFAULT_PROXY_PORT),
        });

        Ok(Self {
            name,
            ip: ip.trim().to_string(),
            kind,
            mode,
            power_on,
            power_on_explicit,
            default_input,
            inputs,
            exclude,
            speaker_groups,
            max_volume_scaling: config.maxvolumescaling,
            refresh_interval: Duration::from_millis(interval_ms),
            debug: config.debug,
            proxy,
        })
    }
}

fn parse_input(number: usize, input: &InputConfig) -> Result<InputSource, ConfigError> {
    let (Some(name), Some(kind), Some(api_id)) = (&input.name, &input.kind, &input.api_id) else {
        return Err(ConfigError::IncompleteInput(number));
    };

    let input_type =
        InputType::from_config(kind).ok_or_else(|| ConfigError::InvalidInputType(kind.clone()))?;

    if !is_valid_api_id(api_id) {
        return Err(ConfigError::InvalidApiId(api_id.clone()));
    }

    Ok(InputSource::new(name.clone(), input_type, api_id.clone()))
}

fn parse_speaker_group(group: &SpeakerGroupConfig) -> Result<SpeakerGroup, ConfigError> {
    let id = group
        .id
        .as_ref()
        .ok_or_else(|| ConfigError::InvalidSpeakerGroup("missing".to_string()))?;
    let numeric = match id {
        NumberOrString::Number(n) => u32::try_from(*n).ok(),
        NumberOrString::Text(s) => s.trim().parse::<u32>().ok(),
    }
    .ok_or_else(|| ConfigError::InvalidSpeakerGroup(id.describe()))?;

    Ok(SpeakerGroup {
        id: numeric,
        name: group.name.clone().unwrap_or_else(|| format!("Group {numeric}")),
    })
}
