use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::ConfigError;

pub const DEVICE_PORT: u16 = 8080;

/// Logical device operations with a fixed resource path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    DeviceInfo,
    SourceList,
    VolumeStatus,
    VolumeSet,
    MuteSet,
    PowerStatus,
    PowerSet,
    InputStatus,
    InputSet,
    SpeakerGroupStatus,
    SpeakerGroupSet,
    Join,
    Leave,
    Play,
    Pause,
    Forward,
    Back,
    Stop,
    Notifications,
}

impl Endpoint {
    pub const ALL: [Endpoint; 19] = [
        Endpoint::DeviceInfo,
        Endpoint::SourceList,
        Endpoint::VolumeStatus,
        Endpoint::VolumeSet,
        Endpoint::MuteSet,
        Endpoint::PowerStatus,
        Endpoint::PowerSet,
        Endpoint::InputStatus,
        Endpoint::InputSet,
        Endpoint::SpeakerGroupStatus,
        Endpoint::SpeakerGroupSet,
        Endpoint::Join,
        Endpoint::Leave,
        Endpoint::Play,
        Endpoint::Pause,
        Endpoint::Forward,
        Endpoint::Back,
        Endpoint::Stop,
        Endpoint::Notifications,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Endpoint::DeviceInfo => "/BeoDevice",
            Endpoint::SourceList => "/BeoZone/Zone/Sources/",
            Endpoint::VolumeStatus => "/BeoZone/Zone/Sound/Volume",
            Endpoint::VolumeSet => "/BeoZone/Zone/Sound/Volume/Speaker/Level",
            Endpoint::MuteSet => "/BeoZone/Zone/Sound/Volume/Speaker/Muted",
            Endpoint::PowerStatus => "/BeoDevice/powerManagement",
            Endpoint::PowerSet => "/BeoDevice/powerManagement/standby",
            Endpoint::InputStatus | Endpoint::InputSet => "/BeoZone/Zone/ActiveSources",
            Endpoint::SpeakerGroupStatus => "/BeoZone/Zone/Sound/SpeakerGroup",
            Endpoint::SpeakerGroupSet => "/BeoZone/Zone/Sound/SpeakerGroup/Active",
            Endpoint::Join => "/BeoZone/Zone/Device/OneWayJoin",
            Endpoint::Leave => "/BeoZone/Zone/ActiveSources/primaryExperience",
            Endpoint::Play => "/BeoZone/Zone/Stream/Play",
            Endpoint::Pause => "/BeoZone/Zone/Stream/Pause",
            Endpoint::Forward => "/BeoZone/Zone/Stream/Forward",
            Endpoint::Back => "/BeoZone/Zone/Stream/Backward",
            Endpoint::Stop => "/BeoZone/Zone/Stream/Stop",
            Endpoint::Notifications => "/BeoNotify/Notifications",
        }
    }
}

/// Resource URLs for one device, derived once from its IP address.
#[derive(Debug, Clone)]
pub struct DeviceEndpoints {
    ip: IpAddr,
    base_url: String,
    urls: HashMap<Endpoint, String>,
}

impl DeviceEndpoints {
    pub fn new(ip: &str) -> Result<Self, ConfigError> {
        let ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidIp(ip.to_string()))?;

        let base_url = match ip {
            IpAddr::V4(v4) => format!("http://{v4}:{DEVICE_PORT}"),
            IpAddr::V6(v6) => format!("http://[{v6}]:{DEVICE_PORT}"),
        };

        let urls = Endpoint::ALL
            .iter()
            .map(|endpoint| (*endpoint, format!("{base_url}{}", endpoint.path())))
            .collect();

        Ok(Self { ip, base_url, urls })
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: Endpoint) -> &str {
        // every variant is inserted in `new`
        self.urls.get(&endpoint).map(String::as_str).unwrap_or_default()
    }
}
