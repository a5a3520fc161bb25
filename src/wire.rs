//! JSON shapes exchanged with the device's HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::device::MediaState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfoBody {
    pub beo_device: BeoDevice,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeoDevice {
    pub product_id: ProductId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductId {
    pub product_type: String,
    #[serde(default)]
    pub serial_number: String,
}

#[derive(Debug, Deserialize)]
pub struct SourcesBody {
    #[serde(default)]
    pub sources: Vec<(String, SourceEntry)>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub source_type: SourceType,
}

#[derive(Debug, Default, Deserialize)]
pub struct SourceType {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct VolumeBody {
    pub volume: VolumeStatus,
}

#[derive(Debug, Deserialize)]
pub struct VolumeStatus {
    pub speaker: SpeakerVolume,
}

/// Also the payload of a `VOLUME` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerVolume {
    pub level: u32,
    #[serde(default)]
    pub muted: bool,
    pub range: VolumeRange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeRange {
    pub maximum: u32,
}

#[derive(Debug, Deserialize)]
pub struct PowerBody {
    pub profile: PowerProfile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerProfile {
    pub power_management: PowerManagement,
}

#[derive(Debug, Deserialize)]
pub struct PowerManagement {
    pub standby: Standby,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standby {
    pub power_state: String,
}

impl Standby {
    pub fn is_on(&self) -> bool {
        self.power_state == "on"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSourcesBody {
    pub active_sources: ActiveSources,
}

/// Also the payload of a `SOURCE` notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActiveSources {
    #[serde(default)]
    pub primary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerGroupBody {
    pub speaker_group: SpeakerGroupStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeakerGroupStatus {
    #[serde(default)]
    pub list: Vec<SpeakerGroupEntry>,
    #[serde(default)]
    pub active: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerGroupEntry {
    pub id: u32,
    #[serde(default)]
    pub friendly_name: String,
}

/// Payload of a `PROGRESS_INFORMATION` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressInformation {
    pub state: String,
}

impl ProgressInformation {
    pub fn media_state(&self) -> Option<MediaState> {
        MediaState::from_device(&self.state)
    }
}

pub fn level_body(level: u32) -> Value {
    json!({ "level": level })
}

pub fn muted_body(muted: bool) -> Value {
    json!({ "muted": muted })
}

pub fn standby_body(on: bool) -> Value {
    json!({ "standby": { "powerState": if on { "on" } else { "standby" } } })
}

pub fn input_body(api_id: &str, jid: &str) -> Value {
    json!({
        "primaryExperience": {
            "source": {
                "id": api_id,
                "friendlyName": "",
                "product": { "jid": jid, "friendlyName": "" }
            }
        }
    })
}

pub fn speaker_group_body(id: u32) -> Value {
    json!({ "active": id })
}
