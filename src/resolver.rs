//! Startup discovery of a device's identity, sources and speaker groups.

use reqwest::Method;
use tracing::{debug, info, warn};

use crate::config::DeviceSettings;
use crate::device::{DeviceInfo, InputSource, InputType, PowerOnMethod, SpeakerGroup};
use crate::endpoints::{DeviceEndpoints, Endpoint};
use crate::error::SetupError;
use crate::gateway::{DeviceTransport, GatewayResponse};
use crate::wire::{DeviceInfoBody, SourcesBody, SpeakerGroupBody};

pub const JID_HEADER: &str = "device-jid";

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDevice {
    pub info: DeviceInfo,
    pub inputs: Vec<InputSource>,
    pub power_on: PowerOnMethod,
    pub default_input: u32,
    pub speaker_groups: Vec<SpeakerGroup>,
    pub active_speaker_group: Option<u32>,
}

pub fn parse_device_info(response: &GatewayResponse) -> Option<DeviceInfo> {
    let body: DeviceInfoBody = response.parse()?;
    let product = body.beo_device.product_id;
    Some(DeviceInfo {
        model: product.product_type,
        serial_number: product.serial_number,
        jid: response.header(JID_HEADER).unwrap_or_default().to_string(),
    })
}

pub fn parse_sources(body: SourcesBody) -> Vec<InputSource> {
    body.sources
        .into_iter()
        .map(|(api_id, entry)| {
            InputSource::new(
                entry.friendly_name,
                InputType::from_source_type(&entry.source_type.kind),
                api_id,
            )
        })
        .collect()
}

pub fn is_tv_like(inputs: &[InputSource]) -> bool {
    inputs.iter().any(|input| input.input_type.is_tv_like())
}

/// Configured inputs win over discovered ones; excludes are then dropped and the
/// "None" entry appended for devices without a picture.
pub fn build_input_list(
    parsed: Vec<InputSource>,
    configured: &[InputSource],
    exclude: &[String],
    tv_like: bool,
) -> Vec<InputSource> {
    let mut inputs = if configured.is_empty() {
        parsed
    } else {
        configured.to_vec()
    };
    inputs.retain(|input| !exclude.contains(&input.api_id));
    if !tv_like {
        inputs.push(InputSource::none());
    }
    inputs
}

pub fn clamp_default_input(default: u32, inputs: &[InputSource]) -> u32 {
    let selectable = inputs.iter().filter(|i| !i.is_none_entry()).count() as u32;
    default.clamp(1, selectable.max(1))
}

pub fn parse_speaker_groups(body: &SpeakerGroupBody) -> Vec<SpeakerGroup> {
    body.speaker_group
        .list
        .iter()
        .map(|entry| SpeakerGroup {
            id: entry.id,
            name: entry.friendly_name.clone(),
        })
        .collect()
}

pub async fn resolve(
    transport: &dyn DeviceTransport,
    endpoints: &DeviceEndpoints,
    settings: &DeviceSettings,
) -> Result<ResolvedDevice, SetupError> {
    let name = &settings.name;

    let info = transport
        .request(endpoints.url(Endpoint::DeviceInfo), None, Method::GET)
        .await
        .as_ref()
        .and_then(parse_device_info)
        .ok_or_else(|| SetupError::DeviceInfo(endpoints.ip().to_string()))?;
    info!("[{}] Found {} (serial {})", name, info.model, info.serial_number);
    if info.jid.is_empty() {
        warn!("[{}] Device did not report a JID, input selection may fail", name);
    }

    let parsed = match transport
        .request(endpoints.url(Endpoint::SourceList), None, Method::GET)
        .await
        .and_then(|response| response.parse::<SourcesBody>())
    {
        Some(body) => parse_sources(body),
        None => {
            warn!("[{}] Reading source list failed, inputs unavailable", name);
            Vec::new()
        }
    };

    let tv_like = is_tv_like(&parsed) || is_tv_like(&settings.inputs);
    let power_on = if tv_like && !settings.power_on_explicit && settings.power_on == PowerOnMethod::On {
        info!("[{}] Device has TV sources, powering on via input", name);
        PowerOnMethod::Input
    } else {
        settings.power_on
    };

    let inputs = build_input_list(parsed, &settings.inputs, &settings.exclude, tv_like);
    let default_input = clamp_default_input(settings.default_input, &inputs);
    if default_input != settings.default_input {
        warn!("[{}] Default input out of range. Changed to input {}", name, default_input);
    }
    for (i, input) in inputs.iter().enumerate() {
        debug!("[{}] Input {}: {} ({:?}) {}", name, i + 1, input.name, input.input_type, input.api_id);
    }

    let speaker_group_body = transport
        .request(endpoints.url(Endpoint::SpeakerGroupStatus), None, Method::GET)
        .await
        .and_then(|response| response.parse::<SpeakerGroupBody>());
    if speaker_group_body.is_none() {
        warn!("[{}] Reading speaker groups failed", name);
    }

    let speaker_groups = if settings.speaker_groups.is_empty() {
        speaker_group_body
            .as_ref()
            .map(parse_speaker_groups)
            .unwrap_or_default()
    } else {
        settings.speaker_groups.clone()
    };
    let active_speaker_group = speaker_group_body.and_then(|body| body.speaker_group.active);

    info!(
        "[{}] {} inputs, {} speaker groups, power on via {:?}",
        name,
        inputs.len(),
        speaker_groups.len(),
        power_on
    );

    Ok(ResolvedDevice {
        info,
        inputs,
        power_on,
        default_input,
        speaker_groups,
        active_speaker_group,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::test_support::{self, FakeTransport};
    use serde_json::json;

    const HDMI_ID: &str = "hdmi:1111.2222.3333@products.bang-olufsen.com";
    const SPOTIFY_ID: &str = "spotify:1111.2222.3333@products.bang-olufsen.com";

    fn settings(config: DeviceConfig) -> DeviceSettings {
        DeviceSettings::from_config(&DeviceConfig {
            name: Some("Test".into()),
            ip: Some(test_support::DEVICE_IP.into()),
            ..config
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_device_info_failure_is_fatal() {
        let transport = FakeTransport::new();
        let endpoints = DeviceEndpoints::new(test_support::DEVICE_IP).unwrap();

        let result = resolve(&*transport, &endpoints, &settings(DeviceConfig::default())).await;
        assert!(matches!(result, Err(SetupError::DeviceInfo(_))));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_tv_sources_force_input_power_on() {
        let transport = FakeTransport::new();
        let endpoints = DeviceEndpoints::new(test_support::DEVICE_IP).unwrap();
        test_support::script_device_info(&transport, &endpoints);
        test_support::script_sources(&transport, &endpoints, &[(HDMI_ID, "HDMI 1", "HDMI"), (SPOTIFY_ID, "Spotify", "SPOTIFY")]);

        let resolved = resolve(&*transport, &endpoints, &settings(DeviceConfig {
            kind: Some("speaker".into()),
            ..Default::default()
        }))
        .await
        .unwrap();

        assert!(!resolved.inputs.iter().any(InputSource::is_none_entry));
        assert_eq!(resolved.power_on, PowerOnMethod::Input);
        assert_eq!(resolved.inputs.len(), 2);
        assert_eq!(resolved.info.jid, test_support::DEVICE_JID);
    }

    #[tokio::test]
    async fn test_explicit_power_on_is_kept_for_tv_sources() {
        let transport = FakeTransport::new();
        let endpoints = DeviceEndpoints::new(test_support::DEVICE_IP).unwrap();
        test_support::script_device_info(&transport, &endpoints);
        test_support::script_sources(&transport, &endpoints, &[(HDMI_ID, "HDMI 1", "TV")]);

        let resolved = resolve(&*transport, &endpoints, &settings(DeviceConfig {
            on: Some("on".into()),
            ..Default::default()
        }))
        .await
        .unwrap();

        assert_eq!(resolved.power_on, PowerOnMethod::On);
    }

    #[tokio::test]
    async fn test_audio_only_device_gets_none_entry_and_groups() {
        let transport = FakeTransport::new();
        let endpoints = DeviceEndpoints::new(test_support::DEVICE_IP).unwrap();
        test_support::script_device_info(&transport, &endpoints);
        test_support::script_sources(&transport, &endpoints, &[(SPOTIFY_ID, "Spotify", "SPOTIFY")]);
        transport.respond(
            Method::GET,
            endpoints.url(Endpoint::SpeakerGroupStatus),
            json!({"speakerGroup": {"list": [{"id": 1, "friendlyName": "Default"}, {"id": 2, "friendlyName": "Party"}], "active": 2}}),
        );

        let resolved = resolve(&*transport, &endpoints, &settings(DeviceConfig {
            default: Some(crate::config::NumberOrString::Number(9)),
            ..Default::default()
        }))
        .await
        .unwrap();

        assert_eq!(resolved.power_on, PowerOnMethod::On);
        assert_eq!(resolved.inputs.last(), Some(&InputSource::none()));
        assert_eq!(resolved.default_input, 1);
        assert_eq!(resolved.speaker_groups.len(), 2);
        assert_eq!(resolved.active_speaker_group, Some(2));
    }

    #[tokio::test]
    async fn test_missing_sources_are_not_fatal() {
        let transport = FakeTransport::new();
        let endpoints = DeviceEndpoints::new(test_support::DEVICE_IP).unwrap();
        test_support::script_device_info(&transport, &endpoints);

        let resolved = resolve(&*transport, &endpoints, &settings(DeviceConfig::default()))
            .await
            .unwrap();
        assert_eq!(resolved.inputs, vec![InputSource::none()]);
        assert!(resolved.speaker_groups.is_empty());
    }

    #[test]
    fn test_build_input_list() {
        let parsed = vec![
            InputSource::new("HDMI 1", InputType::Hdmi, HDMI_ID),
            InputSource::new("Spotify", InputType::Application, SPOTIFY_ID),
        ];

        let excluded = build_input_list(parsed.clone(), &[], &[SPOTIFY_ID.to_string()], true);
        assert_eq!(excluded, vec![parsed[0].clone()]);

        let configured = vec![InputSource::new("Music", InputType::Application, SPOTIFY_ID)];
        let replaced = build_input_list(parsed, &configured, &[], false);
        assert_eq!(replaced, vec![configured[0].clone(), InputSource::none()]);
    }

    #[test]
    fn test_clamp_default_input() {
        let inputs = vec![
            InputSource::new("HDMI 1", InputType::Hdmi, HDMI_ID),
            InputSource::none(),
        ];
        assert_eq!(clamp_default_input(1, &inputs), 1);
        assert_eq!(clamp_default_input(5, &inputs), 1);
        assert_eq!(clamp_default_input(3, &[]), 1);
    }
}
