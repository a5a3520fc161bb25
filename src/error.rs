use thiserror::Error;

/// Problems found while validating a device's configuration. Any of these
/// prevents the accessory for that device from being created.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("IP address '{0}' is malformed or not valid")]
    InvalidIp(String),
    #[error("IP address is required for device {0}")]
    MissingIp(String),
    #[error("Device type '{0}' is not valid")]
    InvalidType(String),
    #[error("Mode '{0}' is not valid, expected 'mute' or 'power'")]
    InvalidMode(String),
    #[error("Power on method '{0}' is not valid, expected 'on', 'input' or 'join'")]
    InvalidPowerOn(String),
    #[error("Default input '{0}' is not a positive integer")]
    InvalidDefaultInput(String),
    #[error("Input number {0} is not complete")]
    IncompleteInput(usize),
    #[error("Input type {0} is not valid")]
    InvalidInputType(String),
    #[error("Input API ID '{0}' is malformed")]
    InvalidApiId(String),
    #[error("Excluded input '{0}' is malformed")]
    InvalidExclude(String),
    #[error("SpeakerGroup id '{0}' is malformed or invalid")]
    InvalidSpeakerGroup(String),
    #[error("Refresh interval must be greater than zero")]
    InvalidInterval,
}

/// Transport-level failures. The gateway logs these and callers only see
/// a missing response.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid debug proxy: {0}")]
    Proxy(#[source] reqwest::Error),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("device returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// Fatal startup failures for a single device session.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Reading device info from {0} failed. Have you supplied the correct IP address?")]
    DeviceInfo(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A notification line that could not be turned into an event.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("malformed notification: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A hub write that cannot be turned into a device command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("{0} is read-only")]
    ReadOnly(String),
    #[error("invalid value for {characteristic}: {reason}")]
    InvalidValue { characteristic: String, reason: String },
}
