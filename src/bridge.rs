use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{DeviceConfig, DeviceSettings};
use crate::device::AccessoryKind;
use crate::gateway::{DeviceTransport, HttpGateway};
use crate::hub::AccessoryHub;
use crate::mapper;
use crate::session::DeviceSession;
use crate::supervisor::{StreamState, StreamSupervisor, SupervisorHandle};

pub struct ManagedDevice {
    pub session: Arc<DeviceSession>,
    pub supervisor: SupervisorHandle,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub id: Uuid,
    pub name: String,
    pub kind: AccessoryKind,
    pub stream: StreamState,
}

/// All configured devices, each wired to its accessory and notification stream.
pub struct Bridge {
    hub: Arc<dyn AccessoryHub>,
    devices: HashMap<Uuid, ManagedDevice>,
}

impl Bridge {
    pub fn new(hub: Arc<dyn AccessoryHub>) -> Self {
        Self {
            hub,
            devices: HashMap::new(),
        }
    }

    /// Set up every configured device. A device that fails is logged and skipped.
    pub async fn start(hub: Arc<dyn AccessoryHub>, configs: &[DeviceConfig]) -> Self {
        let mut bridge = Self::new(hub);
        for config in configs {
            let label = config.name.clone().unwrap_or_else(|| "B&O Device".to_string());
            if let Err(e) = bridge.add_device(config).await {
                error!("[{}] Device setup failed: {:#}", label, e);
            }
        }
        info!("Bridge started with {} of {} devices", bridge.devices.len(), configs.len());
        bridge
    }

    pub async fn add_device(&mut self, config: &DeviceConfig) -> Result<Uuid> {
        let settings = DeviceSettings::from_config(config).context("Invalid device configuration")?;
        let transport = HttpGateway::new(settings.name.clone(), settings.proxy.as_ref())
            .context("Failed to create HTTP client")?;
        self.add_device_with_transport(settings, Arc::new(transport)).await
    }

    pub async fn add_device_with_transport(
        &mut self,
        settings: DeviceSettings,
        transport: Arc<dyn DeviceTransport>,
    ) -> Result<Uuid> {
        let interval = settings.refresh_interval;
        let mut session = DeviceSession::new(settings, transport, self.hub.sink())?;
        session.initialize().await?;

        let state = session.cached_state().await;
        let accessory = mapper::build_accessory(&session, &state);
        let id = accessory.id;

        if self.hub.find_accessory(&id).is_some() {
            info!("[{}] Restoring cached accessory {}", session.name(), id);
        }
        if session.kind() == AccessoryKind::Tv {
            self.hub.publish_external(accessory);
        } else {
            self.hub.register_new(accessory);
        }

        let session = Arc::new(session);
        session.poll().await;

        let supervisor = StreamSupervisor::new(session.clone(), interval).start();
        info!("[{}] Ready as {} ({})", session.name(), session.kind(), id);
        self.devices.insert(id, ManagedDevice { session, supervisor });
        Ok(id)
    }

    pub fn session(&self, id: &Uuid) -> Option<Arc<DeviceSession>> {
        self.devices.get(id).map(|d| d.session.clone())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn statuses(&self) -> Vec<DeviceStatus> {
        let mut statuses: Vec<DeviceStatus> = self
            .devices
            .iter()
            .map(|(id, device)| DeviceStatus {
                id: *id,
                name: device.session.name().to_string(),
                kind: device.session.kind(),
                stream: device.supervisor.state(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub fn shutdown(&self) {
        for device in self.devices.values() {
            device.supervisor.shutdown();
        }
    }
}
