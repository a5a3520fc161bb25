use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::device::AccessoryKind;
use crate::mapper::{Characteristic, CharacteristicUpdate, CharacteristicValue, ServiceKind};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Stable accessory id, the same for a given name, address and type across restarts.
pub fn accessory_uuid(name: &str, ip: &str, kind: AccessoryKind) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{name}{ip}{kind}").as_bytes())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub kind: ServiceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    pub name: String,
    pub characteristics: BTreeMap<Characteristic, CharacteristicValue>,
}

impl Service {
    pub fn new(kind: ServiceKind, name: &str) -> Self {
        Self {
            kind,
            subtype: None,
            name: name.to_string(),
            characteristics: BTreeMap::new(),
        }
    }

    pub fn subtype(mut self, subtype: String) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn with(mut self, characteristic: Characteristic, value: CharacteristicValue) -> Self {
        self.characteristics.insert(characteristic, value);
        self
    }

    /// Path segment used by the API: the service kind, plus `.subtype` when present.
    pub fn label(&self) -> String {
        match &self.subtype {
            Some(subtype) => format!("{}.{}", self.kind, subtype),
            None => self.kind.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accessory {
    pub id: Uuid,
    pub name: String,
    pub kind: AccessoryKind,
    pub services: Vec<Service>,
}

impl Accessory {
    pub fn service(&self, label: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.label() == label)
    }
}

/// Receives outward characteristic changes from device sessions.
pub trait CharacteristicSink: Send + Sync {
    fn publish(&self, update: CharacteristicUpdate);
}

/// Current characteristic values for every registered accessory, plus a feed of changes.
pub struct CharacteristicStore {
    accessories: RwLock<HashMap<Uuid, Accessory>>,
    updates: broadcast::Sender<CharacteristicUpdate>,
}

impl CharacteristicStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            accessories: RwLock::new(HashMap::new()),
            updates,
        }
    }

    pub fn insert(&self, accessory: Accessory) {
        self.accessories.write().insert(accessory.id, accessory);
    }

    pub fn get(&self, id: &Uuid) -> Option<Accessory> {
        self.accessories.read().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Accessory> {
        let mut accessories: Vec<Accessory> = self.accessories.read().values().cloned().collect();
        accessories.sort_by(|a, b| a.name.cmp(&b.name));
        accessories
    }

    pub fn value(&self, id: &Uuid, service: &str, characteristic: Characteristic) -> Option<CharacteristicValue> {
        let accessories = self.accessories.read();
        accessories
            .get(id)?
            .service(service)?
            .characteristics
            .get(&characteristic)
            .cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CharacteristicUpdate> {
        self.updates.subscribe()
    }
}

impl Default for CharacteristicStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacteristicSink for CharacteristicStore {
    fn publish(&self, update: CharacteristicUpdate) {
        {
            let mut accessories = self.accessories.write();
            let service = accessories.get_mut(&update.accessory).and_then(|accessory| {
                accessory
                    .services
                    .iter_mut()
                    .find(|s| s.kind == update.service && s.subtype.is_none())
            });
            match service {
                Some(service) => {
                    service
                        .characteristics
                        .insert(update.characteristic, update.value.clone());
                }
                None => debug!(
                    "Update for unknown characteristic {}.{} on {}",
                    update.service, update.characteristic, update.accessory
                ),
            }
        }

        // no subscribers is fine
        let _ = self.updates.send(update);
    }
}

/// The host's accessory registry.
pub trait AccessoryHub: Send + Sync {
    fn find_accessory(&self, id: &Uuid) -> Option<Accessory>;

    /// Register a bridged accessory, replacing a cached one with the same id.
    fn register_new(&self, accessory: Accessory);

    /// Publish an accessory on its own rather than behind the bridge (televisions).
    fn publish_external(&self, accessory: Accessory);

    fn sink(&self) -> Arc<dyn CharacteristicSink>;
}

pub struct InMemoryHub {
    store: Arc<CharacteristicStore>,
    external: RwLock<HashSet<Uuid>>,
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self {
            store: Arc::new(CharacteristicStore::new()),
            external: RwLock::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> Arc<CharacteristicStore> {
        self.store.clone()
    }

    pub fn is_external(&self, id: &Uuid) -> bool {
        self.external.read().contains(id)
    }
}

impl Default for InMemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessoryHub for InMemoryHub {
    fn find_accessory(&self, id: &Uuid) -> Option<Accessory> {
        self.store.get(id)
    }

    fn register_new(&self, accessory: Accessory) {
        info!("Registering accessory {} ({})", accessory.name, accessory.id);
        self.store.insert(accessory);
    }

    fn publish_external(&self, accessory: Accessory) {
        info!("Publishing external accessory {} ({})", accessory.name, accessory.id);
        self.external.write().insert(accessory.id);
        self.store.insert(accessory);
    }

    fn sink(&self) -> Arc<dyn CharacteristicSink> {
        self.store.clone()
    }
}
