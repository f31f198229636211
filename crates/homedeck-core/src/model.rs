// ── Domain model ──
//
// Entity state as the host sees it. Snapshots are complete maps replaced
// wholesale on every update; nothing in the host ever patches one.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use homedeck_api::StateFrame;

/// Identifier of one external entity, e.g. `light.kitchen`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::borrow::Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One entity's current state plus its free-form attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub state: serde_json::Value,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// A complete, point-in-time mapping of entity states.
///
/// Immutable once built; shared between the session, the hub link, and
/// every widget as `Arc<EntitySnapshot>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    entities: HashMap<EntityId, Entity>,
}

impl EntitySnapshot {
    pub fn new(entities: HashMap<EntityId, Entity>) -> Self {
        Self { entities }
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity)> {
        self.entities.iter()
    }
}

impl From<StateFrame> for EntitySnapshot {
    fn from(frame: StateFrame) -> Self {
        let entities = frame
            .entities
            .into_iter()
            .map(|(id, update)| {
                (
                    EntityId::new(id),
                    Entity {
                        state: update.state,
                        attributes: update.attributes,
                    },
                )
            })
            .collect();
        Self { entities }
    }
}
