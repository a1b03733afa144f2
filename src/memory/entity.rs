use serde::{Deserialize, Serialize};

use super::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Component,
    VisionStandard,
    ArchitecturalStandard,
    Pattern,
    Problem,
    SolutionPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    pub observations: Vec<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
            observations: Vec::new(),
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::from_observations(&self.observations)
    }
}

/// One line of the append-only graph log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Entity(Entity),
    Relation(super::relation::Relation),
}
