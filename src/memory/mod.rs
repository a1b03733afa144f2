pub mod entity;
pub mod ingest;
pub mod relation;
pub mod store;
pub mod tier;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use entity::{Entity, EntityType};
pub use relation::{Relation, RelationType};
pub use store::GraphStore;
pub use tier::{CallerRole, MutationResult, Tier};

/// The tier-protected entity/relation graph. A thin service facade over
/// `GraphStore` that enforces `[4.2.1]`'s write-access table on every
/// mutation and never lets a rejection cross the boundary as a panic.
pub struct MemoryService {
    store: GraphStore,
}

impl MemoryService {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            store: GraphStore::open(path)?,
        })
    }

    pub fn create_entities(&self, entities: Vec<Entity>) -> Result<usize> {
        self.store.create_entities(entities)
    }

    pub fn create_relations(&self, relations: Vec<Relation>) -> Result<usize> {
        self.store.create_relations(relations)
    }

    pub fn add_observations(
        &self,
        name: &str,
        observations: Vec<String>,
        caller: CallerRole,
    ) -> Result<MutationResult<usize>> {
        let Some(entity) = self.store.get_entity(name) else {
            return Ok(MutationResult::Rejected {
                reason: format!("not_found: {name}"),
            });
        };
        if let Err(reason) = tier::validate_tier_access(entity.tier(), caller, "add_observations") {
            return Ok(MutationResult::Rejected { reason: reason.to_string() });
        }
        let n = self.store.add_observations(name, observations)?;
        Ok(MutationResult::Applied(n))
    }

    pub fn delete_observations(
        &self,
        name: &str,
        observations: &[String],
        caller: CallerRole,
    ) -> Result<MutationResult<usize>> {
        let Some(entity) = self.store.get_entity(name) else {
            return Ok(MutationResult::Rejected {
                reason: format!("not_found: {name}"),
            });
        };
        if let Err(reason) =
            tier::validate_tier_access(entity.tier(), caller, "delete_observations")
        {
            return Ok(MutationResult::Rejected { reason: reason.to_string() });
        }
        let n = self.store.delete_observations(name, observations)?;
        Ok(MutationResult::Applied(n))
    }

    pub fn delete_entity(&self, name: &str, caller: CallerRole) -> Result<MutationResult<bool>> {
        let Some(entity) = self.store.get_entity(name) else {
            return Ok(MutationResult::Rejected {
                reason: format!("not_found: {name}"),
            });
        };
        if let Err(reason) = tier::validate_tier_access(entity.tier(), caller, "delete_entity") {
            return Ok(MutationResult::Rejected { reason: reason.to_string() });
        }
        let removed = self.store.delete_entity(name)?;
        Ok(MutationResult::Applied(removed))
    }

    pub fn delete_relations(&self, relations: Vec<Relation>) -> Result<usize> {
        self.store.delete_relations(&relations)
    }

    pub fn search_nodes(&self, query: &str) -> Vec<Entity> {
        self.store.search_nodes(query)
    }

    pub fn get_entity(&self, name: &str) -> Option<Entity> {
        self.store.get_entity(name)
    }

    pub fn get_entities_by_tier(&self, tier: Tier) -> Vec<Entity> {
        self.store.get_entities_by_tier(tier)
    }

    pub fn validate_tier_access(&self, name: &str, operation: &str, caller: CallerRole) -> bool {
        match self.store.get_entity(name) {
            Some(entity) => tier::validate_tier_access(entity.tier(), caller, operation).is_ok(),
            None => true,
        }
    }

    /// Ingest every markdown document directly under `folder`, stamping each
    /// resulting entity with `tier`. Re-ingesting a name that already exists
    /// deletes (as human) then recreates it, matching [4.2.2]'s "explicit
    /// delete-then-create" re-ingestion rule.
    pub fn ingest_documents(&self, folder: &Path, tier: Tier) -> Result<ingest::IngestReport> {
        let mut report = ingest::IngestReport::default();
        let parsed = ingest::ingest_folder(folder, tier)?;
        for entity in parsed {
            if self.store.get_entity(&entity.name).is_some() {
                self.store.delete_entity(&entity.name)?;
            }
            self.store.create_entities(vec![entity.clone()])?;
            report.entities.push(entity.name);
            report.ingested += 1;
        }
        Ok(report)
    }
}
