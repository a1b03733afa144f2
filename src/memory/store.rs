use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::Result;
use crate::lockfile;

use super::entity::{Entity, Record};
use super::relation::Relation;
use super::tier::Tier;

const DEFAULT_COMPACTION_THRESHOLD: usize = 1000;

struct GraphState {
    entities: HashMap<String, Entity>,
    relations: Vec<Relation>,
    appends_since_compaction: usize,
}

/// Append-only JSONL graph store with an in-memory cache, matching the
/// design note that the in-memory map is mutated via serialized writes
/// while the file is the truth of record under crash.
pub struct GraphStore {
    path: PathBuf,
    lock_path: PathBuf,
    compaction_threshold: usize,
    state: Mutex<GraphState>,
}

impl GraphStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_threshold(path, DEFAULT_COMPACTION_THRESHOLD)
    }

    pub fn open_with_threshold(path: impl Into<PathBuf>, compaction_threshold: usize) -> Result<Self> {
        let path = path.into();
        let lock_path = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.lock", ext.to_string_lossy()),
            None => "lock".to_string(),
        });
        let state = Self::load_state(&path)?;
        Ok(Self {
            path,
            lock_path,
            compaction_threshold,
            state: Mutex::new(state),
        })
    }

    fn load_state(path: &Path) -> Result<GraphState> {
        let mut entities = HashMap::new();
        let mut relations = Vec::new();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            for (lineno, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Record>(line) {
                    Ok(Record::Entity(e)) => {
                        entities.insert(e.name.clone(), e);
                    }
                    Ok(Record::Relation(r)) => relations.push(r),
                    Err(e) => warn!("skipping malformed graph record at line {lineno}: {e}"),
                }
            }
        }
        Ok(GraphState {
            entities,
            relations,
            appends_since_compaction: 0,
        })
    }

    /// Re-read the backing file, discarding the in-memory cache. Used by
    /// readers that must observe another process's writes.
    pub fn reload(&self) -> Result<()> {
        let fresh = Self::load_state(&self.path)?;
        let mut guard = self.state.lock().unwrap();
        *guard = fresh;
        Ok(())
    }

    fn append_line(&self, line: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.sync_all()?;
        Ok(())
    }

    pub fn create_entities(&self, entities: Vec<Entity>) -> Result<usize> {
        lockfile::with_exclusive_lock(&self.lock_path, || {
            let mut guard = self.state.lock().unwrap();
            let mut count = 0;
            for entity in entities {
                let line = serde_json::to_string(&Record::Entity(entity.clone()))?;
                self.append_line(&line)?;
                guard.entities.insert(entity.name.clone(), entity);
                guard.appends_since_compaction += 1;
                count += 1;
            }
            drop(guard);
            self.maybe_compact()?;
            info!(count, "created entities");
            Ok(count)
        })
    }

    pub fn create_relations(&self, relations: Vec<Relation>) -> Result<usize> {
        lockfile::with_exclusive_lock(&self.lock_path, || {
            let mut guard = self.state.lock().unwrap();
            let mut count = 0;
            for relation in relations {
                let from_exists = guard.entities.contains_key(&relation.from);
                let to_exists = guard.entities.contains_key(&relation.to);
                if !from_exists || !to_exists {
                    continue;
                }
                let duplicate = guard.relations.iter().any(|r| {
                    r.from == relation.from
                        && r.to == relation.to
                        && r.relation_type == relation.relation_type
                });
                if duplicate {
                    continue;
                }
                let line = serde_json::to_string(&Record::Relation(relation.clone()))?;
                self.append_line(&line)?;
                guard.relations.push(relation);
                guard.appends_since_compaction += 1;
                count += 1;
            }
            drop(guard);
            self.maybe_compact()?;
            Ok(count)
        })
    }

    pub fn add_observations(&self, name: &str, observations: Vec<String>) -> Result<usize> {
        lockfile::with_exclusive_lock(&self.lock_path, || {
            let mut guard = self.state.lock().unwrap();
            let Some(entity) = guard.entities.get_mut(name) else {
                return Ok(0);
            };
            entity.observations.extend(observations);
            let updated = entity.clone();
            let line = serde_json::to_string(&Record::Entity(updated))?;
            self.append_line(&line)?;
            guard.appends_since_compaction += 1;
            let n = guard.entities.get(name).unwrap().observations.len();
            drop(guard);
            self.maybe_compact()?;
            Ok(n)
        })
    }

    pub fn delete_observations(&self, name: &str, observations: &[String]) -> Result<usize> {
        lockfile::with_exclusive_lock(&self.lock_path, || {
            let mut guard = self.state.lock().unwrap();
            let Some(entity) = guard.entities.get_mut(name) else {
                return Ok(0);
            };
            let before = entity.observations.len();
            entity.observations.retain(|o| !observations.contains(o));
            let removed = before - entity.observations.len();
            if removed > 0 {
                drop(guard);
                self.force_compact()?;
            }
            Ok(removed)
        })
    }

    pub fn delete_entity(&self, name: &str) -> Result<bool> {
        lockfile::with_exclusive_lock(&self.lock_path, || {
            let mut guard = self.state.lock().unwrap();
            let removed = guard.entities.remove(name).is_some();
            if removed {
                guard.relations.retain(|r| r.from != name && r.to != name);
                drop(guard);
                self.force_compact()?;
            }
            Ok(removed)
        })
    }

    pub fn delete_relations(&self, relations: &[Relation]) -> Result<usize> {
        lockfile::with_exclusive_lock(&self.lock_path, || {
            let mut guard = self.state.lock().unwrap();
            let before = guard.relations.len();
            guard.relations.retain(|r| !relations.contains(r));
            let removed = before - guard.relations.len();
            if removed > 0 {
                drop(guard);
                self.force_compact()?;
            }
            Ok(removed)
        })
    }

    pub fn get_entity(&self, name: &str) -> Option<Entity> {
        self.state.lock().unwrap().entities.get(name).cloned()
    }

    pub fn get_entities_by_tier(&self, tier: Tier) -> Vec<Entity> {
        self.state
            .lock()
            .unwrap()
            .entities
            .values()
            .filter(|e| e.tier() == tier)
            .cloned()
            .collect()
    }

    pub fn relations_for(&self, name: &str) -> Vec<Relation> {
        self.state
            .lock()
            .unwrap()
            .relations
            .iter()
            .filter(|r| r.from == name || r.to == name)
            .cloned()
            .collect()
    }

    pub fn search_nodes(&self, query: &str) -> Vec<Entity> {
        let needle = query.to_lowercase();
        self.state
            .lock()
            .unwrap()
            .entities
            .values()
            .filter(|e| {
                e.name.to_lowercase().contains(&needle)
                    || e.observations
                        .iter()
                        .any(|o| o.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub fn all_entities(&self) -> Vec<Entity> {
        self.state.lock().unwrap().entities.values().cloned().collect()
    }

    fn maybe_compact(&self) -> Result<()> {
        let should = {
            let guard = self.state.lock().unwrap();
            guard.appends_since_compaction >= self.compaction_threshold
        };
        if should {
            self.force_compact()
        } else {
            Ok(())
        }
    }

    /// Rewrite the backing file from the in-memory state and atomically
    /// replace it. Always runs inside the caller's held lock.
    fn force_compact(&self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let mut buf = Vec::new();
        for entity in guard.entities.values() {
            let line = serde_json::to_string(&Record::Entity(entity.clone()))?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        for relation in &guard.relations {
            let line = serde_json::to_string(&Record::Relation(relation.clone()))?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        lockfile::atomic_write(&self.path, &buf)?;
        guard.appends_since_compaction = 0;
        info!(
            entities = guard.entities.len(),
            relations = guard.relations.len(),
            "compacted memory graph"
        );
        Ok(())
    }

    pub fn compact_now(&self) -> Result<()> {
        self.force_compact()
    }
}
