//! In-memory entity manager
//!
//! A [`DashMap`]-backed [`EntityManager`] used by tests and the demo. Writes
//! are staged until [`EntityManager::flush`]; queries see flushed state only
//! and return entities in insertion order unless sorted.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::criteria::OrderDirection;
use super::error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
use super::query::ResourceQuery;
use super::traits::{EntityManager, RepositoryResult};
use crate::resource::{Resource, ResourceEntity, IDENTIFIER_FIELD};

struct StoredEntity {
    sequence: u64,
    entity: Box<dyn Resource>,
}

enum StagedWrite {
    Persist(Box<dyn Resource>),
    Remove { resource_type: String, id: String },
}

/// Entity manager keeping every entity in process memory
#[derive(Default)]
pub struct InMemoryEntityManager {
    entities: DashMap<(String, String), StoredEntity>,
    sequence: AtomicU64,
    staged: Mutex<Vec<StagedWrite>>,
}

impl InMemoryEntityManager {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entity immediately, bypassing staging
    pub fn insert<T: ResourceEntity>(&self, entity: T) -> RepositoryResult<()> {
        self.store(Box::new(entity), RepositoryOperation::Persist)
    }

    /// Number of stored entities of a type
    pub fn len(&self, resource_type: &str) -> usize {
        self.entities
            .iter()
            .filter(|entry| entry.key().0 == resource_type)
            .count()
    }

    /// Whether no entity of a type is stored
    pub fn is_empty(&self, resource_type: &str) -> bool {
        self.len(resource_type) == 0
    }

    fn store(&self, entity: Box<dyn Resource>, operation: RepositoryOperation) -> RepositoryResult<()> {
        let id = entity.resource_id().ok_or_else(|| {
            RepositoryError::new(
                operation,
                RepositoryErrorKind::ValidationFailed,
                "Entity has no identifier",
            )
        })?;
        let key = (entity.resource_type().to_string(), id);

        match self.entities.entry(key) {
            Entry::Occupied(mut stored) => stored.get_mut().entity = entity,
            Entry::Vacant(slot) => {
                let sequence = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);
                slot.insert(StoredEntity { sequence, entity });
            }
        }
        Ok(())
    }

    fn matching(&self, query: &ResourceQuery) -> Vec<(u64, Map<String, Value>, Box<dyn Resource>)> {
        let mut matches: Vec<_> = self
            .entities
            .iter()
            .filter(|entry| entry.key().0 == query.resource_type)
            .filter_map(|entry| {
                let mut properties = entry.entity.properties();
                properties.insert(IDENTIFIER_FIELD.to_string(), Value::String(entry.key().1.clone()));
                query
                    .criteria
                    .matches(|field| properties.get(field))
                    .then(|| (entry.sequence, properties.clone(), entry.entity.clone_resource()))
            })
            .collect();

        matches.sort_by_key(|(sequence, _, _)| *sequence);
        matches
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(Value::String(a)), Some(Value::String(b))) => {
            match (a.parse::<f64>(), b.parse::<f64>()) {
                (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => a.cmp(b),
            }
        }
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl EntityManager for InMemoryEntityManager {
    async fn find(&self, resource_type: &str, id: &str) -> RepositoryResult<Option<Box<dyn Resource>>> {
        Ok(self
            .entities
            .get(&(resource_type.to_string(), id.to_string()))
            .map(|stored| stored.entity.clone_resource()))
    }

    async fn query(&self, query: &ResourceQuery) -> RepositoryResult<Vec<Box<dyn Resource>>> {
        let mut matches = self.matching(query);

        if !query.sort.is_empty() {
            matches.sort_by(|(_, a, _), (_, b, _)| {
                query
                    .sort
                    .iter()
                    .map(|(field, direction)| {
                        let ordering = compare_values(a.get(field), b.get(field));
                        match direction {
                            OrderDirection::Ascending => ordering,
                            OrderDirection::Descending => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        let (offset, limit) = match query.pagination {
            Some(page) => (
                usize::try_from(page.offset).unwrap_or(usize::MAX),
                usize::try_from(page.limit).unwrap_or(usize::MAX),
            ),
            None => (0, usize::MAX),
        };

        Ok(matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, _, entity)| entity)
            .collect())
    }

    async fn count(&self, query: &ResourceQuery) -> RepositoryResult<u64> {
        Ok(self.matching(query).len() as u64)
    }

    async fn persist(&self, entity: &dyn Resource) -> RepositoryResult<()> {
        if entity.resource_id().is_none() {
            return Err(RepositoryError::new(
                RepositoryOperation::Persist,
                RepositoryErrorKind::ValidationFailed,
                "Entity has no identifier",
            ));
        }
        self.staged
            .lock()
            .await
            .push(StagedWrite::Persist(entity.clone_resource()));
        Ok(())
    }

    async fn remove(&self, entity: &dyn Resource) -> RepositoryResult<()> {
        let id = entity.resource_id().ok_or_else(|| {
            RepositoryError::new(
                RepositoryOperation::Remove,
                RepositoryErrorKind::ValidationFailed,
                "Entity has no identifier",
            )
        })?;
        self.staged.lock().await.push(StagedWrite::Remove {
            resource_type: entity.resource_type().to_string(),
            id,
        });
        Ok(())
    }

    async fn flush(&self) -> RepositoryResult<()> {
        let staged = std::mem::take(&mut *self.staged.lock().await);
        let writes = staged.len();

        for write in staged {
            match write {
                StagedWrite::Persist(entity) => self.store(entity, RepositoryOperation::Flush)?,
                StagedWrite::Remove { resource_type, id } => {
                    self.entities.remove(&(resource_type, id));
                }
            }
        }

        tracing::trace!(writes, "Flushed staged writes");
        Ok(())
    }
}
