//! In-process record store for tests and local runs

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{Filter, Model, Page, PageRequest, RecordStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    data: JsonValue,
}

#[derive(Debug, Default)]
struct Tables {
    next_seq: u64,
    tables: HashMap<&'static str, HashMap<Uuid, Entry>>,
}

/// Documents kept in memory; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records of `M`
    pub fn count<M: Model>(&self) -> usize {
        self.read()
            .tables
            .get(M::TABLE)
            .map_or(0, |table| table.len())
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn put<M: Model>(&self, model: &M, replace: bool) -> StoreResult<()> {
        let data = serde_json::to_value(model)?;
        let id = model.id();

        let mut guard = self.write();
        let seq = guard.next_seq;
        let table = guard.tables.entry(M::TABLE).or_default();

        match table.get_mut(&id) {
            Some(_) if !replace => Err(StoreError::Conflict {
                table: M::TABLE,
                id,
            }),
            Some(existing) => {
                existing.data = data;
                Ok(())
            },
            None => {
                table.insert(id, Entry { seq, data });
                guard.next_seq += 1;
                Ok(())
            },
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create<M: Model>(&self, model: &M) -> StoreResult<()> {
        self.put(model, false)
    }

    async fn update<M: Model>(&self, model: &M) -> StoreResult<()> {
        self.put(model, true)
    }

    async fn get<M: Model>(&self, id: Uuid) -> StoreResult<M> {
        let data = self
            .read()
            .tables
            .get(M::TABLE)
            .and_then(|table| table.get(&id))
            .map(|entry| entry.data.clone())
            .ok_or(StoreError::NotFound {
                table: M::TABLE,
                id,
            })?;

        Ok(serde_json::from_value(data)?)
    }

    async fn delete<M: Model>(&self, id: Uuid) -> StoreResult<()> {
        self.write()
            .tables
            .get_mut(M::TABLE)
            .and_then(|table| table.remove(&id))
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                table: M::TABLE,
                id,
            })
    }

    async fn paginate<M: Model>(
        &self,
        filters: &[Filter],
        page: &PageRequest,
    ) -> StoreResult<Page<M>> {
        let mut matching: Vec<(u64, Uuid, JsonValue)> = self
            .read()
            .tables
            .get(M::TABLE)
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, entry)| filters.iter().all(|f| f.matches(&entry.data)))
                    .map(|(id, entry)| (entry.seq, *id, entry.data.clone()))
                    .collect()
            })
            .unwrap_or_default();

        matching.sort_by_key(|(seq, id, _)| (*seq, *id));
        let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.per_page()).unwrap_or(usize::MAX);

        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, _, data)| serde_json::from_value(data))
            .collect::<Result<Vec<M>, _>>()?;

        Ok(Page::new(items, page, total))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
