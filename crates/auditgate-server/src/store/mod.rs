//! Persistence layer
//!
//! Models are stored as JSON documents, one table per model type. The
//! [`RecordStore`] and [`QueryRunner`] traits are the raw capabilities;
//! [`AuditedStore`] and [`AuditedQuery`] wrap them so every call emits a
//! REQUEST/RESPONSE audit pair.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

mod audited;
mod error;
pub mod filter;
mod memory;
pub mod pagination;
mod pg;
pub mod query;

pub use audited::{AuditedQuery, AuditedStore, OP_DELETE, OP_GET, OP_PAGINATE, OP_QUERY, OP_SAVE};
pub use error::StoreError;
pub use filter::{Filter, FilterOp};
pub use memory::MemoryStore;
pub use pagination::{Page, PageMeta, PageRequest};
pub use pg::PgStore;
pub use query::{ProjectionField, ProjectionQuery};

pub type StoreResult<T> = Result<T, StoreError>;

/// A type persisted as one JSON document per row of [`Model::TABLE`]
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name; must be a plain SQL identifier
    const TABLE: &'static str;

    fn id(&self) -> Uuid;
}

#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Insert a new record; fails with `Conflict` if the ID exists
    async fn create<M: Model>(&self, model: &M) -> StoreResult<()>;

    /// Insert or replace by primary key
    async fn update<M: Model>(&self, model: &M) -> StoreResult<()>;

    async fn get<M: Model>(&self, id: Uuid) -> StoreResult<M>;

    /// Remove by primary key; fails with `NotFound` if nothing was removed
    async fn delete<M: Model>(&self, id: Uuid) -> StoreResult<()>;

    /// Filtered listing ordered by creation time
    async fn paginate<M: Model>(
        &self,
        filters: &[Filter],
        page: &PageRequest,
    ) -> StoreResult<Page<M>>;

    /// Connectivity check used by the health endpoint
    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait QueryRunner: Send + Sync + 'static {
    /// Run a projection, returning each row as `{alias: value}`
    async fn query(&self, query: &ProjectionQuery) -> StoreResult<Vec<Map<String, JsonValue>>>;
}
