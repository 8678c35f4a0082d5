//! Audited persistence capabilities
//!
//! Every call is wrapped in an [`Operation`] whose channel is the database
//! name and whose target is the credential-free connection string.

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

use super::{Filter, Model, Page, PageRequest, ProjectionQuery, QueryRunner, RecordStore, StoreResult};
use crate::audit::{redact::strip_credentials, AuditContext, AuditPublisher, Operation};

pub const OP_SAVE: &str = "SAVE";
pub const OP_GET: &str = "GET";
pub const OP_DELETE: &str = "DELETE";
pub const OP_PAGINATE: &str = "PAGINATE";
pub const OP_QUERY: &str = "QUERY";

/// Serialize for an audit payload; failures are recorded as text rather
/// than failing the audited call.
fn to_payload<T: Serialize>(value: &T) -> JsonValue {
    serde_json::to_value(value)
        .unwrap_or_else(|e| JsonValue::String(format!("<unserializable: {e}>")))
}

/// Record store whose operations are mirrored to the audit publisher
#[derive(Debug, Clone)]
pub struct AuditedStore<S> {
    store: S,
    publisher: AuditPublisher,
    channel: String,
    target: String,
}

impl<S: RecordStore> AuditedStore<S> {
    /// `dsn` may carry credentials; they are stripped before use as target
    pub fn new(store: S, publisher: AuditPublisher, channel: impl Into<String>, dsn: &str) -> Self {
        Self {
            store,
            publisher,
            channel: channel.into(),
            target: strip_credentials(dsn),
        }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    #[track_caller]
    fn operation(&self, name: &str) -> Operation {
        Operation::new(self.channel.as_str(), name, self.target.as_str())
    }

    pub async fn create<M: Model>(&self, ctx: &AuditContext, model: &M) -> StoreResult<()> {
        let input = json!({ "table": M::TABLE, "payload": to_payload(model) });
        let output = input.clone();

        self.operation(OP_SAVE)
            .caller("AuditedStore::create")
            .run(
                &self.publisher,
                ctx,
                input,
                || self.store.create(model),
                |_| output,
            )
            .await
    }

    /// Insert or replace by primary key
    pub async fn update<M: Model>(&self, ctx: &AuditContext, model: &M) -> StoreResult<()> {
        let input = json!({ "table": M::TABLE, "payload": to_payload(model) });
        let output = input.clone();

        self.operation(OP_SAVE)
            .caller("AuditedStore::update")
            .run(
                &self.publisher,
                ctx,
                input,
                || self.store.update(model),
                |_| output,
            )
            .await
    }

    pub async fn get<M: Model>(&self, ctx: &AuditContext, id: Uuid) -> StoreResult<M> {
        let input = json!({ "table": M::TABLE, "id": id });

        self.operation(OP_GET)
            .caller("AuditedStore::get")
            .run(
                &self.publisher,
                ctx,
                input,
                || self.store.get::<M>(id),
                |model| json!({ "table": M::TABLE, "payload": to_payload(model) }),
            )
            .await
    }

    pub async fn delete<M: Model>(&self, ctx: &AuditContext, id: Uuid) -> StoreResult<()> {
        let input = json!({ "table": M::TABLE, "id": id });
        let output = json!({ "table": M::TABLE, "id": id, "deleted": true });

        self.operation(OP_DELETE)
            .caller("AuditedStore::delete")
            .run(
                &self.publisher,
                ctx,
                input,
                || self.store.delete::<M>(id),
                |_| output,
            )
            .await
    }

    pub async fn paginate<M: Model>(
        &self,
        ctx: &AuditContext,
        filters: &[Filter],
        page: &PageRequest,
    ) -> StoreResult<Page<M>> {
        let input = json!({
            "table": M::TABLE,
            "filters": to_payload(&filters),
            "page": page.page(),
            "per_page": page.per_page(),
        });

        self.operation(OP_PAGINATE)
            .caller("AuditedStore::paginate")
            .run(
                &self.publisher,
                ctx,
                input,
                || self.store.paginate::<M>(filters, page),
                to_payload,
            )
            .await
    }

    pub async fn ping(&self) -> StoreResult<()> {
        self.store.ping().await
    }
}

/// Raw projection runner whose queries are mirrored to the audit publisher
#[derive(Debug, Clone)]
pub struct AuditedQuery<Q> {
    runner: Q,
    publisher: AuditPublisher,
    channel: String,
    target: String,
}

impl<Q: QueryRunner> AuditedQuery<Q> {
    pub fn new(runner: Q, publisher: AuditPublisher, channel: impl Into<String>, dsn: &str) -> Self {
        Self {
            runner,
            publisher,
            channel: channel.into(),
            target: strip_credentials(dsn),
        }
    }

    /// The REQUEST payload is the generated SQL text
    pub async fn query(
        &self,
        ctx: &AuditContext,
        query: &ProjectionQuery,
    ) -> StoreResult<Vec<Map<String, JsonValue>>> {
        let input = match query.to_sql() {
            Ok(sql) => JsonValue::String(sql),
            Err(_) => to_payload(query),
        };

        Operation::new(self.channel.as_str(), OP_QUERY, self.target.as_str())
            .caller("AuditedQuery::query")
            .run(
                &self.publisher,
                ctx,
                input,
                || self.runner.query(query),
                |rows| JsonValue::Array(rows.iter().cloned().map(JsonValue::Object).collect()),
            )
            .await
    }
}

impl<S> AuditedStore<S> {
    /// Pair this store's audit settings with a projection runner
    pub fn with_query<Q: QueryRunner>(&self, runner: Q) -> AuditedQuery<Q> {
        AuditedQuery {
            runner,
            publisher: self.publisher.clone(),
            channel: self.channel.clone(),
            target: self.target.clone(),
        }
    }
}
