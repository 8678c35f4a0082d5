//! Records API
//!
//! Schemaless JSON documents stored through the audited record store. Every
//! response is HTTP 200 with response-code headers; bodies are parsed by
//! hand so malformed input yields `30 Format Error` instead of an axum
//! rejection.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    response::Response,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditContext;
use crate::error::{AppError, AppResult};
use crate::gateway::{GatewayState, Tier};
use crate::store::{AuditedStore, Filter, Model, Page, PageRequest, RecordStore};

/// A stored document: an ID plus arbitrary top-level fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl Model for Record {
    const TABLE: &'static str = "records";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record {
    /// Build from a JSON object body; `id` in the body is honoured unless
    /// `id` is given explicitly
    pub fn from_body(body: &[u8], id: Option<Uuid>) -> AppResult<Self> {
        let value: JsonValue = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("body is not valid JSON: {e}")))?;
        let JsonValue::Object(mut fields) = value else {
            return Err(AppError::Validation("body must be a JSON object".to_string()));
        };

        let body_id = match fields.remove("id") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(
                Uuid::parse_str(&s)
                    .map_err(|e| AppError::Validation(format!("invalid id '{s}': {e}")))?,
            ),
            Some(other) => {
                return Err(AppError::Validation(format!("invalid id {other}")));
            },
        };

        Ok(Self {
            id: id.or(body_id).unwrap_or_else(Uuid::new_v4),
            fields,
        })
    }
}

pub struct RecordsState<S> {
    pub store: Arc<AuditedStore<S>>,
    pub gateway: Arc<GatewayState>,
}

impl<S> Clone for RecordsState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gateway: Arc::clone(&self.gateway),
        }
    }
}

pub fn router<S: RecordStore>(state: RecordsState<S>) -> Router {
    Router::new()
        .route("/records", get(list_records::<S>).post(create_record::<S>))
        .route(
            "/records/:id",
            get(get_record::<S>)
                .put(update_record::<S>)
                .delete(delete_record::<S>),
        )
        .with_state(state)
}

fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AppError::Validation(format!("invalid record id '{raw}': {e}")))
}

/// `page`, `per_page` and repeatable `filter=key:op:value`
fn parse_listing(query: Option<&str>) -> AppResult<(Vec<Filter>, PageRequest)> {
    let mut filters = Vec::new();
    let mut page = PageRequest::default();

    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "page" => {
                page.page = Some(value.parse().map_err(|_| {
                    AppError::Validation(format!("page must be an integer, got '{value}'"))
                })?);
            },
            "per_page" => {
                page.per_page = Some(value.parse().map_err(|_| {
                    AppError::Validation(format!("per_page must be an integer, got '{value}'"))
                })?);
            },
            "filter" => filters.push(value.parse::<Filter>()?),
            _ => {},
        }
    }

    page.validate()
        .map_err(|message| AppError::Validation(message.to_string()))?;
    Ok((filters, page))
}

async fn create_record<S: RecordStore>(
    State(state): State<RecordsState<S>>,
    ctx: AuditContext,
    body: Bytes,
) -> Response {
    let result: AppResult<Record> = async {
        let record = Record::from_body(&body, None)?;
        state.store.create(&ctx, &record).await?;
        info!(record_id = %record.id, "Record created");
        Ok::<_, AppError>(record)
    }
    .await;
    state.gateway.reply(result)
}

async fn list_records<S: RecordStore>(
    State(state): State<RecordsState<S>>,
    ctx: AuditContext,
    tier: Option<axum::Extension<Tier>>,
    RawQuery(query): RawQuery,
) -> Response {
    let result: AppResult<Page<Record>> = async {
        let (filters, page) = parse_listing(query.as_deref())?;
        tracing::debug!(
            filters = filters.len(),
            tier = %tier.map(|t| t.0).unwrap_or_default(),
            "Listing records"
        );
        Ok::<_, AppError>(state.store.paginate(&ctx, &filters, &page).await?)
    }
    .await;
    state.gateway.reply(result)
}

async fn get_record<S: RecordStore>(
    State(state): State<RecordsState<S>>,
    ctx: AuditContext,
    Path(id): Path<String>,
) -> Response {
    let result: AppResult<Record> = async {
        let id = parse_id(&id)?;
        Ok::<_, AppError>(state.store.get(&ctx, id).await?)
    }
    .await;
    state.gateway.reply(result)
}

async fn update_record<S: RecordStore>(
    State(state): State<RecordsState<S>>,
    ctx: AuditContext,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let result: AppResult<Record> = async {
        let id = parse_id(&id)?;
        let record = Record::from_body(&body, Some(id))?;
        state.store.update(&ctx, &record).await?;
        info!(record_id = %record.id, "Record saved");
        Ok::<_, AppError>(record)
    }
    .await;
    state.gateway.reply(result)
}

async fn delete_record<S: RecordStore>(
    State(state): State<RecordsState<S>>,
    ctx: AuditContext,
    Path(id): Path<String>,
) -> Response {
    let result: AppResult<JsonValue> = async {
        let id = parse_id(&id)?;
        state.store.delete::<Record>(&ctx, id).await?;
        info!(record_id = %id, "Record deleted");
        Ok::<_, AppError>(serde_json::json!({ "id": id, "deleted": true }))
    }
    .await;
    state.gateway.reply(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FilterOp;

    #[test]
    fn test_record_from_body_generates_id() {
        let record = Record::from_body(br#"{"name": "alice"}"#, None).unwrap();
        assert_eq!(record.fields["name"], "alice");
        assert!(!record.fields.contains_key("id"));
    }

    #[test]
    fn test_record_from_body_path_id_wins() {
        let path_id = Uuid::new_v4();
        let body = format!(r#"{{"id": "{}", "n": 1}}"#, Uuid::new_v4());
        let record = Record::from_body(body.as_bytes(), Some(path_id)).unwrap();
        assert_eq!(record.id, path_id);
    }

    #[test]
    fn test_record_from_body_rejects_non_objects() {
        assert!(matches!(
            Record::from_body(b"[1]", None),
            Err(AppError::Validation(_))
        ));
        assert!(Record::from_body(b"{", None).is_err());
        assert!(Record::from_body(br#"{"id": 5}"#, None).is_err());
    }

    #[test]
    fn test_record_serializes_flat() {
        let id = Uuid::nil();
        let record = Record::from_body(br#"{"amount": 5}"#, Some(id)).unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({"id": id, "amount": 5})
        );
    }

    #[test]
    fn test_parse_listing() {
        let (filters, page) =
            parse_listing(Some("page=2&per_page=5&filter=amount%3A%3E%3A10&filter=name:like:A%25"))
                .unwrap();
        assert_eq!(page, PageRequest::new(Some(2), Some(5)));
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].op, FilterOp::Gt);
        assert_eq!(filters[1].value, "A%");

        assert!(parse_listing(Some("page=abc")).is_err());
        assert!(parse_listing(Some("per_page=500")).is_err());
        assert!(parse_listing(Some("filter=bad")).is_err());
        assert!(parse_listing(None).is_ok());
    }
}
