//! Postgres record store
//!
//! Each model table has the shape
//! `(id UUID PRIMARY KEY, data JSONB, created_at, updated_at)`.

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::filter::push_where;
use super::query::is_identifier;
use super::{
    Filter, Model, Page, PageRequest, ProjectionQuery, QueryRunner, RecordStore, StoreError,
    StoreResult,
};

/// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn table<M: Model>() -> StoreResult<&'static str> {
    if is_identifier(M::TABLE) {
        Ok(M::TABLE)
    } else {
        Err(StoreError::InvalidQuery(format!(
            "invalid table name '{}'",
            M::TABLE
        )))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn create<M: Model>(&self, model: &M) -> StoreResult<()> {
        let table = table::<M>()?;
        let data = serde_json::to_value(model)?;
        let id = model.id();

        let sql = format!("INSERT INTO {table} (id, data) VALUES ($1, $2)");
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(Json(data))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                debug!(table = %table, id = %id, "Created record");
                Ok(())
            },
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(StoreError::Conflict { table, id })
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn update<M: Model>(&self, model: &M) -> StoreResult<()> {
        let table = table::<M>()?;
        let data = serde_json::to_value(model)?;
        let id = model.id();

        let sql = format!(
            r#"
            INSERT INTO {table} (id, data) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()
            "#
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(Json(data))
            .execute(&self.pool)
            .await?;

        debug!(table = %table, id = %id, "Saved record");
        Ok(())
    }

    async fn get<M: Model>(&self, id: Uuid) -> StoreResult<M> {
        let table = table::<M>()?;
        let sql = format!("SELECT data FROM {table} WHERE id = $1");

        let row: Option<(Json<JsonValue>,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((Json(data),)) => Ok(serde_json::from_value(data)?),
            None => Err(StoreError::NotFound { table, id }),
        }
    }

    async fn delete<M: Model>(&self, id: Uuid) -> StoreResult<()> {
        let table = table::<M>()?;
        let sql = format!("DELETE FROM {table} WHERE id = $1");

        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { table, id });
        }

        debug!(table = %table, id = %id, "Deleted record");
        Ok(())
    }

    async fn paginate<M: Model>(
        &self,
        filters: &[Filter],
        page: &PageRequest,
    ) -> StoreResult<Page<M>> {
        let table = table::<M>()?;

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {table}"));
        push_where(&mut count, filters);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT data FROM {table}"));
        push_where(&mut select, filters);
        select
            .push(" ORDER BY created_at, id LIMIT ")
            .push_bind(page.per_page())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<(Json<JsonValue>,)> =
            select.build_query_as().fetch_all(&self.pool).await?;

        let items = rows
            .into_iter()
            .map(|(Json(data),)| serde_json::from_value(data))
            .collect::<Result<Vec<M>, _>>()?;

        debug!(
            table = %table,
            filters = filters.len(),
            total = total,
            returned = items.len(),
            "Paginated records"
        );

        Ok(Page::new(items, page, total))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl QueryRunner for PgStore {
    async fn query(&self, query: &ProjectionQuery) -> StoreResult<Vec<Map<String, JsonValue>>> {
        let inner = query.to_sql()?;
        let sql = format!("SELECT row_to_json(q) FROM ({inner}) AS q");

        let rows: Vec<(Json<JsonValue>,)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(Json(row),)| match row {
                JsonValue::Object(map) => Ok(map),
                other => Err(StoreError::InvalidQuery(format!(
                    "projection returned a non-object row: {other}"
                ))),
            })
            .collect()
    }
}
