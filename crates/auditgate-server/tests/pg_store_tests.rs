//! Postgres record store tests
//!
//! Need a database: `DATABASE_URL=postgres://... cargo test -- --ignored`

use serde_json::json;
use sqlx::PgPool;

use auditgate_server::{
    features::records::Record,
    store::{Filter, FilterOp, PageRequest, PgStore, ProjectionQuery, QueryRunner, RecordStore, StoreError},
};

fn record(fields: serde_json::Value) -> Record {
    Record::from_body(fields.to_string().as_bytes(), None).unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_create_get_update_delete(pool: PgPool) {
    let store = PgStore::new(pool);
    let mut saved = record(json!({"owner": "alice", "amount": 10}));

    store.create(&saved).await.unwrap();
    assert_eq!(store.get::<Record>(saved.id).await.unwrap(), saved);

    assert!(matches!(
        store.create(&saved).await,
        Err(StoreError::Conflict { .. })
    ));

    saved.fields.insert("amount".to_string(), json!(20));
    store.update(&saved).await.unwrap();
    assert_eq!(store.get::<Record>(saved.id).await.unwrap().fields["amount"], 20);

    store.delete::<Record>(saved.id).await.unwrap();
    assert!(store.get::<Record>(saved.id).await.unwrap_err().is_not_found());
    assert!(store.delete::<Record>(saved.id).await.unwrap_err().is_not_found());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_update_inserts_missing_record(pool: PgPool) {
    let store = PgStore::new(pool);
    let saved = record(json!({"status": "new"}));

    store.update(&saved).await.unwrap();
    assert_eq!(store.get::<Record>(saved.id).await.unwrap(), saved);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_paginate_with_filters(pool: PgPool) {
    let store = PgStore::new(pool);
    for (amount, kind) in [(5, "fee"), (150, "transfer"), (250, "transfer"), (900, "fee")] {
        store
            .create(&record(json!({"amount": amount, "kind": kind})))
            .await
            .unwrap();
    }

    let filters = [
        Filter::new("amount", FilterOp::Gt, "100").unwrap(),
        Filter::new("kind", FilterOp::Like, "tr%").unwrap(),
    ];
    let page = store
        .paginate::<Record>(&filters, &PageRequest::new(Some(1), Some(10)))
        .await
        .unwrap();

    let mut amounts: Vec<i64> = page
        .items
        .iter()
        .map(|r| r.fields["amount"].as_i64().unwrap())
        .collect();
    amounts.sort();
    assert_eq!(amounts, vec![150, 250]);
    assert_eq!(page.pagination.total, 2);

    let second = store
        .paginate::<Record>(&[], &PageRequest::new(Some(2), Some(3)))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.pagination.total, 4);
    assert!(!second.pagination.has_next);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_numeric_filter_skips_non_numeric_values(pool: PgPool) {
    let store = PgStore::new(pool);
    for amount in [json!(150), json!("n/a"), json!("300"), json!(null), json!(50)] {
        store.create(&record(json!({"amount": amount}))).await.unwrap();
    }
    store.create(&record(json!({"other": 1}))).await.unwrap();

    let filters = [Filter::new("amount", FilterOp::Ge, "100").unwrap()];
    let page = store
        .paginate::<Record>(&filters, &PageRequest::default())
        .await
        .unwrap();

    assert_eq!(page.pagination.total, 1);
    assert_eq!(page.items[0].fields["amount"], 150);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_projection_query(pool: PgPool) {
    let store = PgStore::new(pool);
    for amount in [1, 2, 3] {
        store.create(&record(json!({"amount": amount}))).await.unwrap();
    }

    let query = ProjectionQuery::new("records")
        .field("count(*)", "total")
        .filter("(data ->> 'amount')::int > 1");
    let rows = store.query(&query).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["total"], 2);

    let ping: Result<(), StoreError> = store.ping().await;
    assert!(ping.is_ok());
}
