//! End-to-end tests against a real server. Skipped unless `DATABASE_URL` is set.

use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};
use tgsql::{
    DataSource, DbError, DbResult, DeleteOptions, FromRow, InsertOptions, Record, Registry,
    UpdateOptions,
};

#[derive(Debug, FromRow)]
struct Account {
    id: i64,
    name: String,
    balance: i64,
    create_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
    delete_time: Option<DateTime<Utc>>,
}

#[derive(Record)]
struct NewAccount {
    name: String,
    balance: i64,
}

fn database_url(test: &str) -> Option<String> {
    let _ = dotenvy::dotenv();
    match std::env::var("DATABASE_URL") {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            None
        }
    }
}

fn unique_table(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    format!("tgsql_test_{prefix}_{}_{nanos}", std::process::id())
}

async fn create_table(registry: &Registry, table: &str) -> DbResult<()> {
    let handle = registry.default_handle().await?;
    let client = handle.client().await?;
    client
        .batch_execute(&format!(
            "CREATE TABLE {table} (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                balance BIGINT NOT NULL DEFAULT 0,
                create_time TIMESTAMPTZ,
                update_time TIMESTAMPTZ,
                delete_time TIMESTAMPTZ
            )"
        ))
        .await
        .map_err(DbError::from_db_error)
}

async fn drop_table(registry: &Registry, table: &str) -> DbResult<()> {
    let handle = registry.default_handle().await?;
    let client = handle.client().await?;
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {table}"))
        .await
        .map_err(DbError::from_db_error)
}

#[tokio::test]
async fn same_source_shares_one_handle() -> DbResult<()> {
    let Some(url) = database_url("same_source_shares_one_handle") else {
        return Ok(());
    };
    let registry = Registry::new(DataSource::new(url.clone()));

    let a = registry.resolve(&DataSource::new(url.clone())).await?;
    let b = registry.resolve(&DataSource::new(url.clone()).max_open(2)).await?;
    assert!(a.ptr_eq(&b));
    assert_eq!(b.source().max_open, 16, "first writer wins");

    let other_url = if url.contains('?') {
        format!("{url}&application_name=tgsql_other")
    } else {
        format!("{url}?application_name=tgsql_other")
    };
    let c = registry.resolve(&DataSource::new(other_url)).await?;
    assert!(!a.ptr_eq(&c));
    assert_eq!(registry.len().await, 2);
    Ok(())
}

#[tokio::test]
async fn insert_then_find_one_with_auto_time() -> DbResult<()> {
    let Some(url) = database_url("insert_then_find_one_with_auto_time") else {
        return Ok(());
    };
    let registry = Registry::new(DataSource::new(url));
    let table = unique_table("insert");
    create_table(&registry, &table).await?;

    let before = Utc::now() - chrono::Duration::seconds(5);
    let id = registry
        .table(&table)
        .await?
        .insert_with(
            NewAccount {
                name: "alice".to_string(),
                balance: 100,
            },
            InsertOptions::new().auto_time(true),
        )
        .await?;

    let account: Account = registry
        .table(&table)
        .await?
        .where_("id", "=", id)
        .find_one()
        .await?;
    assert_eq!(account.id, id);
    assert_eq!(account.name, "alice");
    assert_eq!(account.balance, 100);
    assert!(account.create_time.is_some_and(|t| t >= before));
    assert!(account.update_time.is_some_and(|t| t >= before));
    assert!(account.delete_time.is_none());

    let missing = registry
        .table(&table)
        .await?
        .where_("id", "=", id + 1000)
        .find_one::<Account>()
        .await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    drop_table(&registry, &table).await
}

#[tokio::test]
async fn rollback_leaves_row_unchanged() -> DbResult<()> {
    let Some(url) = database_url("rollback_leaves_row_unchanged") else {
        return Ok(());
    };
    let registry = Registry::new(DataSource::new(url));
    let table = unique_table("rollback");
    create_table(&registry, &table).await?;

    let id = registry
        .table(&table)
        .await?
        .insert(tgsql::values! { "name" => "bob", "balance" => 50i64 })
        .await?;

    let tx = registry.begin_transaction().await?;
    let updated = tx
        .table(&table)
        .where_("id", "=", id)
        .update(tgsql::values! { "balance" => 0i64 })
        .await?;
    assert_eq!(updated, 1);
    let inside: Account = tx.table(&table).where_("id", "=", id).lock().find_one().await?;
    assert_eq!(inside.balance, 0);
    tx.rollback().await?;

    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, DbError::Transaction(_)));

    let outside: Account = registry
        .table(&table)
        .await?
        .where_("id", "=", id)
        .find_one()
        .await?;
    assert_eq!(outside.balance, 50);

    drop_table(&registry, &table).await
}

#[tokio::test]
async fn guards_soft_delete_and_counters() -> DbResult<()> {
    let Some(url) = database_url("guards_soft_delete_and_counters") else {
        return Ok(());
    };
    let registry = Registry::new(DataSource::new(url));
    let table = unique_table("guards");
    create_table(&registry, &table).await?;

    let rows = vec![
        NewAccount {
            name: "a".to_string(),
            balance: 10,
        },
        NewAccount {
            name: "b".to_string(),
            balance: 20,
        },
        NewAccount {
            name: "c".to_string(),
            balance: 30,
        },
    ];
    let inserted = registry.table(&table).await?.insert_many(rows).await?;
    assert_eq!(inserted, 3);

    // No WHERE: refused, nothing touched.
    let err = registry
        .table(&table)
        .await?
        .update(tgsql::values! { "balance" => 0i64 })
        .await
        .unwrap_err();
    assert!(err.is_guard());
    let err = registry.table(&table).await?.delete().await.unwrap_err();
    assert!(err.is_guard());
    assert_eq!(registry.table(&table).await?.count().await?, 3);

    let n = registry
        .table(&table)
        .await?
        .where_("name", "=", "a")
        .increment_with("balance", 5i64, UpdateOptions::new().auto_time(true))
        .await?;
    assert_eq!(n, 1);
    registry
        .table(&table)
        .await?
        .where_("name", "=", "b")
        .decrement("balance", 5i64)
        .await?;

    let soft = registry
        .table(&table)
        .await?
        .where_("name", "=", "c")
        .delete()
        .await?;
    assert_eq!(soft, 1);

    let live: Vec<Account> = registry
        .table(&table)
        .await?
        .order_by("name", tgsql::Direction::Asc)
        .select()
        .await?;
    let balances: Vec<(String, i64)> = live.into_iter().map(|a| (a.name, a.balance)).collect();
    assert_eq!(balances, vec![("a".to_string(), 15), ("b".to_string(), 15)]);

    assert_eq!(
        registry
            .table(&table)
            .await?
            .all_including_deleted()
            .count()
            .await?,
        3
    );

    let hard = registry
        .table(&table)
        .await?
        .where_is_not_null("delete_time")
        .delete_with(DeleteOptions::new().hard())
        .await?;
    assert_eq!(hard, 1);
    assert_eq!(
        registry
            .table(&table)
            .await?
            .all_including_deleted()
            .count()
            .await?,
        2
    );

    drop_table(&registry, &table).await
}

#[tokio::test]
async fn transaction_macro_commits() -> DbResult<()> {
    let Some(url) = database_url("transaction_macro_commits") else {
        return Ok(());
    };
    let registry = Registry::new(DataSource::new(url));
    let table = unique_table("macro");
    create_table(&registry, &table).await?;
    let handle = registry.default_handle().await?;

    let id = tgsql::transaction!(handle, tx, {
        let id = tx
            .table(&table)
            .insert(tgsql::values! { "name" => "carol", "balance" => 7i64 })
            .await?;
        tx.table(&table)
            .where_("id", "=", id)
            .increment("balance", 3i64)
            .await?;
        Ok::<_, DbError>(id)
    })?;

    let account: Account = registry
        .table(&table)
        .await?
        .where_("id", "=", id)
        .find_one()
        .await?;
    assert_eq!(account.balance, 10);

    drop_table(&registry, &table).await
}
