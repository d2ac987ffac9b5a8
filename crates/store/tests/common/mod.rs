//! Shared setup for the Postgres-backed integration tests.
//!
//! Tests need `DATABASE_URL` pointing at a scratch database. When it is unset
//! each test prints a note and passes without touching a database.

#![allow(dead_code)]

use simplebank_core::{Account, CreateAccount};
use simplebank_store::{DatabaseConfig, Queries, Store};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../fixtures/schema.sql");

pub async fn test_store() -> anyhow::Result<Option<Store>> {
    store_with_max_connections(12).await
}

pub async fn store_with_max_connections(max_connections: u32) -> anyhow::Result<Option<Store>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres test");
        return Ok(None);
    };

    simplebank_observability::init();

    let config = DatabaseConfig {
        max_connections,
        min_connections: 0,
        ..DatabaseConfig::new(url)
    };
    let store = Store::connect(&config).await?;
    sqlx::raw_sql(SCHEMA).execute(store.pool()).await?;

    Ok(Some(store))
}

pub fn random_owner() -> String {
    format!("owner-{}", Uuid::now_v7())
}

pub async fn create_account(store: &Store, balance: i64) -> anyhow::Result<Account> {
    let account = store
        .queries()
        .create_account(&CreateAccount {
            owner: random_owner(),
            balance,
            currency: "USD".to_string(),
        })
        .await?;
    Ok(account)
}
