// ABOUTME: Integration tests for single- and multi-table sync against a live PostgreSQL
// ABOUTME: Covers differential and overwrite modes, dry-run, atomicity and column policies

use std::env;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

use table_syncer::config::{RootConfig, SyncConfig, DEFAULT_PK_MAX_LENGTH};
use table_syncer::db;
use table_syncer::orchestrator;
use table_syncer::sync::engine::SyncContext;

/// Helper to get the test database URL from the environment
fn test_database_url() -> String {
    env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set")
}

/// Create a unique test table name to avoid conflicts
fn test_table_name(suffix: &str) -> String {
    format!("syncer_test_{}", suffix)
}

fn csv_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("Failed to create temp csv");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp csv");
    file
}

fn table_config(file: PathBuf, table: &str) -> SyncConfig {
    SyncConfig {
        file,
        table: table.to_string(),
        columns: Vec::new(),
        primary_key: "id".to_string(),
        mode: "differential".to_string(),
        delete_not_in_file: false,
        timestamp_columns: Vec::new(),
        immutable_columns: Vec::new(),
        depends_on: Vec::new(),
        pk_max_length: DEFAULT_PK_MAX_LENGTH,
    }
}

fn root_config(url: &str, tables: Vec<SyncConfig>) -> RootConfig {
    RootConfig {
        db: url.to_string(),
        dry_run: false,
        timeout_secs: 300,
        sync: None,
        tables,
    }
}

async fn cleanup_table(client: &tokio_postgres::Client, table: &str) {
    let _ = client
        .batch_execute(&format!("DROP TABLE IF EXISTS \"{}\" CASCADE", table))
        .await;
}

async fn fetch_rows(
    client: &tokio_postgres::Client,
    table: &str,
) -> Vec<(i32, String, String)> {
    let rows = client
        .query(
            &format!("SELECT id, name, value FROM \"{}\" ORDER BY id", table),
            &[],
        )
        .await
        .expect("Failed to query table state");
    rows.iter()
        .map(|row| (row.get(0), row.get(1), row.get(2)))
        .collect()
}

/// Test: differential sync inserts, updates and deletes to converge on the file
#[tokio::test]
#[ignore]
async fn test_differential_sync_converges_on_file() {
    let url = test_database_url();
    let client = db::connect(&url).await.expect("Failed to connect");
    let table = test_table_name("diff");

    client
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS "{table}";
            CREATE TABLE "{table}" (id INTEGER PRIMARY KEY, name TEXT, value TEXT);
            INSERT INTO "{table}" (id, name, value)
            VALUES (1, 'old1', 'v1'), (2, 'test2', 'v2'), (3, 'test3', 'v3');
            "#,
        ))
        .await
        .expect("Failed to set up test table");

    let file = csv_file("id,name,value\n1,new1,nv1\n2,test2,v2\n4,test4,v4\n");
    let mut cfg = table_config(file.path().to_path_buf(), &table);
    cfg.delete_not_in_file = true;
    let config = root_config(&url, vec![cfg]);

    let plans = orchestrator::run(&config, &SyncContext::new(false))
        .await
        .expect("Sync failed");

    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].insert_count(), 1);
    assert_eq!(plans[0].update_count(), 1);
    assert_eq!(plans[0].delete_count(), 1);

    let rows = fetch_rows(&client, &table).await;
    assert_eq!(
        rows,
        vec![
            (1, "new1".to_string(), "nv1".to_string()),
            (2, "test2".to_string(), "v2".to_string()),
            (4, "test4".to_string(), "v4".to_string()),
        ]
    );
    println!("✓ Differential sync converged on the file contents");

    cleanup_table(&client, &table).await;
}

/// Test: overwrite sync clears pre-existing rows and inserts the file exactly
#[tokio::test]
#[ignore]
async fn test_overwrite_sync_replaces_table() {
    let url = test_database_url();
    let client = db::connect(&url).await.expect("Failed to connect");
    let table = test_table_name("overwrite");

    client
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS "{table}";
            CREATE TABLE "{table}" (id INTEGER PRIMARY KEY, name TEXT, value TEXT);
            INSERT INTO "{table}" (id, name, value) VALUES (99, 'Old', 'old@x');
            "#,
        ))
        .await
        .expect("Failed to set up test table");

    let file = csv_file("id,name,value\n101,A,a@x\n102,B,b@x\n");
    let mut cfg = table_config(file.path().to_path_buf(), &table);
    cfg.mode = "overwrite".to_string();
    cfg.primary_key = String::new();
    let config = root_config(&url, vec![cfg]);

    orchestrator::run(&config, &SyncContext::new(false))
        .await
        .expect("Sync failed");

    let rows = fetch_rows(&client, &table).await;
    assert_eq!(
        rows,
        vec![
            (101, "A".to_string(), "a@x".to_string()),
            (102, "B".to_string(), "b@x".to_string()),
        ]
    );

    cleanup_table(&client, &table).await;
}

/// Test: a dry run leaves the table bitwise identical
#[tokio::test]
#[ignore]
async fn test_dry_run_has_no_effect() {
    let url = test_database_url();
    let client = db::connect(&url).await.expect("Failed to connect");
    let table = test_table_name("dryrun");

    client
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS "{table}";
            CREATE TABLE "{table}" (id INTEGER PRIMARY KEY, name TEXT, value TEXT);
            INSERT INTO "{table}" (id, name, value)
            VALUES (1, 'old1', 'v1'), (2, 'test2', 'v2'), (3, 'test3', 'v3');
            "#,
        ))
        .await
        .expect("Failed to set up test table");

    let before = fetch_rows(&client, &table).await;

    let file = csv_file("id,name,value\n1,new1,nv1\n4,test4,v4\n");
    let mut cfg = table_config(file.path().to_path_buf(), &table);
    cfg.delete_not_in_file = true;
    let config = root_config(&url, vec![cfg]);

    let plans = orchestrator::run(&config, &SyncContext::new(true))
        .await
        .expect("Dry run failed");

    // The plan reports the pending work, the table stays untouched
    assert_eq!(plans[0].insert_count(), 1);
    assert_eq!(plans[0].update_count(), 1);
    assert_eq!(plans[0].delete_count(), 2);

    let after = fetch_rows(&client, &table).await;
    assert_eq!(before, after);
    println!("✓ Dry run left the table untouched");

    cleanup_table(&client, &table).await;
}

/// Test: a failing child insert rolls back every table in the run
#[tokio::test]
#[ignore]
async fn test_multi_table_failure_rolls_back_everything() {
    let url = test_database_url();
    let client = db::connect(&url).await.expect("Failed to connect");
    let categories = test_table_name("atomic_categories");
    let products = test_table_name("atomic_products");

    cleanup_table(&client, &products).await;
    cleanup_table(&client, &categories).await;
    client
        .batch_execute(&format!(
            r#"
            CREATE TABLE "{categories}" (id INTEGER PRIMARY KEY, name TEXT);
            CREATE TABLE "{products}" (
                id INTEGER PRIMARY KEY,
                category_id INTEGER REFERENCES "{categories}"(id),
                name TEXT
            );
            INSERT INTO "{categories}" (id, name) VALUES (1, 'Books');
            INSERT INTO "{products}" (id, category_id, name) VALUES (10, 1, 'Old Book');
            "#,
        ))
        .await
        .expect("Failed to set up test tables");

    let categories_file = csv_file("id,name\n1,Renamed\n2,Games\n");
    let products_file = csv_file("id,category_id,name\n10,1,Book\n11,999,Ghost\n");

    let categories_cfg = {
        let mut cfg = table_config(categories_file.path().to_path_buf(), &categories);
        cfg.columns = vec!["id".to_string(), "name".to_string()];
        cfg
    };
    let products_cfg = {
        let mut cfg = table_config(products_file.path().to_path_buf(), &products);
        cfg.depends_on = vec![categories.clone()];
        cfg
    };
    let config = root_config(&url, vec![categories_cfg, products_cfg]);

    let result = orchestrator::run(&config, &SyncContext::new(false)).await;
    assert!(result.is_err(), "insert of a ghost category must fail");

    // Both tables keep their pre-sync state
    let category_rows = client
        .query(
            &format!("SELECT id, name FROM \"{categories}\" ORDER BY id"),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(category_rows.len(), 1);
    assert_eq!(category_rows[0].get::<_, String>(1), "Books");

    let product_rows = client
        .query(
            &format!("SELECT id, name FROM \"{products}\" ORDER BY id"),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(product_rows.len(), 1);
    assert_eq!(product_rows[0].get::<_, String>(1), "Old Book");
    println!("✓ Failed multi-table run restored every table");

    cleanup_table(&client, &products).await;
    cleanup_table(&client, &categories).await;
}

/// Test: child-table deletes run before parent-table deletes
#[tokio::test]
#[ignore]
async fn test_multi_table_delete_ordering_respects_foreign_keys() {
    let url = test_database_url();
    let client = db::connect(&url).await.expect("Failed to connect");
    let categories = test_table_name("order_categories");
    let products = test_table_name("order_products");

    cleanup_table(&client, &products).await;
    cleanup_table(&client, &categories).await;
    client
        .batch_execute(&format!(
            r#"
            CREATE TABLE "{categories}" (id INTEGER PRIMARY KEY, name TEXT);
            CREATE TABLE "{products}" (
                id INTEGER PRIMARY KEY,
                category_id INTEGER REFERENCES "{categories}"(id),
                name TEXT
            );
            INSERT INTO "{categories}" (id, name) VALUES (1, 'Books'), (2, 'Games');
            INSERT INTO "{products}" (id, category_id, name)
            VALUES (10, 1, 'Book'), (20, 2, 'Game');
            "#,
        ))
        .await
        .expect("Failed to set up test tables");

    // The file drops category 2 and its product; deletes must run child-first
    let categories_file = csv_file("id,name\n1,Books\n");
    let products_file = csv_file("id,category_id,name\n10,1,Book\n");

    let categories_cfg = {
        let mut cfg = table_config(categories_file.path().to_path_buf(), &categories);
        cfg.delete_not_in_file = true;
        cfg
    };
    let products_cfg = {
        let mut cfg = table_config(products_file.path().to_path_buf(), &products);
        cfg.delete_not_in_file = true;
        cfg.depends_on = vec![categories.clone()];
        cfg
    };
    let config = root_config(&url, vec![categories_cfg, products_cfg]);

    orchestrator::run(&config, &SyncContext::new(false))
        .await
        .expect("Sync failed");

    let category_count: i64 = client
        .query_one(&format!("SELECT COUNT(*) FROM \"{categories}\""), &[])
        .await
        .unwrap()
        .get(0);
    let product_count: i64 = client
        .query_one(&format!("SELECT COUNT(*) FROM \"{products}\""), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(category_count, 1);
    assert_eq!(product_count, 1);

    cleanup_table(&client, &products).await;
    cleanup_table(&client, &categories).await;
}

/// Test: all rows written in one run carry the same timestamp value
#[tokio::test]
#[ignore]
async fn test_timestamp_columns_stamp_uniformly() {
    let url = test_database_url();
    let client = db::connect(&url).await.expect("Failed to connect");
    let table = test_table_name("timestamps");

    client
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS "{table}";
            CREATE TABLE "{table}" (
                id INTEGER PRIMARY KEY,
                name TEXT,
                updated_at TIMESTAMPTZ
            );
            INSERT INTO "{table}" (id, name) VALUES (1, 'stale');
            "#,
        ))
        .await
        .expect("Failed to set up test table");

    let file = csv_file("id,name\n1,fresh\n2,alpha\n3,beta\n");
    let mut cfg = table_config(file.path().to_path_buf(), &table);
    cfg.timestamp_columns = vec!["updated_at".to_string()];
    let config = root_config(&url, vec![cfg]);

    orchestrator::run(&config, &SyncContext::new(false))
        .await
        .expect("Sync failed");

    let distinct: i64 = client
        .query_one(
            &format!("SELECT COUNT(DISTINCT updated_at) FROM \"{table}\""),
            &[],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(distinct, 1, "one run must stamp every row identically");

    cleanup_table(&client, &table).await;
}

/// Test: immutable columns keep their pre-sync value through an update
#[tokio::test]
#[ignore]
async fn test_immutable_columns_survive_updates() {
    let url = test_database_url();
    let client = db::connect(&url).await.expect("Failed to connect");
    let table = test_table_name("immutable");

    client
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS "{table}";
            CREATE TABLE "{table}" (id INTEGER PRIMARY KEY, name TEXT, origin TEXT);
            INSERT INTO "{table}" (id, name, origin) VALUES (1, 'old', 'seed');
            "#,
        ))
        .await
        .expect("Failed to set up test table");

    let file = csv_file("id,name,origin\n1,new,import\n");
    let mut cfg = table_config(file.path().to_path_buf(), &table);
    cfg.immutable_columns = vec!["origin".to_string()];
    let config = root_config(&url, vec![cfg]);

    orchestrator::run(&config, &SyncContext::new(false))
        .await
        .expect("Sync failed");

    let row = client
        .query_one(
            &format!("SELECT name, origin FROM \"{table}\" WHERE id = 1"),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(row.get::<_, String>(0), "new");
    assert_eq!(row.get::<_, String>(1), "seed");

    cleanup_table(&client, &table).await;
}

/// Test: invalid primary keys in the file abort a differential sync
#[tokio::test]
#[ignore]
async fn test_invalid_primary_keys_abort_the_run() {
    let url = test_database_url();
    let client = db::connect(&url).await.expect("Failed to connect");
    let table = test_table_name("validation");

    client
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS "{table}";
            CREATE TABLE "{table}" (id TEXT PRIMARY KEY, name TEXT, value TEXT);
            "#,
        ))
        .await
        .expect("Failed to set up test table");

    let file = csv_file("id,name,value\n1,a,x\n1,b,y\nnull,c,z\n");
    let config = root_config(
        &url,
        vec![table_config(file.path().to_path_buf(), &table)],
    );

    let result = orchestrator::run(&config, &SyncContext::new(false)).await;
    match result {
        Err(table_syncer::error::SyncError::PrimaryKeyValidationFailed { report, .. }) => {
            assert_eq!(report.invalid_records.len(), 2);
            assert_eq!(report.duplicate_map.get("1"), Some(&vec![0, 1]));
        }
        other => panic!("expected validation failure, got {:?}", other.map(|p| p.len())),
    }

    let count: i64 = client
        .query_one(&format!("SELECT COUNT(*) FROM \"{table}\""), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(count, 0);

    cleanup_table(&client, &table).await;
}
