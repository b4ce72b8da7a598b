//! MySQL integration tests for partition archival.
//!
//! Each test gets its own `messages_<suffix>` table partitioned by quarter
//! (p2023_q4, p2024_q1, p2024_q2, pmax) from [`TestDatabase`].

use hotarchive_db::test_fixtures::{at, TestDatabase};
use hotarchive_db::{ArchiveStep, Error, PartitionCatalog};

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_catalog_lists_partitions_without_catch_all() {
    let test_db = setup().await;

    let partitions = test_db
        .db
        .catalog
        .list_partitions(&test_db.source_table)
        .await
        .expect("Failed to list partitions");

    let names: Vec<&str> = partitions.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["p2023_q4", "p2024_q1", "p2024_q2"]);
    assert!(partitions
        .iter()
        .all(|p| p.partition_expression.contains("created_at")));

    assert!(test_db
        .db
        .catalog
        .partition_exists(&test_db.source_table, "p2024_q1")
        .await
        .unwrap());
    assert!(!test_db
        .db
        .catalog
        .partition_exists(&test_db.source_table, "pmax")
        .await
        .unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_catalog_unknown_table_is_empty() {
    let test_db = setup().await;

    let partitions = test_db
        .db
        .catalog
        .list_partitions("no_such_table_hotarchive")
        .await
        .expect("Listing an unknown table should not fail");
    assert!(partitions.is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_archive_q1_partition() {
    let test_db = setup().await;
    test_db.seed_q1_2024().await;
    let archive_table = test_db.archive_table("p2024_q1");

    let metadata = test_db
        .db
        .archiver(test_db.config())
        .archive("p2024_q1")
        .await
        .expect("Archival should succeed");

    assert_eq!(metadata.archive_table_name, archive_table);
    assert_eq!(metadata.min_record_id, 1000);
    assert_eq!(metadata.max_record_id, 5000);
    assert_eq!(metadata.start_timestamp, at(2024, 1, 1));
    assert_eq!(metadata.end_timestamp, at(2024, 3, 31));

    assert_eq!(test_db.count_rows(&archive_table).await, 4001);
    assert_eq!(test_db.count_rows(&test_db.source_table).await, 0);

    let names: Vec<String> = test_db
        .db
        .catalog
        .list_partitions(&test_db.source_table)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["p2023_q4".to_string(), "p2024_q2".to_string()]);

    let history = test_db
        .db
        .metadata
        .list_archived(&test_db.metadata_table)
        .await
        .unwrap();
    assert_eq!(history, vec![metadata]);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_archive_with_explicit_schema() {
    let test_db = setup().await;
    test_db.seed_q1_2024().await;
    let schema: String = sqlx::query_scalar("SELECT CAST(DATABASE() AS CHAR)")
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
    let db = test_db.db.clone().with_schema(&schema);
    let archive_table = test_db.archive_table("p2024_q1");

    let plan = db.archiver(test_db.config()).plan("p2024_q1").await.unwrap();
    assert!(!plan.reuse_archive_table);

    db.archiver(test_db.config())
        .archive("p2024_q1")
        .await
        .expect("Archival into an explicit schema should succeed");

    assert_eq!(test_db.count_rows(&archive_table).await, 4001);
    assert!(!db
        .catalog
        .partition_exists(&test_db.source_table, "p2024_q1")
        .await
        .unwrap());
    assert_eq!(
        db.metadata
            .list_archived(&test_db.metadata_table)
            .await
            .unwrap()
            .len(),
        1
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_archive_table_is_unpartitioned() {
    let test_db = setup().await;
    test_db.seed_q1_2024().await;
    let archive_table = test_db.archive_table("p2024_q1");

    test_db
        .db
        .archiver(test_db.config())
        .archive("p2024_q1")
        .await
        .unwrap();

    assert!(test_db
        .db
        .catalog
        .list_partitions(&archive_table)
        .await
        .unwrap()
        .is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_nonexistent_partition_creates_nothing() {
    let test_db = setup().await;

    let failure = test_db
        .db
        .archiver(test_db.config())
        .archive("p2030_q1")
        .await
        .unwrap_err();

    assert_eq!(failure.step, ArchiveStep::ValidateExistence);
    assert!(matches!(failure.error, Error::PartitionNotFound { .. }));
    assert!(!test_db
        .db
        .catalog
        .table_exists(&test_db.archive_table("p2030_q1"))
        .await
        .unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_empty_partition_rolls_back() {
    let test_db = setup().await;
    test_db.seed_q1_2024().await;

    let failure = test_db
        .db
        .archiver(test_db.config())
        .archive("p2024_q2")
        .await
        .unwrap_err();

    assert_eq!(failure.step, ArchiveStep::DeriveMetadata);
    assert!(matches!(failure.error, Error::EmptyArchiveMetadata(_)));
    assert!(failure.rolled_back);
    assert!(test_db
        .db
        .metadata
        .list_archived(&test_db.metadata_table)
        .await
        .unwrap()
        .is_empty());
    assert!(test_db
        .db
        .catalog
        .partition_exists(&test_db.source_table, "p2024_q2")
        .await
        .unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_existing_archive_table_is_reused() {
    let test_db = setup().await;
    test_db.seed_q1_2024().await;
    let archive_table = test_db.archive_table("p2024_q1");

    // Leftover of an earlier run that failed after creating the table.
    for statement in [
        format!("CREATE TABLE `{}` LIKE `{}`", archive_table, test_db.source_table),
        format!("ALTER TABLE `{}` REMOVE PARTITIONING", archive_table),
    ] {
        sqlx::query(&statement).execute(&test_db.pool).await.unwrap();
    }

    let archiver = test_db.db.archiver(test_db.config());
    let plan = archiver.plan("p2024_q1").await.unwrap();
    assert!(plan.reuse_archive_table);

    let metadata = archiver.archive("p2024_q1").await.unwrap();
    assert_eq!(metadata.archive_table_name, archive_table);
    assert_eq!(test_db.count_rows(&archive_table).await, 4001);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_incompatible_archive_table_is_rejected() {
    let test_db = setup().await;
    test_db.seed_q1_2024().await;
    let archive_table = test_db.archive_table("p2024_q1");

    sqlx::query(&format!(
        "CREATE TABLE `{}` (id BIGINT NOT NULL PRIMARY KEY)",
        archive_table
    ))
    .execute(&test_db.pool)
    .await
    .unwrap();

    let failure = test_db
        .db
        .archiver(test_db.config())
        .archive("p2024_q1")
        .await
        .unwrap_err();

    assert_eq!(failure.step, ArchiveStep::EnsureArchiveTable);
    assert!(matches!(
        failure.error,
        Error::IncompatibleArchiveTable { .. }
    ));
    assert_eq!(test_db.count_rows(&test_db.source_table).await, 4001);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL pointing at a MySQL 8 server
async fn test_history_is_newest_first() {
    let test_db = setup().await;
    test_db
        .seed_rows(1, 500, at(2023, 10, 1), at(2023, 12, 31))
        .await;
    test_db.seed_q1_2024().await;

    let archiver = test_db.db.archiver(test_db.config());
    archiver.archive("p2023_q4").await.unwrap();
    // archived_at has second resolution.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    archiver.archive("p2024_q1").await.unwrap();

    let history = test_db
        .db
        .metadata
        .list_archived(&test_db.metadata_table)
        .await
        .unwrap();
    let tables: Vec<&str> = history
        .iter()
        .map(|m| m.archive_table_name.as_str())
        .collect();
    assert_eq!(
        tables,
        vec![
            test_db.archive_table("p2024_q1").as_str(),
            test_db.archive_table("p2023_q4").as_str()
        ]
    );
    assert!(test_db
        .db
        .metadata
        .is_recorded(&test_db.metadata_table, &test_db.archive_table("p2023_q4"))
        .await
        .unwrap());

    test_db.cleanup().await;
}
