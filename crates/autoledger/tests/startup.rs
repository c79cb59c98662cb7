//! Integration tests for opening the database and the startup schema pass.

use autoledger::{
    Database, Error, ExecutionError, FailureKind, NewVehicle, ServicesBuilder, StoreConfig,
    TableOutcome,
};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

struct TestContext {
    _dir: TempDir,
    path: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet.db");
        Self { _dir: dir, path }
    }

    fn config(&self) -> StoreConfig {
        StoreConfig::new(&self.path)
    }

    fn connect(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }
}

#[tokio::test]
async fn test_open_in_memory_bootstraps_schema() {
    let db = Database::open(StoreConfig::in_memory()).await.unwrap();

    let report = db.startup_report();
    assert_eq!(report.tables.len(), 3);
    assert!(report.tables.iter().all(|t| t.outcome == TableOutcome::Created));

    let schema = db.schema().unwrap();
    let vehicle = schema.columns("Vehicle").unwrap();
    assert!(vehicle.contains("OriginRegionId"));
    assert!(vehicle.contains("CurrentRegionId"));
}

#[tokio::test]
async fn test_open_migrates_legacy_file() {
    let ctx = TestContext::new();
    ctx.connect()
        .execute_batch(
            "CREATE TABLE Vehicle (
                Id INTEGER PRIMARY KEY,
                Plate TEXT NOT NULL UNIQUE,
                Model TEXT NOT NULL,
                ModelYear INTEGER,
                OriginRegion TEXT,
                CurrentRegion TEXT
             );
             INSERT INTO Vehicle (Plate, Model, OriginRegion, CurrentRegion) VALUES
                ('ABC1D23', 'Hatch', 'SP', 'MG'),
                ('XYZ9K87', 'Pickup', 'ZZ', 'SP');",
        )
        .unwrap();

    let db = Database::open(ctx.config()).await.unwrap();
    assert!(matches!(
        db.startup_report().outcome("Vehicle"),
        Some(TableOutcome::Migrated { rows_copied: 2, .. })
    ));

    let services = ServicesBuilder::new(db).build();
    let hatch = services.vehicles.find_by_plate("ABC1D23").await.unwrap().unwrap();
    assert_eq!((hatch.origin_region_id, hatch.current_region_id), (26, 14));
    let pickup = services.vehicles.find_by_plate("XYZ9K87").await.unwrap().unwrap();
    assert_eq!((pickup.origin_region_id, pickup.current_region_id), (1, 26));

    // Reopening finds the canonical shape.
    drop(services);
    let db = Database::open(ctx.config()).await.unwrap();
    assert!(db.startup_report().is_unchanged());
}

#[tokio::test(start_paused = true)]
async fn test_startup_gives_up_while_locked() {
    let ctx = TestContext::new();
    let holder = ctx.connect();
    holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let err = Database::open(ctx.config().with_migrate_attempts(3))
        .await
        .unwrap_err();

    match err {
        Error::Startup(ExecutionError::Exhausted {
            attempts, source, ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(source.kind, FailureKind::Busy);
        }
        other => panic!("unexpected error: {}", other),
    }
    holder.execute_batch("ROLLBACK;").unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_startup_recovers_once_lock_released() {
    let ctx = TestContext::new();
    let holder = ctx.connect();
    holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    // Storage backoff: attempts at t=0 and t=50ms fail, the lock goes away
    // at t=60ms, the attempt at t=150ms succeeds.
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        holder.execute_batch("COMMIT;").unwrap();
    });

    let db = Database::open(ctx.config().with_migrate_attempts(3))
        .await
        .unwrap();
    release.await.unwrap();

    assert_eq!(db.startup_report().changed(), 3);
}

#[tokio::test]
async fn test_duplicate_plate_is_not_retried() {
    let db = Database::open(StoreConfig::in_memory()).await.unwrap();
    let services = ServicesBuilder::new(db).build();
    let vehicle = NewVehicle::new("ABC1D23", "Hatch");

    services.vehicles.insert(&vehicle).await.unwrap();
    let err = services.vehicles.insert(&vehicle).await.unwrap_err();

    match err {
        Error::Execution(ExecutionError::Permanent {
            attempt, source, ..
        }) => {
            assert_eq!(attempt, 1);
            assert_eq!(source.kind, FailureKind::Constraint);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(services.vehicles.count().await.unwrap(), 1);
}
