use std::sync::Arc;

use serde_json::json;

use sourcetrack_core::{CatalogRef, Predicate, SourceType, StageKind, Transition};
use sourcetrack_handlers::{CatalogStage, CatalogTableIngestor, JobStage};
use sourcetrack_tracker::{TrackerError, TrackerStore};

use crate::helpers::{
    catalog_config, job_settings, stage_config, Env, FlakyRegistrar, NoTriggers, RacingRegistrar,
};

#[tokio::test]
async fn test_one_failure_does_not_stop_the_batch() {
    let env = Env::new();
    let b1 = env.insert_bucket("b1").await;
    let b2 = env.insert_bucket("b2").await;
    let b3 = env.insert_bucket("b3").await;

    let mut registrar = FlakyRegistrar::new(env.catalog.clone());
    registrar.reject.insert("db_b2".into());
    let stage = CatalogStage::new(
        env.store.clone(),
        Arc::new(registrar),
        &catalog_config(),
        &stage_config(30),
    );

    let report = stage.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.matched, 3);
    assert_eq!(report.advanced.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, b2.id());
    assert!(!report.is_clean());

    assert!(env.record(b1.id()).await.catalog_entry_created());
    assert!(!env.record(b2.id()).await.catalog_entry_created());
    assert!(env.record(b3.id()).await.catalog_entry_created());

    // The next scheduled run picks up what was left behind.
    let retry = CatalogStage::new(
        env.store.clone(),
        env.catalog.clone(),
        &catalog_config(),
        &stage_config(30),
    );
    let report = retry.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.advanced, vec![b2.id()]);
}

#[tokio::test]
async fn test_stalled_record_times_out_alone() {
    let env = Env::new();
    let slow = env.insert_bucket("slow").await;
    let fast = env.insert_bucket("fast").await;

    let mut registrar = FlakyRegistrar::new(env.catalog.clone());
    registrar.stall.insert("db_slow".into());
    let stage = CatalogStage::new(
        env.store.clone(),
        Arc::new(registrar),
        &catalog_config(),
        &stage_config(1),
    );

    let report = stage.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.advanced, vec![fast.id()]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("timed out"));
    assert_eq!(env.record(slow.id()).await.version(), 1);
}

#[tokio::test]
async fn test_concurrent_advance_is_a_conflict() {
    let env = Env::new();
    let b1 = env.insert_bucket("b1").await;

    let registrar = RacingRegistrar {
        inner: env.catalog.clone(),
        store: env.store.clone(),
    };
    let stage = CatalogStage::new(
        env.store.clone(),
        Arc::new(registrar),
        &catalog_config(),
        &stage_config(30),
    );

    let report = stage.run(SourceType::ObjectStore).await.unwrap();
    assert!(report.advanced.is_empty());
    assert_eq!(report.conflicts, vec![b1.id()]);
    assert!(report.is_clean());

    // Only the competing writer's advance landed.
    let record = env.record(b1.id()).await;
    assert_eq!(record.version(), 2);
    assert_eq!(env.catalog.count("tables").unwrap(), 1);
}

#[tokio::test]
async fn test_record_locked_by_another_run_is_a_conflict() {
    let env = Env::new();
    let b1 = env.insert_bucket("b1").await;
    let b2 = env.insert_bucket("b2").await;

    // Another run is mid-advance on b1.
    let lock_path = env
        .store
        .base_dir()
        .join("records")
        .join(format!("{}.lock", b1.id()));
    let held = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .unwrap();
    fs2::FileExt::try_lock_exclusive(&held).unwrap();

    let stage = CatalogStage::new(
        env.store.clone(),
        env.catalog.clone(),
        &catalog_config(),
        &stage_config(30),
    );
    let report = stage.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.conflicts, vec![b1.id()]);
    assert_eq!(report.advanced, vec![b2.id()]);
    assert!(report.failed.is_empty());
    assert!(report.is_clean());

    // Once the other run lets go, the next run picks b1 up.
    drop(held);
    let retry = stage.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(retry.advanced, vec![b1.id()]);
}

#[tokio::test]
async fn test_job_stage_only_sees_catalogued_records() {
    let env = Env::new();
    env.insert_bucket("b1").await;

    let stage = JobStage::new(env.store.clone(), env.catalog.clone(), job_settings(), &stage_config(30));
    let report = stage.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.matched, 0);
    assert_eq!(env.catalog.count("jobs").unwrap(), 0);

    let pending = env
        .store
        .scan(&Predicate::awaiting_job(SourceType::ObjectStore))
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_job_stage_failure_leaves_record_catalogued() {
    let env = Env::new();
    let b1 = env.insert_bucket("b1").await;
    CatalogStage::new(env.store.clone(), env.catalog.clone(), &catalog_config(), &stage_config(30))
        .run(SourceType::ObjectStore)
        .await
        .unwrap();

    let failing = JobStage::new(
        env.store.clone(),
        Arc::new(NoTriggers(env.catalog.clone())),
        job_settings(),
        &stage_config(30),
    );
    let report = failing.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(env.record(b1.id()).await.stage().kind(), StageKind::Catalogued);

    // The retry re-creates the job and workflow with the same token and succeeds.
    let retry = JobStage::new(env.store.clone(), env.catalog.clone(), job_settings(), &stage_config(30));
    let report = retry.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.advanced, vec![b1.id()]);
    assert_eq!(env.catalog.count("jobs").unwrap(), 1);
}

#[tokio::test]
async fn test_stages_never_move_backwards() {
    let env = Env::new();
    let b1 = env.insert_bucket("b1").await;
    CatalogStage::new(env.store.clone(), env.catalog.clone(), &catalog_config(), &stage_config(30))
        .run(SourceType::ObjectStore)
        .await
        .unwrap();
    JobStage::new(env.store.clone(), env.catalog.clone(), job_settings(), &stage_config(30))
        .run(SourceType::ObjectStore)
        .await
        .unwrap();

    let record = env.record(b1.id()).await;
    assert!(record.catalog_entry_created() && record.job_created());

    // Re-running either stage finds nothing to do.
    let again = CatalogStage::new(env.store.clone(), env.catalog.clone(), &catalog_config(), &stage_config(30))
        .run(SourceType::ObjectStore)
        .await
        .unwrap();
    assert_eq!(again.matched, 0);

    // And a direct attempt to re-catalogue is refused.
    let err = env
        .store
        .advance(
            b1.id(),
            record.version(),
            Transition::Catalogue(CatalogRef::new("db", "db_b1")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Core(_)));

    let record = env.record(b1.id()).await;
    assert!(record.catalog_entry_created() && record.job_created());
}

#[tokio::test]
async fn test_relational_sources_skip_job_stage() {
    let env = Env::new();
    let ingestor = CatalogTableIngestor::new("db", env.store.clone());
    ingestor
        .handle(&json!({
            "source": "aws.glue",
            "detail": {
                "eventName": "CreateTable",
                "requestParameters": {
                    "databaseName": "db",
                    "tableInput": { "name": "crm_customers", "parameters": { "connectionName": "crm" } }
                }
            }
        }))
        .await
        .unwrap();

    // Already catalogued: the catalog stage has nothing to do for it.
    let report = CatalogStage::new(env.store.clone(), env.catalog.clone(), &catalog_config(), &stage_config(30))
        .run(SourceType::Relational)
        .await
        .unwrap();
    assert_eq!(report.matched, 0);

    let report = JobStage::new(env.store.clone(), env.catalog.clone(), job_settings(), &stage_config(30))
        .run(SourceType::Relational)
        .await
        .unwrap();
    assert_eq!(report.matched, 0);
    assert_eq!(env.catalog.count("jobs").unwrap(), 0);
}
