use std::collections::HashSet;
use std::sync::Arc;

use sourcetrack_core::{Predicate, SourceType};
use sourcetrack_handlers::{CatalogStage, StaticTags, TagComplianceReporter};
use sourcetrack_tracker::{FsReportStore, MemoryReportStore, ReportStore, TrackerStore};

use crate::helpers::{catalog_config, compliance_tags, stage_config, Env, PartialTags};

async fn catalogue_all(env: &Env) {
    CatalogStage::new(env.store.clone(), env.catalog.clone(), &catalog_config(), &stage_config(30))
        .run(SourceType::ObjectStore)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_untagged_and_uncatalogued_sources_are_skipped() {
    let env = Env::new();
    env.insert_bucket("tagged").await;
    env.insert_bucket("opt-in-only").await;
    catalogue_all(&env).await;
    env.insert_bucket("not-catalogued").await;

    let tags = StaticTags::new()
        .with("tagged", &compliance_tags())
        .with("opt-in-only", &[("gdpr-scan", "true")])
        .with("not-catalogued", &compliance_tags());
    let reports = Arc::new(MemoryReportStore::new());
    let reporter = TagComplianceReporter::new(env.store.clone(), Arc::new(tags), reports.clone());

    let summary = reporter.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(summary.skipped, 1);

    let rows = reports.list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].catalog_table_name, "db_tagged");
}

#[tokio::test]
async fn test_tag_lookup_failure_is_isolated() {
    let env = Env::new();
    env.insert_bucket("up").await;
    env.insert_bucket("down").await;
    catalogue_all(&env).await;

    let tags = PartialTags {
        inner: StaticTags::new()
            .with("up", &compliance_tags())
            .with("down", &compliance_tags()),
        down: HashSet::from(["down".to_string()]),
    };
    let reports = Arc::new(MemoryReportStore::new());
    let reporter = TagComplianceReporter::new(env.store.clone(), Arc::new(tags), reports.clone());

    let summary = reporter.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(reports.list().await.unwrap()[0].catalog_table_name, "db_up");
}

#[tokio::test]
async fn test_reporting_leaves_tracker_untouched() {
    let env = Env::new();
    env.insert_bucket("b1").await;
    catalogue_all(&env).await;
    let before = env.store.scan(&Predicate::all()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let reports = Arc::new(FsReportStore::new(dir.path()).unwrap());
    let tags = Arc::new(StaticTags::new().with("b1", &compliance_tags()));
    let reporter = TagComplianceReporter::new(env.store.clone(), tags, reports.clone());

    // Each run appends a fresh snapshot.
    reporter.run(SourceType::ObjectStore).await.unwrap();
    reporter.run(SourceType::ObjectStore).await.unwrap();
    let rows = reports.list().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0].id, rows[1].id);

    let after = env.store.scan(&Predicate::all()).await.unwrap();
    assert_eq!(before, after);
}
