use std::sync::Arc;

use serde_json::json;

use sourcetrack_core::config::ClusterConfig;
use sourcetrack_core::{Predicate, SourceType, StageKind};
use sourcetrack_handlers::{
    BucketIngestor, CatalogStage, CatalogTableIngestor, ClusterIngestor, ClusterOnboarding,
    IngestOutcome, Intake, JobStage, StaticSchemas, StaticTags, TagComplianceReporter,
};
use sourcetrack_queue::MemoryQueue;
use sourcetrack_tracker::{MemoryReportStore, ReportStore, TrackerStore};

use crate::helpers::{bucket_event, catalog_config, compliance_tags, job_settings, stage_config, Env};

#[tokio::test]
async fn test_bucket_onboarded_end_to_end() {
    let env = Env::new();
    let tracking = Arc::new(MemoryQueue::new());
    let custom = Arc::new(MemoryQueue::new());
    let tags = Arc::new(StaticTags::new().with("b1", &compliance_tags()));

    // Discovery
    let ingestor = BucketIngestor::new(tags.clone(), tracking.clone(), custom.clone());
    let outcome = ingestor.handle(&bucket_event("b1")).await.unwrap();
    assert_eq!(outcome, IngestOutcome::Queued { custom_entity: false });

    let intake = Intake::new(env.store.clone(), tracking.clone());
    let report = intake.drain(10).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(tracking.depth() + tracking.in_flight(), 0);

    let records = env.store.scan(&Predicate::all()).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.source_type(), SourceType::ObjectStore);
    assert!(!record.catalog_entry_created());
    assert!(!record.job_created());

    // Catalog stage
    let catalog_stage = CatalogStage::new(
        env.store.clone(),
        env.catalog.clone(),
        &catalog_config(),
        &stage_config(30),
    );
    let report = catalog_stage.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.advanced, vec![record.id()]);

    let record = env.record(record.id()).await;
    assert!(record.catalog_entry_created());
    assert_eq!(record.stage().catalog().unwrap().table_name, "db_b1");
    assert!(env.catalog.table("db", "db_b1").unwrap().is_some());
    assert!(env.catalog.crawler("db_b1_crawler").unwrap().is_some());

    // Job stage
    let job_stage = JobStage::new(env.store.clone(), env.catalog.clone(), job_settings(), &stage_config(30));
    let report = job_stage.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(report.advanced, vec![record.id()]);

    let record = env.record(record.id()).await;
    assert!(record.job_created());
    assert_eq!(record.stage().kind(), StageKind::JobProvisioned);
    assert_eq!(record.stage().job_name(), Some("s3-pii-detect-us-east-1-db_b1"));
    assert!(env.catalog.job("s3-pii-detect-us-east-1-db_b1").unwrap().is_some());
    assert!(env.catalog.workflow("s3-wf-us-east-1-db_b1").unwrap().is_some());
    assert!(env.catalog.trigger("s3-glue-trigger-us-east-1-db_b1").unwrap().is_some());

    // Tag report
    let reports = Arc::new(MemoryReportStore::new());
    let reporter = TagComplianceReporter::new(env.store.clone(), tags, reports.clone());
    let summary = reporter.run(SourceType::ObjectStore).await.unwrap();
    assert_eq!(summary.written, 1);

    let rows = reports.list().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].catalog_table_name, "db_b1");
    assert_eq!(rows[0].tags["APP_ID"], "app-42");
    assert!(!rows[0].tags.contains_key("gdpr-scan"));
}

#[tokio::test]
async fn test_bucket_without_opt_in_never_tracked() {
    let env = Env::new();
    let tracking = Arc::new(MemoryQueue::new());
    let custom = Arc::new(MemoryQueue::new());
    let tags = Arc::new(StaticTags::new().with("b2", &[("APP_ID", "app-42")]));

    let ingestor = BucketIngestor::new(tags, tracking.clone(), custom.clone());
    let outcome = ingestor.handle(&bucket_event("b2")).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Dropped(_)));
    assert_eq!(tracking.depth(), 0);

    let report = Intake::new(env.store.clone(), tracking).drain(10).await.unwrap();
    assert_eq!(report.inserted, 0);
    assert!(env.store.scan(&Predicate::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cluster_onboarded_end_to_end() {
    let env = Env::new();
    let onboarding_queue = Arc::new(MemoryQueue::new());

    // Discovery
    let cluster_event = json!({
        "source": "aws.rds",
        "detail": {
            "eventName": "CreateDBCluster",
            "responseElements": {
                "dBClusterIdentifier": "crm",
                "dBClusterArn": "arn:aws:rds:eu-west-1:123456789012:cluster:crm",
                "endpoint": "crm.cluster-abc.eu-west-1.rds.amazonaws.com",
                "engine": "aurora-postgresql",
                "port": 5432,
                "dBSubnetGroup": "private",
                "databaseName": "app"
            }
        }
    });
    let outcome = ClusterIngestor::new(onboarding_queue.clone())
        .handle(&cluster_event)
        .await
        .unwrap();
    assert_eq!(outcome, IngestOutcome::Queued { custom_entity: false });

    // Connection and crawlers
    let schemas = StaticSchemas::new(vec!["public".into(), "pg_catalog".into(), "sales".into()]);
    let onboarding = ClusterOnboarding::new(
        env.catalog.clone(),
        Arc::new(schemas),
        onboarding_queue.clone(),
        &catalog_config(),
        ClusterConfig::default(),
        &stage_config(30),
    );
    let report = onboarding.drain(10).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.crawlers, vec!["glue-crawler-crm-public", "glue-crawler-crm-sales"]);
    assert!(env.catalog.connection("glue-connection-crm").unwrap().is_some());
    assert_eq!(onboarding_queue.depth() + onboarding_queue.in_flight(), 0);
    assert!(env.store.scan(&Predicate::all()).await.unwrap().is_empty());

    // A crawler registers a table; it is tracked already catalogued.
    let table_event = json!({
        "source": "aws.glue",
        "detail": {
            "eventName": "CreateTable",
            "requestParameters": {
                "databaseName": "db",
                "tableInput": {
                    "name": "app_sales_customers",
                    "parameters": { "connectionName": "glue-connection-crm" }
                }
            }
        }
    });
    let IngestOutcome::Inserted(id) = CatalogTableIngestor::new("db", env.store.clone())
        .handle(&table_event)
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };
    let record = env.record(id).await;
    assert_eq!(record.source_type(), SourceType::Relational);
    assert!(record.catalog_entry_created());

    // Tag report resolves tags through the connection name.
    let tags = Arc::new(StaticTags::new().with("glue-connection-crm", &compliance_tags()));
    let reports = Arc::new(MemoryReportStore::new());
    let summary = TagComplianceReporter::new(env.store.clone(), tags, reports.clone())
        .run(SourceType::Relational)
        .await
        .unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(reports.list().await.unwrap()[0].catalog_table_name, "app_sales_customers");
}
