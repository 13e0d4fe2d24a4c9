mod cli;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use sourcetrack_core::config::{
    load_dotenv, AwsConfig, CatalogConfig, ClusterConfig, IngestConfig, JobConfig, QueueConfig,
    ReportConfig, StageConfig, TrackerConfig,
};
use sourcetrack_core::logging::init_tracing;
use sourcetrack_core::{Predicate, SourceType};
use sourcetrack_handlers::definitions::JobSettings;
use sourcetrack_handlers::{
    BucketIngestor, CatalogStage, CatalogTableIngestor, ClusterIngestor, ClusterOnboarding,
    DynamoTagSource, Intake, JobStage, LocalCatalog, RdsTagSource, S3TagSource, StaticSchemas,
    StaticTags, TableIngestor, TagComplianceReporter, TagSource,
};
use sourcetrack_queue::{QueueConsumer, RedeliveryPolicy, SqsQueue};
use sourcetrack_tracker::{FsReportStore, FsTrackerStore, TrackerStore};

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    init_tracing();

    let args = CliArgs::parse();
    let profile = args.profile.to_uppercase();
    if !profile.is_empty() {
        info!(profile = %profile, "Using configuration profile");
    }

    match args.command {
        Command::IngestBucket { event, tags_file } => {
            let event = read_event(&event.event)?;
            let aws = AwsConfig::from_env_profiled(&profile);
            let queues = QueueConfig::from_env_profiled(&profile)?;
            let tracking = Arc::new(SqsQueue::new(&aws, &queues.tracking_queue_url).await?);
            let custom = Arc::new(SqsQueue::new(&aws, queues.require_custom_entity_queue()?).await?);
            let tags = tag_source(&aws, SourceType::ObjectStore, tags_file.as_deref()).await?;

            let outcome = BucketIngestor::new(tags, tracking, custom).handle(&event).await?;
            info!(?outcome, "Bucket notification handled");
        }

        Command::IngestTable { event } => {
            let event = read_event(&event.event)?;
            let aws = AwsConfig::from_env_profiled(&profile);
            let queues = QueueConfig::from_env_profiled(&profile)?;
            let ingest = IngestConfig::from_env_profiled(&profile);
            let tracking = Arc::new(SqsQueue::new(&aws, &queues.tracking_queue_url).await?);

            let outcome = TableIngestor::new(ingest.exception_tables, tracking)
                .handle(&event)
                .await?;
            info!(?outcome, "Table notification handled");
        }

        Command::IngestCluster { event } => {
            let event = read_event(&event.event)?;
            let aws = AwsConfig::from_env_profiled(&profile);
            let queues = QueueConfig::from_env_profiled(&profile)?;
            let onboarding = Arc::new(SqsQueue::new(&aws, queues.require_cluster_queue()?).await?);

            let outcome = ClusterIngestor::new(onboarding).handle(&event).await?;
            info!(?outcome, "Cluster notification handled");
        }

        Command::ClusterOnboarding {
            event,
            poll,
            batch_size,
            schemas,
        } => {
            let aws = AwsConfig::from_env_profiled(&profile);
            let queues = QueueConfig::from_env_profiled(&profile)?;
            let catalog = CatalogConfig::from_env_profiled(&profile)?;
            let cluster = ClusterConfig::from_env_profiled(&profile)?;
            let stage = StageConfig::from_env_profiled(&profile)?;
            let registrar = Arc::new(LocalCatalog::new(&catalog.catalog_dir)?);
            let queue = Arc::new(
                SqsQueue::new(&aws, queues.require_cluster_queue()?)
                    .await?
                    .with_visibility_timeout(queues.visibility_timeout_secs)
                    .with_wait_time(queues.wait_time_secs),
            );

            let mut onboarding = ClusterOnboarding::new(
                registrar,
                Arc::new(StaticSchemas::new(schemas)),
                queue,
                &catalog,
                cluster,
                &stage,
            )
            .with_policy(RedeliveryPolicy::new(queues.max_receive_count));
            if let Some(url) = &queues.quarantine_queue_url {
                onboarding = onboarding.with_quarantine(Arc::new(SqsQueue::new(&aws, url).await?));
            }

            let report = match (event, poll) {
                (Some(path), _) => onboarding.handle_event(&read_event(&path)?).await?,
                (None, true) => onboarding.drain(batch_size).await?,
                (None, false) => bail!("either --event or --poll is required"),
            };
            print_json(&report)?;
            if !report.is_clean() {
                bail!("{} cluster(s) failed onboarding", report.failed.len());
            }
        }

        Command::IngestCatalogTable { event } => {
            let event = read_event(&event.event)?;
            let catalog = CatalogConfig::from_env_profiled(&profile)?;
            let store = tracker_store(&profile)?;

            let outcome = CatalogTableIngestor::new(catalog.database_name, store)
                .handle(&event)
                .await?;
            info!(?outcome, "Catalog table notification handled");
        }

        Command::Intake {
            event,
            poll,
            batch_size,
        } => {
            let aws = AwsConfig::from_env_profiled(&profile);
            let queues = QueueConfig::from_env_profiled(&profile)?;
            let store = tracker_store(&profile)?;
            let queue = Arc::new(
                SqsQueue::new(&aws, &queues.tracking_queue_url)
                    .await?
                    .with_visibility_timeout(queues.visibility_timeout_secs)
                    .with_wait_time(queues.wait_time_secs),
            );

            let mut intake = Intake::new(store, queue)
                .with_policy(RedeliveryPolicy::new(queues.max_receive_count));
            if let Some(url) = &queues.quarantine_queue_url {
                intake = intake.with_quarantine(Arc::new(SqsQueue::new(&aws, url).await?));
            }

            let report = match (event, poll) {
                (Some(path), _) => intake.handle_event(&read_event(&path)?).await?,
                (None, true) => intake.drain(batch_size).await?,
                (None, false) => bail!("either --event or --poll is required"),
            };
            print_json(&report)?;
            if !report.is_clean() {
                bail!("{} message(s) failed", report.failed.len());
            }
        }

        Command::CatalogStage { source_type } => {
            let catalog = CatalogConfig::from_env_profiled(&profile)?;
            let stage = StageConfig::from_env_profiled(&profile)?;
            let store = tracker_store(&profile)?;
            let registrar = Arc::new(LocalCatalog::new(&catalog.catalog_dir)?);

            let report = CatalogStage::new(store, registrar, &catalog, &stage)
                .run(source_type)
                .await?;
            print_json(&report)?;
            if !report.is_clean() {
                bail!("{} record(s) failed the catalog stage", report.failed.len());
            }
        }

        Command::JobStage { source_type } => {
            let aws = AwsConfig::from_env_profiled(&profile);
            let catalog = CatalogConfig::from_env_profiled(&profile)?;
            let job = JobConfig::from_env_profiled(&profile)?;
            let stage = StageConfig::from_env_profiled(&profile)?;
            let store = tracker_store(&profile)?;
            let provisioner = Arc::new(LocalCatalog::new(&catalog.catalog_dir)?);
            let settings = JobSettings::new(&job, &catalog.role_arn, &aws.region);

            let report = JobStage::new(store, provisioner, settings, &stage)
                .run(source_type)
                .await?;
            print_json(&report)?;
            if !report.is_clean() {
                bail!("{} record(s) failed the job stage", report.failed.len());
            }
        }

        Command::TagReport {
            source_type,
            tags_file,
        } => {
            let aws = AwsConfig::from_env_profiled(&profile);
            let report_dir = ReportConfig::from_env_profiled(&profile)?.report_dir;
            let store = tracker_store(&profile)?;
            let reports = Arc::new(FsReportStore::new(&report_dir)?);
            let tags = tag_source(&aws, source_type, tags_file.as_deref()).await?;

            let summary = TagComplianceReporter::new(store, tags, reports)
                .run(source_type)
                .await?;
            print_json(&summary)?;
            if !summary.failed.is_empty() {
                bail!("{} record(s) could not be reported", summary.failed.len());
            }
        }

        Command::Scan { filter } => {
            let predicate: Predicate = filter.parse().context("invalid --where expression")?;
            let store = tracker_store(&profile)?;
            let rows: Vec<Value> = store
                .scan(&predicate)
                .await?
                .iter()
                .map(|r| r.to_row())
                .collect();
            info!(%predicate, matched = rows.len(), "Scan complete");
            print_json(&rows)?;
        }

        Command::Health => {
            let aws = AwsConfig::from_env_profiled(&profile);
            let queues = QueueConfig::from_env_profiled(&profile)?;
            let mut queue = SqsQueue::new(&aws, &queues.tracking_queue_url).await?;
            if let Some(url) = &queues.quarantine_queue_url {
                queue = queue.with_quarantine(url);
            }
            let health = queue.health_check().await?;
            let quarantined = queue.quarantine_depth().await?;

            let store = tracker_store(&profile)?;
            let mut stages: BTreeMap<String, usize> = BTreeMap::new();
            for source_type in SourceType::ALL {
                let records = store.scan(&Predicate::all().eq("source_type", source_type.as_str())).await?;
                for record in records {
                    *stages
                        .entry(format!("{}/{}", source_type, record.stage().kind()))
                        .or_default() += 1;
                }
            }

            info!(%health, "Queue health");
            print_json(&serde_json::json!({
                "queue": health,
                "quarantine_depth": quarantined,
                "records": stages,
            }))?;
        }
    }

    Ok(())
}

fn tracker_store(profile: &str) -> Result<Arc<FsTrackerStore>> {
    let config = TrackerConfig::from_env_profiled(profile)?;
    let store = FsTrackerStore::new(&config.tracker_dir)
        .with_context(|| format!("failed to open tracker store at {}", config.tracker_dir.display()))?;
    Ok(Arc::new(store))
}

async fn tag_source(
    aws: &AwsConfig,
    source_type: SourceType,
    tags_file: Option<&Path>,
) -> Result<Arc<dyn TagSource>> {
    let source: Arc<dyn TagSource> = match (tags_file, source_type) {
        (Some(path), _) => Arc::new(StaticTags::from_file(path)?),
        (None, SourceType::ObjectStore) => Arc::new(S3TagSource::new(aws).await),
        (None, SourceType::KeyValueTable) => Arc::new(DynamoTagSource::new(aws).await),
        (None, SourceType::Relational) => Arc::new(RdsTagSource::new(aws).await),
        (None, other) => bail!("no live tag source for {other}, pass --tags-file"),
    };
    Ok(source)
}

fn read_event(path: &Path) -> Result<Value> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read event file {}", path.display()))?
    };
    serde_json::from_str(&raw).context("event is not valid JSON")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
