use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use sourcetrack_core::SourceType;

/// Onboarding tracker for discovered data sources.
///
/// Each subcommand is one stateless handler invocation, meant to be run by
/// an event trigger or a scheduler.
#[derive(Parser, Debug)]
#[command(name = "sourcetrack", version, about)]
pub struct CliArgs {
    /// Configuration profile: `{PROFILE}_{KEY}` is read before `{KEY}`.
    #[arg(long, env = "SOURCETRACK_PROFILE", default_value = "", global = true)]
    pub profile: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Route a bucket-created notification to the tracking queue.
    IngestBucket {
        #[command(flatten)]
        event: EventArg,

        /// Read bucket tags from a JSON file instead of S3.
        #[arg(long)]
        tags_file: Option<PathBuf>,
    },

    /// Route a key-value-table-created notification to the tracking queue.
    IngestTable {
        #[command(flatten)]
        event: EventArg,
    },

    /// Route a database-cluster-created notification to the cluster queue.
    IngestCluster {
        #[command(flatten)]
        event: EventArg,
    },

    /// Create catalog connections and per-schema crawlers for new clusters.
    ClusterOnboarding {
        /// Queue-triggered invocation payload (`-` for stdin).
        #[arg(long, conflicts_with = "poll", required_unless_present = "poll")]
        event: Option<PathBuf>,

        /// Poll the cluster queue until it is empty instead.
        #[arg(long)]
        poll: bool,

        #[arg(long, default_value_t = 10)]
        batch_size: u32,

        /// Schemas to crawl on every cluster (before exclusions).
        #[arg(long, value_delimiter = ',', default_value = "public")]
        schemas: Vec<String>,
    },

    /// Track a table registered in the catalog database.
    IngestCatalogTable {
        #[command(flatten)]
        event: EventArg,
    },

    /// Insert tracker records from the tracking queue.
    Intake {
        /// Queue-triggered invocation payload (`-` for stdin).
        #[arg(long, conflicts_with = "poll", required_unless_present = "poll")]
        event: Option<PathBuf>,

        /// Poll the queue until it is empty instead.
        #[arg(long)]
        poll: bool,

        #[arg(long, default_value_t = 10)]
        batch_size: u32,
    },

    /// Register catalog tables and crawlers for discovered sources.
    CatalogStage {
        #[arg(long, default_value = "s3")]
        source_type: SourceType,
    },

    /// Provision scan jobs for catalogued sources.
    JobStage {
        #[arg(long, default_value = "s3")]
        source_type: SourceType,
    },

    /// Append tag-compliance rows for catalogued sources.
    TagReport {
        #[arg(long, default_value = "s3")]
        source_type: SourceType,

        /// Read resource tags from a JSON file instead of the provider.
        #[arg(long)]
        tags_file: Option<PathBuf>,
    },

    /// Print tracker records matching a predicate.
    Scan {
        /// e.g. "source_type = 's3' AND job_created = false"
        #[arg(long = "where", default_value = "")]
        filter: String,
    },

    /// Report queue reachability and tracker stage counts.
    Health,
}

#[derive(Args, Debug)]
pub struct EventArg {
    /// Provider notification JSON (`-` for stdin).
    #[arg(long)]
    pub event: PathBuf,
}
