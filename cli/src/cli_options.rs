use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Join features onto an entity dataframe as of each row's timestamp
    GetHistoricalFeatures {
        /// Parquet file holding entity keys and event timestamps
        #[arg(short = 'e', long = "entity-df")]
        entity_df: PathBuf,
        /// Name of the event timestamp column of the entity dataframe.
        /// Inferred when omitted
        #[arg(long = "event-timestamp-column", default_value = None)]
        event_timestamp_column: Option<String>,
        /// Comma separated feature references, e.g. driver_hourly_stats:conv_rate
        #[arg(short = 'F', long = "features", value_delimiter = ',', required = true)]
        features: Vec<String>,
        /// Prefix output columns with their feature view name
        #[arg(long = "full-feature-names", default_value_t = false)]
        full_feature_names: bool,
        /// Write the result to this parquet file instead of printing JSON lines
        #[arg(short = 'o', long = "output", default_value = None)]
        output: Option<PathBuf>,
        /// Print the query plan without reading any data
        #[arg(long = "explain", default_value_t = false)]
        explain: bool,
    },
    /// Latest row per entity of a feature view within a time window
    PullLatest {
        /// Feature view to read
        #[arg(short = 'v', long = "feature-view")]
        feature_view: String,
        /// Inclusive window start, RFC 3339
        #[arg(long = "start")]
        start: DateTime<Utc>,
        /// Exclusive window end, RFC 3339
        #[arg(long = "end")]
        end: DateTime<Utc>,
        /// Write the result to this parquet file instead of printing JSON lines
        #[arg(short = 'o', long = "output", default_value = None)]
        output: Option<PathBuf>,
        /// Print the query plan without reading any data
        #[arg(long = "explain", default_value_t = false)]
        explain: bool,
    },
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliOptions {
    #[arg(short = 'c', long = "chdir", default_value = None)]
    /// Switch to a different feature repository directory before executing the given subcommand.
    /// Can also be set via the FEATURE_REPO_DIR_ENV_VAR environment variable.
    pub chdir: Option<String>,
    /// The logging level. Case-insensitive.
    #[arg(
        value_enum,
        long = "log-level",
        ignore_case = true,
        default_value = "info"
    )]
    pub log_level: LogLevel,
    /// Override the directory where the CLI should look for the feature_store.yaml file.
    /// Can also be set via the FEAST_FS_YAML_FILE_PATH environment variable
    #[arg(short='f', long="feature-store-yaml", default_value = None)]
    pub feature_store_yaml: Option<String>,
    #[command(subcommand)]
    pub command: CliCommand,
}
