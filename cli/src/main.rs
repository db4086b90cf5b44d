use crate::cli_options::{CliCommand, CliOptions};
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use feast_offline_core::config::{Provider, RepoConfig};
use feast_offline_core::entity_df::EntityDataFrame;
use feast_offline_core::model::FeatureRef;
use feast_offline_core::offline_store::{
    HistoricalFeaturesRequest, OfflineStore, PullLatestRequest, RetrievalJob, get_offline_store,
};
use feast_offline_core::on_demand::TransformRegistry;
use feast_offline_core::registry::{FeatureRegistryService, get_registry, resolve_views};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli_options;

const FEATURE_REPO_DIR_ENV_VAR_NAME: &str = "FEATURE_REPO_DIR_ENV_VAR";
const FEAST_FS_YAML_FILE_PATH_ENV_VAR: &str = "FEAST_FS_YAML_FILE_PATH";
const DEFAULT_FEATURE_STORE_FILE_NAME: &str = "feature_store.yaml";

/// Materializes `job` off the async runtime and writes or prints the result.
async fn emit(job: Box<dyn RetrievalJob>, output: Option<PathBuf>, explain: bool) -> Result<()> {
    if explain {
        println!("{}", job.plan());
        return Ok(());
    }
    tokio::task::spawn_blocking(move || -> Result<()> {
        match output {
            Some(path) => {
                job.persist(&path)?;
                tracing::info!("Wrote result to {}", path.display());
            }
            None => {
                for line in job.to_row_table()?.to_json_lines()? {
                    println!("{}", line);
                }
            }
        }
        Ok(())
    })
    .await?
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_opts = CliOptions::parse();
    let CliOptions {
        chdir,
        log_level,
        feature_store_yaml,
        command,
    } = cli_opts;

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::from(log_level).into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cwd =
        if let Some(path) = chdir.or_else(|| std::env::var(FEATURE_REPO_DIR_ENV_VAR_NAME).ok()) {
            PathBuf::from(path)
        } else {
            std::env::current_dir()?
        };
    let cwd_str = cwd
        .to_str()
        .ok_or_else(|| anyhow!("Feature repository path contains invalid UTF-8"))?;

    let feature_store_yaml = feature_store_yaml
        .or(std::env::var(FEAST_FS_YAML_FILE_PATH_ENV_VAR).ok())
        .unwrap_or(DEFAULT_FEATURE_STORE_FILE_NAME.to_string());
    let config_path = cwd.join(&feature_store_yaml);
    let yaml_str = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let repo_config = RepoConfig::from_yaml_str(&yaml_str)?;
    if let Some(Provider::Unknown(other)) = &repo_config.provider {
        return Err(anyhow!(
            "Unsupported provider: {}, available providers: [local, aws, gcp]",
            other
        ));
    }

    let registry = get_registry(
        &repo_config.registry,
        repo_config.provider.as_ref(),
        Some(cwd_str),
        TransformRegistry::new(),
    )
    .await?;
    let offline_store = get_offline_store(&repo_config.offline_store, Some(cwd_str))?;

    match command {
        CliCommand::GetHistoricalFeatures {
            entity_df,
            event_timestamp_column,
            features,
            full_feature_names,
            output,
            explain,
        } => {
            let entity_df_path = cwd.join(entity_df);
            let batch = feast_offline_core::io::read_parquet(&entity_df_path)?;
            let entity_df = match event_timestamp_column {
                Some(column) => EntityDataFrame::new(batch, column)?,
                None => EntityDataFrame::infer(batch)?,
            };
            let refs = features
                .iter()
                .map(|f| FeatureRef::try_from(f.as_str()))
                .collect::<Result<Vec<_>>>()?;
            let resolved = resolve_views(registry.as_ref(), &refs, &repo_config.project).await?;
            tracing::info!(
                "Retrieving {} features for {} entity rows",
                features.len(),
                entity_df.num_rows()
            );
            let request = HistoricalFeaturesRequest {
                feature_views: resolved.feature_views,
                feature_refs: features,
                entity_df,
                project: repo_config.project.clone(),
                full_feature_names,
            };
            let job = offline_store
                .get_historical_features(request, registry.as_ref())
                .await?;
            emit(job, output, explain).await?;
        }
        CliCommand::PullLatest {
            feature_view,
            start,
            end,
            output,
            explain,
        } => {
            if start >= end {
                return Err(anyhow!("--start must be before --end"));
            }
            let view = registry
                .get_feature_view(&feature_view, &repo_config.project)
                .await?;
            tracing::info!("Pulling latest rows of {} in [{}, {})", view.name, start, end);
            let job = offline_store
                .pull_latest_from_table_or_query(PullLatestRequest::for_feature_view(
                    &view, start, end,
                ))
                .await?;
            emit(job, output, explain).await?;
        }
    }
    Ok(())
}
