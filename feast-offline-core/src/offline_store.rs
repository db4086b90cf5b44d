pub mod file_offline_store;
pub mod plan;
mod point_in_time;
pub mod retrieval_job;

use crate::config::OfflineStoreConfig;
use crate::entity_df::EntityDataFrame;
use crate::model::FeatureView;
use crate::registry::FeatureRegistryService;
use crate::source::{TabularSource, TabularSourceDescriptor};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub use file_offline_store::FileOfflineStore;
pub use plan::QueryPlan;
pub use retrieval_job::{FileRetrievalJob, RetrievalJob};

#[derive(Debug, Clone)]
pub struct PullLatestRequest {
    pub source: Arc<dyn TabularSource>,
    pub join_key_columns: Vec<String>,
    pub feature_name_columns: Vec<String>,
    pub event_timestamp_column: String,
    pub created_timestamp_column: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl PullLatestRequest {
    /// Request over every feature of `feature_view`, reading the timestamp
    /// columns declared by its batch source.
    pub fn for_feature_view(
        feature_view: &FeatureView,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        let descriptor = feature_view.batch_source.descriptor();
        Self {
            source: feature_view.batch_source.clone(),
            join_key_columns: feature_view.join_keys().map(str::to_owned).collect(),
            feature_name_columns: feature_view
                .features
                .iter()
                .map(|f| f.name.clone())
                .collect(),
            event_timestamp_column: descriptor.event_timestamp_column.clone(),
            created_timestamp_column: descriptor.created_timestamp_column.clone(),
            start_date,
            end_date,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoricalFeaturesRequest {
    pub feature_views: Vec<Arc<FeatureView>>,
    /// `"<feature_view>:<feature>"` references, in output order.
    pub feature_refs: Vec<String>,
    pub entity_df: EntityDataFrame,
    pub project: String,
    pub full_feature_names: bool,
}

#[async_trait]
pub trait OfflineStore: Send + Sync + 'static {
    /// Latest row per join key with `start_date <= event timestamp <
    /// end_date`.
    async fn pull_latest_from_table_or_query(
        &self,
        request: PullLatestRequest,
    ) -> Result<Box<dyn RetrievalJob>>;

    /// Point-in-time join of the requested features onto the entity
    /// dataframe. On-demand feature views are looked up in `registry`.
    async fn get_historical_features(
        &self,
        request: HistoricalFeaturesRequest,
        registry: &dyn FeatureRegistryService,
    ) -> Result<Box<dyn RetrievalJob>>;

    /// Source implementation this store reads, wrapping `descriptor`.
    fn create_source(&self, descriptor: TabularSourceDescriptor) -> Arc<dyn TabularSource>;
}

/// Builds the store selected by `offline_store.type`. Relative source paths
/// are later resolved against `cwd`.
pub fn get_offline_store(
    offline_store_config: &OfflineStoreConfig,
    cwd: Option<&str>,
) -> Result<Arc<dyn OfflineStore>> {
    let repo_path = cwd.map(PathBuf::from);
    info!(
        "Create {} offline store",
        offline_store_config.store_type()
    );
    Ok(Arc::new(FileOfflineStore::new(
        repo_path,
        offline_store_config.source_kind(),
    )))
}
