use crate::entity_df::{ENTITY_DF_LABEL, EntityDataFrame};
use crate::error::FeastCoreError;
use crate::model::{FeatureRef, FeatureView};
use crate::offline_store::plan::{
    FeatureColumn, HistoricalJoinPlan, JoinKey, OnDemandStep, PullLatestPlan, QueryPlan, ViewJoin,
};
use crate::offline_store::{
    FileRetrievalJob, HistoricalFeaturesRequest, OfflineStore, PullLatestRequest, RetrievalJob,
};
use crate::on_demand::OnDemandFeatureView;
use crate::registry::FeatureRegistryService;
use crate::source::{self, SourceKind, TabularSource, TabularSourceDescriptor};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Offline store over parquet files on the local file system.
#[derive(Debug, Clone)]
pub struct FileOfflineStore {
    repo_path: Option<PathBuf>,
    source_kind: SourceKind,
}

impl FileOfflineStore {
    pub fn new(repo_path: Option<PathBuf>, source_kind: SourceKind) -> Self {
        Self {
            repo_path,
            source_kind,
        }
    }
}

/// Requested features grouped by the view that produces them, in order of
/// first appearance.
#[derive(Default)]
struct PlanBuilder {
    views: Vec<(Arc<FeatureView>, Vec<FeatureColumn>)>,
    on_demand: Vec<OnDemandStep>,
    /// Output name to the views requesting it, for collision reports.
    output_names: HashMap<String, Vec<String>>,
    output_columns: Vec<String>,
}

impl PlanBuilder {
    /// Entity dataframe columns are kept in the output, so no feature may
    /// take their names.
    fn reserve_entity_columns(&mut self, entity_df: &EntityDataFrame) {
        for field in entity_df.batch().schema_ref().fields() {
            self.output_names
                .entry(field.name().clone())
                .or_default()
                .push(ENTITY_DF_LABEL.to_string());
        }
    }

    fn claim_output_name(&mut self, output_name: &str, view_name: &str) {
        self.output_names
            .entry(output_name.to_string())
            .or_default()
            .push(view_name.to_string());
        self.output_columns.push(output_name.to_string());
    }

    fn add_view_feature(&mut self, view: &Arc<FeatureView>, column: FeatureColumn) {
        let index = match self.views.iter().position(|(known, _)| known.name == view.name) {
            Some(index) => index,
            None => {
                self.views.push((view.clone(), Vec::new()));
                self.views.len() - 1
            }
        };
        let columns = &mut self.views[index].1;
        if !columns.iter().any(|c| c.output_name == column.output_name) {
            columns.push(column);
        }
    }

    fn add_on_demand_feature(&mut self, view: &Arc<OnDemandFeatureView>, feature: String) {
        match self
            .on_demand
            .iter_mut()
            .find(|step| step.view.name == view.name)
        {
            Some(step) => step.features.push(feature),
            None => self.on_demand.push(OnDemandStep {
                view: view.clone(),
                features: vec![feature],
            }),
        }
    }

    fn check_collisions(&self) -> Result<()> {
        for name in &self.output_columns {
            let views = &self.output_names[name];
            if views.len() > 1 {
                let feature_name = name
                    .rsplit_once("__")
                    .map(|(_, feature)| feature)
                    .unwrap_or(name);
                return Err(
                    FeastCoreError::ambiguous_feature_name(feature_name, views.clone()).into(),
                );
            }
        }
        Ok(())
    }
}

fn view_join(view: &FeatureView, features: Vec<FeatureColumn>) -> ViewJoin {
    ViewJoin {
        feature_view_name: view.name.clone(),
        source: view.batch_source.clone(),
        join_keys: view
            .join_keys()
            .map(|join_key| JoinKey {
                source_column: join_key.to_string(),
                entity_column: view.entity_df_column(join_key).to_string(),
            })
            .collect(),
        features,
        ttl: view.ttl,
    }
}

#[async_trait]
impl OfflineStore for FileOfflineStore {
    async fn pull_latest_from_table_or_query(
        &self,
        request: PullLatestRequest,
    ) -> Result<Box<dyn RetrievalJob>> {
        let plan = PullLatestPlan {
            source: request.source,
            repo_path: self.repo_path.clone(),
            join_key_columns: request.join_key_columns,
            feature_name_columns: request.feature_name_columns,
            event_timestamp_column: request.event_timestamp_column,
            created_timestamp_column: request.created_timestamp_column,
            start_date: request.start_date,
            end_date: request.end_date,
        };
        debug!("Planned {}", plan);
        Ok(Box::new(FileRetrievalJob::new(QueryPlan::PullLatest(plan))))
    }

    async fn get_historical_features(
        &self,
        request: HistoricalFeaturesRequest,
        registry: &dyn FeatureRegistryService,
    ) -> Result<Box<dyn RetrievalJob>> {
        let HistoricalFeaturesRequest {
            feature_views,
            feature_refs,
            entity_df,
            project,
            full_feature_names,
        } = request;
        let refs = feature_refs
            .iter()
            .map(|reference| FeatureRef::try_from(reference.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let known_view = |name: &str| -> Result<Arc<FeatureView>> {
            feature_views
                .iter()
                .find(|view| view.name == name)
                .cloned()
                .ok_or_else(|| {
                    FeastCoreError::unknown_feature_view_in_project(name, project.as_str()).into()
                })
        };

        let mut builder = PlanBuilder::default();
        builder.reserve_entity_columns(&entity_df);
        let mut on_demand_views: Vec<Arc<OnDemandFeatureView>> = Vec::new();
        for feature_ref in &refs {
            let output_name = feature_ref.output_name(full_feature_names);
            if let Some(view) = feature_views
                .iter()
                .find(|view| view.name == feature_ref.feature_view_name)
                .cloned()
            {
                if !view.has_feature(&feature_ref.feature_name) {
                    return Err(anyhow!(
                        "Feature {} is not defined in feature view {}",
                        feature_ref.feature_name,
                        view.name
                    ));
                }
                builder.claim_output_name(&output_name, &view.name);
                builder.add_view_feature(
                    &view,
                    FeatureColumn {
                        source_column: feature_ref.feature_name.clone(),
                        output_name,
                    },
                );
                continue;
            }
            let odfv = registry
                .find_on_demand_feature_view(&feature_ref.feature_view_name, &project)
                .await?
                .ok_or_else(|| {
                    FeastCoreError::unknown_feature_view_in_project(
                        feature_ref.feature_view_name.clone(),
                        project.as_str(),
                    )
                })?;
            if !odfv.has_feature(&feature_ref.feature_name) {
                return Err(anyhow!(
                    "Feature {} is not defined in on-demand feature view {}",
                    feature_ref.feature_name,
                    odfv.name
                ));
            }
            if !odfv.has_transform() {
                return Err(FeastCoreError::missing_transform(odfv.name.clone()).into());
            }
            builder.claim_output_name(&output_name, &odfv.name);
            builder.add_on_demand_feature(&odfv, feature_ref.feature_name.clone());
            if !on_demand_views.iter().any(|known| known.name == odfv.name) {
                on_demand_views.push(odfv);
            }
        }
        builder.check_collisions()?;

        // Inputs of on-demand views join under qualified names so they never
        // clash with requested bare names.
        for odfv in &on_demand_views {
            for projection in &odfv.sources {
                let view = known_view(&projection.feature_view_name)?;
                let features = if projection.features.is_empty() {
                    view.features.iter().map(|f| f.name.clone()).collect()
                } else {
                    projection.features.clone()
                };
                for feature in features {
                    let feature_ref = FeatureRef::new(view.name.clone(), feature.clone());
                    builder.add_view_feature(
                        &view,
                        FeatureColumn {
                            source_column: feature,
                            output_name: feature_ref.full_name(),
                        },
                    );
                }
            }
        }

        let PlanBuilder {
            views,
            on_demand,
            output_columns,
            ..
        } = builder;
        let plan = HistoricalJoinPlan {
            entity_df,
            repo_path: self.repo_path.clone(),
            views: views
                .into_iter()
                .map(|(view, features)| view_join(&view, features))
                .collect(),
            on_demand,
            full_feature_names,
            output_columns,
        };
        debug!("Planned {}", plan);
        Ok(Box::new(FileRetrievalJob::new(QueryPlan::HistoricalJoin(
            plan,
        ))))
    }

    fn create_source(&self, descriptor: TabularSourceDescriptor) -> Arc<dyn TabularSource> {
        source::from_descriptor(self.source_kind, descriptor)
    }
}
