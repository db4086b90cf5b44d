use crate::io;
use crate::offline_store::plan::{self, QueryPlan};
use crate::on_demand::OnDemandFeatureView;
use crate::table::RowTable;
use anyhow::Result;
use arrow::record_batch::RecordBatch;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Deferred result of an offline store query. Nothing is read until one of
/// the materialization methods is called, and every call runs the plan
/// again from the sources.
pub trait RetrievalJob: Send + Sync {
    fn to_columnar_table(&self) -> Result<RecordBatch>;

    fn to_row_table(&self) -> Result<RowTable> {
        RowTable::try_from(&self.to_columnar_table()?)
    }

    /// On-demand feature views layered onto the joined result.
    fn feature_view_overlays(&self) -> Option<Vec<Arc<OnDemandFeatureView>>>;

    fn full_feature_names(&self) -> bool;

    fn plan(&self) -> &QueryPlan;

    /// Materializes the columnar result into a parquet file.
    fn persist(&self, path: &Path) -> Result<()> {
        let batch = self.to_columnar_table()?;
        debug!(
            "Persisting {} rows to {}",
            batch.num_rows(),
            path.display()
        );
        io::write_parquet(path, &batch)
    }
}

#[derive(Debug, Clone)]
pub struct FileRetrievalJob {
    plan: QueryPlan,
}

impl FileRetrievalJob {
    pub fn new(plan: QueryPlan) -> Self {
        Self { plan }
    }
}

impl RetrievalJob for FileRetrievalJob {
    fn to_columnar_table(&self) -> Result<RecordBatch> {
        plan::execute(&self.plan)
    }

    fn feature_view_overlays(&self) -> Option<Vec<Arc<OnDemandFeatureView>>> {
        match &self.plan {
            QueryPlan::HistoricalJoin(plan) if !plan.on_demand.is_empty() => {
                Some(plan.on_demand_feature_views())
            }
            _ => None,
        }
    }

    fn full_feature_names(&self) -> bool {
        match &self.plan {
            QueryPlan::HistoricalJoin(plan) => plan.full_feature_names,
            QueryPlan::PullLatest(_) => false,
        }
    }

    fn plan(&self) -> &QueryPlan {
        &self.plan
    }
}
