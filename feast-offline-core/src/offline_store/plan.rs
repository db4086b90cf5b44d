//! Query plans built by the offline store and the interpreter that runs them.
//! Building a plan never touches the file system; `execute` does all reads.

use crate::entity_df::EntityDataFrame;
use crate::error::FeastCoreError;
use crate::offline_store::point_in_time::{Timeline, as_of_indices, latest_indices};
use crate::on_demand::OnDemandFeatureView;
use crate::source::TabularSource;
use crate::util::timestamp_micros;
use anyhow::{Context, Result, anyhow};
use arrow::array::ArrayRef;
use arrow::compute::{cast, take};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum QueryPlan {
    PullLatest(PullLatestPlan),
    HistoricalJoin(HistoricalJoinPlan),
}

#[derive(Debug, Clone)]
pub struct PullLatestPlan {
    pub source: Arc<dyn TabularSource>,
    pub repo_path: Option<PathBuf>,
    pub join_key_columns: Vec<String>,
    pub feature_name_columns: Vec<String>,
    pub event_timestamp_column: String,
    pub created_timestamp_column: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKey {
    /// Column of the batch source, after field mapping.
    pub source_column: String,
    pub entity_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureColumn {
    pub source_column: String,
    pub output_name: String,
}

/// One feature view's side of the historical join.
#[derive(Debug, Clone)]
pub struct ViewJoin {
    pub feature_view_name: String,
    pub source: Arc<dyn TabularSource>,
    pub join_keys: Vec<JoinKey>,
    pub features: Vec<FeatureColumn>,
    pub ttl: Option<Duration>,
}

/// On-demand features computed from the joined batch.
#[derive(Debug, Clone)]
pub struct OnDemandStep {
    pub view: Arc<OnDemandFeatureView>,
    pub features: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HistoricalJoinPlan {
    pub entity_df: EntityDataFrame,
    pub repo_path: Option<PathBuf>,
    pub views: Vec<ViewJoin>,
    pub on_demand: Vec<OnDemandStep>,
    pub full_feature_names: bool,
    /// Feature columns of the result, in request order. Joined columns not
    /// listed here only feed on-demand transforms and are dropped.
    pub output_columns: Vec<String>,
}

impl HistoricalJoinPlan {
    pub fn on_demand_feature_views(&self) -> Vec<Arc<OnDemandFeatureView>> {
        self.on_demand.iter().map(|step| step.view.clone()).collect()
    }
}

pub fn execute(plan: &QueryPlan) -> Result<RecordBatch> {
    match plan {
        QueryPlan::PullLatest(plan) => execute_pull_latest(plan),
        QueryPlan::HistoricalJoin(plan) => execute_historical_join(plan),
    }
}

fn source_column(
    batch: &RecordBatch,
    source: &dyn TabularSource,
    feature_view_name: Option<&str>,
    column: &str,
) -> Result<ArrayRef> {
    batch.column_by_name(column).cloned().ok_or_else(|| {
        FeastCoreError::schema_mismatch(feature_view_name, column, source.descriptor().path.clone())
            .into()
    })
}

fn micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn execute_pull_latest(plan: &PullLatestPlan) -> Result<RecordBatch> {
    debug!("Executing {}", plan);
    let source = plan.source.as_ref();
    let batch = source.load(plan.repo_path.as_deref())?;
    let column = |name: &str| source_column(&batch, source, None, name);

    let event = timestamp_micros(&column(&plan.event_timestamp_column)?)?;
    let created = plan
        .created_timestamp_column
        .as_deref()
        .map(|name| column(name).and_then(|c| timestamp_micros(&c)))
        .transpose()?;
    let keys = plan
        .join_key_columns
        .iter()
        .map(|name| column(name))
        .collect::<Result<Vec<_>>>()?;
    let timeline = Timeline {
        event: &event,
        created: created.as_deref(),
    };
    let indices = latest_indices(
        &keys,
        &timeline,
        micros(plan.start_date),
        micros(plan.end_date),
    )?;

    let projection = plan
        .join_key_columns
        .iter()
        .chain(plan.feature_name_columns.iter())
        .chain(std::iter::once(&plan.event_timestamp_column));
    let mut fields = Vec::new();
    let mut columns = Vec::new();
    for name in projection {
        let values = take(column(name)?.as_ref(), &indices, None)?;
        let (_, field) = batch
            .schema_ref()
            .column_with_name(name)
            .ok_or_else(|| anyhow!("Column {} vanished from batch", name))?;
        fields.push(field.clone());
        columns.push(values);
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Joins one view against the entity dataframe and returns its feature
/// columns under their output names.
fn join_view(
    view: &ViewJoin,
    entity_df: &EntityDataFrame,
    entity_timestamps: &[Option<i64>],
    repo_path: Option<&std::path::Path>,
) -> Result<Vec<(String, ArrayRef)>> {
    let source = view.source.as_ref();
    let view_name = Some(view.feature_view_name.as_str());
    let batch = source.load(repo_path)?;
    let column = |name: &str| source_column(&batch, source, view_name, name);

    let descriptor = source.descriptor();
    let event = timestamp_micros(&column(&descriptor.event_timestamp_column)?)?;
    let created = descriptor
        .created_timestamp_column
        .as_deref()
        .map(|name| column(name).and_then(|c| timestamp_micros(&c)))
        .transpose()?;

    let mut entity_keys = Vec::with_capacity(view.join_keys.len());
    let mut source_keys = Vec::with_capacity(view.join_keys.len());
    for key in &view.join_keys {
        entity_df.require_column(&key.entity_column)?;
        let entity_key = entity_df
            .batch()
            .column_by_name(&key.entity_column)
            .cloned()
            .ok_or_else(|| anyhow!("Entity column {} vanished", key.entity_column))?;
        let source_key = cast(&column(&key.source_column)?, entity_key.data_type()).with_context(
            || {
                format!(
                    "Join key {} of feature view {} cannot be compared with entity column {}",
                    key.source_column, view.feature_view_name, key.entity_column
                )
            },
        )?;
        entity_keys.push(entity_key);
        source_keys.push(source_key);
    }

    let ttl_micros = view.ttl.and_then(|ttl| ttl.num_microseconds());
    let timeline = Timeline {
        event: &event,
        created: created.as_deref(),
    };
    let indices = as_of_indices(
        &entity_keys,
        entity_timestamps,
        &source_keys,
        &timeline,
        ttl_micros,
    )?;
    view.features
        .iter()
        .map(|feature| {
            let values = take(column(&feature.source_column)?.as_ref(), &indices, None)?;
            Ok((feature.output_name.clone(), values))
        })
        .collect()
}

fn execute_historical_join(plan: &HistoricalJoinPlan) -> Result<RecordBatch> {
    debug!("Executing {}", plan);
    let entity_batch = plan.entity_df.batch();
    let timestamp_column = entity_batch
        .column_by_name(plan.entity_df.event_timestamp_column())
        .ok_or_else(|| anyhow!("Entity dataframe lost its event timestamp column"))?;
    let entity_timestamps = timestamp_micros(timestamp_column)?;

    let mut features: HashMap<String, ArrayRef> = HashMap::new();
    let mut joined_fields: Vec<Field> = entity_batch
        .schema_ref()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let mut joined_columns = entity_batch.columns().to_vec();
    for view in &plan.views {
        for (name, values) in join_view(
            view,
            &plan.entity_df,
            &entity_timestamps,
            plan.repo_path.as_deref(),
        )? {
            joined_fields.push(Field::new(&name, values.data_type().clone(), true));
            joined_columns.push(values.clone());
            features.insert(name, values);
        }
    }

    if !plan.on_demand.is_empty() {
        let joined = RecordBatch::try_new(Arc::new(Schema::new(joined_fields)), joined_columns)?;
        for step in &plan.on_demand {
            let outputs = step
                .view
                .apply(&joined, &step.features, plan.full_feature_names)?;
            features.extend(outputs);
        }
    }

    let mut fields: Vec<Field> = entity_batch
        .schema_ref()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let mut columns = entity_batch.columns().to_vec();
    for name in &plan.output_columns {
        let values = features
            .get(name)
            .ok_or_else(|| anyhow!("Feature column {} was not produced", name))?;
        fields.push(Field::new(name, values.data_type().clone(), true));
        columns.push(values.clone());
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

fn names<'a>(columns: impl Iterator<Item = &'a str>) -> String {
    columns.collect::<Vec<_>>().join(", ")
}

impl fmt::Display for PullLatestPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PullLatest(source={}, keys=[{}], features=[{}], window=[{}, {}))",
            self.source.descriptor().path,
            self.join_key_columns.join(", "),
            self.feature_name_columns.join(", "),
            self.start_date.to_rfc3339(),
            self.end_date.to_rfc3339()
        )
    }
}

impl fmt::Display for HistoricalJoinPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HistoricalJoin(entity_rows={}, timestamp={}",
            self.entity_df.num_rows(),
            self.entity_df.event_timestamp_column()
        )?;
        for view in &self.views {
            write!(
                f,
                ", {}[keys=[{}], features=[{}]",
                view.feature_view_name,
                names(view.join_keys.iter().map(|k| k.source_column.as_str())),
                names(view.features.iter().map(|c| c.output_name.as_str()))
            )?;
            if let Some(ttl) = view.ttl {
                write!(f, ", ttl={}s", ttl.num_seconds())?;
            }
            write!(f, "]")?;
        }
        for step in &self.on_demand {
            write!(f, ", on_demand {}[{}]", step.view.name, step.features.join(", "))?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPlan::PullLatest(plan) => plan.fmt(f),
            QueryPlan::HistoricalJoin(plan) => plan.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileSource, TabularSourceDescriptor};
    use crate::test_utils::{timestamps, write_batch};
    use arrow::array::{Array, AsArray, Float64Array, Int32Array, Int64Array, StringArray};
    use arrow::datatypes::{Float64Type, Int64Type};

    fn at(seconds: i64) -> Result<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(seconds, 0).ok_or(anyhow!("bad timestamp"))
    }

    #[test]
    fn pull_latest_projects_keys_features_and_timestamp() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let batch = RecordBatch::try_from_iter(vec![
            (
                "driver_id",
                Arc::new(Int64Array::from(vec![1, 1, 2])) as ArrayRef,
            ),
            (
                "conv_rate",
                Arc::new(Float64Array::from(vec![0.1, 0.2, 0.3])) as ArrayRef,
            ),
            (
                "city",
                Arc::new(StringArray::from(vec!["a", "b", "c"])) as ArrayRef,
            ),
            ("event_timestamp", timestamps(&[10, 20, 30])),
        ])?;
        write_batch(dir.path(), "driver.parquet", &batch)?;
        let plan = QueryPlan::PullLatest(PullLatestPlan {
            source: Arc::new(FileSource::new(TabularSourceDescriptor::new(
                "driver.parquet",
                "event_timestamp",
            ))),
            repo_path: Some(dir.path().to_path_buf()),
            join_key_columns: vec!["driver_id".to_string()],
            feature_name_columns: vec!["conv_rate".to_string()],
            event_timestamp_column: "event_timestamp".to_string(),
            created_timestamp_column: None,
            start_date: at(0)?,
            end_date: at(100)?,
        });
        let result = execute(&plan)?;
        let schema = result.schema();
        let columns = schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect::<Vec<_>>();
        assert_eq!(columns, vec!["driver_id", "conv_rate", "event_timestamp"]);
        assert_eq!(
            result.column(0).as_primitive::<Int64Type>().values().to_vec(),
            vec![1, 2]
        );
        assert_eq!(
            result.column(1).as_primitive::<Float64Type>().values().to_vec(),
            vec![0.2, 0.3]
        );
        Ok(())
    }

    #[test]
    fn join_casts_source_keys_to_entity_types() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source_batch = RecordBatch::try_from_iter(vec![
            (
                "driver_id",
                Arc::new(Int32Array::from(vec![1001, 1002])) as ArrayRef,
            ),
            (
                "conv_rate",
                Arc::new(Float64Array::from(vec![0.5, 0.7])) as ArrayRef,
            ),
            ("event_timestamp", timestamps(&[10, 10])),
        ])?;
        write_batch(dir.path(), "driver.parquet", &source_batch)?;
        let entity_batch = RecordBatch::try_from_iter(vec![
            (
                "driver",
                Arc::new(Int64Array::from(vec![1002, 1003])) as ArrayRef,
            ),
            ("event_timestamp", timestamps(&[20, 20])),
        ])?;
        let plan = QueryPlan::HistoricalJoin(HistoricalJoinPlan {
            entity_df: EntityDataFrame::new(entity_batch, "event_timestamp")?,
            repo_path: Some(dir.path().to_path_buf()),
            views: vec![ViewJoin {
                feature_view_name: "driver_hourly_stats".to_string(),
                source: Arc::new(FileSource::new(TabularSourceDescriptor::new(
                    "driver.parquet",
                    "event_timestamp",
                ))),
                join_keys: vec![JoinKey {
                    source_column: "driver_id".to_string(),
                    entity_column: "driver".to_string(),
                }],
                features: vec![FeatureColumn {
                    source_column: "conv_rate".to_string(),
                    output_name: "conv_rate".to_string(),
                }],
                ttl: None,
            }],
            on_demand: Vec::new(),
            full_feature_names: false,
            output_columns: vec!["conv_rate".to_string()],
        });
        let result = execute(&plan)?;
        let conv_rate = result
            .column_by_name("conv_rate")
            .ok_or(anyhow!("missing conv_rate"))?
            .as_primitive::<Float64Type>();
        assert_eq!(conv_rate.value(0), 0.7);
        assert!(conv_rate.is_null(1));
        assert!(plan.to_string().contains("driver_hourly_stats[keys=[driver_id]"));
        Ok(())
    }
}
