//! On-demand feature views: transforms applied to the joined result after the
//! point-in-time join has run.

use crate::error::FeastCoreError;
use crate::feast::core::OnDemandFeatureView as OnDemandFeatureViewProto;
use crate::feast::core::on_demand_source::Source as OnDemandSourceProto;
use crate::feast::types::value_type::Enum as ValueTypeEnum;
use crate::model::Field;
use anyhow::{Context, Error, Result, anyhow};
use arrow::array::ArrayRef;
use arrow::datatypes::{Field as ArrowField, Schema};
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// User logic of an on-demand feature view.
///
/// The input batch holds the joined rows with base features under their bare
/// names; the output must contain one column per feature of the view with the
/// same number of rows.
pub trait OnDemandTransform: Send + Sync {
    fn transform(&self, input: &RecordBatch) -> Result<RecordBatch>;
}

/// Transforms registered in process, keyed by on-demand feature view name.
pub type TransformRegistry = HashMap<String, Arc<dyn OnDemandTransform>>;

/// Base features an on-demand feature view reads from one feature view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProjection {
    pub feature_view_name: String,
    pub features: Vec<String>,
}

#[derive(Clone)]
pub struct OnDemandFeatureView {
    pub name: String,
    pub project: String,
    pub features: Vec<Field>,
    pub sources: Vec<SourceProjection>,
    transform: Option<Arc<dyn OnDemandTransform>>,
}

impl fmt::Debug for OnDemandFeatureView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnDemandFeatureView")
            .field("name", &self.name)
            .field("project", &self.project)
            .field("features", &self.features)
            .field("sources", &self.sources)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

impl OnDemandFeatureView {
    pub fn new(name: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            features: Vec::new(),
            sources: Vec::new(),
            transform: None,
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value_type: ValueTypeEnum) -> Self {
        self.features.push(Field::new(name, value_type));
        self
    }

    pub fn with_source(mut self, feature_view_name: impl Into<String>, features: &[&str]) -> Self {
        self.sources.push(SourceProjection {
            feature_view_name: feature_view_name.into(),
            features: features.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn OnDemandTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn has_feature(&self, feature_name: &str) -> bool {
        self.features.iter().any(|f| f.name == feature_name)
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Runs the transform over `joined` and returns the requested feature
    /// columns named for the output.
    pub fn apply(
        &self,
        joined: &RecordBatch,
        feature_names: &[String],
        full_feature_names: bool,
    ) -> Result<Vec<(String, ArrayRef)>> {
        let transform = self
            .transform
            .as_ref()
            .ok_or_else(|| FeastCoreError::missing_transform(self.name.clone()))?;
        let input = self.transform_input(joined)?;
        let output = transform
            .transform(&input)
            .with_context(|| format!("Transform of on-demand feature view {} failed", self.name))?;
        if output.num_rows() != joined.num_rows() {
            return Err(anyhow!(
                "On-demand feature view {} returned {} rows for {} input rows",
                self.name,
                output.num_rows(),
                joined.num_rows()
            ));
        }
        feature_names
            .iter()
            .map(|feature| {
                let column = output.column_by_name(feature).ok_or_else(|| {
                    anyhow!(
                        "On-demand feature view {} did not produce feature {}",
                        self.name,
                        feature
                    )
                })?;
                let name = if full_feature_names {
                    format!("{}__{}", self.name, feature)
                } else {
                    feature.clone()
                };
                Ok((name, column.clone()))
            })
            .collect()
    }

    /// Adds bare-name aliases for qualified `{view}__{feature}` columns of the
    /// source views so transforms see the same names in both naming modes.
    /// When several source views share a feature name the first one in
    /// schema order keeps the bare name.
    fn transform_input(&self, joined: &RecordBatch) -> Result<RecordBatch> {
        let schema = joined.schema();
        let mut fields: Vec<ArrowField> =
            schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns = joined.columns().to_vec();
        for (field, column) in schema.fields().iter().zip(joined.columns()) {
            let Some((view, feature)) = field.name().split_once("__") else {
                continue;
            };
            if !self
                .sources
                .iter()
                .any(|source| source.feature_view_name == view)
                || fields.iter().any(|known| known.name() == feature)
            {
                continue;
            }
            fields.push(field.as_ref().clone().with_name(feature));
            columns.push(column.clone());
        }
        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
    }
}

impl TryFrom<OnDemandFeatureViewProto> for OnDemandFeatureView {
    type Error = Error;

    fn try_from(odfv_proto: OnDemandFeatureViewProto) -> Result<Self> {
        let spec = odfv_proto
            .spec
            .ok_or(anyhow!("Missing on-demand feature view specs"))?;
        let features = spec
            .features
            .into_iter()
            .map(Field::try_from)
            .collect::<Result<Vec<_>>>()?;
        let mut sources = spec
            .sources
            .into_values()
            .filter_map(|source| match source.source {
                Some(OnDemandSourceProto::FeatureViewProjection(projection)) => {
                    Some(SourceProjection {
                        feature_view_name: projection.feature_view_name,
                        features: projection
                            .feature_columns
                            .into_iter()
                            .map(|column| column.name)
                            .collect(),
                    })
                }
                None => None,
            })
            .collect::<Vec<_>>();
        sources.sort_by(|a, b| a.feature_view_name.cmp(&b.feature_view_name));
        Ok(OnDemandFeatureView {
            name: spec.name,
            project: spec.project,
            features,
            sources,
            transform: None,
        })
    }
}
