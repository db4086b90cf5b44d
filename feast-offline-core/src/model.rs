use crate::error::FeastCoreError;
use crate::feast::core::Entity as EntityProto;
use crate::feast::core::FeatureSpecV2 as FeatureSpecV2Proto;
use crate::feast::core::FeatureView as FeatureViewProto;
use crate::feast::core::Registry as RegistryProto;
use crate::feast::types::value_type::Enum as ValueTypeEnum;
use crate::on_demand::OnDemandFeatureView;
use crate::source::{self, TabularSource};
use crate::util::prost_duration_to_duration;
use anyhow::{Error, Result, anyhow};
use chrono::Duration;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub(crate) const DUMMY_ENTITY_NAME: &str = "__dummy";

/// `(project, name)`. Registry objects are unique per project only.
pub type ProjectKey = (String, String);

pub(crate) fn project_key(project: &str, name: &str) -> ProjectKey {
    (project.to_string(), name.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value_type: ValueTypeEnum,
}

impl Field {
    pub fn new(name: impl Into<String>, value_type: ValueTypeEnum) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub project: String,
    pub join_key: String,
    pub value_type: ValueTypeEnum,
}

#[derive(Debug, Clone)]
pub struct FeatureView {
    pub name: String,
    pub project: String,
    pub entity_names: Vec<String>,
    /// Join key columns as they appear in the batch source.
    pub entity_columns: Vec<Field>,
    pub features: Vec<Field>,
    /// `None` when feature values never expire.
    pub ttl: Option<Duration>,
    pub batch_source: Arc<dyn TabularSource>,
    /// View join key to the entity dataframe column holding its values.
    pub join_key_map: HashMap<String, String>,
}

impl FeatureView {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        batch_source: Arc<dyn TabularSource>,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            entity_names: Vec::new(),
            entity_columns: Vec::new(),
            features: Vec::new(),
            ttl: None,
            batch_source,
            join_key_map: HashMap::new(),
        }
    }

    pub fn with_entity(mut self, entity: &Entity) -> Self {
        self.entity_names.push(entity.name.clone());
        self.entity_columns
            .push(Field::new(entity.join_key.clone(), entity.value_type));
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, value_type: ValueTypeEnum) -> Self {
        self.features.push(Field::new(name, value_type));
        self
    }

    /// A zero TTL is stored as `None`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    pub fn with_join_key_map(mut self, join_key_map: HashMap<String, String>) -> Self {
        self.join_key_map = join_key_map;
        self
    }

    pub fn join_keys(&self) -> impl Iterator<Item = &str> {
        self.entity_columns.iter().map(|col| col.name.as_str())
    }

    /// Entity dataframe column joined against `join_key`.
    pub fn entity_df_column<'a>(&'a self, join_key: &'a str) -> &'a str {
        self.join_key_map
            .get(join_key)
            .map(String::as_str)
            .unwrap_or(join_key)
    }

    pub fn has_feature(&self, feature_name: &str) -> bool {
        self.features.iter().any(|f| f.name == feature_name)
    }

    pub fn is_entity_less(&self) -> bool {
        self.entity_columns.is_empty()
    }

    /// Builds a view from its registry form. Views written without
    /// `entity_columns` get their join keys from the entities of the same
    /// project.
    pub fn from_proto(
        feature_view_proto: FeatureViewProto,
        entities: &HashMap<ProjectKey, Entity>,
    ) -> Result<Self> {
        let spec = feature_view_proto
            .spec
            .ok_or(anyhow!("Missing feature view spec"))?;
        let batch_source = spec
            .batch_source
            .ok_or_else(|| anyhow!("Feature view {} has no batch source", spec.name))
            .and_then(source::from_proto)?;
        let features = spec
            .features
            .into_iter()
            .map(Field::try_from)
            .collect::<Result<Vec<_>>>()?;
        let entity_columns = if spec.entity_columns.is_empty() {
            spec.entities
                .iter()
                .filter(|name| name.as_str() != DUMMY_ENTITY_NAME)
                .map(|name| {
                    entities
                        .get(&project_key(&spec.project, name))
                        .map(|entity| Field::new(entity.join_key.clone(), entity.value_type))
                        .ok_or_else(|| {
                            anyhow!("Entity {} of feature view {} not found", name, spec.name)
                        })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            spec.entity_columns
                .into_iter()
                .map(Field::try_from)
                .collect::<Result<Vec<_>>>()?
        };
        let ttl = spec
            .ttl
            .as_ref()
            .map(prost_duration_to_duration)
            .filter(|ttl| !ttl.is_zero());
        Ok(FeatureView {
            name: spec.name,
            project: spec.project,
            entity_names: spec.entities,
            entity_columns,
            features,
            ttl,
            batch_source,
            join_key_map: HashMap::new(),
        })
    }
}

/// `"<feature_view>:<feature>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureRef {
    pub feature_view_name: String,
    pub feature_name: String,
}

impl FeatureRef {
    pub fn new(feature_view_name: impl Into<String>, feature_name: impl Into<String>) -> Self {
        Self {
            feature_view_name: feature_view_name.into(),
            feature_name: feature_name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}__{}", self.feature_view_name, self.feature_name)
    }

    pub fn output_name(&self, full_feature_names: bool) -> String {
        if full_feature_names {
            self.full_name()
        } else {
            self.feature_name.clone()
        }
    }
}

impl fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.feature_view_name, self.feature_name)
    }
}

impl TryFrom<&str> for FeatureRef {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((view, feature)) if !view.is_empty() && !feature.is_empty() => {
                Ok(Self::new(view, feature))
            }
            _ => Err(FeastCoreError::invalid_feature_ref(s).into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    pub entities: HashMap<ProjectKey, Entity>,
    pub feature_views: HashMap<ProjectKey, Arc<FeatureView>>,
    pub on_demand_feature_views: HashMap<ProjectKey, Arc<OnDemandFeatureView>>,
}

impl TryFrom<EntityProto> for Entity {
    type Error = Error;

    fn try_from(entity_proto: EntityProto) -> Result<Self> {
        let specs = entity_proto.spec.ok_or(anyhow!("Missing entity specs"))?;
        let value_type = ValueTypeEnum::try_from(specs.value_type).map_err(|e| {
            anyhow!(
                "Invalid value type {} for entity {}: {}",
                specs.value_type,
                specs.name,
                e
            )
        })?;
        Ok(Entity {
            name: specs.name,
            project: specs.project,
            join_key: specs.join_key,
            value_type,
        })
    }
}

impl TryFrom<FeatureSpecV2Proto> for Field {
    type Error = Error;

    fn try_from(feature_spec_proto: FeatureSpecV2Proto) -> Result<Self> {
        let value_type = ValueTypeEnum::try_from(feature_spec_proto.value_type).map_err(|e| {
            anyhow!(
                "Invalid value type {} for feature {}: {}",
                feature_spec_proto.value_type,
                feature_spec_proto.name,
                e
            )
        })?;
        Ok(Field {
            name: feature_spec_proto.name,
            value_type,
        })
    }
}

impl TryFrom<RegistryProto> for FeatureRegistry {
    type Error = Error;

    fn try_from(registry_proto: RegistryProto) -> Result<Self> {
        let entities = registry_proto
            .entities
            .into_iter()
            .map(|e| {
                let entity = Entity::try_from(e)?;
                Ok((project_key(&entity.project, &entity.name), entity))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        let feature_views = registry_proto
            .feature_views
            .into_iter()
            .map(|fv| {
                let feature_view = FeatureView::from_proto(fv, &entities)?;
                Ok((
                    project_key(&feature_view.project, &feature_view.name),
                    Arc::new(feature_view),
                ))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        let on_demand_feature_views = registry_proto
            .on_demand_feature_views
            .into_iter()
            .map(|odfv| {
                let on_demand_feature_view = OnDemandFeatureView::try_from(odfv)?;
                Ok((
                    project_key(
                        &on_demand_feature_view.project,
                        &on_demand_feature_view.name,
                    ),
                    Arc::new(on_demand_feature_view),
                ))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(FeatureRegistry {
            entities,
            feature_views,
            on_demand_feature_views,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feast::core::{DataSource, FeatureViewSpec};
    use crate::source::{FileSource, TabularSourceDescriptor};

    #[test]
    fn parse_feature_ref() -> Result<()> {
        let feature = FeatureRef::try_from("driver_hourly_stats:conv_rate")?;
        assert_eq!(feature.feature_view_name, "driver_hourly_stats");
        assert_eq!(feature.feature_name, "conv_rate");
        assert_eq!(feature.full_name(), "driver_hourly_stats__conv_rate");
        assert_eq!(feature.output_name(false), "conv_rate");
        assert_eq!(feature.to_string(), "driver_hourly_stats:conv_rate");
        Ok(())
    }

    #[test]
    fn reject_feature_ref_without_view() {
        for reference in ["conv_rate", ":conv_rate", "driver_hourly_stats:"] {
            let err = FeatureRef::try_from(reference).unwrap_err();
            assert_eq!(
                err.downcast_ref::<FeastCoreError>(),
                Some(&FeastCoreError::invalid_feature_ref(reference))
            );
        }
    }

    fn batch_source() -> Result<DataSource> {
        FileSource::new(TabularSourceDescriptor::new(
            "data/driver_stats.parquet",
            "event_timestamp",
        ))
        .to_proto()
    }

    #[test]
    fn feature_view_join_keys_come_from_entities() -> Result<()> {
        let entities = HashMap::from([(
            project_key("driver_ranking", "driver"),
            Entity {
                name: "driver".to_string(),
                project: "driver_ranking".to_string(),
                join_key: "driver_id".to_string(),
                value_type: ValueTypeEnum::Int64,
            },
        )]);
        let proto = FeatureViewProto {
            spec: Some(FeatureViewSpec {
                name: "driver_hourly_stats".to_string(),
                project: "driver_ranking".to_string(),
                entities: vec!["driver".to_string()],
                features: vec![FeatureSpecV2Proto {
                    name: "conv_rate".to_string(),
                    value_type: ValueTypeEnum::Float as i32,
                    ..Default::default()
                }],
                ttl: Some(prost_types::Duration {
                    seconds: 86_400,
                    nanos: 0,
                }),
                batch_source: Some(batch_source()?),
                ..Default::default()
            }),
            meta: None,
        };
        let view = FeatureView::from_proto(proto, &entities)?;
        assert_eq!(view.join_keys().collect::<Vec<_>>(), vec!["driver_id"]);
        assert_eq!(view.ttl, Some(Duration::days(1)));
        assert!(view.has_feature("conv_rate"));
        assert_eq!(
            view.batch_source.descriptor().path,
            "data/driver_stats.parquet"
        );
        Ok(())
    }

    #[test]
    fn zero_ttl_means_no_expiry() -> Result<()> {
        let proto = FeatureViewProto {
            spec: Some(FeatureViewSpec {
                name: "global_stats".to_string(),
                entities: vec![DUMMY_ENTITY_NAME.to_string()],
                ttl: Some(prost_types::Duration::default()),
                batch_source: Some(batch_source()?),
                ..Default::default()
            }),
            meta: None,
        };
        let view = FeatureView::from_proto(proto, &HashMap::new())?;
        assert_eq!(view.ttl, None);
        assert!(view.is_entity_less());
        Ok(())
    }
}
