use crate::error::FeastCoreError;
use crate::model::{Entity, FeatureRegistry, FeatureView, project_key};
use crate::on_demand::OnDemandFeatureView;
use crate::registry::FeatureRegistryService;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;

/// Registry held entirely in memory, built in code or decoded from a
/// registry file.
#[derive(Debug, Clone, Default)]
pub struct LocalRegistry {
    registry: FeatureRegistry,
}

impl LocalRegistry {
    pub fn new(feature_registry: FeatureRegistry) -> Self {
        Self {
            registry: feature_registry,
        }
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.registry
            .entities
            .insert(project_key(&entity.project, &entity.name), entity);
        self
    }

    pub fn with_feature_view(mut self, feature_view: FeatureView) -> Self {
        self.registry
            .feature_views
            .insert(
                project_key(&feature_view.project, &feature_view.name),
                Arc::new(feature_view),
            );
        self
    }

    pub fn with_on_demand_feature_view(mut self, odfv: OnDemandFeatureView) -> Self {
        self.registry
            .on_demand_feature_views
            .insert(project_key(&odfv.project, &odfv.name), Arc::new(odfv));
        self
    }

    pub(crate) fn registry_mut(&mut self) -> &mut FeatureRegistry {
        &mut self.registry
    }
}

#[async_trait]
impl FeatureRegistryService for LocalRegistry {
    async fn get_entity(&self, name: &str, project: &str) -> Result<Entity> {
        self.registry
            .entities
            .get(&project_key(project, name))
            .cloned()
            .ok_or_else(|| anyhow!("Entity {} not found in project {}", name, project))
    }

    async fn get_feature_view(&self, name: &str, project: &str) -> Result<Arc<FeatureView>> {
        self.registry
            .feature_views
            .get(&project_key(project, name))
            .cloned()
            .ok_or_else(|| FeastCoreError::unknown_feature_view_in_project(name, project).into())
    }

    async fn find_on_demand_feature_view(
        &self,
        name: &str,
        project: &str,
    ) -> Result<Option<Arc<OnDemandFeatureView>>> {
        Ok(self
            .registry
            .on_demand_feature_views
            .get(&project_key(project, name))
            .cloned())
    }

    async fn list_feature_views(&self, project: &str) -> Result<Vec<Arc<FeatureView>>> {
        let mut views = self
            .registry
            .feature_views
            .values()
            .filter(|view| view.project == project)
            .cloned()
            .collect::<Vec<_>>();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    async fn list_on_demand_feature_views(
        &self,
        project: &str,
    ) -> Result<Vec<Arc<OnDemandFeatureView>>> {
        let mut views = self
            .registry
            .on_demand_feature_views
            .values()
            .filter(|view| view.project == project)
            .cloned()
            .collect::<Vec<_>>();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }
}
