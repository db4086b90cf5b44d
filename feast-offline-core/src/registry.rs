//! Registry module for looking up feature views, entities and on-demand
//! feature views by name and project.

use crate::model::{Entity, FeatureRef, FeatureView};
use crate::on_demand::OnDemandFeatureView;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

mod cached_registry;
mod feature_registry;
pub mod file_registry;
pub mod local_registry;

pub use feature_registry::get_registry;
pub use file_registry::FileFeatureRegistry;
pub use local_registry::LocalRegistry;

#[async_trait]
pub trait FeatureRegistryService: Send + Sync {
    async fn get_entity(&self, name: &str, project: &str) -> Result<Entity>;

    /// Fails with `FeastCoreError::UnknownFeatureView` when `project` has no
    /// feature view called `name`.
    async fn get_feature_view(&self, name: &str, project: &str) -> Result<Arc<FeatureView>>;

    /// `None` when `project` has no on-demand feature view called `name`.
    async fn find_on_demand_feature_view(
        &self,
        name: &str,
        project: &str,
    ) -> Result<Option<Arc<OnDemandFeatureView>>>;

    async fn list_feature_views(&self, project: &str) -> Result<Vec<Arc<FeatureView>>>;

    async fn list_on_demand_feature_views(
        &self,
        project: &str,
    ) -> Result<Vec<Arc<OnDemandFeatureView>>>;
}

/// Views referenced by a feature request, split by kind.
#[derive(Debug, Default)]
pub struct ResolvedViews {
    pub feature_views: Vec<Arc<FeatureView>>,
    pub on_demand_feature_views: Vec<Arc<OnDemandFeatureView>>,
}

/// Resolves every view named by `refs`, plus the feature views on-demand
/// views read from. A name that is neither kind of view in `project` fails
/// as an unknown feature view.
pub async fn resolve_views(
    registry: &dyn FeatureRegistryService,
    refs: &[FeatureRef],
    project: &str,
) -> Result<ResolvedViews> {
    let mut resolved = ResolvedViews::default();
    let mut seen = HashSet::new();
    let mut pending = refs
        .iter()
        .map(|r| r.feature_view_name.clone())
        .collect::<Vec<_>>();
    pending.reverse();
    while let Some(name) = pending.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        if let Some(odfv) = registry.find_on_demand_feature_view(&name, project).await? {
            pending.extend(
                odfv.sources
                    .iter()
                    .rev()
                    .map(|source| source.feature_view_name.clone()),
            );
            resolved.on_demand_feature_views.push(odfv);
            continue;
        }
        resolved
            .feature_views
            .push(registry.get_feature_view(&name, project).await?);
    }
    Ok(resolved)
}
