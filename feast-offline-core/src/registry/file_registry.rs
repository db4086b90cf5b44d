use crate::feast::core::Registry;
use crate::model::{Entity, FeatureRegistry, FeatureView};
use crate::on_demand::{OnDemandFeatureView, TransformRegistry};
use crate::registry::{FeatureRegistryService, LocalRegistry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use prost::Message;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry decoded from a Feast `Registry` protobuf file.
#[derive(Debug, Clone)]
pub struct FileFeatureRegistry {
    path: PathBuf,
    inner: LocalRegistry,
}

impl FileFeatureRegistry {
    pub fn from_proto(path: impl Into<PathBuf>, proto_registry: Registry) -> Result<Self> {
        let registry = FeatureRegistry::try_from(proto_registry)?;
        Ok(Self {
            path: path.into(),
            inner: LocalRegistry::new(registry),
        })
    }

    pub fn from_path(registry_file_path: &Path) -> Result<Self> {
        let buf = fs::read(registry_file_path).with_context(|| {
            format!(
                "Failed to read registry file {}",
                registry_file_path.display()
            )
        })?;
        let registry_proto = Registry::decode(buf.as_slice()).with_context(|| {
            format!(
                "Failed to decode registry file {}",
                registry_file_path.display()
            )
        })?;
        debug!(
            "Loaded registry {} with {} feature views",
            registry_file_path.display(),
            registry_proto.feature_views.len()
        );
        Self::from_proto(registry_file_path, registry_proto)
    }

    /// Attaches in-process transforms to the on-demand feature views they are
    /// keyed by, in every project. Transforms for views absent from the file
    /// are skipped.
    pub fn with_transforms(mut self, transforms: &TransformRegistry) -> Self {
        let odfvs = &mut self.inner.registry_mut().on_demand_feature_views;
        for (name, transform) in transforms {
            let mut attached = false;
            for ((_, odfv_name), odfv) in odfvs.iter_mut() {
                if odfv_name != name {
                    continue;
                }
                let view: OnDemandFeatureView = odfv.as_ref().clone();
                *odfv = Arc::new(view.with_transform(transform.clone()));
                attached = true;
            }
            if !attached {
                warn!(
                    "Transform registered for on-demand feature view {} absent from {}",
                    name,
                    self.path.display()
                );
            }
        }
        self
    }
}

#[async_trait]
impl FeatureRegistryService for FileFeatureRegistry {
    async fn get_entity(&self, name: &str, project: &str) -> Result<Entity> {
        self.inner.get_entity(name, project).await
    }

    async fn get_feature_view(&self, name: &str, project: &str) -> Result<Arc<FeatureView>> {
        self.inner.get_feature_view(name, project).await
    }

    async fn find_on_demand_feature_view(
        &self,
        name: &str,
        project: &str,
    ) -> Result<Option<Arc<OnDemandFeatureView>>> {
        self.inner.find_on_demand_feature_view(name, project).await
    }

    async fn list_feature_views(&self, project: &str) -> Result<Vec<Arc<FeatureView>>> {
        self.inner.list_feature_views(project).await
    }

    async fn list_on_demand_feature_views(
        &self,
        project: &str,
    ) -> Result<Vec<Arc<OnDemandFeatureView>>> {
        self.inner.list_on_demand_feature_views(project).await
    }
}
