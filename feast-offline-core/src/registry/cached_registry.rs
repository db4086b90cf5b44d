use crate::model::{Entity, FeatureView};
use crate::on_demand::{OnDemandFeatureView, TransformRegistry};
use crate::registry::{FeatureRegistryService, FileFeatureRegistry};
use anyhow::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// File registry that is re-read every `cache_ttl_seconds`. A failed reload
/// keeps serving the previous contents.
pub struct CachedFileRegistry {
    inner: Arc<ArcSwap<FileFeatureRegistry>>,
    refresh_task: Option<JoinHandle<()>>,
}

impl CachedFileRegistry {
    pub async fn new_local(
        path: PathBuf,
        cache_ttl_seconds: Option<u64>,
        transforms: TransformRegistry,
    ) -> Result<Arc<dyn FeatureRegistryService>> {
        let transforms = Arc::new(transforms);
        let registry = load(path.clone(), transforms.clone()).await?;
        let mut result = Self {
            inner: Arc::new(ArcSwap::from_pointee(registry)),
            refresh_task: None,
        };
        if let Some(ttl) = cache_ttl_seconds.filter(|ttl| *ttl > 0) {
            result.start_refresh_task(path, transforms, ttl);
        }
        Ok(Arc::new(result))
    }

    fn start_refresh_task(&mut self, path: PathBuf, transforms: Arc<TransformRegistry>, ttl: u64) {
        let inner = self.inner.clone();
        self.refresh_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(ttl));
            interval.tick().await;
            loop {
                interval.tick().await;
                match load(path.clone(), transforms.clone()).await {
                    Ok(registry) => {
                        debug!("Refreshed registry {}", path.display());
                        inner.store(Arc::new(registry));
                    }
                    Err(err) => warn!("Failed to refresh registry {}: {:#}", path.display(), err),
                }
            }
        }));
    }

    fn current(&self) -> Arc<FileFeatureRegistry> {
        self.inner.load_full()
    }
}

impl Drop for CachedFileRegistry {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
    }
}

async fn load(path: PathBuf, transforms: Arc<TransformRegistry>) -> Result<FileFeatureRegistry> {
    tokio::task::spawn_blocking(move || -> Result<FileFeatureRegistry> {
        Ok(FileFeatureRegistry::from_path(&path)?.with_transforms(&transforms))
    })
    .await?
}

#[async_trait]
impl FeatureRegistryService for CachedFileRegistry {
    async fn get_entity(&self, name: &str, project: &str) -> Result<Entity> {
        self.current().get_entity(name, project).await
    }

    async fn get_feature_view(&self, name: &str, project: &str) -> Result<Arc<FeatureView>> {
        self.current().get_feature_view(name, project).await
    }

    async fn find_on_demand_feature_view(
        &self,
        name: &str,
        project: &str,
    ) -> Result<Option<Arc<OnDemandFeatureView>>> {
        self.current()
            .find_on_demand_feature_view(name, project)
            .await
    }

    async fn list_feature_views(&self, project: &str) -> Result<Vec<Arc<FeatureView>>> {
        self.current().list_feature_views(project).await
    }

    async fn list_on_demand_feature_views(
        &self,
        project: &str,
    ) -> Result<Vec<Arc<OnDemandFeatureView>>> {
        self.current().list_on_demand_feature_views(project).await
    }
}
