use crate::config::{Provider, RegistryConfig, RegistryType};
use crate::on_demand::TransformRegistry;
use crate::registry::FeatureRegistryService;
use crate::registry::cached_registry::CachedFileRegistry;
use anyhow::{Result, anyhow};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn get_provider(provider_opt: Option<&Provider>, path: &str) -> Provider {
    if let Some(provider) = provider_opt {
        provider.clone()
    } else if path.starts_with("s3://") {
        Provider::AWS
    } else if path.starts_with("gs://") {
        Provider::GCP
    } else {
        Provider::Local
    }
}

/// Builds the registry described by `conf`. Relative registry paths are
/// resolved against `cwd`.
pub async fn get_registry(
    conf: &RegistryConfig,
    provider: Option<&Provider>,
    cwd: Option<&str>,
    transforms: TransformRegistry,
) -> Result<Arc<dyn FeatureRegistryService>> {
    let path_prefix = cwd.unwrap_or("");
    match &conf.registry_type {
        RegistryType::File => match get_provider(provider, conf.path.as_str()) {
            Provider::Local => {
                let mut path_buf = PathBuf::new();
                path_buf.push(path_prefix);
                path_buf.push(conf.path.as_str());
                info!("Loading file registry from {}", path_buf.display());
                CachedFileRegistry::new_local(path_buf, conf.cache_ttl_seconds, transforms).await
            }
            other => Err(anyhow!(
                "Unsupported provider {:?} for file registry, only local registry files can be read",
                other
            )),
        },
        RegistryType::Sql => Err(anyhow!("Only file registry is supported now")),
    }
}
