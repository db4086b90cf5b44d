use crate::error::FeastCoreError;
use crate::source::SourceKind;
use anyhow::{Result, anyhow};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

pub const FILE_OFFLINE_STORE_TYPE: &str = "file";
pub const CUSTOM_FILE_OFFLINE_STORE_TYPE: &str = "custom_file";
pub const CUSTOM_FILE_OFFLINE_STORE_CLASS: &str =
    "feast_custom_offline_store.file.CustomFileOfflineStore";

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Provider {
    Local,
    AWS,
    GCP,
    Unknown(String),
}

impl Serialize for Provider {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Provider::Local => serializer.serialize_str("local"),
            Provider::AWS => serializer.serialize_str("aws"),
            Provider::GCP => serializer.serialize_str("gcp"),
            Provider::Unknown(other) => serializer.serialize_str(other.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let normalized = value.to_ascii_lowercase();
        let provider = match normalized.as_str() {
            "local" => Provider::Local,
            "aws" => Provider::AWS,
            "gcp" => Provider::GCP,
            _ => Provider::Unknown(value),
        };
        Ok(provider)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryType {
    #[default]
    File,
    Sql,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RegistryConfigDef")]
pub struct RegistryConfig {
    pub path: String,
    pub cache_ttl_seconds: Option<u64>,
    pub registry_type: RegistryType,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum RegistryConfigDef {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        cache_ttl_seconds: Option<u64>,
        #[serde(default)]
        registry_type: Option<RegistryType>,
    },
}

impl From<RegistryConfigDef> for RegistryConfig {
    fn from(value: RegistryConfigDef) -> Self {
        match value {
            RegistryConfigDef::Path(path) => RegistryConfig {
                path,
                ..Default::default()
            },
            RegistryConfigDef::Detailed {
                path,
                cache_ttl_seconds,
                registry_type,
            } => RegistryConfig {
                path,
                cache_ttl_seconds,
                registry_type: registry_type.unwrap_or_default(),
            },
        }
    }
}

/// Selects the offline store implementation together with the tabular source
/// implementation it creates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OfflineStoreConfigDef", into = "OfflineStoreConfigDef")]
pub enum OfflineStoreConfig {
    #[default]
    File,
    CustomFile,
}

impl OfflineStoreConfig {
    pub fn store_type(&self) -> &'static str {
        match self {
            OfflineStoreConfig::File => FILE_OFFLINE_STORE_TYPE,
            OfflineStoreConfig::CustomFile => CUSTOM_FILE_OFFLINE_STORE_TYPE,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            OfflineStoreConfig::File => SourceKind::File,
            OfflineStoreConfig::CustomFile => SourceKind::CustomFile,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct OfflineStoreConfigDef {
    #[serde(rename = "type")]
    store_type: String,
}

impl TryFrom<OfflineStoreConfigDef> for OfflineStoreConfig {
    type Error = FeastCoreError;

    fn try_from(value: OfflineStoreConfigDef) -> Result<Self, Self::Error> {
        match value.store_type.as_str() {
            FILE_OFFLINE_STORE_TYPE => Ok(OfflineStoreConfig::File),
            CUSTOM_FILE_OFFLINE_STORE_TYPE | CUSTOM_FILE_OFFLINE_STORE_CLASS => {
                Ok(OfflineStoreConfig::CustomFile)
            }
            other => Err(FeastCoreError::unknown_store_type(other)),
        }
    }
}

impl From<OfflineStoreConfig> for OfflineStoreConfigDef {
    fn from(value: OfflineStoreConfig) -> Self {
        OfflineStoreConfigDef {
            store_type: value.store_type().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RepoConfig {
    pub project: String,
    pub project_description: Option<String>,
    pub provider: Option<Provider>,
    pub registry: RegistryConfig,
    pub offline_store: OfflineStoreConfig,
}

#[derive(Clone, Debug, Deserialize)]
struct RepoConfigDef {
    project: String,
    #[serde(default)]
    project_description: Option<String>,
    #[serde(default)]
    provider: Option<Provider>,
    registry: RegistryConfig,
    #[serde(default)]
    offline_store: Option<OfflineStoreConfigDef>,
}

impl RepoConfig {
    /// Parses `feature_store.yaml`. The offline store discriminant is checked
    /// here so that a bad `type` fails before any store is built.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Err(anyhow!("Empty configuration file"));
        }
        let def: RepoConfigDef = serde_saphyr::from_str(yaml).map_err(|err| anyhow!(err))?;
        let offline_store = def
            .offline_store
            .map(OfflineStoreConfig::try_from)
            .transpose()?
            .unwrap_or_default();
        Ok(RepoConfig {
            project: def.project,
            project_description: def.project_description,
            provider: def.provider,
            registry: def.registry,
            offline_store,
        })
    }
}
