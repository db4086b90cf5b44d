use crate::error::FeastCoreError;
use crate::feast::core::DataSource as DataSourceProto;
use crate::feast::core::data_source::{CustomSourceOptions, Options, SourceType};
use crate::source::{SourceKind, TabularSource, TabularSourceDescriptor};
use anyhow::Result;
use prost::Message;
use serde::{Deserialize, Serialize};

const CUSTOM_FILE_SOURCE_CLASS_TYPE: &str = "feast_custom_offline_store.file.CustomFileDataSource";

/// JSON document stored in `custom_options.configuration`. Keys other than
/// `path` are ignored when reading.
#[derive(Debug, Serialize, Deserialize)]
struct CustomFileOptions {
    path: String,
}

/// File source whose location is carried as a self-describing JSON payload
/// inside the generic custom-source envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFileSource {
    descriptor: TabularSourceDescriptor,
}

impl CustomFileSource {
    pub fn new(descriptor: TabularSourceDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn from_proto(proto: DataSourceProto) -> Result<Self> {
        let configuration = match &proto.options {
            Some(Options::CustomOptions(options)) => options.configuration.as_slice(),
            _ => {
                return Err(FeastCoreError::malformed_descriptor(
                    "custom file source without custom options",
                )
                .into());
            }
        };
        let options: CustomFileOptions = serde_json::from_slice(configuration).map_err(|e| {
            FeastCoreError::malformed_descriptor(format!("invalid custom source configuration: {}", e))
        })?;
        let descriptor = TabularSourceDescriptor::from_envelope(&proto, options.path)?;
        Ok(Self { descriptor })
    }

    pub fn deserialize(payload: &[u8]) -> Result<Self> {
        let proto = DataSourceProto::decode(payload)
            .map_err(|e| FeastCoreError::malformed_descriptor(e.to_string()))?;
        Self::from_proto(proto)
    }
}

impl TabularSource for CustomFileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CustomFile
    }

    fn descriptor(&self) -> &TabularSourceDescriptor {
        &self.descriptor
    }

    fn to_proto(&self) -> Result<DataSourceProto> {
        let configuration = serde_json::to_vec(&CustomFileOptions {
            path: self.descriptor.path.clone(),
        })?;
        let mut proto = self.descriptor.envelope();
        proto.set_type(SourceType::CustomSource);
        proto.data_source_class_type = CUSTOM_FILE_SOURCE_CLASS_TYPE.to_string();
        proto.options = Some(Options::CustomOptions(CustomSourceOptions { configuration }));
        Ok(proto)
    }
}
