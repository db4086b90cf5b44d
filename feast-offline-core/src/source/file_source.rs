use crate::error::FeastCoreError;
use crate::feast::core::DataSource as DataSourceProto;
use crate::feast::core::data_source::{FileOptions, Options, SourceType};
use crate::source::{SourceKind, TabularSource, TabularSourceDescriptor};
use anyhow::Result;
use prost::Message;

const FILE_SOURCE_CLASS_TYPE: &str = "feast.infra.offline_stores.file_source.FileSource";

/// Built-in file source: the path travels in `file_options.file_url`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    descriptor: TabularSourceDescriptor,
}

impl FileSource {
    pub fn new(descriptor: TabularSourceDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn from_proto(proto: DataSourceProto) -> Result<Self> {
        let path = match &proto.options {
            Some(Options::FileOptions(options)) => options.file_url.clone(),
            _ => {
                return Err(FeastCoreError::malformed_descriptor(
                    "file source without file options",
                )
                .into());
            }
        };
        let descriptor = TabularSourceDescriptor::from_envelope(&proto, path)?;
        Ok(Self { descriptor })
    }

    pub fn deserialize(payload: &[u8]) -> Result<Self> {
        let proto = DataSourceProto::decode(payload)
            .map_err(|e| FeastCoreError::malformed_descriptor(e.to_string()))?;
        Self::from_proto(proto)
    }
}

impl TabularSource for FileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn descriptor(&self) -> &TabularSourceDescriptor {
        &self.descriptor
    }

    fn to_proto(&self) -> Result<DataSourceProto> {
        let mut proto = self.descriptor.envelope();
        proto.set_type(SourceType::BatchFile);
        proto.data_source_class_type = FILE_SOURCE_CLASS_TYPE.to_string();
        proto.options = Some(Options::FileOptions(FileOptions {
            file_url: self.descriptor.path.clone(),
            ..Default::default()
        }));
        Ok(proto)
    }
}
