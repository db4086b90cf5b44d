//! Tabular sources describe where the batch data of a feature view lives and
//! how that description travels through the registry.

mod custom_file_source;
mod file_source;

pub use custom_file_source::CustomFileSource;
pub use file_source::FileSource;

use crate::error::FeastCoreError;
use crate::feast::core::DataSource as DataSourceProto;
use crate::feast::core::data_source::Options as DataSourceOptions;
use crate::io;
use anyhow::{Context, Result};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use prost::Message;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    File,
    CustomFile,
}

/// Path and column roles shared by every file-backed source.
///
/// Column names in `event_timestamp_column`, `created_timestamp_column` and
/// `date_partition_column` refer to the columns after `field_mapping` has
/// been applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularSourceDescriptor {
    pub path: String,
    pub event_timestamp_column: String,
    pub created_timestamp_column: Option<String>,
    pub date_partition_column: Option<String>,
    pub field_mapping: HashMap<String, String>,
}

impl TabularSourceDescriptor {
    pub fn new(path: impl Into<String>, event_timestamp_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            event_timestamp_column: event_timestamp_column.into(),
            ..Default::default()
        }
    }

    pub fn with_created_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.created_timestamp_column = Some(column.into());
        self
    }

    pub fn with_date_partition_column(mut self, column: impl Into<String>) -> Self {
        self.date_partition_column = Some(column.into());
        self
    }

    pub fn with_field_mapping(mut self, field_mapping: HashMap<String, String>) -> Self {
        self.field_mapping = field_mapping;
        self
    }

    /// Name of a source column once the field mapping is applied.
    pub fn mapped_name<'a>(&'a self, column: &'a str) -> &'a str {
        self.field_mapping
            .get(column)
            .map(String::as_str)
            .unwrap_or(column)
    }

    fn envelope(&self) -> DataSourceProto {
        DataSourceProto {
            field_mapping: self.field_mapping.clone(),
            event_timestamp_column: self.event_timestamp_column.clone(),
            created_timestamp_column: self.created_timestamp_column.clone().unwrap_or_default(),
            date_partition_column: self.date_partition_column.clone().unwrap_or_default(),
            ..Default::default()
        }
    }

    fn from_envelope(proto: &DataSourceProto, path: String) -> Result<Self> {
        if path.is_empty() {
            return Err(FeastCoreError::malformed_descriptor("data source has no path").into());
        }
        Ok(Self {
            path,
            event_timestamp_column: proto.event_timestamp_column.clone(),
            created_timestamp_column: non_empty(&proto.created_timestamp_column),
            date_partition_column: non_empty(&proto.date_partition_column),
            field_mapping: proto.field_mapping.clone(),
        })
    }

    fn mapped_schema(&self, schema: &Schema) -> Schema {
        let fields = schema
            .fields()
            .iter()
            .map(|field| {
                field
                    .as_ref()
                    .clone()
                    .with_name(self.mapped_name(field.name()))
            })
            .collect::<Vec<_>>();
        Schema::new_with_metadata(fields, schema.metadata().clone())
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub trait TabularSource: Send + Sync + fmt::Debug {
    fn kind(&self) -> SourceKind;

    fn descriptor(&self) -> &TabularSourceDescriptor;

    /// Encodes the source into the registry's `DataSource` envelope.
    fn to_proto(&self) -> Result<DataSourceProto>;

    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.to_proto()?.encode_to_vec())
    }

    /// Files have no query language.
    fn get_query_representation(&self) -> Option<String> {
        None
    }

    /// Column names of the underlying file after field mapping. Only the
    /// file footer is read.
    fn describe_schema(&self, repo_path: Option<&Path>) -> Result<Vec<String>> {
        let descriptor = self.descriptor();
        let path = io::resolve_path(&descriptor.path, repo_path)?;
        let schema = io::read_parquet_schema(&path)?;
        Ok(descriptor
            .mapped_schema(&schema)
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect())
    }

    fn validate(&self, repo_path: Option<&Path>) -> Result<()> {
        let descriptor = self.descriptor();
        let columns = self.describe_schema(repo_path)?;
        if !columns.contains(&descriptor.event_timestamp_column) {
            return Err(FeastCoreError::schema_mismatch(
                None,
                descriptor.event_timestamp_column.clone(),
                descriptor.path.clone(),
            )
            .into());
        }
        Ok(())
    }

    /// Reads the whole file with the field mapping applied.
    fn load(&self, repo_path: Option<&Path>) -> Result<RecordBatch> {
        let descriptor = self.descriptor();
        let path = io::resolve_path(&descriptor.path, repo_path)?;
        debug!("Loading source {}", path.display());
        let batch = io::read_parquet(&path)?;
        if descriptor.field_mapping.is_empty() {
            return Ok(batch);
        }
        let schema = descriptor.mapped_schema(batch.schema().as_ref());
        RecordBatch::try_new(Arc::new(schema), batch.columns().to_vec())
            .with_context(|| format!("Failed to apply field mapping to {}", descriptor.path))
    }
}

/// Decodes a serialized `DataSource` and builds the matching source
/// implementation.
pub fn deserialize(payload: &[u8]) -> Result<Arc<dyn TabularSource>> {
    let proto = DataSourceProto::decode(payload)
        .map_err(|e| FeastCoreError::malformed_descriptor(e.to_string()))?;
    from_proto(proto)
}

pub fn from_proto(proto: DataSourceProto) -> Result<Arc<dyn TabularSource>> {
    match &proto.options {
        Some(DataSourceOptions::FileOptions(_)) => {
            Ok(Arc::new(FileSource::from_proto(proto)?) as Arc<dyn TabularSource>)
        }
        Some(DataSourceOptions::CustomOptions(_)) => {
            Ok(Arc::new(CustomFileSource::from_proto(proto)?) as Arc<dyn TabularSource>)
        }
        None => Err(FeastCoreError::malformed_descriptor("data source has no options").into()),
    }
}

/// Wraps a descriptor into the source implementation of the given kind.
pub fn from_descriptor(
    kind: SourceKind,
    descriptor: TabularSourceDescriptor,
) -> Arc<dyn TabularSource> {
    match kind {
        SourceKind::File => Arc::new(FileSource::new(descriptor)),
        SourceKind::CustomFile => Arc::new(CustomFileSource::new(descriptor)),
    }
}
