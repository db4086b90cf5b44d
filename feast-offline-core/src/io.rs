//! Parquet table I/O and path resolution for file-backed sources.

use anyhow::{Context, Result, anyhow};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use url::Url;

/// Resolves a source path. `file://` URIs are converted to local paths and
/// relative paths are taken relative to the feature repository.
pub fn resolve_path(path: &str, repo_path: Option<&Path>) -> Result<PathBuf> {
    let local = if path.starts_with("file://") {
        let url = Url::parse(path).with_context(|| format!("Invalid file URI {}", path))?;
        url.to_file_path()
            .map_err(|_| anyhow!("File URI {} does not name a local path", path))?
    } else if path.contains("://") {
        return Err(anyhow!(
            "Unsupported URI scheme for {}, only local files are supported",
            path
        ));
    } else {
        PathBuf::from(path)
    };
    match repo_path {
        Some(prefix) if local.is_relative() => Ok(prefix.join(local)),
        _ => Ok(local),
    }
}

pub fn read_parquet_schema(path: &Path) -> Result<SchemaRef> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read parquet metadata of {}", path.display()))?;
    Ok(builder.schema().clone())
}

/// Reads every row group of a parquet file into one batch. The file handle
/// is dropped before returning.
pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read parquet metadata of {}", path.display()))?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(concat_batches(&schema, &batches)?)
}

pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array};
    use std::sync::Arc;

    #[test]
    fn relative_paths_join_repo_path() -> Result<()> {
        let resolved = resolve_path("data/driver.parquet", Some(Path::new("/repo")))?;
        assert_eq!(resolved, PathBuf::from("/repo/data/driver.parquet"));
        let absolute = resolve_path("/data/driver.parquet", Some(Path::new("/repo")))?;
        assert_eq!(absolute, PathBuf::from("/data/driver.parquet"));
        Ok(())
    }

    #[test]
    fn file_uris_become_local_paths() -> Result<()> {
        let resolved = resolve_path("file:///data/driver.parquet", None)?;
        assert_eq!(resolved, PathBuf::from("/data/driver.parquet"));
        assert!(resolve_path("s3://bucket/driver.parquet", None).is_err());
        Ok(())
    }

    #[test]
    fn write_then_read_preserves_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested/ids.parquet");
        let batch = RecordBatch::try_from_iter(vec![(
            "driver_id",
            Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
        )])?;
        write_parquet(&path, &batch)?;
        let read = read_parquet(&path)?;
        assert_eq!(read.num_rows(), 3);
        assert_eq!(read.columns(), batch.columns());
        assert_eq!(read_parquet_schema(&path)?.fields().len(), 1);
        Ok(())
    }

    #[test]
    fn missing_file_names_path() {
        let err = read_parquet(Path::new("/nonexistent/driver.parquet")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/driver.parquet"));
    }
}
