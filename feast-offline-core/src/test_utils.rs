//! Fixtures shared by unit tests.

use crate::io::write_parquet;
use anyhow::Result;
use arrow::array::{ArrayRef, TimestampMicrosecondArray};
use arrow::record_batch::RecordBatch;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// UTC timestamp column from seconds since the epoch.
pub(crate) fn timestamps(seconds: &[i64]) -> ArrayRef {
    Arc::new(
        TimestampMicrosecondArray::from(
            seconds.iter().map(|s| s * 1_000_000).collect::<Vec<_>>(),
        )
        .with_timezone("UTC"),
    )
}

pub(crate) fn optional_timestamps(seconds: &[Option<i64>]) -> ArrayRef {
    Arc::new(
        TimestampMicrosecondArray::from(
            seconds
                .iter()
                .map(|s| s.map(|s| s * 1_000_000))
                .collect::<Vec<_>>(),
        )
        .with_timezone("UTC"),
    )
}

pub(crate) fn write_batch(dir: &Path, name: &str, batch: &RecordBatch) -> Result<PathBuf> {
    let path = dir.join(name);
    write_parquet(&path, batch)?;
    Ok(path)
}
