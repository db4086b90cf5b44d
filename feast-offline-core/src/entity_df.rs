use crate::error::FeastCoreError;
use crate::util::is_temporal;
use anyhow::{Result, anyhow};
use arrow::record_batch::RecordBatch;

pub const DEFAULT_ENTITY_DF_EVENT_TIMESTAMP_COL: &str = "event_timestamp";

pub(crate) const ENTITY_DF_LABEL: &str = "entity dataframe";

/// Left side of a historical retrieval: entity keys plus the timestamp each
/// row is evaluated at.
#[derive(Debug, Clone)]
pub struct EntityDataFrame {
    batch: RecordBatch,
    event_timestamp_column: String,
}

impl EntityDataFrame {
    pub fn new(batch: RecordBatch, event_timestamp_column: impl Into<String>) -> Result<Self> {
        let event_timestamp_column = event_timestamp_column.into();
        let (_, field) = batch
            .schema_ref()
            .column_with_name(&event_timestamp_column)
            .map(|(i, f)| (i, f.clone()))
            .ok_or_else(|| {
                FeastCoreError::schema_mismatch(
                    None,
                    event_timestamp_column.clone(),
                    ENTITY_DF_LABEL,
                )
            })?;
        if !is_temporal(field.data_type()) {
            return Err(anyhow!(
                "Entity dataframe column {} has type {}, expected a timestamp",
                event_timestamp_column,
                field.data_type()
            ));
        }
        Ok(Self {
            batch,
            event_timestamp_column,
        })
    }

    /// Uses `event_timestamp` when present, otherwise the only timestamp
    /// column of the batch.
    pub fn infer(batch: RecordBatch) -> Result<Self> {
        if batch
            .schema_ref()
            .column_with_name(DEFAULT_ENTITY_DF_EVENT_TIMESTAMP_COL)
            .is_some()
        {
            return Self::new(batch, DEFAULT_ENTITY_DF_EVENT_TIMESTAMP_COL);
        }
        let candidates = batch
            .schema_ref()
            .fields()
            .iter()
            .filter(|field| is_temporal(field.data_type()))
            .map(|field| field.name().clone())
            .collect::<Vec<_>>();
        match candidates.as_slice() {
            [column] => {
                let column = column.clone();
                Self::new(batch, column)
            }
            [] => Err(FeastCoreError::schema_mismatch(
                None,
                DEFAULT_ENTITY_DF_EVENT_TIMESTAMP_COL,
                ENTITY_DF_LABEL,
            )
            .into()),
            many => Err(anyhow!(
                "Entity dataframe has several timestamp columns [{}], name the event timestamp column explicitly",
                many.join(", ")
            )),
        }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn event_timestamp_column(&self) -> &str {
        &self.event_timestamp_column
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Fails with a schema mismatch naming the entity dataframe.
    pub(crate) fn require_column(&self, column: &str) -> Result<()> {
        if self.batch.schema_ref().column_with_name(column).is_none() {
            return Err(FeastCoreError::schema_mismatch(None, column, ENTITY_DF_LABEL).into());
        }
        Ok(())
    }
}
