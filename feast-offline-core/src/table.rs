//! Row-oriented view of a materialized result.

use anyhow::{Context, Result, anyhow};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, UInt64Type};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::util::{is_temporal, timestamp_micros};

/// A single cell. Integer widths collapse to `Int`, float widths to `Float`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowTable {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|values| values.get(index))
    }

}

/// One row serialized as a map in column order.
struct Record<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for Record<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl RowTable {
    /// One JSON object per row, keys in column order.
    pub fn to_json_lines(&self) -> Result<Vec<String>> {
        self.rows
            .iter()
            .map(|values| {
                serde_json::to_string(&Record {
                    columns: &self.columns,
                    values,
                })
                .map_err(Into::into)
            })
            .collect()
    }
}

impl TryFrom<&RecordBatch> for RowTable {
    type Error = anyhow::Error;

    fn try_from(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let columns = schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect::<Vec<_>>();
        let column_values = batch
            .columns()
            .iter()
            .zip(columns.iter())
            .map(|(array, name)| {
                column_values(array).with_context(|| format!("Failed to convert column {}", name))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut rows = vec![Vec::with_capacity(columns.len()); batch.num_rows()];
        for values in column_values {
            for (row, value) in rows.iter_mut().zip(values) {
                row.push(value);
            }
        }
        Ok(RowTable { columns, rows })
    }
}

fn column_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let data_type = array.data_type();
    let values = match data_type {
        DataType::Null => vec![Value::Null; array.len()],
        DataType::Boolean => array
            .as_boolean()
            .iter()
            .map(|v| v.map_or(Value::Null, Value::Bool))
            .collect(),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => cast(array, &DataType::Int64)?
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map_or(Value::Null, Value::Int))
            .collect(),
        DataType::UInt64 => array
            .as_primitive::<UInt64Type>()
            .iter()
            .map(|v| match v {
                None => Ok(Value::Null),
                Some(v) => i64::try_from(v)
                    .map(Value::Int)
                    .map_err(|_| anyhow!("Value {} does not fit into i64", v)),
            })
            .collect::<Result<Vec<_>>>()?,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            cast(array, &DataType::Float64)?
                .as_primitive::<Float64Type>()
                .iter()
                .map(|v| v.map_or(Value::Null, Value::Float))
                .collect()
        }
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            cast(array, &DataType::Utf8)?
                .as_string::<i32>()
                .iter()
                .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string())))
                .collect()
        }
        DataType::Binary | DataType::LargeBinary => cast(array, &DataType::Binary)?
            .as_binary::<i32>()
            .iter()
            .map(|v| v.map_or(Value::Null, |b| Value::Bytes(b.to_vec())))
            .collect(),
        DataType::List(_) => list_values(array.as_list::<i32>().iter())?,
        DataType::LargeList(_) => list_values(array.as_list::<i64>().iter())?,
        DataType::FixedSizeList(_, _) => list_values(array.as_fixed_size_list().iter())?,
        other if is_temporal(other) => timestamp_micros(array)?
            .into_iter()
            .map(|v| {
                v.and_then(DateTime::<Utc>::from_timestamp_micros)
                    .map_or(Value::Null, Value::Timestamp)
            })
            .collect(),
        other => return Err(anyhow!("Unsupported column type {}", other)),
    };
    Ok(values)
}

fn list_values(lists: impl Iterator<Item = Option<ArrayRef>>) -> Result<Vec<Value>> {
    lists
        .map(|list| match list {
            None => Ok(Value::Null),
            Some(items) => column_values(&items).map(Value::List),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::timestamps;
    use arrow::array::{FixedSizeListArray, Float32Array, Int32Array, ListArray, StringArray};
    use arrow::datatypes::Field as ArrowField;
    use std::sync::Arc;

    #[test]
    fn record_batch_to_rows() -> Result<()> {
        let batch = RecordBatch::try_from_iter(vec![
            (
                "driver_id",
                Arc::new(Int32Array::from(vec![1001, 1002])) as ArrayRef,
            ),
            (
                "conv_rate",
                Arc::new(Float32Array::from(vec![Some(0.5), None])) as ArrayRef,
            ),
            (
                "city",
                Arc::new(StringArray::from(vec!["Paris", "Oslo"])) as ArrayRef,
            ),
            ("event_timestamp", timestamps(&[95, 101])),
        ])?;
        let table = RowTable::try_from(&batch)?;
        assert_eq!(table.num_rows(), 2);
        assert_eq!(
            table.columns,
            vec!["driver_id", "conv_rate", "city", "event_timestamp"]
        );
        assert_eq!(table.get(0, "driver_id"), Some(&Value::Int(1001)));
        assert_eq!(table.get(0, "conv_rate"), Some(&Value::Float(0.5)));
        assert_eq!(table.get(1, "conv_rate"), Some(&Value::Null));
        assert_eq!(
            table.get(1, "city"),
            Some(&Value::String("Oslo".to_string()))
        );
        assert_eq!(
            table.get(0, "event_timestamp"),
            DateTime::<Utc>::from_timestamp(95, 0)
                .map(Value::Timestamp)
                .as_ref()
        );
        Ok(())
    }

    #[test]
    fn list_columns_become_nested_values() -> Result<()> {
        let trips = ListArray::from_iter_primitive::<Int64Type, _, _>(vec![
            Some(vec![Some(1), Some(2)]),
            None,
            Some(vec![]),
        ]);
        let names = FixedSizeListArray::try_new(
            Arc::new(ArrowField::new("item", DataType::Utf8, true)),
            1,
            Arc::new(StringArray::from(vec!["a", "b", "c"])),
            None,
        )?;
        let batch = RecordBatch::try_from_iter(vec![
            ("trips", Arc::new(trips) as ArrayRef),
            ("names", Arc::new(names) as ArrayRef),
        ])?;
        let table = RowTable::try_from(&batch)?;
        assert_eq!(
            table.get(0, "trips"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert_eq!(table.get(1, "trips"), Some(&Value::Null));
        assert_eq!(table.get(2, "trips"), Some(&Value::List(vec![])));
        assert_eq!(
            table.get(2, "names"),
            Some(&Value::List(vec![Value::String("c".to_string())]))
        );
        assert_eq!(
            table.to_json_lines()?[0],
            r#"{"trips":[1,2],"names":["a"]}"#
        );
        Ok(())
    }

    #[test]
    fn json_lines_keep_column_order() -> Result<()> {
        let table = RowTable {
            columns: vec!["driver_id".to_string(), "acc_rate".to_string()],
            rows: vec![
                vec![Value::Int(7), Value::Float(0.5)],
                vec![Value::Int(8), Value::Null],
            ],
        };
        assert_eq!(
            table.to_json_lines()?,
            vec![
                r#"{"driver_id":7,"acc_rate":0.5}"#,
                r#"{"driver_id":8,"acc_rate":null}"#
            ]
        );
        Ok(())
    }
}
