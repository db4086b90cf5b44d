//! Row selection kernels behind `pull_latest` and the historical join. Both
//! work on keys encoded with `arrow::row` and return `take` indices.

use anyhow::{Result, anyhow};
use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::row::{Row, RowConverter, Rows, SortField};
use rustc_hash::FxHashMap;

/// Event timestamps of source rows plus the optional created timestamps used
/// to break ties. Both are microseconds since the epoch.
pub(crate) struct Timeline<'a> {
    pub event: &'a [Option<i64>],
    pub created: Option<&'a [Option<i64>]>,
}

impl Timeline<'_> {
    /// Ordering of source rows: event timestamp, then created timestamp, then
    /// file position.
    fn sort_key(&self, row: usize) -> (Option<i64>, Option<i64>, usize) {
        let created = self.created.and_then(|created| created[row]);
        (self.event[row], created, row)
    }
}

fn encode(columns: &[ArrayRef]) -> Result<Option<Rows>> {
    if columns.is_empty() {
        return Ok(None);
    }
    let converter = RowConverter::new(
        columns
            .iter()
            .map(|column| SortField::new(column.data_type().clone()))
            .collect(),
    )?;
    Ok(Some(converter.convert_columns(columns)?))
}

/// Encodes both sides with one converter so equal keys produce equal rows.
fn encode_pair(left: &[ArrayRef], right: &[ArrayRef]) -> Result<Option<(Rows, Rows)>> {
    if left.is_empty() {
        return Ok(None);
    }
    let converter = RowConverter::new(
        left.iter()
            .map(|column| SortField::new(column.data_type().clone()))
            .collect(),
    )?;
    let left_rows = converter.convert_columns(left)?;
    let right_rows = converter.convert_columns(right)?;
    Ok(Some((left_rows, right_rows)))
}

fn has_null_key(columns: &[ArrayRef], row: usize) -> bool {
    columns.iter().any(|column| column.is_null(row))
}

fn to_index(row: usize) -> Result<u32> {
    u32::try_from(row).map_err(|_| anyhow!("Row index {} exceeds u32 range", row))
}

/// Groups the usable source rows by key. Rows with a null key or a null event
/// timestamp never match. Keyless sources form a single group.
fn group_rows<'r>(
    keys: Option<&'r Rows>,
    key_columns: &[ArrayRef],
    timeline: &Timeline<'_>,
) -> FxHashMap<Option<Row<'r>>, Vec<usize>> {
    let mut groups: FxHashMap<Option<Row<'r>>, Vec<usize>> = FxHashMap::default();
    for row in 0..timeline.event.len() {
        if timeline.event[row].is_none() || has_null_key(key_columns, row) {
            continue;
        }
        let key = keys.map(|keys| keys.row(row));
        groups.entry(key).or_default().push(row);
    }
    groups
}

/// For every entity row picks the source row with equal keys and the latest
/// event timestamp `<= t`, also `>= t - ttl` when a TTL is given. Bounds are
/// inclusive. Entity rows with no candidate get a null index.
///
/// `source_keys` must already have the types of `entity_keys`.
pub(crate) fn as_of_indices(
    entity_keys: &[ArrayRef],
    entity_timestamps: &[Option<i64>],
    source_keys: &[ArrayRef],
    timeline: &Timeline<'_>,
    ttl_micros: Option<i64>,
) -> Result<UInt32Array> {
    let encoded = encode_pair(entity_keys, source_keys)?;
    let (entity_rows, source_rows) = match &encoded {
        Some((entity_rows, source_rows)) => (Some(entity_rows), Some(source_rows)),
        None => (None, None),
    };
    let mut groups = group_rows(source_rows, source_keys, timeline);
    for rows in groups.values_mut() {
        rows.sort_by_key(|row| timeline.sort_key(*row));
    }

    let mut indices = Vec::with_capacity(entity_timestamps.len());
    for (entity_row, timestamp) in entity_timestamps.iter().enumerate() {
        let Some(t) = *timestamp else {
            indices.push(None);
            continue;
        };
        if has_null_key(entity_keys, entity_row) {
            indices.push(None);
            continue;
        }
        let key = entity_rows.map(|rows| rows.row(entity_row));
        let candidate = groups.get(&key).and_then(|rows| {
            let end = rows.partition_point(|row| timeline.event[*row].is_some_and(|ts| ts <= t));
            let row = *rows.get(end.checked_sub(1)?)?;
            let ts = timeline.event[row]?;
            match ttl_micros {
                Some(ttl) if ts < t.saturating_sub(ttl) => None,
                _ => Some(row),
            }
        });
        indices.push(candidate.map(to_index).transpose()?);
    }
    Ok(UInt32Array::from(indices))
}

/// Keeps, per key, the row with the latest event timestamp inside
/// `[start, end)`. Ties go to the latest created timestamp, then to the last
/// row in file order. Indices are returned in file order.
pub(crate) fn latest_indices(
    key_columns: &[ArrayRef],
    timeline: &Timeline<'_>,
    start_micros: i64,
    end_micros: i64,
) -> Result<UInt32Array> {
    let encoded = encode(key_columns)?;
    let mut latest: FxHashMap<Option<Row<'_>>, usize> = FxHashMap::default();
    for row in 0..timeline.event.len() {
        let Some(ts) = timeline.event[row] else {
            continue;
        };
        if ts < start_micros || ts >= end_micros || has_null_key(key_columns, row) {
            continue;
        }
        let key = encoded.as_ref().map(|rows| rows.row(row));
        latest
            .entry(key)
            .and_modify(|best| {
                if timeline.sort_key(row) > timeline.sort_key(*best) {
                    *best = row;
                }
            })
            .or_insert(row);
    }
    let mut kept = latest.into_values().collect::<Vec<_>>();
    kept.sort_unstable();
    Ok(UInt32Array::from(
        kept.into_iter().map(to_index).collect::<Result<Vec<_>>>()?,
    ))
}
