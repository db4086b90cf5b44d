use anyhow::{Context, Result, anyhow};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit, TimestampMicrosecondType};
use chrono::Duration;
use prost_types::Duration as ProstDuration;

pub fn prost_duration_to_duration(prost_duration: &ProstDuration) -> Duration {
    let seconds = prost_duration.seconds.max(0);
    let nanos = prost_duration.nanos.max(0) as i64;
    Duration::seconds(seconds) + Duration::nanoseconds(nanos)
}

pub fn duration_to_prost_duration(duration: &Duration) -> ProstDuration {
    ProstDuration {
        seconds: duration.num_seconds(),
        nanos: duration.subsec_nanos(),
    }
}

pub(crate) fn is_temporal(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
    )
}

/// Normalises a timestamp-like column to microseconds since the epoch (UTC).
/// Timezone-aware columns keep their instant; naive columns are read as UTC.
pub(crate) fn timestamp_micros(array: &ArrayRef) -> Result<Vec<Option<i64>>> {
    if !is_temporal(array.data_type()) && !matches!(array.data_type(), DataType::Utf8) {
        return Err(anyhow!(
            "Column of type {} cannot be used as a timestamp",
            array.data_type()
        ));
    }
    let target = match array.data_type() {
        DataType::Timestamp(_, tz) => DataType::Timestamp(TimeUnit::Microsecond, tz.clone()),
        _ => DataType::Timestamp(TimeUnit::Microsecond, None),
    };
    let micros = cast(array, &target)
        .with_context(|| format!("Failed to cast {} to timestamp", array.data_type()))?;
    Ok(micros
        .as_primitive::<TimestampMicrosecondType>()
        .iter()
        .collect())
}
