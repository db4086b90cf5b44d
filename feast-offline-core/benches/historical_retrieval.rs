use arrow::array::{ArrayRef, Float64Array, Int64Array, TimestampMicrosecondArray};
use arrow::record_batch::RecordBatch;
use criterion::{Criterion, criterion_group, criterion_main};
use feast_offline_core::entity_df::EntityDataFrame;
use feast_offline_core::feast::types::value_type::Enum as ValueTypeEnum;
use feast_offline_core::io::write_parquet;
use feast_offline_core::model::{Entity, FeatureView};
use feast_offline_core::offline_store::{
    FileOfflineStore, HistoricalFeaturesRequest, OfflineStore, RetrievalJob,
};
use feast_offline_core::registry::LocalRegistry;
use feast_offline_core::source::{FileSource, SourceKind, TabularSourceDescriptor};
use std::sync::Arc;
use tokio::runtime::Runtime;

const DRIVERS: i64 = 1_000;
const ROWS_PER_DRIVER: i64 = 100;
const ENTITY_ROWS: i64 = 10_000;

fn timestamps(seconds: impl Iterator<Item = i64>) -> ArrayRef {
    Arc::new(
        TimestampMicrosecondArray::from(seconds.map(|s| s * 1_000_000).collect::<Vec<_>>())
            .with_timezone("UTC"),
    )
}

fn source_batch() -> RecordBatch {
    let rows = DRIVERS * ROWS_PER_DRIVER;
    RecordBatch::try_from_iter(vec![
        (
            "driver_id",
            Arc::new(Int64Array::from_iter_values((0..rows).map(|i| i % DRIVERS))) as ArrayRef,
        ),
        (
            "conv_rate",
            Arc::new(Float64Array::from_iter_values(
                (0..rows).map(|i| (i % 97) as f64 / 97.0),
            )) as ArrayRef,
        ),
        ("event_timestamp", timestamps((0..rows).map(|i| i / DRIVERS * 60))),
    ])
    .expect("failed to build source batch")
}

fn entity_batch() -> RecordBatch {
    RecordBatch::try_from_iter(vec![
        (
            "driver_id",
            Arc::new(Int64Array::from_iter_values(
                (0..ENTITY_ROWS).map(|i| (i * 7) % DRIVERS),
            )) as ArrayRef,
        ),
        (
            "event_timestamp",
            timestamps((0..ENTITY_ROWS).map(|i| (i % ROWS_PER_DRIVER) * 60 + 30)),
        ),
    ])
    .expect("failed to build entity batch")
}

fn bench_historical_retrieval(c: &mut Criterion) {
    let runtime = Runtime::new().expect("failed to create tokio runtime");
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    write_parquet(&dir.path().join("driver_stats.parquet"), &source_batch())
        .expect("failed to write source");

    let driver = Entity {
        name: "driver".to_string(),
        project: "driver_ranking".to_string(),
        join_key: "driver_id".to_string(),
        value_type: ValueTypeEnum::Int64,
    };
    let view = FeatureView::new(
        "driver_hourly_stats",
        "driver_ranking",
        Arc::new(FileSource::new(TabularSourceDescriptor::new(
            "driver_stats.parquet",
            "event_timestamp",
        ))),
    )
    .with_entity(&driver)
    .with_feature("conv_rate", ValueTypeEnum::Double)
    .with_ttl(chrono::Duration::hours(1));
    let store = FileOfflineStore::new(Some(dir.path().to_path_buf()), SourceKind::File);
    let request = HistoricalFeaturesRequest {
        feature_views: vec![Arc::new(view)],
        feature_refs: vec!["driver_hourly_stats:conv_rate".to_string()],
        entity_df: EntityDataFrame::new(entity_batch(), "event_timestamp")
            .expect("invalid entity dataframe"),
        project: "driver_ranking".to_string(),
        full_feature_names: false,
    };
    let job = runtime
        .block_on(store.get_historical_features(request, &LocalRegistry::default()))
        .expect("failed to plan retrieval");

    c.bench_function("historical_retrieval_point_in_time_join", |b| {
        b.iter(|| {
            let result = job.to_columnar_table().expect("retrieval failed");
            criterion::black_box(result);
        });
    });
}

criterion_group!(historical_retrieval_benches, bench_historical_retrieval);
criterion_main!(historical_retrieval_benches);
