//! Training Regression Tests
//!
//! Drive the library end to end (CSV directory -> features -> training ->
//! filesystem stores -> inference) without the HTTP layer.

use std::sync::Arc;

use msms_ml::features::AggregationInterval;
use msms_ml::ml_engine::{BundleKind, PipelineFactory};
use msms_ml::storage::{ArtifactStore, RegistryStore, RetentionPolicy};
use msms_ml::{CsvDirectoryLoader, FeatureBuilder, FsArtifactStore, InferenceService, JsonRegistryStore, TrainingOrchestrator};

const HEADER: &str = "timestamp,device_id,device_name,employee_id,employee_name,category,parameter,value";

fn write_csv(dir: &std::path::Path, name: &str, rows: &[(&str, &str, f64)]) {
    let mut csv = format!("{HEADER}\n");
    for (ts, parameter, value) in rows {
        csv.push_str(&format!("{ts},D9,Methane Head,E1,J. Doe,gas,{parameter},{value}\n"));
    }
    std::fs::write(dir.join(name), csv).unwrap();
}

fn minute_series(minutes: u32) -> Vec<(String, &'static str, f64)> {
    (0..minutes)
        .flat_map(|i| {
            let ts = format!("2024-04-06T{:02}:{:02}:00Z", 8 + i / 60, i % 60);
            [
                (ts.clone(), "temp", 18.0 + f64::from(i % 13) * 0.25),
                (ts, "ch4", 0.2 + f64::from(i % 7) * 0.01),
            ]
        })
        .collect()
}

fn write_series(dir: &std::path::Path, name: &str, minutes: u32) {
    let rows = minute_series(minutes);
    let borrowed: Vec<(&str, &str, f64)> = rows.iter().map(|(t, p, v)| (t.as_str(), *p, *v)).collect();
    write_csv(dir, name, &borrowed);
}

struct Stack {
    trainer: TrainingOrchestrator,
    inference: InferenceService,
    artifacts: Arc<FsArtifactStore>,
    registry: Arc<JsonRegistryStore>,
}

fn stack(data_dir: &std::path::Path, models_dir: &std::path::Path, retention: RetentionPolicy) -> Stack {
    let loader = Arc::new(CsvDirectoryLoader::new(data_dir));
    let features = FeatureBuilder::new(loader, AggregationInterval::default());
    let artifacts = Arc::new(FsArtifactStore::new(models_dir, retention));
    let registry = Arc::new(JsonRegistryStore::new(models_dir.join("registry.json")));
    let factory = PipelineFactory {
        regression_trees: 8,
        anomaly_trees: 16,
        ..PipelineFactory::default()
    };
    Stack {
        trainer: TrainingOrchestrator::new(features.clone(), factory, artifacts.clone(), registry.clone()),
        inference: InferenceService::new(features, artifacts.clone(), registry.clone()),
        artifacts,
        registry,
    }
}

/// Three readings in one bucket: the 1000.0 spike is replaced by the group
/// median before aggregation.
#[test]
fn test_outlier_replaced_before_aggregation() {
    let dir = tempfile::tempdir().unwrap();
    write_csv(
        dir.path(),
        "spike.csv",
        &[
            ("2024-04-06 08:00:00", "temp", 10.0),
            ("2024-04-06 08:01:00", "temp", 12.0),
            ("2024-04-06 08:02:00", "temp", 1000.0),
        ],
    );

    let builder = FeatureBuilder::new(
        Arc::new(CsvDirectoryLoader::new(dir.path())),
        AggregationInterval::default(),
    );
    let (table, metadata) = builder.build_feature_table().unwrap();
    let metadata = metadata.unwrap();

    assert_eq!(metadata.rows, 1);
    assert_eq!(metadata.columns, 16);
    assert_eq!(table.column("param_temp_max").unwrap(), &[12.0]);
    assert_eq!(table.column("param_temp_min").unwrap(), &[10.0]);
    let mean = table.column("param_temp_mean").unwrap()[0];
    assert!((mean - 34.0 / 3.0).abs() < 1e-9);
    assert_eq!(table.column("hour_mean").unwrap(), &[8.0]);
    // 2024-04-06 is a Saturday
    assert_eq!(table.column("is_weekend_max").unwrap(), &[1.0]);
}

#[test]
fn test_full_cycle_on_filesystem() {
    let data = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    write_series(data.path(), "a.csv", 90);

    let s = stack(data.path(), models.path(), RetentionPolicy::Latest);
    let report = s.trainer.train_all().unwrap().into_ready().unwrap();
    assert_eq!(report.metadata.rows, 18);

    for kind in BundleKind::ALL {
        let bundle = s.artifacts.load(kind).unwrap();
        assert_eq!(bundle.kind, kind);
        assert!(bundle.validate().is_ok());
    }
    let entries = s.registry.read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].models.anomaly, "anomaly.json");

    // A fresh service over the same directories sees the persisted run
    let reopened = stack(data.path(), models.path(), RetentionPolicy::Latest);
    assert_eq!(reopened.inference.registry().unwrap(), entries);
    let ranked = reopened.inference.feature_importance("regression").unwrap();
    assert!(!ranked.importance.is_empty());
    assert!(!ranked.importance.iter().any(|f| f.feature == report.target));
}

#[test]
fn test_versioned_retention_keeps_every_run() {
    let data = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    write_series(data.path(), "a.csv", 60);

    let s = stack(data.path(), models.path(), RetentionPolicy::Versioned);
    s.trainer.train_all().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    s.trainer.train_all().unwrap();

    let entries = s.registry.read_all().unwrap();
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].models.regression, entries[1].models.regression);
    for entry in &entries {
        for file in [&entry.models.baseline, &entry.models.regression, &entry.models.anomaly] {
            assert!(file.contains('-'), "versioned name expected, got {file}");
            assert!(models.path().join(file).exists());
        }
    }
    // The latest slot is still written for inference
    assert!(models.path().join("regression.json").exists());
}

#[test]
fn test_corrupt_registry_starts_fresh() {
    let data = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    write_series(data.path(), "a.csv", 60);
    std::fs::write(models.path().join("registry.json"), "{ not json").unwrap();

    let s = stack(data.path(), models.path(), RetentionPolicy::Latest);
    assert!(s.registry.read_all().unwrap().is_empty());

    s.trainer.train_all().unwrap();
    let text = std::fs::read_to_string(models.path().join("registry.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(doc["models"].as_array().unwrap().len(), 1);
}

#[test]
fn test_multiple_snapshots_are_concatenated() {
    let data = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    write_series(data.path(), "2024-04-06-a.csv", 30);
    write_csv(
        data.path(),
        "2024-04-06-b.csv",
        &[("2024-04-06T09:00:00Z", "humidity", 71.0), ("2024-04-06T09:01:00Z", "humidity", 73.0)],
    );

    let s = stack(data.path(), models.path(), RetentionPolicy::Latest);
    let summary = s.inference.summary().unwrap().into_ready().unwrap();
    assert!(summary.columns.iter().any(|c| c == "param_humidity_mean"));
    // 08:00 .. 09:00 inclusive in five-minute buckets
    assert_eq!(summary.rows, 13);
}
