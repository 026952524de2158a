//! Replaying recorded streams through a configured controller

use behaviour_engine::BehaviourType;
use pipeline::{build_controller, replay, AppConfig, ReplayStats};
use std::sync::Arc;
use storage::{BufferManager, InMemoryRepository};

const RECORDING: &str = r#"
# manual trip with a speeding stretch
{"type":"start","timestamp_ms":0}
{"type":"location","latitude":52.5200,"longitude":13.4050,"timestamp_ms":0}
{"type":"sample","kind":"speed","values":[25.0],"timestamp_ms":100}
{"type":"sample","kind":"speed","values":[25.5],"timestamp_ms":200}
{"type":"sample","kind":"speed","values":[26.0],"timestamp_ms":300}
{"type":"sample","kind":"speed","values":[25.0],"timestamp_ms":400}
{"type":"sample","kind":"speed","values":[24.5],"timestamp_ms":500}
{"type":"location","latitude":52.5210,"longitude":13.4050,"timestamp_ms":600}
{"type":"start","timestamp_ms":650}
this line is not json
{"type":"stop","timestamp_ms":1000}
{"type":"stop","timestamp_ms":1100}
"#;

#[tokio::test]
async fn test_replay_drives_a_trip() {
    let repo = Arc::new(InMemoryRepository::new());
    let config = AppConfig::default();
    let buffer = Arc::new(BufferManager::new(repo.clone(), config.flush.clone()));
    let controller = build_controller(&config, repo.clone(), buffer).unwrap();
    let (handle, task) = controller.spawn();

    let stats = replay(RECORDING.as_bytes(), &handle).await.unwrap();
    assert_eq!(
        stats,
        ReplayStats {
            samples: 5,
            locations: 2,
            commands: 4,
            rejected: 2,
            malformed: 1,
        }
    );

    handle.shutdown().await.unwrap();
    drop(handle);
    task.await.unwrap();

    let summaries = repo.summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.sample_count, 5);
    assert_eq!(summary.count(BehaviourType::Speeding), 1);
    assert_eq!(summary.duration_s, 1.0);
    assert!(summary.distance_m > 100.0 && summary.distance_m < 120.0);
    assert_eq!(repo.sample_count().unwrap(), 5);
}

#[test]
fn test_model_path_requires_onnx_support() {
    let mut config = AppConfig::default();
    config.model.path = Some("/nonexistent/model.onnx".into());
    assert!(pipeline::build_runner(&config.model).is_err());
}
