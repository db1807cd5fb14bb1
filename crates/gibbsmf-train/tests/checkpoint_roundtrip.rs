//! Persistence policies and resume semantics.

use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use gibbsmf_core::SparseTensor;
use gibbsmf_train::{
    CheckpointStore, NoiseConfig, PriorKind, ScarceTensorData, TrainConfig, TrainError,
    TrainSession,
};

fn training_tensor() -> SparseTensor {
    SparseTensor::from_triplets(
        5,
        4,
        &[0, 0, 1, 1, 2, 3, 3, 4, 4],
        &[0, 2, 1, 3, 2, 0, 1, 2, 3],
        &[1.0, 2.0, 0.5, 1.5, 2.5, 0.2, 3.0, 1.1, 0.7],
    )
    .unwrap()
}

fn config_with_path(save_path: Option<PathBuf>) -> TrainConfig {
    let mut config = TrainConfig::new(2, 5, 10, vec![PriorKind::Normal, PriorKind::Normal]);
    config.noise = NoiseConfig::Fixed { precision: 4.0 };
    config.seed = Some(2024);
    config.save_path = save_path;
    config
}

fn session(config: TrainConfig) -> TrainSession {
    let data = ScarceTensorData::new(training_tensor(), config.noise).unwrap();
    TrainSession::from_config(config, Box::new(data), None).unwrap()
}

#[test]
fn save_freq_keeps_every_nth_sample() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_with_path(Some(tmp.path().to_path_buf()));
    config.save_freq = 2;

    let mut s = session(config);
    s.run().unwrap();

    let store = CheckpointStore::create(tmp.path()).unwrap();
    let isamples: Vec<i64> = store
        .sample_steps()
        .unwrap()
        .iter()
        .map(|s| s.isample())
        .collect();
    assert_eq!(isamples, vec![2, 4, 6, 8, 10]);

    // the final iteration always leaves a checkpoint when saving is on
    let ck = store.latest_checkpoint().unwrap().unwrap();
    assert_eq!(ck.isample(), 15);
    let factor = ck.read_matrix("factor_0").unwrap();
    assert_eq!(factor.dim(), (5, 2));
}

#[test]
fn negative_save_freq_keeps_only_the_last_sample() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_with_path(Some(tmp.path().to_path_buf()));
    config.save_freq = -1;

    let mut s = session(config);
    s.run().unwrap();

    let store = CheckpointStore::create(tmp.path()).unwrap();
    let isamples: Vec<i64> = store
        .sample_steps()
        .unwrap()
        .iter()
        .map(|s| s.isample())
        .collect();
    assert_eq!(isamples, vec![10]);
}

#[test]
fn final_checkpoint_restores_the_finished_state() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_with_path(Some(tmp.path().to_path_buf()));
    config.save_freq = -1;

    let mut a = session(config.clone());
    a.run().unwrap();

    let mut b = session(config);
    let resumed = b.init().unwrap();
    assert!(resumed);
    for m in 0..2 {
        assert_eq!(a.model().factor(m), b.model().factor(m));
    }
    // nothing left to do after the final iteration
    assert!(!b.step().unwrap());
}

#[test]
fn resume_mid_run_reproduces_the_uninterrupted_trajectory() {
    let tmp = tempfile::tempdir().unwrap();

    // reference: the same seeded run without any persistence
    let mut reference = session(config_with_path(None));
    reference.run().unwrap();

    // interrupted run: one interval checkpoint, then the session is dropped
    let mut config = config_with_path(Some(tmp.path().to_path_buf()));
    config.checkpoint_freq_secs = 1;
    let mut first = session(config.clone());
    first.init().unwrap();
    for _ in 0..3 {
        first.step().unwrap();
    }
    sleep(Duration::from_millis(1100));
    first.step().unwrap();
    drop(first);

    let store = CheckpointStore::create(tmp.path()).unwrap();
    let ck = store.latest_checkpoint().unwrap().unwrap();
    assert!(ck.isample() >= 1 && ck.isample() < 15, "mid-run checkpoint");

    // resumed run must land exactly where the uninterrupted one does
    let mut resumed = session(config);
    assert!(resumed.init().unwrap());
    while resumed.step().unwrap() {}
    for m in 0..2 {
        assert_eq!(reference.model().factor(m), resumed.model().factor(m));
    }
}

#[test]
fn require_resume_fails_without_a_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_with_path(Some(tmp.path().to_path_buf()));
    config.require_resume = true;

    let mut s = session(config);
    let err = s.init().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TrainError>(),
        Some(TrainError::ResumeRequired { .. })
    ));
}
