use std::fs;
use std::thread;

use neurolock_tee::similarity::similarity;
use neurolock_tee::template::authenticate;
use neurolock_tee::{BiometricService, Config, FeatureVector, MentalTask, NeuroLockError};
use tempfile::TempDir;

fn service(dir: &TempDir) -> BiometricService {
    BiometricService::new(Config {
        feature_dimension: 4,
        template_dir: dir.path().to_path_buf(),
        ..Config::default()
    })
    .unwrap()
}

fn features(values: [f32; 4]) -> FeatureVector {
    FeatureVector::captured_now(values.to_vec(), MentalTask::EyesClosedRest)
}

fn enrol_alice(svc: &BiometricService) {
    let trials = vec![features([1.0, 0.0, 0.0, 0.0]); 3];
    svc.enroll("alice", &trials, MentalTask::EyesClosedRest).unwrap();
}

#[test]
fn enrolment_of_identical_trials_stores_that_vector() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    enrol_alice(&svc);

    let template = svc.load_verified("alice").unwrap();
    assert_eq!(template.feature_vector.values(), &[1.0, 0.0, 0.0, 0.0]);
    assert_eq!(template.task_type, MentalTask::EyesClosedRest);
}

#[test]
fn identical_candidate_is_accepted() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    enrol_alice(&svc);

    let result = svc.authenticate("alice", &features([1.0, 0.0, 0.0, 0.0])).unwrap();
    assert_eq!(result.similarity_score, 1.0);
    assert!(result.authenticated);
}

#[test]
fn orthogonal_candidate_is_denied() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    enrol_alice(&svc);

    let result = svc.authenticate("alice", &features([0.0, 1.0, 0.0, 0.0])).unwrap();
    assert_eq!(result.similarity_score, 0.0);
    assert!(!result.authenticated);
}

#[test]
fn unknown_user_is_not_found() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    assert!(matches!(
        svc.store().load("bob"),
        Err(NeuroLockError::NotFound(_))
    ));
}

#[test]
fn truncated_template_is_corrupt_not_a_denial() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    enrol_alice(&svc);

    let path = svc.store().path_for("alice").unwrap();
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

    let err = svc
        .authenticate("alice", &features([1.0, 0.0, 0.0, 0.0]))
        .unwrap_err();
    assert!(matches!(err, NeuroLockError::CorruptRecord(_)));
    assert!(err.is_processing_failure());
}

#[test]
fn successful_authentication_refreshes_last_used_only() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    enrol_alice(&svc);
    let before = svc.load_verified("alice").unwrap();

    svc.authenticate("alice", &features([1.0, 0.0, 0.0, 0.0])).unwrap();
    let after = svc.load_verified("alice").unwrap();

    assert!(after.last_used >= before.last_used);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.feature_vector, before.feature_vector);
    assert_eq!(after.digest.digest(), before.digest.digest());
}

#[test]
fn decision_matches_threshold_for_stored_template() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    enrol_alice(&svc);
    let template = svc.load_verified("alice").unwrap();

    let candidates = [
        [1.0, 0.1, 0.0, 0.0],
        [0.8, 0.6, 0.0, 0.0],
        [0.6, 0.8, 0.0, 0.0],
        [-1.0, 0.0, 0.0, 0.0],
    ];
    for values in candidates {
        let candidate = features(values);
        let score = similarity(candidate.values(), template.feature_vector.values()).unwrap();
        for tau in [0.0f32, 0.6, 0.8, 0.85, 0.99, 1.0] {
            let result = authenticate(&candidate, &template, tau).unwrap();
            assert_eq!(result.authenticated, score >= tau, "score {} tau {}", score, tau);
        }
    }
}

#[test]
fn wrong_dimension_candidate_is_a_processing_failure() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    enrol_alice(&svc);

    let candidate = FeatureVector::captured_now(vec![1.0, 0.0], MentalTask::EyesClosedRest);
    assert!(matches!(
        svc.authenticate("alice", &candidate),
        Err(NeuroLockError::DimensionMismatch { expected: 4, actual: 2 })
    ));
}

#[test]
fn concurrent_authentications_all_succeed() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);
    enrol_alice(&svc);

    thread::scope(|scope| {
        for _ in 0..4 {
            let svc = &svc;
            scope.spawn(move || {
                for _ in 0..25 {
                    let result = svc.authenticate("alice", &features([1.0, 0.0, 0.0, 0.0])).unwrap();
                    assert!(result.authenticated);
                }
            });
        }
    });

    assert!(svc.load_verified("alice").is_ok());
}

#[test]
fn concurrent_enrolments_of_one_owner_admit_exactly_one() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir);

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let svc = &svc;
                scope.spawn(move || {
                    let trials = vec![features([1.0, i as f32, 0.0, 0.0]); 3];
                    svc.enroll("alice", &trials, MentalTask::EyesClosedRest)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(outcomes
        .iter()
        .filter(|o| o.is_err())
        .all(|o| matches!(o, Err(NeuroLockError::AlreadyExists(_)))));

    // The surviving record is the winner's.
    let stored = svc.load_verified("alice").unwrap();
    assert_eq!(stored.digest.to_hex(), winners[0].digest);
}
