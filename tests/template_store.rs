use std::fs;
use std::thread;

use neurolock_tee::hashing::Sha256Digest;
use neurolock_tee::template::build_template;
use neurolock_tee::{FeatureVector, MentalTask, NeuroLockError, Template, TemplateStore};
use tempfile::TempDir;

fn store(dir: &TempDir) -> TemplateStore {
    TemplateStore::new(dir.path().join("templates"), ".nlt")
}

fn template(owner: &str, values: &[f32]) -> Template {
    let trials = vec![FeatureVector::captured_now(values.to_vec(), MentalTask::MentalArithmetic); 3];
    build_template(owner, &trials, MentalTask::MentalArithmetic, &Sha256Digest, 32).unwrap()
}

fn assert_same(a: &Template, b: &Template) {
    assert_eq!(a.owner_id, b.owner_id);
    assert_eq!(a.task_type, b.task_type);
    assert_eq!(a.created_at, b.created_at);
    assert_eq!(a.last_used, b.last_used);
    assert_eq!(a.format_version, b.format_version);
    let bits = |t: &Template| -> Vec<u32> {
        t.feature_vector.values().iter().map(|v| v.to_bits()).collect()
    };
    assert_eq!(bits(a), bits(b));
    assert_eq!(a.feature_vector, b.feature_vector);
    assert_eq!(a.digest.digest(), b.digest.digest());
    assert_eq!(a.digest.salt(), b.digest.salt());
}

#[test]
fn save_then_load_reproduces_template() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    for (owner, values) in [
        ("alice", vec![1.0, 0.0, 0.0, 0.0]),
        ("bob.smith", vec![0.1; 40]),
        ("c-3_po", vec![-1.0e-30, 3.4e38, 0.333, -0.0]),
    ] {
        let original = template(owner, &values);
        store.save(&original).unwrap();
        let loaded = store.load(owner).unwrap();
        assert_same(&original, &loaded);
    }
}

#[test]
fn missing_record_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    assert!(matches!(store.load("bob"), Err(NeuroLockError::NotFound(_))));
    assert!(matches!(store.delete("bob"), Err(NeuroLockError::NotFound(_))));
    assert!(!store.exists("bob").unwrap());
}

#[test]
fn truncated_record_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.save(&template("alice", &[1.0, 0.0, 0.0, 0.0])).unwrap();

    let path = store.path_for("alice").unwrap();
    let bytes = fs::read(&path).unwrap();
    for cut in [1, 4, 17, 40, bytes.len() / 2, 10] {
        fs::write(&path, &bytes[..bytes.len() - cut]).unwrap();
        assert!(
            matches!(store.load("alice"), Err(NeuroLockError::CorruptRecord(_))),
            "cut {} bytes",
            cut
        );
    }
}

#[test]
fn record_renamed_to_another_owner_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.save(&template("alice", &[1.0, 2.0])).unwrap();
    fs::rename(store.path_for("alice").unwrap(), store.path_for("mallory").unwrap()).unwrap();
    assert!(matches!(store.load("mallory"), Err(NeuroLockError::CorruptRecord(_))));
}

#[test]
fn save_replaces_atomically_and_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let first = template("alice", &[1.0, 0.0]);
    let second = template("alice", &[0.0, 1.0]);
    store.save(&first).unwrap();
    store.save(&second).unwrap();

    assert_same(&second, &store.load("alice").unwrap());
    let names: Vec<String> = fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["alice.nlt".to_string()]);
}

#[test]
fn failed_save_keeps_previous_records_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let original = template("alice", &[1.0, 0.0]);
    store.save(&original).unwrap();

    // A non-empty directory squatting on bob's record path makes the final
    // rename fail.
    let squatter = store.path_for("bob").unwrap();
    fs::create_dir(&squatter).unwrap();
    fs::write(squatter.join("keep"), b"x").unwrap();
    let result = store.save(&template("bob", &[0.0, 1.0]));
    assert!(matches!(result, Err(NeuroLockError::IoFailure(_))));

    assert_same(&original, &store.load("alice").unwrap());
    let mut names: Vec<String> = fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["alice.nlt".to_string(), "bob.nlt".to_string()]);
}

#[test]
fn concurrent_saves_and_loads_never_see_a_torn_record() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let versions = [
        template("alice", &[1.0, 0.0, 0.0, 0.0]),
        template("alice", &[0.0, 1.0, 0.0, 0.0]),
        template("alice", &[0.0, 0.0, 1.0, 0.0]),
    ];
    store.save(&versions[0]).unwrap();

    thread::scope(|scope| {
        for writer in 0..4 {
            let store = &store;
            let versions = &versions;
            scope.spawn(move || {
                for round in 0..50 {
                    store.save(&versions[(writer + round) % versions.len()]).unwrap();
                }
            });
        }
        for _ in 0..4 {
            let store = &store;
            let versions = &versions;
            scope.spawn(move || {
                for _ in 0..100 {
                    let loaded = store.load("alice").unwrap();
                    assert!(versions
                        .iter()
                        .any(|v| v.digest.digest() == loaded.digest.digest()));
                }
            });
        }
    });

    let names: Vec<String> = fs::read_dir(store.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["alice.nlt".to_string()]);
}

#[test]
fn list_and_delete() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    assert!(store.list().unwrap().is_empty());

    for owner in ["zoe", "alice", "mike"] {
        store.save(&template(owner, &[1.0, 1.0])).unwrap();
    }
    fs::write(store.dir().join("notes.txt"), b"ignored").unwrap();
    assert_eq!(store.list().unwrap(), vec!["alice", "mike", "zoe"]);

    store.delete("mike").unwrap();
    assert!(!store.exists("mike").unwrap());
    assert!(matches!(store.load("mike"), Err(NeuroLockError::NotFound(_))));
    assert_eq!(store.list().unwrap(), vec!["alice", "zoe"]);
}

#[test]
fn unsafe_owner_ids_never_touch_the_filesystem() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    for owner in ["../escape", "a/b", "", ".nlt"] {
        assert!(matches!(store.load(owner), Err(NeuroLockError::InvalidInput(_))));
    }
}
