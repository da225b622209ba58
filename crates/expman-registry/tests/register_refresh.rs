use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use expman_core::ExpError;
use expman_registry::record::read_record_document;
use expman_registry::{
    HostContext, IdMode, NoCommitInfo, Policy, RegisterOptions, Registrar, Settings,
};
use serde_json::json;
use tempfile::tempdir;

fn registrar() -> Registrar {
    Registrar::new(
        Settings::default(),
        HostContext {
            user: "tester".into(),
            host: "ci".into(),
            cwd: PathBuf::from("/tmp"),
        },
        Box::new(NoCommitInfo),
    )
}

fn touch(path: &Path, age_secs: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    let file = File::create(path).expect("create checkpoint");
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .expect("set mtime");
}

#[test]
fn refresh_rewrites_only_the_files_section() {
    let root = tempdir().expect("root");
    let policy = Policy {
        description: "baseline".into(),
        keep_keys: vec!["optimizer.lr".into(), "model".into()],
        ..Policy::default()
    };
    let config = json!({"optimizer": {"lr": 0.1, "momentum": 0.9}, "model": {"depth": 18}});
    let options = RegisterOptions {
        refresh_after: false,
        ..RegisterOptions::default()
    };
    let registration = registrar()
        .register(&policy, &config, root.path(), &options)
        .expect("register");
    let card = registration.dir.join("id_card.json");
    let before = read_record_document(&card).expect("card");
    assert!(before["files"].as_object().expect("files").is_empty());

    touch(&registration.dir.join("checkpoints/epoch=1.ckpt"), 60);
    let refreshed = registrar()
        .refresh_artifacts(&registration.dir, &policy)
        .expect("refresh");
    let after = read_record_document(&card).expect("card");

    let keys_before: Vec<&String> = before.keys().collect();
    let keys_after: Vec<&String> = after.keys().collect();
    assert_eq!(keys_before, keys_after);
    for (key, value) in &before {
        if key == "files" {
            continue;
        }
        assert_eq!(
            serde_json::to_string(value).expect("json"),
            serde_json::to_string(&after[key]).expect("json"),
            "key {key} changed"
        );
    }
    assert_eq!(refreshed.files.checkpoints.len(), 1);
    assert!(refreshed.files.checkpoints[0].ends_with("epoch=1.ckpt"));
    assert_eq!(refreshed.files.best, refreshed.files.checkpoints.first().cloned());
}

#[test]
fn hash_mode_rerun_targets_the_same_directory_and_keeps_identity() {
    let root = tempdir().expect("root");
    let policy = Policy {
        description: "rerun".into(),
        keep_keys: vec!["a".into(), "b".into()],
        ..Policy::default()
    };
    let first = registrar()
        .register(
            &policy,
            &json!({"a": 1, "b": {"x": 1, "y": 2}}),
            root.path(),
            &RegisterOptions::default(),
        )
        .expect("first");
    let second = registrar()
        .register(
            &policy,
            &json!({"b": {"y": 2, "x": 1}, "a": 1}),
            root.path(),
            &RegisterOptions::default(),
        )
        .expect("second");
    assert_eq!(first.dir, second.dir);
    assert_eq!(first.record.id, second.record.id);
    assert_eq!(first.record.stable_hash, second.record.stable_hash);
    assert_eq!(first.record.created_at, second.record.created_at);
    assert_eq!(second.record.description, "rerun");
    assert_eq!(first.record.description, second.record.description);
    assert_eq!(first.record.config_summary, second.record.config_summary);
    assert_eq!(
        serde_json::Value::Object(second.record.config_summary.clone()),
        json!({"a": 1, "b": {"x": 1, "y": 2}})
    );
    let on_disk = read_record_document(&second.dir.join("id_card.json")).expect("card");
    assert_eq!(on_disk["description"], json!("rerun"));
    assert_eq!(on_disk["created_at"], json!(first.record.created_at));
    assert_eq!(
        first.record.id,
        format!("exp_{}", first.record.stable_hash.as_deref().expect("hash"))
    );
    assert_eq!(fs::read_dir(root.path()).expect("root").count(), 1);
}

#[test]
fn sequential_registrations_are_monotonic_across_gaps() {
    let root = tempdir().expect("root");
    fs::create_dir(root.path().join("exp_0001")).expect("seed");
    fs::create_dir(root.path().join("exp_0003")).expect("seed");
    let policy = Policy {
        id_mode: IdMode::Sequential,
        ..Policy::default()
    };
    let config = json!({"seed": 1});
    let next = registrar()
        .register(&policy, &config, root.path(), &RegisterOptions::default())
        .expect("register");
    assert_eq!(next.record.id, "exp_0004");
    let after = registrar()
        .register(&policy, &config, root.path(), &RegisterOptions::default())
        .expect("register");
    assert_eq!(after.record.id, "exp_0005");
    assert!(after.record.stable_hash.is_some());
}

#[test]
fn checkpoints_are_listed_newest_first_with_best_in_front() {
    let root = tempdir().expect("root");
    let policy = Policy::default();
    let registration = registrar()
        .register(&policy, &json!({"lr": 0.3}), root.path(), &RegisterOptions::default())
        .expect("register");
    touch(&registration.dir.join("checkpoints/epoch=1.ckpt"), 300);
    touch(&registration.dir.join("checkpoints/epoch=2.ckpt"), 200);
    touch(&registration.dir.join("checkpoints/last.ckpt"), 10);
    touch(&registration.dir.join("export/model.pth"), 100);
    let record = registrar()
        .refresh_artifacts(&registration.dir, &policy)
        .expect("refresh");
    let names: Vec<String> = record
        .files
        .checkpoints
        .iter()
        .map(|path| {
            Path::new(path)
                .file_name()
                .expect("name")
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(names, ["last.ckpt", "model.pth", "epoch=2.ckpt", "epoch=1.ckpt"]);
    assert_eq!(record.files.best.as_ref(), record.files.checkpoints.first());
    assert!(Path::new(&record.files.checkpoints[0]).is_absolute());
}

#[test]
fn refresh_without_card_is_not_found() {
    let dir = tempdir().expect("dir");
    let err = registrar()
        .refresh_artifacts(dir.path(), &Policy::default())
        .expect_err("no card");
    assert!(matches!(err, ExpError::NotFound(_)));
    assert!(err.to_string().contains("id_card.json"));
}

#[test]
fn staging_copies_run_artifacts_and_snapshot() {
    let root = tempdir().expect("root");
    let run = tempdir().expect("run");
    touch(&run.path().join("checkpoints/last.ckpt"), 0);
    fs::create_dir_all(run.path().join("wandb/run-1")).expect("wandb");
    fs::create_dir_all(run.path().join(".hydra")).expect("hydra");
    fs::write(run.path().join(".hydra/config.yaml"), "lr: 0.1\n").expect("config");

    let policy = Policy {
        extra_files: vec![".hydra/*.yaml".into()],
        ..Policy::default()
    };
    let options = RegisterOptions {
        stage_from: Some(run.path().to_path_buf()),
        ..RegisterOptions::default()
    };
    let registration = registrar()
        .register(&policy, &json!({"lr": 0.1}), root.path(), &options)
        .expect("register");
    let files = &registration.record.files;
    assert_eq!(files.checkpoints.len(), 1);
    assert!(files.wandb.as_deref().expect("wandb").ends_with("wandb"));
    assert!(files
        .config
        .as_deref()
        .expect("config")
        .ends_with("config_snapshot.yaml"));
    assert_eq!(files.extra[".hydra/*.yaml"].len(), 1);
}

#[test]
fn unreadable_snapshot_does_not_abort_registration() {
    let root = tempdir().expect("root");
    let options = RegisterOptions {
        config_snapshot: Some(PathBuf::from("/no/such/config.yaml")),
        ..RegisterOptions::default()
    };
    let registration = registrar()
        .register(&Policy::default(), &json!({}), root.path(), &options)
        .expect("register");
    assert!(registration.record.files.config.is_none());
}

#[test]
fn uuid_and_timestamp_modes_create_fresh_directories() {
    let root = tempdir().expect("root");
    let uuid = Policy {
        id_mode: IdMode::Uuid,
        hash_length: 12,
        ..Policy::default()
    };
    let a = registrar()
        .register(&uuid, &json!({}), root.path(), &RegisterOptions::default())
        .expect("uuid");
    assert_eq!(a.record.id.len(), "exp_".len() + 12);

    let timestamp = Policy {
        id_mode: IdMode::Timestamp,
        ..Policy::default()
    };
    let b = registrar()
        .register(&timestamp, &json!({}), root.path(), &RegisterOptions::default())
        .expect("timestamp");
    assert_eq!(b.record.id.len(), "exp_YYYYMMDD_HHMMSS".len());
    assert_eq!(b.record.profile.id_mode, IdMode::Timestamp);
}
