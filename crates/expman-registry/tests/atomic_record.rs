use std::fs;
use std::path::PathBuf;

use expman_registry::record::{read_record_document, record_path, write_record_atomic};
use expman_registry::{HostContext, NoCommitInfo, Policy, RegisterOptions, Registrar, Settings};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn abandoned_temp_file_never_replaces_the_card() {
    let dir = tempdir().expect("dir");
    let card = record_path(dir.path(), "id_card.json");
    write_record_atomic(&card, &json!({"id": "exp_0001", "files": {}})).expect("write");
    let original = fs::read(&card).expect("read");

    // A writer that died between creating its sibling and renaming it.
    let stray = dir.path().join(".id_card.json.abc123.tmp");
    fs::write(&stray, b"{\"id\": \"exp_00").expect("stray");

    assert_eq!(fs::read(&card).expect("read"), original);
    let document = read_record_document(&card).expect("parse");
    assert_eq!(document["id"], json!("exp_0001"));

    write_record_atomic(&card, &json!({"id": "exp_0001", "files": {"best": "x"}}))
        .expect("rewrite");
    let document = read_record_document(&card).expect("parse");
    assert_eq!(document["files"]["best"], json!("x"));
    assert_eq!(fs::read(&stray).expect("stray"), b"{\"id\": \"exp_00");
}

#[test]
fn failed_write_leaves_no_target_behind() {
    let dir = tempdir().expect("dir");
    let card = dir.path().join("missing-parent").join("id_card.json");
    assert!(write_record_atomic(&card, &json!({"id": "x"})).is_err());
    assert!(!card.exists());
}

#[test]
fn rename_onto_occupied_target_fails_without_debris() {
    let dir = tempdir().expect("dir");
    let card = record_path(dir.path(), "id_card.json");
    fs::create_dir(&card).expect("occupy");
    fs::write(card.join("keep.txt"), b"untouched").expect("occupant");

    let err = write_record_atomic(&card, &json!({"id": "exp_0001"})).expect_err("rename");
    assert_eq!(err.code(), "record.persist");
    assert!(err.to_string().contains("id_card.json"));
    assert!(card.is_dir());
    assert_eq!(fs::read(card.join("keep.txt")).expect("occupant"), b"untouched");
    let names: Vec<String> = fs::read_dir(dir.path())
        .expect("list")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["id_card.json"]);
}

#[test]
fn refresh_leaves_no_temporary_siblings() {
    let root = tempdir().expect("root");
    let registrar = Registrar::new(
        Settings::default(),
        HostContext {
            user: "tester".into(),
            host: "ci".into(),
            cwd: PathBuf::from("/tmp"),
        },
        Box::new(NoCommitInfo),
    );
    let policy = Policy::default();
    let registration = registrar
        .register(&policy, &json!({"lr": 1}), root.path(), &RegisterOptions::default())
        .expect("register");
    for _ in 0..3 {
        registrar
            .refresh_artifacts(&registration.dir, &policy)
            .expect("refresh");
    }
    let names: Vec<String> = fs::read_dir(&registration.dir)
        .expect("dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["id_card.json"]);
}
