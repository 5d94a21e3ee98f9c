//! Node Store Integration Tests
//!
//! The path-addressed store over a file-backed database.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;

use codeviz_desktop::models::{ChangeOperation, Metadata};
use codeviz_desktop::services::node_store::{NodeWrite, SetOptions};
use codeviz_desktop::{AppError, Database, NodeStore, NodeValue};

fn open_store(dir: &TempDir) -> NodeStore {
    let db = Database::open(&dir.path().join("store.db")).unwrap();
    let project = match db.list_projects().unwrap().into_iter().next() {
        Some(project) => project.id,
        None => db.create_project("store", Metadata::new()).unwrap(),
    };
    NodeStore::open(db, &project).unwrap()
}

#[test]
fn test_values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&dir);
        store.set("scene.camera.fov", 60.0).unwrap();
        store.set("scene.title", "Overview").unwrap();
        store.set("scene.visible", true).unwrap();
        store
            .set("scene.layout", NodeValue::Json(json!({"mode": "radial", "depth": 3})))
            .unwrap();
    }

    let store = open_store(&dir);
    assert_eq!(store.get("scene.camera.fov", NodeValue::Null).unwrap(), NodeValue::from(60.0));
    assert_eq!(store.get("scene.title", NodeValue::Null).unwrap(), NodeValue::from("Overview"));
    assert_eq!(store.get("scene.visible", NodeValue::Null).unwrap(), NodeValue::from(true));
    assert_eq!(
        store
            .get("scene.layout", NodeValue::Null)
            .unwrap()
            .to_json()
            .unwrap()["mode"],
        "radial"
    );
    assert!(store.check_integrity().is_empty());
}

#[test]
fn test_set_many_is_atomic() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.set("locked", "scalar").unwrap();
    let logged = store.database().count_changes(store.project_id()).unwrap();

    let writes = vec![
        NodeWrite::new("fresh.a", 1.0),
        NodeWrite::new("fresh.b", 2.0),
        NodeWrite::new("locked.inner", 3.0),
    ];
    assert!(matches!(store.set_many(writes), Err(AppError::Validation(_))));
    assert!(store.resolve("fresh").unwrap().is_none());
    assert_eq!(
        store.database().count_changes(store.project_id()).unwrap(),
        logged
    );

    let reopened = open_store(&dir);
    assert!(reopened.resolve("fresh.a").unwrap().is_none());
}

#[test]
fn test_watchers_see_committed_state() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.set("metrics.files", 0.0).unwrap();
    store.set("metrics.label", "").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store
        .watch("metrics.files", move |change, queue| {
            sink.lock().unwrap().push(change.operation);
            if let Some(NodeValue::Number(n)) = &change.new_value {
                queue.set("metrics.label", format!("{} files", n));
            }
        })
        .unwrap();

    store.set("metrics.files", 12.0).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![ChangeOperation::Update]);
    assert_eq!(
        store.get("metrics.label", NodeValue::Null).unwrap(),
        NodeValue::from("12 files")
    );

    let reopened = open_store(&dir);
    assert_eq!(
        reopened.get("metrics.label", NodeValue::Null).unwrap(),
        NodeValue::from("12 files")
    );
}

#[test]
fn test_delete_subtree_and_log_rows() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store.set("src.app", "a").unwrap();
    store.set("src.lib.util", "u").unwrap();
    store.set("docs.readme", "r").unwrap();

    assert_eq!(store.delete("src").unwrap(), 4);
    let deletes = store
        .database()
        .get_changes(store.project_id(), 4)
        .unwrap()
        .into_iter()
        .filter(|c| c.operation == ChangeOperation::Delete)
        .count();
    assert_eq!(deletes, 4);
    assert_eq!(store.len(), 2);
    assert!(store.resolve("docs.readme").unwrap().is_some());
}

#[test]
fn test_snapshot_restore_through_store() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);
    store
        .set_with(
            "src.app",
            "v1",
            SetOptions {
                node_type: Some("file".to_string()),
                language: Some("javascript".to_string()),
                metadata: None,
            },
        )
        .unwrap();
    let snapshot = store.snapshot("v1").unwrap();

    store.set("src.app", "v2").unwrap();
    store.delete("src").unwrap();
    assert!(store.resolve("src.app").unwrap().is_none());

    let report = store.restore_snapshot(&snapshot).unwrap();
    assert!(report.complete);
    let app = store.resolve("src.app").unwrap().unwrap();
    assert_eq!(app.value, NodeValue::from("v1"));
    assert_eq!(app.language.as_deref(), Some("javascript"));
}

#[test]
fn test_open_missing_project_fails() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("store.db")).unwrap();
    assert!(matches!(
        NodeStore::open(db, "no-such-project"),
        Err(AppError::NotFound(_))
    ));
}
