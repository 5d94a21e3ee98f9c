//! Persistence Integration Tests
//!
//! Exercises `Database` against a SQLite file in a temp directory.

use std::thread;

use tempfile::TempDir;

use codeviz_desktop::models::{ChangeOperation, Metadata, NewNode, NodePatch, ProjectPatch};
use codeviz_desktop::storage::{ConfigService, Database};
use codeviz_desktop::{AppError, NodeValue, SettingsUpdate};

// ============================================================================
// Helper Functions
// ============================================================================

fn open_db(dir: &TempDir) -> Database {
    Database::open(&dir.path().join("codeviz.db")).unwrap()
}

fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect()
}

// ============================================================================
// Projects
// ============================================================================

#[test]
fn test_project_lifecycle_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let db = open_db(&dir);
        let id = db
            .create_project("visualizer", metadata(&[("repo", "/tmp/repo")]))
            .unwrap();
        db.update_project(
            &id,
            ProjectPatch {
                name: Some("renamed".to_string()),
                metadata: None,
            },
        )
        .unwrap();
        id
    };

    let db = open_db(&dir);
    let project = db.get_project(&id).unwrap();
    assert_eq!(project.name, "renamed");
    assert_eq!(project.metadata["repo"], "/tmp/repo");
    assert_eq!(db.list_projects().unwrap().len(), 1);
}

#[test]
fn test_missing_project_and_dangling_parent() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    assert!(matches!(db.get_project("nope"), Err(AppError::NotFound(_))));

    let orphan = NewNode::new("nope", "a", NodeValue::from(1.0));
    assert!(matches!(db.create_node(orphan), Err(AppError::ForeignKey(_))));

    let project = db.create_project("p", Metadata::new()).unwrap();
    let dangling = NewNode::new(&project, "a.b", NodeValue::from(1.0)).with_parent("ghost");
    assert!(matches!(db.create_node(dangling), Err(AppError::ForeignKey(_))));
}

// ============================================================================
// Change Log and Cascades
// ============================================================================

#[test]
fn test_change_log_records_every_mutation() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let project = db.create_project("log", Metadata::new()).unwrap();

    let id = db
        .create_node(NewNode::new(&project, "config", NodeValue::from("v1")))
        .unwrap();
    db.update_node(&id, NodePatch::value(NodeValue::from("v2")))
        .unwrap();
    db.delete_node(&id).unwrap();

    let changes = db.get_changes(&project, 10).unwrap();
    let ops: Vec<ChangeOperation> = changes.iter().map(|c| c.operation).collect();
    assert_eq!(
        ops,
        vec![
            ChangeOperation::Delete,
            ChangeOperation::Update,
            ChangeOperation::Create
        ]
    );
    assert_eq!(changes[1].old_value, Some(NodeValue::from("v1")));
    assert_eq!(changes[1].new_value, Some(NodeValue::from("v2")));
    assert!(changes.iter().all(|c| c.path() == Some("config")));
    assert!(changes[0].id > changes[1].id && changes[1].id > changes[2].id);
}

#[test]
fn test_project_delete_cascades_and_keeps_history() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let project = db.create_project("doomed", Metadata::new()).unwrap();
    let root = db
        .create_node(NewNode::new(&project, "src", NodeValue::Null))
        .unwrap();
    db.create_node(NewNode::new(&project, "src.app", NodeValue::from("code")).with_parent(&root))
        .unwrap();
    db.create_snapshot(&project, "before delete").unwrap();

    db.delete_project(&project).unwrap();

    assert!(db.get_project_nodes(&project, None).unwrap().is_empty());
    assert!(db.list_snapshots(&project).unwrap().is_empty());
    let changes = db.get_changes(&project, 10).unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.node_id.is_none()));
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn test_snapshot_restore_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let project = db.create_project("snap", Metadata::new()).unwrap();
    db.create_node(NewNode::new(&project, "a", NodeValue::from(1.0)))
        .unwrap();
    db.create_node(NewNode::new(&project, "b", NodeValue::from("two")))
        .unwrap();
    let before = db.get_project_nodes(&project, None).unwrap();
    let snapshot = db.create_snapshot(&project, "baseline").unwrap();

    let a = db.get_node_by_path(&project, "a").unwrap().unwrap();
    db.update_node(&a.id, NodePatch::value(NodeValue::from(9.0)))
        .unwrap();
    db.create_node(NewNode::new(&project, "c", NodeValue::from(true)))
        .unwrap();

    let report = db.restore_from_snapshot(&snapshot).unwrap();
    assert!(report.complete);
    assert_eq!(report.nodes_restored, 2);

    let after = db.get_project_nodes(&project, None).unwrap();
    let shape = |nodes: &[codeviz_desktop::models::Node]| {
        nodes
            .iter()
            .map(|n| (n.id.clone(), n.path.clone(), n.value.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&after), shape(&before));

    let latest = &db.get_changes(&project, 1).unwrap()[0];
    assert_eq!(latest.operation, ChangeOperation::Update);
    assert_eq!(latest.event(), Some("snapshot_restore"));
}

// ============================================================================
// Batches and Concurrency
// ============================================================================

#[test]
fn test_thousand_entry_batch_is_one_transaction() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let project = db.create_project("batch", Metadata::new()).unwrap();
    db.create_node(NewNode::new(&project, "items", NodeValue::Null))
        .unwrap();

    let entries: Vec<NewNode> = (0..1000)
        .map(|i| NewNode::new(&project, format!("items.n{:04}", i), NodeValue::from(i as f64)))
        .collect();
    let ids = db.batch_create_nodes(&entries).unwrap();
    assert_eq!(ids.len(), 1000);

    let nodes = db.get_project_nodes(&project, Some("items")).unwrap();
    assert_eq!(nodes.len(), 1001);
    let children = &nodes[1..];
    for (i, node) in children.iter().enumerate() {
        assert_eq!(node.path, format!("items.n{:04}", i));
        assert_eq!(node.id, ids[i]);
        assert!(node.parent_id.is_some());
    }

    let mut poisoned: Vec<NewNode> = (0..10)
        .map(|i| NewNode::new(&project, format!("more.n{}", i), NodeValue::from(1.0)))
        .collect();
    poisoned.push(NewNode::new(&project, "items.n0000", NodeValue::from(0.0)));
    assert!(db.batch_create_nodes(&poisoned).is_err());
    assert!(db.get_project_nodes(&project, Some("more")).unwrap().is_empty());
}

#[test]
fn test_distinct_projects_write_in_parallel() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let projects: Vec<String> = (0..4)
        .map(|i| db.create_project(&format!("p{}", i), Metadata::new()).unwrap())
        .collect();

    let handles: Vec<_> = projects
        .iter()
        .cloned()
        .map(|project| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    db.create_node(NewNode::new(&project, format!("n{}", i), NodeValue::from(i as f64)))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for project in &projects {
        assert_eq!(db.get_project_nodes(project, None).unwrap().len(), 25);
        assert_eq!(db.count_changes(project).unwrap(), 25);
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_file_drives_database_location() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.json");
    let mut config = ConfigService::open(&config_path).unwrap();
    assert!(config_path.exists());

    let db_path = dir.path().join("custom.db");
    config
        .update_config(SettingsUpdate {
            database_path: Some(db_path.clone()),
            ..SettingsUpdate::default()
        })
        .unwrap();

    let reopened = ConfigService::open(&config_path).unwrap();
    assert_eq!(reopened.database_path().unwrap(), db_path);

    let db = Database::from_config(reopened.get_config()).unwrap();
    assert!(db.is_healthy());
    assert!(db_path.exists());
}
