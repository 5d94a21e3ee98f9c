//! Git Sync Integration Tests
//!
//! Runs the sync engine against real repositories created with the `git`
//! binary. Every test returns early when git is not installed.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use codeviz_desktop::models::{
    ConflictKind, LimitSettings, Metadata, PathState, Resolution, SyncOptions, SyncSettings,
};
use codeviz_desktop::services::git::{GitCli, MergeStateKind};
use codeviz_desktop::services::sync::{install_git_hooks, trigger_hook, HookConfig, HookKind};
use codeviz_desktop::{Database, GitSyncEngine, NodeStore, NodeValue};

// ============================================================================
// Helper Functions
// ============================================================================

fn git(path: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(path)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Initialize a repository on branch `main` with a test identity
fn init_git_repo(path: &Path) -> bool {
    git(path, &["init", "-q"])
        && git(path, &["symbolic-ref", "HEAD", "refs/heads/main"])
        && git(path, &["config", "user.email", "test@example.com"])
        && git(path, &["config", "user.name", "Test User"])
        && git(path, &["config", "commit.gpgsign", "false"])
}

fn commit_all(path: &Path, message: &str) -> bool {
    git(path, &["add", "-A"]) && git(path, &["commit", "-q", "-m", message])
}

fn write_file(root: &Path, file: &str, content: &str) {
    let path = root.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn read_file(root: &Path, file: &str) -> String {
    fs::read_to_string(root.join(file)).unwrap()
}

/// Temp repository, engine and store; `None` when git is unavailable
fn setup() -> Option<(TempDir, GitSyncEngine, NodeStore)> {
    if !GitCli::is_available() {
        eprintln!("git not available, skipping");
        return None;
    }
    let dir = TempDir::new().unwrap();
    if !init_git_repo(dir.path()) {
        return None;
    }
    let engine = GitSyncEngine::new(SyncSettings::default(), LimitSettings::default());
    let db = Database::open(&dir.path().join(".git").join("codeviz-test.db")).unwrap();
    let project = db.create_project("repo", Metadata::new()).unwrap();
    let store = NodeStore::open(db, &project).unwrap();
    Some((dir, engine, store))
}

// ============================================================================
// Export and Import
// ============================================================================

#[test]
fn test_export_new_node_to_file() {
    let Some((dir, engine, mut store)) = setup() else {
        return;
    };
    store.set("src.app", "function app() {}\n").unwrap();

    let result = engine.sync_to_git(&mut store, dir.path()).unwrap();
    assert!(result.success);
    assert_eq!(result.files_written, 1);
    assert_eq!(read_file(dir.path(), "src/app.js"), "function app() {}\n");

    let scan = engine.scan_repository(dir.path()).unwrap();
    assert!(scan.complete);
    assert!(scan.files.contains(&"src/app.js".to_string()));
    assert!(scan.commits.is_empty());
}

#[test]
fn test_import_is_idempotent() {
    let Some((dir, engine, mut store)) = setup() else {
        return;
    };
    write_file(dir.path(), "src/app.js", "export const app = 1;\n");
    write_file(dir.path(), "src/util/math.py", "def add(a, b):\n    return a + b\n");
    write_file(dir.path(), "README.md", "# Repo\n");
    write_file(dir.path(), ".gitignore", "*.log\n");
    write_file(dir.path(), "debug.log", "ignored\n");
    assert!(commit_all(dir.path(), "initial"));

    let first = engine
        .sync_from_git(&mut store, dir.path(), SyncOptions::default())
        .unwrap();
    assert!(first.complete);
    assert_eq!(first.files_processed, 4);
    assert_eq!(first.nodes_created, 4);
    assert!(store.resolve("debug").unwrap().is_none());

    let math = store.resolve("src.util.math").unwrap().unwrap();
    assert_eq!(math.language.as_deref(), Some("python"));
    assert_eq!(
        store.get("[\".gitignore\"]", NodeValue::Null).unwrap(),
        NodeValue::from("*.log\n")
    );

    let logged = store.database().count_changes(store.project_id()).unwrap();
    let second = engine
        .sync_from_git(&mut store, dir.path(), SyncOptions::default())
        .unwrap();
    assert_eq!(second.nodes_created + second.nodes_updated, 0);
    assert!(second.conflicts.is_empty());
    assert_eq!(
        store.database().count_changes(store.project_id()).unwrap(),
        logged
    );
}

#[test]
fn test_concurrent_edits_conflict_without_overwrite() {
    let Some((dir, engine, mut store)) = setup() else {
        return;
    };
    write_file(dir.path(), "src/app.js", "base\n");
    assert!(commit_all(dir.path(), "base"));
    engine
        .sync_from_git(&mut store, dir.path(), SyncOptions::default())
        .unwrap();

    store.set("src.app", "edited in the visualizer\n").unwrap();
    write_file(dir.path(), "src/app.js", "edited in the editor\n");

    let export = engine.sync_to_git(&mut store, dir.path()).unwrap();
    assert!(!export.success);
    assert_eq!(export.conflicts.len(), 1);
    assert_eq!(export.conflicts[0].kind, ConflictKind::Diverged);
    assert_eq!(export.outcomes[0].state, PathState::Conflicted);
    assert_eq!(read_file(dir.path(), "src/app.js"), "edited in the editor\n");

    let import = engine
        .sync_from_git(&mut store, dir.path(), SyncOptions::default())
        .unwrap();
    assert_eq!(import.conflicts.len(), 1);
    assert_eq!(
        store.get("src.app", NodeValue::Null).unwrap(),
        NodeValue::from("edited in the visualizer\n")
    );

    let strategies = engine.get_resolution_strategies("src/app.js");
    assert_eq!(strategies.len(), 3);
    engine
        .apply_resolution(
            &mut store,
            dir.path(),
            "src/app.js",
            Resolution::Manual("merged by hand\n".to_string()),
        )
        .unwrap();
    assert!(engine.conflicts(dir.path()).is_empty());
    assert_eq!(read_file(dir.path(), "src/app.js"), "merged by hand\n");
    assert_eq!(
        engine.staged_files(dir.path()).unwrap(),
        vec!["src/app.js".to_string()]
    );

    let sha = engine.commit(dir.path(), "resolve").unwrap();
    assert_eq!(sha.len(), 40);
    let scan = engine.scan_repository(dir.path()).unwrap();
    assert_eq!(scan.commits[0].message, "resolve");
    assert_eq!(scan.commits.len(), 2);
}

// ============================================================================
// Branches and Merges
// ============================================================================

#[test]
fn test_branch_views_and_switching() {
    let Some((dir, engine, mut store)) = setup() else {
        return;
    };
    write_file(dir.path(), "a.js", "a\n");
    write_file(dir.path(), "b.js", "b\n");
    assert!(commit_all(dir.path(), "two files"));
    engine
        .sync_from_git(&mut store, dir.path(), SyncOptions::default())
        .unwrap();

    engine.create_branch(dir.path(), "feature/slim", None).unwrap();
    assert!(git(dir.path(), &["checkout", "-q", "feature/slim"]));
    assert!(git(dir.path(), &["rm", "-q", "b.js"]));
    assert!(git(dir.path(), &["commit", "-q", "-m", "drop b"]));
    assert!(git(dir.path(), &["checkout", "-q", "main"]));

    let views = engine.map_branches_to_views(dir.path()).unwrap();
    assert_eq!(views.len(), 2);
    let slim = views.iter().find(|v| v.branch == "feature/slim").unwrap();
    assert!(slim.view_id.starts_with("branch-feature-slim-"));
    assert!(views.iter().any(|v| v.branch == "main" && v.is_head));

    let switched = engine
        .switch_branch(&mut store, dir.path(), "feature/slim")
        .unwrap();
    assert_eq!(switched.unavailable, vec!["b".to_string()]);
    assert!(store.resolve("b").unwrap().is_none());
    assert!(store.resolve("a").unwrap().is_some());

    engine.switch_branch(&mut store, dir.path(), "main").unwrap();
    engine
        .sync_from_git(&mut store, dir.path(), SyncOptions::default())
        .unwrap();
    assert!(store.resolve("b").unwrap().is_some());
}

#[test]
fn test_merge_conflict_detection_and_resolution() {
    let Some((dir, engine, mut store)) = setup() else {
        return;
    };
    write_file(dir.path(), "app.js", "base\n");
    assert!(commit_all(dir.path(), "base"));

    engine.create_branch(dir.path(), "feature", None).unwrap();
    assert!(git(dir.path(), &["checkout", "-q", "feature"]));
    write_file(dir.path(), "app.js", "feature\n");
    assert!(commit_all(dir.path(), "feature change"));
    assert!(git(dir.path(), &["checkout", "-q", "main"]));
    write_file(dir.path(), "app.js", "main\n");
    assert!(commit_all(dir.path(), "main change"));

    let merge = engine.merge_branch(dir.path(), "feature").unwrap();
    assert!(!merge.success);
    assert_eq!(merge.conflicts.len(), 1);
    assert_eq!(merge.conflicts[0].path, "app.js");
    assert_eq!(merge.conflicts[0].kind, ConflictKind::Merge);
    assert_eq!(merge.conflicts[0].regions, 1);
    assert_eq!(engine.merge_state(dir.path()).unwrap(), MergeStateKind::Merging);

    let detected = engine.detect_conflicts(dir.path()).unwrap();
    assert_eq!(detected.len(), 1);

    let pre_push = trigger_hook(&engine, &mut store, dir.path(), HookKind::PrePush);
    assert!(!pre_push.success);
    assert!(pre_push.recovery.is_some());

    engine
        .apply_resolution(&mut store, dir.path(), "app.js", Resolution::Theirs)
        .unwrap();
    assert_eq!(read_file(dir.path(), "app.js"), "feature\n");
    assert_eq!(
        store.get("app", NodeValue::Null).unwrap(),
        NodeValue::from("feature\n")
    );

    engine.commit(dir.path(), "merge feature").unwrap();
    assert_eq!(engine.merge_state(dir.path()).unwrap(), MergeStateKind::None);
    assert!(engine.detect_conflicts(dir.path()).unwrap().is_empty());
}

#[test]
fn test_merge_of_unknown_branch_reports_error() {
    let Some((dir, engine, _store)) = setup() else {
        return;
    };
    write_file(dir.path(), "app.js", "base\n");
    assert!(commit_all(dir.path(), "base"));

    let merge = engine.merge_branch(dir.path(), "does-not-exist").unwrap();
    assert!(!merge.success);
    assert!(merge.conflicts.is_empty());
    assert!(merge.error.is_some());
}

// ============================================================================
// Hooks
// ============================================================================

#[test]
fn test_install_hooks_into_real_repository() {
    let Some((dir, engine, _store)) = setup() else {
        return;
    };
    let hooks = dir.path().join(".git").join("hooks");
    fs::create_dir_all(&hooks).unwrap();
    fs::write(hooks.join("pre-push"), "#!/bin/sh\nexit 0\n").unwrap();

    let result = install_git_hooks(&engine, dir.path(), &HookConfig::default()).unwrap();
    assert_eq!(result.installed.len(), 3);
    assert_eq!(result.preserved, vec!["pre-push".to_string()]);
    assert!(hooks.join("pre-commit").exists());
    assert!(hooks.join("post-commit").exists());
    assert!(hooks.join("pre-push.local").exists());
}

#[test]
fn test_post_commit_hook_imports_changes() {
    let Some((dir, engine, mut store)) = setup() else {
        return;
    };
    write_file(dir.path(), "lib/core.rs", "pub fn core() {}\n");
    assert!(commit_all(dir.path(), "core"));

    let outcome = trigger_hook(&engine, &mut store, dir.path(), HookKind::PostCommit);
    assert!(outcome.success, "{:?}", outcome);
    let core = store.resolve("lib.core").unwrap().unwrap();
    assert_eq!(core.language.as_deref(), Some("rust"));

    let pre_commit = trigger_hook(&engine, &mut store, dir.path(), HookKind::PreCommit);
    assert!(pre_commit.success, "{:?}", pre_commit);
}
