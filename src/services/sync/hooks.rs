//! Git Hooks
//!
//! Installs managed `pre-commit`, `post-commit` and `pre-push` scripts that
//! call back into the application, and runs the checks those scripts ask
//! for. Hook failures are reported as `HookOutcome`s with a recovery hint.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::SyncOptions;
use crate::services::git::{has_conflict_markers, GitSyncEngine, VcsPort};
use crate::services::node_store::NodeStore;
use crate::utils::error::{AppError, AppResult};

/// First-line marker identifying scripts this module owns
pub const MANAGED_MARKER: &str = "# codeviz-managed-hook";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    PreCommit,
    PostCommit,
    PrePush,
}

impl HookKind {
    pub const ALL: [HookKind; 3] = [HookKind::PreCommit, HookKind::PostCommit, HookKind::PrePush];

    /// Git's file name for the hook
    pub fn name(&self) -> &'static str {
        match self {
            HookKind::PreCommit => "pre-commit",
            HookKind::PostCommit => "post-commit",
            HookKind::PrePush => "pre-push",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        HookKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| AppError::validation(format!("unknown hook: {}", s)))
    }
}

/// What to install
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub kinds: Vec<HookKind>,
    /// Overrides `sync.hook_command`
    #[serde(default)]
    pub command: Option<String>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            kinds: HookKind::ALL.to_vec(),
            command: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookInstallResult {
    /// Hook names written
    pub installed: Vec<String>,
    /// Unmanaged hooks moved aside to `<name>.local` and chained
    pub preserved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookOutcome {
    pub hook: HookKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<String>,
}

impl HookOutcome {
    fn passed(hook: HookKind) -> Self {
        Self {
            hook,
            success: true,
            error: None,
            recovery: None,
        }
    }

    fn failed(hook: HookKind, failure: HookFailure) -> Self {
        Self {
            hook,
            success: false,
            error: Some(failure.error),
            recovery: Some(failure.recovery),
        }
    }
}

struct HookFailure {
    error: String,
    recovery: String,
}

impl HookFailure {
    fn new(error: impl Into<String>, recovery: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            recovery: recovery.into(),
        }
    }
}

impl From<AppError> for HookFailure {
    fn from(err: AppError) -> Self {
        let recovery = match &err {
            AppError::ExternalTool { .. } => "Check that git works in this repository and retry",
            AppError::Conflict(_) => "Resolve the reported conflicts and retry",
            AppError::NotFound(_) => "Check the repository path and project, then retry",
            _ => "Retry; if the problem persists, reload the project",
        };
        Self::new(err.to_string(), recovery)
    }
}

type HookResult = Result<(), HookFailure>;

fn script(kind: HookKind, command: &str) -> String {
    let name = kind.name();
    format!(
        "#!/bin/sh\n\
         {marker}\n\
         hook_dir=$(dirname \"$0\")\n\
         if [ -x \"$hook_dir/{name}.local\" ]; then\n\
         \x20   \"$hook_dir/{name}.local\" \"$@\" || exit $?\n\
         fi\n\
         command -v {command} >/dev/null 2>&1 || exit 0\n\
         exec {command} hook {name} \"$@\"\n",
        marker = MANAGED_MARKER,
        name = name,
        command = command,
    )
}

fn is_managed(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|content| content.lines().any(|line| line.trim() == MANAGED_MARKER))
        .unwrap_or(false)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> AppResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> AppResult<()> {
    Ok(())
}

/// Write managed hook scripts into the repository's hooks directory.
/// Reinstalling over managed scripts is idempotent.
pub fn install_git_hooks<V: VcsPort>(
    engine: &GitSyncEngine<V>,
    repo: &Path,
    config: &HookConfig,
) -> AppResult<HookInstallResult> {
    let command = config
        .command
        .clone()
        .unwrap_or_else(|| engine.settings().hook_command.clone());
    if command.trim().is_empty() || command.contains(char::is_whitespace) {
        return Err(AppError::validation(format!("invalid hook command: {:?}", command)));
    }

    let dir = engine.hooks_dir(repo)?;
    fs::create_dir_all(&dir)?;

    let mut result = HookInstallResult::default();
    for kind in &config.kinds {
        let path = dir.join(kind.name());
        if path.exists() && !is_managed(&path) {
            let local = dir.join(format!("{}.local", kind.name()));
            fs::rename(&path, &local)?;
            make_executable(&local)?;
            result.preserved.push(kind.name().to_string());
        }
        fs::write(&path, script(*kind, &command))?;
        make_executable(&path)?;
        result.installed.push(kind.name().to_string());
    }

    tracing::info!(
        "[Hooks] Installed {} hooks in {} ({} preserved)",
        result.installed.len(),
        dir.display(),
        result.preserved.len()
    );
    Ok(result)
}

/// Run the checks behind `kind`. Never returns an error and never panics.
pub fn trigger_hook<V: VcsPort>(
    engine: &GitSyncEngine<V>,
    store: &mut NodeStore,
    repo: &Path,
    kind: HookKind,
) -> HookOutcome {
    let run = catch_unwind(AssertUnwindSafe(|| match kind {
        HookKind::PreCommit => pre_commit(engine, store, repo),
        HookKind::PostCommit => post_commit(engine, store, repo),
        HookKind::PrePush => pre_push(engine, repo),
    }));

    let result = run.unwrap_or_else(|_| {
        Err(HookFailure::new(
            format!("{} hook panicked", kind.name()),
            "Reload the project and retry; report the problem if it repeats",
        ))
    });

    match result {
        Ok(()) => {
            tracing::debug!("[Hooks] {} passed", kind.name());
            HookOutcome::passed(kind)
        }
        Err(failure) => {
            tracing::warn!("[Hooks] {} failed: {}", kind.name(), failure.error);
            HookOutcome::failed(kind, failure)
        }
    }
}

fn unresolved<V: VcsPort>(engine: &GitSyncEngine<V>, repo: &Path) -> HookResult {
    let mut paths: Vec<String> = engine
        .detect_conflicts(repo)?
        .into_iter()
        .chain(engine.conflicts(repo))
        .map(|record| record.path)
        .collect();
    paths.sort();
    paths.dedup();
    if paths.is_empty() {
        return Ok(());
    }
    Err(HookFailure::new(
        format!("unresolved conflicts: {}", paths.join(", ")),
        "Resolve each path (ours, theirs or manual), stage it, and retry",
    ))
}

fn pre_commit<V: VcsPort>(engine: &GitSyncEngine<V>, store: &mut NodeStore, repo: &Path) -> HookResult {
    let problems = store.check_integrity();
    if !problems.is_empty() {
        return Err(HookFailure::new(
            format!("node store integrity check failed: {}", problems.join("; ")),
            "Reload the project or restore a snapshot, then commit again",
        ));
    }

    unresolved(engine, repo)?;

    let root = fs::canonicalize(repo).map_err(AppError::from)?;
    let marked: Vec<String> = engine
        .staged_files(repo)?
        .into_iter()
        .filter(|file| {
            fs::read_to_string(root.join(file))
                .map(|content| has_conflict_markers(&content))
                .unwrap_or(false)
        })
        .collect();
    if !marked.is_empty() {
        return Err(HookFailure::new(
            format!("staged files contain conflict markers: {}", marked.join(", ")),
            "Remove the conflict markers, stage the files again, and commit",
        ));
    }

    if engine.settings().sync_on_pre_commit {
        let result = engine.sync_to_git(store, repo)?;
        if !result.success {
            let paths: Vec<&str> = result.conflicts.iter().map(|c| c.path.as_str()).collect();
            return Err(HookFailure::new(
                format!("export found conflicts: {}", paths.join(", ")),
                "Resolve the conflicts, then commit again",
            ));
        }
    }
    Ok(())
}

fn post_commit<V: VcsPort>(engine: &GitSyncEngine<V>, store: &mut NodeStore, repo: &Path) -> HookResult {
    let result = engine.sync_from_git(store, repo, SyncOptions { incremental: true })?;
    if !result.conflicts.is_empty() {
        let paths: Vec<&str> = result.conflicts.iter().map(|c| c.path.as_str()).collect();
        return Err(HookFailure::new(
            format!("import left conflicts: {}", paths.join(", ")),
            "The commit succeeded; resolve the conflicts before the next sync",
        ));
    }
    Ok(())
}

fn pre_push<V: VcsPort>(engine: &GitSyncEngine<V>, repo: &Path) -> HookResult {
    let state = engine.merge_state(repo)?;
    if state.in_progress() {
        return Err(HookFailure::new(
            format!("a {:?} operation is in progress", state).to_lowercase(),
            "Finish or abort the in-progress operation before pushing",
        ));
    }
    unresolved(engine, repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LimitSettings, Metadata, SyncSettings};
    use crate::services::git::fake::FakeVcs;
    use crate::services::git::MergeStateKind;
    use crate::storage::Database;
    use codeviz_core::NodeValue;
    use tempfile::TempDir;

    fn setup_with(settings: SyncSettings) -> (TempDir, GitSyncEngine<FakeVcs>, NodeStore) {
        let dir = tempfile::tempdir().unwrap();
        let vcs = FakeVcs::new();
        vcs.init(dir.path()).unwrap();
        let engine = GitSyncEngine::with_vcs(vcs, settings, LimitSettings::default());
        let db = Database::new_in_memory().unwrap();
        let project_id = db.create_project("hooks", Metadata::new()).unwrap();
        let store = NodeStore::open(db, &project_id).unwrap();
        (dir, engine, store)
    }

    fn setup() -> (TempDir, GitSyncEngine<FakeVcs>, NodeStore) {
        setup_with(SyncSettings::default())
    }

    #[test]
    fn test_hook_kind_names() {
        for kind in HookKind::ALL {
            assert_eq!(HookKind::parse(kind.name()).unwrap(), kind);
        }
        assert!(HookKind::parse("post-merge").is_err());
    }

    #[test]
    fn test_install_writes_managed_scripts() {
        let (dir, engine, _) = setup();
        let result = install_git_hooks(&engine, dir.path(), &HookConfig::default()).unwrap();
        assert_eq!(result.installed, vec!["pre-commit", "post-commit", "pre-push"]);
        assert!(result.preserved.is_empty());

        let hooks = dir.path().join(".git/hooks");
        for name in ["pre-commit", "post-commit", "pre-push"] {
            let content = fs::read_to_string(hooks.join(name)).unwrap();
            assert!(content.starts_with("#!/bin/sh\n"));
            assert!(content.contains(MANAGED_MARKER));
            assert!(content.contains(&format!("codeviz hook {}", name)));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(hooks.join("pre-commit")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_install_preserves_unmanaged_hook() {
        let (dir, engine, _) = setup();
        let hooks = dir.path().join(".git/hooks");
        fs::write(hooks.join("pre-commit"), "#!/bin/sh\necho lint\n").unwrap();

        let result = install_git_hooks(&engine, dir.path(), &HookConfig::default()).unwrap();
        assert_eq!(result.preserved, vec!["pre-commit"]);
        assert_eq!(
            fs::read_to_string(hooks.join("pre-commit.local")).unwrap(),
            "#!/bin/sh\necho lint\n"
        );
        assert!(fs::read_to_string(hooks.join("pre-commit"))
            .unwrap()
            .contains("pre-commit.local"));

        let again = install_git_hooks(&engine, dir.path(), &HookConfig::default()).unwrap();
        assert!(again.preserved.is_empty());
        assert_eq!(
            fs::read_to_string(hooks.join("pre-commit.local")).unwrap(),
            "#!/bin/sh\necho lint\n"
        );
    }

    #[test]
    fn test_install_rejects_bad_command() {
        let (dir, engine, _) = setup();
        let config = HookConfig {
            command: Some("rm -rf".to_string()),
            ..HookConfig::default()
        };
        assert!(matches!(
            install_git_hooks(&engine, dir.path(), &config),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_pre_commit_passes_on_clean_state() {
        let (dir, engine, mut store) = setup();
        store.set("src.app", "ok").unwrap();
        let outcome = trigger_hook(&engine, &mut store, dir.path(), HookKind::PreCommit);
        assert!(outcome.success, "{:?}", outcome);
        assert!(outcome.recovery.is_none());
    }

    #[test]
    fn test_pre_commit_blocks_on_conflict() {
        let (dir, engine, mut store) = setup();
        fs::write(dir.path().join("app.js"), "disk").unwrap();
        store.set("app", "store").unwrap();
        assert!(!engine.sync_to_git(&mut store, dir.path()).unwrap().success);

        let outcome = trigger_hook(&engine, &mut store, dir.path(), HookKind::PreCommit);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("app.js"));
        assert!(outcome.recovery.is_some());
    }

    #[test]
    fn test_pre_commit_rejects_staged_markers() {
        let (dir, engine, mut store) = setup();
        fs::write(
            dir.path().join("app.js"),
            "<<<<<<< HEAD\na\n=======\nb\n>>>>>>> x\n",
        )
        .unwrap();
        engine.vcs().stage(dir.path(), &["app.js".to_string()]).unwrap();

        let outcome = trigger_hook(&engine, &mut store, dir.path(), HookKind::PreCommit);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("conflict markers"));
    }

    #[test]
    fn test_pre_commit_can_export() {
        let settings = SyncSettings {
            sync_on_pre_commit: true,
            ..SyncSettings::default()
        };
        let (dir, engine, mut store) = setup_with(settings);
        store.set("src.app", "exported").unwrap();

        let outcome = trigger_hook(&engine, &mut store, dir.path(), HookKind::PreCommit);
        assert!(outcome.success);
        assert_eq!(
            fs::read_to_string(dir.path().join("src/app.js")).unwrap(),
            "exported"
        );
    }

    #[test]
    fn test_post_commit_imports_incrementally() {
        let (dir, engine, mut store) = setup();
        fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();

        let outcome = trigger_hook(&engine, &mut store, dir.path(), HookKind::PostCommit);
        assert!(outcome.success);
        assert_eq!(
            store.get("main", NodeValue::Null).unwrap(),
            NodeValue::from("print('hi')\n")
        );
    }

    #[test]
    fn test_pre_push_requires_no_merge_in_progress() {
        let (dir, engine, mut store) = setup();
        assert!(trigger_hook(&engine, &mut store, dir.path(), HookKind::PrePush).success);

        engine.vcs().set_merge_state(MergeStateKind::Rebasing, &[]);
        let outcome = trigger_hook(&engine, &mut store, dir.path(), HookKind::PrePush);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("rebasing"));
    }

    #[test]
    fn test_hook_on_missing_repository_reports_failure() {
        let (dir, engine, mut store) = setup();
        let missing = dir.path().join("nope");
        let outcome = trigger_hook(&engine, &mut store, &missing, HookKind::PostCommit);
        assert!(!outcome.success);
        assert!(outcome.recovery.is_some());
    }
}
