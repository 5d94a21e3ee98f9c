//! Git Sync Engine
//!
//! Projects a git working tree onto a node store and back. Every file has a
//! `SyncBaseline` recording the fingerprint both sides agreed on at the last
//! sync; "changed" always means "differs from the baseline". Paths where
//! both sides changed to different content are reported as conflicts and
//! left untouched until resolved.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use codeviz_core::NodePath;
use dashmap::DashMap;
use regex::Regex;

use crate::models::{
    AppConfig, ConflictKind, ConflictRecord, LimitSettings, Node, PathOutcome, PathState,
    Resolution, ResolutionKind, ResolutionStrategy, SyncBaseline, SyncFromResult, SyncOptions,
    SyncPhase, SyncSettings, SyncToResult,
};
use crate::services::node_store::{NodeStore, NodeWrite, SetOptions};
use crate::services::sync::lock::RepoLocks;
use crate::utils::deadline::Deadline;
use crate::utils::error::{AppError, AppResult};
use crate::utils::hash::fingerprint;

use super::conflict::{has_conflict_markers, parse_conflicts, resolve_markers};
use super::language::{decode_text, detect_language, extension_for};
use super::types::{
    BranchView, ConflictSide, MergeBranchResult, MergeStateKind, ScanResult, SwitchBranchResult,
};
use super::vcs::{GitCli, MergeOutcome, VcsPort};

/// Commits returned by `scan_repository`
pub const LOG_LIMIT: usize = 1000;

/// Node type given to imported files
const FILE_NODE_TYPE: &str = "file";

// ============================================================================
// Path Mapping
// ============================================================================

/// Stem of a file name, or `None` when the full name must be kept
/// (`app.test.js`, `.gitignore`).
fn file_stem(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        None => Some(name),
        Some((stem, _)) if stem.is_empty() || stem.contains('.') => None,
        Some((stem, _)) => Some(stem),
    }
}

/// Map repository files to node paths.
///
/// `src/app.js` maps to `src.app`. The full file name is kept as the last
/// segment when the stem contains `.`, when two files share a stem, or when
/// the stem path is also a directory. A baseline's recorded node path wins
/// over the derived one.
pub fn map_files(
    files: &[String],
    baselines: &HashMap<String, SyncBaseline>,
) -> Vec<(String, NodePath)> {
    let mut dirs: HashSet<Vec<String>> = HashSet::new();
    let mut candidates: Vec<(Vec<String>, String, Option<Vec<String>>)> = Vec::new();
    let mut stem_counts: HashMap<Vec<String>, usize> = HashMap::new();

    for file in files {
        let parts: Vec<&str> = file.split('/').collect();
        let Some((name, dir)) = parts.split_last() else {
            continue;
        };
        let dir: Vec<String> = dir.iter().map(|s| s.to_string()).collect();
        for depth in 1..=dir.len() {
            dirs.insert(dir[..depth].to_vec());
        }

        let stem_path = file_stem(name).map(|stem| {
            let mut path = dir.clone();
            path.push(stem.to_string());
            path
        });
        if let Some(path) = &stem_path {
            *stem_counts.entry(path.clone()).or_default() += 1;
        }
        candidates.push((dir, name.to_string(), stem_path));
    }

    files
        .iter()
        .zip(candidates)
        .filter_map(|(file, (dir, name, stem_path))| {
            if let Some(baseline) = baselines.get(file) {
                if let Ok(path) = NodePath::parse(&baseline.node_path) {
                    return Some((file.clone(), path));
                }
            }

            let segments = match stem_path {
                Some(path) if stem_counts.get(&path) == Some(&1) && !dirs.contains(&path) => path,
                _ => {
                    let mut path = dir;
                    path.push(name);
                    path
                }
            };
            match NodePath::from_segments(segments) {
                Ok(path) => Some((file.clone(), path)),
                Err(e) => {
                    tracing::debug!("[GitSync] Cannot map {}: {}", file, e);
                    None
                }
            }
        })
        .collect()
}

/// Repository file for a node with no baseline, or `None` when a segment
/// cannot be a file name.
pub fn export_path(path: &NodePath, language: Option<&str>, default_extension: &str) -> Option<String> {
    let segments = path.segments();
    let unsafe_segment = |s: &String| {
        s.is_empty() || s == "." || s == ".." || s.contains('/') || s.contains('\\')
    };
    if segments.is_empty() || segments.iter().any(unsafe_segment) {
        return None;
    }

    let (last, dirs) = segments.split_last()?;
    let file_name = if last.contains('.') {
        last.clone()
    } else {
        let extension = language.and_then(extension_for).unwrap_or(default_extension);
        format!("{}.{}", last, extension)
    };

    let mut parts: Vec<&str> = dirs.iter().map(String::as_str).collect();
    parts.push(&file_name);
    Some(parts.join("/"))
}

fn slug_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[^a-z0-9]+").ok())
        .as_ref()
}

/// Stable view id for a branch: `branch-<slug>-<8 hex of sha256(name)>`
pub fn branch_view_id(branch: &str) -> String {
    let lower = branch.to_lowercase();
    let slug = match slug_pattern() {
        Some(pattern) => pattern.replace_all(&lower, "-").trim_matches('-').to_string(),
        None => lower.chars().filter(|c| c.is_ascii_alphanumeric()).collect(),
    };
    let slug = if slug.is_empty() { "branch".to_string() } else { slug };
    let digest = fingerprint(branch.as_bytes());
    format!("branch-{}-{}", slug, &digest[..8])
}

// ============================================================================
// File Helpers
// ============================================================================

/// Reject absolute paths and `..` so writes stay inside the repository
fn check_relative(file: &str) -> AppResult<()> {
    let path = Path::new(file);
    let normal = !file.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if normal {
        Ok(())
    } else {
        Err(AppError::validation(format!("not a repository-relative path: {}", file)))
    }
}

fn read_file(path: &Path) -> AppResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_file(root: &Path, file: &str, content: &str) -> AppResult<()> {
    let path = root.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn node_text(node: &Node) -> Option<String> {
    node.value.to_text().ok()
}

/// Fingerprint standing in for a node with no text form. Never equal to a
/// content fingerprint, which is always 64 hex digits.
const NO_TEXT_FINGERPRINT: &str = "no-text";

/// Fingerprint of a node's content, comparable with file fingerprints
fn node_fingerprint(node: &Node) -> String {
    match node_text(node) {
        Some(text) => fingerprint(text.as_bytes()),
        None => NO_TEXT_FINGERPRINT.to_string(),
    }
}

fn new_baseline(project_id: &str, file: &str, node_path: &str, fingerprint: String, language: &str) -> SyncBaseline {
    SyncBaseline {
        project_id: project_id.to_string(),
        file_path: file.to_string(),
        node_path: node_path.to_string(),
        fingerprint,
        language: language.to_string(),
        updated_at: String::new(),
    }
}

/// One node scheduled for export
struct ExportItem {
    node_path: String,
    file: String,
    /// `None` when the node has no text form
    content: Option<String>,
    language: String,
    baseline: Option<SyncBaseline>,
}

/// Resets a repository's phase to `Idle` when a cycle ends, however it ends
struct PhaseGuard<'a> {
    phases: &'a DashMap<PathBuf, SyncPhase>,
    repo: PathBuf,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phases: &'a DashMap<PathBuf, SyncPhase>, repo: &Path) -> Self {
        phases.insert(repo.to_path_buf(), SyncPhase::Scanning);
        Self {
            phases,
            repo: repo.to_path_buf(),
        }
    }

    fn set(&self, phase: SyncPhase) {
        self.phases.insert(self.repo.clone(), phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phases.insert(self.repo.clone(), SyncPhase::Idle);
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct GitSyncEngine<V: VcsPort = GitCli> {
    vcs: V,
    locks: RepoLocks,
    settings: SyncSettings,
    limits: LimitSettings,
    /// (canonical repo, file) -> unresolved conflict
    conflicted: DashMap<(PathBuf, String), ConflictRecord>,
    phases: DashMap<PathBuf, SyncPhase>,
}

impl GitSyncEngine<GitCli> {
    pub fn new(settings: SyncSettings, limits: LimitSettings) -> Self {
        Self::with_vcs(GitCli::new(), settings, limits)
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.sync.clone(), config.limits.clone())
    }
}

impl<V: VcsPort> GitSyncEngine<V> {
    pub fn with_vcs(vcs: V, settings: SyncSettings, limits: LimitSettings) -> Self {
        Self {
            vcs,
            locks: RepoLocks::new(),
            settings,
            limits,
            conflicted: DashMap::new(),
            phases: DashMap::new(),
        }
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn locks(&self) -> &RepoLocks {
        &self.locks
    }

    /// Current phase of `repo`; `Idle` when no cycle is running
    pub fn phase(&self, repo: &Path) -> SyncPhase {
        RepoLocks::canonical(repo)
            .ok()
            .and_then(|root| self.phases.get(&root).map(|p| *p))
            .unwrap_or_default()
    }

    /// Unresolved conflicts tracked for `repo`, ordered by path
    pub fn conflicts(&self, repo: &Path) -> Vec<ConflictRecord> {
        let Ok(root) = RepoLocks::canonical(repo) else {
            return Vec::new();
        };
        let mut records: Vec<ConflictRecord> = self
            .conflicted
            .iter()
            .filter(|entry| entry.key().0 == root)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    fn is_conflicted(&self, root: &Path, file: &str) -> Option<ConflictRecord> {
        self.conflicted
            .get(&(root.to_path_buf(), file.to_string()))
            .map(|entry| entry.value().clone())
    }

    fn record_conflict(&self, root: &Path, record: ConflictRecord) -> ConflictRecord {
        tracing::warn!("[GitSync] Conflict on {} ({:?})", record.path, record.kind);
        self.conflicted
            .insert((root.to_path_buf(), record.path.clone()), record.clone());
        record
    }

    fn scan_deadline(&self) -> Deadline {
        Deadline::from_millis(Some(self.limits.scan_timeout_ms))
    }

    // ========================================================================
    // Repository
    // ========================================================================

    pub fn init_repository(&self, repo: &Path) -> AppResult<()> {
        self.vcs.init(repo)?;
        tracing::info!("[GitSync] Initialized repository at {}", repo.display());
        Ok(())
    }

    pub fn scan_repository(&self, repo: &Path) -> AppResult<ScanResult> {
        self.scan_repository_within(repo, self.scan_deadline())
    }

    /// Files, branches and history of `repo`. Steps not reached before the
    /// deadline are left empty and `complete` is false.
    pub fn scan_repository_within(&self, repo: &Path, deadline: Deadline) -> AppResult<ScanResult> {
        self.locks.with_lock(repo, |root| {
            let _phase = PhaseGuard::enter(&self.phases, root);
            let mut result = ScanResult::default();

            result.files = self.vcs.list_files(root)?;
            if deadline.is_expired() {
                tracing::warn!("[GitSync] Scan of {} hit its deadline", root.display());
                return Ok(result);
            }
            result.branches = self.vcs.list_branches(root)?;
            if deadline.is_expired() {
                tracing::warn!("[GitSync] Scan of {} hit its deadline", root.display());
                return Ok(result);
            }
            result.commits = self.vcs.log(root, LOG_LIMIT)?;
            result.complete = true;

            tracing::info!(
                "[GitSync] Scanned {}: {} files, {} branches, {} commits",
                root.display(),
                result.files.len(),
                result.branches.len(),
                result.commits.len()
            );
            Ok(result)
        })
    }

    pub fn commit(&self, repo: &Path, message: &str) -> AppResult<String> {
        self.locks.with_lock(repo, |root| self.vcs.commit(root, message))
    }

    pub fn staged_files(&self, repo: &Path) -> AppResult<Vec<String>> {
        self.locks.with_lock(repo, |root| self.vcs.staged_files(root))
    }

    pub fn merge_state(&self, repo: &Path) -> AppResult<MergeStateKind> {
        self.locks.with_lock(repo, |root| self.vcs.merge_state(root))
    }

    pub fn hooks_dir(&self, repo: &Path) -> AppResult<PathBuf> {
        self.locks.with_lock(repo, |root| self.vcs.hooks_dir(root))
    }

    // ========================================================================
    // Import
    // ========================================================================

    pub fn sync_from_git(
        &self,
        store: &mut NodeStore,
        repo: &Path,
        options: SyncOptions,
    ) -> AppResult<SyncFromResult> {
        self.sync_from_git_within(store, repo, options, self.scan_deadline())
    }

    /// Import text files into the store, then record baselines.
    pub fn sync_from_git_within(
        &self,
        store: &mut NodeStore,
        repo: &Path,
        options: SyncOptions,
        deadline: Deadline,
    ) -> AppResult<SyncFromResult> {
        self.locks.with_lock(repo, |root| {
            let phase = PhaseGuard::enter(&self.phases, root);
            let files = self.vcs.list_files(root)?;
            let baselines: HashMap<String, SyncBaseline> = store
                .database()
                .list_baselines(store.project_id())?
                .into_iter()
                .map(|b| (b.file_path.clone(), b))
                .collect();
            let mapping = map_files(&files, &baselines);

            phase.set(SyncPhase::Diffing);
            let mut result = SyncFromResult {
                complete: true,
                ..Default::default()
            };
            let mut writes = Vec::new();
            let mut pending = Vec::new();
            let mut present = Vec::new();

            for (file, node_path) in mapping {
                if deadline.is_expired() {
                    tracing::warn!("[GitSync] Import of {} hit its deadline", root.display());
                    result.complete = false;
                    break;
                }

                let abs = root.join(&file);
                let Ok(meta) = fs::metadata(&abs) else {
                    continue;
                };
                if !meta.is_file() {
                    continue;
                }
                let node_key = node_path.to_string();
                present.push(node_key.clone());

                if meta.len() > self.settings.max_file_bytes {
                    tracing::warn!("[GitSync] Skipping {} ({} bytes)", file, meta.len());
                    result.skipped_files.push(file);
                    continue;
                }

                let bytes = fs::read(&abs)?;
                let file_fp = fingerprint(&bytes);
                let baseline = baselines.get(&file);
                if options.incremental && baseline.is_some_and(|b| b.fingerprint == file_fp) {
                    continue;
                }
                let Some(text) = decode_text(bytes) else {
                    result.binary_files.push(file);
                    continue;
                };
                result.files_processed += 1;

                if let Some(record) = self.is_conflicted(root, &file) {
                    result.conflicts.push(record);
                    continue;
                }

                let blocked = node_path
                    .ancestors()
                    .any(|a| store.node_at(&a).is_some_and(|n| !n.value.is_descendable()));
                if blocked {
                    tracing::warn!("[GitSync] Skipping {}: {} is under a scalar node", file, node_key);
                    result.skipped_files.push(file);
                    continue;
                }

                let language = detect_language(&file);
                let current = store.node_at(&node_path);
                let node_fp = current.map(node_fingerprint);

                let write = match (baseline, &node_fp) {
                    (_, None) => true,
                    (Some(b), Some(node_fp)) => {
                        let file_changed = file_fp != b.fingerprint;
                        let node_changed = *node_fp != b.fingerprint;
                        if !file_changed {
                            continue;
                        }
                        if node_changed && *node_fp != file_fp {
                            let record = ConflictRecord::diverged(&file, &node_key);
                            result.conflicts.push(self.record_conflict(root, record));
                            continue;
                        }
                        node_fp != &file_fp
                    }
                    (None, Some(_)) if current.is_some_and(|n| n.value.is_null()) => true,
                    (None, Some(node_fp)) => {
                        if *node_fp != file_fp {
                            let record = ConflictRecord::diverged(&file, &node_key);
                            result.conflicts.push(self.record_conflict(root, record));
                            continue;
                        }
                        false
                    }
                };

                if write {
                    tracing::debug!("[GitSync] Import {} -> {}", file, node_key);
                    if current.is_some() {
                        result.nodes_updated += 1;
                    } else {
                        result.nodes_created += 1;
                    }
                    writes.push(NodeWrite::new(node_key.clone(), text).with_options(SetOptions {
                        node_type: Some(FILE_NODE_TYPE.to_string()),
                        language: Some(language.to_string()),
                        metadata: None,
                    }));
                }
                pending.push(new_baseline(store.project_id(), &file, &node_key, file_fp, language));
            }

            store.set_many(writes)?;
            for baseline in &pending {
                store.database().upsert_baseline(baseline)?;
            }
            store.mark_available(present.iter().map(String::as_str));

            tracing::info!(
                "[GitSync] Imported {}: {} files, {} created, {} updated, {} conflicts",
                root.display(),
                result.files_processed,
                result.nodes_created,
                result.nodes_updated,
                result.conflicts.len()
            );
            Ok(result)
        })
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Write node content into the working tree, adopting files that changed
    /// on disk only.
    pub fn sync_to_git(&self, store: &mut NodeStore, repo: &Path) -> AppResult<SyncToResult> {
        self.locks.with_lock(repo, |root| {
            let phase = PhaseGuard::enter(&self.phases, root);
            let by_node: HashMap<String, SyncBaseline> = store
                .database()
                .list_baselines(store.project_id())?
                .into_iter()
                .map(|b| (b.node_path.clone(), b))
                .collect();

            let mut items = Vec::new();
            let mut claimed = HashSet::new();
            for node in store.nodes() {
                let content = node_text(node);
                let baseline = by_node.get(&node.path).cloned();
                if content.is_none() && baseline.is_none() {
                    continue;
                }
                let file = match &baseline {
                    Some(b) => Some(b.file_path.clone()),
                    None => NodePath::parse(&node.path).ok().and_then(|p| {
                        export_path(&p, node.language.as_deref(), &self.settings.default_extension)
                    }),
                };
                let Some(file) = file else {
                    tracing::debug!("[GitSync] No file name for node {}", node.path);
                    continue;
                };
                if !claimed.insert(file.clone()) {
                    continue;
                }
                let language = node
                    .language
                    .clone()
                    .unwrap_or_else(|| detect_language(&file).to_string());
                items.push(ExportItem {
                    node_path: node.path.clone(),
                    file,
                    content,
                    language,
                    baseline,
                });
            }

            phase.set(SyncPhase::Diffing);
            let mut result = SyncToResult::default();
            for item in items {
                let state = self.export_one(store, root, &item, &mut result)?;
                result.outcomes.push(PathOutcome {
                    path: item.file,
                    state,
                });
            }
            result.success = result.conflicts.is_empty();

            tracing::info!(
                "[GitSync] Exported to {}: {} written, {} adopted, {} conflicts",
                root.display(),
                result.files_written,
                result.nodes_updated,
                result.conflicts.len()
            );
            Ok(result)
        })
    }

    fn export_one(
        &self,
        store: &mut NodeStore,
        root: &Path,
        item: &ExportItem,
        result: &mut SyncToResult,
    ) -> AppResult<PathState> {
        if let Some(record) = self.is_conflicted(root, &item.file) {
            result.conflicts.push(record);
            return Ok(PathState::Conflicted);
        }

        let disk = read_file(&root.join(&item.file))?;
        let node_fp = match &item.content {
            Some(content) => fingerprint(content.as_bytes()),
            None => NO_TEXT_FINGERPRINT.to_string(),
        };
        let disk_fp = disk.as_deref().map(fingerprint);
        let db = store.database().clone();
        let project_id = store.project_id().to_string();

        let write = |result: &mut SyncToResult| -> AppResult<PathState> {
            let Some(content) = &item.content else {
                return Ok(PathState::NoChange);
            };
            tracing::debug!("[GitSync] Export {} -> {}", item.node_path, item.file);
            write_file(root, &item.file, content)?;
            db.upsert_baseline(&new_baseline(&project_id, &item.file, &item.node_path, node_fp.clone(), &item.language))?;
            result.files_written += 1;
            Ok(PathState::Applying)
        };

        let (node_changed, file_changed) = match &item.baseline {
            Some(b) => (
                node_fp != b.fingerprint,
                disk_fp.as_ref().map(|fp| *fp != b.fingerprint),
            ),
            None => match &disk_fp {
                None => return write(result),
                Some(fp) if *fp == node_fp => {
                    db.upsert_baseline(&new_baseline(&project_id, &item.file, &item.node_path, node_fp.clone(), &item.language))?;
                    return Ok(PathState::NoChange);
                }
                Some(_) => {
                    let record = ConflictRecord::diverged(&item.file, &item.node_path);
                    result.conflicts.push(self.record_conflict(root, record));
                    return Ok(PathState::Conflicted);
                }
            },
        };

        match (node_changed, file_changed) {
            (false, None) | (false, Some(false)) => Ok(PathState::NoChange),
            (true, None) | (true, Some(false)) => write(result),
            (false, Some(true)) => {
                let Some(text) = disk.and_then(decode_text) else {
                    let record = ConflictRecord::diverged(&item.file, &item.node_path);
                    result.conflicts.push(self.record_conflict(root, record));
                    return Ok(PathState::Conflicted);
                };
                tracing::debug!("[GitSync] Adopt {} -> {}", item.file, item.node_path);
                let adopted_fp = fingerprint(text.as_bytes());
                store.set(&item.node_path, text)?;
                db.upsert_baseline(&new_baseline(&project_id, &item.file, &item.node_path, adopted_fp, &item.language))?;
                result.nodes_updated += 1;
                Ok(PathState::Applying)
            }
            (true, Some(true)) => {
                if disk_fp.as_deref() == Some(node_fp.as_str()) {
                    db.upsert_baseline(&new_baseline(&project_id, &item.file, &item.node_path, node_fp.clone(), &item.language))?;
                    return Ok(PathState::NoChange);
                }
                let record = ConflictRecord::diverged(&item.file, &item.node_path);
                result.conflicts.push(self.record_conflict(root, record));
                Ok(PathState::Conflicted)
            }
        }
    }

    // ========================================================================
    // Branches
    // ========================================================================

    pub fn map_branches_to_views(&self, repo: &Path) -> AppResult<Vec<BranchView>> {
        let branches = self.locks.with_lock(repo, |root| self.vcs.list_branches(root))?;
        Ok(branches
            .into_iter()
            .map(|b| BranchView {
                view_id: branch_view_id(&b.name),
                branch: b.name,
                is_head: b.is_head,
            })
            .collect())
    }

    /// Check out `branch`; mapped nodes whose file is absent there become
    /// unavailable until the next import.
    pub fn switch_branch(
        &self,
        store: &mut NodeStore,
        repo: &Path,
        branch: &str,
    ) -> AppResult<SwitchBranchResult> {
        self.locks.with_lock(repo, |root| {
            self.vcs.checkout(root, branch)?;

            let mut unavailable: Vec<String> = store
                .database()
                .list_baselines(store.project_id())?
                .into_iter()
                .filter(|b| !root.join(&b.file_path).exists())
                .map(|b| b.node_path)
                .collect();
            unavailable.sort();
            unavailable.dedup();
            store.mark_unavailable(unavailable.iter().cloned());

            tracing::info!(
                "[GitSync] Switched {} to {} ({} nodes unavailable)",
                root.display(),
                branch,
                unavailable.len()
            );
            Ok(SwitchBranchResult {
                branch: branch.to_string(),
                unavailable,
            })
        })
    }

    pub fn create_branch(&self, repo: &Path, name: &str, base: Option<&str>) -> AppResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("branch name cannot be empty"));
        }
        self.locks
            .with_lock(repo, |root| self.vcs.create_branch(root, name, base))?;
        tracing::info!("[GitSync] Created branch {}", name);
        Ok(())
    }

    /// Merge `branch` into the current one. Conflicts and git failures are
    /// reported in the result rather than as errors.
    pub fn merge_branch(&self, repo: &Path, branch: &str) -> AppResult<MergeBranchResult> {
        self.locks.with_lock(repo, |root| {
            let outcome = match self.vcs.merge(root, branch) {
                Ok(outcome) => outcome,
                Err(e @ AppError::ExternalTool { .. }) => MergeOutcome::Failed(e.to_string()),
                Err(e) => return Err(e),
            };

            match outcome {
                MergeOutcome::Merged => {
                    tracing::info!("[GitSync] Merged {} into {}", branch, root.display());
                    Ok(MergeBranchResult {
                        success: true,
                        conflicts: Vec::new(),
                        error: None,
                    })
                }
                MergeOutcome::Conflicted(paths) => {
                    let conflicts = paths
                        .iter()
                        .map(|path| self.record_conflict(root, self.merge_record(root, path)))
                        .collect();
                    Ok(MergeBranchResult {
                        success: false,
                        conflicts,
                        error: None,
                    })
                }
                MergeOutcome::Failed(reason) => {
                    tracing::warn!("[GitSync] Merge of {} failed: {}", branch, reason);
                    Ok(MergeBranchResult {
                        success: false,
                        conflicts: Vec::new(),
                        error: Some(reason),
                    })
                }
            }
        })
    }

    fn merge_record(&self, root: &Path, path: &str) -> ConflictRecord {
        let regions = fs::read_to_string(root.join(path))
            .map(|content| parse_conflicts(&content).len() as u32)
            .unwrap_or(0);
        ConflictRecord::merge(path, regions)
    }

    // ========================================================================
    // Conflicts
    // ========================================================================

    /// Unmerged paths of an in-progress merge, rebase, cherry-pick or revert
    pub fn detect_conflicts(&self, repo: &Path) -> AppResult<Vec<ConflictRecord>> {
        self.locks.with_lock(repo, |root| {
            let state = self.vcs.merge_state(root)?;
            if !state.in_progress() {
                self.conflicted
                    .retain(|(r, _), record| r != root || record.kind != ConflictKind::Merge);
                return Ok(Vec::new());
            }
            let records = self
                .vcs
                .unmerged_paths(root)?
                .iter()
                .map(|path| self.record_conflict(root, self.merge_record(root, path)))
                .collect();
            Ok(records)
        })
    }

    pub fn get_resolution_strategies(&self, path: &str) -> Vec<ResolutionStrategy> {
        vec![
            ResolutionStrategy {
                kind: ResolutionKind::Ours,
                path: path.to_string(),
                description: "Keep the node content and overwrite the file".to_string(),
            },
            ResolutionStrategy {
                kind: ResolutionKind::Theirs,
                path: path.to_string(),
                description: "Adopt the file content into the node".to_string(),
            },
            ResolutionStrategy {
                kind: ResolutionKind::Manual,
                path: path.to_string(),
                description: "Use caller-supplied merged content".to_string(),
            },
        ]
    }

    fn node_path_for(&self, store: &NodeStore, root: &Path, file: &str) -> AppResult<NodePath> {
        if let Some(baseline) = store.database().get_baseline(store.project_id(), file)? {
            return Ok(NodePath::parse(&baseline.node_path)?);
        }
        if let Some(node_path) = self.is_conflicted(root, file).and_then(|r| r.node_path) {
            return Ok(NodePath::parse(&node_path)?);
        }
        map_files(&[file.to_string()], &HashMap::new())
            .into_iter()
            .next()
            .map(|(_, path)| path)
            .ok_or_else(|| AppError::validation(format!("cannot map {} to a node", file)))
    }

    /// Write `content` to `path`, stage it, and bring node and baseline in
    /// line with it. Clears any conflict on the path.
    pub fn resolve_conflict(
        &self,
        store: &mut NodeStore,
        repo: &Path,
        path: &str,
        content: &str,
    ) -> AppResult<()> {
        check_relative(path)?;
        self.locks.with_lock(repo, |root| {
            let node_path = self.node_path_for(store, root, path)?;
            let node_key = node_path.to_string();
            let language = detect_language(path);

            write_file(root, path, content)?;
            self.vcs.stage(root, &[path.to_string()])?;

            let options = if store.node_at(&node_path).is_some() {
                SetOptions::default()
            } else {
                SetOptions {
                    node_type: Some(FILE_NODE_TYPE.to_string()),
                    language: Some(language.to_string()),
                    metadata: None,
                }
            };
            store.set_with(&node_key, content, options)?;
            let baseline = new_baseline(store.project_id(), path, &node_key, fingerprint(content.as_bytes()), language);
            store.database().upsert_baseline(&baseline)?;

            self.conflicted.remove(&(root.to_path_buf(), path.to_string()));
            tracing::info!("[GitSync] Resolved conflict on {}", path);
            Ok(())
        })
    }

    /// Resolve `path` with a canonical strategy
    pub fn apply_resolution(
        &self,
        store: &mut NodeStore,
        repo: &Path,
        path: &str,
        resolution: Resolution,
    ) -> AppResult<()> {
        check_relative(path)?;
        let root = RepoLocks::canonical(repo)?;
        let content = match resolution {
            Resolution::Manual(content) => content,
            Resolution::Ours => {
                let node_path = self.node_path_for(store, &root, path)?;
                match store.node_at(&node_path).and_then(node_text) {
                    Some(text) => text,
                    None => self.file_side(&root, path, ConflictSide::Ours)?,
                }
            }
            Resolution::Theirs => self.file_side(&root, path, ConflictSide::Theirs)?,
        };
        self.resolve_conflict(store, repo, path, &content)
    }

    /// File content with every marker region reduced to `side`
    fn file_side(&self, root: &Path, path: &str, side: ConflictSide) -> AppResult<String> {
        let content = read_file(&root.join(path))?
            .ok_or_else(|| AppError::not_found(format!("file {}", path)))?;
        let text = decode_text(content)
            .ok_or_else(|| AppError::validation(format!("{} is not a text file", path)))?;
        if has_conflict_markers(&text) {
            Ok(resolve_markers(&text, side))
        } else {
            Ok(text)
        }
    }
}
