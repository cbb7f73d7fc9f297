//! Auto-fix engine: best-effort text fixes for auto-fixable issues.
//!
//! Strategies are plain text substitutions, not syntax-aware refactorings.
//! Files are modified in place (review with `git diff`) and only written when
//! the content actually changes, so re-applying a fix is a no-op.

pub mod build_config;
pub mod packages;
pub mod secrets;
pub mod source;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogError, RuleCatalog};
use crate::config::FixConfig;
use crate::fs::{FileSystem, FsError};
use crate::types::{BatchReport, FixOutcome, Issue};

pub use packages::{CommandRunner, TokioCommandRunner};

#[derive(Debug, Error)]
pub enum FixError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("no strategy registered for {0}")]
    NoStrategy(String),

    #[error("issue has no target file")]
    MissingTarget,

    #[error("cannot fix {file}: {reason}")]
    Unsupported { file: String, reason: String },

    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("{command} timed out after {timeout:?}")]
    CommandTimeout {
        command: String,
        timeout: std::time::Duration,
    },
}

impl FixError {
    pub fn unsupported(file: &str, reason: impl Into<String>) -> Self {
        FixError::Unsupported {
            file: file.to_string(),
            reason: reason.into(),
        }
    }
}

/// What a strategy may touch.
pub struct FixContext {
    pub root: PathBuf,
    pub fs: Arc<dyn FileSystem>,
    pub config: FixConfig,
    pub runner: Arc<dyn CommandRunner>,
}

impl FixContext {
    pub fn new(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        config: FixConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            root: root.into(),
            fs,
            config,
            runner,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// The issue's file, required by every source-level strategy.
    pub fn target<'a>(&self, issue: &'a Issue) -> Result<&'a str, FixError> {
        issue.file.as_deref().ok_or(FixError::MissingTarget)
    }

    pub async fn exists(&self, rel: &str) -> bool {
        self.fs.exists(&self.path(rel)).await
    }

    /// File contents, or `None` if it does not exist.
    pub async fn read_optional(&self, rel: &str) -> Result<Option<String>, FixError> {
        match self.fs.read_to_string(&self.path(rel)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `new` only if it differs from `old`. Returns the written paths.
    pub async fn write_if_changed(
        &self,
        rel: &str,
        old: &str,
        new: &str,
    ) -> Result<Vec<String>, FixError> {
        if old == new {
            debug!(file = rel, "content unchanged, not writing");
            return Ok(Vec::new());
        }
        self.fs.write(&self.path(rel), new).await?;
        Ok(vec![rel.to_string()])
    }

    /// Read `rel`, transform it and write it back if it changed.
    pub async fn rewrite<F>(&self, rel: &str, transform: F) -> Result<Vec<String>, FixError>
    where
        F: FnOnce(&str) -> Result<String, FixError> + Send,
    {
        let old = self.fs.read_to_string(&self.path(rel)).await?;
        let new = transform(&old)?;
        self.write_if_changed(rel, &old, &new).await
    }
}

/// A one-shot fix for one rule. Must be idempotent: applying it to already
/// fixed content leaves every file unchanged.
#[async_trait]
pub trait FixStrategy: Send + Sync {
    fn rule(&self) -> &'static str;

    /// Files written besides the issue's own, relative to the root.
    fn side_files(&self, _ctx: &FixContext) -> Vec<String> {
        Vec::new()
    }

    /// Apply the fix and return the files actually rewritten.
    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError>;
}

/// One async mutex per path so concurrent fixes never interleave writes.
///
/// Entries nobody holds or waits on are pruned on the next `acquire`, so the
/// map stays as large as the set of paths currently in use.
#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    /// Lock every path, in sorted order so overlapping sets cannot deadlock.
    async fn acquire(&self, mut paths: Vec<String>) -> Vec<OwnedMutexGuard<()>> {
        paths.sort();
        paths.dedup();
        let mutexes: Vec<_> = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Clones only happen under this lock, so a count of 1 means idle.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            paths
                .into_iter()
                .map(|p| Arc::clone(locks.entry(p).or_default()))
                .collect()
        };
        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        guards
    }
}

#[cfg(test)]
impl PathLocks {
    fn tracked(&self) -> Vec<String> {
        let locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        let mut paths: Vec<String> = locks.keys().cloned().collect();
        paths.sort();
        paths
    }
}

pub struct AutoFixEngine {
    strategies: HashMap<&'static str, Arc<dyn FixStrategy>>,
    ctx: FixContext,
    locks: PathLocks,
}

impl AutoFixEngine {
    /// An engine with no strategies.
    pub fn new(ctx: FixContext) -> Self {
        Self {
            strategies: HashMap::new(),
            ctx,
            locks: PathLocks::default(),
        }
    }

    /// An engine with every built-in strategy registered.
    pub fn builtin(ctx: FixContext) -> Self {
        let mut engine = Self::new(ctx);
        engine.register(source::NoAnyFix);
        engine.register(source::ConsoleLogFix);
        engine.register(source::MemoFix);
        engine.register(source::ImgAltFix);
        engine.register(secrets::SecretToEnvFix);
        engine.register(build_config::StrictModeFix);
        engine.register(build_config::ImageConfigFix);
        engine.register(build_config::CodeSplittingFix);
        engine.register(packages::LockfileFix);
        engine
    }

    pub fn register(&mut self, strategy: impl FixStrategy + 'static) {
        self.strategies.insert(strategy.rule(), Arc::new(strategy));
    }

    pub fn has_strategy(&self, rule: &str) -> bool {
        self.strategies.contains_key(rule)
    }

    /// Apply the registered strategy for `issue.rule`. Never panics or
    /// returns an error: failures become a `FixOutcome` with `error` set.
    #[instrument(skip(self, issue), fields(issue = %issue.id, rule = %issue.rule))]
    pub async fn apply_fix(&self, issue: &Issue) -> FixOutcome {
        let Some(strategy) = self.strategies.get(issue.rule.as_str()) else {
            warn!("no fix strategy registered");
            return FixOutcome::failed(issue, FixError::NoStrategy(issue.rule.clone()).to_string());
        };

        let mut paths = strategy.side_files(&self.ctx);
        paths.extend(issue.file.clone());
        let _guards = self.locks.acquire(paths).await;

        match strategy.apply(issue, &self.ctx).await {
            Ok(written) => {
                info!(written = written.len(), "fix applied");
                FixOutcome::applied(issue, written)
            }
            Err(e) => {
                warn!(error = %e, "fix failed");
                FixOutcome::failed(issue, e.to_string())
            }
        }
    }

    /// Apply fixes for every auto-fixable issue, one at a time.
    ///
    /// Issues whose rule has no strategy are skipped and listed in
    /// `skipped`; they are not counted as failures. A failed fix does not
    /// stop the batch and is not retried. `fix.delay_ms` separates attempts,
    /// and `cancel` is checked before each one.
    pub async fn apply_batch(&self, issues: &[Issue], cancel: &CancellationToken) -> BatchReport {
        let mut report = BatchReport::default();
        let delay = self.ctx.config.delay();

        for issue in issues.iter().filter(|i| i.auto_fix_available) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if !self.has_strategy(&issue.rule) {
                debug!(issue = %issue.id, rule = %issue.rule, "skipping issue without strategy");
                report.skipped.push(issue.id.clone());
                continue;
            }
            if !report.outcomes.is_empty() && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                }
            }

            let outcome = self.apply_fix(issue).await;
            if outcome.applied {
                report.success += 1;
            } else {
                report.failed += 1;
            }
            report.outcomes.push(outcome);
        }

        info!(
            success = report.success,
            failed = report.failed,
            skipped = report.skipped.len(),
            cancelled = report.cancelled,
            "fix batch complete"
        );
        report
    }
}

/// The catalog's `auto_fixable` flags must match the registered strategies.
pub fn verify_registry(catalog: &RuleCatalog, engine: &AutoFixEngine) -> Result<(), CatalogError> {
    for rule in &catalog.rules {
        let registered = engine.has_strategy(&rule.id);
        if rule.auto_fixable != registered {
            return Err(CatalogError::RegistryMismatch {
                rule: rule.id.clone(),
                declared: rule.auto_fixable,
                registered,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::FixConfig;
    use crate::fs::MemoryFileSystem;
    use crate::types::{Dimension, Severity};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub const ROOT: &str = "/project";

    /// Records invocations and optionally writes a file into the memory fs.
    pub struct FakeRunner {
        pub calls: AtomicUsize,
        pub fs: Option<Arc<MemoryFileSystem>>,
        pub creates: Option<&'static str>,
        pub fail: Option<FixErrorKind>,
    }

    #[derive(Clone, Copy)]
    pub enum FixErrorKind {
        Timeout,
        Exit,
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            program: &str,
            _args: &[&str],
            cwd: &Path,
            timeout: Duration,
        ) -> Result<(), FixError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail {
                Some(FixErrorKind::Timeout) => {
                    return Err(FixError::CommandTimeout {
                        command: program.to_string(),
                        timeout,
                    })
                }
                Some(FixErrorKind::Exit) => {
                    return Err(FixError::Command {
                        command: program.to_string(),
                        reason: "exit status 1".to_string(),
                    })
                }
                None => {}
            }
            if let (Some(fs), Some(file)) = (&self.fs, self.creates) {
                fs.insert(cwd.join(file), "{}");
            }
            Ok(())
        }
    }

    pub fn quiet_runner() -> Arc<FakeRunner> {
        Arc::new(FakeRunner {
            calls: AtomicUsize::new(0),
            fs: None,
            creates: None,
            fail: None,
        })
    }

    pub fn test_engine(files: &[(&str, &str)]) -> (Arc<MemoryFileSystem>, AutoFixEngine) {
        test_engine_with_runner(files, quiet_runner())
    }

    pub fn test_engine_with_runner(
        files: &[(&str, &str)],
        runner: Arc<dyn CommandRunner>,
    ) -> (Arc<MemoryFileSystem>, AutoFixEngine) {
        let fs = Arc::new(MemoryFileSystem::with_files(
            files.iter().map(|(p, c)| (Path::new(ROOT).join(p), c.to_string())),
        ));
        let config = FixConfig {
            delay_ms: 0,
            ..FixConfig::default()
        };
        let ctx = FixContext::new(ROOT, fs.clone(), config, runner);
        (fs, AutoFixEngine::builtin(ctx))
    }

    pub fn test_issue(rule: &str, file: Option<&str>, line: Option<usize>) -> Issue {
        Issue {
            id: crate::analysis::issue_id(Dimension::CodeQuality, rule, file, line),
            dimension: Dimension::CodeQuality,
            severity: Severity::Medium,
            rule: rule.to_string(),
            title: "t".to_string(),
            description: String::new(),
            file: file.map(str::to_string),
            line,
            fixable: true,
            auto_fix_available: true,
            impact: String::new(),
            suggestion: String::new(),
            solution: String::new(),
        }
    }

    pub fn file(fs: &MemoryFileSystem, rel: &str) -> String {
        fs.get(Path::new(ROOT).join(rel)).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_unknown_rule_reports_no_strategy() {
        let (_, engine) = test_engine(&[]);
        let outcome = engine.apply_fix(&test_issue("made/up", Some("a.ts"), None)).await;
        assert!(!outcome.applied);
        assert!(outcome.error.unwrap().contains("no strategy"));
    }

    #[tokio::test]
    async fn test_missing_file_is_failed_outcome() {
        let (_, engine) = test_engine(&[]);
        let outcome = engine
            .apply_fix(&test_issue("typescript/no-any", Some("src/gone.ts"), Some(1)))
            .await;
        assert!(!outcome.applied);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_batch_skips_unregistered_and_isolates_failures() {
        let (fs, engine) = test_engine(&[
            ("src/a.ts", "let a: any;\n"),
            ("src/b.ts", "console.log('x');\nexport {};\n"),
        ]);
        let issues = vec![
            test_issue("typescript/no-any", Some("src/a.ts"), Some(1)),
            test_issue("unregistered/one", Some("src/a.ts"), Some(1)),
            test_issue("typescript/no-any", Some("src/missing.ts"), Some(1)),
            test_issue("unregistered/two", Some("src/b.ts"), Some(1)),
            test_issue("code-quality/no-console", Some("src/b.ts"), Some(1)),
        ];
        let report = engine.apply_batch(&issues, &CancellationToken::new()).await;

        assert_eq!(report.success + report.failed, 3);
        assert_eq!(report.success, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.outcomes.len(), 3);
        assert!(!report.cancelled);
        assert!(!file(&fs, "src/a.ts").contains(": any"));
        assert_eq!(file(&fs, "src/b.ts"), "export {};\n");
    }

    #[tokio::test]
    async fn test_batch_ignores_non_auto_fixable() {
        let (fs, engine) = test_engine(&[("src/a.ts", "let a: any;\n")]);
        let mut issue = test_issue("typescript/no-any", Some("src/a.ts"), Some(1));
        issue.auto_fix_available = false;
        let report = engine.apply_batch(&[issue], &CancellationToken::new()).await;
        assert_eq!(report, BatchReport::default());
        assert_eq!(file(&fs, "src/a.ts"), "let a: any;\n");
    }

    #[tokio::test]
    async fn test_cancelled_batch_stops_before_next_item() {
        let (fs, engine) = test_engine(&[("src/a.ts", "let a: any;\n")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let issues = vec![test_issue("typescript/no-any", Some("src/a.ts"), Some(1))];
        let report = engine.apply_batch(&issues, &cancel).await;
        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());
        assert_eq!(file(&fs, "src/a.ts"), "let a: any;\n");
    }

    /// Cancels the batch's token from inside the first fix.
    struct CancellingFix(CancellationToken);

    #[async_trait]
    impl FixStrategy for CancellingFix {
        fn rule(&self) -> &'static str {
            "test/cancel"
        }

        async fn apply(&self, _issue: &Issue, _ctx: &FixContext) -> Result<Vec<String>, FixError> {
            self.0.cancel();
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_batch_finishes_current_item_only() {
        let cancel = CancellationToken::new();
        let (fs, mut engine) = test_engine(&[("src/a.ts", "let a: any;\n")]);
        engine.register(CancellingFix(cancel.clone()));
        let issues = vec![
            test_issue("test/cancel", Some("src/a.ts"), Some(1)),
            test_issue("typescript/no-any", Some("src/a.ts"), Some(1)),
        ];
        let report = engine.apply_batch(&issues, &cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.success, 1);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].rule, "test/cancel");
        assert_eq!(file(&fs, "src/a.ts"), "let a: any;\n");
    }

    #[tokio::test]
    async fn test_batch_delay_separates_fixes() {
        let fs = Arc::new(MemoryFileSystem::with_files([
            (Path::new(ROOT).join("src/a.ts"), "let a: any;\n".to_string()),
            (Path::new(ROOT).join("src/b.ts"), "let b: any;\n".to_string()),
        ]));
        let config = FixConfig {
            delay_ms: 30,
            ..FixConfig::default()
        };
        let engine = AutoFixEngine::builtin(FixContext::new(ROOT, fs, config, quiet_runner()));
        let issues = vec![
            test_issue("typescript/no-any", Some("src/a.ts"), Some(1)),
            test_issue("typescript/no-any", Some("src/b.ts"), Some(1)),
        ];
        let started = std::time::Instant::now();
        let report = engine.apply_batch(&issues, &CancellationToken::new()).await;
        assert_eq!(report.success, 2);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    /// Reads, yields, then appends a marker: interleaving would lose one.
    struct AppendFix;

    #[async_trait]
    impl FixStrategy for AppendFix {
        fn rule(&self) -> &'static str {
            "test/append"
        }

        async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
            let target = ctx.target(issue)?;
            let old = ctx.fs.read_to_string(&ctx.path(target)).await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
            let new = format!("{}{}\n", old, issue.id);
            ctx.write_if_changed(target, &old, &new).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_fixes_on_same_path_are_serialized() {
        let (fs, mut engine) = test_engine(&[("src/a.ts", "")]);
        engine.register(AppendFix);
        let engine = Arc::new(engine);

        let mut a = test_issue("test/append", Some("src/a.ts"), Some(1));
        a.id = "first".to_string();
        let mut b = test_issue("test/append", Some("src/a.ts"), Some(2));
        b.id = "second".to_string();

        let (ra, rb) = tokio::join!(engine.apply_fix(&a), engine.apply_fix(&b));
        assert!(ra.applied && rb.applied);
        let content = file(&fs, "src/a.ts");
        assert!(content.contains("first"));
        assert!(content.contains("second"));
    }

    #[tokio::test]
    async fn test_path_locks_prune_idle_entries() {
        let locks = PathLocks::default();
        let held = locks.acquire(vec!["b.ts".to_string(), "a.ts".to_string()]).await;
        assert_eq!(held.len(), 2);
        drop(held);

        let held = locks.acquire(vec!["c.ts".to_string()]).await;
        assert_eq!(locks.tracked(), vec!["c.ts".to_string()]);
        drop(held);

        let (_, engine) = test_engine(&[("src/a.ts", "let a: any;\n"), ("src/b.ts", "let b: any;\n")]);
        for target in ["src/a.ts", "src/b.ts"] {
            let issue = test_issue("typescript/no-any", Some(target), Some(1));
            assert!(engine.apply_fix(&issue).await.applied);
        }
        assert_eq!(engine.locks.tracked(), vec!["src/b.ts".to_string()]);
    }

    #[test]
    fn test_builtin_strategies_match_catalog() {
        let (_, engine) = test_engine(&[]);
        verify_registry(&RuleCatalog::builtin(), &engine).unwrap();
    }

    #[test]
    fn test_registry_mismatch_is_config_error() {
        let (_, engine) = test_engine(&[]);
        let mut catalog = RuleCatalog::builtin();
        let rule = catalog
            .rules
            .iter_mut()
            .find(|r| r.id == "security/eval-usage")
            .unwrap();
        rule.auto_fixable = true;
        assert!(matches!(
            verify_registry(&catalog, &engine),
            Err(CatalogError::RegistryMismatch { .. })
        ));
    }
}
