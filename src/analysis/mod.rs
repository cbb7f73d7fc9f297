pub mod accessibility;
pub mod code_quality;
pub mod dependency;
pub mod performance;
pub mod security;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info_span, warn, Instrument};

use crate::catalog::RuleCatalog;
use crate::config::ScanConfig;
use crate::fs::{FileSystem, FsError};
use crate::scoring;
use crate::types::{CheckFailure, Dimension, DimensionResult, Issue};

pub use dependency::{Advisory, AdvisorySource, StaticAdvisories};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Missing or malformed project configuration the check depends on.
    #[error("{file}: {reason}")]
    Config { file: String, reason: String },

    #[error("Check {rule} failed: {reason}")]
    Failed { rule: String, reason: String },
}

impl CheckError {
    pub fn config(file: &str, reason: impl ToString) -> Self {
        CheckError::Config {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// What a check reports. The scanner completes it into an `Issue` using
/// the catalog rule (severity, auto-fixability) and a content-hash id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Finding {
    pub title: String,
    pub description: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub impact: String,
    pub suggestion: String,
    pub solution: String,
}

impl Finding {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: Option<usize>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    pub fn impact(mut self, impact: impl Into<String>) -> Self {
        self.impact = impact.into();
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    pub fn solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = solution.into();
        self
    }
}

/// A pure, read-only inspection for one rule.
/// Checks must be Send + Sync so a dimension's checks can run concurrently.
#[async_trait]
pub trait Check: Send + Sync {
    fn dimension(&self) -> Dimension;

    /// Catalog rule id this check reports under.
    fn rule(&self) -> &'static str;

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError>;
}

/// Everything a check may look at.
pub struct CheckContext {
    pub root: PathBuf,
    pub fs: Arc<dyn FileSystem>,
    pub scan: ScanConfig,
    listing: OnceCell<Vec<(usize, String)>>,
}

impl CheckContext {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>, scan: ScanConfig) -> Self {
        Self {
            root: root.into(),
            fs,
            scan,
            listing: OnceCell::new(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub async fn read(&self, rel: &str) -> Result<String, CheckError> {
        Ok(self.fs.read_to_string(&self.path(rel)).await?)
    }

    pub async fn exists(&self, rel: &str) -> bool {
        self.fs.exists(&self.path(rel)).await
    }

    /// Read and parse a JSON project file. Absence or bad syntax is a `Config` error.
    pub async fn read_json(&self, rel: &str) -> Result<serde_json::Value, CheckError> {
        let contents = match self.read(rel).await {
            Ok(contents) => contents,
            Err(CheckError::Fs(e)) if e.is_not_found() => {
                return Err(CheckError::config(rel, "not found"))
            }
            Err(e) => return Err(e),
        };
        serde_json::from_str(&contents).map_err(|e| CheckError::config(rel, e))
    }

    /// Source files to inspect, relative to the root: the first
    /// `max_files_per_check` files per search directory whose extension is in
    /// `extensions`. Scans are a sample, not the full tree.
    pub async fn sample_files(&self, extensions: &[&str]) -> Result<Vec<String>, CheckError> {
        let listing = self.listing.get_or_try_init(|| self.list_sources()).await?;
        let mut per_dir: BTreeMap<usize, usize> = BTreeMap::new();
        let mut sample = Vec::new();
        for (dir_index, rel) in listing {
            let ext = rel.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
            if !extensions.contains(&ext) {
                continue;
            }
            let taken = per_dir.entry(*dir_index).or_insert(0);
            if *taken < self.scan.max_files_per_check {
                *taken += 1;
                sample.push(rel.clone());
            }
        }
        Ok(sample)
    }

    /// Every configured source file under the search directories, tagged with
    /// the index of the directory it came from.
    async fn list_sources(&self) -> Result<Vec<(usize, String)>, CheckError> {
        let mut files = Vec::new();
        for (index, dir) in self.scan.search_dirs.iter().enumerate() {
            let dir_path = self.path(dir);
            if !self.fs.exists(&dir_path).await {
                continue;
            }
            for path in self.fs.list(&dir_path).await? {
                let rel = relative(&self.root, &path);
                let ext = rel.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
                if self.scan.extensions.iter().any(|e| e == ext) {
                    files.push((index, rel));
                }
            }
        }
        debug!(files = files.len(), "listed source files");
        Ok(files)
    }
}

/// `path` relative to `root`, `/`-separated.
pub fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// 1-based line number of a byte offset.
pub fn line_of(content: &str, offset: usize) -> usize {
    content[..offset.min(content.len())].matches('\n').count() + 1
}

/// Deterministic issue id: first 16 hex chars of SHA-256 over dimension, rule, file and line.
pub fn issue_id(dimension: Dimension, rule: &str, file: Option<&str>, line: Option<usize>) -> String {
    let line = line.map(|l| l.to_string()).unwrap_or_default();
    let seed = format!("{}\u{1f}{}\u{1f}{}\u{1f}{}", dimension, rule, file.unwrap_or(""), line);
    let hash = Sha256::digest(seed.as_bytes());
    hash[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Built-in checks, keyed by `(dimension, rule)`.
pub struct CheckRegistry {
    checks: BTreeMap<(Dimension, &'static str), Arc<dyn Check>>,
}

impl CheckRegistry {
    pub fn empty() -> Self {
        Self {
            checks: BTreeMap::new(),
        }
    }

    /// Every built-in check, with `advisories` backing the vulnerability check.
    pub fn builtin(advisories: Arc<dyn AdvisorySource>) -> Self {
        let mut registry = Self::empty();
        registry.register(code_quality::StrictModeCheck);
        registry.register(code_quality::NoAnyCheck);
        registry.register(code_quality::ComplexityCheck);
        registry.register(code_quality::ConsoleLogCheck);
        registry.register(performance::MissingMemoCheck);
        registry.register(performance::ImageOptimizationCheck);
        registry.register(performance::CodeSplittingCheck);
        registry.register(security::HardcodedSecretsCheck);
        registry.register(security::DangerousHtmlCheck);
        registry.register(security::EvalUsageCheck);
        registry.register(accessibility::ImgAltCheck);
        registry.register(accessibility::KeyboardHandlerCheck);
        registry.register(dependency::DependencyCountCheck);
        registry.register(dependency::LockfileCheck);
        registry.register(dependency::VulnerablePackagesCheck::new(advisories));
        registry
    }

    /// Add or replace the check for its `(dimension, rule)`.
    pub fn register(&mut self, check: impl Check + 'static) {
        self.checks
            .insert((check.dimension(), check.rule()), Arc::new(check));
    }

    pub fn for_dimension(&self, dimension: Dimension) -> Vec<Arc<dyn Check>> {
        self.checks
            .iter()
            .filter(|((d, _), _)| *d == dimension)
            .map(|(_, check)| Arc::clone(check))
            .collect()
    }

    pub fn rules(&self) -> impl Iterator<Item = (Dimension, &'static str)> + '_ {
        self.checks.keys().copied()
    }
}

/// Runs a dimension's checks and scores the merged result.
pub struct Scanner {
    catalog: Arc<RuleCatalog>,
}

impl Scanner {
    pub fn new(catalog: Arc<RuleCatalog>) -> Self {
        Self { catalog }
    }

    /// Run `checks` concurrently and merge their issues in the given order.
    ///
    /// Each check runs in its own task, so an error or a panic is logged and
    /// recorded, and that check contributes no issues. Sibling checks are
    /// unaffected.
    pub async fn run_dimension(
        &self,
        dimension: Dimension,
        checks: &[Arc<dyn Check>],
        total_checks: usize,
        ctx: Arc<CheckContext>,
    ) -> DimensionResult {
        let handles: Vec<_> = checks
            .iter()
            .map(|check| {
                let check = Arc::clone(check);
                let ctx = Arc::clone(&ctx);
                let span = info_span!("check", dimension = %dimension, rule = check.rule());
                tokio::spawn(async move { check.run(&ctx).await }.instrument(span))
            })
            .collect();

        let mut issues = Vec::new();
        let mut skipped_checks = Vec::new();
        let mut failed_checks = Vec::new();

        for (check, handle) in checks.iter().zip(handles) {
            let rule = check.rule();
            match handle.await {
                Ok(Ok(findings)) => {
                    debug!(rule, findings = findings.len(), "check finished");
                    issues.extend(
                        findings
                            .into_iter()
                            .filter_map(|finding| self.to_issue(dimension, rule, finding)),
                    );
                }
                Ok(Err(CheckError::Config { file, reason })) => {
                    debug!(rule, %file, %reason, "check skipped");
                    skipped_checks.push(CheckFailure {
                        rule: rule.to_string(),
                        reason: format!("{}: {}", file, reason),
                    });
                }
                Ok(Err(e)) => {
                    warn!(rule, error = %e, "check failed");
                    failed_checks.push(CheckFailure {
                        rule: rule.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(join_error) => {
                    warn!(rule, error = %join_error, "check panicked");
                    failed_checks.push(CheckFailure {
                        rule: rule.to_string(),
                        reason: format!("check panicked: {}", join_error),
                    });
                }
            }
        }

        let score = scoring::dimension_score(&issues);
        let status = scoring::status_for(score, self.catalog.thresholds.get(dimension));
        DimensionResult {
            dimension,
            score,
            max_score: scoring::MAX_SCORE,
            passed_checks: total_checks.saturating_sub(issues.len()),
            total_checks,
            status,
            issues,
            skipped_checks,
            failed_checks,
        }
    }

    fn to_issue(&self, dimension: Dimension, rule_id: &str, finding: Finding) -> Option<Issue> {
        let Some(rule) = self.catalog.rule(rule_id) else {
            warn!(rule = rule_id, "finding for a rule missing from the catalog; dropped");
            return None;
        };
        Some(Issue {
            id: issue_id(dimension, rule_id, finding.file.as_deref(), finding.line),
            dimension,
            severity: rule.severity,
            rule: rule_id.to_string(),
            title: finding.title,
            description: finding.description,
            file: finding.file,
            line: finding.line,
            fixable: true,
            auto_fix_available: rule.auto_fixable,
            impact: finding.impact,
            suggestion: finding.suggestion,
            solution: finding.solution,
        })
    }
}
