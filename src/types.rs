use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One axis of the audit. `ALL` fixes the order dimensions are scanned and reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    CodeQuality,
    Performance,
    Security,
    Accessibility,
    Dependency,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::CodeQuality,
        Dimension::Performance,
        Dimension::Security,
        Dimension::Accessibility,
        Dimension::Dependency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::CodeQuality => "code_quality",
            Dimension::Performance => "performance",
            Dimension::Security => "security",
            Dimension::Accessibility => "accessibility",
            Dimension::Dependency => "dependency",
        }
    }

    /// Human-readable title used by the report output.
    pub fn title(&self) -> &'static str {
        match self {
            Dimension::CodeQuality => "Code Quality",
            Dimension::Performance => "Performance",
            Dimension::Security => "Security",
            Dimension::Accessibility => "Accessibility",
            Dimension::Dependency => "Dependencies",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity, most severe first. `Ord` follows declaration order,
/// so `Critical < Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Health label derived from a score and a threshold set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Excellent,
    Good,
    NeedsImprovement,
    Critical,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Excellent => write!(f, "EXCELLENT"),
            Status::Good => write!(f, "GOOD"),
            Status::NeedsImprovement => write!(f, "NEEDS IMPROVEMENT"),
            Status::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Static rule metadata from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier, e.g. `typescript/no-any`
    pub id: String,
    pub dimension: Dimension,
    pub severity: Severity,
    /// Whether a fix strategy is registered for this rule
    pub auto_fixable: bool,
    pub description: String,
}

/// A single concrete finding. Immutable once produced by a check run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Content hash of dimension, rule, file and line
    pub id: String,
    pub dimension: Dimension,
    pub severity: Severity,
    pub rule: String,
    pub title: String,
    pub description: String,
    /// Path relative to the project root, `/`-separated
    pub file: Option<String>,
    /// 1-based line number
    pub line: Option<usize>,
    /// Whether a human can resolve this at all
    pub fixable: bool,
    /// Whether the auto-fix engine has a strategy for this rule
    pub auto_fix_available: bool,
    pub impact: String,
    pub suggestion: String,
    pub solution: String,
}

/// A check whose failure was swallowed at the scanner boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckFailure {
    pub rule: String,
    pub reason: String,
}

/// Scored outcome of running every check registered for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionResult {
    pub dimension: Dimension,
    /// 0..=100
    pub score: u8,
    pub max_score: u8,
    pub issues: Vec<Issue>,
    /// `total_checks - issues.len()`, floored at zero. A coarse proxy: checks
    /// are not one-to-one with issues, so this is not a pass/fail ledger.
    pub passed_checks: usize,
    pub total_checks: usize,
    pub status: Status,
    /// Checks skipped because their configuration input was missing or malformed
    pub skipped_checks: Vec<CheckFailure>,
    /// Checks that errored or panicked and contributed no issues
    pub failed_checks: Vec<CheckFailure>,
}

/// Cross-dimension counts. `estimated_fix_minutes` is a heuristic from
/// severity counts, not measured time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_issues: usize,
    pub critical_issues: usize,
    pub high_issues: usize,
    pub medium_issues: usize,
    pub low_issues: usize,
    pub auto_fixable_issues: usize,
    pub failed_checks: usize,
    pub estimated_fix_minutes: u32,
}

impl Summary {
    /// Render the estimate as e.g. `2h 15m`.
    pub fn estimated_fix_time(&self) -> String {
        let hours = self.estimated_fix_minutes / 60;
        let minutes = self.estimated_fix_minutes % 60;
        match (hours, minutes) {
            (0, m) => format!("{}m", m),
            (h, 0) => format!("{}h", h),
            (h, m) => format!("{}h {}m", h, m),
        }
    }
}

/// The result of one pipeline run. Created running, sealed once every
/// dimension has been recorded (or the run was cancelled).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSession {
    pub results: Vec<DimensionResult>,
    pub overall_score: u8,
    pub overall_status: Status,
    pub summary: Summary,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_running: bool,
    /// Set when cancellation stopped the run before every dimension finished
    pub cancelled: bool,
}

/// Terminal result of attempting one fix strategy against one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixOutcome {
    pub issue_id: String,
    pub rule: String,
    /// The strategy completed. A no-op on already-fixed content still counts.
    pub applied: bool,
    /// Files actually rewritten, relative to the project root
    pub written: Vec<String>,
    pub error: Option<String>,
}

impl FixOutcome {
    pub fn applied(issue: &Issue, written: Vec<String>) -> Self {
        Self {
            issue_id: issue.id.clone(),
            rule: issue.rule.clone(),
            applied: true,
            written,
            error: None,
        }
    }

    pub fn failed(issue: &Issue, error: impl Into<String>) -> Self {
        Self {
            issue_id: issue.id.clone(),
            rule: issue.rule.clone(),
            applied: false,
            written: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Result of a batch fix run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: usize,
    pub failed: usize,
    /// Ids of auto-fixable issues with no registered strategy; not attempted
    pub skipped: Vec<String>,
    /// One entry per attempted fix
    pub outcomes: Vec<FixOutcome>,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::Low < Severity::Info);
    }

    #[test]
    fn test_dimension_serializes_snake_case() {
        let json = serde_json::to_string(&Dimension::CodeQuality).unwrap();
        assert_eq!(json, "\"code_quality\"");
        let status = serde_json::to_string(&Status::NeedsImprovement).unwrap();
        assert_eq!(status, "\"needs_improvement\"");
    }

    #[test]
    fn test_estimated_fix_time_format() {
        let mut summary = Summary::default();
        assert_eq!(summary.estimated_fix_time(), "0m");
        summary.estimated_fix_minutes = 135;
        assert_eq!(summary.estimated_fix_time(), "2h 15m");
        summary.estimated_fix_minutes = 60;
        assert_eq!(summary.estimated_fix_time(), "1h");
    }
}
