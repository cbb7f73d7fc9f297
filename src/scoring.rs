//! Issue → score → status, and the cross-dimension aggregate.

use chrono::Utc;

use crate::catalog::{RuleCatalog, Thresholds};
use crate::types::{AuditSession, Dimension, DimensionResult, Issue, Severity, Status, Summary};

pub const MAX_SCORE: u8 = 100;

/// Points removed from a dimension score per issue.
pub fn deduction(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 20,
        Severity::High => 15,
        Severity::Medium => 10,
        Severity::Low => 5,
        Severity::Info => 2,
    }
}

/// Heuristic minutes to fix one issue by hand.
pub fn estimated_minutes(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 30,
        Severity::High => 20,
        Severity::Medium => 10,
        Severity::Low => 5,
        Severity::Info => 0,
    }
}

/// `max(0, 100 - Σ deduction)`.
pub fn dimension_score(issues: &[Issue]) -> u8 {
    let total: u32 = issues.iter().map(|i| deduction(i.severity)).sum();
    u32::from(MAX_SCORE).saturating_sub(total) as u8
}

pub fn status_for(score: u8, thresholds: &Thresholds) -> Status {
    if score >= thresholds.excellent {
        Status::Excellent
    } else if score >= thresholds.good {
        Status::Good
    } else if score >= thresholds.needs_improvement {
        Status::NeedsImprovement
    } else {
        Status::Critical
    }
}

/// Weighted average of dimension scores, rounded.
///
/// Summed in `Dimension::ALL` order so the result does not depend on the
/// order of `results`. When only some dimensions are present the weights
/// are renormalised over those.
pub fn overall_score(catalog: &RuleCatalog, results: &[DimensionResult]) -> u8 {
    let mut weighted = 0.0;
    let mut weight_total = 0.0;
    for dimension in Dimension::ALL {
        if let Some(result) = results.iter().find(|r| r.dimension == dimension) {
            let weight = catalog.weights.get(dimension);
            weighted += f64::from(result.score) * weight;
            weight_total += weight;
        }
    }
    if weight_total <= 0.0 {
        return 0;
    }
    let full = (catalog.weights.sum() - weight_total).abs() < 1e-9;
    let score = if full { weighted } else { weighted / weight_total };
    score.round().clamp(0.0, f64::from(MAX_SCORE)) as u8
}

pub fn summarize(results: &[DimensionResult]) -> Summary {
    let mut summary = Summary::default();
    for result in results {
        summary.failed_checks += result.failed_checks.len();
        for issue in &result.issues {
            summary.total_issues += 1;
            match issue.severity {
                Severity::Critical => summary.critical_issues += 1,
                Severity::High => summary.high_issues += 1,
                Severity::Medium => summary.medium_issues += 1,
                Severity::Low => summary.low_issues += 1,
                Severity::Info => {}
            }
            if issue.auto_fix_available {
                summary.auto_fixable_issues += 1;
            }
            summary.estimated_fix_minutes += estimated_minutes(issue.severity);
        }
    }
    summary
}

impl AuditSession {
    /// A fresh, running session with no results.
    pub fn start() -> Self {
        Self {
            results: Vec::new(),
            overall_score: 0,
            overall_status: Status::Critical,
            summary: Summary::default(),
            start_time: Utc::now(),
            end_time: None,
            is_running: true,
            cancelled: false,
        }
    }

    /// Record a completed dimension. Ignored once the session is sealed.
    pub fn record(&mut self, result: DimensionResult) {
        if self.is_running {
            self.results.push(result);
        }
    }

    /// Compute the aggregate and stop the session. Sealing twice is a no-op.
    pub fn seal(&mut self, catalog: &RuleCatalog) {
        if !self.is_running {
            return;
        }
        self.overall_score = overall_score(catalog, &self.results);
        self.overall_status = status_for(self.overall_score, &catalog.overall_thresholds);
        self.summary = summarize(&self.results);
        self.end_time = Some(Utc::now());
        self.is_running = false;
    }
}

/// Combine finished dimension results into a sealed session.
pub fn aggregate(catalog: &RuleCatalog, results: Vec<DimensionResult>) -> AuditSession {
    let mut session = AuditSession::start();
    for result in results {
        session.record(result);
    }
    session.seal(catalog);
    session
}
