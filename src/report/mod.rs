use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::types::{AuditSession, BatchReport, DimensionResult, Issue, Severity, Status};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Output the session to the terminal (default) or to a markdown file.
#[instrument(skip(session), fields(score = session.overall_score, status = %session.overall_status))]
pub fn output(session: &AuditSession, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(session);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(session, path)
        }
    }
}

/// Serialize any report value as pretty JSON (camelCase keys).
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json + "\n")?;
    debug!(path = %path.display(), "wrote json report");
    Ok(())
}

fn location(issue: &Issue) -> String {
    match (&issue.file, issue.line) {
        (Some(f), Some(l)) => format!("{}:{}", f, l),
        (Some(f), None) => f.clone(),
        _ => String::new(),
    }
}

fn print_terminal_report(session: &AuditSession) {
    let summary = &session.summary;
    println!();
    println!(
        "Project Health: {}/100 ({})",
        session.overall_score,
        colorize_status(session.overall_status)
    );
    println!(
        "Issues: {} (critical {}, high {}, medium {}, low {}) | Auto-fixable: {} | Est. fix time: {}",
        summary.total_issues,
        summary.critical_issues,
        summary.high_issues,
        summary.medium_issues,
        summary.low_issues,
        summary.auto_fixable_issues,
        summary.estimated_fix_time()
    );
    if session.cancelled {
        println!("{}", "Run cancelled: not every dimension was scanned.".yellow());
    }
    println!();

    for result in &session.results {
        print_dimension(result);
    }

    println!(
        "═══ Overall: {}/100 {} ═══",
        session.overall_score,
        colorize_status(session.overall_status)
    );
    println!();
}

fn print_dimension(result: &DimensionResult) {
    println!(
        "═══ {}: {}/{} {} ═══",
        result.dimension.title(),
        result.score,
        result.max_score,
        colorize_status(result.status)
    );
    if result.issues.is_empty() {
        println!("  No issues.");
    }
    for issue in &result.issues {
        let loc = location(issue);
        let fix = if issue.auto_fix_available { " [auto-fix]".cyan().to_string() } else { String::new() };
        if loc.is_empty() {
            println!("  • [{}] {}{}", colorize_severity(issue.severity), issue.title, fix);
        } else {
            println!("  • [{}] {} ({}){}", colorize_severity(issue.severity), issue.title, loc, fix);
        }
    }
    for skipped in &result.skipped_checks {
        println!("  {} {} ({})", "skipped".dimmed(), skipped.rule, skipped.reason);
    }
    for failed in &result.failed_checks {
        println!("  {} {} ({})", "failed".red(), failed.rule, failed.reason);
    }
    println!();
}

/// Print the outcome of a fix batch.
pub fn print_batch_report(report: &BatchReport) {
    println!();
    println!(
        "Fixes: {} applied, {} failed, {} skipped",
        report.success.to_string().green().bold(),
        report.failed.to_string().red().bold(),
        report.skipped.len()
    );
    for outcome in &report.outcomes {
        match &outcome.error {
            None if outcome.written.is_empty() => {
                println!("  {} {} (already fixed)", "✓".green(), outcome.rule)
            }
            None => println!("  {} {} → {}", "✓".green(), outcome.rule, outcome.written.join(", ")),
            Some(error) => println!("  {} {}: {}", "✗".red(), outcome.rule, error),
        }
    }
    if report.cancelled {
        println!("{}", "Fix batch cancelled before every issue was attempted.".yellow());
    }
    println!();
}

/// Render the session as markdown.
pub fn render_markdown(session: &AuditSession) -> String {
    let summary = &session.summary;
    let mut md = String::new();
    md.push_str(&format!(
        "# Project Health: {}/100 ({})\n\n",
        session.overall_score, session.overall_status
    ));
    md.push_str(&format!(
        "**Issues:** {} | **Critical:** {} | **High:** {} | **Medium:** {} | **Low:** {} | **Auto-fixable:** {} | **Est. fix time:** {}\n\n",
        summary.total_issues,
        summary.critical_issues,
        summary.high_issues,
        summary.medium_issues,
        summary.low_issues,
        summary.auto_fixable_issues,
        summary.estimated_fix_time()
    ));
    if session.cancelled {
        md.push_str("> Run cancelled: not every dimension was scanned.\n\n");
    }

    for result in &session.results {
        md.push_str(&format!(
            "## {}: {}/{} ({})\n\n",
            result.dimension.title(),
            result.score,
            result.max_score,
            result.status
        ));
        if result.issues.is_empty() {
            md.push_str("No issues.\n\n");
        } else {
            for issue in &result.issues {
                let loc = location(issue);
                let loc = if loc.is_empty() { String::new() } else { format!(" (`{}`)", loc) };
                md.push_str(&format!("- **[{}]** {}{}\n", issue.severity, issue.title, loc));
                if !issue.suggestion.is_empty() {
                    md.push_str(&format!("  - {}\n", issue.suggestion));
                }
            }
            md.push('\n');
        }
        for failed in result.skipped_checks.iter().chain(&result.failed_checks) {
            md.push_str(&format!("- _{} not run: {}_\n", failed.rule, failed.reason));
        }
    }

    md.push_str(&format!("## Overall: {}/100 ({})\n", session.overall_score, session.overall_status));
    md
}

fn write_markdown_report(session: &AuditSession, path: &Path) -> Result<(), ReportError> {
    std::fs::write(path, render_markdown(session))?;
    Ok(())
}

fn colorize_status(status: Status) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        Status::Excellent => label.green().bold(),
        Status::Good => label.cyan().bold(),
        Status::NeedsImprovement => label.yellow().bold(),
        Status::Critical => label.red().bold(),
    }
}

fn colorize_severity(severity: Severity) -> colored::ColoredString {
    let label = severity.to_string();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.normal(),
        Severity::Info => label.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::issue_id;
    use crate::catalog::RuleCatalog;
    use crate::scoring::aggregate;
    use crate::types::{CheckFailure, Dimension, FixOutcome};

    fn sample_issue() -> Issue {
        Issue {
            id: issue_id(Dimension::Security, "security/eval-usage", Some("lib/run.ts"), Some(7)),
            dimension: Dimension::Security,
            severity: Severity::High,
            rule: "security/eval-usage".to_string(),
            title: "Dynamic code execution".to_string(),
            description: "eval".to_string(),
            file: Some("lib/run.ts".to_string()),
            line: Some(7),
            fixable: true,
            auto_fix_available: false,
            impact: String::new(),
            suggestion: "Replace with JSON.parse".to_string(),
            solution: String::new(),
        }
    }

    fn sample_session() -> AuditSession {
        let catalog = RuleCatalog::builtin();
        let results = Dimension::ALL
            .iter()
            .map(|&dimension| {
                let issues = if dimension == Dimension::Security { vec![sample_issue()] } else { vec![] };
                let score = crate::scoring::dimension_score(&issues);
                DimensionResult {
                    dimension,
                    score,
                    max_score: 100,
                    passed_checks: 2,
                    total_checks: 3,
                    status: crate::scoring::status_for(score, catalog.thresholds.get(dimension)),
                    issues,
                    skipped_checks: if dimension == Dimension::Dependency {
                        vec![CheckFailure {
                            rule: "dependency/missing-lockfile".to_string(),
                            reason: "package.json: not found".to_string(),
                        }]
                    } else {
                        vec![]
                    },
                    failed_checks: vec![],
                }
            })
            .collect();
        aggregate(&catalog, results)
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&sample_session());
        assert!(md.starts_with("# Project Health: "));
        assert!(md.contains("## Security: "));
        assert!(md.contains("- **[HIGH]** Dynamic code execution (`lib/run.ts:7`)"));
        assert!(md.contains("  - Replace with JSON.parse"));
        assert!(md.contains("_dependency/missing-lockfile not run: package.json: not found_"));
        assert!(md.contains("## Overall: "));
    }

    #[test]
    fn test_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        output(&sample_session(), Some(&path)).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("Dynamic code execution"));
    }

    #[test]
    fn test_write_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&sample_session(), &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.get("overallScore").is_some());
        assert_eq!(value.pointer("/results/2/issues/0/autoFixAvailable"), Some(&serde_json::Value::Bool(false)));
        assert_eq!(value.pointer("/results/2/dimension"), Some(&serde_json::json!("security")));
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.md");
        assert!(matches!(
            output(&sample_session(), Some(&path)),
            Err(ReportError::FileWrite(_))
        ));
    }

    #[test]
    fn test_terminal_output_does_not_panic() {
        output(&sample_session(), None).unwrap();
        let issue = sample_issue();
        print_batch_report(&BatchReport {
            success: 1,
            failed: 1,
            skipped: vec!["abc".to_string()],
            outcomes: vec![
                FixOutcome::applied(&issue, vec!["lib/run.ts".to_string()]),
                FixOutcome::failed(&issue, "boom"),
            ],
            cancelled: true,
        });
    }
}
