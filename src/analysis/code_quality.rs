use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::{line_of, Check, CheckContext, CheckError, Finding};
use crate::types::Dimension;

pub const TSCONFIG: &str = "tsconfig.json";

/// Matches an `any` type annotation.
pub fn any_annotation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":\s*any\b").unwrap())
}

/// Matches a `console.log(` call.
pub fn console_log() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bconsole\.log\s*\(").unwrap())
}

fn branching() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:if|for|while|case|catch)\b|&&|\|\||\?\s*[^.?:\s]").unwrap())
}

/// `tsconfig.json` must enable `compilerOptions.strict`.
pub struct StrictModeCheck;

#[async_trait]
impl Check for StrictModeCheck {
    fn dimension(&self) -> Dimension {
        Dimension::CodeQuality
    }

    fn rule(&self) -> &'static str {
        "typescript/strict-mode"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let tsconfig = ctx.read_json(TSCONFIG).await?;
        let strict = tsconfig
            .pointer("/compilerOptions/strict")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if strict {
            return Ok(vec![]);
        }
        Ok(vec![Finding::new(
            "TypeScript strict mode is disabled",
            "compilerOptions.strict is not enabled in tsconfig.json",
        )
        .at(TSCONFIG, None)
        .impact("Null and implicit-any bugs slip through type checking")
        .suggestion("Enable strict mode")
        .solution("Set \"strict\": true under compilerOptions")])
    }
}

/// Flags files that use `: any` annotations. One finding per file.
pub struct NoAnyCheck;

#[async_trait]
impl Check for NoAnyCheck {
    fn dimension(&self) -> Dimension {
        Dimension::CodeQuality
    }

    fn rule(&self) -> &'static str {
        "typescript/no-any"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["ts", "tsx"]).await? {
            let content = ctx.read(&file).await?;
            let mut matches = any_annotation().find_iter(&content);
            let Some(first) = matches.next() else {
                continue;
            };
            let count = 1 + matches.count();
            findings.push(
                Finding::new(
                    "Use of the any type",
                    format!("{} occurrence(s) of `: any` in {}", count, file),
                )
                .at(file.clone(), Some(line_of(&content, first.start())))
                .impact("any disables type checking for everything it touches")
                .suggestion("Replace any with a concrete type or unknown")
                .solution("Annotate with unknown and narrow, or define an interface"),
            );
        }
        Ok(findings)
    }
}

/// Counts branching tokens per file against `complexity_threshold`.
pub struct ComplexityCheck;

#[async_trait]
impl Check for ComplexityCheck {
    fn dimension(&self) -> Dimension {
        Dimension::CodeQuality
    }

    fn rule(&self) -> &'static str {
        "complexity/high-complexity"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let threshold = ctx.scan.complexity_threshold;
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["ts", "tsx", "js", "jsx"]).await? {
            let content = ctx.read(&file).await?;
            let branches = content
                .lines()
                .filter(|line| !line.trim_start().starts_with("//"))
                .map(|line| branching().find_iter(line).count())
                .sum::<usize>();
            if branches > threshold {
                findings.push(
                    Finding::new(
                        "High cyclomatic complexity",
                        format!("{} has {} branch points (threshold {})", file, branches, threshold),
                    )
                    .at(file, None)
                    .impact("Complex code is harder to test and more likely to hide bugs")
                    .suggestion("Split the file into smaller functions or components")
                    .solution("Extract helpers and use early returns to flatten branches"),
                );
            }
        }
        Ok(findings)
    }
}

/// Flags files that still call `console.log`. One finding per file.
pub struct ConsoleLogCheck;

#[async_trait]
impl Check for ConsoleLogCheck {
    fn dimension(&self) -> Dimension {
        Dimension::CodeQuality
    }

    fn rule(&self) -> &'static str {
        "code-quality/no-console"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["ts", "tsx", "js", "jsx"]).await? {
            let content = ctx.read(&file).await?;
            let Some(first) = console_log().find(&content) else {
                continue;
            };
            findings.push(
                Finding::new(
                    "console.log left in code",
                    format!("{} calls console.log", file),
                )
                .at(file.clone(), Some(line_of(&content, first.start())))
                .impact("Debug output leaks to users' consoles and costs bytes")
                .suggestion("Remove the call or use a logger")
                .solution("Delete the console.log statement"),
            );
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::{run_check, test_context};

    #[tokio::test]
    async fn test_strict_mode_disabled_is_flagged() {
        let findings = run_check(
            &StrictModeCheck,
            &[("tsconfig.json", r#"{"compilerOptions": {"strict": false}}"#)],
        )
        .await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].file.as_deref(), Some("tsconfig.json"));
    }

    #[tokio::test]
    async fn test_strict_mode_enabled_is_clean() {
        let findings = run_check(
            &StrictModeCheck,
            &[("tsconfig.json", r#"{"compilerOptions": {"strict": true}}"#)],
        )
        .await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_strict_mode_without_tsconfig_is_config_error() {
        let (_, ctx) = test_context(&[]);
        let err = StrictModeCheck.run(&ctx).await.unwrap_err();
        assert!(matches!(err, CheckError::Config { .. }));

        let (_, ctx) = test_context(&[("tsconfig.json", "{ // comment\n}")]);
        let err = StrictModeCheck.run(&ctx).await.unwrap_err();
        assert!(matches!(err, CheckError::Config { .. }));
    }

    #[tokio::test]
    async fn test_no_any_one_finding_per_file() {
        let findings = run_check(
            &NoAnyCheck,
            &[(
                "src/user.ts",
                "const a = 1;\nfunction f(x: any) {}\nlet y: any = 2;\n",
            )],
        )
        .await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(2));
        assert!(findings[0].description.contains("2 occurrence(s)"));
    }

    #[tokio::test]
    async fn test_no_any_ignores_words_containing_any() {
        let findings = run_check(
            &NoAnyCheck,
            &[("src/a.ts", "const company: Company = anyOf(list);\nlet x: unknown;\n")],
        )
        .await;
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_complexity_threshold() {
        let branchy: String = (0..20).map(|i| format!("if (x === {}) {{ y(); }}\n", i)).collect();
        let findings = run_check(
            &ComplexityCheck,
            &[("lib/branchy.ts", branchy.as_str()), ("lib/flat.ts", "export const a = 1;\n")],
        )
        .await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].file.as_deref(), Some("lib/branchy.ts"));
    }

    #[tokio::test]
    async fn test_console_log_detected() {
        let findings = run_check(
            &ConsoleLogCheck,
            &[
                ("app/page.tsx", "export default function Page() {\n  console.log('hi');\n}\n"),
                ("app/clean.tsx", "console.error('kept');\n"),
            ],
        )
        .await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(2));
    }
}
