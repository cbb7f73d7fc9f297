use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::{Check, CheckContext, CheckError, Finding};
use crate::types::Dimension;

/// A quoted literal assigned to an identifier that names a credential.
/// Covers `name = "..."`, `name: "..."` (object property) and the typed
/// `name: string = "..."` declaration.
///
/// Groups: `name` (identifier), `lit` (the literal including quotes), `value`.
pub fn secret_assignment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(?P<name>[a-z_$][\w$]*(?:key|secret|token|password|passwd|pwd)[\w$]*)(?:\s*:\s*[\w.<>\[\]| ]+?\s*=|\s*[:=])\s*(?P<lit>["'`](?P<value>[^"'`\s]{6,})["'`])"#,
        )
        .unwrap()
    })
}

fn eval_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\beval\s*\(|\bnew\s+Function\s*\(").unwrap())
}

/// Whether a matched literal looks like a real credential rather than a
/// label or placeholder.
pub fn looks_like_secret(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    if ["your_", "your-", "xxx", "example", "placeholder", "changeme"]
        .iter()
        .any(|p| lower.contains(p))
    {
        return false;
    }
    value.chars().any(|c| c.is_ascii_digit()) || value.len() >= 20
}

/// `apiKey` → `API_KEY`, `stripe-secret` → `STRIPE_SECRET`.
pub fn env_var_name(identifier: &str) -> String {
    let mut name = String::with_capacity(identifier.len() + 4);
    let mut prev: Option<char> = None;
    for c in identifier.chars() {
        if c == '-' || c == '_' || c == '$' {
            if !name.is_empty() && !name.ends_with('_') {
                name.push('_');
            }
        } else {
            if c.is_ascii_uppercase()
                && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
                && !name.ends_with('_')
            {
                name.push('_');
            }
            name.push(c.to_ascii_uppercase());
        }
        prev = Some(c);
    }
    name.trim_end_matches('_').to_string()
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*")
}

/// Scan for hardcoded secrets, API keys, tokens, passwords. One finding per line.
pub struct HardcodedSecretsCheck;

#[async_trait]
impl Check for HardcodedSecretsCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Security
    }

    fn rule(&self) -> &'static str {
        "security/hardcoded-secrets"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["ts", "tsx", "js", "jsx"]).await? {
            let content = ctx.read(&file).await?;
            for (i, line) in content.lines().enumerate() {
                if is_comment(line) {
                    continue;
                }
                let hit = secret_assignment()
                    .captures_iter(line)
                    .find(|caps| looks_like_secret(&caps["value"]));
                if let Some(caps) = hit {
                    let name = &caps["name"];
                    findings.push(
                        Finding::new(
                            "Hardcoded secret",
                            format!("{} is assigned a literal credential", name),
                        )
                        .at(file.clone(), Some(i + 1))
                        .impact("Anyone with access to the source or bundle can read the secret")
                        .suggestion("Move the value to an environment variable")
                        .solution(format!("process.env.{}", env_var_name(name))),
                    );
                }
            }
        }
        Ok(findings)
    }
}

/// `dangerouslySetInnerHTML` usage. One finding per line.
pub struct DangerousHtmlCheck;

#[async_trait]
impl Check for DangerousHtmlCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Security
    }

    fn rule(&self) -> &'static str {
        "security/dangerous-html"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["tsx", "jsx"]).await? {
            let content = ctx.read(&file).await?;
            for (i, line) in content.lines().enumerate() {
                if line.contains("dangerouslySetInnerHTML") && !is_comment(line) {
                    findings.push(
                        Finding::new(
                            "dangerouslySetInnerHTML",
                            "Raw HTML is injected into the DOM",
                        )
                        .at(file.clone(), Some(i + 1))
                        .impact("Unsanitised HTML enables cross-site scripting")
                        .suggestion("Render text instead, or sanitise with DOMPurify")
                        .solution("dangerouslySetInnerHTML={{ __html: DOMPurify.sanitize(html) }}"),
                    );
                }
            }
        }
        Ok(findings)
    }
}

/// `eval(` and `new Function(`. One finding per line.
pub struct EvalUsageCheck;

#[async_trait]
impl Check for EvalUsageCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Security
    }

    fn rule(&self) -> &'static str {
        "security/eval-usage"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["ts", "tsx", "js", "jsx"]).await? {
            let content = ctx.read(&file).await?;
            for (i, line) in content.lines().enumerate() {
                if eval_call().is_match(line) && !is_comment(line) {
                    findings.push(
                        Finding::new("Dynamic code execution", "eval or new Function executes strings as code")
                            .at(file.clone(), Some(i + 1))
                            .impact("Attacker-controlled strings become executable code")
                            .suggestion("Replace with JSON.parse or explicit logic")
                            .solution("Remove eval/new Function"),
                    );
                }
            }
        }
        Ok(findings)
    }
}
