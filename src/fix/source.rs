use async_trait::async_trait;
use regex::{Captures, Regex};
use std::sync::OnceLock;

use super::{FixContext, FixError, FixStrategy};
use crate::analysis::accessibility::{image_element, missing_alt};
use crate::analysis::code_quality::any_annotation;
use crate::analysis::performance::default_component;
use crate::types::Issue;

const UNKNOWN_ANNOTATION: &str = ": unknown // TODO: 添加具体类型定义";

/// A whole line holding one `console.log(...)` statement.
fn console_statement() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*console\.log\s*\([^;\n]*\)[ \t]*;?[ \t]*(?:\r?\n|\z)").unwrap()
    })
}

fn react_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^import\s+(?:\*\s+as\s+)?React\b").unwrap())
}

fn client_directive() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\A\s*(?:'use client'|"use client");?[ \t]*\r?\n"#).unwrap())
}

pub fn replace_any(content: &str) -> String {
    any_annotation()
        .replace_all(content, regex::NoExpand(UNKNOWN_ANNOTATION))
        .into_owned()
}

/// Drop lines that hold nothing but a single-line `console.log` call.
/// Multi-line calls are left for a human.
pub fn remove_console_logs(content: &str) -> String {
    console_statement().replace_all(content, "").into_owned()
}

/// Re-export the default component through `React.memo`.
///
/// `None` when there is no `export default function Name(` to wrap.
/// Content already calling `memo(` is returned unchanged.
pub fn wrap_in_memo(content: &str) -> Option<String> {
    if content.contains("memo(") {
        return Some(content.to_string());
    }
    let caps = default_component().captures(content)?;
    let whole = caps.get(0)?;
    let name = &caps[1];

    let mut out = String::with_capacity(content.len() + 64);
    out.push_str(&content[..whole.start()]);
    out.push_str(&format!("function {}(", name));
    out.push_str(&content[whole.end()..]);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("\nexport default React.memo({});\n", name));

    if !react_import().is_match(&out) {
        let at = client_directive().find(&out).map_or(0, |m| m.end());
        out.insert_str(at, "import React from 'react';\n");
    }
    Some(out)
}

/// Give every image tag without `alt` an empty one.
pub fn add_missing_alt(content: &str) -> String {
    image_element()
        .replace_all(content, |caps: &Captures| {
            if missing_alt(&caps["attrs"]) {
                format!("<{} alt=\"\"{}>", &caps["tag"], &caps["attrs"])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

pub struct NoAnyFix;

#[async_trait]
impl FixStrategy for NoAnyFix {
    fn rule(&self) -> &'static str {
        "typescript/no-any"
    }

    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        let target = ctx.target(issue)?;
        ctx.rewrite(target, |c| Ok(replace_any(c))).await
    }
}

pub struct ConsoleLogFix;

#[async_trait]
impl FixStrategy for ConsoleLogFix {
    fn rule(&self) -> &'static str {
        "code-quality/no-console"
    }

    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        let target = ctx.target(issue)?;
        ctx.rewrite(target, |c| Ok(remove_console_logs(c))).await
    }
}

pub struct MemoFix;

#[async_trait]
impl FixStrategy for MemoFix {
    fn rule(&self) -> &'static str {
        "react/missing-memo"
    }

    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        let target = ctx.target(issue)?;
        ctx.rewrite(target, |c| {
            wrap_in_memo(c)
                .ok_or_else(|| FixError::unsupported(target, "no default-exported function component"))
        })
        .await
    }
}

pub struct ImgAltFix;

#[async_trait]
impl FixStrategy for ImgAltFix {
    fn rule(&self) -> &'static str {
        "a11y/img-alt"
    }

    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        let target = ctx.target(issue)?;
        ctx.rewrite(target, |c| Ok(add_missing_alt(c))).await
    }
}
