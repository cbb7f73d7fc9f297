use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::{line_of, Check, CheckContext, CheckError, Finding};
use crate::types::Dimension;

/// An opening `<img` / `<Image` tag. `attrs` runs up to the closing `>`,
/// stepping over `{...}` expressions (two levels deep) so `=>` inside a
/// prop does not end the tag.
pub fn image_element() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(?P<tag>img|Image)\b(?P<attrs>(?:[^>{]|\{(?:[^{}]|\{[^{}]*\})*\})*)>").unwrap()
    })
}

fn alt_attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\balt\s*=").unwrap())
}

fn key_handler() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bonKey(?:Down|Up|Press)\s*=").unwrap())
}

fn click_handler() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bonClick\s*=").unwrap())
}

/// Elements that are keyboard-accessible without extra handlers.
fn natively_interactive(line: &str) -> bool {
    ["<button", "<a ", "<Link", "<input", "<select", "<summary"]
        .iter()
        .any(|tag| line.contains(tag))
}

/// Whether an image tag lacks an `alt` attribute.
pub fn missing_alt(attrs: &str) -> bool {
    !alt_attribute().is_match(attrs)
}

/// Image tags without `alt`. One finding per file, at the first offender.
pub struct ImgAltCheck;

#[async_trait]
impl Check for ImgAltCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Accessibility
    }

    fn rule(&self) -> &'static str {
        "a11y/img-alt"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["tsx", "jsx"]).await? {
            let content = ctx.read(&file).await?;
            let offenders: Vec<_> = image_element()
                .captures_iter(&content)
                .filter(|caps| missing_alt(&caps["attrs"]))
                .filter_map(|caps| caps.get(0).map(|m| m.start()))
                .collect();
            let Some(first) = offenders.first() else {
                continue;
            };
            findings.push(
                Finding::new(
                    "Image without alt text",
                    format!("{} image tag(s) in {} have no alt attribute", offenders.len(), file),
                )
                .at(file.clone(), Some(line_of(&content, *first)))
                .impact("Screen readers cannot describe the image")
                .suggestion("Describe the image, or use alt=\"\" for decorative images")
                .solution("<img src=\"...\" alt=\"Description\" />"),
            );
        }
        Ok(findings)
    }
}

/// More click handlers than keyboard handlers on non-interactive elements.
pub struct KeyboardHandlerCheck;

#[async_trait]
impl Check for KeyboardHandlerCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Accessibility
    }

    fn rule(&self) -> &'static str {
        "a11y/keyboard-handler"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["tsx", "jsx"]).await? {
            let content = ctx.read(&file).await?;
            let mut clicks = 0usize;
            let mut keys = 0usize;
            let mut first_unpaired = None;
            for (i, line) in content.lines().enumerate() {
                if natively_interactive(line) {
                    continue;
                }
                let has_key = key_handler().is_match(line);
                if has_key {
                    keys += 1;
                }
                if click_handler().is_match(line) {
                    clicks += 1;
                    if !has_key && first_unpaired.is_none() {
                        first_unpaired = Some(i + 1);
                    }
                }
            }
            if clicks > keys {
                findings.push(
                    Finding::new(
                        "Click handler without keyboard support",
                        format!("{} has {} onClick and {} keyboard handlers", file, clicks, keys),
                    )
                    .at(file.clone(), first_unpaired)
                    .impact("Keyboard and switch users cannot trigger the action")
                    .suggestion("Use a <button>, or add onKeyDown with role and tabIndex")
                    .solution("<div role=\"button\" tabIndex={0} onClick={fn} onKeyDown={fn}>"),
                );
            }
        }
        Ok(findings)
    }
}
