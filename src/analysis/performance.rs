use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::{line_of, Check, CheckContext, CheckError, Finding};
use crate::types::Dimension;

/// Next.js build configuration files, in lookup order.
pub const NEXT_CONFIG_FILES: &[&str] = &["next.config.js", "next.config.mjs", "next.config.ts"];

/// App-router files that React must render as-is.
const ROUTE_FILES: &[&str] = &["page", "layout", "template", "loading", "error", "not-found", "route"];

/// `export default function Name(` with a capitalised component name.
pub fn default_component() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^export\s+default\s+function\s+([A-Z][A-Za-z0-9_]*)\s*\(").unwrap()
    })
}

fn image_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(?:img|Image)\b").unwrap())
}

/// An `images:` key in a build config.
pub fn images_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bimages\s*:").unwrap())
}

fn dynamic_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bimport\s*\(|['"]next/dynamic['"]|\blazy\s*\("#).unwrap())
}

/// The existing Next.js config, if any, relative to the root.
pub async fn find_next_config(ctx: &CheckContext) -> Option<&'static str> {
    for candidate in NEXT_CONFIG_FILES {
        if ctx.exists(candidate).await {
            return Some(*candidate);
        }
    }
    None
}

/// A Next.js project has a next config or depends on `next`.
async fn is_next_project(ctx: &CheckContext) -> bool {
    if find_next_config(ctx).await.is_some() {
        return true;
    }
    match ctx.read_json("package.json").await {
        Ok(pkg) => ["dependencies", "devDependencies"]
            .iter()
            .any(|section| pkg.get(section).and_then(|deps| deps.get("next")).is_some()),
        Err(_) => false,
    }
}

/// The config path to report against and its contents ("" if absent).
async fn next_config(ctx: &CheckContext) -> Result<(&'static str, String), CheckError> {
    match find_next_config(ctx).await {
        Some(path) => Ok((path, ctx.read(path).await?)),
        None => Ok((NEXT_CONFIG_FILES[0], String::new())),
    }
}

/// Default-exported function components that are not memoized.
pub struct MissingMemoCheck;

#[async_trait]
impl Check for MissingMemoCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Performance
    }

    fn rule(&self) -> &'static str {
        "react/missing-memo"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let mut findings = Vec::new();
        for file in ctx.sample_files(&["tsx", "jsx"]).await? {
            let stem = file
                .rsplit('/')
                .next()
                .and_then(|name| name.split('.').next())
                .unwrap_or("");
            if ROUTE_FILES.contains(&stem) {
                continue;
            }
            let content = ctx.read(&file).await?;
            if content.contains("memo(") {
                continue;
            }
            let Some(caps) = default_component().captures(&content) else {
                continue;
            };
            let name = &caps[1];
            findings.push(
                Finding::new(
                    format!("Component {} is not memoized", name),
                    format!("{} default-exports {} without React.memo", file, name),
                )
                .at(file.clone(), Some(line_of(&content, caps.get(0).map_or(0, |m| m.start()))))
                .impact("The component re-renders whenever its parent does")
                .suggestion("Wrap pure components in React.memo")
                .solution(format!("export default React.memo({});", name)),
            );
        }
        Ok(findings)
    }
}

/// Images are rendered but the build config has no `images` block.
pub struct ImageOptimizationCheck;

#[async_trait]
impl Check for ImageOptimizationCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Performance
    }

    fn rule(&self) -> &'static str {
        "next/image-optimization"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        if !is_next_project(ctx).await {
            return Ok(vec![]);
        }
        let mut uses_images = false;
        for file in ctx.sample_files(&["tsx", "jsx"]).await? {
            if image_tag().is_match(&ctx.read(&file).await?) {
                uses_images = true;
                break;
            }
        }
        if !uses_images {
            return Ok(vec![]);
        }
        let (config_path, config) = next_config(ctx).await?;
        if images_block().is_match(&config) {
            return Ok(vec![]);
        }
        Ok(vec![Finding::new(
            "Image optimization is not configured",
            format!("{} has no images block", config_path),
        )
        .at(config_path, None)
        .impact("Images ship in their original format and size")
        .suggestion("Enable modern image formats in next.config")
        .solution("images: { formats: ['image/avif', 'image/webp'] }")])
    }
}

/// Larger apps with no dynamic imports and no chunk splitting configured.
pub struct CodeSplittingCheck;

#[async_trait]
impl Check for CodeSplittingCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Performance
    }

    fn rule(&self) -> &'static str {
        "next/code-splitting"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        if !is_next_project(ctx).await {
            return Ok(vec![]);
        }
        let files = ctx.sample_files(&["ts", "tsx", "js", "jsx"]).await?;
        if files.len() < ctx.scan.code_splitting_min_files {
            return Ok(vec![]);
        }
        for file in &files {
            if dynamic_import().is_match(&ctx.read(file).await?) {
                return Ok(vec![]);
            }
        }
        let (config_path, config) = next_config(ctx).await?;
        if config.contains("splitChunks") {
            return Ok(vec![]);
        }
        Ok(vec![Finding::new(
            "No code splitting",
            format!("{} source files and no dynamic imports or splitChunks setting", files.len()),
        )
        .at(config_path, None)
        .impact("Every page downloads one large bundle")
        .suggestion("Load heavy components with next/dynamic or split vendor chunks")
        .solution("Configure webpack optimization.splitChunks in next.config")])
    }
}
