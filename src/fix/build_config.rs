use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::{FixContext, FixError, FixStrategy};
use crate::analysis::code_quality::TSCONFIG;
use crate::analysis::performance::{images_block, NEXT_CONFIG_FILES};
use crate::types::Issue;

const NEW_NEXT_CONFIG: &str = "/** @type {import('next').NextConfig} */
const nextConfig = {
};

module.exports = nextConfig;
";

const IMAGES_BLOCK: &str = "  images: {
    formats: ['image/avif', 'image/webp'],
  },";

const SPLIT_CHUNKS_BLOCK: &str = "  webpack: (config) => {
    config.optimization.splitChunks = { chunks: 'all' };
    return config;
  },";

/// The opening brace of the exported config object literal.
fn config_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)(?:^[ \t]*(?:const|let|var)\s+\w+\s*(?::\s*[\w.]+\s*)?=\s*|module\.exports\s*=\s*|export\s+default\s+)\{",
        )
        .unwrap()
    })
}

fn webpack_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bwebpack\s*[:(]").unwrap())
}

/// Set `compilerOptions.strict` to `true`, keeping key order.
/// Content that already has it is returned unchanged.
pub fn enable_strict(content: &str) -> Result<String, String> {
    let mut root: Value = if content.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(content).map_err(|e| format!("not plain JSON ({})", e))?
    };
    let Some(object) = root.as_object_mut() else {
        return Err("top level is not an object".to_string());
    };
    let options = object
        .entry("compilerOptions")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(options) = options.as_object_mut() else {
        return Err("compilerOptions is not an object".to_string());
    };
    if options.get("strict") == Some(&Value::Bool(true)) {
        return Ok(content.to_string());
    }
    options.insert("strict".to_string(), Value::Bool(true));

    let mut out = serde_json::to_string_pretty(&root).map_err(|e| e.to_string())?;
    out.push('\n');
    Ok(out)
}

/// Insert `block` as the first property of the exported config object.
pub fn insert_config_block(content: &str, block: &str) -> Result<String, String> {
    let Some(open) = config_object().find(content) else {
        return Err("no config object literal to extend".to_string());
    };
    let mut out = String::with_capacity(content.len() + block.len() + 1);
    out.push_str(&content[..open.end()]);
    out.push('\n');
    out.push_str(block);
    out.push_str(&content[open.end()..]);
    Ok(out)
}

pub fn add_image_formats(content: &str) -> Result<String, String> {
    if images_block().is_match(content) {
        return Ok(content.to_string());
    }
    insert_config_block(content, IMAGES_BLOCK)
}

pub fn add_split_chunks(content: &str) -> Result<String, String> {
    if content.contains("splitChunks") {
        return Ok(content.to_string());
    }
    if webpack_key().is_match(content) {
        return Err("webpack is already customised; add splitChunks by hand".to_string());
    }
    insert_config_block(content, SPLIT_CHUNKS_BLOCK)
}

/// Edit the project's Next.js config, creating `next.config.js` if none exists.
async fn edit_next_config<F>(ctx: &FixContext, edit: F) -> Result<Vec<String>, FixError>
where
    F: FnOnce(&str) -> Result<String, String> + Send,
{
    let mut target = NEXT_CONFIG_FILES[0];
    for &candidate in NEXT_CONFIG_FILES {
        if ctx.exists(candidate).await {
            target = candidate;
            break;
        }
    }
    let old = ctx.read_optional(target).await?;
    let base = old.as_deref().unwrap_or(NEW_NEXT_CONFIG);
    let new = edit(base).map_err(|reason| FixError::unsupported(target, reason))?;
    ctx.write_if_changed(target, old.as_deref().unwrap_or_default(), &new)
        .await
}

pub struct StrictModeFix;

#[async_trait]
impl FixStrategy for StrictModeFix {
    fn rule(&self) -> &'static str {
        "typescript/strict-mode"
    }

    async fn apply(&self, _issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        let old = ctx.read_optional(TSCONFIG).await?.unwrap_or_default();
        let new = enable_strict(&old).map_err(|reason| FixError::unsupported(TSCONFIG, reason))?;
        ctx.write_if_changed(TSCONFIG, &old, &new).await
    }
}

pub struct ImageConfigFix;

#[async_trait]
impl FixStrategy for ImageConfigFix {
    fn rule(&self) -> &'static str {
        "next/image-optimization"
    }

    fn side_files(&self, _ctx: &FixContext) -> Vec<String> {
        NEXT_CONFIG_FILES.iter().map(|f| f.to_string()).collect()
    }

    async fn apply(&self, _issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        edit_next_config(ctx, add_image_formats).await
    }
}

pub struct CodeSplittingFix;

#[async_trait]
impl FixStrategy for CodeSplittingFix {
    fn rule(&self) -> &'static str {
        "next/code-splitting"
    }

    fn side_files(&self, _ctx: &FixContext) -> Vec<String> {
        NEXT_CONFIG_FILES.iter().map(|f| f.to_string()).collect()
    }

    async fn apply(&self, _issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        edit_next_config(ctx, add_split_chunks).await
    }
}
