use async_trait::async_trait;
use tracing::{debug, warn};

use super::{FixContext, FixError, FixStrategy};
use crate::analysis::security::{env_var_name, looks_like_secret, secret_assignment};
use crate::types::Issue;

/// Replace every secret literal in `content` with `process.env.NAME`.
///
/// Returns the new content and the variable names introduced, in first-seen
/// order without duplicates. Comment lines are left alone.
pub fn relocate_secrets(content: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(content.len());
    let mut names: Vec<String> = Vec::new();

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*") {
            out.push_str(line);
            continue;
        }
        let mut last = 0;
        for caps in secret_assignment().captures_iter(line) {
            if !looks_like_secret(&caps["value"]) {
                continue;
            }
            let (Some(lit), Some(ident)) = (caps.name("lit"), caps.name("name")) else {
                continue;
            };
            let name = env_var_name(ident.as_str());
            out.push_str(&line[last..lit.start()]);
            out.push_str("process.env.");
            out.push_str(&name);
            last = lit.end();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        out.push_str(&line[last..]);
    }
    (out, names)
}

fn declared_names(existing: &str) -> Vec<&str> {
    existing
        .lines()
        .filter_map(|l| l.split_once('=').map(|(k, _)| k.trim()))
        .collect()
}

/// The subset of `names` the env file already declares.
pub fn already_declared(existing: &str, names: &[String]) -> Vec<String> {
    let declared = declared_names(existing);
    names
        .iter()
        .filter(|n| declared.contains(&n.as_str()))
        .cloned()
        .collect()
}

/// Append `NAME=your_name_here` for each name not already declared.
/// Existing lines are never modified.
pub fn append_env_entries(existing: &str, names: &[String]) -> String {
    let declared = declared_names(existing);
    let mut out = existing.to_string();
    for name in names {
        if declared.contains(&name.as_str()) {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{}=your_{}_here\n", name, name.to_lowercase()));
    }
    out
}

/// Moves hardcoded credentials to environment variables and documents them
/// in the example env file.
///
/// The variable name comes from the identifier alone, so two different
/// literals bound to `apiKey` in two files both become `process.env.API_KEY`.
/// A name the env file already declares is logged as a warning and left
/// as is; splitting such secrets is a manual step.
pub struct SecretToEnvFix;

#[async_trait]
impl FixStrategy for SecretToEnvFix {
    fn rule(&self) -> &'static str {
        "security/hardcoded-secrets"
    }

    fn side_files(&self, ctx: &FixContext) -> Vec<String> {
        vec![ctx.config.env_example_file.clone()]
    }

    async fn apply(&self, issue: &Issue, ctx: &FixContext) -> Result<Vec<String>, FixError> {
        let target = ctx.target(issue)?;
        let source = ctx.fs.read_to_string(&ctx.path(target)).await?;
        let (fixed, names) = relocate_secrets(&source);
        if names.is_empty() {
            debug!(file = target, "no secret literals left");
            return Ok(Vec::new());
        }

        // Declare the variables before the source stops carrying the values.
        let env_file = ctx.config.env_example_file.as_str();
        let env_old = ctx.read_optional(env_file).await?.unwrap_or_default();
        for name in already_declared(&env_old, &names) {
            warn!(
                file = target,
                variable = %name,
                env_file,
                "variable already declared; check that it holds the same secret"
            );
        }
        let env_new = append_env_entries(&env_old, &names);
        let mut written = ctx.write_if_changed(env_file, &env_old, &env_new).await?;
        written.extend(ctx.write_if_changed(target, &source, &fixed).await?);
        Ok(written)
    }
}
