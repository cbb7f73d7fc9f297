use async_trait::async_trait;
use std::sync::Arc;

use super::{Check, CheckContext, CheckError, Finding};
use crate::types::Dimension;

pub const PACKAGE_JSON: &str = "package.json";
pub const LOCKFILES: &[&str] = &["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "bun.lockb"];

const SECTIONS: &[&str] = &["dependencies", "devDependencies"];

/// A known vulnerability affecting versions below `fixed_in`.
#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub package: String,
    pub fixed_in: String,
    pub summary: String,
}

/// Where vulnerability data comes from. Implementations must not block on
/// the network during a scan; feed them pre-fetched data instead.
pub trait AdvisorySource: Send + Sync {
    fn advisories_for(&self, package: &str, version: &str) -> Vec<Advisory>;
}

/// A fixed advisory table compared against declared versions.
#[derive(Debug, Clone, Default)]
pub struct StaticAdvisories {
    entries: Vec<Advisory>,
}

impl StaticAdvisories {
    pub fn new(entries: Vec<Advisory>) -> Self {
        Self { entries }
    }

    /// A handful of widely known advisories for common npm packages.
    pub fn builtin() -> Self {
        let table = [
            ("lodash", "4.17.21", "Prototype pollution and command injection"),
            ("minimist", "1.2.6", "Prototype pollution"),
            ("axios", "0.21.2", "Server-side request forgery and ReDoS"),
            ("node-fetch", "2.6.7", "Exposure of sensitive headers on redirect"),
            ("jsonwebtoken", "9.0.0", "Signature validation bypass"),
        ];
        Self::new(
            table
                .iter()
                .map(|(package, fixed_in, summary)| Advisory {
                    package: package.to_string(),
                    fixed_in: fixed_in.to_string(),
                    summary: summary.to_string(),
                })
                .collect(),
        )
    }
}

impl AdvisorySource for StaticAdvisories {
    fn advisories_for(&self, package: &str, version: &str) -> Vec<Advisory> {
        let Some(declared) = parse_version(version) else {
            return vec![];
        };
        self.entries
            .iter()
            .filter(|a| a.package == package)
            .filter(|a| parse_version(&a.fixed_in).is_some_and(|fixed| declared < fixed))
            .cloned()
            .collect()
    }
}

/// Lowest version admitted by an npm range such as `^4.17.1`, `~1.2`, `>=2.0.0`.
/// Tags, URLs, workspace and git specifiers are `None`.
pub fn parse_version(range: &str) -> Option<(u64, u64, u64)> {
    let trimmed = range
        .trim()
        .trim_start_matches(|c| matches!(c, '^' | '~' | '>' | '=' | 'v' | ' '));
    let core = trimmed.split(|c| c == '-' || c == '+' || c == ' ').next()?;
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    Some((major, minor, patch))
}

/// `(name, version, line)` for every declared dependency.
fn declared(pkg: &serde_json::Value, raw: &str) -> Vec<(String, String, Option<usize>)> {
    let mut deps = Vec::new();
    for section in SECTIONS {
        let Some(map) = pkg.get(section).and_then(|v| v.as_object()) else {
            continue;
        };
        for (name, version) in map {
            let needle = format!("\"{}\"", name);
            let line = raw
                .lines()
                .position(|l| l.trim_start().starts_with(&needle))
                .map(|i| i + 1);
            deps.push((
                name.clone(),
                version.as_str().unwrap_or_default().to_string(),
                line,
            ));
        }
    }
    deps
}

/// Declared dependency count against `max_dependencies`.
pub struct DependencyCountCheck;

#[async_trait]
impl Check for DependencyCountCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Dependency
    }

    fn rule(&self) -> &'static str {
        "dependency/too-many-dependencies"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let pkg = ctx.read_json(PACKAGE_JSON).await?;
        let count: usize = SECTIONS
            .iter()
            .filter_map(|s| pkg.get(s).and_then(|v| v.as_object()))
            .map(|m| m.len())
            .sum();
        let max = ctx.scan.max_dependencies;
        if count <= max {
            return Ok(vec![]);
        }
        Ok(vec![Finding::new(
            "Too many dependencies",
            format!("{} declared dependencies (threshold {})", count, max),
        )
        .at(PACKAGE_JSON, None)
        .impact("Larger bundles, slower installs, wider supply-chain exposure")
        .suggestion("Remove unused packages and prefer platform APIs")
        .solution("Audit with depcheck and uninstall unused dependencies")])
    }
}

/// package.json without any lockfile.
pub struct LockfileCheck;

#[async_trait]
impl Check for LockfileCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Dependency
    }

    fn rule(&self) -> &'static str {
        "dependency/missing-lockfile"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        ctx.read_json(PACKAGE_JSON).await?;
        for lockfile in LOCKFILES {
            if ctx.exists(lockfile).await {
                return Ok(vec![]);
            }
        }
        Ok(vec![Finding::new(
            "No lockfile",
            "package.json is present but no lockfile pins resolved versions",
        )
        .at(LOCKFILES[0], None)
        .impact("Installs are not reproducible; transitive versions drift")
        .suggestion("Commit a lockfile")
        .solution("npm install --package-lock-only")])
    }
}

/// Declared versions matched against an advisory source. One finding per advisory.
pub struct VulnerablePackagesCheck {
    advisories: Arc<dyn AdvisorySource>,
}

impl VulnerablePackagesCheck {
    pub fn new(advisories: Arc<dyn AdvisorySource>) -> Self {
        Self { advisories }
    }
}

#[async_trait]
impl Check for VulnerablePackagesCheck {
    fn dimension(&self) -> Dimension {
        Dimension::Dependency
    }

    fn rule(&self) -> &'static str {
        "dependency/vulnerable-packages"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Finding>, CheckError> {
        let raw = ctx.read(PACKAGE_JSON).await.map_err(|e| match e {
            CheckError::Fs(fs) if fs.is_not_found() => CheckError::config(PACKAGE_JSON, "not found"),
            other => other,
        })?;
        let pkg: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| CheckError::config(PACKAGE_JSON, e))?;

        let mut findings = Vec::new();
        for (name, version, line) in declared(&pkg, &raw) {
            for advisory in self.advisories.advisories_for(&name, &version) {
                findings.push(
                    Finding::new(
                        format!("Vulnerable dependency {}", name),
                        format!("{}@{}: {}", name, version, advisory.summary),
                    )
                    .at(PACKAGE_JSON, line)
                    .impact(advisory.summary.clone())
                    .suggestion(format!("Upgrade {} to {} or later", name, advisory.fixed_in))
                    .solution(format!("npm install {}@^{}", name, advisory.fixed_in)),
                );
            }
        }
        Ok(findings)
    }
}
