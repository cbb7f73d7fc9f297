use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{Dimension, Rule, Severity};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read rule catalog {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse rule catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Dimension weights must sum to 1.0, got {0}")]
    Weights(f64),

    #[error("Thresholds for {scope} must satisfy excellent >= good >= needs_improvement")]
    Thresholds { scope: String },

    #[error("Rule {0} is declared more than once")]
    DuplicateRule(String),

    #[error("Rule {rule}: catalog says auto_fixable={declared}, fix strategy registered={registered}")]
    RegistryMismatch {
        rule: String,
        declared: bool,
        registered: bool,
    },
}

/// Score cutoffs for status labels. A score at or above a cutoff earns that label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub excellent: u8,
    pub good: u8,
    pub needs_improvement: u8,
}

impl Thresholds {
    pub const fn new(excellent: u8, good: u8, needs_improvement: u8) -> Self {
        Self {
            excellent,
            good,
            needs_improvement,
        }
    }

    fn is_ordered(&self) -> bool {
        self.excellent >= self.good && self.good >= self.needs_improvement
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(90, 75, 60)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub code_quality: f64,
    pub performance: f64,
    pub security: f64,
    pub accessibility: f64,
    pub dependency: f64,
}

impl DimensionWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::CodeQuality => self.code_quality,
            Dimension::Performance => self.performance,
            Dimension::Security => self.security,
            Dimension::Accessibility => self.accessibility,
            Dimension::Dependency => self.dependency,
        }
    }

    pub fn sum(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            code_quality: 0.25,
            performance: 0.20,
            security: 0.25,
            accessibility: 0.15,
            dependency: 0.15,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionThresholds {
    #[serde(default)]
    pub code_quality: Thresholds,
    #[serde(default)]
    pub performance: Thresholds,
    #[serde(default)]
    pub security: Thresholds,
    #[serde(default)]
    pub accessibility: Thresholds,
    #[serde(default)]
    pub dependency: Thresholds,
}

impl DimensionThresholds {
    pub fn get(&self, dimension: Dimension) -> &Thresholds {
        match dimension {
            Dimension::CodeQuality => &self.code_quality,
            Dimension::Performance => &self.performance,
            Dimension::Security => &self.security,
            Dimension::Accessibility => &self.accessibility,
            Dimension::Dependency => &self.dependency,
        }
    }
}

/// Static rule metadata the pipeline consults: weights, thresholds and rules.
///
/// TOML layout:
///
/// ```toml
/// [weights]
/// code_quality = 0.25
/// # ...
/// [thresholds.security]
/// excellent = 95
/// good = 85
/// needs_improvement = 70
///
/// [[rules]]
/// id = "typescript/no-any"
/// dimension = "code_quality"
/// severity = "medium"
/// auto_fixable = true
/// description = "Avoid the any type"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCatalog {
    #[serde(default)]
    pub weights: DimensionWeights,
    #[serde(default)]
    pub thresholds: DimensionThresholds,
    #[serde(default)]
    pub overall_thresholds: Thresholds,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleCatalog {
    /// Load and validate a catalog from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, CatalogError> {
        let catalog: RuleCatalog = toml::from_str(contents)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(CatalogError::Weights(sum));
        }

        for dimension in Dimension::ALL {
            if !self.thresholds.get(dimension).is_ordered() {
                return Err(CatalogError::Thresholds {
                    scope: dimension.to_string(),
                });
            }
        }
        if !self.overall_thresholds.is_ordered() {
            return Err(CatalogError::Thresholds {
                scope: "overall".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(CatalogError::DuplicateRule(rule.id.clone()));
            }
        }
        Ok(())
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn rules_for(&self, dimension: Dimension) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.dimension == dimension)
    }

    /// The catalog shipped with the tool. Matches the built-in checks and fix strategies.
    pub fn builtin() -> Self {
        use Dimension::*;
        use Severity::*;

        let rules = [
            (CodeQuality, "typescript/strict-mode", High, true, "tsconfig.json should enable strict type checking"),
            (CodeQuality, "typescript/no-any", Medium, true, "Avoid the `any` type; it disables type checking"),
            (CodeQuality, "complexity/high-complexity", Medium, false, "Files with many branches are hard to test and maintain"),
            (CodeQuality, "code-quality/no-console", Low, true, "Remove console.log calls from production code"),
            (Performance, "react/missing-memo", Low, true, "Default-exported components should be memoized to avoid re-renders"),
            (Performance, "next/image-optimization", Medium, true, "Configure Next.js image optimization"),
            (Performance, "next/code-splitting", Low, true, "Large apps should split bundles"),
            (Security, "security/hardcoded-secrets", Critical, true, "Secrets must not be committed in source code"),
            (Security, "security/dangerous-html", High, false, "dangerouslySetInnerHTML can introduce XSS"),
            (Security, "security/eval-usage", High, false, "eval and new Function execute arbitrary code"),
            (Accessibility, "a11y/img-alt", Medium, true, "Images need alternative text"),
            (Accessibility, "a11y/keyboard-handler", Medium, false, "Click handlers need keyboard equivalents"),
            (Dependency, "dependency/too-many-dependencies", Low, false, "Large dependency trees increase bundle size and attack surface"),
            (Dependency, "dependency/missing-lockfile", Medium, true, "A lockfile pins transitive dependency versions"),
            (Dependency, "dependency/vulnerable-packages", High, false, "Declared dependency versions with known advisories"),
        ];

        Self {
            weights: DimensionWeights::default(),
            thresholds: DimensionThresholds {
                security: Thresholds::new(95, 85, 70),
                ..DimensionThresholds::default()
            },
            overall_thresholds: Thresholds::default(),
            rules: rules
                .into_iter()
                .map(|(dimension, id, severity, auto_fixable, description)| Rule {
                    id: id.to_string(),
                    dimension,
                    severity,
                    auto_fixable,
                    description: description.to_string(),
                })
                .collect(),
        }
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = RuleCatalog::builtin();
        catalog.validate().unwrap();
        assert!((catalog.weights.sum() - 1.0).abs() < 1e-9);
        for dimension in Dimension::ALL {
            assert!(catalog.rules_for(dimension).count() > 0, "{} has no rules", dimension);
        }
    }

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        let mut catalog = RuleCatalog::builtin();
        catalog.weights.security = 0.5;
        assert!(matches!(catalog.validate(), Err(CatalogError::Weights(_))));
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let mut catalog = RuleCatalog::builtin();
        catalog.thresholds.performance = Thresholds::new(60, 75, 90);
        assert!(matches!(catalog.validate(), Err(CatalogError::Thresholds { .. })));
    }

    #[test]
    fn test_rejects_duplicate_rules() {
        let mut catalog = RuleCatalog::builtin();
        let dup = catalog.rules[0].clone();
        catalog.rules.push(dup);
        assert!(matches!(catalog.validate(), Err(CatalogError::DuplicateRule(_))));
    }

    #[test]
    fn test_parse_catalog_toml() {
        let toml_str = r#"
[weights]
code_quality = 0.2
performance = 0.2
security = 0.2
accessibility = 0.2
dependency = 0.2

[thresholds.security]
excellent = 95
good = 85
needs_improvement = 70

[[rules]]
id = "typescript/no-any"
dimension = "code_quality"
severity = "medium"
auto_fixable = true
description = "no any"
"#;
        let catalog = RuleCatalog::from_toml_str(toml_str).unwrap();
        assert_eq!(catalog.rules.len(), 1);
        assert_eq!(catalog.thresholds.security.excellent, 95);
        assert_eq!(catalog.thresholds.code_quality, Thresholds::default());
        let rule = catalog.rule("typescript/no-any").unwrap();
        assert_eq!(rule.severity, Severity::Medium);
        assert!(rule.auto_fixable);
    }

    #[test]
    fn test_parse_rejects_bad_weights() {
        let toml_str = r#"
[weights]
code_quality = 0.5
performance = 0.5
security = 0.5
accessibility = 0.0
dependency = 0.0
"#;
        assert!(RuleCatalog::from_toml_str(toml_str).is_err());
    }
}
