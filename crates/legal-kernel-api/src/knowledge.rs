//! Knowledge-pack loading: rule table, classifier list and risk tables.
//!
//! Each file is YAML. The built-in pack is compiled in; any file can be replaced through
//! [`crate::config::KnowledgePaths`].

use std::collections::BTreeMap;
use std::path::Path;

use legal_kernel_core::{
    ClassificationRule, ConfigurationError, Defense, Fact, OffenceClass, OffenceProfile,
    ProsecutionDeltas, Route, Rule, RuleTable,
};
use serde::Deserialize;

use crate::config::{read_file, LoadError};

pub const BUILTIN_RULES: &str = include_str!("../knowledge/rules.yaml");
pub const BUILTIN_CLASSIFIER: &str = include_str!("../knowledge/classifier.yaml");
pub const BUILTIN_RISK_TABLES: &str = include_str!("../knowledge/risk_tables.yaml");

/// Raw text of one knowledge file plus where it came from.
#[derive(Debug, Clone)]
pub struct Source {
    pub origin: String,
    pub text: String,
}

impl Source {
    #[must_use]
    pub fn builtin(name: &str, text: &'static str) -> Self {
        Self { origin: format!("builtin:{name}"), text: text.to_string() }
    }

    /// Read `path` when given, otherwise fall back to the built-in text.
    ///
    /// # Errors
    /// Returns [`LoadError::Io`] when the override file cannot be read.
    pub fn resolve(
        path: Option<&Path>,
        name: &str,
        builtin: &'static str,
    ) -> Result<Self, LoadError> {
        match path {
            Some(path) => {
                Ok(Self { origin: path.display().to_string(), text: read_file(path)? })
            }
            None => Ok(Self::builtin(name, builtin)),
        }
    }
}

fn from_yaml<T: for<'de> Deserialize<'de>>(source: &Source) -> Result<T, LoadError> {
    serde_yaml::from_str(&source.text)
        .map_err(|err| LoadError::Yaml { origin: source.origin.clone(), source: err })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    rules: Vec<Rule>,
    #[serde(default)]
    defenses: Vec<Defense>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassifierFile {
    rules: Vec<ClassifierEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassifierEntry {
    name: String,
    #[serde(default)]
    facts_any: Vec<Fact>,
    #[serde(default)]
    keyword_groups: Vec<Vec<String>>,
    route: String,
}

/// Risk tables as stored on disk: per-class profiles, the prosecution deltas, and the case
/// keywords whose precedents set a class's sentence range.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskTables {
    #[serde(default)]
    pub prosecution_deltas: ProsecutionDeltas,
    pub profiles: BTreeMap<OffenceClass, OffenceProfile>,
    #[serde(default)]
    pub precedent_keywords: BTreeMap<OffenceClass, Vec<String>>,
}

/// # Errors
/// Returns [`LoadError::Yaml`] for malformed YAML or [`LoadError::Configuration`] when the
/// rule table rejects a definition.
pub fn parse_rules(source: &Source) -> Result<RuleTable, LoadError> {
    let file: RuleFile = from_yaml(source)?;
    if file.rules.is_empty() {
        return Err(LoadError::Validation(format!(
            "{} MUST define at least one rule",
            source.origin
        )));
    }
    Ok(RuleTable::new(file.rules, file.defenses)?)
}

/// # Errors
/// Returns [`LoadError::Yaml`] for malformed YAML or [`LoadError::Configuration`] when an
/// entry names an unknown route.
pub fn parse_classifier(source: &Source) -> Result<Vec<ClassificationRule>, LoadError> {
    let file: ClassifierFile = from_yaml(source)?;
    file.rules
        .into_iter()
        .map(|entry| {
            let route = Route::parse(entry.route.trim()).ok_or_else(|| {
                ConfigurationError::ClassificationRule {
                    rule: entry.name.clone(),
                    reason: format!("unknown route {:?}", entry.route),
                }
            })?;
            Ok(ClassificationRule {
                name: entry.name,
                facts_any: entry.facts_any,
                keyword_groups: entry.keyword_groups,
                route,
            })
        })
        .collect()
}

/// Completeness and value ranges are checked later by `RiskAssessor::new`.
///
/// # Errors
/// Returns [`LoadError::Yaml`] for malformed YAML, including unknown offence classes.
pub fn parse_risk_tables(source: &Source) -> Result<RiskTables, LoadError> {
    from_yaml(source)
}
