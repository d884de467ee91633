//! YAML configuration for the kernel: policy knobs, boosts, and knowledge-file overrides.

use std::path::{Path, PathBuf};

use legal_kernel_core::{
    AmountThresholds, Boost, ConfigurationError, InferenceOptions, OrchestratorSettings, Route,
    UnitId, DEFAULT_MAX_ITERATIONS, DEFAULT_RELEVANCE_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures while reading configuration, knowledge files or the corpus.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error in {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("JSON parse error in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub(crate) fn read_file(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path)
        .map_err(|source| LoadError::Io { path: path.to_path_buf(), source })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    pub inference: InferenceConfig,
    pub search: SearchConfig,
    pub classification: ClassificationConfig,
    pub knowledge: KnowledgePaths,
    /// JSON corpus of precomputed vectors; the built-in corpus is used when unset.
    pub corpus_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    pub max_iterations: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { max_iterations: DEFAULT_MAX_ITERATIONS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_top_k_sections")]
    pub top_k_sections: usize,
    #[serde(default = "default_top_k_cases")]
    pub top_k_cases: usize,
    #[serde(default = "default_section_boosts")]
    pub section_boosts: Vec<Boost>,
    #[serde(default)]
    pub case_boosts: Vec<Boost>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
            top_k_sections: default_top_k_sections(),
            top_k_cases: default_top_k_cases(),
            section_boosts: default_section_boosts(),
            case_boosts: Vec::new(),
        }
    }
}

fn default_relevance_threshold() -> f64 {
    DEFAULT_RELEVANCE_THRESHOLD
}

fn default_top_k_sections() -> usize {
    10
}

fn default_top_k_cases() -> usize {
    5
}

/// Theft vocabulary always surfaces the theft definition and its penalty section.
fn default_section_boosts() -> Vec<Boost> {
    ["theft", "steal", "stole", "stolen", "shoplifting"]
        .into_iter()
        .flat_map(|keyword| {
            [("210", "2"), ("210", "9")].into_iter().map(move |(ordinance, section)| Boost {
                keyword: keyword.to_string(),
                unit_id: UnitId::section(ordinance, section),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClassificationConfig {
    #[serde(default = "default_petty_below")]
    pub petty_below: f64,
    #[serde(default = "default_minor_below")]
    pub minor_below: f64,
    /// Route for input no classifier rule matches; unset leaves such input unclassified.
    #[serde(default)]
    pub fallback: Option<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            petty_below: default_petty_below(),
            minor_below: default_minor_below(),
            fallback: None,
        }
    }
}

fn default_petty_below() -> f64 {
    100.0
}

fn default_minor_below() -> f64 {
    5000.0
}

/// Optional overrides for the built-in knowledge files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct KnowledgePaths {
    pub rules_path: Option<PathBuf>,
    pub classifier_path: Option<PathBuf>,
    pub risk_tables_path: Option<PathBuf>,
}

impl KernelConfig {
    /// Parse a YAML config file. Relative paths inside it resolve against its directory.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the file cannot be read, parsed or validated.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let content = read_file(path)?;
        let mut config = Self::parse_with_origin(&content, &path.display().to_string())?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Parse a YAML config document.
    ///
    /// # Errors
    /// Returns [`LoadError`] when the document cannot be parsed or validated.
    pub fn parse(yaml: &str) -> Result<Self, LoadError> {
        Self::parse_with_origin(yaml, "inline config")
    }

    fn parse_with_origin(yaml: &str, origin: &str) -> Result<Self, LoadError> {
        // An empty document means "all defaults".
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)
                .map_err(|source| LoadError::Yaml { origin: origin.to_string(), source })?
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`LoadError::Validation`] for out-of-range policy values or unknown routes.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.inference.max_iterations == 0 {
            return Err(LoadError::Validation("inference.max_iterations MUST be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.search.relevance_threshold) {
            return Err(LoadError::Validation(
                "search.relevance_threshold MUST be in [0.0, 1.0]".into(),
            ));
        }
        if self.search.top_k_sections == 0 || self.search.top_k_cases == 0 {
            return Err(LoadError::Validation("search.top_k_* MUST be >= 1".into()));
        }
        for boost in self.search.section_boosts.iter().chain(&self.search.case_boosts) {
            if boost.keyword.trim().is_empty() || boost.unit_id.as_str().trim().is_empty() {
                return Err(LoadError::Validation(
                    "search boosts MUST have a non-empty keyword and unit_id".into(),
                ));
            }
        }
        self.amount_thresholds().validate()?;
        self.fallback_route()?;
        Ok(())
    }

    #[must_use]
    pub fn inference_options(&self) -> InferenceOptions {
        InferenceOptions { max_iterations: self.inference.max_iterations }
    }

    #[must_use]
    pub fn amount_thresholds(&self) -> AmountThresholds {
        AmountThresholds {
            petty_below: self.classification.petty_below,
            minor_below: self.classification.minor_below,
        }
    }

    #[must_use]
    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            inference: self.inference_options(),
            top_k_sections: self.search.top_k_sections,
            top_k_cases: self.search.top_k_cases,
        }
    }

    /// # Errors
    /// Returns [`LoadError::Validation`] when the configured fallback names no route.
    pub fn fallback_route(&self) -> Result<Option<Route>, LoadError> {
        self.classification
            .fallback
            .as_deref()
            .map(|name| {
                Route::parse(name.trim()).ok_or_else(|| {
                    LoadError::Validation(format!(
                        "classification.fallback {name:?} is not an offence class or theft_by_amount"
                    ))
                })
            })
            .transpose()
    }

    fn rebase(&mut self, base: &Path) {
        let rebase_one = |slot: &mut Option<PathBuf>| {
            if let Some(path) = slot.as_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        };
        rebase_one(&mut self.corpus_path);
        rebase_one(&mut self.knowledge.rules_path);
        rebase_one(&mut self.knowledge.classifier_path);
        rebase_one(&mut self.knowledge.risk_tables_path);
    }
}
