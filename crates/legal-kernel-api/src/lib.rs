//! Typed request/response operations over a loaded legal knowledge pack.
//!
//! [`LegalKernelApi`] loads configuration, the rule pack, classifier list, risk tables and
//! corpus once, validates all of it, and then serves stateless operations from a shared
//! [`Orchestrator`].

mod config;
mod corpus;
mod knowledge;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use legal_kernel_core::{
    CaseAnalytics, Classification, ClassificationInput, Defense, Fact, HybridScorer,
    InferenceResult, KernelError, LegalArea, OffenceClass, OffenceClassifier, Orchestrator,
    OrchestratorParts, ReasoningReport, RiskAssessor, RiskContext, RiskProfile, Rule, SearchQuery,
    SearchResults, VectorIndex, RULESET_VERSION,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

pub use config::{
    ClassificationConfig, InferenceConfig, KernelConfig, KnowledgePaths, LoadError, SearchConfig,
};
pub use corpus::{Corpus, BUILTIN_CORPUS};
pub use knowledge::{
    parse_classifier, parse_risk_tables, parse_rules, RiskTables, Source, BUILTIN_CLASSIFIER,
    BUILTIN_RISK_TABLES, BUILTIN_RULES,
};
pub use legal_kernel_core::{
    AnalysisRequest, AppealOutcomeCounts, CaseFilter, CaseMeta, CaseStatistics, OffenceFinding,
    SentencingPattern,
};

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KnowledgeSources {
    pub rules: String,
    pub classifier: String,
    pub risk_tables: String,
    pub corpus: String,
}

/// What was loaded, and a fingerprint that changes whenever any of it does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeSummary {
    pub fingerprint: String,
    pub ruleset_version: String,
    pub rules: usize,
    pub defenses: usize,
    pub classifier_rules: usize,
    pub sections: usize,
    pub cases: usize,
    pub dense_dimensions: usize,
    pub sparse_features: u32,
    pub relevance_threshold: f64,
    pub max_iterations: usize,
    pub sources: KnowledgeSources,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleListing {
    pub rules: Vec<Rule>,
    pub defenses: Vec<Defense>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InferRequest {
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InferResponse {
    pub result: InferenceResult,
    pub offences: Vec<OffenceFinding>,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifyRequest {
    pub facts: Vec<String>,
    pub text: String,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifyResponse {
    pub classification: Option<Classification>,
    /// Conclusions derived from the request facts, visible to fact-based classifier rules.
    pub derived_facts: BTreeSet<Fact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessRequest {
    pub offence_class: OffenceClass,
    #[serde(default)]
    pub context: RiskContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    pub query: SearchQuery,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseLookupResponse {
    pub filter: CaseFilter,
    pub cases: Vec<CaseMeta>,
}

/// Precedent statistics plus the per-keyword sentencing patterns behind them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseStatisticsResponse {
    pub statistics: CaseStatistics,
    pub sentencing_patterns: Vec<SentencingPattern>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzeRequest {
    pub facts: Vec<String>,
    pub text: String,
    pub amount: Option<f64>,
    pub location_type: Option<String>,
    pub query: Option<SearchQuery>,
    pub risk: RiskContext,
    pub top_k_sections: Option<usize>,
    pub top_k_cases: Option<usize>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub as_of: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisPackage {
    pub package_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub knowledge_fingerprint: String,
    pub report: ReasoningReport,
}

#[derive(Debug, Clone)]
pub struct LegalKernelApi {
    orchestrator: Arc<Orchestrator>,
    config: Arc<KernelConfig>,
    summary: Arc<KnowledgeSummary>,
}

impl LegalKernelApi {
    /// Load the built-in knowledge pack with default policy.
    ///
    /// # Errors
    /// Returns an error only if the compiled-in pack fails validation.
    pub fn builtin() -> Result<Self> {
        Self::load(KernelConfig::default())
    }

    /// Load from an optional YAML config file, optionally overriding its corpus path.
    ///
    /// # Errors
    /// Returns an error when the config, any knowledge file, or the corpus is invalid.
    pub fn from_config_path(config_path: Option<&Path>, corpus_path: Option<&Path>) -> Result<Self> {
        Self::load(resolve_config(config_path, corpus_path)?)
    }

    /// Build and validate every component. Nothing is served from a partially valid pack.
    ///
    /// # Errors
    /// Returns an error for invalid policy values, unreadable or malformed knowledge files,
    /// incomplete risk tables, corpus dimension problems, or unknown boost targets.
    pub fn load(config: KernelConfig) -> Result<Self> {
        config.validate().context("invalid kernel config")?;
        let paths = &config.knowledge;

        let rules_source =
            Source::resolve(paths.rules_path.as_deref(), "rules.yaml", BUILTIN_RULES)?;
        let classifier_source = Source::resolve(
            paths.classifier_path.as_deref(),
            "classifier.yaml",
            BUILTIN_CLASSIFIER,
        )?;
        let risk_source = Source::resolve(
            paths.risk_tables_path.as_deref(),
            "risk_tables.yaml",
            BUILTIN_RISK_TABLES,
        )?;
        let corpus_source =
            Source::resolve(config.corpus_path.as_deref(), "corpus.json", BUILTIN_CORPUS)?;

        let rules = parse_rules(&rules_source)
            .with_context(|| format!("invalid rule pack {}", rules_source.origin))?;
        let thresholds = config.amount_thresholds();
        let mut classifier = OffenceClassifier::new(
            parse_classifier(&classifier_source)
                .with_context(|| format!("invalid classifier {}", classifier_source.origin))?,
            thresholds,
        )
        .with_context(|| format!("invalid classifier {}", classifier_source.origin))?;
        if let Some(route) = config.fallback_route()? {
            classifier = classifier.with_fallback(route);
        }
        let tables = parse_risk_tables(&risk_source)
            .with_context(|| format!("invalid risk tables {}", risk_source.origin))?;
        let assessor = RiskAssessor::new(tables.profiles, tables.prosecution_deltas, thresholds)
            .with_context(|| format!("invalid risk tables {}", risk_source.origin))?;
        let corpus = Corpus::parse(&corpus_source.text, &corpus_source.origin)
            .with_context(|| format!("invalid corpus {}", corpus_source.origin))?;
        let precedents = CaseAnalytics::new(&corpus.cases, tables.precedent_keywords)
            .with_context(|| format!("invalid precedent keywords {}", risk_source.origin))?;

        let threshold = config.search.relevance_threshold;
        let section_scorer =
            HybridScorer::new(threshold)?.with_boosts(config.search.section_boosts.clone());
        let case_scorer =
            HybridScorer::new(threshold)?.with_boosts(config.search.case_boosts.clone());

        let fingerprint = knowledge_fingerprint(
            &config,
            &[&rules_source, &classifier_source, &risk_source, &corpus_source],
        )?;
        let classifier_rules = classifier.rules().len();
        let orchestrator = Orchestrator::new(OrchestratorParts {
            rules,
            sections: corpus.sections,
            cases: corpus.cases,
            section_scorer,
            case_scorer,
            classifier,
            assessor,
            precedents,
            settings: config.settings(),
        })
        .context("invalid search boosts")?;

        let summary = KnowledgeSummary {
            fingerprint,
            ruleset_version: RULESET_VERSION.to_string(),
            rules: orchestrator.rules().rules().len(),
            defenses: orchestrator.rules().defenses().len(),
            classifier_rules,
            sections: orchestrator.sections().len(),
            cases: orchestrator.cases().len(),
            dense_dimensions: orchestrator.sections().dense_dimensions(),
            sparse_features: orchestrator.sections().sparse_features(),
            relevance_threshold: threshold,
            max_iterations: config.inference.max_iterations,
            sources: KnowledgeSources {
                rules: rules_source.origin,
                classifier: classifier_source.origin,
                risk_tables: risk_source.origin,
                corpus: corpus_source.origin,
            },
        };
        tracing::info!(
            fingerprint = %summary.fingerprint,
            rules = summary.rules,
            sections = summary.sections,
            cases = summary.cases,
            "knowledge pack loaded"
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
            summary: Arc::new(summary),
        })
    }

    #[must_use]
    pub fn summary(&self) -> &KnowledgeSummary {
        &self.summary
    }

    #[must_use]
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Rules (optionally one area) and all defenses, in declaration order.
    #[must_use]
    pub fn list_rules(&self, area: Option<LegalArea>) -> RuleListing {
        let table = self.orchestrator.rules();
        RuleListing {
            rules: table
                .rules()
                .iter()
                .filter(|rule| area.is_none() || area == Some(rule.area))
                .cloned()
                .collect(),
            defenses: table.defenses().to_vec(),
        }
    }

    /// Forward-chain the request facts against the rule pack.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] for blank fact identifiers.
    pub fn infer(&self, request: &InferRequest) -> Result<InferResponse> {
        let facts = parse_facts(&request.facts)?;
        let result = self.orchestrator.infer(&facts);
        let table = self.orchestrator.rules();
        let offences = result
            .offences(table)
            .into_iter()
            .map(OffenceFinding::from)
            .collect();
        let explanation = result.explain(table);
        Ok(InferResponse { result, offences, explanation })
    }

    /// Classify a description, amount and facts (plus whatever those facts derive).
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] for blank facts or an invalid amount.
    pub fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse> {
        let facts = parse_facts(&request.facts)?;
        validate_amount(request.amount)?;
        let inference = self.orchestrator.infer(&facts);
        let known = inference.known_facts();
        let classification = self.orchestrator.classify(ClassificationInput {
            text: &request.text,
            amount: request.amount,
            facts: &known,
        });
        Ok(ClassifyResponse { classification, derived_facts: inference.conclusions })
    }

    /// # Errors
    /// Returns [`KernelError::Validation`] for an invalid amount in the context.
    pub fn assess(&self, request: &AssessRequest) -> Result<RiskProfile> {
        validate_amount(request.context.amount)?;
        Ok(self.orchestrator.assess(request.offence_class, &request.context))
    }

    /// # Errors
    /// Returns [`KernelError::Query`] when the query vectors do not fit the section index.
    pub fn search_sections(&self, request: &SearchRequest) -> Result<SearchResults> {
        validate_query(&request.query, self.orchestrator.sections())?;
        validate_top_k(request.top_k)?;
        Ok(self.orchestrator.search_sections(&request.query, request.top_k))
    }

    /// # Errors
    /// Returns [`KernelError::Query`] when the query vectors do not fit the case index.
    pub fn search_cases(&self, request: &SearchRequest) -> Result<SearchResults> {
        validate_query(&request.query, self.orchestrator.cases())?;
        validate_top_k(request.top_k)?;
        Ok(self.orchestrator.search_cases(&request.query, request.top_k))
    }

    /// Sections and cases ranked together under one `top_k`.
    ///
    /// # Errors
    /// Returns [`KernelError::Query`] when the query vectors do not fit the corpus.
    pub fn search_all(&self, request: &SearchRequest) -> Result<SearchResults> {
        validate_query(&request.query, self.orchestrator.sections())?;
        validate_query(&request.query, self.orchestrator.cases())?;
        validate_top_k(request.top_k)?;
        Ok(self.orchestrator.search_all(&request.query, request.top_k))
    }

    /// Precedent cases matching a structured filter, in case id order.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] when the filter value is blank.
    pub fn find_cases(&self, filter: &CaseFilter) -> Result<CaseLookupResponse> {
        let filter = normalize_filter(filter)?;
        let cases = self.orchestrator.find_cases(&filter).into_iter().cloned().collect();
        Ok(CaseLookupResponse { filter, cases })
    }

    #[must_use]
    pub fn case_statistics(&self) -> CaseStatisticsResponse {
        let precedents = self.orchestrator.precedents();
        CaseStatisticsResponse {
            statistics: precedents.statistics(),
            sentencing_patterns: precedents.patterns().cloned().collect(),
        }
    }

    /// Run every engine and wrap the report in an identified, timestamped package.
    ///
    /// The package id is derived from the knowledge fingerprint, `as_of` and the normalised
    /// request, so replaying a request with the same `as_of` reproduces the same id.
    ///
    /// # Errors
    /// Returns [`KernelError`] failures for invalid facts, amounts, query vectors or `top_k`.
    pub fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisPackage> {
        let facts = parse_facts(&request.facts)?;
        validate_amount(request.amount)?;
        validate_amount(request.risk.amount)?;
        validate_top_k(request.top_k_sections)?;
        validate_top_k(request.top_k_cases)?;
        if let Some(query) = &request.query {
            validate_query(query, self.orchestrator.sections())?;
            validate_query(query, self.orchestrator.cases())?;
        }

        let as_of = request.as_of.unwrap_or_else(OffsetDateTime::now_utc);
        let normalized = AnalysisRequest {
            facts,
            text: request.text,
            amount: request.amount,
            location_type: request.location_type,
            query: request.query,
            risk: request.risk,
            top_k_sections: request.top_k_sections,
            top_k_cases: request.top_k_cases,
        };
        let package_id = compute_package_id(&self.summary.fingerprint, as_of, &normalized)?;
        let report = self.orchestrator.analyze(&normalized);
        tracing::info!(%package_id, outcome = ?report.outcome, "analysis package built");

        Ok(AnalysisPackage {
            package_id,
            generated_at: as_of,
            knowledge_fingerprint: self.summary.fingerprint.clone(),
            report,
        })
    }
}

/// Effective config: the file at `config_path` (or defaults) with an optional corpus override.
///
/// # Errors
/// Returns an error when the config file cannot be read, parsed or validated.
pub fn resolve_config(
    config_path: Option<&Path>,
    corpus_path: Option<&Path>,
) -> Result<KernelConfig> {
    let mut config = match config_path {
        Some(path) => KernelConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => KernelConfig::default(),
    };
    if let Some(path) = corpus_path {
        config.corpus_path = Some(path.to_path_buf());
    }
    Ok(config)
}

fn parse_facts(raw: &[String]) -> Result<BTreeSet<Fact>, KernelError> {
    raw.iter().map(|value| Fact::parse(value)).collect()
}

fn normalize_filter(filter: &CaseFilter) -> Result<CaseFilter, KernelError> {
    let required = |name: &str, value: &str| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(KernelError::Validation(format!("{name} MUST be non-empty")));
        }
        Ok(trimmed.to_string())
    };
    Ok(match filter {
        CaseFilter::Ordinance { ordinance_id, section_id } => CaseFilter::Ordinance {
            ordinance_id: required("ordinance_id", ordinance_id)?,
            section_id: section_id
                .as_deref()
                .map(|section| required("section_id", section))
                .transpose()?,
        },
        CaseFilter::Outcome { outcome } => {
            CaseFilter::Outcome { outcome: required("outcome", outcome)? }
        }
        CaseFilter::Keyword { keyword } => {
            CaseFilter::Keyword { keyword: required("keyword", keyword)? }
        }
    })
}

fn validate_amount(amount: Option<f64>) -> Result<(), KernelError> {
    match amount {
        Some(value) if !value.is_finite() || value < 0.0 => Err(KernelError::Validation(
            "amount MUST be a finite, non-negative number".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_top_k(top_k: Option<usize>) -> Result<(), KernelError> {
    if top_k == Some(0) {
        return Err(KernelError::Validation("top_k MUST be >= 1".to_string()));
    }
    Ok(())
}

fn validate_query(query: &SearchQuery, index: &VectorIndex) -> Result<(), KernelError> {
    if query.dense.len() != index.dense_dimensions() {
        return Err(KernelError::Query(format!(
            "dense query has {} dimensions, index expects {}",
            query.dense.len(),
            index.dense_dimensions()
        )));
    }
    if query.dense.iter().any(|value| !value.is_finite()) {
        return Err(KernelError::Query("dense query values MUST be finite".to_string()));
    }
    query
        .sparse
        .check(index.sparse_features())
        .map_err(|reason| KernelError::Query(format!("sparse query: {reason}")))
}

fn knowledge_fingerprint(config: &KernelConfig, sources: &[&Source]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(RULESET_VERSION.as_bytes());
    hasher.update(serde_json::to_vec(config).context("failed to serialize config")?);
    for source in sources {
        hasher.update(source.text.as_bytes());
    }
    let digest_hex = hex::encode(hasher.finalize());
    Ok(format!("kb_{}", &digest_hex[..16]))
}

fn compute_package_id(
    fingerprint: &str,
    as_of: OffsetDateTime,
    request: &AnalysisRequest,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(as_of.unix_timestamp().to_string().as_bytes());
    hasher.update(serde_json::to_vec(request).context("failed to serialize request")?);
    let digest_hex = hex::encode(hasher.finalize());
    Ok(format!("pkg_{}", &digest_hex[..16]))
}
