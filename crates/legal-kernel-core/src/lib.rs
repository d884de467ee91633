//! Deterministic legal reasoning and retrieval kernel.
//!
//! The kernel owns pure, synchronous engines over immutable inputs: forward-chaining
//! inference against a [`RuleTable`], hybrid retrieval against a [`VectorIndex`], offence
//! classification, precedent analytics over indexed cases, and risk assessment.
//! [`Orchestrator`] composes them into a [`ReasoningReport`].

mod classify;
mod index;
mod inference;
mod precedent;
mod report;
mod risk;
mod rules;
mod search;

pub use classify::{
    AmountThresholds, Classification, ClassificationInput, ClassificationRule, OffenceClass,
    OffenceClassifier, Route, ValueBand,
};
pub use index::{
    cosine_dense, cosine_sparse, AppealOutcome, CaseFilter, CaseMeta, Charge, IndexedUnit,
    SectionMeta, SparseVector, UnitContent, UnitId, UnitKind, VectorIndex,
};
pub use inference::{
    infer, InferenceOptions, InferenceResult, InferenceWarning, ReasoningStep,
    DEFAULT_MAX_ITERATIONS,
};
pub use precedent::{
    AppealOutcomeCounts, CaseAnalytics, CaseStatistics, PrecedentRange, SentencingPattern,
    CONFIDENCE_PER_CASE, MAX_PRECEDENT_CONFIDENCE,
};
pub use report::{
    default_report_tie_breakers, AnalysisRequest, DefenseFinding, DeterminismMetadata,
    OffenceFinding, Orchestrator, OrchestratorParts, OrchestratorSettings, ReasoningReport,
    ReportOutcome, RULESET_VERSION,
};
pub use risk::{
    format_hkd, format_months, Adjustment, Aggravator, AppliedMultiplier, EvidenceStrength,
    FineRange, LikelihoodBand, Mitigator, OffenceProfile, OutcomeEstimate, OverallRisk,
    PenaltyProfile, ProsecutionDeltas, ProsecutionEstimate, RiskAssessor, RiskContext, RiskLevel,
    RiskProfile, SentenceBasis, SentenceEstimate, FIXED_PENALTY_CONFIDENCE,
    PRIOR_CONVICTION_MULTIPLIER, STATUTORY_CONFIDENCE,
};
pub use rules::{Defense, Fact, LegalArea, Rule, RuleTable};
pub use search::{
    default_search_tie_breakers, query_terms, Boost, HybridScorer, Provenance, SearchHit,
    SearchQuery, SearchResults, DEFAULT_RELEVANCE_THRESHOLD, LEXICAL_WEIGHT, SEMANTIC_WEIGHT,
};

/// Fatal problems detected while building the immutable knowledge inputs.
///
/// Every variant is raised at construction time; once a [`RuleTable`], [`VectorIndex`],
/// [`RiskAssessor`] or [`Orchestrator`] exists, queries against it cannot fail with one.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ConfigurationError {
    #[error("rule definition error in {rule_id}: {reason}")]
    RuleDefinition { rule_id: String, reason: String },
    #[error("defense definition error in {defense_id}: {reason}")]
    DefenseDefinition { defense_id: String, reason: String },
    #[error("classification rule error in {rule}: {reason}")]
    ClassificationRule { rule: String, reason: String },
    #[error("risk tables MUST contain an entry for offence class {0}")]
    MissingOffenceEntry(OffenceClass),
    #[error("risk table entry for {class} is invalid: {reason}")]
    InvalidRiskEntry { class: OffenceClass, reason: String },
    #[error("dense dimension mismatch for {unit_id}: expected {expected}, got {actual}")]
    DimensionMismatch { unit_id: String, expected: usize, actual: usize },
    #[error("invalid dense vector for {unit_id}: {reason}")]
    InvalidDenseVector { unit_id: String, reason: String },
    #[error("invalid sparse vector for {unit_id}: {reason}")]
    InvalidSparseVector { unit_id: String, reason: String },
    #[error("duplicate indexed unit {0}")]
    DuplicateUnit(String),
    #[error("boost keyword {keyword} targets unknown unit {unit_id}")]
    UnknownBoostTarget { keyword: String, unit_id: String },
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

/// Request-level failures raised at the boundary, before any engine runs.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum KernelError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("query error: {0}")]
    Query(String),
}
