use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::classify::{Classification, ClassificationInput, OffenceClass, OffenceClassifier};
use crate::index::{CaseFilter, CaseMeta, VectorIndex};
use crate::inference::{infer, InferenceOptions, InferenceResult};
use crate::precedent::{CaseAnalytics, CaseStatistics};
use crate::risk::{RiskAssessor, RiskContext, RiskProfile};
use crate::rules::{Fact, Rule, RuleTable};
use crate::search::{default_search_tie_breakers, HybridScorer, SearchQuery, SearchResults};
use crate::ConfigurationError;

pub const RULESET_VERSION: &str = "reasoning.v1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct OrchestratorSettings {
    pub inference: InferenceOptions,
    pub top_k_sections: usize,
    pub top_k_cases: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { inference: InferenceOptions::default(), top_k_sections: 10, top_k_cases: 5 }
    }
}

/// Everything the orchestrator owns, handed over once at startup.
#[derive(Debug, Clone)]
pub struct OrchestratorParts {
    pub rules: RuleTable,
    pub sections: VectorIndex,
    pub cases: VectorIndex,
    pub section_scorer: HybridScorer,
    pub case_scorer: HybridScorer,
    pub classifier: OffenceClassifier,
    pub assessor: RiskAssessor,
    /// Sentencing patterns over `cases`; [`CaseAnalytics::default`] disables precedent ranges.
    pub precedents: CaseAnalytics,
    pub settings: OrchestratorSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisRequest {
    pub facts: BTreeSet<Fact>,
    /// Free-text description used only for offence classification and boost keywords.
    pub text: String,
    pub amount: Option<f64>,
    /// Flat location attribute; `public` contributes the fact `in_public_place`.
    pub location_type: Option<String>,
    pub query: Option<SearchQuery>,
    pub risk: RiskContext,
    pub top_k_sections: Option<usize>,
    pub top_k_cases: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct OffenceFinding {
    pub rule_id: String,
    pub name: String,
    pub conclusion: Fact,
    pub citation: String,
    pub penalty: Option<String>,
}

impl From<&Rule> for OffenceFinding {
    fn from(rule: &Rule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            name: rule.name.clone(),
            conclusion: rule.conclusion.clone(),
            citation: rule.citation.clone(),
            penalty: rule.penalty.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DefenseFinding {
    pub defense_id: String,
    pub name: String,
    pub effect: String,
    pub burden_of_proof: String,
    pub legal_basis: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    OffenceEstablished,
    RelevantLawOnly,
    NothingRelevant,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DeterminismMetadata {
    pub ruleset_version: String,
    pub tie_breakers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningReport {
    pub outcome: ReportOutcome,
    pub inference: InferenceResult,
    pub offences: Vec<OffenceFinding>,
    pub defenses: Vec<DefenseFinding>,
    pub sections: Option<SearchResults>,
    pub cases: Option<SearchResults>,
    pub classification: Option<Classification>,
    pub risk: Option<RiskProfile>,
    pub explanation: String,
    pub warnings: Vec<String>,
    pub determinism: DeterminismMetadata,
    pub ordering_trace: Vec<String>,
}

#[must_use]
pub fn default_report_tie_breakers() -> Vec<String> {
    let mut tie_breakers = vec![
        "fired_rules: pass asc, declaration order asc".to_string(),
        "defenses: declaration order asc".to_string(),
        "classification: first rule matching on facts, else first matching on keywords"
            .to_string(),
    ];
    tie_breakers
        .extend(default_search_tie_breakers().into_iter().map(|rule| format!("search: {rule}")));
    tie_breakers
}

/// Composes inference, retrieval, classification and risk assessment over shared,
/// immutable knowledge. Safe to share behind an `Arc` across threads.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    parts: OrchestratorParts,
}

impl Orchestrator {
    /// # Errors
    /// Returns [`ConfigurationError`] when the settings are invalid or a configured boost
    /// targets a unit missing from its index.
    pub fn new(parts: OrchestratorParts) -> Result<Self, ConfigurationError> {
        parts.settings.inference.validate()?;
        parts.section_scorer.validate_against(&parts.sections)?;
        parts.case_scorer.validate_against(&parts.cases)?;
        tracing::info!(
            rules = parts.rules.rules().len(),
            defenses = parts.rules.defenses().len(),
            sections = parts.sections.len(),
            cases = parts.cases.len(),
            "orchestrator ready"
        );
        Ok(Self { parts })
    }

    #[must_use]
    pub fn rules(&self) -> &RuleTable {
        &self.parts.rules
    }

    #[must_use]
    pub fn sections(&self) -> &VectorIndex {
        &self.parts.sections
    }

    #[must_use]
    pub fn cases(&self) -> &VectorIndex {
        &self.parts.cases
    }

    #[must_use]
    pub fn classifier(&self) -> &OffenceClassifier {
        &self.parts.classifier
    }

    #[must_use]
    pub fn assessor(&self) -> &RiskAssessor {
        &self.parts.assessor
    }

    #[must_use]
    pub fn precedents(&self) -> &CaseAnalytics {
        &self.parts.precedents
    }

    #[must_use]
    pub fn settings(&self) -> OrchestratorSettings {
        self.parts.settings
    }

    #[must_use]
    pub fn infer(&self, facts: &BTreeSet<Fact>) -> InferenceResult {
        infer(facts, &self.parts.rules, &self.parts.settings.inference)
    }

    #[must_use]
    pub fn search_sections(&self, query: &SearchQuery, top_k: Option<usize>) -> SearchResults {
        let top_k = top_k.unwrap_or(self.parts.settings.top_k_sections);
        self.parts.section_scorer.search(query, &self.parts.sections, top_k)
    }

    #[must_use]
    pub fn search_cases(&self, query: &SearchQuery, top_k: Option<usize>) -> SearchResults {
        let top_k = top_k.unwrap_or(self.parts.settings.top_k_cases);
        self.parts.case_scorer.search(query, &self.parts.cases, top_k)
    }

    /// Sections and cases ranked together; `top_k` defaults to the section setting.
    #[must_use]
    pub fn search_all(&self, query: &SearchQuery, top_k: Option<usize>) -> SearchResults {
        let top_k = top_k.unwrap_or(self.parts.settings.top_k_sections);
        let sections = self.parts.section_scorer.search(query, &self.parts.sections, top_k);
        let cases = self.parts.case_scorer.search(query, &self.parts.cases, top_k);
        sections.merge(cases, top_k)
    }

    #[must_use]
    pub fn find_cases(&self, filter: &CaseFilter) -> Vec<&CaseMeta> {
        self.parts.cases.find_cases(filter)
    }

    #[must_use]
    pub fn case_statistics(&self) -> CaseStatistics {
        self.parts.precedents.statistics()
    }

    #[must_use]
    pub fn classify(&self, input: ClassificationInput<'_>) -> Option<Classification> {
        self.parts.classifier.classify(input)
    }

    /// Precedent cases for the class set the sentence range when any carry a custodial term.
    #[must_use]
    pub fn assess(&self, class: OffenceClass, context: &RiskContext) -> RiskProfile {
        let precedent = self.parts.precedents.for_class(class);
        self.parts.assessor.assess_with_precedent(class, context, precedent.as_ref())
    }

    /// Run every engine over one request and merge the results into a single report.
    #[must_use]
    pub fn analyze(&self, request: &AnalysisRequest) -> ReasoningReport {
        let mut facts = request.facts.clone();
        if let Some(location) = request.location_type.as_deref().map(str::trim) {
            if !location.is_empty() {
                facts.insert(Fact::new(format!("in_{}_place", location.to_ascii_lowercase())));
            }
        }

        let inference = self.infer(&facts);
        let rules = &self.parts.rules;
        let offences: Vec<OffenceFinding> = inference
            .offences(rules)
            .into_iter()
            .map(OffenceFinding::from)
            .collect();
        let defenses = inference
            .applicable_defenses
            .iter()
            .filter_map(|id| rules.defense(id))
            .map(|defense| DefenseFinding {
                defense_id: defense.id.clone(),
                name: defense.name.clone(),
                effect: defense.effect.clone(),
                burden_of_proof: defense.burden_of_proof.clone(),
                legal_basis: defense.legal_basis.clone(),
            })
            .collect();

        let (sections, cases) = match &request.query {
            Some(query) => (
                Some(self.search_sections(query, request.top_k_sections)),
                Some(self.search_cases(query, request.top_k_cases)),
            ),
            None => (None, None),
        };

        let known = inference.known_facts();
        let classification = self.classify(ClassificationInput {
            text: &request.text,
            amount: request.amount,
            facts: &known,
        });
        let risk = classification.as_ref().map(|found| {
            let mut context = request.risk.clone();
            if context.amount.is_none() {
                context.amount = request.amount;
            }
            self.assess(found.class, &context)
        });

        let outcome = if !offences.is_empty() {
            ReportOutcome::OffenceEstablished
        } else if sections.as_ref().is_some_and(|results| !results.is_empty()) {
            ReportOutcome::RelevantLawOnly
        } else {
            ReportOutcome::NothingRelevant
        };

        let mut warnings: Vec<String> =
            inference.warnings.iter().map(ToString::to_string).collect();
        if classification.as_ref().is_some_and(|found| found.ambiguous) {
            warnings
                .push("offence classification applied a default for missing context".to_string());
        }

        let explanation = inference.explain(rules);
        tracing::debug!(?outcome, offences = offences.len(), "analysis complete");

        ReasoningReport {
            outcome,
            inference,
            offences,
            defenses,
            sections,
            cases,
            classification,
            risk,
            explanation,
            warnings,
            determinism: DeterminismMetadata {
                ruleset_version: RULESET_VERSION.to_string(),
                tie_breakers: default_report_tie_breakers(),
            },
            ordering_trace: vec![
                "infer: forward chaining to fixpoint over declared rules".to_string(),
                "defenses: evaluated after fixpoint".to_string(),
                "search: hybrid score filter, boosts, sort, truncate top_k".to_string(),
                "classify: ordered rules, fact matches before keyword matches".to_string(),
                "assess: precedent or table range with additive deltas and multipliers"
                    .to_string(),
            ],
        }
    }
}
