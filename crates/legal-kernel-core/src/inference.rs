use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Write as _};

use serde::{Deserialize, Serialize};

use crate::rules::{Fact, Rule, RuleTable};
use crate::ConfigurationError;

pub const DEFAULT_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct InferenceOptions {
    pub max_iterations: usize,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self { max_iterations: DEFAULT_MAX_ITERATIONS }
    }
}

impl InferenceOptions {
    /// # Errors
    /// Returns [`ConfigurationError::InvalidPolicy`] when the pass bound is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_iterations == 0 {
            return Err(ConfigurationError::InvalidPolicy(
                "inference max_iterations MUST be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InferenceWarning {
    IterationBoundReached { bound: usize },
}

impl Display for InferenceWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IterationBoundReached { bound } => {
                write!(f, "inference stopped at the {bound}-pass bound before reaching a fixpoint")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReasoningStep {
    pub pass: usize,
    pub rule_id: String,
    pub facts_used: Vec<Fact>,
    pub conclusion: Fact,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct InferenceResult {
    pub input_facts: BTreeSet<Fact>,
    pub fired_rules: Vec<String>,
    /// Facts derived by inference, excluding the input facts.
    pub conclusions: BTreeSet<Fact>,
    pub applicable_defenses: Vec<String>,
    pub reasoning_chain: Vec<ReasoningStep>,
    pub passes: usize,
    pub reached_fixpoint: bool,
    #[serde(default)]
    pub warnings: Vec<InferenceWarning>,
}

/// Forward-chain `facts` against `table` until no unfired rule applies or the pass bound hits.
///
/// Within a pass every unfired rule is tried in declaration order and sees conclusions added
/// earlier in the same pass. Each rule fires at most once and nothing is retracted. Defenses
/// are evaluated once against the final fact set.
#[must_use]
pub fn infer(
    facts: &BTreeSet<Fact>,
    table: &RuleTable,
    options: &InferenceOptions,
) -> InferenceResult {
    let rules = table.rules();
    let mut known = facts.clone();
    let mut fired = vec![false; rules.len()];
    let mut fired_rules = Vec::new();
    let mut reasoning_chain = Vec::new();
    let mut passes = 0;
    let mut reached_fixpoint = false;

    while passes < options.max_iterations {
        passes += 1;
        let mut fired_this_pass = 0_usize;
        for (position, rule) in rules.iter().enumerate() {
            if fired[position] || !rule.is_satisfied_by(&known) {
                continue;
            }
            fired[position] = true;
            fired_this_pass += 1;
            known.insert(rule.conclusion.clone());
            fired_rules.push(rule.id.clone());
            reasoning_chain.push(ReasoningStep {
                pass: passes,
                rule_id: rule.id.clone(),
                facts_used: rule.conditions.iter().cloned().collect(),
                conclusion: rule.conclusion.clone(),
            });
        }
        tracing::debug!(pass = passes, fired = fired_this_pass, "inference pass complete");
        if fired_this_pass == 0 {
            reached_fixpoint = true;
            break;
        }
    }

    // The last bounded pass may have fired the final applicable rule.
    if !reached_fixpoint {
        reached_fixpoint = !rules
            .iter()
            .enumerate()
            .any(|(position, rule)| !fired[position] && rule.is_satisfied_by(&known));
    }

    let mut warnings = Vec::new();
    if !reached_fixpoint {
        tracing::warn!(
            bound = options.max_iterations,
            fired = fired_rules.len(),
            "inference pass bound reached without fixpoint; returning partial result"
        );
        warnings.push(InferenceWarning::IterationBoundReached { bound: options.max_iterations });
    }

    let applicable_defenses = table
        .defenses()
        .iter()
        .filter(|defense| defense.is_satisfied_by(&known))
        .map(|defense| defense.id.clone())
        .collect();

    let conclusions = known.difference(facts).cloned().collect();

    InferenceResult {
        input_facts: facts.clone(),
        fired_rules,
        conclusions,
        applicable_defenses,
        reasoning_chain,
        passes,
        reached_fixpoint,
        warnings,
    }
}

impl InferenceResult {
    /// Fired rules whose legal area makes their conclusion a prosecutable offence.
    #[must_use]
    pub fn offences<'a>(&self, table: &'a RuleTable) -> Vec<&'a Rule> {
        self.fired_rules
            .iter()
            .filter_map(|id| table.rule(id))
            .filter(|rule| rule.area.is_offence())
            .collect()
    }

    #[must_use]
    pub fn known_facts(&self) -> BTreeSet<Fact> {
        self.input_facts.union(&self.conclusions).cloned().collect()
    }

    /// Render a plain-text narrative of the reasoning for display.
    #[must_use]
    pub fn explain(&self, table: &RuleTable) -> String {
        let mut out = String::new();
        let inputs: Vec<&str> = self.input_facts.iter().map(Fact::as_str).collect();
        let _ = writeln!(out, "Input facts: {}", inputs.join(", "));

        if self.reasoning_chain.is_empty() {
            let _ = writeln!(out, "No rules were satisfied by the given facts.");
        } else {
            let _ = writeln!(out, "Reasoning:");
            for (index, step) in self.reasoning_chain.iter().enumerate() {
                let Some(rule) = table.rule(&step.rule_id) else {
                    continue;
                };
                let used: Vec<&str> = step.facts_used.iter().map(Fact::as_str).collect();
                let _ = writeln!(
                    out,
                    "  {}. {} ({}) [{}]: {} because {}",
                    index + 1,
                    rule.name,
                    rule.id,
                    rule.citation,
                    step.conclusion,
                    used.join(", ")
                );
                if !rule.explanation.is_empty() {
                    let _ = writeln!(out, "     {}", rule.explanation);
                }
            }
        }

        let offences = self.offences(table);
        if !offences.is_empty() {
            let _ = writeln!(out, "Offences established:");
            for rule in offences {
                let penalty = rule.penalty.as_deref().unwrap_or("penalty not specified");
                let _ = writeln!(out, "  - {} ({}); maximum: {}", rule.name, rule.citation, penalty);
            }
        }

        if !self.applicable_defenses.is_empty() {
            let _ = writeln!(out, "Potential defenses:");
            for defense in self.applicable_defenses.iter().filter_map(|id| table.defense(id)) {
                let _ = writeln!(
                    out,
                    "  - {}: {} (burden: {})",
                    defense.name, defense.effect, defense.burden_of_proof
                );
            }
        }

        for warning in &self.warnings {
            let _ = writeln!(out, "Warning: {warning}");
        }
        out
    }
}
