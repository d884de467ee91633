use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ConfigurationError, KernelError};

/// An opaque fact identifier such as `appropriates_property`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct Fact(String);

impl Fact {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parse a caller-supplied identifier, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns [`KernelError::Validation`] when the identifier is empty after trimming.
    pub fn parse(value: &str) -> Result<Self, KernelError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(KernelError::Validation(
                "fact identifiers MUST be non-empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LegalArea {
    Criminal,
    Regulatory,
    Employment,
    Property,
    Civil,
    Commercial,
    Family,
    Tax,
}

impl LegalArea {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Criminal => "criminal",
            Self::Regulatory => "regulatory",
            Self::Employment => "employment",
            Self::Property => "property",
            Self::Civil => "civil",
            Self::Commercial => "commercial",
            Self::Family => "family",
            Self::Tax => "tax",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "criminal" => Some(Self::Criminal),
            "regulatory" => Some(Self::Regulatory),
            "employment" => Some(Self::Employment),
            "property" => Some(Self::Property),
            "civil" => Some(Self::Civil),
            "commercial" => Some(Self::Commercial),
            "family" => Some(Self::Family),
            "tax" => Some(Self::Tax),
            _ => None,
        }
    }

    /// Conclusions in these areas are offences a person can be prosecuted for.
    #[must_use]
    pub fn is_offence(self) -> bool {
        matches!(self, Self::Criminal | Self::Regulatory)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub area: LegalArea,
    pub conditions: BTreeSet<Fact>,
    pub conclusion: Fact,
    pub citation: String,
    #[serde(default)]
    pub penalty: Option<String>,
    #[serde(default)]
    pub explanation: String,
}

impl Rule {
    /// Check one rule against the table invariants.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::RuleDefinition`] when the id, conclusion or condition set
    /// is empty, or when any condition identifier is blank.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let reject = |reason: &str| ConfigurationError::RuleDefinition {
            rule_id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(reject("rule id MUST be non-empty"));
        }
        if self.conclusion.as_str().trim().is_empty() {
            return Err(reject("conclusion MUST be non-empty"));
        }
        if self.conditions.is_empty() {
            return Err(reject("condition set MUST be non-empty"));
        }
        if self.conditions.iter().any(|fact| fact.as_str().trim().is_empty()) {
            return Err(reject("condition identifiers MUST be non-empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_satisfied_by(&self, known: &BTreeSet<Fact>) -> bool {
        self.conditions.is_subset(known)
    }
}

/// A legal defense. Checked after inference reaches its fixpoint and never feeds back into it.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Defense {
    pub id: String,
    pub name: String,
    pub conditions: BTreeSet<Fact>,
    pub effect: String,
    #[serde(default)]
    pub burden_of_proof: String,
    #[serde(default)]
    pub legal_basis: String,
    #[serde(default)]
    pub explanation: String,
}

impl Defense {
    /// # Errors
    /// Returns [`ConfigurationError::DefenseDefinition`] when the id or condition set is empty.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let reject = |reason: &str| ConfigurationError::DefenseDefinition {
            defense_id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(reject("defense id MUST be non-empty"));
        }
        if self.conditions.is_empty() {
            return Err(reject("condition set MUST be non-empty"));
        }
        if self.conditions.iter().any(|fact| fact.as_str().trim().is_empty()) {
            return Err(reject("condition identifiers MUST be non-empty"));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_satisfied_by(&self, known: &BTreeSet<Fact>) -> bool {
        self.conditions.is_subset(known)
    }
}

/// Immutable, validated collection of rules and defenses in declaration order.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    defenses: Vec<Defense>,
    rule_positions: BTreeMap<String, usize>,
    defense_positions: BTreeMap<String, usize>,
}

impl RuleTable {
    /// Build the table once; it is read-only afterwards.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::RuleDefinition`] or
    /// [`ConfigurationError::DefenseDefinition`] for malformed or duplicate entries.
    pub fn new(rules: Vec<Rule>, defenses: Vec<Defense>) -> Result<Self, ConfigurationError> {
        let mut rule_positions = BTreeMap::new();
        for (position, rule) in rules.iter().enumerate() {
            rule.validate()?;
            if rule_positions.insert(rule.id.clone(), position).is_some() {
                return Err(ConfigurationError::RuleDefinition {
                    rule_id: rule.id.clone(),
                    reason: "rule ids MUST be unique".to_string(),
                });
            }
        }

        let mut defense_positions = BTreeMap::new();
        for (position, defense) in defenses.iter().enumerate() {
            defense.validate()?;
            if defense_positions.insert(defense.id.clone(), position).is_some() {
                return Err(ConfigurationError::DefenseDefinition {
                    defense_id: defense.id.clone(),
                    reason: "defense ids MUST be unique".to_string(),
                });
            }
        }

        Ok(Self { rules, defenses, rule_positions, defense_positions })
    }

    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn defenses(&self) -> &[Defense] {
        &self.defenses
    }

    #[must_use]
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rule_positions.get(id).map(|position| &self.rules[*position])
    }

    #[must_use]
    pub fn defense(&self, id: &str) -> Option<&Defense> {
        self.defense_positions.get(id).map(|position| &self.defenses[*position])
    }

    #[must_use]
    pub fn rules_in_area(&self, area: LegalArea) -> Vec<&Rule> {
        self.rules.iter().filter(|rule| rule.area == area).collect()
    }
}
