use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::rules::Fact;
use crate::ConfigurationError;

/// Closed set of offence categories that select prosecution and sentencing statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OffenceClass {
    Smoking,
    Littering,
    Spitting,
    Noise,
    AnimalCruelty,
    PettyTheft,
    MinorTheft,
    SeriousTheft,
    Burglary,
    Robbery,
    AssaultMinor,
    AssaultSerious,
    DrugPossession,
    DrugTrafficking,
    Fraud,
    Sexual,
    Murder,
    Manslaughter,
}

impl OffenceClass {
    pub const ALL: [Self; 18] = [
        Self::Smoking,
        Self::Littering,
        Self::Spitting,
        Self::Noise,
        Self::AnimalCruelty,
        Self::PettyTheft,
        Self::MinorTheft,
        Self::SeriousTheft,
        Self::Burglary,
        Self::Robbery,
        Self::AssaultMinor,
        Self::AssaultSerious,
        Self::DrugPossession,
        Self::DrugTrafficking,
        Self::Fraud,
        Self::Sexual,
        Self::Murder,
        Self::Manslaughter,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smoking => "smoking",
            Self::Littering => "littering",
            Self::Spitting => "spitting",
            Self::Noise => "noise",
            Self::AnimalCruelty => "animal_cruelty",
            Self::PettyTheft => "petty_theft",
            Self::MinorTheft => "minor_theft",
            Self::SeriousTheft => "serious_theft",
            Self::Burglary => "burglary",
            Self::Robbery => "robbery",
            Self::AssaultMinor => "assault_minor",
            Self::AssaultSerious => "assault_serious",
            Self::DrugPossession => "drug_possession",
            Self::DrugTrafficking => "drug_trafficking",
            Self::Fraud => "fraud",
            Self::Sexual => "sexual",
            Self::Murder => "murder",
            Self::Manslaughter => "manslaughter",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.as_str() == value)
    }
}

impl Display for OffenceClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a matching classification rule sends the input.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Route {
    Class(OffenceClass),
    TheftByAmount,
}

impl Route {
    /// Accepts `theft_by_amount` or any [`OffenceClass`] name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if value == "theft_by_amount" {
            return Some(Self::TheftByAmount);
        }
        OffenceClass::parse(value).map(Self::Class)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ValueBand {
    Low,
    Medium,
    High,
}

/// Monetary cut-offs (HK$) shared by theft grading and the value-based prosecution signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AmountThresholds {
    pub petty_below: f64,
    pub minor_below: f64,
}

impl Default for AmountThresholds {
    fn default() -> Self {
        Self { petty_below: 100.0, minor_below: 5000.0 }
    }
}

impl AmountThresholds {
    /// # Errors
    /// Returns [`ConfigurationError::InvalidPolicy`] unless `0 < petty_below < minor_below`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let finite = self.petty_below.is_finite() && self.minor_below.is_finite();
        if !finite || self.petty_below <= 0.0 || self.petty_below >= self.minor_below {
            return Err(ConfigurationError::InvalidPolicy(
                "amount thresholds MUST satisfy 0 < petty_below < minor_below".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn band(&self, amount: f64) -> ValueBand {
        if amount < self.petty_below {
            ValueBand::Low
        } else if amount < self.minor_below {
            ValueBand::Medium
        } else {
            ValueBand::High
        }
    }

    /// Grade theft by value. A missing amount grades as minor and is flagged ambiguous.
    #[must_use]
    pub fn theft_class(&self, amount: Option<f64>) -> (OffenceClass, bool) {
        match amount.map(|value| self.band(value)) {
            Some(ValueBand::Low) => (OffenceClass::PettyTheft, false),
            Some(ValueBand::Medium) => (OffenceClass::MinorTheft, false),
            Some(ValueBand::High) => (OffenceClass::SeriousTheft, false),
            None => (OffenceClass::MinorTheft, true),
        }
    }
}

/// One entry of the ordered classifier list.
///
/// Matches when any of `facts_any` is known, or when every keyword group has at least one
/// keyword occurring in the lower-cased text. Fact matches are tried across the whole list
/// before any keyword match is considered.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClassificationRule {
    pub name: String,
    pub facts_any: Vec<Fact>,
    pub keyword_groups: Vec<Vec<String>>,
    pub route: Route,
}

impl ClassificationRule {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let reject = |reason: &str| ConfigurationError::ClassificationRule {
            rule: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(reject("rule name MUST be non-empty"));
        }
        if self.facts_any.is_empty() && self.keyword_groups.is_empty() {
            return Err(reject("rule MUST declare facts_any or keyword_groups"));
        }
        if self.keyword_groups.iter().any(|group| {
            group.is_empty() || group.iter().any(|keyword| keyword.trim().is_empty())
        }) {
            return Err(reject("keyword groups MUST contain only non-empty keywords"));
        }
        Ok(())
    }

    fn matches_facts(&self, facts: &BTreeSet<Fact>) -> bool {
        self.facts_any.iter().any(|fact| facts.contains(fact))
    }

    fn matches_keywords(&self, text: &str) -> bool {
        !self.keyword_groups.is_empty()
            && self
                .keyword_groups
                .iter()
                .all(|group| group.iter().any(|keyword| text.contains(keyword.as_str())))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub text: &'a str,
    pub amount: Option<f64>,
    pub facts: &'a BTreeSet<Fact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Classification {
    pub class: OffenceClass,
    pub matched_rule: String,
    /// Set when a default was applied because the input lacked a deciding attribute.
    pub ambiguous: bool,
}

/// Ordered, first-match-wins offence classifier.
///
/// Two passes over the same order: the first rule whose `facts_any` intersects the known facts
/// wins; only when no rule matches on facts does the first keyword match decide.
#[derive(Debug, Clone)]
pub struct OffenceClassifier {
    rules: Vec<ClassificationRule>,
    thresholds: AmountThresholds,
    fallback: Option<Route>,
}

impl OffenceClassifier {
    /// # Errors
    /// Returns [`ConfigurationError::ClassificationRule`] for malformed entries or
    /// [`ConfigurationError::InvalidPolicy`] for invalid thresholds.
    pub fn new(
        rules: Vec<ClassificationRule>,
        thresholds: AmountThresholds,
    ) -> Result<Self, ConfigurationError> {
        thresholds.validate()?;
        let mut names = BTreeSet::new();
        let mut normalized = Vec::with_capacity(rules.len());
        for rule in rules {
            rule.validate()?;
            if !names.insert(rule.name.clone()) {
                return Err(ConfigurationError::ClassificationRule {
                    rule: rule.name,
                    reason: "rule names MUST be unique".to_string(),
                });
            }
            let keyword_groups = rule
                .keyword_groups
                .into_iter()
                .map(|group| group.into_iter().map(|keyword| keyword.to_lowercase()).collect())
                .collect();
            normalized.push(ClassificationRule { keyword_groups, ..rule });
        }
        Ok(Self { rules: normalized, thresholds, fallback: None })
    }

    /// Route applied when no rule matches; without one, such input stays unclassified.
    #[must_use]
    pub fn with_fallback(mut self, route: Route) -> Self {
        self.fallback = Some(route);
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    #[must_use]
    pub fn thresholds(&self) -> AmountThresholds {
        self.thresholds
    }

    #[must_use]
    pub fn classify(&self, input: ClassificationInput<'_>) -> Option<Classification> {
        let text = input.text.to_lowercase();
        let matched = self
            .rules
            .iter()
            .find(|rule| rule.matches_facts(input.facts))
            .or_else(|| self.rules.iter().find(|rule| rule.matches_keywords(&text)))
            .map(|rule| (rule.route, rule.name.clone(), false));
        let (route, matched_rule, defaulted) = match matched {
            Some(found) => found,
            None => (self.fallback?, "fallback".to_string(), true),
        };

        let (class, ambiguous) = match route {
            Route::Class(class) => (class, defaulted),
            Route::TheftByAmount => {
                let (class, missing_amount) = self.thresholds.theft_class(input.amount);
                (class, defaulted || missing_amount)
            }
        };
        tracing::debug!(class = class.as_str(), rule = %matched_rule, ambiguous, "offence classified");
        Some(Classification { class, matched_rule, ambiguous })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(groups: &[&[&str]]) -> Vec<Vec<String>> {
        groups.iter().map(|group| group.iter().map(|kw| (*kw).to_string()).collect()).collect()
    }

    fn rule(name: &str, facts: &[&str], groups: &[&[&str]], route: Route) -> ClassificationRule {
        ClassificationRule {
            name: name.to_string(),
            facts_any: facts.iter().map(|fact| Fact::new(*fact)).collect(),
            keyword_groups: keywords(groups),
            route,
        }
    }

    fn classifier() -> OffenceClassifier {
        let rules = vec![
            rule(
                "smoking",
                &["offence_public_smoking"],
                &[&["smok", "cigarette", "vap"]],
                Route::Class(OffenceClass::Smoking),
            ),
            rule(
                "animal_cruelty",
                &[],
                &[&["kill", "harm", "abuse"], &["cat", "dog", "animal"]],
                Route::Class(OffenceClass::AnimalCruelty),
            ),
            rule("murder", &[], &[&["murder"]], Route::Class(OffenceClass::Murder)),
            rule(
                "homicide",
                &[],
                &[&["kill"], &["person", "man", "someone"]],
                Route::Class(OffenceClass::Murder),
            ),
            rule("theft", &["offence_theft"], &[&["steal", "stole", "theft"]], Route::TheftByAmount),
        ];
        match OffenceClassifier::new(rules, AmountThresholds::default()) {
            Ok(classifier) => classifier,
            Err(err) => panic!("classifier should build: {err}"),
        }
    }

    fn classify(text: &str, amount: Option<f64>, facts: &[&str]) -> Option<Classification> {
        let facts: BTreeSet<Fact> = facts.iter().map(|fact| Fact::new(*fact)).collect();
        classifier().classify(ClassificationInput { text, amount, facts: &facts })
    }

    #[test]
    fn theft_is_graded_by_amount_thresholds() {
        let grade = |amount| classify("He stole a phone", Some(amount), &[]).map(|c| c.class);
        assert_eq!(grade(50.0), Some(OffenceClass::PettyTheft));
        assert_eq!(grade(99.99), Some(OffenceClass::PettyTheft));
        assert_eq!(grade(100.0), Some(OffenceClass::MinorTheft));
        assert_eq!(grade(4999.0), Some(OffenceClass::MinorTheft));
        assert_eq!(grade(5000.0), Some(OffenceClass::SeriousTheft));
    }

    #[test]
    fn missing_amount_grades_minor_and_flags_ambiguity() {
        let result = classify("theft of a bag", None, &[]);
        assert_eq!(
            result,
            Some(Classification {
                class: OffenceClass::MinorTheft,
                matched_rule: "theft".to_string(),
                ambiguous: true,
            })
        );
    }

    #[test]
    fn killing_an_animal_is_cruelty_not_homicide() {
        let result = classify("A man tried to kill a cat", None, &[]);
        assert_eq!(result.map(|c| c.class), Some(OffenceClass::AnimalCruelty));

        let homicide = classify("He tried to kill someone", None, &[]);
        assert_eq!(homicide.map(|c| c.class), Some(OffenceClass::Murder));
    }

    #[test]
    fn first_matching_keyword_rule_wins_without_facts() {
        let result = classify("He stole cigarettes", Some(20.0), &[]);
        assert_eq!(result.map(|c| c.matched_rule), Some("smoking".to_string()));
    }

    #[test]
    fn derived_offence_outranks_earlier_keyword_rule() {
        let result =
            classify("He stole a carton of cigarettes", Some(9_000.0), &["offence_theft"]);
        assert_eq!(
            result,
            Some(Classification {
                class: OffenceClass::SeriousTheft,
                matched_rule: "theft".to_string(),
                ambiguous: false,
            })
        );
    }

    #[test]
    fn fact_matches_keep_declaration_order() {
        let result = classify("", None, &["offence_theft", "offence_public_smoking"]);
        assert_eq!(result.map(|c| c.class), Some(OffenceClass::Smoking));
    }

    #[test]
    fn derived_facts_classify_without_keywords() {
        let result = classify("", Some(20.0), &["offence_theft"]);
        assert_eq!(result.map(|c| c.class), Some(OffenceClass::PettyTheft));
    }

    #[test]
    fn unmatched_input_is_unclassified_without_fallback() {
        assert!(classify("a question about tenancy deposits", None, &[]).is_none());

        let facts = BTreeSet::new();
        let with_fallback = classifier().with_fallback(Route::TheftByAmount).classify(
            ClassificationInput { text: "tenancy deposit", amount: Some(20_000.0), facts: &facts },
        );
        assert_eq!(
            with_fallback,
            Some(Classification {
                class: OffenceClass::SeriousTheft,
                matched_rule: "fallback".to_string(),
                ambiguous: true,
            })
        );
    }

    #[test]
    fn invalid_rules_and_thresholds_are_rejected() {
        let empty = rule("empty", &[], &[], Route::Class(OffenceClass::Noise));
        assert!(matches!(
            OffenceClassifier::new(vec![empty], AmountThresholds::default()),
            Err(ConfigurationError::ClassificationRule { .. })
        ));

        let inverted = AmountThresholds { petty_below: 5000.0, minor_below: 100.0 };
        assert!(OffenceClassifier::new(Vec::new(), inverted).is_err());
    }

    #[test]
    fn every_class_round_trips_through_its_name() {
        for class in OffenceClass::ALL {
            assert_eq!(OffenceClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(Route::parse("theft_by_amount"), Some(Route::TheftByAmount));
        assert_eq!(Route::parse("smoking"), Some(Route::Class(OffenceClass::Smoking)));
        assert_eq!(Route::parse("jaywalking"), None);
    }
}
