use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::{AmountThresholds, OffenceClass, ValueBand};
use crate::precedent::PrecedentRange;
use crate::ConfigurationError;

pub const PRIOR_CONVICTION_MULTIPLIER: f64 = 1.3;
pub const FIXED_PENALTY_CONFIDENCE: u32 = 95;
pub const STATUTORY_CONFIDENCE: u32 = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Aggravator {
    Weapon,
    Violence,
    Planning,
    VulnerableVictim,
}

impl Aggravator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weapon => "weapon",
            Self::Violence => "violence",
            Self::Planning => "planning",
            Self::VulnerableVictim => "vulnerable_victim",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "weapon" => Some(Self::Weapon),
            "violence" => Some(Self::Violence),
            "planning" => Some(Self::Planning),
            "vulnerable_victim" => Some(Self::VulnerableVictim),
            _ => None,
        }
    }

    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Weapon => 1.5,
            Self::Violence | Self::VulnerableVictim => 1.3,
            Self::Planning => 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mitigator {
    GuiltyPlea,
    Remorse,
    FirstOffence,
    Restitution,
}

impl Mitigator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GuiltyPlea => "guilty_plea",
            Self::Remorse => "remorse",
            Self::FirstOffence => "first_offence",
            Self::Restitution => "restitution",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "guilty_plea" => Some(Self::GuiltyPlea),
            "remorse" => Some(Self::Remorse),
            "first_offence" => Some(Self::FirstOffence),
            "restitution" => Some(Self::Restitution),
            _ => None,
        }
    }

    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::GuiltyPlea => 0.67,
            Self::Remorse => 0.9,
            Self::FirstOffence | Self::Restitution => 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    Strong,
    Moderate,
    Weak,
    #[default]
    Unknown,
}

impl EvidenceStrength {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "strong" => Some(Self::Strong),
            "moderate" => Some(Self::Moderate),
            "weak" => Some(Self::Weak),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Case circumstances feeding the assessment. Every field is optional and neutral when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskContext {
    pub amount: Option<f64>,
    pub aggravators: BTreeSet<Aggravator>,
    pub mitigators: BTreeSet<Mitigator>,
    pub prior_conviction: bool,
    pub evidence_strength: EvidenceStrength,
    pub victim_complaint: Option<bool>,
}

/// Fine range in whole Hong Kong dollars.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct FineRange {
    pub low: u64,
    pub high: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PenaltyProfile {
    FineOnly {
        fine: FineRange,
    },
    /// `max_months: None` is a life maximum.
    Custodial {
        max_months: Option<u32>,
        typical_low_months: u32,
        typical_high_months: u32,
        #[serde(default)]
        fine: Option<FineRange>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OffenceProfile {
    pub prosecution_rate: f64,
    pub conviction_rate: f64,
    pub custodial_rate: f64,
    pub penalty: PenaltyProfile,
}

impl OffenceProfile {
    #[must_use]
    pub fn is_fine_only(&self) -> bool {
        matches!(self.penalty, PenaltyProfile::FineOnly { .. })
    }

    fn validate(&self, class: OffenceClass) -> Result<(), ConfigurationError> {
        let reject = |reason: String| ConfigurationError::InvalidRiskEntry { class, reason };

        for (name, rate) in [
            ("prosecution_rate", self.prosecution_rate),
            ("conviction_rate", self.conviction_rate),
            ("custodial_rate", self.custodial_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(reject(format!("{name} MUST be in [0.0, 1.0]")));
            }
        }

        match &self.penalty {
            PenaltyProfile::FineOnly { fine } => {
                if self.custodial_rate > 0.0 {
                    return Err(reject("fine-only classes MUST have custodial_rate 0".to_string()));
                }
                if fine.low > fine.high {
                    return Err(reject("fine low MUST NOT exceed fine high".to_string()));
                }
            }
            PenaltyProfile::Custodial {
                max_months,
                typical_low_months,
                typical_high_months,
                fine,
            } => {
                if typical_low_months > typical_high_months {
                    return Err(reject("typical low MUST NOT exceed typical high".to_string()));
                }
                if max_months.is_some_and(|max| *typical_high_months > max) {
                    return Err(reject(
                        "typical high MUST NOT exceed the statutory maximum".to_string(),
                    ));
                }
                if fine.is_some_and(|range| range.low > range.high) {
                    return Err(reject("fine low MUST NOT exceed fine high".to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Additive prosecution-likelihood adjustments, as fractions of 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProsecutionDeltas {
    pub strong_evidence: f64,
    pub weak_evidence: f64,
    pub prior_conviction: f64,
    pub first_offence: f64,
    pub victim_complaint: f64,
    pub no_victim_complaint: f64,
    pub high_value: f64,
    pub low_value: f64,
    pub restitution: f64,
}

impl Default for ProsecutionDeltas {
    fn default() -> Self {
        Self {
            strong_evidence: 0.15,
            weak_evidence: -0.15,
            prior_conviction: 0.10,
            first_offence: -0.10,
            victim_complaint: 0.15,
            no_victim_complaint: -0.20,
            high_value: 0.15,
            low_value: -0.15,
            restitution: -0.10,
        }
    }
}

impl ProsecutionDeltas {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let all = [
            self.strong_evidence,
            self.weak_evidence,
            self.prior_conviction,
            self.first_offence,
            self.victim_complaint,
            self.no_victim_complaint,
            self.high_value,
            self.low_value,
            self.restitution,
        ];
        if all.iter().any(|delta| !(-1.0..=1.0).contains(delta)) {
            return Err(ConfigurationError::InvalidPolicy(
                "prosecution deltas MUST be in [-1.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LikelihoodBand {
    VeryLikely,
    Likely,
    Possible,
    Unlikely,
    VeryUnlikely,
}

impl LikelihoodBand {
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability > 0.8 {
            Self::VeryLikely
        } else if probability > 0.6 {
            Self::Likely
        } else if probability > 0.4 {
            Self::Possible
        } else if probability > 0.2 {
            Self::Unlikely
        } else {
            Self::VeryUnlikely
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl RiskLevel {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            Self::VeryHigh
        } else if score > 0.6 {
            Self::High
        } else if score > 0.4 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Adjustment {
    pub reason: String,
    pub delta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProsecutionEstimate {
    pub base_rate: f64,
    pub adjustments: Vec<Adjustment>,
    pub likelihood: f64,
    pub band: LikelihoodBand,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppliedMultiplier {
    pub factor: String,
    pub multiplier: f64,
}

/// Where the unadjusted sentence range came from.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SentenceBasis {
    FixedPenalty,
    Statutory,
    Precedent { based_on_cases: usize, case_ids: Vec<String>, keywords: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentenceEstimate {
    pub fine_only: bool,
    pub low_months: u32,
    pub typical_months: u32,
    pub high_months: u32,
    /// `None` for fine-only classes and for life maxima.
    pub statutory_max_months: Option<u32>,
    pub life_maximum: bool,
    pub fine: Option<FineRange>,
    pub multipliers: Vec<AppliedMultiplier>,
    pub combined_multiplier: f64,
    pub basis: SentenceBasis,
    /// Percent.
    pub confidence: u32,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeEstimate {
    pub conviction_likelihood: f64,
    pub conviction_band: LikelihoodBand,
    pub custodial_likelihood: f64,
    pub custodial_band: LikelihoodBand,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverallRisk {
    pub score: f64,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskProfile {
    pub offence_class: OffenceClass,
    pub prosecution: ProsecutionEstimate,
    pub sentence: SentenceEstimate,
    pub outcomes: OutcomeEstimate,
    pub overall: OverallRisk,
}

/// Table-driven prosecution, sentencing and outcome estimates.
#[derive(Debug, Clone)]
pub struct RiskAssessor {
    // Indexed by `OffenceClass as usize`; complete by construction.
    profiles: Vec<OffenceProfile>,
    deltas: ProsecutionDeltas,
    thresholds: AmountThresholds,
}

impl RiskAssessor {
    /// # Errors
    /// Returns [`ConfigurationError::MissingOffenceEntry`] when any [`OffenceClass`] lacks a
    /// profile, [`ConfigurationError::InvalidRiskEntry`] for inconsistent entries, or
    /// [`ConfigurationError::InvalidPolicy`] for invalid deltas or thresholds.
    pub fn new(
        mut profiles: BTreeMap<OffenceClass, OffenceProfile>,
        deltas: ProsecutionDeltas,
        thresholds: AmountThresholds,
    ) -> Result<Self, ConfigurationError> {
        deltas.validate()?;
        thresholds.validate()?;

        let mut ordered = Vec::with_capacity(OffenceClass::ALL.len());
        for class in OffenceClass::ALL {
            let profile =
                profiles.remove(&class).ok_or(ConfigurationError::MissingOffenceEntry(class))?;
            profile.validate(class)?;
            ordered.push(profile);
        }

        Ok(Self { profiles: ordered, deltas, thresholds })
    }

    #[must_use]
    pub fn profile(&self, class: OffenceClass) -> &OffenceProfile {
        &self.profiles[class as usize]
    }

    #[must_use]
    pub fn deltas(&self) -> ProsecutionDeltas {
        self.deltas
    }

    /// Assess from the statutory tables alone.
    #[must_use]
    pub fn assess(&self, class: OffenceClass, context: &RiskContext) -> RiskProfile {
        self.assess_with_precedent(class, context, None)
    }

    /// Assess with an optional precedent range replacing the table's typical custodial range.
    /// Fine-only classes ignore precedent; precedent months are still capped by the statutory
    /// maximum.
    #[must_use]
    pub fn assess_with_precedent(
        &self,
        class: OffenceClass,
        context: &RiskContext,
        precedent: Option<&PrecedentRange>,
    ) -> RiskProfile {
        let profile = self.profile(class);
        let prosecution = self.prosecution(profile, context);
        let sentence = sentence(profile, context, precedent);

        let conviction_likelihood = profile.conviction_rate;
        let custodial_likelihood =
            if profile.is_fine_only() { 0.0 } else { profile.custodial_rate };
        let outcomes = OutcomeEstimate {
            conviction_likelihood,
            conviction_band: LikelihoodBand::from_probability(conviction_likelihood),
            custodial_likelihood,
            custodial_band: LikelihoodBand::from_probability(custodial_likelihood),
        };

        let score = 0.3 * prosecution.likelihood
            + 0.3 * conviction_likelihood
            + 0.4 * custodial_likelihood;
        tracing::debug!(class = class.as_str(), score, "risk assessed");

        RiskProfile {
            offence_class: class,
            prosecution,
            sentence,
            outcomes,
            overall: OverallRisk { score, level: RiskLevel::from_score(score) },
        }
    }

    fn prosecution(&self, profile: &OffenceProfile, context: &RiskContext) -> ProsecutionEstimate {
        let deltas = &self.deltas;
        let mut adjustments = Vec::new();
        let mut push = |reason: &str, delta: f64| {
            adjustments.push(Adjustment { reason: reason.to_string(), delta });
        };

        match context.evidence_strength {
            EvidenceStrength::Strong => push("strong evidence", deltas.strong_evidence),
            EvidenceStrength::Weak => push("weak evidence", deltas.weak_evidence),
            EvidenceStrength::Moderate | EvidenceStrength::Unknown => {}
        }
        if context.prior_conviction {
            push("prior conviction", deltas.prior_conviction);
        }
        if context.mitigators.contains(&Mitigator::FirstOffence) {
            push("first offence", deltas.first_offence);
        }
        match context.victim_complaint {
            Some(true) => push("victim complaint", deltas.victim_complaint),
            Some(false) => push("no victim complaint", deltas.no_victim_complaint),
            None => {}
        }
        match context.amount.map(|amount| self.thresholds.band(amount)) {
            Some(ValueBand::High) => push("high value", deltas.high_value),
            Some(ValueBand::Low) => push("low value", deltas.low_value),
            Some(ValueBand::Medium) | None => {}
        }
        if context.mitigators.contains(&Mitigator::Restitution) {
            push("restitution", deltas.restitution);
        }

        let likelihood = (profile.prosecution_rate
            + adjustments.iter().map(|adjustment| adjustment.delta).sum::<f64>())
        .clamp(0.0, 1.0);

        ProsecutionEstimate {
            base_rate: profile.prosecution_rate,
            adjustments,
            likelihood,
            band: LikelihoodBand::from_probability(likelihood),
        }
    }
}

fn sentence(
    profile: &OffenceProfile,
    context: &RiskContext,
    precedent: Option<&PrecedentRange>,
) -> SentenceEstimate {
    match &profile.penalty {
        PenaltyProfile::FineOnly { fine } => SentenceEstimate {
            fine_only: true,
            low_months: 0,
            typical_months: 0,
            high_months: 0,
            statutory_max_months: None,
            life_maximum: false,
            fine: Some(*fine),
            multipliers: Vec::new(),
            combined_multiplier: 1.0,
            basis: SentenceBasis::FixedPenalty,
            confidence: FIXED_PENALTY_CONFIDENCE,
            summary: format!(
                "Fine only: {} to {}; no custodial term",
                format_hkd(fine.low),
                format_hkd(fine.high)
            ),
        },
        PenaltyProfile::Custodial {
            max_months,
            typical_low_months,
            typical_high_months,
            fine,
        } => {
            let mut multipliers: Vec<AppliedMultiplier> = context
                .aggravators
                .iter()
                .map(|factor| AppliedMultiplier {
                    factor: factor.as_str().to_string(),
                    multiplier: factor.multiplier(),
                })
                .collect();
            if context.prior_conviction {
                multipliers.push(AppliedMultiplier {
                    factor: "prior_conviction".to_string(),
                    multiplier: PRIOR_CONVICTION_MULTIPLIER,
                });
            }
            multipliers.extend(context.mitigators.iter().map(|factor| AppliedMultiplier {
                factor: factor.as_str().to_string(),
                multiplier: factor.multiplier(),
            }));
            let combined: f64 = multipliers.iter().map(|applied| applied.multiplier).product();

            let (low, typical, high, basis, confidence) = match precedent {
                Some(range) => (
                    f64::from(range.low_months),
                    range.typical_months,
                    f64::from(range.high_months),
                    SentenceBasis::Precedent {
                        based_on_cases: range.based_on_cases(),
                        case_ids: range.case_ids.clone(),
                        keywords: range.keywords.clone(),
                    },
                    range.confidence,
                ),
                None => {
                    let low = f64::from(*typical_low_months);
                    let high = f64::from(*typical_high_months);
                    (low, (low + high) / 2.0, high, SentenceBasis::Statutory, STATUTORY_CONFIDENCE)
                }
            };
            let low_months = scale_months(low, combined, *max_months);
            let typical_months = scale_months(typical, combined, *max_months);
            let high_months = scale_months(high, combined, *max_months);

            let maximum = match max_months {
                Some(max) => format!("statutory maximum {}", format_months(*max)),
                None => "statutory maximum life imprisonment".to_string(),
            };
            let source = match &basis {
                SentenceBasis::Precedent { based_on_cases, .. } => {
                    format!("based on {based_on_cases} precedent case(s)")
                }
                SentenceBasis::Statutory | SentenceBasis::FixedPenalty => {
                    "based on statutory penalties".to_string()
                }
            };
            SentenceEstimate {
                fine_only: false,
                low_months,
                typical_months,
                high_months,
                statutory_max_months: *max_months,
                life_maximum: max_months.is_none(),
                fine: *fine,
                multipliers,
                combined_multiplier: combined,
                basis,
                confidence,
                summary: format!(
                    "{} to {} (typical {}); {maximum}; {source}",
                    format_months(low_months),
                    format_months(high_months),
                    format_months(typical_months)
                ),
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_months(months: f64, multiplier: f64, cap: Option<u32>) -> u32 {
    let ceiling = f64::from(cap.unwrap_or(u32::MAX));
    (months * multiplier).floor().clamp(0.0, ceiling) as u32
}

/// `0` is no custodial term; whole years are preferred once a term reaches twelve months.
#[must_use]
pub fn format_months(months: u32) -> String {
    let plural = |value: u32, unit: &str| {
        if value == 1 {
            format!("1 {unit}")
        } else {
            format!("{value} {unit}s")
        }
    };
    if months == 0 {
        return "no custodial term".to_string();
    }
    if months < 12 {
        return plural(months, "month");
    }
    let (years, rest) = (months / 12, months % 12);
    if rest == 0 {
        plural(years, "year")
    } else {
        format!("{} {}", plural(years, "year"), plural(rest, "month"))
    }
}

#[must_use]
pub fn format_hkd(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, ch) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("HK${grouped}")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn custodial(max: Option<u32>, low: u32, high: u32) -> PenaltyProfile {
        PenaltyProfile::Custodial {
            max_months: max,
            typical_low_months: low,
            typical_high_months: high,
            fine: None,
        }
    }

    fn tables() -> BTreeMap<OffenceClass, OffenceProfile> {
        OffenceClass::ALL
            .into_iter()
            .map(|class| {
                let profile = match class {
                    OffenceClass::Smoking => OffenceProfile {
                        prosecution_rate: 0.25,
                        conviction_rate: 0.9,
                        custodial_rate: 0.0,
                        penalty: PenaltyProfile::FineOnly {
                            fine: FineRange { low: 1_500, high: 5_000 },
                        },
                    },
                    OffenceClass::MinorTheft => OffenceProfile {
                        prosecution_rate: 0.7,
                        conviction_rate: 0.75,
                        custodial_rate: 0.3,
                        penalty: custodial(Some(24), 3, 12),
                    },
                    OffenceClass::Murder => OffenceProfile {
                        prosecution_rate: 0.99,
                        conviction_rate: 0.9,
                        custodial_rate: 1.0,
                        penalty: custodial(None, 240, 360),
                    },
                    _ => OffenceProfile {
                        prosecution_rate: 0.5,
                        conviction_rate: 0.5,
                        custodial_rate: 0.5,
                        penalty: custodial(Some(120), 12, 48),
                    },
                };
                (class, profile)
            })
            .collect()
    }

    fn assessor() -> RiskAssessor {
        match RiskAssessor::new(tables(), ProsecutionDeltas::default(), AmountThresholds::default())
        {
            Ok(assessor) => assessor,
            Err(err) => panic!("assessor should build: {err}"),
        }
    }

    #[test]
    fn missing_class_entry_is_a_configuration_error() {
        let mut profiles = tables();
        profiles.remove(&OffenceClass::Fraud);
        let result =
            RiskAssessor::new(profiles, ProsecutionDeltas::default(), AmountThresholds::default());
        assert_eq!(
            result.err(),
            Some(ConfigurationError::MissingOffenceEntry(OffenceClass::Fraud))
        );
    }

    #[test]
    fn fine_only_entry_with_custodial_rate_is_rejected() {
        let mut profiles = tables();
        if let Some(profile) = profiles.get_mut(&OffenceClass::Smoking) {
            profile.custodial_rate = 0.1;
        }
        let result =
            RiskAssessor::new(profiles, ProsecutionDeltas::default(), AmountThresholds::default());
        assert!(matches!(result, Err(ConfigurationError::InvalidRiskEntry { .. })));
    }

    #[test]
    fn smoking_is_fine_only_with_zero_custodial_likelihood() {
        let mut context = RiskContext::default();
        context.aggravators.insert(Aggravator::Weapon);
        context.prior_conviction = true;
        let profile = assessor().assess(OffenceClass::Smoking, &context);

        assert!(profile.sentence.fine_only);
        assert_eq!(profile.sentence.high_months, 0);
        assert_eq!(profile.sentence.fine, Some(FineRange { low: 1_500, high: 5_000 }));
        assert!(profile.outcomes.custodial_likelihood.abs() < f64::EPSILON);
        assert!(profile.sentence.summary.contains("HK$1,500"));
    }

    #[test]
    fn multipliers_scale_and_clamp_to_statutory_maximum() {
        let mut context = RiskContext::default();
        context.aggravators.insert(Aggravator::Weapon);
        context.aggravators.insert(Aggravator::Violence);
        context.prior_conviction = true;
        let profile = assessor().assess(OffenceClass::MinorTheft, &context);

        // 1.5 * 1.3 * 1.3 = 2.535; low 3 -> 7, typical 7.5 -> 19, high 12 -> 30 clamped to 24.
        assert!((profile.sentence.combined_multiplier - 2.535).abs() < 1e-9);
        assert_eq!(profile.sentence.low_months, 7);
        assert_eq!(profile.sentence.typical_months, 19);
        assert_eq!(profile.sentence.high_months, 24);
    }

    #[test]
    fn mitigators_reduce_the_range() {
        let mut context = RiskContext::default();
        context.mitigators.insert(Mitigator::GuiltyPlea);
        let profile = assessor().assess(OffenceClass::MinorTheft, &context);
        assert_eq!(profile.sentence.low_months, 2);
        assert_eq!(profile.sentence.high_months, 8);
    }

    #[test]
    fn life_maximum_has_no_upper_clamp() {
        let mut context = RiskContext::default();
        context.aggravators.insert(Aggravator::Weapon);
        let profile = assessor().assess(OffenceClass::Murder, &context);
        assert_eq!(profile.sentence.high_months, 540);
        assert!(profile.sentence.life_maximum);
    }

    fn precedent(low: u32, typical: f64, high: u32) -> PrecedentRange {
        PrecedentRange {
            keywords: vec!["robbery".to_string()],
            low_months: low,
            typical_months: typical,
            high_months: high,
            case_ids: vec!["robbery_001".to_string()],
            confidence: 20,
        }
    }

    #[test]
    fn statutory_range_is_the_default_basis() {
        let sentence =
            assessor().assess(OffenceClass::MinorTheft, &RiskContext::default()).sentence;
        assert_eq!(sentence.basis, SentenceBasis::Statutory);
        assert_eq!(sentence.confidence, STATUTORY_CONFIDENCE);
        assert_eq!((sentence.low_months, sentence.high_months), (3, 12));
        assert!(sentence.summary.ends_with("based on statutory penalties"));
    }

    #[test]
    fn precedent_range_replaces_table_and_keeps_statutory_cap() {
        let mut context = RiskContext::default();
        context.mitigators.insert(Mitigator::GuiltyPlea);
        let range = precedent(6, 15.0, 30);
        let sentence = assessor()
            .assess_with_precedent(OffenceClass::MinorTheft, &context, Some(&range))
            .sentence;

        // 6 * 0.67 = 4.02, 15 * 0.67 = 10.05, 30 * 0.67 = 20.1
        assert_eq!(sentence.low_months, 4);
        assert_eq!(sentence.typical_months, 10);
        assert_eq!(sentence.high_months, 20);
        assert_eq!(sentence.confidence, 20);
        assert_eq!(
            sentence.basis,
            SentenceBasis::Precedent {
                based_on_cases: 1,
                case_ids: vec!["robbery_001".to_string()],
                keywords: vec!["robbery".to_string()],
            }
        );
        assert!(sentence.summary.contains("based on 1 precedent case(s)"));

        let long = precedent(12, 40.0, 60);
        let capped = assessor()
            .assess_with_precedent(OffenceClass::MinorTheft, &RiskContext::default(), Some(&long))
            .sentence;
        assert_eq!(capped.high_months, 24);
    }

    #[test]
    fn fine_only_classes_ignore_precedent() {
        let range = precedent(6, 15.0, 30);
        let sentence = assessor()
            .assess_with_precedent(OffenceClass::Smoking, &RiskContext::default(), Some(&range))
            .sentence;
        assert!(sentence.fine_only);
        assert_eq!(sentence.high_months, 0);
        assert_eq!(sentence.basis, SentenceBasis::FixedPenalty);
        assert_eq!(sentence.confidence, FIXED_PENALTY_CONFIDENCE);
    }

    #[test]
    fn prosecution_deltas_accumulate_and_clamp() {
        let context = RiskContext {
            amount: Some(20_000.0),
            evidence_strength: EvidenceStrength::Strong,
            prior_conviction: true,
            victim_complaint: Some(true),
            ..RiskContext::default()
        };
        let profile = assessor().assess(OffenceClass::MinorTheft, &context);
        assert_eq!(profile.prosecution.adjustments.len(), 4);
        assert!((profile.prosecution.likelihood - 1.0).abs() < f64::EPSILON);
        assert_eq!(profile.prosecution.band, LikelihoodBand::VeryLikely);

        let lenient = RiskContext {
            amount: Some(20.0),
            evidence_strength: EvidenceStrength::Weak,
            victim_complaint: Some(false),
            mitigators: [Mitigator::FirstOffence, Mitigator::Restitution].into_iter().collect(),
            ..RiskContext::default()
        };
        let profile = assessor().assess(OffenceClass::Smoking, &lenient);
        assert!(profile.prosecution.likelihood.abs() < f64::EPSILON);
    }

    #[test]
    fn outcome_likelihoods_ignore_sentence_multipliers() {
        let plain = assessor().assess(OffenceClass::MinorTheft, &RiskContext::default());
        let mut context = RiskContext::default();
        context.aggravators.insert(Aggravator::Planning);
        context.mitigators.insert(Mitigator::Remorse);
        let adjusted = assessor().assess(OffenceClass::MinorTheft, &context);
        assert_eq!(plain.outcomes, adjusted.outcomes);
    }

    #[test]
    fn months_and_money_render_readably() {
        assert_eq!(format_months(0), "no custodial term");
        assert_eq!(format_months(1), "1 month");
        assert_eq!(format_months(12), "1 year");
        assert_eq!(format_months(30), "2 years 6 months");
        assert_eq!(format_hkd(500), "HK$500");
        assert_eq!(format_hkd(25_000), "HK$25,000");
        assert_eq!(format_hkd(1_200_000), "HK$1,200,000");
    }

    fn aggravator_strategy() -> impl Strategy<Value = BTreeSet<Aggravator>> {
        proptest::collection::btree_set(
            prop_oneof![
                Just(Aggravator::Weapon),
                Just(Aggravator::Violence),
                Just(Aggravator::Planning),
                Just(Aggravator::VulnerableVictim),
            ],
            0..4,
        )
    }

    fn mitigator_strategy() -> impl Strategy<Value = BTreeSet<Mitigator>> {
        proptest::collection::btree_set(
            prop_oneof![
                Just(Mitigator::GuiltyPlea),
                Just(Mitigator::Remorse),
                Just(Mitigator::FirstOffence),
                Just(Mitigator::Restitution),
            ],
            0..4,
        )
    }

    proptest! {
        #[test]
        fn property_fine_only_never_has_custodial_months(
            aggravators in aggravator_strategy(),
            mitigators in mitigator_strategy(),
            prior_conviction in any::<bool>(),
        ) {
            let context = RiskContext {
                aggravators,
                mitigators,
                prior_conviction,
                ..RiskContext::default()
            };
            let profile = assessor().assess(OffenceClass::Smoking, &context);
            prop_assert_eq!(profile.sentence.low_months, 0);
            prop_assert_eq!(profile.sentence.typical_months, 0);
            prop_assert_eq!(profile.sentence.high_months, 0);
        }

        #[test]
        fn property_custodial_months_stay_within_bounds(
            aggravators in aggravator_strategy(),
            mitigators in mitigator_strategy(),
            prior_conviction in any::<bool>(),
        ) {
            let context = RiskContext {
                aggravators,
                mitigators,
                prior_conviction,
                ..RiskContext::default()
            };
            let sentence = assessor().assess(OffenceClass::MinorTheft, &context).sentence;
            prop_assert!(sentence.low_months <= sentence.typical_months);
            prop_assert!(sentence.typical_months <= sentence.high_months);
            prop_assert!(sentence.high_months <= 24);
        }
    }
}
