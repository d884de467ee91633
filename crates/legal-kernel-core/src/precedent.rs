//! Sentencing and appeal patterns derived from the precedent cases in a [`VectorIndex`].
//!
//! Patterns are computed once when the orchestrator is built. Each offence class maps to a
//! configured keyword list; a class whose keywords hit recorded custodial terms gets a
//! precedent-based sentence range, every other class falls back to its statutory table.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::OffenceClass;
use crate::index::{AppealOutcome, VectorIndex};
use crate::ConfigurationError;

pub const CONFIDENCE_PER_CASE: u32 = 20;
pub const MAX_PRECEDENT_CONFIDENCE: u32 = 80;

/// Custodial terms recorded for one case keyword.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentencingPattern {
    pub keyword: String,
    pub min_months: u32,
    pub avg_months: f64,
    pub max_months: u32,
    pub case_ids: Vec<String>,
}

/// Combined range over every matched keyword pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrecedentRange {
    pub keywords: Vec<String>,
    pub low_months: u32,
    /// Mean of the matched patterns' averages.
    pub typical_months: f64,
    pub high_months: u32,
    /// Distinct cases behind the range, in id order.
    pub case_ids: Vec<String>,
    /// Percent; grows with the number of cases and is capped at [`MAX_PRECEDENT_CONFIDENCE`].
    pub confidence: u32,
}

impl PrecedentRange {
    #[must_use]
    pub fn based_on_cases(&self) -> usize {
        self.case_ids.len()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct AppealOutcomeCounts {
    pub dismissed: usize,
    pub allowed: usize,
    pub reduced: usize,
    pub total: usize,
}

impl AppealOutcomeCounts {
    /// Fraction of recorded appeals that were allowed or reduced the sentence.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = (self.allowed + self.reduced) as f64 / self.total as f64;
        Some(rate)
    }

    fn record(&mut self, outcome: AppealOutcome) {
        match outcome {
            AppealOutcome::Dismissed => self.dismissed += 1,
            AppealOutcome::Allowed => self.allowed += 1,
            AppealOutcome::Reduced => self.reduced += 1,
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseStatistics {
    pub total_cases: usize,
    pub keywords: usize,
    pub sentencing_keywords: usize,
    pub appeals: AppealOutcomeCounts,
    pub appeal_success_rate: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct CaseAnalytics {
    total_cases: usize,
    keywords: BTreeSet<String>,
    patterns: BTreeMap<String, SentencingPattern>,
    appeals: AppealOutcomeCounts,
    class_keywords: BTreeMap<OffenceClass, Vec<String>>,
}

impl CaseAnalytics {
    /// Aggregate every case unit of `cases`. Section units are ignored.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidPolicy`] when a class keyword list contains an
    /// empty keyword.
    pub fn new(
        cases: &VectorIndex,
        class_keywords: BTreeMap<OffenceClass, Vec<String>>,
    ) -> Result<Self, ConfigurationError> {
        let mut normalized_classes = BTreeMap::new();
        for (class, keywords) in class_keywords {
            let mut normalized = Vec::with_capacity(keywords.len());
            for keyword in keywords {
                let keyword = normalize(&keyword);
                if keyword.is_empty() {
                    return Err(ConfigurationError::InvalidPolicy(format!(
                        "precedent keywords for {class} MUST be non-empty"
                    )));
                }
                if !normalized.contains(&keyword) {
                    normalized.push(keyword);
                }
            }
            normalized_classes.insert(class, normalized);
        }

        let mut analytics = Self { class_keywords: normalized_classes, ..Self::default() };
        let mut terms: BTreeMap<String, Vec<(String, u32)>> = BTreeMap::new();
        for case in cases.cases() {
            analytics.total_cases += 1;
            if let Some(outcome) = case.appeal_outcome {
                analytics.appeals.record(outcome);
            }
            let case_keywords: BTreeSet<String> =
                case.keywords.iter().map(|keyword| normalize(keyword)).collect();
            for keyword in case_keywords.into_iter().filter(|keyword| !keyword.is_empty()) {
                if let Some(months) = case.custodial_months.filter(|months| *months > 0) {
                    terms.entry(keyword.clone()).or_default().push((case.case_id.clone(), months));
                }
                analytics.keywords.insert(keyword);
            }
        }

        for (keyword, recorded) in terms {
            let months: Vec<u32> = recorded.iter().map(|(_, months)| *months).collect();
            let total: f64 = months.iter().copied().map(f64::from).sum();
            #[allow(clippy::cast_precision_loss)]
            let avg_months = total / months.len() as f64;
            analytics.patterns.insert(
                keyword.clone(),
                SentencingPattern {
                    keyword,
                    min_months: months.iter().copied().min().unwrap_or_default(),
                    avg_months,
                    max_months: months.iter().copied().max().unwrap_or_default(),
                    case_ids: recorded.into_iter().map(|(case_id, _)| case_id).collect(),
                },
            );
        }

        tracing::debug!(
            cases = analytics.total_cases,
            sentencing_keywords = analytics.patterns.len(),
            appeals = analytics.appeals.total,
            "case analytics ready"
        );
        Ok(analytics)
    }

    /// Sentencing patterns in keyword order.
    pub fn patterns(&self) -> impl Iterator<Item = &SentencingPattern> {
        self.patterns.values()
    }

    #[must_use]
    pub fn class_keywords(&self, class: OffenceClass) -> &[String] {
        self.class_keywords.get(&class).map(Vec::as_slice).unwrap_or_default()
    }

    /// Combine the patterns of every keyword that has custodial data; `None` when none does.
    #[must_use]
    pub fn sentence_range<S: AsRef<str>>(&self, keywords: &[S]) -> Option<PrecedentRange> {
        let wanted: BTreeSet<String> =
            keywords.iter().map(|keyword| normalize(keyword.as_ref())).collect();
        let matched: Vec<&SentencingPattern> =
            wanted.iter().filter_map(|keyword| self.patterns.get(keyword)).collect();
        if matched.is_empty() {
            return None;
        }

        let case_ids: BTreeSet<&String> =
            matched.iter().flat_map(|pattern| pattern.case_ids.iter()).collect();
        let averages: f64 = matched.iter().map(|pattern| pattern.avg_months).sum();
        #[allow(clippy::cast_precision_loss)]
        let typical_months = averages / matched.len() as f64;
        let confidence = u32::try_from(case_ids.len())
            .unwrap_or(u32::MAX)
            .saturating_mul(CONFIDENCE_PER_CASE)
            .min(MAX_PRECEDENT_CONFIDENCE);

        Some(PrecedentRange {
            keywords: matched.iter().map(|pattern| pattern.keyword.clone()).collect(),
            low_months: matched.iter().map(|pattern| pattern.min_months).min().unwrap_or_default(),
            typical_months,
            high_months: matched.iter().map(|pattern| pattern.max_months).max().unwrap_or_default(),
            case_ids: case_ids.into_iter().cloned().collect(),
            confidence,
        })
    }

    #[must_use]
    pub fn for_class(&self, class: OffenceClass) -> Option<PrecedentRange> {
        self.sentence_range(self.class_keywords(class))
    }

    #[must_use]
    pub fn statistics(&self) -> CaseStatistics {
        CaseStatistics {
            total_cases: self.total_cases,
            keywords: self.keywords.len(),
            sentencing_keywords: self.patterns.len(),
            appeals: self.appeals,
            appeal_success_rate: self.appeals.success_rate(),
        }
    }
}

fn normalize(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}
