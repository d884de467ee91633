//! Hybrid semantic + lexical ranking over a [`VectorIndex`].
//!
//! The same scorer ranks statutory sections and precedent cases; only the bound index and the
//! configured boosts differ.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::index::{
    cosine_dense, cosine_sparse, IndexedUnit, SparseVector, UnitId, UnitKind, VectorIndex,
};
use crate::ConfigurationError;

pub const SEMANTIC_WEIGHT: f64 = 0.7;
pub const LEXICAL_WEIGHT: f64 = 0.3;
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    #[serde(default)]
    pub text: String,
    pub dense: Vec<f32>,
    #[serde(default)]
    pub sparse: SparseVector,
}

/// A configured must-include rule: when `keyword` is a query term, `unit_id` is always returned.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Boost {
    pub keyword: String,
    pub unit_id: UnitId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Scored,
    Boosted { keyword: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub rank: usize,
    pub unit_id: UnitId,
    pub kind: UnitKind,
    pub citation: String,
    pub score: f64,
    pub semantic: f64,
    pub lexical: f64,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub threshold: f64,
    pub top_k: usize,
    pub considered: usize,
    pub tie_breakers: Vec<String>,
}

impl SearchResults {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Merge two result sets ranked under the same threshold into one list of at most `top_k`.
    ///
    /// Boosted hits from either side are kept ahead of scored ones, as within a single search;
    /// the merged list is then ordered by score desc, unit id asc and re-ranked from 1.
    #[must_use]
    pub fn merge(self, other: Self, top_k: usize) -> Self {
        let threshold = self.threshold;
        let considered = self.considered + other.considered;
        let (mut boosted, mut scored): (Vec<SearchHit>, Vec<SearchHit>) = self
            .hits
            .into_iter()
            .chain(other.hits)
            .partition(|hit| matches!(hit.provenance, Provenance::Boosted { .. }));
        boosted.sort_by(SearchHit::cmp);
        boosted.truncate(top_k);
        scored.sort_by(SearchHit::cmp);
        scored.truncate(top_k.saturating_sub(boosted.len()));

        let mut hits = boosted;
        hits.extend(scored);
        hits.sort_by(SearchHit::cmp);
        for (position, hit) in hits.iter_mut().enumerate() {
            hit.rank = position + 1;
        }
        Self { hits, threshold, top_k, considered, tie_breakers: default_search_tie_breakers() }
    }
}

impl SearchHit {
    fn cmp(lhs: &Self, rhs: &Self) -> Ordering {
        rhs.score
            .partial_cmp(&lhs.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| lhs.unit_id.cmp(&rhs.unit_id))
    }
}

#[must_use]
pub fn default_search_tie_breakers() -> Vec<String> {
    vec!["hybrid_score desc".to_string(), "unit_id asc".to_string()]
}

/// Normalise free text into the lower-case term set used for boost matching.
///
/// Terms are whitespace-separated tokens stripped to ASCII alphanumerics, `_` and `-`; tokens
/// shorter than two characters are dropped.
#[must_use]
pub fn query_terms(value: &str) -> BTreeSet<String> {
    value
        .split_whitespace()
        .map(|raw| {
            raw.chars()
                .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-')
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|term| term.len() >= 2)
        .collect()
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    unit: &'a IndexedUnit,
    unit_id: UnitId,
    score: f64,
    semantic: f64,
    lexical: f64,
    provenance: Provenance,
}

impl Candidate<'_> {
    fn cmp(lhs: &Self, rhs: &Self) -> Ordering {
        rhs.score
            .partial_cmp(&lhs.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| lhs.unit_id.cmp(&rhs.unit_id))
    }
}

#[derive(Debug, Clone)]
pub struct HybridScorer {
    threshold: f64,
    boosts: Vec<Boost>,
}

impl Default for HybridScorer {
    fn default() -> Self {
        Self { threshold: DEFAULT_RELEVANCE_THRESHOLD, boosts: Vec::new() }
    }
}

impl HybridScorer {
    /// # Errors
    /// Returns [`ConfigurationError::InvalidPolicy`] when `threshold` is outside `[0, 1]`.
    pub fn new(threshold: f64) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigurationError::InvalidPolicy(
                "relevance threshold MUST be in [0.0, 1.0]".to_string(),
            ));
        }
        Ok(Self { threshold, boosts: Vec::new() })
    }

    /// Attach boosts. Keywords are normalised the same way query text is.
    #[must_use]
    pub fn with_boosts(mut self, boosts: Vec<Boost>) -> Self {
        self.boosts = boosts
            .into_iter()
            .map(|boost| Boost { keyword: boost.keyword.trim().to_ascii_lowercase(), ..boost })
            .collect();
        self
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[must_use]
    pub fn boosts(&self) -> &[Boost] {
        &self.boosts
    }

    /// Ensure every boost keyword is a single query term and every target exists in the
    /// index this scorer will search.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidPolicy`] for a keyword that [`query_terms`] would
    /// not reproduce as one term, or [`ConfigurationError::UnknownBoostTarget`] for the first
    /// missing unit.
    pub fn validate_against(&self, index: &VectorIndex) -> Result<(), ConfigurationError> {
        for boost in &self.boosts {
            if boost.keyword.is_empty() {
                return Err(ConfigurationError::InvalidPolicy(
                    "boost keywords MUST be non-empty".to_string(),
                ));
            }
            let terms = query_terms(&boost.keyword);
            if terms.len() != 1 || !terms.contains(&boost.keyword) {
                return Err(ConfigurationError::InvalidPolicy(format!(
                    "boost keyword {:?} MUST be a single term of at least two characters \
                     from [a-z0-9_-]",
                    boost.keyword
                )));
            }
            if !index.contains(&boost.unit_id) {
                return Err(ConfigurationError::UnknownBoostTarget {
                    keyword: boost.keyword.clone(),
                    unit_id: boost.unit_id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// `(hybrid, semantic, lexical)` for one unit.
    #[must_use]
    pub fn score(&self, query: &SearchQuery, unit: &IndexedUnit) -> (f64, f64, f64) {
        let semantic = cosine_dense(&query.dense, &unit.dense);
        let lexical = cosine_sparse(&query.sparse, &unit.sparse);
        (SEMANTIC_WEIGHT * semantic + LEXICAL_WEIGHT * lexical, semantic, lexical)
    }

    fn candidate<'a>(&self, query: &SearchQuery, unit: &'a IndexedUnit) -> Candidate<'a> {
        let (score, semantic, lexical) = self.score(query, unit);
        Candidate {
            unit,
            unit_id: unit.id(),
            score,
            semantic,
            lexical,
            provenance: Provenance::Scored,
        }
    }

    /// Rank `index` against `query`, returning at most `top_k` hits.
    ///
    /// Units scoring below the threshold are excluded unless a boost keyword in the query
    /// forces them in; forced units keep their raw score and displace the lowest-ranked
    /// scored hits when the result is full.
    #[must_use]
    pub fn search(&self, query: &SearchQuery, index: &VectorIndex, top_k: usize) -> SearchResults {
        let terms = query_terms(&query.text);

        let mut forced: Vec<Candidate<'_>> = Vec::new();
        let mut forced_ids = BTreeSet::new();
        for boost in self.boosts.iter().filter(|boost| terms.contains(&boost.keyword)) {
            let Some(unit) = index.get(&boost.unit_id) else {
                continue;
            };
            if !forced_ids.insert(boost.unit_id.clone()) {
                continue;
            }
            let mut candidate = self.candidate(query, unit);
            if candidate.score < self.threshold {
                candidate.provenance = Provenance::Boosted { keyword: boost.keyword.clone() };
            }
            forced.push(candidate);
        }
        forced.sort_by(Candidate::cmp);
        forced.truncate(top_k);

        let mut scored: Vec<Candidate<'_>> = index
            .units()
            .iter()
            .map(|unit| self.candidate(query, unit))
            .filter(|candidate| {
                candidate.score >= self.threshold && !forced_ids.contains(&candidate.unit_id)
            })
            .collect();
        scored.sort_by(Candidate::cmp);
        scored.truncate(top_k.saturating_sub(forced.len()));

        let mut selected = forced;
        selected.extend(scored);
        selected.sort_by(Candidate::cmp);

        tracing::debug!(
            considered = index.len(),
            returned = selected.len(),
            threshold = self.threshold,
            "hybrid search complete"
        );

        SearchResults {
            hits: selected
                .into_iter()
                .enumerate()
                .map(|(position, candidate)| SearchHit {
                    rank: position + 1,
                    kind: candidate.unit.kind(),
                    citation: candidate.unit.citation(),
                    unit_id: candidate.unit_id,
                    score: candidate.score,
                    semantic: candidate.semantic,
                    lexical: candidate.lexical,
                    provenance: candidate.provenance,
                })
                .collect(),
            threshold: self.threshold,
            top_k,
            considered: index.len(),
            tie_breakers: default_search_tie_breakers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::index::{CaseMeta, SectionMeta, UnitContent};

    fn case_unit(case_id: &str, dense: Vec<f32>, sparse: Vec<(u32, f32)>) -> IndexedUnit {
        IndexedUnit {
            content: UnitContent::Case(CaseMeta {
                case_id: case_id.to_string(),
                name: "HKSAR v Chan".to_string(),
                year: Some(2019),
                court: None,
                facts: String::new(),
                charges: Vec::new(),
                outcome: None,
                sentence: None,
                custodial_months: None,
                appeal_outcome: None,
                keywords: Vec::new(),
            }),
            dense,
            sparse: SparseVector::new(sparse),
        }
    }

    fn section(
        ordinance: &str,
        section: &str,
        dense: Vec<f32>,
        sparse: Vec<(u32, f32)>,
    ) -> IndexedUnit {
        IndexedUnit {
            content: UnitContent::Section(SectionMeta {
                ordinance_id: ordinance.to_string(),
                section_id: section.to_string(),
                title: format!("Section {section}"),
                body: String::new(),
                penalty: None,
            }),
            dense,
            sparse: SparseVector::new(sparse),
        }
    }

    fn build(units: Vec<IndexedUnit>) -> VectorIndex {
        match VectorIndex::build(2, 8, units) {
            Ok(index) => index,
            Err(err) => panic!("fixture index should build: {err}"),
        }
    }

    /// Unit vector whose cosine against `[1, 0]` is `cosine`.
    #[allow(clippy::cast_possible_truncation)]
    fn dense_with_cosine(cosine: f64) -> Vec<f32> {
        let sine = (1.0 - cosine * cosine).max(0.0).sqrt();
        vec![cosine as f32, sine as f32]
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery {
            text: text.to_string(),
            dense: vec![1.0, 0.0],
            sparse: SparseVector::new(vec![(0, 1.0)]),
        }
    }

    #[test]
    fn hybrid_score_is_weighted_sum_of_cosines() {
        let unit = case_unit(
            "HKCA-1",
            vec![0.9, (1.0_f32 - 0.81).sqrt()],
            vec![(0, 0.6), (1, 0.8)],
        );
        let (score, semantic, lexical) = HybridScorer::default().score(&query(""), &unit);

        assert!((semantic - 0.9).abs() < 1e-6);
        assert!((lexical - 0.6).abs() < 1e-6);
        assert!((score - 0.81).abs() < 1e-6);
    }

    #[test]
    fn each_signal_alone_contributes_its_weight() {
        let scorer = HybridScorer::default();

        let semantic_only = case_unit("HKCA-2", vec![1.0, 0.0], vec![(3, 1.0)]);
        let (score, semantic, lexical) = scorer.score(&query(""), &semantic_only);
        assert!((semantic - 1.0).abs() < 1e-9);
        assert!(lexical.abs() < 1e-9);
        assert!((score - 0.7).abs() < 1e-9);

        let lexical_only = case_unit("HKCA-3", vec![0.0, 1.0], vec![(0, 1.0)]);
        let (score, semantic, lexical) = scorer.score(&query(""), &lexical_only);
        assert!(semantic.abs() < 1e-9);
        assert!((lexical - 1.0).abs() < 1e-9);
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn units_below_threshold_are_excluded_not_ranked_low() {
        // 0.7 * 0.6 + 0.3 * 0.0 = 0.42
        let index = build(vec![
            section("1", "1", dense_with_cosine(0.6), vec![(3, 1.0)]),
            section("1", "2", dense_with_cosine(0.2), vec![(4, 1.0)]),
        ]);
        let results = HybridScorer::default().search(&query("anything"), &index, 10);

        assert!(results.is_empty());
        assert_eq!(results.considered, 2);
    }

    #[test]
    fn ties_break_by_unit_id_and_top_k_truncates() {
        let index = build(vec![
            section("9", "1", vec![1.0, 0.0], vec![(0, 1.0)]),
            section("2", "1", vec![1.0, 0.0], vec![(0, 1.0)]),
            section("5", "1", vec![1.0, 0.0], vec![(0, 1.0)]),
        ]);
        let results = HybridScorer::default().search(&query(""), &index, 2);

        let ids: Vec<&str> = results.hits.iter().map(|hit| hit.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["cap2/s1", "cap5/s1"]);
        assert_eq!(results.hits[0].rank, 1);
        assert_eq!(results.hits[1].rank, 2);
    }

    #[test]
    fn boosted_unit_is_included_below_threshold_with_raw_score() {
        let index = build(vec![
            section("210", "2", dense_with_cosine(0.1), vec![(5, 1.0)]),
            section("210", "9", vec![1.0, 0.0], vec![(0, 1.0)]),
        ]);
        let scorer = HybridScorer::default().with_boosts(vec![Boost {
            keyword: "Theft".to_string(),
            unit_id: UnitId::section("210", "2"),
        }]);

        let results = scorer.search(&query("what is the penalty for theft?"), &index, 5);
        assert_eq!(results.hits.len(), 2);
        assert_eq!(results.hits[0].unit_id, UnitId::section("210", "9"));
        assert_eq!(results.hits[0].provenance, Provenance::Scored);
        let boosted = &results.hits[1];
        assert_eq!(boosted.unit_id, UnitId::section("210", "2"));
        assert!((boosted.score - 0.07).abs() < 1e-6);
        assert_eq!(boosted.provenance, Provenance::Boosted { keyword: "theft".to_string() });

        let unboosted = scorer.search(&query("what is the penalty?"), &index, 5);
        assert_eq!(unboosted.hits.len(), 1);
    }

    #[test]
    fn boosted_unit_displaces_lowest_scored_hit_when_full() {
        let index = build(vec![
            section("1", "1", vec![1.0, 0.0], vec![(0, 1.0)]),
            section("1", "2", dense_with_cosine(0.9), vec![(0, 1.0)]),
            section("210", "2", dense_with_cosine(0.1), vec![(5, 1.0)]),
        ]);
        let scorer = HybridScorer::default().with_boosts(vec![Boost {
            keyword: "stole".to_string(),
            unit_id: UnitId::section("210", "2"),
        }]);

        let results = scorer.search(&query("he stole a wallet"), &index, 2);
        let ids: Vec<&str> = results.hits.iter().map(|hit| hit.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["cap1/s1", "cap210/s2"]);
    }

    #[test]
    fn boost_validation_rejects_unknown_targets() {
        let index = build(vec![section("1", "1", vec![1.0, 0.0], vec![])]);
        let scorer = HybridScorer::default().with_boosts(vec![Boost {
            keyword: "theft".to_string(),
            unit_id: UnitId::section("210", "2"),
        }]);
        assert!(matches!(
            scorer.validate_against(&index),
            Err(ConfigurationError::UnknownBoostTarget { .. })
        ));
    }

    #[test]
    fn boost_validation_rejects_keywords_that_never_form_a_term() {
        let index = build(vec![section("210", "2", vec![1.0, 0.0], vec![])]);
        for keyword in ["break in", "o'clock", "x", "theft!"] {
            let scorer = HybridScorer::default().with_boosts(vec![Boost {
                keyword: keyword.to_string(),
                unit_id: UnitId::section("210", "2"),
            }]);
            let result = scorer.validate_against(&index);
            assert!(
                matches!(result, Err(ConfigurationError::InvalidPolicy(_))),
                "{keyword:?} should be rejected"
            );
        }

        let scorer = HybridScorer::default().with_boosts(vec![Boost {
            keyword: " Break-In ".to_string(),
            unit_id: UnitId::section("210", "2"),
        }]);
        assert!(scorer.validate_against(&index).is_ok());
        let results = scorer.search(&query("a break-in last night"), &index, 3);
        assert_eq!(results.hits.len(), 1);
    }

    #[test]
    fn merged_results_interleave_sections_and_cases_by_score() {
        let sections = build(vec![
            section("210", "2", vec![1.0, 0.0], vec![(0, 1.0)]),
            section("210", "9", dense_with_cosine(0.8), vec![(0, 1.0)]),
        ]);
        let cases = match VectorIndex::build(
            2,
            8,
            vec![
                case_unit("theft_001", dense_with_cosine(0.9), vec![(0, 1.0)]),
                case_unit("robbery_001", dense_with_cosine(0.1), vec![(4, 1.0)]),
            ],
        ) {
            Ok(index) => index,
            Err(err) => panic!("case index should build: {err}"),
        };
        let scorer = HybridScorer::default();
        let section_hits = scorer.search(&query(""), &sections, 3);
        let case_hits = scorer.search(&query(""), &cases, 3);

        let merged = section_hits.merge(case_hits, 2);
        let ids: Vec<&str> = merged.hits.iter().map(|hit| hit.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["cap210/s2", "theft_001"]);
        assert_eq!(merged.hits[1].kind, UnitKind::Case);
        assert_eq!(merged.hits[1].rank, 2);
        assert_eq!(merged.considered, 4);
        assert_eq!(merged.top_k, 2);
    }

    #[test]
    fn merge_keeps_boosted_hits() {
        let sections = build(vec![
            section("1", "1", vec![1.0, 0.0], vec![(0, 1.0)]),
            section("210", "2", dense_with_cosine(0.1), vec![(5, 1.0)]),
        ]);
        let cases = match VectorIndex::build(
            2,
            8,
            vec![case_unit("theft_001", vec![1.0, 0.0], vec![(0, 1.0)])],
        ) {
            Ok(index) => index,
            Err(err) => panic!("case index should build: {err}"),
        };
        let scorer = HybridScorer::default().with_boosts(vec![Boost {
            keyword: "stole".to_string(),
            unit_id: UnitId::section("210", "2"),
        }]);
        let section_hits = scorer.search(&query("he stole"), &sections, 2);
        let case_hits = HybridScorer::default().search(&query("he stole"), &cases, 2);

        let merged = section_hits.merge(case_hits, 2);
        let ids: Vec<&str> = merged.hits.iter().map(|hit| hit.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["cap1/s1", "cap210/s2"]);
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        assert!(HybridScorer::new(1.5).is_err());
        assert!(HybridScorer::new(-0.1).is_err());
        assert!(HybridScorer::new(0.0).is_ok());
    }

    #[test]
    fn theft_query_ranks_theft_definition_first() {
        let mut units = vec![section("210", "2", vec![0.95, 0.31], vec![(1, 0.9), (2, 0.4)])];
        for offset in 0..10_u8 {
            let angle = 1.2 + f32::from(offset) * 0.03;
            let dense = vec![angle.cos(), angle.sin()];
            units.push(section("999", &offset.to_string(), dense, vec![(7, 1.0)]));
        }
        let index = build(units);
        let theft_query = SearchQuery {
            text: "theft".to_string(),
            dense: vec![1.0, 0.3],
            sparse: SparseVector::new(vec![(1, 1.0)]),
        };

        let results = HybridScorer::default().search(&theft_query, &index, 5);
        assert_eq!(results.hits.first().map(|hit| hit.citation.as_str()), Some("Cap. 210, s. 2"));
    }

    proptest! {
        #[test]
        fn property_results_are_sorted_and_bounded(
            cosines in proptest::collection::vec(0.0_f64..1.0, 1..20),
            top_k in 0_usize..8,
        ) {
            let units = cosines
                .iter()
                .enumerate()
                .map(|(position, cosine)| {
                    section("7", &position.to_string(), dense_with_cosine(*cosine), vec![(0, 1.0)])
                })
                .collect();
            let index = build(units);
            let results = HybridScorer::default().search(&query(""), &index, top_k);

            prop_assert!(results.hits.len() <= top_k);
            for hit in &results.hits {
                prop_assert!(hit.score >= DEFAULT_RELEVANCE_THRESHOLD);
            }
            for pair in results.hits.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
