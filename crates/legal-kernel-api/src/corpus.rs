//! JSON corpus of precomputed section and case vectors.

use legal_kernel_core::{
    AppealOutcome, CaseMeta, Charge, IndexedUnit, SectionMeta, SparseVector, UnitContent,
    VectorIndex,
};
use serde::Deserialize;

use crate::config::LoadError;

pub const BUILTIN_CORPUS: &str = include_str!("../knowledge/corpus.json");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CorpusFile {
    dense_dimensions: usize,
    sparse_features: u32,
    #[serde(default)]
    sections: Vec<SectionEntry>,
    #[serde(default)]
    cases: Vec<CaseEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionEntry {
    ordinance_id: String,
    section_id: String,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    penalty: Option<String>,
    dense: Vec<f32>,
    #[serde(default)]
    sparse: SparseVector,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CaseEntry {
    case_id: String,
    name: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    court: Option<String>,
    #[serde(default)]
    facts: String,
    #[serde(default)]
    charges: Vec<Charge>,
    #[serde(default)]
    outcome: Option<String>,
    #[serde(default)]
    sentence: Option<String>,
    #[serde(default)]
    custodial_months: Option<u32>,
    #[serde(default)]
    appeal_outcome: Option<AppealOutcome>,
    #[serde(default)]
    keywords: Vec<String>,
    dense: Vec<f32>,
    #[serde(default)]
    sparse: SparseVector,
}

impl From<SectionEntry> for IndexedUnit {
    fn from(entry: SectionEntry) -> Self {
        Self {
            content: UnitContent::Section(SectionMeta {
                ordinance_id: entry.ordinance_id,
                section_id: entry.section_id,
                title: entry.title,
                body: entry.body,
                penalty: entry.penalty,
            }),
            dense: entry.dense,
            sparse: entry.sparse,
        }
    }
}

impl From<CaseEntry> for IndexedUnit {
    fn from(entry: CaseEntry) -> Self {
        Self {
            content: UnitContent::Case(CaseMeta {
                case_id: entry.case_id,
                name: entry.name,
                year: entry.year,
                court: entry.court,
                facts: entry.facts,
                charges: entry.charges,
                outcome: entry.outcome,
                sentence: entry.sentence,
                custodial_months: entry.custodial_months,
                appeal_outcome: entry.appeal_outcome,
                keywords: entry.keywords,
            }),
            dense: entry.dense,
            sparse: entry.sparse,
        }
    }
}

/// Section and case indexes sharing one vector space.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub origin: String,
    pub sections: VectorIndex,
    pub cases: VectorIndex,
}

impl Corpus {
    /// # Errors
    /// Returns [`LoadError`] when the built-in corpus fails to parse or validate.
    pub fn builtin() -> Result<Self, LoadError> {
        Self::parse(BUILTIN_CORPUS, "builtin:corpus.json")
    }

    /// Parse and index a corpus document. Dimensionality is validated here, once.
    ///
    /// # Errors
    /// Returns [`LoadError::Json`] for malformed JSON or [`LoadError::Configuration`] for
    /// vectors that disagree with the declared dimensions.
    pub fn parse(json: &str, origin: &str) -> Result<Self, LoadError> {
        let file: CorpusFile = serde_json::from_str(json)
            .map_err(|source| LoadError::Json { origin: origin.to_string(), source })?;

        let sections = VectorIndex::build(
            file.dense_dimensions,
            file.sparse_features,
            file.sections.into_iter().map(IndexedUnit::from).collect(),
        )?;
        let cases = VectorIndex::build(
            file.dense_dimensions,
            file.sparse_features,
            file.cases.into_iter().map(IndexedUnit::from).collect(),
        )?;
        tracing::info!(
            origin,
            sections = sections.len(),
            cases = cases.len(),
            dense_dimensions = file.dense_dimensions,
            "corpus indexed"
        );
        Ok(Self { origin: origin.to_string(), sections, cases })
    }
}
