use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

/// Composite identity of an indexed unit: `cap{ordinance}/s{section}` or the case id.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn section(ordinance_id: &str, section_id: &str) -> Self {
        Self(format!("cap{ordinance_id}/s{section_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sparse TF-IDF vector as `(feature index, weight)` pairs with strictly increasing indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    #[must_use]
    pub fn new(entries: Vec<(u32, f32)>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// # Errors
    /// Returns a description of the first ordering, range or finiteness violation.
    pub fn check(&self, feature_count: u32) -> Result<(), String> {
        let mut previous: Option<u32> = None;
        for (index, weight) in &self.entries {
            if *index >= feature_count {
                return Err(format!(
                    "feature index {index} MUST be below the feature count {feature_count}"
                ));
            }
            if previous.is_some_and(|prev| *index <= prev) {
                return Err("feature indices MUST be strictly increasing".to_string());
            }
            if !weight.is_finite() {
                return Err(format!("weight for feature {index} MUST be finite"));
            }
            previous = Some(*index);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SectionMeta {
    pub ordinance_id: String,
    pub section_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub penalty: Option<String>,
}

/// One charge laid in a precedent, with the provision it was laid under when known.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Charge {
    pub description: String,
    #[serde(default)]
    pub ordinance_id: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
}

impl Charge {
    /// `section_id: None` matches any section of the ordinance.
    #[must_use]
    pub fn cites(&self, ordinance_id: &str, section_id: Option<&str>) -> bool {
        self.ordinance_id.as_deref() == Some(ordinance_id)
            && (section_id.is_none() || self.section_id.as_deref() == section_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppealOutcome {
    Dismissed,
    Allowed,
    Reduced,
}

impl AppealOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dismissed => "dismissed",
            Self::Allowed => "allowed",
            Self::Reduced => "reduced",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dismissed" => Some(Self::Dismissed),
            "allowed" => Some(Self::Allowed),
            "reduced" => Some(Self::Reduced),
            _ => None,
        }
    }

    /// Allowed appeals and reduced sentences both count as success for the appellant.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Allowed | Self::Reduced)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CaseMeta {
    pub case_id: String,
    pub name: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub court: Option<String>,
    #[serde(default)]
    pub facts: String,
    #[serde(default)]
    pub charges: Vec<Charge>,
    /// Verdict or disposition, e.g. `Guilty` or `Plaintiff successful`.
    #[serde(default)]
    pub outcome: Option<String>,
    /// Sentence or remedy as pronounced.
    #[serde(default)]
    pub sentence: Option<String>,
    /// Custodial term in whole months; `None` for non-custodial disposals.
    #[serde(default)]
    pub custodial_months: Option<u32>,
    #[serde(default)]
    pub appeal_outcome: Option<AppealOutcome>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl CaseMeta {
    #[must_use]
    pub fn cites(&self, ordinance_id: &str, section_id: Option<&str>) -> bool {
        self.charges.iter().any(|charge| charge.cites(ordinance_id, section_id))
    }

    /// Case-insensitive exact match on the recorded outcome.
    #[must_use]
    pub fn has_outcome(&self, outcome: &str) -> bool {
        self.outcome.as_deref().is_some_and(|recorded| recorded.eq_ignore_ascii_case(outcome))
    }

    /// Case-insensitive substring match over facts, keywords and the case name.
    #[must_use]
    pub fn mentions(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        self.facts.to_lowercase().contains(&needle)
            || self.name.to_lowercase().contains(&needle)
            || self.keywords.iter().any(|keyword| keyword.to_lowercase().contains(&needle))
    }
}

/// Structured precedent lookup, evaluated against case units only.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum CaseFilter {
    Ordinance {
        ordinance_id: String,
        #[serde(default)]
        section_id: Option<String>,
    },
    Outcome {
        outcome: String,
    },
    Keyword {
        keyword: String,
    },
}

impl CaseFilter {
    #[must_use]
    pub fn matches(&self, case: &CaseMeta) -> bool {
        match self {
            Self::Ordinance { ordinance_id, section_id } => {
                case.cites(ordinance_id, section_id.as_deref())
            }
            Self::Outcome { outcome } => case.has_outcome(outcome),
            Self::Keyword { keyword } => case.mentions(keyword),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitContent {
    Section(SectionMeta),
    Case(CaseMeta),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Section,
    Case,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedUnit {
    pub content: UnitContent,
    pub dense: Vec<f32>,
    #[serde(default)]
    pub sparse: SparseVector,
}

impl IndexedUnit {
    #[must_use]
    pub fn id(&self) -> UnitId {
        match &self.content {
            UnitContent::Section(section) => {
                UnitId::section(&section.ordinance_id, &section.section_id)
            }
            UnitContent::Case(case) => UnitId::new(case.case_id.clone()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> UnitKind {
        match &self.content {
            UnitContent::Section(_) => UnitKind::Section,
            UnitContent::Case(_) => UnitKind::Case,
        }
    }

    /// Human-readable citation, e.g. `Cap. 210, s. 2` or `HKSAR v Chan (2019)`.
    #[must_use]
    pub fn citation(&self) -> String {
        match &self.content {
            UnitContent::Section(section) => {
                format!("Cap. {}, s. {}", section.ordinance_id, section.section_id)
            }
            UnitContent::Case(case) => match case.year {
                Some(year) => format!("{} ({year})", case.name),
                None => case.name.clone(),
            },
        }
    }
}

/// Read-only store of indexed units, ordered by [`UnitId`].
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dense_dimensions: usize,
    sparse_features: u32,
    units: Vec<IndexedUnit>,
    ids: BTreeMap<UnitId, usize>,
}

impl VectorIndex {
    /// Validate and freeze a set of units. Dimensionality is checked here and never per query.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::DimensionMismatch`],
    /// [`ConfigurationError::InvalidSparseVector`], [`ConfigurationError::DuplicateUnit`] or
    /// [`ConfigurationError::InvalidPolicy`] for a zero-dimensional index.
    pub fn build(
        dense_dimensions: usize,
        sparse_features: u32,
        units: Vec<IndexedUnit>,
    ) -> Result<Self, ConfigurationError> {
        if dense_dimensions == 0 {
            return Err(ConfigurationError::InvalidPolicy(
                "dense_dimensions MUST be >= 1".to_string(),
            ));
        }

        let mut keyed = BTreeMap::new();
        for unit in units {
            let unit_id = unit.id();
            if unit.dense.len() != dense_dimensions {
                return Err(ConfigurationError::DimensionMismatch {
                    unit_id: unit_id.to_string(),
                    expected: dense_dimensions,
                    actual: unit.dense.len(),
                });
            }
            if unit.dense.iter().any(|value| !value.is_finite()) {
                return Err(ConfigurationError::InvalidDenseVector {
                    unit_id: unit_id.to_string(),
                    reason: "dense values MUST be finite".to_string(),
                });
            }
            unit.sparse.check(sparse_features).map_err(|reason| {
                ConfigurationError::InvalidSparseVector { unit_id: unit_id.to_string(), reason }
            })?;
            if keyed.contains_key(&unit_id) {
                return Err(ConfigurationError::DuplicateUnit(unit_id.to_string()));
            }
            keyed.insert(unit_id, unit);
        }

        let mut ids = BTreeMap::new();
        let mut ordered = Vec::with_capacity(keyed.len());
        for (position, (unit_id, unit)) in keyed.into_iter().enumerate() {
            ids.insert(unit_id, position);
            ordered.push(unit);
        }

        Ok(Self { dense_dimensions, sparse_features, units: ordered, ids })
    }

    #[must_use]
    pub fn dense_dimensions(&self) -> usize {
        self.dense_dimensions
    }

    #[must_use]
    pub fn sparse_features(&self) -> u32 {
        self.sparse_features
    }

    #[must_use]
    pub fn units(&self) -> &[IndexedUnit] {
        &self.units
    }

    #[must_use]
    pub fn get(&self, unit_id: &UnitId) -> Option<&IndexedUnit> {
        self.ids.get(unit_id).map(|position| &self.units[*position])
    }

    #[must_use]
    pub fn contains(&self, unit_id: &UnitId) -> bool {
        self.ids.contains_key(unit_id)
    }

    /// Case metadata in id order; section units are skipped.
    pub fn cases(&self) -> impl Iterator<Item = &CaseMeta> {
        self.units.iter().filter_map(|unit| match &unit.content {
            UnitContent::Case(case) => Some(case),
            UnitContent::Section(_) => None,
        })
    }

    #[must_use]
    pub fn find_cases(&self, filter: &CaseFilter) -> Vec<&CaseMeta> {
        self.cases().filter(|case| filter.matches(case)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Cosine similarity accumulated in `f64`. Mismatched, empty or zero-magnitude input yields 0.
#[must_use]
pub fn cosine_dense(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    finish_cosine(dot, norm_a, norm_b)
}

/// Cosine similarity of two index-sorted sparse vectors via a merge join.
#[must_use]
pub fn cosine_sparse(a: &SparseVector, b: &SparseVector) -> f64 {
    let norm = |vector: &SparseVector| {
        vector.entries.iter().map(|(_, weight)| f64::from(*weight).powi(2)).sum::<f64>()
    };

    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0_f64;
    while i < a.entries.len() && j < b.entries.len() {
        let (index_a, weight_a) = a.entries[i];
        let (index_b, weight_b) = b.entries[j];
        match index_a.cmp(&index_b) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += f64::from(weight_a) * f64::from(weight_b);
                i += 1;
                j += 1;
            }
        }
    }

    finish_cosine(dot, norm(a), norm(b))
}

fn finish_cosine(dot: f64, norm_a: f64, norm_b: f64) -> f64 {
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}
