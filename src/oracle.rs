//! Boundary to the external primer-design engine.
//!
//! The engine answers with a flat, ordered list of `KEY=VALUE` pairs following
//! Primer3's naming: `PRIMER_{LEFT|RIGHT}_NUM_RETURNED` plus
//! `PRIMER_{LEFT|RIGHT}_{index}_{FIELD}` for each candidate. `OracleRecord`
//! keeps that list as returned, `CandidateResult` is the typed view the
//! scheduler works with.

use crate::constraints::ConstraintSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing::trace;

/// Candidates requested per side on every oracle call.
pub const MAX_CANDIDATES_PER_SIDE: usize = 30;

#[derive(Debug, Clone)]
pub enum OracleError {
    ToolNotFound {
        executable: String,
    },
    ToolFailed {
        executable: String,
        status: Option<i32>,
        stderr: String,
    },
    /// The engine ran but rejected the request (`PRIMER_ERROR`).
    Engine {
        message: String,
    },
    MalformedOutput {
        message: String,
    },
    Io {
        message: String,
    },
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolNotFound { executable } => write!(
                f,
                "Could not find primer design executable '{executable}'. \
                 Install Primer3 or configure its path"
            ),
            Self::ToolFailed {
                executable,
                status,
                stderr,
            } => write!(
                f,
                "Primer design command '{}' failed (status={:?}, stderr='{}')",
                executable,
                status,
                stderr.trim()
            ),
            Self::Engine { message } => write!(f, "Primer design engine error: {message}"),
            Self::MalformedOutput { message } => {
                write!(f, "Unexpected primer design output: {message}")
            }
            Self::Io { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for OracleError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimerSide {
    Left,
    Right,
}

impl PrimerSide {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }

    pub fn num_returned_key(&self) -> String {
        format!("PRIMER_{}_NUM_RETURNED", self.tag())
    }
}

fn primer_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^PRIMER_(LEFT|RIGHT)_([0-9]+)(?:_([A-Z0-9_]+))?$")
            .expect("primer key pattern is valid")
    })
}

/// A per-candidate key such as `PRIMER_RIGHT_4_TM`, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimerKey {
    pub side: PrimerSide,
    pub index: usize,
    /// `None` for the bare position key (`PRIMER_LEFT_0`).
    pub field: Option<String>,
}

impl PrimerKey {
    pub fn parse(key: &str) -> Option<Self> {
        let caps = primer_key_regex().captures(key)?;
        let side = match caps.get(1)?.as_str() {
            "LEFT" => PrimerSide::Left,
            _ => PrimerSide::Right,
        };
        let index = caps.get(2)?.as_str().parse().ok()?;
        let field = caps.get(3).map(|m| m.as_str().to_string());
        Some(Self { side, index, field })
    }

    /// Primer name used in exported tables, e.g. `PRIMER_LEFT_3`.
    pub fn primer_name(side: PrimerSide, index: usize) -> String {
        format!("PRIMER_{}_{}", side.tag(), index)
    }

    pub fn field_key(side: PrimerSide, index: usize, field: &str) -> String {
        format!("PRIMER_{}_{}_{}", side.tag(), index, field)
    }

    pub fn name(&self) -> String {
        Self::primer_name(self.side, self.index)
    }

    pub fn is_sequence(&self) -> bool {
        self.field.as_deref() == Some("SEQUENCE")
    }
}

/// Ordered key/value output of one oracle call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleRecord {
    entries: Vec<(String, String)>,
}

impl OracleRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the value of an existing key in place, otherwise appends.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OracleRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = OracleRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedRegion {
    pub start: usize,
    pub length: usize,
}

impl IncludedRegion {
    pub fn whole(template: &str) -> Self {
        Self {
            start: 0,
            length: template.len(),
        }
    }

    /// `None` when `start + length` does not fit in `usize`.
    pub fn end(&self) -> Option<usize> {
        self.start.checked_add(self.length)
    }
}

/// Absolute placement bounds for forward and reverse primers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairOkRegion {
    pub left_start: usize,
    pub left_length: usize,
    pub right_start: usize,
    pub right_length: usize,
}

/// One call's worth of input for the oracle.
#[derive(Debug, Clone)]
pub struct OracleRequest<'a> {
    pub sequence_id: &'a str,
    pub template: &'a str,
    pub included_region: IncludedRegion,
    pub pair_ok_region: PairOkRegion,
    pub constraints: ConstraintSet,
    pub num_return: usize,
}

impl<'a> OracleRequest<'a> {
    /// Builds a request asking for `MAX_CANDIDATES_PER_SIDE` candidates.
    /// Size and temperature triples are submitted sorted.
    pub fn new(
        sequence_id: &'a str,
        template: &'a str,
        included_region: IncludedRegion,
        pair_ok_region: PairOkRegion,
        constraints: &ConstraintSet,
    ) -> Self {
        Self {
            sequence_id,
            template,
            included_region,
            pair_ok_region,
            constraints: constraints.sorted(),
            num_return: MAX_CANDIDATES_PER_SIDE,
        }
    }

    pub fn with_num_return(mut self, num_return: usize) -> Self {
        self.num_return = num_return;
        self
    }
}

/// External primer-design engine.
pub trait PrimerOracle {
    fn design(&mut self, request: &OracleRequest<'_>) -> Result<OracleRecord, OracleError>;
}

impl<O: PrimerOracle + ?Sized> PrimerOracle for &mut O {
    fn design(&mut self, request: &OracleRequest<'_>) -> Result<OracleRecord, OracleError> {
        (**self).design(request)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerCandidate {
    pub side: PrimerSide,
    pub index: usize,
    pub sequence: String,
    pub tm: f64,
}

impl PrimerCandidate {
    pub fn name(&self) -> String {
        PrimerKey::primer_name(self.side, self.index)
    }
}

/// Typed view of one oracle answer. The raw record is kept for export order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub left: Vec<PrimerCandidate>,
    pub right: Vec<PrimerCandidate>,
    pub record: OracleRecord,
}

impl CandidateResult {
    pub fn from_record(record: OracleRecord) -> Result<Self, OracleError> {
        let left = Self::read_side(&record, PrimerSide::Left)?;
        let right = Self::read_side(&record, PrimerSide::Right)?;
        Ok(Self {
            left,
            right,
            record,
        })
    }

    fn read_side(
        record: &OracleRecord,
        side: PrimerSide,
    ) -> Result<Vec<PrimerCandidate>, OracleError> {
        let count_key = side.num_returned_key();
        let count: usize = record
            .get(&count_key)
            .ok_or_else(|| OracleError::MalformedOutput {
                message: format!("missing {count_key}"),
            })?
            .trim()
            .parse()
            .map_err(|e| OracleError::MalformedOutput {
                message: format!("{count_key}: {e}"),
            })?;

        (0..count)
            .map(|index| {
                let seq_key = PrimerKey::field_key(side, index, "SEQUENCE");
                let tm_key = PrimerKey::field_key(side, index, "TM");
                let sequence = record
                    .get(&seq_key)
                    .ok_or_else(|| OracleError::MalformedOutput {
                        message: format!("missing {seq_key}"),
                    })?
                    .to_string();
                let tm = record
                    .get(&tm_key)
                    .ok_or_else(|| OracleError::MalformedOutput {
                        message: format!("missing {tm_key}"),
                    })?
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| OracleError::MalformedOutput {
                        message: format!("{tm_key}: {e}"),
                    })?;
                Ok(PrimerCandidate {
                    side,
                    index,
                    sequence,
                    tm,
                })
            })
            .collect()
    }

    pub fn candidates(&self, side: PrimerSide) -> &[PrimerCandidate] {
        match side {
            PrimerSide::Left => &self.left,
            PrimerSide::Right => &self.right,
        }
    }

    pub fn has_both_sides(&self) -> bool {
        !self.left.is_empty() && !self.right.is_empty()
    }

    /// `(name, sequence)` for every `*_SEQUENCE` key, in the oracle's key order.
    pub fn sequence_rows(&self) -> Vec<(String, String)> {
        self.record
            .iter()
            .filter_map(|(key, value)| {
                let key = PrimerKey::parse(key)?;
                key.is_sequence().then(|| (key.name(), value.to_string()))
            })
            .collect()
    }
}

/// Adapter entry: one oracle call, normalized into a `CandidateResult`.
pub fn query_oracle<O: PrimerOracle + ?Sized>(
    oracle: &mut O,
    request: &OracleRequest<'_>,
) -> Result<CandidateResult, OracleError> {
    let record = oracle.design(request)?;
    trace!(keys = record.len(), "oracle answered");
    CandidateResult::from_record(record)
}
