//! Relaxation search around an insertion site.
//!
//! A design first tries the caller's constraints as given. If that fails, the
//! search restarts from `DesignOptions::relax_start` and the dimensions in
//! `DesignOptions::relax_order` are loosened one step at a time,
//! round after round, with an oracle call after every change, until a pair of
//! primers with close melting temperatures turns up or a whole round changes
//! nothing. Relaxation is cumulative and never tightened again within a design.

use crate::acceptance::{AcceptedPair, first_acceptable_pair};
use crate::constraints::{
    ConstraintSet, DEFAULT_RELAX_ORDER, RelaxDimension, RelaxationLimits,
};
use crate::error::DesignError;
use crate::export::export_primers;
use crate::oracle::{
    CandidateResult, IncludedRegion, MAX_CANDIDATES_PER_SIDE, OracleRequest, PairOkRegion,
    PrimerOracle, query_oracle,
};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

/// Primer placement bounds as offsets from the insertion site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWindow {
    pub start: i64,
    pub end: i64,
}

impl SearchWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.abs_diff(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Absolute `(start, length)` in a template of `template_len` bases.
    fn absolute(
        &self,
        insertion_site: usize,
        template_len: usize,
    ) -> Result<(usize, usize), DesignError> {
        if self.start > self.end {
            return Err(DesignError::InvalidInput(format!(
                "Search window [{}, {}] starts after it ends",
                self.start, self.end
            )));
        }
        let length = self.len();
        let start = i64::try_from(insertion_site)
            .ok()
            .and_then(|site| site.checked_add(self.start))
            .and_then(|start| usize::try_from(start).ok());
        match start {
            Some(start) if start.checked_add(length).is_some_and(|end| end <= template_len) => {
                Ok((start, length))
            }
            _ => Err(DesignError::InvalidInput(format!(
                "Search window [{}, {}] around site {} falls outside the {} bp template",
                self.start, self.end, insertion_site, template_len
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignRequest {
    pub sequence_id: String,
    pub template: String,
    pub included_region: IncludedRegion,
    pub insertion_site: usize,
}

impl DesignRequest {
    pub fn new(
        sequence_id: impl Into<String>,
        template: impl Into<String>,
        included_region: IncludedRegion,
        insertion_site: usize,
    ) -> Self {
        Self {
            sequence_id: sequence_id.into(),
            template: template.into(),
            included_region,
            insertion_site,
        }
    }

    fn validate(&self) -> Result<(), DesignError> {
        let len = self.template.len();
        if len == 0 {
            return Err(DesignError::InvalidInput(format!(
                "Template '{}' is empty",
                self.sequence_id
            )));
        }
        if !self.included_region.end().is_some_and(|end| end <= len) {
            return Err(DesignError::InvalidInput(format!(
                "Included region {},{} runs past the {len} bp template",
                self.included_region.start, self.included_region.length
            )));
        }
        if self.insertion_site > len {
            return Err(DesignError::InvalidInput(format!(
                "Insertion site {} lies beyond the {len} bp template",
                self.insertion_site
            )));
        }
        Ok(())
    }

    /// Absolute pair-ok region for the two relative windows.
    pub fn pair_ok_region(
        &self,
        left: &SearchWindow,
        right: &SearchWindow,
    ) -> Result<PairOkRegion, DesignError> {
        let len = self.template.len();
        let (left_start, left_length) = left.absolute(self.insertion_site, len)?;
        let (right_start, right_length) = right.absolute(self.insertion_site, len)?;
        Ok(PairOkRegion {
            left_start,
            left_length,
            right_start,
            right_length,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignOptions {
    pub left_window: SearchWindow,
    pub right_window: SearchWindow,
    /// A pair is accepted when its melting temperatures differ by strictly less.
    pub max_tm_diff: f64,
    pub relax_order: Vec<RelaxDimension>,
    /// Used for the first attempt only.
    pub constraints: ConstraintSet,
    /// Where relaxation starts once the first attempt has failed.
    pub relax_start: ConstraintSet,
    pub limits: RelaxationLimits,
    pub num_return: usize,
    /// Append to the output table instead of replacing it.
    pub append: bool,
}

impl Default for DesignOptions {
    fn default() -> Self {
        Self {
            left_window: SearchWindow::new(-700, -100),
            right_window: SearchWindow::new(100, 700),
            max_tm_diff: 2.0,
            relax_order: DEFAULT_RELAX_ORDER.to_vec(),
            constraints: ConstraintSet::default(),
            relax_start: ConstraintSet::default(),
            limits: RelaxationLimits::default(),
            num_return: MAX_CANDIDATES_PER_SIDE,
            append: false,
        }
    }
}

impl DesignOptions {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DesignError> {
        let shown = path.as_ref().display().to_string();
        let text =
            std::fs::read_to_string(path.as_ref()).map_err(|e| DesignError::io(&shown, e))?;
        serde_json::from_str(&text).map_err(|e| DesignError::Config {
            path: shown,
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), DesignError> {
        if !(self.max_tm_diff > 0.0) {
            return Err(DesignError::InvalidInput(format!(
                "Maximum melting temperature difference must be positive, got {}",
                self.max_tm_diff
            )));
        }
        if self.relax_order.is_empty() {
            return Err(DesignError::InvalidInput(
                "Relaxation order lists no dimensions".to_string(),
            ));
        }
        if self.num_return == 0 {
            return Err(DesignError::InvalidInput(
                "Number of candidates to request must be at least 1".to_string(),
            ));
        }
        self.limits.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedDesign {
    /// Everything the oracle returned in the accepting call; all of it is exported.
    pub result: CandidateResult,
    pub pair: AcceptedPair,
    pub constraints: ConstraintSet,
    /// 0 for the first attempt, otherwise the relaxation round.
    pub round: usize,
    pub oracle_calls: usize,
    pub rows_exported: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DesignOutcome {
    Found(Box<AcceptedDesign>),
    /// Every dimension reached its bound without an acceptable pair.
    NotFound { rounds: usize, oracle_calls: usize },
}

impl DesignOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn accepted(&self) -> Option<&AcceptedDesign> {
        match self {
            Self::Found(design) => Some(design),
            Self::NotFound { .. } => None,
        }
    }

    pub fn oracle_calls(&self) -> usize {
        match self {
            Self::Found(design) => design.oracle_calls,
            Self::NotFound { oracle_calls, .. } => *oracle_calls,
        }
    }
}

struct Attempts<'a, O: ?Sized> {
    oracle: &'a mut O,
    request: &'a DesignRequest,
    pair_ok_region: PairOkRegion,
    options: &'a DesignOptions,
    calls: usize,
}

impl<O: PrimerOracle + ?Sized> Attempts<'_, O> {
    fn try_constraints(
        &mut self,
        constraints: &ConstraintSet,
    ) -> Result<Option<(CandidateResult, AcceptedPair)>, DesignError> {
        let oracle_request = OracleRequest::new(
            &self.request.sequence_id,
            &self.request.template,
            self.request.included_region,
            self.pair_ok_region,
            constraints,
        )
        .with_num_return(self.options.num_return);
        self.calls += 1;
        let result = query_oracle(&mut *self.oracle, &oracle_request)?;

        if !result.has_both_sides() {
            debug!(
                left = result.left.len(),
                right = result.right.len(),
                "no forward/reverse candidates"
            );
            return Ok(None);
        }
        match first_acceptable_pair(&result, self.options.max_tm_diff) {
            Some(pair) => Ok(Some((result, pair))),
            None => {
                debug!(
                    left = result.left.len(),
                    right = result.right.len(),
                    max_tm_diff = self.options.max_tm_diff,
                    "candidates found, but no pair within the melting temperature tolerance"
                );
                Ok(None)
            }
        }
    }
}

/// Designs primers flanking `request.insertion_site` and exports every primer
/// of the accepting oracle answer to `output`.
///
/// Oracle failures are returned as `DesignError::Oracle`. Running out of
/// relaxation steps is not an error: it yields `DesignOutcome::NotFound` and
/// leaves `output` alone.
pub fn design_primers<O: PrimerOracle + ?Sized>(
    oracle: &mut O,
    request: &DesignRequest,
    output: impl AsRef<Path>,
    options: &DesignOptions,
) -> Result<DesignOutcome, DesignError> {
    options.validate()?;
    request.validate()?;
    let pair_ok_region = request.pair_ok_region(&options.left_window, &options.right_window)?;
    let mut attempts = Attempts {
        oracle,
        request,
        pair_ok_region,
        options,
        calls: 0,
    };

    let first = options.constraints.sorted();
    if let Some((result, pair)) = attempts.try_constraints(&first)? {
        info!(sequence_id = %request.sequence_id, "found primers on the first pass");
        let found = Found {
            result,
            pair,
            constraints: first,
            round: 0,
        };
        return accept(output.as_ref(), found, attempts.calls, options);
    }

    let mut constraints = options.relax_start.sorted();

    let mut round = 0;
    loop {
        round += 1;
        let mut changed_any = false;
        for &dimension in &options.relax_order {
            if !constraints.relax(dimension, &options.limits) {
                debug!(round, %dimension, "dimension already at its bound");
                continue;
            }
            changed_any = true;
            debug!(round, %dimension, ?constraints, "relaxed");
            if let Some((result, pair)) = attempts.try_constraints(&constraints)? {
                info!(
                    sequence_id = %request.sequence_id,
                    round,
                    %dimension,
                    oracle_calls = attempts.calls,
                    "found primers"
                );
                let found = Found {
                    result,
                    pair,
                    constraints,
                    round,
                };
                return accept(output.as_ref(), found, attempts.calls, options);
            }
        }
        if !changed_any {
            info!(
                sequence_id = %request.sequence_id,
                rounds = round,
                oracle_calls = attempts.calls,
                "could not find suitable primers"
            );
            return Ok(DesignOutcome::NotFound {
                rounds: round,
                oracle_calls: attempts.calls,
            });
        }
    }
}

struct Found {
    result: CandidateResult,
    pair: AcceptedPair,
    constraints: ConstraintSet,
    round: usize,
}

fn accept(
    output: &Path,
    found: Found,
    oracle_calls: usize,
    options: &DesignOptions,
) -> Result<DesignOutcome, DesignError> {
    let rows_exported = export_primers(output, &found.result, options.append)?;
    Ok(DesignOutcome::Found(Box::new(AcceptedDesign {
        result: found.result,
        pair: found.pair,
        constraints: found.constraints,
        round: found.round,
        oracle_calls,
        rows_exported,
    })))
}

/// Designs against only two slices of `template`: `left` (upstream) and
/// `right` (downstream), both absolute and half-open.
///
/// The slices are joined into one shorter working sequence; forward primers are
/// searched in the first part and reverse primers in the second.
pub fn design_primers_in_windows<O: PrimerOracle + ?Sized>(
    oracle: &mut O,
    sequence_id: &str,
    template: &str,
    left: Range<usize>,
    right: Range<usize>,
    output: impl AsRef<Path>,
    options: &DesignOptions,
) -> Result<DesignOutcome, DesignError> {
    if left.is_empty() || right.is_empty() {
        return Err(DesignError::InvalidInput(format!(
            "Windows {left:?} and {right:?} must both be non-empty"
        )));
    }
    if left.end > right.start {
        return Err(DesignError::InvalidInput(format!(
            "Left window {left:?} must end before right window {right:?} starts"
        )));
    }
    let (Some(left_part), Some(right_part)) =
        (template.get(left.clone()), template.get(right.clone()))
    else {
        return Err(DesignError::InvalidInput(format!(
            "Windows {left:?} and {right:?} must lie within the {} bp template",
            template.len()
        )));
    };

    let working = format!("{left_part}{right_part}");
    let left_len = left_part.len() as i64;
    let total = working.len() as i64;
    let included_region = IncludedRegion {
        start: 0,
        length: working.len(),
    };
    let request = DesignRequest::new(sequence_id, working, included_region, 0);
    let options = DesignOptions {
        left_window: SearchWindow::new(0, left_len),
        right_window: SearchWindow::new(left_len, total),
        ..options.clone()
    };
    debug!(
        sequence_id,
        working_len = total,
        left = ?left,
        right = ?right,
        "designing on joined flanking windows"
    );
    design_primers(oracle, &request, output, &options)
}
