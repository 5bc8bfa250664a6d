//! PCR primer design around an insertion site.
//!
//! Primers are picked by an external engine (`PrimerOracle`, usually
//! `primer3::Primer3Oracle`). When its answer holds no forward/reverse pair
//! with close enough melting temperatures, `design::design_primers` loosens the
//! constraints step by step and asks again. Accepted designs are written to a
//! `name,sequence` table that `export::prune_results` can later narrow down.

pub mod acceptance;
pub mod constraints;
pub mod design;
pub mod error;
pub mod export;
pub mod oracle;
pub mod primer3;

pub use acceptance::{AcceptedPair, first_acceptable_pair, has_acceptable_pair};
pub use constraints::{
    ConstraintSet, DEFAULT_RELAX_ORDER, RelaxDimension, RelaxationLimits, ValueRange,
};
pub use design::{
    AcceptedDesign, DesignOptions, DesignOutcome, DesignRequest, SearchWindow, design_primers,
    design_primers_in_windows,
};
pub use error::{DesignError, ErrorCode};
pub use export::{export_primers, prune_results, read_primer_table};
pub use oracle::{
    CandidateResult, IncludedRegion, OracleError, OracleRecord, OracleRequest, PrimerOracle,
    PrimerSide,
};
pub use primer3::{Primer3Config, Primer3Oracle};
