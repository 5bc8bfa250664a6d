use crate::error::DesignError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// Float steps of 0.2 do not add up to exact multiples; anything this close to a bound is at it.
const FLOAT_TOLERANCE: f64 = 1e-9;

/// Relaxation order used when the caller does not supply one.
///
/// GC-percent weight is loosened first, then the GC clamp, then the melting
/// temperature window, then the primer size window, and the homopolymer limit last.
pub const DEFAULT_RELAX_ORDER: [RelaxDimension; 5] = [
    RelaxDimension::GcPercentWeight,
    RelaxDimension::GcClamp,
    RelaxDimension::Temperature,
    RelaxDimension::Size,
    RelaxDimension::PolyX,
];

/// One relaxable axis of a `ConstraintSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelaxDimension {
    #[serde(rename = "gcp")]
    GcPercentWeight,
    #[serde(rename = "gcc")]
    GcClamp,
    #[serde(rename = "temps")]
    Temperature,
    #[serde(rename = "sizes")]
    Size,
    #[serde(rename = "poly_x")]
    PolyX,
}

impl RelaxDimension {
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::GcPercentWeight => "gcp",
            Self::GcClamp => "gcc",
            Self::Temperature => "temps",
            Self::Size => "sizes",
            Self::PolyX => "poly_x",
        }
    }
}

impl fmt::Display for RelaxDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl FromStr for RelaxDimension {
    type Err = DesignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcp" => Ok(Self::GcPercentWeight),
            "gcc" => Ok(Self::GcClamp),
            "temps" => Ok(Self::Temperature),
            "sizes" => Ok(Self::Size),
            "poly_x" => Ok(Self::PolyX),
            other => Err(DesignError::InvalidInput(format!(
                "Unknown relaxation dimension '{other}', \
                 expected one of gcp, gcc, temps, sizes, poly_x"
            ))),
        }
    }
}

/// A {min, opt, max} triple as Primer3 takes them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange<T> {
    pub min: T,
    pub opt: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> ValueRange<T> {
    pub fn new(min: T, opt: T, max: T) -> Self {
        Self { min, opt, max }
    }

    pub fn is_sorted(&self) -> bool {
        self.min <= self.opt && self.opt <= self.max
    }

    /// Copy with the three values in ascending order.
    pub fn sorted(&self) -> Self {
        let mut values = [self.min, self.opt, self.max];
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        Self {
            min: values[0],
            opt: values[1],
            max: values[2],
        }
    }
}

/// The parameters handed to the oracle on every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSet {
    pub size: ValueRange<u32>,
    pub tm: ValueRange<f64>,
    pub gc_clamp: u32,
    pub gc_percent_weight: f64,
    pub max_poly_x: u32,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self {
            size: ValueRange::new(22, 23, 25),
            tm: ValueRange::new(55.0, 57.0, 60.0),
            gc_clamp: 2,
            gc_percent_weight: 1.0,
            max_poly_x: 2,
        }
    }
}

impl ConstraintSet {
    /// Copy with the size and temperature triples sorted ascending.
    pub fn sorted(&self) -> Self {
        Self {
            size: self.size.sorted(),
            tm: self.tm.sorted(),
            ..self.clone()
        }
    }

    /// Loosens `dimension` by one step toward its bound in `limits`.
    /// Returns false when the dimension is already at its bound.
    pub fn relax(&mut self, dimension: RelaxDimension, limits: &RelaxationLimits) -> bool {
        match dimension {
            RelaxDimension::GcPercentWeight => {
                match step_down(
                    self.gc_percent_weight,
                    limits.gc_percent_weight_step,
                    limits.gc_percent_weight_min,
                ) {
                    Some(next) => {
                        self.gc_percent_weight = next;
                        true
                    }
                    None => false,
                }
            }
            RelaxDimension::GcClamp => {
                if self.gc_clamp > limits.gc_clamp_min {
                    self.gc_clamp -= 1;
                    true
                } else {
                    false
                }
            }
            RelaxDimension::PolyX => {
                if self.max_poly_x < limits.max_poly_x_limit {
                    self.max_poly_x += 1;
                    true
                } else {
                    false
                }
            }
            RelaxDimension::Temperature => {
                let mut changed = false;
                if let Some(next) = step_down(self.tm.min, 1.0, limits.tm_min) {
                    self.tm.min = next;
                    changed = true;
                }
                if self.tm.max < limits.tm_max - FLOAT_TOLERANCE {
                    self.tm.max = (self.tm.max + 1.0).min(limits.tm_max);
                    changed = true;
                }
                changed
            }
            RelaxDimension::Size => {
                let mut changed = false;
                if self.size.min > limits.size_min {
                    self.size.min -= 1;
                    changed = true;
                }
                if self.size.max < limits.size_max {
                    self.size.max += 1;
                    changed = true;
                }
                changed
            }
        }
    }

    /// True when no dimension in `order` can be relaxed any further.
    pub fn is_exhausted(&self, order: &[RelaxDimension], limits: &RelaxationLimits) -> bool {
        order.iter().all(|dimension| {
            let mut next = self.clone();
            !next.relax(*dimension, limits)
        })
    }
}

fn step_down(value: f64, step: f64, floor: f64) -> Option<f64> {
    if value - floor <= FLOAT_TOLERANCE {
        return None;
    }
    let next = value - step;
    if next - floor <= FLOAT_TOLERANCE {
        Some(floor)
    } else {
        Some(next)
    }
}

/// Floors and ceilings past which the scheduler will not relax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxationLimits {
    pub size_min: u32,
    pub size_max: u32,
    pub tm_min: f64,
    pub tm_max: f64,
    pub gc_clamp_min: u32,
    pub gc_percent_weight_min: f64,
    pub gc_percent_weight_step: f64,
    pub max_poly_x_limit: u32,
}

impl Default for RelaxationLimits {
    fn default() -> Self {
        Self {
            size_min: 18,
            size_max: 30,
            tm_min: 50.0,
            tm_max: 65.0,
            gc_clamp_min: 0,
            gc_percent_weight_min: 0.0,
            gc_percent_weight_step: 0.2,
            max_poly_x_limit: 8,
        }
    }
}

impl RelaxationLimits {
    pub fn validate(&self) -> Result<(), DesignError> {
        if self.size_min > self.size_max {
            return Err(DesignError::InvalidInput(format!(
                "Primer size floor {} exceeds ceiling {}",
                self.size_min, self.size_max
            )));
        }
        if !(self.tm_min <= self.tm_max) {
            return Err(DesignError::InvalidInput(format!(
                "Melting temperature floor {} exceeds ceiling {}",
                self.tm_min, self.tm_max
            )));
        }
        if !(self.gc_percent_weight_step > 0.0) {
            return Err(DesignError::InvalidInput(
                "GC percent weight step must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
