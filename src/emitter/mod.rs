//! Emitters: ask/tell candidate generators bound to one archive.

use crate::archive::ArchiveHandle;
use crate::errors::{QdError, Result};

mod cmaes;
mod gaussian;
mod isoline;

pub use cmaes::{CmaEsEmitter, RankingPolicy, Selection};
pub use gaussian::GaussianEmitter;
pub use isoline::IsoLineEmitter;

/// Capability set of an emitter.
///
/// `ask` produces a batch of candidate solutions; `tell` hands back
/// their evaluations and inserts them into the emitter's archive.
/// Both run on the orchestrator thread; an emitter's RNG is never
/// touched during parallel evaluation.
pub trait Emitter {
    fn ask(&mut self, n: usize) -> Vec<Vec<f64>>;

    /// Consume one evaluated batch. Fails only on validation
    /// (mismatched batch lengths or vector dimensions); archive
    /// rejections are normal results.
    fn tell(
        &mut self,
        solutions: &[Vec<f64>],
        objectives: &[f64],
        measures: &[Vec<f64>],
    ) -> Result<()>;

    /// Handle to the archive this emitter inserts into.
    fn archive(&self) -> ArchiveHandle;

    fn solution_dim(&self) -> usize;
}

/// Per-dimension standard deviation, scalar form broadcast to the
/// solution dimension.
#[derive(Debug, Clone)]
pub enum Sigma {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Sigma {
    pub(crate) fn resolve(&self, dim: usize) -> Result<Vec<f64>> {
        let v = match self {
            Sigma::Scalar(s) => vec![*s; dim],
            Sigma::Vector(v) => {
                if v.len() != dim {
                    return Err(QdError::DimensionMismatch {
                        what: "sigma",
                        expected: dim,
                        actual: v.len(),
                    });
                }
                v.clone()
            }
        };
        if v.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(QdError::InvalidArgument(
                "sigma entries must be positive and finite".into(),
            ));
        }
        Ok(v)
    }
}

impl From<f64> for Sigma {
    fn from(s: f64) -> Self {
        Sigma::Scalar(s)
    }
}

impl From<Vec<f64>> for Sigma {
    fn from(v: Vec<f64>) -> Self {
        Sigma::Vector(v)
    }
}

impl From<&[f64]> for Sigma {
    fn from(v: &[f64]) -> Self {
        Sigma::Vector(v.to_vec())
    }
}

/// Initial point, scalar form broadcast to the solution dimension.
#[derive(Debug, Clone)]
pub enum Init {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Init {
    pub(crate) fn resolve(&self, dim: usize) -> Result<Vec<f64>> {
        match self {
            Init::Scalar(x) => Ok(vec![*x; dim]),
            Init::Vector(v) => {
                if v.len() != dim {
                    return Err(QdError::DimensionMismatch {
                        what: "x0",
                        expected: dim,
                        actual: v.len(),
                    });
                }
                Ok(v.clone())
            }
        }
    }
}

impl From<f64> for Init {
    fn from(x: f64) -> Self {
        Init::Scalar(x)
    }
}

impl From<Vec<f64>> for Init {
    fn from(v: Vec<f64>) -> Self {
        Init::Vector(v)
    }
}

impl From<&[f64]> for Init {
    fn from(v: &[f64]) -> Self {
        Init::Vector(v.to_vec())
    }
}

/// Box constraints on emitted solutions.
#[derive(Debug, Clone, Default)]
pub enum Bounds {
    /// Unbounded in every dimension.
    #[default]
    None,
    /// One `(lower, upper)` pair broadcast to every dimension.
    Uniform(f64, f64),
    /// One pair per dimension.
    PerDim(Vec<(f64, f64)>),
}

impl Bounds {
    pub(crate) fn resolve(&self, dim: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let pairs: Vec<(f64, f64)> = match self {
            Bounds::None => vec![(f64::NEG_INFINITY, f64::INFINITY); dim],
            Bounds::Uniform(lo, hi) => vec![(*lo, *hi); dim],
            Bounds::PerDim(v) => {
                if v.len() != dim {
                    return Err(QdError::DimensionMismatch {
                        what: "bounds",
                        expected: dim,
                        actual: v.len(),
                    });
                }
                v.clone()
            }
        };
        for &(lo, hi) in &pairs {
            if !(lo < hi) {
                return Err(QdError::InvalidArgument(format!(
                    "inverted bound ({lo}, {hi})"
                )));
            }
        }
        Ok(pairs.into_iter().unzip())
    }
}

// Componentwise box projection of one candidate.
pub(crate) fn clamp_to(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for i in 0..x.len() {
        if x[i] < lower[i] {
            x[i] = lower[i];
        }
        if x[i] > upper[i] {
            x[i] = upper[i];
        }
    }
}

pub(crate) fn check_batch(
    solutions: &[Vec<f64>],
    objectives: &[f64],
    measures: &[Vec<f64>],
) -> Result<()> {
    if solutions.len() != objectives.len() || solutions.len() != measures.len() {
        return Err(QdError::InvalidArgument(format!(
            "mismatched batch: {} solutions, {} objectives, {} measures",
            solutions.len(),
            objectives.len(),
            measures.len()
        )));
    }
    Ok(())
}
