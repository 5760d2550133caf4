//! Schedulers: drive ask/evaluate/tell loops over a pool of emitters.

use rayon::prelude::*;

use crate::archive::ArchiveHandle;
use crate::emitter::Emitter;
use crate::errors::{QdError, Result};

mod bandit;
mod round_robin;

pub use bandit::{BanditScheduler, BanditStrategy};
pub use round_robin::RoundRobinScheduler;

/// Record returned by the user objective: a scalar to maximize plus
/// the behavioral measure of the evaluated solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub objective: f64,
    pub measure: Vec<f64>,
}

pub(crate) fn default_batch_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// Evaluate one asked batch, optionally fanning out over the rayon
// pool. Collection preserves candidate order either way, so parallel
// and sequential runs agree for deterministic objectives. Workers see
// only the solution vectors: emitter RNGs and archives stay on the
// orchestrator thread.
pub(crate) fn evaluate_batch<F>(
    objective: &F,
    solutions: &[Vec<f64>],
    parallel: bool,
) -> (Vec<f64>, Vec<Vec<f64>>)
where
    F: Fn(&[f64]) -> Evaluation + Sync,
{
    let evals: Vec<Evaluation> = if parallel {
        solutions.par_iter().map(|x| objective(x)).collect()
    } else {
        solutions.iter().map(|x| objective(x)).collect()
    };
    evals.into_iter().map(|e| (e.objective, e.measure)).unzip()
}

// Shape check on the callback, run once before any counted
// evaluation: probe with a zero vector and verify the measure length.
pub(crate) fn validate_objective<F>(objective: &F, solution_dim: usize, measure_dim: usize) -> Result<()>
where
    F: Fn(&[f64]) -> Evaluation + Sync,
{
    let probe = objective(&vec![0.0; solution_dim]);
    if probe.measure.len() != measure_dim {
        return Err(QdError::InvalidObjective(format!(
            "measure has length {}, archives expect {}",
            probe.measure.len(),
            measure_dim
        )));
    }
    Ok(())
}

// Pool validation shared by both schedulers: nonempty, and every
// emitter agrees on solution and measure dimensions.
pub(crate) fn validate_pool(emitters: &[Box<dyn Emitter>]) -> Result<(usize, usize)> {
    let first = emitters
        .first()
        .ok_or_else(|| QdError::InvalidArgument("emitter list is empty".into()))?;
    let solution_dim = first.solution_dim();
    let measure_dim = first.archive().borrow().measure_dim();
    for e in emitters {
        if e.solution_dim() != solution_dim {
            return Err(QdError::InvalidArgument(format!(
                "mismatched emitter dims: {} vs {}",
                e.solution_dim(),
                solution_dim
            )));
        }
        if e.archive().borrow().measure_dim() != measure_dim {
            return Err(QdError::InvalidArgument(format!(
                "mismatched measure dims: {} vs {}",
                e.archive().borrow().measure_dim(),
                measure_dim
            )));
        }
    }
    Ok((solution_dim, measure_dim))
}

// The default report set: every distinct archive referenced by the
// pool, deduplicated by handle identity.
pub(crate) fn distinct_archives(emitters: &[Box<dyn Emitter>]) -> Vec<ArchiveHandle> {
    let mut out: Vec<ArchiveHandle> = Vec::new();
    for e in emitters {
        let h = e.archive();
        if !out.iter().any(|seen| std::rc::Rc::ptr_eq(seen, &h)) {
            out.push(h);
        }
    }
    out
}
