//! Archives: collections of elites partitioned over measure space.

use std::cell::RefCell;
use std::rc::Rc;

use rand::RngCore;

use crate::errors::Result;

mod grid;
mod pareto;

pub use grid::GridArchive;
pub use pareto::ParetoArchive;

/// The best solution recorded for one archive cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Elite {
    /// Cell id. Grid cell ids are 1-based (the first cell along every
    /// axis is bin 1); for a Pareto archive this is the member's
    /// current position in the front.
    pub cell: usize,
    pub solution: Vec<f64>,
    pub objective: f64,
    pub measure: Vec<f64>,
}

/// Outcome of [`Archive::add`].
///
/// Three variants carry the same payload type with different meaning:
/// `New` and `Improve` report the accepted objective and the
/// improvement over the displaced occupant respectively, `NotAdded`
/// reports the (non-positive, for a grid) shortfall against the
/// cell's acceptance threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddResult {
    New(f64),
    Improve(f64),
    NotAdded(f64),
}

impl AddResult {
    pub fn value(&self) -> f64 {
        match *self {
            AddResult::New(v) | AddResult::Improve(v) | AddResult::NotAdded(v) => v,
        }
    }

    /// True for `New` and `Improve`.
    pub fn was_added(&self) -> bool {
        !matches!(self, AddResult::NotAdded(_))
    }

    pub fn is_new(&self) -> bool {
        matches!(self, AddResult::New(_))
    }
}

/// Capability set shared by all archive geometries.
///
/// Object-safe so emitters and schedulers can hold heterogeneous
/// archives behind an [`ArchiveHandle`]; `sample` therefore takes a
/// dynamic RNG instead of a generic one.
pub trait Archive {
    /// Insert a candidate. Fails only on dimension mismatch;
    /// rejection is the normal `NotAdded` result.
    fn add(&mut self, solution: &[f64], objective: f64, measure: &[f64]) -> Result<AddResult>;

    /// Reset to the empty state.
    fn clear(&mut self);

    /// Current occupant of the cell containing `measure`, if any.
    fn get(&self, measure: &[f64]) -> Result<Option<Elite>>;

    /// Best solution *ever accepted* into the cell containing
    /// `measure`. Differs from [`Archive::get`] only when a
    /// learning rate below 1 lets a weaker candidate displace the
    /// occupant.
    fn get_elite(&self, measure: &[f64]) -> Result<Option<Elite>>;

    /// All best-ever elites, one per occupied cell.
    fn elites(&self) -> Vec<Elite>;

    /// Draw `n` occupied cell ids uniformly with replacement.
    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> Result<Vec<usize>>;

    /// Solution stored in `cell`, if occupied.
    fn solution(&self, cell: usize) -> Option<Vec<f64>>;

    /// Number of occupied cells.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn solution_dim(&self) -> usize;

    fn measure_dim(&self) -> usize;

    /// Total cell count.
    fn cells(&self) -> usize;

    /// Occupied fraction, in `[0, 1]`.
    fn coverage(&self) -> f64;

    /// Max objective over occupied cells; `None` when empty.
    fn obj_max(&self) -> Option<f64>;

    /// Mean objective over occupied cells; `None` when empty.
    fn obj_mean(&self) -> Option<f64>;

    /// Sum of `objective - qd_score_offset` over occupied cells.
    fn qd_score(&self) -> f64;

    /// QD score divided by the total cell count.
    fn norm_qd_score(&self) -> f64;
}

/// Shared handle to an archive.
///
/// Emitters hold clones of one handle; all mutation happens through
/// `tell` on the orchestrator thread, so interior mutability without
/// locking is sufficient. Handle identity (`Rc::ptr_eq`) is what
/// makes two emitters "share" an archive.
pub type ArchiveHandle = Rc<RefCell<dyn Archive>>;

/// Wrap an archive in a shareable handle.
pub fn shared<A: Archive + 'static>(archive: A) -> ArchiveHandle {
    Rc::new(RefCell::new(archive))
}
