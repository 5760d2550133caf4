use rand::{Rng, RngCore};

use crate::archive::{AddResult, Archive, Elite};
use crate::errors::{QdError, Result};

/// Grid archive: measure space is cut into a uniform hyper-rectangular
/// grid and each cell keeps at most one elite.
///
/// Cell ids are 1-based and row-major over the per-axis bin indices,
/// so they are stable for a given grid configuration.
/// Replacement is threshold-based: a candidate enters
/// an occupied cell only when its objective exceeds the cell threshold
/// `tau`, which follows an EMA with coefficient `learning_rate` and is
/// floored at `threshold_min`.
pub struct GridArchive {
    solution_dim: usize,
    dims: Vec<usize>,
    // Interior bin edges per axis, `dims[i] - 1` of them.
    boundaries: Vec<Vec<f64>>,
    learning_rate: f64,
    threshold_min: f64,
    cells: usize,
    occupied: Vec<bool>,
    occupied_list: Vec<usize>,
    // D x C column-major store; cell slot c owns [c*D, (c+1)*D).
    solutions: Vec<f64>,
    objectives: Vec<f64>,
    measures: Vec<f64>,
    thresholds: Vec<f64>,
    // Best ever accepted per cell; diverges from the occupant only
    // when learning_rate < 1.
    elites: Vec<Option<Elite>>,
    qd_score_offset: f64,
}

impl GridArchive {
    /// Create an empty archive with `cells_per_measure[i]` bins over
    /// `measure_ranges[i]` along each measure axis, with the default
    /// `learning_rate = 1` and `threshold_min = -inf`.
    pub fn new(
        solution_dim: usize,
        cells_per_measure: &[usize],
        measure_ranges: &[(f64, f64)],
    ) -> Result<Self> {
        if solution_dim == 0 {
            return Err(QdError::InvalidArgument(
                "solution_dim must be positive".into(),
            ));
        }
        if cells_per_measure.is_empty() {
            return Err(QdError::InvalidArgument(
                "cells_per_measure must be nonempty".into(),
            ));
        }
        if cells_per_measure.len() != measure_ranges.len() {
            return Err(QdError::InvalidArgument(format!(
                "expected one measure range per axis, got {} ranges for {} axes",
                measure_ranges.len(),
                cells_per_measure.len()
            )));
        }
        let mut boundaries = Vec::with_capacity(cells_per_measure.len());
        let mut cells = 1usize;
        for (&k, &(lo, hi)) in cells_per_measure.iter().zip(measure_ranges) {
            if k == 0 {
                return Err(QdError::InvalidArgument(
                    "cells_per_measure entries must be positive".into(),
                ));
            }
            if !(lo < hi) {
                return Err(QdError::InvalidArgument(format!(
                    "inverted measure range ({lo}, {hi})"
                )));
            }
            let width = hi - lo;
            let edges: Vec<f64> = (1..k).map(|j| lo + width * j as f64 / k as f64).collect();
            boundaries.push(edges);
            cells *= k;
        }
        let measure_dim = cells_per_measure.len();
        Ok(Self {
            solution_dim,
            dims: cells_per_measure.to_vec(),
            boundaries,
            learning_rate: 1.0,
            threshold_min: f64::NEG_INFINITY,
            cells,
            occupied: vec![false; cells],
            occupied_list: Vec::new(),
            solutions: vec![0.0; solution_dim * cells],
            objectives: vec![f64::NEG_INFINITY; cells],
            measures: vec![0.0; measure_dim * cells],
            thresholds: vec![f64::NEG_INFINITY; cells],
            elites: vec![None; cells],
            qd_score_offset: 0.0,
        })
    }

    /// Set the threshold EMA coefficient and floor. Must be called
    /// before any `add`; resets all cell thresholds to the new floor.
    pub fn with_threshold(mut self, learning_rate: f64, threshold_min: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&learning_rate) {
            return Err(QdError::InvalidArgument(format!(
                "learning_rate must be in [0, 1], got {learning_rate}"
            )));
        }
        if threshold_min.is_nan() {
            return Err(QdError::InvalidArgument("threshold_min is NaN".into()));
        }
        self.learning_rate = learning_rate;
        self.threshold_min = threshold_min;
        for t in &mut self.thresholds {
            *t = threshold_min;
        }
        Ok(self)
    }

    /// 1-based cell id of the cell containing `measure`.
    ///
    /// Per axis, the bin is the first whose upper edge is at or above
    /// the coordinate; the outermost bins are half-open toward
    /// +/- infinity, so every finite measure maps to some cell.
    pub fn index_of(&self, measure: &[f64]) -> Result<usize> {
        if measure.len() != self.boundaries.len() {
            return Err(QdError::DimensionMismatch {
                what: "measure",
                expected: self.boundaries.len(),
                actual: measure.len(),
            });
        }
        let mut idx = 0usize;
        let mut stride = 1usize;
        for (i, (&mu, edges)) in measure.iter().zip(&self.boundaries).enumerate() {
            let bin = edges.partition_point(|&e| e < mu) + 1;
            idx += (bin - 1) * stride;
            stride *= self.dims[i];
        }
        Ok(idx + 1)
    }

    /// Acceptance threshold of `cell` (1-based id).
    pub fn threshold(&self, cell: usize) -> Option<f64> {
        self.slot(cell).map(|s| self.thresholds[s])
    }

    /// Whether `cell` (1-based id) currently holds an occupant.
    pub fn is_occupied(&self, cell: usize) -> bool {
        self.slot(cell).map(|s| self.occupied[s]).unwrap_or(false)
    }

    /// Running minimum objective ever passed to `add`, rejections
    /// included. Starts at 0 and never increases.
    pub fn qd_score_offset(&self) -> f64 {
        self.qd_score_offset
    }

    fn slot(&self, cell: usize) -> Option<usize> {
        if cell >= 1 && cell <= self.cells {
            Some(cell - 1)
        } else {
            None
        }
    }

    fn measure_dim_inner(&self) -> usize {
        self.boundaries.len()
    }

    fn occupant(&self, slot: usize) -> Elite {
        let d = self.solution_dim;
        let m = self.measure_dim_inner();
        Elite {
            cell: slot + 1,
            solution: self.solutions[slot * d..(slot + 1) * d].to_vec(),
            objective: self.objectives[slot],
            measure: self.measures[slot * m..(slot + 1) * m].to_vec(),
        }
    }

    fn store(&mut self, slot: usize, solution: &[f64], objective: f64, measure: &[f64]) {
        let d = self.solution_dim;
        let m = self.measure_dim_inner();
        self.solutions[slot * d..(slot + 1) * d].copy_from_slice(solution);
        self.measures[slot * m..(slot + 1) * m].copy_from_slice(measure);
        self.objectives[slot] = objective;
    }
}

impl Archive for GridArchive {
    fn add(&mut self, solution: &[f64], objective: f64, measure: &[f64]) -> Result<AddResult> {
        if solution.len() != self.solution_dim {
            return Err(QdError::DimensionMismatch {
                what: "solution",
                expected: self.solution_dim,
                actual: solution.len(),
            });
        }
        // The offset tracks every candidate seen, rejected or not, so
        // the QD score stays non-negative for pessimistic objectives.
        self.qd_score_offset = self.qd_score_offset.min(objective);
        let cell = self.index_of(measure)?;
        let slot = cell - 1;

        if !self.occupied[slot] {
            self.occupied[slot] = true;
            self.occupied_list.push(slot);
            self.store(slot, solution, objective, measure);
            self.thresholds[slot] = self.threshold_min.max(objective);
            self.elites[slot] = Some(self.occupant(slot));
            return Ok(AddResult::New(objective));
        }

        let tau = self.thresholds[slot];
        if objective > tau {
            // Improvement is measured against the displaced occupant,
            // not against the threshold.
            let improvement = objective - self.objectives[slot];
            self.store(slot, solution, objective, measure);
            let alpha = self.learning_rate;
            self.thresholds[slot] = self
                .threshold_min
                .max((1.0 - alpha) * tau + alpha * objective);
            let best = self.elites[slot]
                .as_ref()
                .map(|e| e.objective)
                .unwrap_or(f64::NEG_INFINITY);
            if objective > best {
                self.elites[slot] = Some(self.occupant(slot));
            }
            Ok(AddResult::Improve(improvement))
        } else {
            Ok(AddResult::NotAdded(objective - tau))
        }
    }

    fn clear(&mut self) {
        for &slot in &self.occupied_list {
            self.occupied[slot] = false;
            self.objectives[slot] = f64::NEG_INFINITY;
            self.elites[slot] = None;
        }
        self.occupied_list.clear();
        for t in &mut self.thresholds {
            *t = self.threshold_min;
        }
        self.qd_score_offset = 0.0;
    }

    fn get(&self, measure: &[f64]) -> Result<Option<Elite>> {
        let slot = self.index_of(measure)? - 1;
        if self.occupied[slot] {
            Ok(Some(self.occupant(slot)))
        } else {
            Ok(None)
        }
    }

    fn get_elite(&self, measure: &[f64]) -> Result<Option<Elite>> {
        let slot = self.index_of(measure)? - 1;
        Ok(self.elites[slot].clone())
    }

    fn elites(&self) -> Vec<Elite> {
        self.occupied_list
            .iter()
            .filter_map(|&slot| self.elites[slot].clone())
            .collect()
    }

    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> Result<Vec<usize>> {
        if self.occupied_list.is_empty() {
            return Err(QdError::EmptyArchive);
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let pick = rng.gen_range(0..self.occupied_list.len());
            out.push(self.occupied_list[pick] + 1);
        }
        Ok(out)
    }

    fn solution(&self, cell: usize) -> Option<Vec<f64>> {
        let slot = self.slot(cell)?;
        if !self.occupied[slot] {
            return None;
        }
        let d = self.solution_dim;
        Some(self.solutions[slot * d..(slot + 1) * d].to_vec())
    }

    fn len(&self) -> usize {
        self.occupied_list.len()
    }

    fn solution_dim(&self) -> usize {
        self.solution_dim
    }

    fn measure_dim(&self) -> usize {
        self.boundaries.len()
    }

    fn cells(&self) -> usize {
        self.cells
    }

    fn coverage(&self) -> f64 {
        self.occupied_list.len() as f64 / self.cells as f64
    }

    fn obj_max(&self) -> Option<f64> {
        self.occupied_list
            .iter()
            .map(|&s| self.objectives[s])
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }

    fn obj_mean(&self) -> Option<f64> {
        if self.occupied_list.is_empty() {
            return None;
        }
        let sum: f64 = self.occupied_list.iter().map(|&s| self.objectives[s]).sum();
        Some(sum / self.occupied_list.len() as f64)
    }

    fn qd_score(&self) -> f64 {
        self.occupied_list
            .iter()
            .map(|&s| self.objectives[s] - self.qd_score_offset)
            .sum()
    }

    fn norm_qd_score(&self) -> f64 {
        self.qd_score() / self.cells as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid() -> GridArchive {
        GridArchive::new(2, &[10, 10], &[(0.0, 1.0), (0.0, 1.0)]).unwrap()
    }

    #[test]
    fn indexing_known_points() {
        let a = unit_grid();
        assert_eq!(a.index_of(&[0.05, 0.05]).unwrap(), 1);
        assert_eq!(a.index_of(&[0.95, 0.95]).unwrap(), 100);
        assert_eq!(a.index_of(&[0.25, 0.55]).unwrap(), 53);
    }

    #[test]
    fn outer_bins_are_half_open() {
        let a = unit_grid();
        assert_eq!(a.index_of(&[-5.0, -5.0]).unwrap(), 1);
        assert_eq!(a.index_of(&[5.0, 5.0]).unwrap(), 100);
    }

    #[test]
    fn add_then_retrieve() {
        let mut a = unit_grid();
        let r = a.add(&[0.5, 0.5], 1.0, &[0.3, 0.3]).unwrap();
        assert_eq!(r, AddResult::New(1.0));
        let e = a.get(&[0.3, 0.3]).unwrap().unwrap();
        assert_eq!(e.objective, 1.0);
        assert_eq!(e.solution, vec![0.5, 0.5]);

        let r = a.add(&[0.7, 0.7], 2.0, &[0.3, 0.3]).unwrap();
        assert_eq!(r, AddResult::Improve(1.0));

        // tau is the max accepted objective when learning_rate = 1.
        let cell = a.index_of(&[0.3, 0.3]).unwrap();
        assert_eq!(a.threshold(cell), Some(2.0));
        let r = a.add(&[0.1, 0.1], 0.5, &[0.3, 0.3]).unwrap();
        assert_eq!(r, AddResult::NotAdded(0.5 - 2.0));
    }

    #[test]
    fn threshold_blends_below_one() {
        let mut a = GridArchive::new(2, &[10, 10], &[(0.0, 1.0), (0.0, 1.0)])
            .unwrap()
            .with_threshold(0.5, 0.0)
            .unwrap();
        a.add(&[0.5, 0.5], 1.0, &[0.3, 0.3]).unwrap();
        let cell = a.index_of(&[0.3, 0.3]).unwrap();
        assert_eq!(a.threshold(cell), Some(1.0));
        a.add(&[0.5, 0.5], 2.0, &[0.3, 0.3]).unwrap();
        // (1 - 0.5) * 1.0 + 0.5 * 2.0
        assert_eq!(a.threshold(cell), Some(1.5));
        // Accepted over tau = 1.5 but weaker than the occupant: the
        // elite keeps the best ever seen.
        a.add(&[0.9, 0.9], 1.8, &[0.3, 0.3]).unwrap();
        assert_eq!(a.get(&[0.3, 0.3]).unwrap().unwrap().objective, 1.8);
        assert_eq!(a.get_elite(&[0.3, 0.3]).unwrap().unwrap().objective, 2.0);
    }

    #[test]
    fn offset_tracks_rejections() {
        let mut a = unit_grid();
        a.add(&[0.5, 0.5], 1.0, &[0.3, 0.3]).unwrap();
        a.add(&[0.5, 0.5], -3.0, &[0.3, 0.3]).unwrap();
        assert_eq!(a.qd_score_offset(), -3.0);
        assert_eq!(a.qd_score(), 1.0 - (-3.0));
    }

    #[test]
    fn clear_resets_everything() {
        let mut a = unit_grid();
        a.add(&[0.5, 0.5], -1.0, &[0.3, 0.3]).unwrap();
        a.clear();
        assert!(a.is_empty());
        assert_eq!(a.coverage(), 0.0);
        assert_eq!(a.qd_score_offset(), 0.0);
        assert!(a.get(&[0.3, 0.3]).unwrap().is_none());
        assert!(a.get_elite(&[0.3, 0.3]).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_construction() {
        assert!(GridArchive::new(0, &[10], &[(0.0, 1.0)]).is_err());
        assert!(GridArchive::new(2, &[10, 0], &[(0.0, 1.0), (0.0, 1.0)]).is_err());
        assert!(GridArchive::new(2, &[10, 10], &[(1.0, 0.0), (0.0, 1.0)]).is_err());
        assert!(GridArchive::new(2, &[10], &[(0.0, 1.0), (0.0, 1.0)]).is_err());
    }

    #[test]
    fn dimension_mismatch_fails() {
        let mut a = unit_grid();
        assert!(matches!(
            a.add(&[0.5], 1.0, &[0.3, 0.3]),
            Err(QdError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            a.add(&[0.5, 0.5], 1.0, &[0.3]),
            Err(QdError::DimensionMismatch { .. })
        ));
    }
}
