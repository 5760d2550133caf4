use rand::{Rng, RngCore};

use crate::archive::{AddResult, Archive, Elite};
use crate::errors::{QdError, Result};

/// Pareto archive: the non-dominated front over the concatenated
/// tuple `(objective, measure[0], ..., measure[m-1])`, all maximized.
///
/// There is no fixed geometry; "cells" are the current front members,
/// addressed by 1-based position. Positions shift as dominated points
/// are evicted, so ids are only stable between mutations.
pub struct ParetoArchive {
    solution_dim: usize,
    measure_dim: usize,
    members: Vec<Member>,
    qd_score_offset: f64,
}

struct Member {
    solution: Vec<f64>,
    objective: f64,
    measure: Vec<f64>,
}

impl Member {
    // a dominates b iff a >= b on every component of
    // (objective, measure...) and is strictly greater on at least one.
    fn dominates(&self, objective: f64, measure: &[f64]) -> bool {
        let mut strict = self.objective > objective;
        if self.objective < objective {
            return false;
        }
        for (&a, &b) in self.measure.iter().zip(measure) {
            if a < b {
                return false;
            }
            strict |= a > b;
        }
        strict
    }

    fn dominated_by(&self, objective: f64, measure: &[f64]) -> bool {
        let mut strict = objective > self.objective;
        if objective < self.objective {
            return false;
        }
        for (&a, &b) in self.measure.iter().zip(measure) {
            if b < a {
                return false;
            }
            strict |= b > a;
        }
        strict
    }

    fn elite(&self, position: usize) -> Elite {
        Elite {
            cell: position + 1,
            solution: self.solution.clone(),
            objective: self.objective,
            measure: self.measure.clone(),
        }
    }
}

impl ParetoArchive {
    pub fn new(solution_dim: usize, measure_dim: usize) -> Result<Self> {
        if solution_dim == 0 || measure_dim == 0 {
            return Err(QdError::InvalidArgument(
                "solution_dim and measure_dim must be positive".into(),
            ));
        }
        Ok(Self {
            solution_dim,
            measure_dim,
            members: Vec::new(),
            qd_score_offset: 0.0,
        })
    }

    pub fn qd_score_offset(&self) -> f64 {
        self.qd_score_offset
    }

    fn check_dims(&self, solution: &[f64], measure: &[f64]) -> Result<()> {
        if solution.len() != self.solution_dim {
            return Err(QdError::DimensionMismatch {
                what: "solution",
                expected: self.solution_dim,
                actual: solution.len(),
            });
        }
        if measure.len() != self.measure_dim {
            return Err(QdError::DimensionMismatch {
                what: "measure",
                expected: self.measure_dim,
                actual: measure.len(),
            });
        }
        Ok(())
    }

    // Front member whose measure is closest in squared Euclidean
    // distance.
    fn nearest(&self, measure: &[f64]) -> Option<usize> {
        let mut best = None;
        let mut best_d = f64::INFINITY;
        for (i, m) in self.members.iter().enumerate() {
            let d: f64 = m
                .measure
                .iter()
                .zip(measure)
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum();
            if d < best_d {
                best_d = d;
                best = Some(i);
            }
        }
        best
    }
}

impl Archive for ParetoArchive {
    fn add(&mut self, solution: &[f64], objective: f64, measure: &[f64]) -> Result<AddResult> {
        self.check_dims(solution, measure)?;
        self.qd_score_offset = self.qd_score_offset.min(objective);

        if self
            .members
            .iter()
            .any(|m| m.dominates(objective, measure))
        {
            return Ok(AddResult::NotAdded(objective));
        }

        let before = self.members.len();
        self.members.retain(|m| !m.dominated_by(objective, measure));
        let evicted = before - self.members.len();
        self.members.push(Member {
            solution: solution.to_vec(),
            objective,
            measure: measure.to_vec(),
        });
        if evicted > 0 {
            Ok(AddResult::Improve(objective))
        } else {
            Ok(AddResult::New(objective))
        }
    }

    fn clear(&mut self) {
        self.members.clear();
        self.qd_score_offset = 0.0;
    }

    fn get(&self, measure: &[f64]) -> Result<Option<Elite>> {
        if measure.len() != self.measure_dim {
            return Err(QdError::DimensionMismatch {
                what: "measure",
                expected: self.measure_dim,
                actual: measure.len(),
            });
        }
        Ok(self.nearest(measure).map(|i| self.members[i].elite(i)))
    }

    fn get_elite(&self, measure: &[f64]) -> Result<Option<Elite>> {
        // No threshold bookkeeping on a front: members are already the
        // best ever kept.
        self.get(measure)
    }

    fn elites(&self) -> Vec<Elite> {
        self.members
            .iter()
            .enumerate()
            .map(|(i, m)| m.elite(i))
            .collect()
    }

    fn sample(&self, n: usize, rng: &mut dyn RngCore) -> Result<Vec<usize>> {
        if self.members.is_empty() {
            return Err(QdError::EmptyArchive);
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(rng.gen_range(0..self.members.len()) + 1);
        }
        Ok(out)
    }

    fn solution(&self, cell: usize) -> Option<Vec<f64>> {
        if cell >= 1 && cell <= self.members.len() {
            Some(self.members[cell - 1].solution.clone())
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn solution_dim(&self) -> usize {
        self.solution_dim
    }

    fn measure_dim(&self) -> usize {
        self.measure_dim
    }

    fn cells(&self) -> usize {
        self.members.len()
    }

    fn coverage(&self) -> f64 {
        if self.members.is_empty() {
            0.0
        } else {
            1.0
        }
    }

    fn obj_max(&self) -> Option<f64> {
        self.members
            .iter()
            .map(|m| m.objective)
            .fold(None, |acc, v| Some(acc.map_or(v, |b: f64| b.max(v))))
    }

    fn obj_mean(&self) -> Option<f64> {
        if self.members.is_empty() {
            return None;
        }
        let sum: f64 = self.members.iter().map(|m| m.objective).sum();
        Some(sum / self.members.len() as f64)
    }

    fn qd_score(&self) -> f64 {
        self.members
            .iter()
            .map(|m| m.objective - self.qd_score_offset)
            .sum()
    }

    fn norm_qd_score(&self) -> f64 {
        if self.members.is_empty() {
            0.0
        } else {
            self.qd_score() / self.members.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front() -> ParetoArchive {
        ParetoArchive::new(2, 2).unwrap()
    }

    #[test]
    fn dominated_candidate_is_rejected() {
        let mut a = front();
        assert_eq!(
            a.add(&[0.0, 0.0], 1.0, &[1.0, 1.0]).unwrap(),
            AddResult::New(1.0)
        );
        assert_eq!(
            a.add(&[0.1, 0.1], 0.5, &[0.5, 0.5]).unwrap(),
            AddResult::NotAdded(0.5)
        );
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn dominating_candidate_evicts() {
        let mut a = front();
        a.add(&[0.0, 0.0], 1.0, &[1.0, 1.0]).unwrap();
        a.add(&[0.0, 0.0], 0.5, &[2.0, 0.0]).unwrap();
        assert_eq!(a.len(), 2);
        // Dominates the first member only.
        assert_eq!(
            a.add(&[0.2, 0.2], 1.5, &[1.5, 1.5]).unwrap(),
            AddResult::Improve(1.5)
        );
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn incomparable_points_coexist() {
        let mut a = front();
        a.add(&[0.0, 0.0], 1.0, &[0.0, 1.0]).unwrap();
        a.add(&[0.0, 0.0], 1.0, &[1.0, 0.0]).unwrap();
        a.add(&[0.0, 0.0], 0.0, &[2.0, 2.0]).unwrap();
        assert_eq!(a.len(), 3);
        // No stored point may dominate another.
        let elites = a.elites();
        for x in &elites {
            for y in &elites {
                let dominates = x.objective >= y.objective
                    && x.measure.iter().zip(&y.measure).all(|(&a, &b)| a >= b)
                    && (x.objective > y.objective
                        || x.measure.iter().zip(&y.measure).any(|(&a, &b)| a > b));
                assert!(!dominates || std::ptr::eq(x, y));
            }
        }
    }

    #[test]
    fn get_returns_nearest_measure() {
        let mut a = front();
        a.add(&[1.0, 1.0], 1.0, &[0.0, 0.0]).unwrap();
        a.add(&[2.0, 2.0], 1.0, &[5.0, 5.0]).unwrap();
        let e = a.get(&[4.0, 4.0]).unwrap().unwrap();
        assert_eq!(e.solution, vec![2.0, 2.0]);
    }
}
