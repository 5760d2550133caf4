//! Per-batch archive metrics, aggregated over the report archives.

use tracing::info;

use crate::archive::ArchiveHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    Verbose,
    Compact,
}

/// Snapshot of archive quality at a batch boundary. In `Compact` mode
/// the trailing fields are left `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    pub batch: usize,
    pub total_evaluations: usize,
    /// Max `obj_max` over the report archives; `None` while all are
    /// empty.
    pub best_objective: Option<f64>,
    /// Mean coverage over the report archives.
    pub coverage: f64,
    /// Sum of QD scores over the report archives.
    pub total_qd_score: f64,
    pub mean_objective: Option<f64>,
    pub normalized_qd_score: Option<f64>,
    pub total_cells: Option<usize>,
    pub filled_cells: Option<usize>,
}

impl StatsReport {
    pub fn gather(
        archives: &[ArchiveHandle],
        mode: ReportMode,
        total_evaluations: usize,
        batch: usize,
    ) -> Self {
        let mut best: Option<f64> = None;
        let mut coverage_sum = 0.0;
        let mut qd_sum = 0.0;
        let mut mean_sum = 0.0;
        let mut mean_count = 0usize;
        let mut norm_sum = 0.0;
        let mut cells = 0usize;
        let mut filled = 0usize;
        for h in archives {
            let a = h.borrow();
            if let Some(m) = a.obj_max() {
                best = Some(best.map_or(m, |b: f64| b.max(m)));
            }
            coverage_sum += a.coverage();
            qd_sum += a.qd_score();
            if let Some(m) = a.obj_mean() {
                mean_sum += m;
                mean_count += 1;
            }
            norm_sum += a.norm_qd_score();
            cells += a.cells();
            filled += a.len();
        }
        let n = archives.len().max(1) as f64;
        let verbose = mode == ReportMode::Verbose;
        Self {
            batch,
            total_evaluations,
            best_objective: best,
            coverage: coverage_sum / n,
            total_qd_score: qd_sum,
            mean_objective: if verbose && mean_count > 0 {
                Some(mean_sum / mean_count as f64)
            } else {
                None
            },
            normalized_qd_score: if verbose { Some(norm_sum / n) } else { None },
            total_cells: if verbose { Some(cells) } else { None },
            filled_cells: if verbose { Some(filled) } else { None },
        }
    }

    /// Log the report as a structured INFO record.
    pub fn emit(&self) {
        if let (Some(cells), Some(filled)) = (self.total_cells, self.filled_cells) {
            info!(
                batch = self.batch,
                total_evaluations = self.total_evaluations,
                best_objective = ?self.best_objective,
                coverage = self.coverage,
                total_qd_score = self.total_qd_score,
                mean_objective = ?self.mean_objective,
                normalized_qd_score = ?self.normalized_qd_score,
                total_cells = cells,
                filled_cells = filled,
                "qd progress"
            );
        } else {
            info!(
                batch = self.batch,
                total_evaluations = self.total_evaluations,
                best_objective = ?self.best_objective,
                coverage = self.coverage,
                total_qd_score = self.total_qd_score,
                "qd progress"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{shared, Archive, GridArchive};

    #[test]
    fn aggregates_across_archives() {
        let a = shared(GridArchive::new(2, &[10, 10], &[(0.0, 1.0), (0.0, 1.0)]).unwrap());
        let b = shared(GridArchive::new(2, &[5, 5], &[(0.0, 1.0), (0.0, 1.0)]).unwrap());
        a.borrow_mut().add(&[0.5, 0.5], 2.0, &[0.1, 0.1]).unwrap();
        b.borrow_mut().add(&[0.5, 0.5], 1.0, &[0.9, 0.9]).unwrap();

        let r = StatsReport::gather(&[a, b], ReportMode::Verbose, 2, 1);
        assert_eq!(r.best_objective, Some(2.0));
        assert_eq!(r.total_cells, Some(125));
        assert_eq!(r.filled_cells, Some(2));
        assert!((r.coverage - (0.01 + 0.04) / 2.0).abs() < 1e-12);
        assert_eq!(r.total_qd_score, 3.0);
        assert_eq!(r.mean_objective, Some(1.5));
    }

    #[test]
    fn compact_omits_verbose_fields() {
        let a = shared(GridArchive::new(2, &[10, 10], &[(0.0, 1.0), (0.0, 1.0)]).unwrap());
        let r = StatsReport::gather(&[a], ReportMode::Compact, 0, 0);
        assert!(r.best_objective.is_none());
        assert!(r.mean_objective.is_none());
        assert!(r.total_cells.is_none());
        assert!(r.filled_cells.is_none());
    }
}
