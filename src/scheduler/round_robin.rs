use crate::archive::ArchiveHandle;
use crate::emitter::Emitter;
use crate::errors::{QdError, Result};
use crate::scheduler::{
    default_batch_size, distinct_archives, evaluate_batch, validate_objective, validate_pool,
    Evaluation,
};
use crate::stats::{ReportMode, StatsReport};

/// Cycles through the emitter list, one emitter per batch.
pub struct RoundRobinScheduler {
    emitters: Vec<Box<dyn Emitter>>,
    solution_dim: usize,
    measure_dim: usize,
    batch_size: usize,
    stats_frequency: usize,
    report_mode: ReportMode,
    report_archives: Vec<ArchiveHandle>,
    show_progress: bool,
    total_evaluations: usize,
    batches: usize,
    last_report: Option<StatsReport>,
}

impl RoundRobinScheduler {
    /// Defaults: batch size = host CPU count, stats every batch,
    /// verbose reports over the distinct archives of the pool.
    pub fn new(emitters: Vec<Box<dyn Emitter>>) -> Result<Self> {
        let (solution_dim, measure_dim) = validate_pool(&emitters)?;
        let report_archives = distinct_archives(&emitters);
        Ok(Self {
            emitters,
            solution_dim,
            measure_dim,
            batch_size: default_batch_size(),
            stats_frequency: 1,
            report_mode: ReportMode::Verbose,
            report_archives,
            show_progress: true,
            total_evaluations: 0,
            batches: 0,
            last_report: None,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(QdError::InvalidArgument("batch_size must be positive".into()));
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn with_stats_frequency(mut self, every_n_batches: usize) -> Result<Self> {
        if every_n_batches == 0 {
            return Err(QdError::InvalidArgument(
                "stats_frequency must be positive".into(),
            ));
        }
        self.stats_frequency = every_n_batches;
        Ok(self)
    }

    pub fn with_report_mode(mut self, mode: ReportMode) -> Self {
        self.report_mode = mode;
        self
    }

    pub fn with_report_archives(mut self, archives: Vec<ArchiveHandle>) -> Self {
        self.report_archives = archives;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn total_evaluations(&self) -> usize {
        self.total_evaluations
    }

    pub fn last_report(&self) -> Option<&StatsReport> {
        self.last_report.as_ref()
    }

    pub fn emitters(&self) -> &[Box<dyn Emitter>] {
        &self.emitters
    }

    /// Drive ask/evaluate/tell batches until at least `n_evaluations`
    /// objective calls have been consumed. Returns the final report.
    pub fn run<F>(&mut self, objective: &F, n_evaluations: usize, parallel: bool) -> Result<StatsReport>
    where
        F: Fn(&[f64]) -> Evaluation + Sync,
    {
        validate_objective(objective, self.solution_dim, self.measure_dim)?;
        let n_batches = n_evaluations.div_ceil(self.batch_size);
        for _ in 0..n_batches {
            let e = self.batches % self.emitters.len();
            let solutions = self.emitters[e].ask(self.batch_size);
            let (objectives, measures) = evaluate_batch(objective, &solutions, parallel);
            self.total_evaluations += solutions.len();
            self.emitters[e].tell(&solutions, &objectives, &measures)?;
            self.batches += 1;
            if self.show_progress && self.batches % self.stats_frequency == 0 {
                let report = StatsReport::gather(
                    &self.report_archives,
                    self.report_mode,
                    self.total_evaluations,
                    self.batches,
                );
                report.emit();
                self.last_report = Some(report);
            }
        }
        Ok(StatsReport::gather(
            &self.report_archives,
            self.report_mode,
            self.total_evaluations,
            self.batches,
        ))
    }
}
