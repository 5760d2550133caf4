use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::archive::ArchiveHandle;
use crate::emitter::Emitter;
use crate::errors::{QdError, Result};
use crate::scheduler::{
    default_batch_size, distinct_archives, evaluate_batch, validate_objective, validate_pool,
    Evaluation,
};
use crate::stats::{ReportMode, StatsReport};

/// Emitter-allocation rule for the bandit scheduler.
///
/// Both variants are conforming; UCB1 with `zeta = 0.05` is the
/// default. Under either rule, emitters that have never been pulled
/// are chosen first, uniformly at random.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BanditStrategy {
    /// Mean reward plus a `zeta`-scaled confidence radius.
    Ucb1 { zeta: f64 },
    /// Gaussian posterior sampling over per-batch mean rewards,
    /// tracked with Welford's online update.
    Thompson,
}

impl Default for BanditStrategy {
    fn default() -> Self {
        BanditStrategy::Ucb1 { zeta: 0.05 }
    }
}

/// Multi-armed-bandit scheduler: each batch activates the
/// `num_active` emitters whose past batches earned the highest
/// (exploration-adjusted) objective sums.
pub struct BanditScheduler {
    emitters: Vec<Box<dyn Emitter>>,
    num_active: usize,
    strategy: BanditStrategy,
    solution_dim: usize,
    measure_dim: usize,
    batch_size: usize,
    stats_frequency: usize,
    report_mode: ReportMode,
    report_archives: Vec<ArchiveHandle>,
    show_progress: bool,
    rng: StdRng,
    // UCB1 state: cumulative reward and pull count per emitter.
    rewards: Vec<f64>,
    pulls: Vec<f64>,
    // Thompson state: Welford running mean/M2 over per-batch means.
    means: Vec<f64>,
    m2: Vec<f64>,
    counts: Vec<usize>,
    total_evaluations: usize,
    batches: usize,
    last_report: Option<StatsReport>,
}

impl BanditScheduler {
    pub fn new(emitters: Vec<Box<dyn Emitter>>, num_active: usize) -> Result<Self> {
        let (solution_dim, measure_dim) = validate_pool(&emitters)?;
        if num_active == 0 || num_active > emitters.len() {
            return Err(QdError::InvalidArgument(format!(
                "num_active must be in 1..={}, got {num_active}",
                emitters.len()
            )));
        }
        let report_archives = distinct_archives(&emitters);
        let n = emitters.len();
        Ok(Self {
            emitters,
            num_active,
            strategy: BanditStrategy::default(),
            solution_dim,
            measure_dim,
            batch_size: default_batch_size(),
            stats_frequency: 1,
            report_mode: ReportMode::Verbose,
            report_archives,
            show_progress: true,
            rng: StdRng::from_entropy(),
            rewards: vec![0.0; n],
            pulls: vec![0.0; n],
            means: vec![0.0; n],
            m2: vec![0.0; n],
            counts: vec![0; n],
            total_evaluations: 0,
            batches: 0,
            last_report: None,
        })
    }

    pub fn with_strategy(mut self, strategy: BanditStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
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

    fn select_active(&mut self) -> Vec<usize> {
        let unused: Vec<usize> = match self.strategy {
            BanditStrategy::Ucb1 { .. } => (0..self.emitters.len())
                .filter(|&i| self.pulls[i] == 0.0)
                .collect(),
            BanditStrategy::Thompson => (0..self.emitters.len())
                .filter(|&i| self.counts[i] == 0)
                .collect(),
        };
        if !unused.is_empty() {
            let k = self.num_active.min(unused.len());
            return unused.choose_multiple(&mut self.rng, k).copied().collect();
        }
        let scores: Vec<f64> = match self.strategy {
            BanditStrategy::Ucb1 { zeta } => {
                let total: f64 = self.pulls.iter().sum();
                (0..self.emitters.len())
                    .map(|i| {
                        self.rewards[i] / self.pulls[i]
                            + zeta * (2.0 * total.ln() / self.pulls[i]).sqrt()
                    })
                    .collect()
            }
            BanditStrategy::Thompson => (0..self.emitters.len())
                .map(|i| {
                    let var = self.m2[i] / self.counts[i] as f64;
                    let eps: f64 = self.rng.sample(StandardNormal);
                    self.means[i] + eps * var.sqrt()
                })
                .collect(),
        };
        let mut idx: Vec<usize> = (0..scores.len()).collect();
        idx.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
        idx.truncate(self.num_active);
        idx
    }

    fn update_stats(&mut self, emitter: usize, objectives: &[f64]) {
        if objectives.is_empty() {
            return;
        }
        match self.strategy {
            BanditStrategy::Ucb1 { .. } => {
                self.rewards[emitter] += objectives.iter().sum::<f64>();
                self.pulls[emitter] += objectives.len() as f64;
            }
            BanditStrategy::Thompson => {
                let x = objectives.iter().sum::<f64>() / objectives.len() as f64;
                self.counts[emitter] += 1;
                let count = self.counts[emitter] as f64;
                let delta = x - self.means[emitter];
                self.means[emitter] += delta / count;
                self.m2[emitter] += delta * (x - self.means[emitter]);
            }
        }
    }

    /// Drive batches until at least `n_evaluations` objective calls
    /// have been consumed. Returns the final report.
    pub fn run<F>(&mut self, objective: &F, n_evaluations: usize, parallel: bool) -> Result<StatsReport>
    where
        F: Fn(&[f64]) -> Evaluation + Sync,
    {
        validate_objective(objective, self.solution_dim, self.measure_dim)?;
        let n_batches = n_evaluations.div_ceil(self.batch_size);
        for _ in 0..n_batches {
            let active = self.select_active();
            let quota = self.batch_size.div_ceil(self.num_active);

            // Ask each active emitter its share, truncating the tail
            // so the batch never exceeds batch_size.
            let mut slices: Vec<(usize, std::ops::Range<usize>)> = Vec::with_capacity(active.len());
            let mut solutions: Vec<Vec<f64>> = Vec::with_capacity(self.batch_size);
            for &e in &active {
                let take = quota.min(self.batch_size - solutions.len());
                if take == 0 {
                    break;
                }
                let start = solutions.len();
                solutions.extend(self.emitters[e].ask(take));
                slices.push((e, start..solutions.len()));
            }

            let (objectives, measures) = evaluate_batch(objective, &solutions, parallel);
            self.total_evaluations += solutions.len();

            for (e, range) in slices {
                self.emitters[e].tell(
                    &solutions[range.clone()],
                    &objectives[range.clone()],
                    &measures[range.clone()],
                )?;
                self.update_stats(e, &objectives[range]);
            }

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
