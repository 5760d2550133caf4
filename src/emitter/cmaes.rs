use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::archive::{AddResult, ArchiveHandle};
use crate::emitter::{check_batch, clamp_to, Bounds, Emitter, Init};
use crate::errors::{QdError, Result};

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn square_sum(x: &[f64]) -> f64 {
    dot(x, x)
}

#[cfg(feature = "eigen_lapack")]
fn symmetric_eigen_from_data(data: &[f64], n: usize) -> (Vec<f64>, Vec<f64>) {
    let mat = DMatrix::from_row_slice(n, n, data);
    let se = nalgebra_lapack::SymmetricEigen::new(mat);
    let eigenvalues: Vec<f64> = se.eigenvalues.iter().copied().collect();
    let mut eigenbasis = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            eigenbasis[i * n + j] = se.eigenvectors[(i, j)];
        }
    }
    (eigenvalues, eigenbasis)
}

#[cfg(not(feature = "eigen_lapack"))]
fn symmetric_eigen_from_data(data: &[f64], n: usize) -> (Vec<f64>, Vec<f64>) {
    let mat = DMatrix::from_row_slice(n, n, data);
    let se = nalgebra::linalg::SymmetricEigen::new(mat);
    let eigenvalues: Vec<f64> = se.eigenvalues.iter().copied().collect();
    let mut eigenbasis = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            eigenbasis[i * n + j] = se.eigenvectors[(i, j)];
        }
    }
    (eigenvalues, eigenbasis)
}

/// How a batch of evaluated candidates is ordered before parent
/// selection. The `Improvement` and `TwoStage*` policies insert each
/// candidate into the archive while ranking; `Objective` and
/// `RandomDirection` rank without touching it, and the emitter then
/// inserts the batch in a separate sweep after the covariance update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingPolicy {
    /// Descending objective.
    Objective,
    /// Added-to-archive flag, then objective.
    TwoStageObjective,
    /// Descending archive `add` value.
    Improvement,
    /// Added flag, then `add` value.
    TwoStageImprovement,
    /// Projection of the measure onto a fixed random unit direction.
    RandomDirection,
    /// Added flag, then projection.
    TwoStageRandomDirection,
}

impl RankingPolicy {
    fn needs_direction(self) -> bool {
        matches!(
            self,
            RankingPolicy::RandomDirection | RankingPolicy::TwoStageRandomDirection
        )
    }
}

/// Parent selection over the ranked batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// First `mu` ranked candidates.
    Mu,
    /// Ranked candidates not componentwise dominated in solution
    /// space by an earlier kept one; mutual domination keeps the
    /// earlier index.
    Filter,
}

// Constants derived from the solution dimension, fixed for the life
// of the emitter.
struct CmaesParams {
    lambda: usize,
    mu: usize,
    weights: Vec<f64>,
    mueff: f64,
    cc: f64,
    cs: f64,
    c1: f64,
    cmu: f64,
    damps: f64,
    chi_n: f64,
}

impl CmaesParams {
    fn new(n: usize) -> Self {
        let n_f = n as f64;
        let lambda = 4 + (3.0 * n_f.ln()).floor().max(0.0) as usize;
        let mu = lambda / 2;
        let mut weights = vec![0.0; mu];
        for (i, w) in weights.iter_mut().enumerate() {
            *w = ((lambda as f64 + 1.0) / 2.0).ln() - ((i + 1) as f64).ln();
        }
        let w_sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= w_sum;
        }
        let mueff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();
        let cc = 4.0 / (n_f + 4.0);
        let cs = (mueff + 2.0) / (n_f + mueff + 5.0);
        let c1 = 2.0 / ((n_f + 1.3).powi(2) + mueff);
        let cmu = {
            let v = 2.0 * (mueff - 2.0 + 1.0 / mueff) / ((n_f + 2.0).powi(2) + mueff);
            v.min(1.0 - c1)
        };
        let damps = 1.0 + 2.0 * (((mueff - 1.0) / (n_f + 1.0)).sqrt() - 1.0).max(0.0) + cs;
        let chi_n = n_f.sqrt() * (1.0 - 1.0 / (4.0 * n_f) + 1.0 / (21.0 * n_f * n_f));
        Self {
            lambda,
            mu,
            weights,
            mueff,
            cc,
            cs,
            c1,
            cmu,
            damps,
            chi_n,
        }
    }
}

// Full covariance with its eigendecomposition, kept as flat row-major
// buffers. The eigensystem is refreshed after every covariance update
// so sampling and the inverse square root always agree.
struct Covariance {
    n: usize,
    data: Vec<f64>,
    eigenbasis: Vec<f64>,
    eigenvalues: Vec<f64>,
    invsqrt: Vec<f64>,
}

impl Covariance {
    fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        let eigenbasis = data.clone();
        let eigenvalues = vec![1.0; n];
        let invsqrt = data.clone();
        Self {
            n,
            data,
            eigenbasis,
            eigenvalues,
            invsqrt,
        }
    }

    fn reset(&mut self) {
        *self = Self::identity(self.n);
    }

    fn multiply_with(&mut self, factor: f64) {
        self.data.par_iter_mut().for_each(|v| *v *= factor);
    }

    fn addouter(&mut self, b: &[f64], factor: f64) {
        let n = self.n;
        let b_vec = b.to_vec();
        self.data
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(i, row)| {
                let scale = factor * b_vec[i];
                for j in 0..n {
                    row[j] += scale * b_vec[j];
                }
            });
    }

    fn enforce_symmetry(&mut self) {
        let n = self.n;
        for i in 0..n {
            for j in 0..i {
                let avg = 0.5 * (self.data[i * n + j] + self.data[j * n + i]);
                self.data[i * n + j] = avg;
                self.data[j * n + i] = avg;
            }
        }
    }

    fn update_eigensystem(&mut self) {
        self.enforce_symmetry();
        let (mut eigs, basis) = symmetric_eigen_from_data(&self.data, self.n);
        for ev in &mut eigs {
            if *ev < 0.0 {
                *ev = 0.0;
            }
        }
        let n = self.n;
        let mut invsqrt = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                for k in 0..n {
                    // Floor tiny eigenvalues so the inverse square
                    // root stays finite after the clamp.
                    let ev = eigs[k].max(1e-20);
                    sum += basis[i * n + k] * basis[j * n + k] / ev.sqrt();
                }
                invsqrt[i * n + j] = sum;
                invsqrt[j * n + i] = sum;
            }
        }
        self.eigenbasis = basis;
        self.eigenvalues = eigs;
        self.invsqrt = invsqrt;
    }

    fn invsqrt_mul(&self, y: &[f64], out: &mut [f64]) {
        let n = self.n;
        for (i, out_val) in out.iter_mut().enumerate().take(n) {
            let row = &self.invsqrt[i * n..(i + 1) * n];
            *out_val = dot(row, y);
        }
    }

    // y = B (D . z), the sampling transform for z ~ N(0, I).
    fn sample_transform(&self, z: &[f64], out: &mut [f64]) {
        let n = self.n;
        let mut scaled = vec![0.0; n];
        for k in 0..n {
            scaled[k] = self.eigenvalues[k].sqrt() * z[k];
        }
        for (i, out_val) in out.iter_mut().enumerate().take(n) {
            let row = &self.eigenbasis[i * n..(i + 1) * n];
            *out_val = dot(row, &scaled);
        }
    }
}

/// CMA-ES emitter: adapts a full Gaussian sampling model over
/// solution space and feeds the archive through one of six ranking
/// policies.
pub struct CmaEsEmitter {
    archive: ArchiveHandle,
    params: CmaesParams,
    x0: Vec<f64>,
    sigma0: f64,
    lower: Vec<f64>,
    upper: Vec<f64>,
    ranking: RankingPolicy,
    selection: Selection,
    restart_after: usize,
    rng: StdRng,
    mean: Vec<f64>,
    sigma: f64,
    cov: Covariance,
    pc: Vec<f64>,
    ps: Vec<f64>,
    generation: usize,
    last_improvement: usize,
    // Unit direction in measure space, drawn lazily by the
    // RandomDirection policies and dropped on restart.
    direction: Option<Vec<f64>>,
}

impl CmaEsEmitter {
    pub fn new(
        archive: ArchiveHandle,
        sigma0: f64,
        x0: impl Into<Init>,
        bounds: Bounds,
        seed: Option<u64>,
    ) -> Result<Self> {
        if !(sigma0 > 0.0 && sigma0.is_finite()) {
            return Err(QdError::InvalidArgument(format!(
                "sigma0 must be positive and finite, got {sigma0}"
            )));
        }
        let dim = archive.borrow().solution_dim();
        let x0 = x0.into().resolve(dim)?;
        let (lower, upper) = bounds.resolve(dim)?;
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            archive,
            params: CmaesParams::new(dim),
            mean: x0.clone(),
            x0,
            sigma0,
            lower,
            upper,
            ranking: RankingPolicy::TwoStageImprovement,
            selection: Selection::Mu,
            restart_after: 50,
            rng,
            sigma: sigma0,
            cov: Covariance::identity(dim),
            pc: vec![0.0; dim],
            ps: vec![0.0; dim],
            generation: 0,
            last_improvement: 0,
            direction: None,
        })
    }

    pub fn with_ranking(mut self, ranking: RankingPolicy) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Restart when this many generations pass without an archive
    /// insertion.
    pub fn with_restart_after(mut self, generations: usize) -> Self {
        self.restart_after = generations;
        self
    }

    /// Default population size for this dimension
    /// (`4 + floor(3 ln D)`).
    pub fn lambda(&self) -> usize {
        self.params.lambda
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    fn restart(&mut self) {
        self.cov.reset();
        self.pc.iter_mut().for_each(|v| *v = 0.0);
        self.ps.iter_mut().for_each(|v| *v = 0.0);
        self.mean = self.x0.clone();
        self.sigma = self.sigma0;
        self.direction = None;
        self.last_improvement = self.generation;
    }

    fn direction(&mut self) -> Vec<f64> {
        if self.direction.is_none() {
            let m = self.archive.borrow().measure_dim();
            let mut d: Vec<f64> = (0..m).map(|_| self.rng.sample(StandardNormal)).collect();
            let norm = square_sum(&d).sqrt();
            if norm > 0.0 {
                for v in &mut d {
                    *v /= norm;
                }
            } else {
                d[0] = 1.0;
            }
            self.direction = Some(d);
        }
        self.direction.clone().unwrap_or_default()
    }

    // Descending order over (added, value) keys; candidates with NaN
    // values sink to the end.
    fn rank_indices(keys: &[(bool, f64)]) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..keys.len()).collect();
        idx.sort_by(|&i, &j| {
            let (ai, vi) = keys[i];
            let (aj, vj) = keys[j];
            match aj.cmp(&ai) {
                Ordering::Equal => match (vj.partial_cmp(&vi), vi.is_nan(), vj.is_nan()) {
                    (Some(ord), false, false) => ord,
                    (_, true, false) => Ordering::Greater,
                    (_, false, true) => Ordering::Less,
                    _ => Ordering::Equal,
                },
                other => other,
            }
        });
        idx
    }

    fn select_parents(&self, ranked: &[usize], solutions: &[Vec<f64>]) -> Vec<usize> {
        match self.selection {
            Selection::Mu => ranked.iter().copied().take(self.params.mu).collect(),
            Selection::Filter => {
                let mut kept: Vec<usize> = Vec::new();
                for &i in ranked {
                    let dominated = kept.iter().any(|&k| {
                        solutions[k]
                            .iter()
                            .zip(&solutions[i])
                            .all(|(&a, &b)| a >= b)
                    });
                    if !dominated {
                        kept.push(i);
                    }
                    if kept.len() == self.params.mu {
                        break;
                    }
                }
                kept
            }
        }
    }
}

impl Emitter for CmaEsEmitter {
    fn ask(&mut self, n: usize) -> Vec<Vec<f64>> {
        let dim = self.mean.len();
        let mut out = Vec::with_capacity(n);
        let mut z = vec![0.0; dim];
        let mut y = vec![0.0; dim];
        for _ in 0..n {
            for zi in &mut z {
                *zi = self.rng.sample(StandardNormal);
            }
            self.cov.sample_transform(&z, &mut y);
            let mut x = Vec::with_capacity(dim);
            for i in 0..dim {
                x.push(self.mean[i] + self.sigma * y[i]);
            }
            clamp_to(&mut x, &self.lower, &self.upper);
            out.push(x);
        }
        out
    }

    fn tell(
        &mut self,
        solutions: &[Vec<f64>],
        objectives: &[f64],
        measures: &[Vec<f64>],
    ) -> Result<()> {
        check_batch(solutions, objectives, measures)?;
        if solutions.is_empty() {
            return Ok(());
        }
        self.generation += 1;
        let n = self.mean.len();
        let params_mueff = self.params.mueff;

        // Ranking keys; the add-based policies insert into the
        // archive here and those statuses double as the improvement
        // signal for the restart rule.
        let mut add_results: Option<Vec<AddResult>> = None;
        let keys: Vec<(bool, f64)> = match self.ranking {
            RankingPolicy::Objective => objectives.iter().map(|&f| (true, f)).collect(),
            RankingPolicy::RandomDirection => {
                let dir = self.direction();
                measures.iter().map(|m| (true, dot(m, &dir))).collect()
            }
            RankingPolicy::Improvement
            | RankingPolicy::TwoStageImprovement
            | RankingPolicy::TwoStageObjective
            | RankingPolicy::TwoStageRandomDirection => {
                let dir = if self.ranking.needs_direction() {
                    Some(self.direction())
                } else {
                    None
                };
                let mut results = Vec::with_capacity(solutions.len());
                {
                    let mut arch = self.archive.borrow_mut();
                    for ((x, &f), m) in solutions.iter().zip(objectives).zip(measures) {
                        results.push(arch.add(x, f, m)?);
                    }
                }
                let keys = results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| match self.ranking {
                        RankingPolicy::Improvement => (true, r.value()),
                        RankingPolicy::TwoStageImprovement => (r.was_added(), r.value()),
                        RankingPolicy::TwoStageObjective => (r.was_added(), objectives[i]),
                        _ => {
                            let proj = dir.as_ref().map(|d| dot(&measures[i], d)).unwrap_or(0.0);
                            (r.was_added(), proj)
                        }
                    })
                    .collect();
                add_results = Some(results);
                keys
            }
        };

        let ranked = Self::rank_indices(&keys);
        let parents = self.select_parents(&ranked, solutions);
        if parents.is_empty() {
            return Ok(());
        }

        // Renormalize the leading weights over however many parents
        // survived selection.
        let raw = &self.params.weights[..parents.len().min(self.params.mu)];
        let w_sum: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / w_sum).collect();

        let xold = self.mean.clone();
        let mut new_mean = vec![0.0; n];
        for (&p, &w) in parents.iter().zip(&weights) {
            for i in 0..n {
                new_mean[i] += w * solutions[p][i];
            }
        }
        self.mean = new_mean;

        let mut y = vec![0.0; n];
        for i in 0..n {
            y[i] = (self.mean[i] - xold[i]) / self.sigma;
        }

        let cs = self.params.cs;
        let cc = self.params.cc;
        let mut z = vec![0.0; n];
        self.cov.invsqrt_mul(&y, &mut z);
        let csn = (cs * (2.0 - cs) * params_mueff).sqrt();
        for i in 0..n {
            self.ps[i] = (1.0 - cs) * self.ps[i] + csn * z[i];
        }

        let ps_norm = square_sum(&self.ps).sqrt();
        let expected = (1.0 - (1.0 - cs).powf(2.0 * self.generation as f64)).sqrt();
        let n_f = n as f64;
        let hsig = if ps_norm / expected < (1.4 + 2.0 / (n_f + 1.0)) * self.params.chi_n {
            1.0
        } else {
            0.0
        };

        let ccn = (cc * (2.0 - cc) * params_mueff).sqrt();
        for i in 0..n {
            self.pc[i] = (1.0 - cc) * self.pc[i] + hsig * ccn * y[i];
        }

        let c1 = self.params.c1;
        let cmu = self.params.cmu;
        let discount = 1.0 - c1 - cmu + (1.0 - hsig) * c1;
        self.cov.multiply_with(discount);
        self.cov.addouter(&self.pc, c1);
        let mut dy = vec![0.0; n];
        for (&p, &w) in parents.iter().zip(&weights) {
            for i in 0..n {
                dy[i] = (solutions[p][i] - xold[i]) / self.sigma;
            }
            self.cov.addouter(&dy, cmu * w);
        }

        self.sigma *= ((cs / self.params.damps) * (ps_norm / self.params.chi_n - 1.0)).exp();

        self.cov.update_eigensystem();

        // Policies that rank without the archive still have to
        // populate it; this sweep is also what feeds the restart rule.
        let results = match add_results {
            Some(r) => r,
            None => {
                let mut arch = self.archive.borrow_mut();
                let mut r = Vec::with_capacity(solutions.len());
                for ((x, &f), m) in solutions.iter().zip(objectives).zip(measures) {
                    r.push(arch.add(x, f, m)?);
                }
                r
            }
        };

        if results.iter().any(|r| r.was_added()) {
            self.last_improvement = self.generation;
        } else if self.generation - self.last_improvement >= self.restart_after {
            self.restart();
        }
        Ok(())
    }

    fn archive(&self) -> ArchiveHandle {
        self.archive.clone()
    }

    fn solution_dim(&self) -> usize {
        self.x0.len()
    }
}
