use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::archive::ArchiveHandle;
use crate::emitter::{check_batch, clamp_to, Bounds, Emitter, Init, Sigma};
use crate::errors::Result;

/// Gaussian emitter: perturbs archive-sampled parents (or `x0` while
/// the archive is empty) with per-dimension isotropic noise.
pub struct GaussianEmitter {
    archive: ArchiveHandle,
    sigma: Vec<f64>,
    x0: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    rng: StdRng,
}

impl GaussianEmitter {
    pub fn new(
        archive: ArchiveHandle,
        sigma: impl Into<Sigma>,
        x0: impl Into<Init>,
        bounds: Bounds,
        seed: Option<u64>,
    ) -> Result<Self> {
        let dim = archive.borrow().solution_dim();
        let sigma = sigma.into().resolve(dim)?;
        let x0 = x0.into().resolve(dim)?;
        let (lower, upper) = bounds.resolve(dim)?;
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            archive,
            sigma,
            x0,
            lower,
            upper,
            rng,
        })
    }
}

impl Emitter for GaussianEmitter {
    fn ask(&mut self, n: usize) -> Vec<Vec<f64>> {
        let arch = self.archive.borrow();
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let mut x = if arch.is_empty() {
                self.x0.clone()
            } else {
                arch.sample(1, &mut self.rng)
                    .ok()
                    .and_then(|ids| arch.solution(ids[0]))
                    .unwrap_or_else(|| self.x0.clone())
            };
            for (xi, &s) in x.iter_mut().zip(&self.sigma) {
                let z: f64 = self.rng.sample(StandardNormal);
                *xi += s * z;
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
        let mut arch = self.archive.borrow_mut();
        for ((x, &f), mu) in solutions.iter().zip(objectives).zip(measures) {
            arch.add(x, f, mu)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{shared, Archive, GridArchive};

    fn emitter(seed: u64) -> GaussianEmitter {
        let archive = shared(GridArchive::new(2, &[10, 10], &[(0.0, 1.0), (0.0, 1.0)]).unwrap());
        GaussianEmitter::new(
            archive,
            0.1,
            vec![0.5, 0.5],
            Bounds::Uniform(0.0, 1.0),
            Some(seed),
        )
        .unwrap()
    }

    #[test]
    fn offspring_respect_bounds() {
        let mut em = emitter(7);
        for x in em.ask(64) {
            assert!(x.iter().all(|&v| (0.0..=1.0).contains(&v)), "{x:?}");
        }
    }

    #[test]
    fn seeded_asks_are_reproducible() {
        let mut a = emitter(42);
        let mut b = emitter(42);
        assert_eq!(a.ask(8), b.ask(8));
    }

    #[test]
    fn tell_populates_archive() {
        let mut em = emitter(1);
        let sols = em.ask(4);
        let objs = vec![1.0; 4];
        let meas: Vec<Vec<f64>> = sols.clone();
        em.tell(&sols, &objs, &meas).unwrap();
        assert!(!em.archive().borrow().is_empty());
    }

    #[test]
    fn mismatched_batch_fails() {
        let mut em = emitter(1);
        let sols = em.ask(3);
        assert!(em.tell(&sols, &[1.0, 2.0], &sols.clone()).is_err());
    }
}
