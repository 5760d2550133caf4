//! # qdkit
//!
//! A Quality-Diversity (QD) optimization engine. Instead of chasing a
//! single optimum, QD search fills an archive with high-performing
//! solutions that differ in a user-defined behavioral *measure*.
//!
//! Three subsystems cooperate through an ask/tell loop:
//!
//! - **Archives** ([`GridArchive`], [`ParetoArchive`]) keep at most
//!   one elite per region of measure space and track QD summary
//!   statistics.
//! - **Emitters** ([`GaussianEmitter`], [`IsoLineEmitter`],
//!   [`CmaEsEmitter`]) produce candidate batches, sampling archive
//!   elites as parents once the archive is nonempty.
//! - **Schedulers** ([`RoundRobinScheduler`], [`BanditScheduler`])
//!   drive evaluations of the user objective against an evaluation
//!   budget, optionally fanning evaluation out over the rayon pool,
//!   and log a [`StatsReport`] at batch boundaries.
//!
//! ```no_run
//! use qdkit::{
//!     shared, Bounds, Emitter, Evaluation, GaussianEmitter, GridArchive, RoundRobinScheduler,
//! };
//!
//! # fn main() -> Result<(), qdkit::QdError> {
//! let archive = shared(GridArchive::new(2, &[20, 20], &[(0.0, 1.0), (0.0, 1.0)])?);
//! let emitter = GaussianEmitter::new(
//!     archive.clone(),
//!     0.1,
//!     vec![0.5, 0.5],
//!     Bounds::Uniform(0.0, 1.0),
//!     Some(42),
//! )?;
//! let emitters: Vec<Box<dyn Emitter>> = vec![Box::new(emitter)];
//! let mut scheduler = RoundRobinScheduler::new(emitters)?.with_batch_size(32)?;
//! let objective = |x: &[f64]| Evaluation {
//!     objective: x.iter().sum(),
//!     measure: x.to_vec(),
//! };
//! let report = scheduler.run(&objective, 10_000, true)?;
//! println!("coverage {:.2}", report.coverage);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod emitter;
pub mod errors;
pub mod scheduler;
pub mod stats;

pub use archive::{shared, AddResult, Archive, ArchiveHandle, Elite, GridArchive, ParetoArchive};
pub use emitter::{
    Bounds, CmaEsEmitter, Emitter, GaussianEmitter, Init, IsoLineEmitter, RankingPolicy,
    Selection, Sigma,
};
pub use errors::QdError;
pub use scheduler::{BanditScheduler, BanditStrategy, Evaluation, RoundRobinScheduler};
pub use stats::{ReportMode, StatsReport};
