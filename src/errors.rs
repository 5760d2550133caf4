use thiserror::Error;

/// Error taxonomy for the crate.
///
/// Every variant is raised at a boundary (constructor or public method
/// entry) and surfaces to the caller unmodified; nothing is caught
/// internally. An archive rejecting a candidate is *not* an error --
/// see [`crate::archive::AddResult::NotAdded`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QdError {
    /// A solution or measure vector has the wrong length.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A construction parameter is out of range (inverted measure
    /// range, zero cell count, `num_active` larger than the emitter
    /// pool, emitters disagreeing on solution dimension, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The objective callback violates its contract.
    #[error("invalid objective: {0}")]
    InvalidObjective(String),

    /// `sample` was called on an archive with no occupied cells.
    #[error("cannot sample from an empty archive")]
    EmptyArchive,
}

pub type Result<T> = std::result::Result<T, QdError>;
