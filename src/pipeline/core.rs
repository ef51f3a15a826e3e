use crate::error::TriageError;

use super::record::SampleRecord;

/// What a stage asks the runner to do with the record next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFlow {
    /// Hand the record to the next stage.
    Continue,
    /// Stop advancing this record but keep what was collected: only stages
    /// that opt in via [`SampleStage::runs_after_finish`] (persistence) still
    /// run. A clean early terminal state, not an error.
    FinishEarly,
}

/// Classification of a stage failure
///
/// Contained failures stop the current record and let the batch continue;
/// fatal failures abort the whole batch. `?` on a [`TriageError`] (or
/// anything converting into one) yields `Fatal` — stages mark the failure
/// modes their contract anticipates with [`Containable::contained`].
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage cannot complete its contract for this record (I/O error,
    /// disallowed source, remote error). The runner records the error on the
    /// record and moves to the next identifier.
    #[error("{0}")]
    Contained(TriageError),

    /// Anything the domain does not anticipate as routine.
    #[error(transparent)]
    Fatal(#[from] TriageError),
}

// Raw I/O inside a stage is unexpected unless marked contained.
impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        StageError::Fatal(err.into())
    }
}

/// Marks a result's error as a contained stage failure.
pub trait Containable<T> {
    fn contained(self) -> Result<T, StageError>;
}

impl<T, E: Into<TriageError>> Containable<T> for Result<T, E> {
    fn contained(self) -> Result<T, StageError> {
        self.map_err(|e| StageError::Contained(e.into()))
    }
}

pub type StageOutcome = Result<StageFlow, StageError>;

/// A single stage in the triage pipeline
///
/// Stages are executed strictly sequentially against each record; the order
/// encodes a producer/consumer contract, so every stage documents the record
/// fields it reads and writes. A stage must be idempotent with respect to
/// fields already correctly populated, and must not touch anything beyond
/// the record and the gateways it was constructed with.
pub trait SampleStage: Send + Sync {
    /// Execute this stage against one record.
    fn execute(&self, record: &mut SampleRecord) -> StageOutcome;

    /// Stage name used in logs and contained-failure tags.
    fn name(&self) -> &str;

    /// Whether this stage still runs after an earlier stage returned
    /// [`StageFlow::FinishEarly`]. The persistence stage opts in.
    fn runs_after_finish(&self) -> bool {
        false
    }
}
