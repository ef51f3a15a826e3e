use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{TriageError, TriageResult};

use super::core::{SampleStage, StageError, StageFlow};
use super::record::SampleRecord;

/// Handle for requesting best-effort cancellation of a running batch
///
/// Cancellation takes effect between identifiers, never mid-stage:
/// in-flight records finish, unstarted identifiers are returned untouched.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes the configured stage list against each identifier in a batch
///
/// The stage sequence is fixed at construction time ([`RunnerBuilder`]) and
/// executed in order against every record. Failure policy:
/// * a contained stage failure stops the current record, tags it with
///   `error = "<stage>:<detail>"` and the batch continues;
/// * a finish-early signal skips to the stages marked
///   [`SampleStage::runs_after_finish`];
/// * anything else propagates out of [`Runner::run`] and aborts the batch.
///
/// Records are independent; with more than one worker they are processed
/// concurrently, but the returned results always correlate with the input
/// order.
pub struct Runner {
    stages: Vec<Box<dyn SampleStage>>,
    workers: usize,
    cancel: CancelHandle,
}

impl Runner {
    /// Create a new runner builder.
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Handle for canceling batches run by this runner.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run every identifier through the stage list and return one record per
    /// identifier, in input order.
    pub fn run(&self, identifiers: &[String]) -> TriageResult<Vec<SampleRecord>> {
        let run_id = Uuid::new_v4();
        info!(%run_id, samples = identifiers.len(), workers = self.workers, "starting batch");

        let results = if self.workers <= 1 || identifiers.len() <= 1 {
            self.run_sequential(identifiers)?
        } else {
            self.run_concurrent(identifiers)?
        };

        let failed = results.iter().filter(|r| r.error().is_some()).count();
        info!(%run_id, samples = results.len(), failed, "batch finished");
        Ok(results)
    }

    /// Entry point for the CLI collaborator: like [`Runner::run`], but each
    /// record is rendered to its display mapping (blob and bookkeeping
    /// stripped).
    pub fn check(&self, identifiers: &[String]) -> TriageResult<Vec<Value>> {
        Ok(self
            .run(identifiers)?
            .iter()
            .map(SampleRecord::to_display)
            .collect())
    }

    fn run_sequential(&self, identifiers: &[String]) -> TriageResult<Vec<SampleRecord>> {
        let mut results = Vec::with_capacity(identifiers.len());
        for (index, source) in identifiers.iter().enumerate() {
            if self.cancel.is_canceled() {
                warn!(remaining = identifiers.len() - index, "batch canceled");
                results.extend(identifiers[index..].iter().map(SampleRecord::new));
                break;
            }
            results.push(self.run_one(source)?);
        }
        Ok(results)
    }

    fn run_concurrent(&self, identifiers: &[String]) -> TriageResult<Vec<SampleRecord>> {
        let workers = self.workers.min(identifiers.len());
        let mut slots: Vec<Option<TriageResult<SampleRecord>>> =
            identifiers.iter().map(|_| None).collect();

        std::thread::scope(|scope| -> TriageResult<()> {
            let (tx, rx) = crossbeam_channel::bounded::<(usize, &str)>(workers);

            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let rx = rx.clone();
                handles.push(scope.spawn(move || {
                    let mut done = Vec::new();
                    while let Ok((index, source)) = rx.recv() {
                        done.push((index, self.run_one(source)));
                    }
                    done
                }));
            }
            drop(rx);

            for (index, source) in identifiers.iter().enumerate() {
                if self.cancel.is_canceled() {
                    warn!(remaining = identifiers.len() - index, "batch canceled");
                    break;
                }
                if tx.send((index, source.as_str())).is_err() {
                    break;
                }
            }
            drop(tx);

            for handle in handles {
                let done = handle.join().map_err(|_| TriageError::WorkerPanicked)?;
                for (index, result) in done {
                    slots[index] = Some(result);
                }
            }
            Ok(())
        })?;

        let mut results = Vec::with_capacity(identifiers.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(record)) => results.push(record),
                Some(Err(err)) => return Err(err),
                // Never dispatched (canceled): hand back an untouched record
                // so results stay correlated with the input.
                None => results.push(SampleRecord::new(&identifiers[index])),
            }
        }
        Ok(results)
    }

    /// Run one identifier through the stage list. Only fatal failures
    /// surface as `Err`.
    fn run_one(&self, source: &str) -> TriageResult<SampleRecord> {
        info!(source, "checking sample");
        let mut record = SampleRecord::new(source);
        let mut finished_early = false;

        for stage in &self.stages {
            if finished_early && !stage.runs_after_finish() {
                continue;
            }
            debug!(stage = stage.name(), source, "executing stage");
            match stage.execute(&mut record) {
                Ok(StageFlow::Continue) => {}
                Ok(StageFlow::FinishEarly) => {
                    info!(stage = stage.name(), source, "record finished early");
                    finished_early = true;
                }
                Err(StageError::Contained(err)) => {
                    warn!(stage = stage.name(), source, error = %err, "sample check failed");
                    record.record_error(stage.name(), &err);
                    break;
                }
                Err(StageError::Fatal(err)) => return Err(err),
            }
        }
        Ok(record)
    }
}

/// Builder for a [`Runner`]
///
/// The stage sequence is explicit configuration; there is no implicit
/// enabled-stage list. [`crate::pipeline::stages::standard_runner`] wires the
/// standard sequence.
pub struct RunnerBuilder {
    stages: Vec<Box<dyn SampleStage>>,
    workers: usize,
    cancel: CancelHandle,
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            workers: 1,
            cancel: CancelHandle::default(),
        }
    }

    /// Append a stage to the sequence.
    pub fn stage<S: SampleStage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append an already boxed stage to the sequence.
    pub fn boxed_stage(mut self, stage: Box<dyn SampleStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Number of records processed concurrently (at least 1).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Use an externally owned cancellation handle instead of a fresh one.
    pub fn cancel_handle(mut self, handle: CancelHandle) -> Self {
        self.cancel = handle;
        self
    }

    pub fn build(self) -> Runner {
        Runner {
            stages: self.stages,
            workers: self.workers,
            cancel: self.cancel,
        }
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
