use crossbeam_channel::{select, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug_span, trace, warn};

use crate::errors::{MatchError, MatchResult};
use crate::matcher::{Matching, PatternDatabase, ScratchError, VectoredCorpus, Workspace};
use crate::metrics::EngineMetrics;
use crate::results::ScanReply;

/// A scan handed to whichever worker is idle, with a private reply channel
pub(crate) struct ScanRequest {
    pub corpus: VectoredCorpus,
    pub reply: Sender<MatchResult<ScanReply>>,
}

/// Whether a worker can scan. Starts `Uninitialized`; only a successful
/// refresh moves it to `Ready`, and a failed one parks it in `Failed` until
/// the next refresh succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Uninitialized,
    Ready,
    Failed(ScratchError),
}

/// One worker's private scan state: the database it is bound to and the
/// workspace allocated for it. Only ever touched from the worker's own thread.
#[derive(Debug)]
pub(crate) struct ScanWorker {
    index: usize,
    scratch_limit: Option<usize>,
    database: Option<Arc<PatternDatabase>>,
    workspace: Option<Workspace>,
    state: WorkerState,
    metrics: EngineMetrics,
}

impl ScanWorker {
    pub fn new(index: usize, scratch_limit: Option<usize>, metrics: EngineMetrics) -> Self {
        Self {
            index,
            scratch_limit,
            database: None,
            workspace: None,
            state: WorkerState::Uninitialized,
            metrics,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub fn scan(&mut self, corpus: &VectoredCorpus) -> MatchResult<ScanReply> {
        match &self.state {
            WorkerState::Uninitialized => return Err(MatchError::WorkerUninitialized),
            WorkerState::Failed(cause) => return Err(MatchError::scratch_error(cause.clone())),
            WorkerState::Ready => {}
        }
        let (Some(database), Some(workspace)) = (&self.database, self.workspace.as_mut()) else {
            return Err(MatchError::WorkerUninitialized);
        };

        let mut reply = ScanReply::new(Arc::clone(database));
        let outcome = database.scan(corpus, workspace, |id| {
            reply.matched.insert(id);
            Matching::Continue
        });
        self.metrics.record_scan(outcome.is_ok());
        outcome.map_err(MatchError::scan_error)?;

        trace!(
            worker = self.index,
            blocks = corpus.block_count(),
            matched = reply.matched.len(),
            "Scan complete"
        );
        Ok(reply)
    }

    pub fn refresh(&mut self, database: Arc<PatternDatabase>) {
        let before = self.workspace_bytes();
        let result = match self.workspace.as_mut() {
            Some(workspace) => workspace.reallocate(&database, self.scratch_limit),
            None => Workspace::new(&database, self.scratch_limit)
                .map(|workspace| self.workspace = Some(workspace)),
        };
        self.metrics.record_workspace(before, self.workspace_bytes());
        self.metrics.record_refresh(result.is_ok());

        self.state = match result {
            Ok(()) => {
                trace!(
                    worker = self.index,
                    generation = database.generation(),
                    "Adopted pattern database"
                );
                WorkerState::Ready
            }
            Err(cause) => {
                warn!(
                    "Worker {} failed to allocate workspace for generation {}: {}",
                    self.index,
                    database.generation(),
                    cause
                );
                WorkerState::Failed(cause)
            }
        };
        self.database = Some(database);
    }

    pub fn stop(mut self) {
        let before = self.workspace_bytes();
        self.workspace = None;
        self.database = None;
        self.metrics.record_workspace(before, 0);
        trace!(worker = self.index, "Worker stopped");
    }

    fn workspace_bytes(&self) -> u64 {
        self.workspace
            .as_ref()
            .map_or(0, |workspace| workspace.memory_usage() as u64)
    }
}

/// The receiving ends a worker loop selects over
pub(crate) struct WorkerChannels {
    pub requests: Receiver<ScanRequest>,
    pub refresh: Receiver<Arc<PatternDatabase>>,
    pub stop: Receiver<()>,
}

/// Serves one signal at a time until stopped. Nothing is ever sent on
/// `stop`; dropping its sender is the broadcast. A disconnected request or
/// refresh channel also ends the loop.
pub(crate) fn run(mut worker: ScanWorker, channels: WorkerChannels) {
    let span = debug_span!("worker", index = worker.index);
    let _enter = span.enter();

    loop {
        select! {
            recv(channels.requests) -> request => match request {
                Ok(request) => {
                    let reply = worker.scan(&request.corpus);
                    if request.reply.send(reply).is_err() {
                        trace!("Caller went away before the reply was delivered");
                    }
                }
                Err(_) => break,
            },
            recv(channels.refresh) -> database => match database {
                Ok(database) => worker.refresh(database),
                Err(_) => break,
            },
            recv(channels.stop) -> _ => break,
        }
    }

    worker.stop();
}
