use crossbeam_channel::{bounded, Sender, TrySendError};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::worker::{self, ScanRequest, ScanWorker, WorkerChannels};
use super::{DatabaseState, Engine};
use crate::config::EngineConfig;
use crate::errors::{MatchError, MatchResult};
use crate::matcher::{compile, CompileOptions, CompiledPattern, PatternDatabase, VectoredCorpus};
use crate::metrics::EngineMetrics;

/// A pool of scan workers, each with its own workspace, serving one shared
/// pattern database that can be replaced while the pool is running.
///
/// # Dispatch
///
/// All workers receive from one zero-capacity request channel, so a request
/// is only handed over when some worker is blocked waiting for one. If none
/// is, [`match_corpus`](Engine::match_corpus) fails at once with
/// [`MatchError::Busy`]; excess load is rejected, never queued.
///
/// # Hot swap
///
/// Every worker also has its own zero-capacity refresh channel.
/// [`update`](Engine::update) installs the new database and then sends it to
/// each worker in turn, blocking on each send until that worker has taken
/// it. A worker only reaches its refresh branch between scans, so by the time
/// `update` returns no worker can still be scanning with the old database.
///
/// ```rust,ignore
/// let engine = PooledEngine::new(EngineConfig::default());
/// engine.start()?;
/// engine.update(&["/cOrPuS/i"])?;
/// assert_eq!(engine.match_strings(&["corpus"])?, vec!["cOrPuS"]);
/// engine.stop()?;
/// ```
pub struct PooledEngine {
    config: EngineConfig,
    state: RwLock<PoolState>,
    /// Serializes updates from install through the end of the broadcast
    update_lock: Mutex<()>,
    metrics: EngineMetrics,
}

struct PoolState {
    lifecycle: Lifecycle,
    database: DatabaseState,
}

enum Lifecycle {
    NotRunning,
    Running(WorkerHandles),
}

struct WorkerHandles {
    requests: Sender<ScanRequest>,
    refresh: Vec<Sender<Arc<PatternDatabase>>>,
    // Never sent on; dropping it tells every worker to stop.
    stop: Sender<()>,
    threads: Vec<JoinHandle<()>>,
}

impl PooledEngine {
    /// Creates a stopped engine with nothing loaded
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: RwLock::new(PoolState {
                lifecycle: Lifecycle::NotRunning,
                database: DatabaseState::Unloaded,
            }),
            update_lock: Mutex::new(()),
            metrics: EngineMetrics::new(),
        }
    }

    /// Creates an engine with `workers` workers and default settings otherwise
    pub fn with_workers(workers: std::num::NonZeroUsize) -> Self {
        Self::new(EngineConfig::default().with_workers(workers))
    }

    /// Gets the counters shared with the workers
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Number of workers a start spawns
    pub fn worker_count(&self) -> usize {
        self.config.workers.get()
    }

    /// Whether the workers have been started
    pub fn is_running(&self) -> bool {
        matches!(self.read_state().lifecycle, Lifecycle::Running(_))
    }

    /// Whether a database is being served
    pub fn is_loaded(&self) -> bool {
        matches!(self.read_state().database, DatabaseState::Loaded { .. })
    }

    /// The pattern list of the database currently being served
    pub fn loaded_patterns(&self) -> Option<Arc<[CompiledPattern]>> {
        self.read_state().database.patterns()
    }

    /// Spawns the workers. A stopped pool can be started again.
    pub fn start(&self) -> MatchResult<()> {
        let mut state = self.write_state();
        if let Lifecycle::Running(_) = state.lifecycle {
            return Err(MatchError::AlreadyStarted);
        }

        let workers = self.config.workers.get();
        let (requests_tx, requests_rx) = bounded(0);
        let (stop_tx, stop_rx) = bounded(0);
        let mut refresh = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers);

        // On a spawn failure the senders drop on return, which stops the
        // workers already spawned.
        for index in 0..workers {
            let (refresh_tx, refresh_rx) = bounded(0);
            let worker = ScanWorker::new(index, self.config.scratch_limit, self.metrics.clone());
            let channels = WorkerChannels {
                requests: requests_rx.clone(),
                refresh: refresh_rx,
                stop: stop_rx.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("hypermatch-worker-{index}"))
                .spawn(move || worker::run(worker, channels))?;

            refresh.push(refresh_tx);
            threads.push(handle);
        }

        state.lifecycle = Lifecycle::Running(WorkerHandles {
            requests: requests_tx,
            refresh,
            stop: stop_tx,
            threads,
        });
        info!("Started {} scan workers", workers);
        Ok(())
    }

    /// Stops the workers, waits for them to exit and releases the database.
    pub fn stop(&self) -> MatchResult<()> {
        let handles = {
            let mut state = self.write_state();
            let handles = match mem::replace(&mut state.lifecycle, Lifecycle::NotRunning) {
                Lifecycle::NotRunning => return Err(MatchError::NotRunning),
                Lifecycle::Running(handles) => handles,
            };
            if let DatabaseState::Loaded { database, .. } =
                mem::replace(&mut state.database, DatabaseState::Unloaded)
            {
                debug!("Releasing pattern database generation {}", database.generation());
            }
            handles
        };

        let WorkerHandles {
            requests,
            refresh,
            stop,
            threads,
        } = handles;
        drop(stop);
        drop(requests);
        drop(refresh);

        for handle in threads {
            if handle.join().is_err() {
                warn!("A scan worker panicked before stopping");
            }
        }

        info!("Stopped scan workers");
        self.metrics.log_stats();
        Ok(())
    }

    fn read_state(&self) -> RwLockReadGuard<'_, PoolState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PoolState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn install<S: AsRef<str> + Sync>(&self, patterns: &[S]) -> MatchResult<()> {
        let options = CompileOptions::from(&self.config);
        let (database, compiled) = compile(patterns, &options)?;
        let database = Arc::new(database);

        let _update = self.update_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let refresh = {
            let mut state = self.write_state();
            let Lifecycle::Running(handles) = &state.lifecycle else {
                return Err(MatchError::NotRunning);
            };
            let refresh = handles.refresh.clone();

            let previous = mem::replace(
                &mut state.database,
                DatabaseState::Loaded {
                    database: Arc::clone(&database),
                    patterns: compiled,
                },
            );
            if let DatabaseState::Loaded { database: previous, .. } = previous {
                debug!(
                    "Superseding pattern database generation {}",
                    previous.generation()
                );
            }
            refresh
        };

        // The previous database is freed once the last worker lets go of it.
        for (index, worker) in refresh.iter().enumerate() {
            if worker.send(Arc::clone(&database)).is_err() {
                warn!("Worker {} stopped during database broadcast", index);
                return Err(MatchError::NotRunning);
            }
        }

        info!(
            "Pattern database generation {} adopted by {} workers",
            database.generation(),
            refresh.len()
        );
        Ok(())
    }
}

impl Engine for PooledEngine {
    fn update<S: AsRef<str> + Sync>(&self, patterns: &[S]) -> MatchResult<()> {
        if patterns.is_empty() {
            return Err(MatchError::NoPatterns);
        }
        if !self.is_running() {
            return Err(MatchError::NotRunning);
        }

        let result = self.install(patterns);
        self.metrics.record_update(result.is_ok());
        result
    }

    fn match_vectored(&self, corpus: &VectoredCorpus) -> MatchResult<Vec<String>> {
        let requests = {
            let state = self.read_state();
            let Lifecycle::Running(handles) = &state.lifecycle else {
                return Err(MatchError::NotRunning);
            };
            if let DatabaseState::Unloaded = state.database {
                return Err(MatchError::Unloaded);
            }
            handles.requests.clone()
        };

        let (reply_tx, reply_rx) = bounded(0);
        let request = ScanRequest {
            corpus: corpus.clone(),
            reply: reply_tx,
        };
        match requests.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.metrics.record_busy();
                return Err(MatchError::Busy);
            }
            Err(TrySendError::Disconnected(_)) => return Err(MatchError::NotRunning),
        }

        let reply = reply_rx.recv().map_err(|_| MatchError::Disconnected)??;
        Ok(reply.expressions())
    }
}

impl Drop for PooledEngine {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
