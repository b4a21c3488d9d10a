use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::Engine;
use crate::config::EngineConfig;
use crate::errors::{MatchError, MatchResult};
use crate::matcher::{
    compile, CompileOptions, CompiledPattern, Matching, PatternDatabase, VectoredCorpus, Workspace,
};
use crate::metrics::EngineMetrics;
use crate::results::ScanReply;

/// An engine with a single workspace guarded by a mutex.
///
/// Scans run one at a time on the caller's thread. There is no lifecycle to
/// manage and no busy signal: a second caller simply waits for the lock.
pub struct SimpleEngine {
    options: CompileOptions,
    scratch_limit: Option<usize>,
    state: Mutex<SimpleState>,
    metrics: EngineMetrics,
}

enum SimpleState {
    Unloaded,
    Loaded {
        database: Arc<PatternDatabase>,
        workspace: Workspace,
    },
}

impl SimpleEngine {
    /// Creates an engine with nothing loaded
    pub fn new(config: EngineConfig) -> Self {
        Self {
            options: CompileOptions::from(&config),
            scratch_limit: config.scratch_limit,
            state: Mutex::new(SimpleState::Unloaded),
            metrics: EngineMetrics::new(),
        }
    }

    /// Gets the engine's counters
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Whether a database is loaded
    pub fn is_loaded(&self) -> bool {
        matches!(*self.lock_state(), SimpleState::Loaded { .. })
    }

    /// The pattern list of the database currently loaded
    pub fn loaded_patterns(&self) -> Option<Arc<[CompiledPattern]>> {
        match &*self.lock_state() {
            SimpleState::Unloaded => None,
            SimpleState::Loaded { database, .. } => Some(Arc::clone(database.patterns())),
        }
    }

    /// Releases the database and workspace
    pub fn close(&self) -> MatchResult<()> {
        let previous = mem::replace(&mut *self.lock_state(), SimpleState::Unloaded);
        match previous {
            SimpleState::Unloaded => Err(MatchError::Unloaded),
            SimpleState::Loaded {
                database,
                workspace,
            } => {
                self.metrics
                    .record_workspace(workspace.memory_usage() as u64, 0);
                debug!(
                    "Closed pattern database generation {}",
                    database.generation()
                );
                Ok(())
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SimpleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install<S: AsRef<str> + Sync>(&self, patterns: &[S]) -> MatchResult<()> {
        let (database, _) = compile(patterns, &self.options)?;
        let workspace =
            Workspace::new(&database, self.scratch_limit).map_err(MatchError::scratch_error)?;
        let added = workspace.memory_usage() as u64;
        let generation = database.generation();

        let previous = mem::replace(
            &mut *self.lock_state(),
            SimpleState::Loaded {
                database: Arc::new(database),
                workspace,
            },
        );
        let released = match previous {
            SimpleState::Loaded { workspace, .. } => workspace.memory_usage() as u64,
            SimpleState::Unloaded => 0,
        };
        self.metrics.record_workspace(released, added);

        info!("Loaded pattern database generation {}", generation);
        Ok(())
    }
}

impl Default for SimpleEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine for SimpleEngine {
    fn update<S: AsRef<str> + Sync>(&self, patterns: &[S]) -> MatchResult<()> {
        if patterns.is_empty() {
            return Err(MatchError::NoPatterns);
        }

        let result = self.install(patterns);
        self.metrics.record_update(result.is_ok());
        result
    }

    fn match_vectored(&self, corpus: &VectoredCorpus) -> MatchResult<Vec<String>> {
        let mut state = self.lock_state();
        let SimpleState::Loaded {
            database,
            workspace,
        } = &mut *state
        else {
            return Err(MatchError::Unloaded);
        };

        let mut reply = ScanReply::new(Arc::clone(database));
        let outcome = database.scan(corpus, workspace, |id| {
            reply.matched.insert(id);
            Matching::Continue
        });
        self.metrics.record_scan(outcome.is_ok());
        outcome.map_err(MatchError::scan_error)?;

        Ok(reply.expressions())
    }
}
