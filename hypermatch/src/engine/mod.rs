/// Matching engines.
///
/// Two implementations share the [`Engine`] interface:
///
/// 1. [`PooledEngine`]: N worker threads, each with a private workspace,
///    fed through a rendezvous channel. Busy pools reject work instead of
///    queueing it, and updates are broadcast to every worker before they
///    return.
/// 2. [`SimpleEngine`]: one workspace behind a mutex. Scans are serialized,
///    there are no threads to start, and nothing is ever rejected as busy.
pub mod pooled;
pub mod simple;
mod worker;

pub use pooled::PooledEngine;
pub use simple::SimpleEngine;

use std::sync::Arc;

use crate::errors::MatchResult;
use crate::matcher::{CompiledPattern, PatternDatabase, VectoredCorpus};

/// Update a pattern set, then match corpora against it
pub trait Engine {
    /// Rebuilds the pattern database from `patterns`. Ids follow input order.
    fn update<S: AsRef<str> + Sync>(&self, patterns: &[S]) -> MatchResult<()>;

    /// Scans an already packed corpus and returns the expression of every
    /// pattern that matched, each at most once. The corpus bytes are shared
    /// with the scan, not copied, so one corpus can be offered repeatedly.
    fn match_vectored(&self, corpus: &VectoredCorpus) -> MatchResult<Vec<String>>;

    /// Packs the blocks into one stream and scans it
    fn match_corpus<B: AsRef<[u8]>>(&self, corpus: &[B]) -> MatchResult<Vec<String>> {
        self.match_vectored(&VectoredCorpus::from_blocks(corpus))
    }

    /// Like [`match_corpus`](Engine::match_corpus), one block per string
    fn match_strings<S: AsRef<str>>(&self, corpus: &[S]) -> MatchResult<Vec<String>> {
        let blocks: Vec<&[u8]> = corpus.iter().map(|s| s.as_ref().as_bytes()).collect();
        self.match_corpus(&blocks)
    }
}

/// The database an engine is serving. The pointer and the "loaded" flag are
/// one value, so they can never disagree.
#[derive(Debug)]
pub(crate) enum DatabaseState {
    Unloaded,
    Loaded {
        database: Arc<PatternDatabase>,
        patterns: Arc<[CompiledPattern]>,
    },
}

impl DatabaseState {
    pub fn patterns(&self) -> Option<Arc<[CompiledPattern]>> {
        match self {
            DatabaseState::Unloaded => None,
            DatabaseState::Loaded { patterns, .. } => Some(Arc::clone(patterns)),
        }
    }
}
