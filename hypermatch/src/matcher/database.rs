use regex_automata::{
    meta::{self, Cache, Regex},
    util::syntax,
    Input, MatchKind, PatternSet,
};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::corpus::VectoredCorpus;
use super::pattern::{CompiledPattern, Flags};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Patterns are matched against raw bytes; Unicode is opt-in per pattern.
pub(crate) fn syntax_config() -> syntax::Config {
    syntax::Config::new().unicode(false).utf8(false)
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("no patterns to build")]
    Empty,
    #[error(transparent)]
    Automaton(#[from] meta::BuildError),
    #[error("pattern {expression} matches the empty buffer")]
    MatchesEmpty { expression: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScratchError {
    #[error("workspace needs {needed} bytes, limit is {limit}")]
    OverLimit { needed: usize, limit: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("workspace is bound to database {workspace}, not {database}")]
    WorkspaceMismatch { workspace: u64, database: u64 },
    #[error("scan terminated by match handler")]
    Terminated,
}

/// What a match handler wants the scan to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matching {
    Continue,
    Terminate,
}

/// An immutable multi-pattern automaton built from one pattern list.
///
/// Each build gets a fresh generation number; a [`Workspace`] remembers the
/// generation it was allocated for and a scan refuses to run on a mismatch.
#[derive(Debug)]
pub struct PatternDatabase {
    regex: Regex,
    patterns: Arc<[CompiledPattern]>,
    generation: u64,
}

impl PatternDatabase {
    pub fn build(
        patterns: Arc<[CompiledPattern]>,
        size_limit: Option<usize>,
    ) -> Result<Self, DatabaseError> {
        if patterns.is_empty() {
            return Err(DatabaseError::Empty);
        }

        let sources: Vec<String> = patterns.iter().map(CompiledPattern::regex_source).collect();
        let mut config = Regex::config()
            .match_kind(MatchKind::All)
            .utf8_empty(false);
        if let Some(limit) = size_limit {
            config = config.nfa_size_limit(Some(limit));
        }

        let regex = Regex::builder()
            .configure(config)
            .syntax(syntax_config())
            .build_many(&sources)?;

        let database = Self {
            regex,
            patterns,
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        };
        database.reject_empty_matches()?;

        debug!(
            "Built pattern database generation {} with {} patterns",
            database.generation,
            database.len()
        );
        Ok(database)
    }

    /// A pattern that matches an empty buffer would match every corpus, so it
    /// is only allowed with the `V` flag.
    fn reject_empty_matches(&self) -> Result<(), DatabaseError> {
        let mut cache = self.regex.create_cache();
        let mut set = PatternSet::new(self.regex.pattern_len());
        self.regex
            .which_overlapping_matches_with(&mut cache, &Input::new(""), &mut set);

        for pid in set.iter() {
            let pattern = &self.patterns[pid.as_usize()];
            if !pattern.flags.contains(Flags::ALLOW_EMPTY) {
                return Err(DatabaseError::MatchesEmpty {
                    expression: pattern.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Scans the corpus, calling `on_match` once for every pattern id that
    /// matched anywhere in the stream.
    pub fn scan<F>(
        &self,
        corpus: &VectoredCorpus,
        workspace: &mut Workspace,
        mut on_match: F,
    ) -> Result<(), ScanError>
    where
        F: FnMut(usize) -> Matching,
    {
        if workspace.generation != self.generation {
            return Err(ScanError::WorkspaceMismatch {
                workspace: workspace.generation,
                database: self.generation,
            });
        }

        workspace.set.clear();
        let input = Input::new(corpus.as_bytes());
        self.regex
            .which_overlapping_matches_with(&mut workspace.cache, &input, &mut workspace.set);

        for pid in workspace.set.iter() {
            if on_match(pid.as_usize()) == Matching::Terminate {
                return Err(ScanError::Terminated);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn patterns(&self) -> &Arc<[CompiledPattern]> {
        &self.patterns
    }

    /// The expression body of pattern `id`
    pub fn expression(&self, id: usize) -> Option<&str> {
        self.patterns.get(id).map(|p| p.expression.as_str())
    }
}

/// Mutable scan scratch for one database generation.
///
/// Never shared: each worker owns exactly one.
#[derive(Debug)]
pub struct Workspace {
    cache: Cache,
    set: PatternSet,
    generation: u64,
}

impl Workspace {
    pub fn new(database: &PatternDatabase, limit: Option<usize>) -> Result<Self, ScratchError> {
        let workspace = Self {
            cache: database.regex.create_cache(),
            set: PatternSet::new(database.regex.pattern_len()),
            generation: database.generation,
        };
        workspace.check_limit(limit)?;
        Ok(workspace)
    }

    /// Rebinds this workspace to `database`, reusing its allocations
    pub fn reallocate(
        &mut self,
        database: &PatternDatabase,
        limit: Option<usize>,
    ) -> Result<(), ScratchError> {
        self.cache.reset(&database.regex);
        if self.set.capacity() != database.regex.pattern_len() {
            self.set = PatternSet::new(database.regex.pattern_len());
        }
        self.generation = database.generation;
        self.check_limit(limit)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bytes held by the workspace: its inline size plus the heap owned by
    /// the search cache and the pattern set. The lazy DFA grows its cache
    /// during scans, so this can rise after allocation.
    pub fn memory_usage(&self) -> usize {
        mem::size_of::<Self>()
            + self.cache.memory_usage()
            + self.set.capacity() * mem::size_of::<bool>()
    }

    fn check_limit(&self, limit: Option<usize>) -> Result<(), ScratchError> {
        match limit {
            Some(limit) if self.memory_usage() > limit => Err(ScratchError::OverLimit {
                needed: self.memory_usage(),
                limit,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database(expressions: &[&str]) -> PatternDatabase {
        let patterns: Vec<CompiledPattern> = expressions
            .iter()
            .enumerate()
            .map(|(id, e)| CompiledPattern::parse(id, e).unwrap())
            .collect();
        PatternDatabase::build(patterns.into(), None).unwrap()
    }

    fn scan_ids(db: &PatternDatabase, blocks: &[&str]) -> Vec<usize> {
        let mut workspace = Workspace::new(db, None).unwrap();
        let mut ids = Vec::new();
        db.scan(
            &VectoredCorpus::from_blocks(blocks),
            &mut workspace,
            |id| {
                ids.push(id);
                Matching::Continue
            },
        )
        .unwrap();
        ids
    }

    #[test]
    fn test_scan_reports_every_matching_pattern() {
        let db = database(&["/cOrPuS/i", "/pus/i", "/absent/"]);
        assert_eq!(scan_ids(&db, &["corpus"]), vec![0, 1]);
    }

    #[test]
    fn test_anchors_apply_to_whole_stream() {
        let db = database(&["/^cOrPuS$/i"]);
        assert!(scan_ids(&db, &["somethingfirstthencorpusafter"]).is_empty());
        assert_eq!(scan_ids(&db, &["cor", "pus"]), vec![0]);
    }

    #[test]
    fn test_end_anchor_allows_final_newline() {
        let db = database(&["/corpus$/", r"/\$$/"]);
        assert_eq!(scan_ids(&db, &["corpus\n"]), vec![0]);
        assert_eq!(scan_ids(&db, &["cor", "pus", "\n"]), vec![0]);
        assert!(scan_ids(&db, &["corpus\nx"]).is_empty());
        assert!(scan_ids(&db, &["corpus\n\n"]).is_empty());
        assert_eq!(scan_ids(&db, &["cost $\n"]), vec![1]);
    }

    #[test]
    fn test_match_spans_block_boundary() {
        let db = database(&["/needle/"]);
        assert_eq!(scan_ids(&db, &["hay nee", "dle hay"]), vec![0]);
    }

    #[test]
    fn test_multiline_flag() {
        let db = database(&["/^second/m"]);
        assert_eq!(scan_ids(&db, &["first\nsecond"]), vec![0]);

        let db = database(&["/^second/"]);
        assert!(scan_ids(&db, &["first\nsecond"]).is_empty());
    }

    #[test]
    fn test_dotall_flag() {
        let db = database(&["/a.b/s"]);
        assert_eq!(scan_ids(&db, &["a\nb"]), vec![0]);

        let db = database(&["/a.b/"]);
        assert!(scan_ids(&db, &["a\nb"]).is_empty());
    }

    #[test]
    fn test_empty_match_rejected_without_flag() {
        let patterns: Vec<CompiledPattern> = vec![CompiledPattern::parse(0, "/x*/").unwrap()];
        let err = PatternDatabase::build(patterns.into(), None).unwrap_err();
        assert!(matches!(err, DatabaseError::MatchesEmpty { .. }));

        let patterns: Vec<CompiledPattern> = vec![CompiledPattern::parse(0, "/x*/V").unwrap()];
        assert!(PatternDatabase::build(patterns.into(), None).is_ok());
    }

    #[test]
    fn test_size_limit_fails_build() {
        let patterns: Vec<CompiledPattern> =
            vec![CompiledPattern::parse(0, r"/\w{50}[a-z]{100}/8").unwrap()];
        let err = PatternDatabase::build(patterns.into(), Some(16)).unwrap_err();
        assert!(matches!(err, DatabaseError::Automaton(_)));
    }

    #[test]
    fn test_empty_pattern_list() {
        let patterns: Vec<CompiledPattern> = Vec::new();
        assert!(matches!(
            PatternDatabase::build(patterns.into(), None),
            Err(DatabaseError::Empty)
        ));
    }

    #[test]
    fn test_terminate_from_handler() {
        let db = database(&["/a/", "/b/"]);
        let mut workspace = Workspace::new(&db, None).unwrap();
        let result = db.scan(
            &VectoredCorpus::from_blocks(&["ab"]),
            &mut workspace,
            |_| Matching::Terminate,
        );
        assert_eq!(result, Err(ScanError::Terminated));
    }

    #[test]
    fn test_workspace_bound_to_generation() {
        let first = database(&["/a/"]);
        let second = database(&["/a/", "/b/"]);
        assert_ne!(first.generation(), second.generation());

        let mut workspace = Workspace::new(&first, None).unwrap();
        let corpus = VectoredCorpus::from_blocks(&["ab"]);
        let result = second.scan(&corpus, &mut workspace, |_| Matching::Continue);
        assert!(matches!(result, Err(ScanError::WorkspaceMismatch { .. })));

        workspace.reallocate(&second, None).unwrap();
        assert_eq!(workspace.generation(), second.generation());
        let mut ids = Vec::new();
        second
            .scan(&corpus, &mut workspace, |id| {
                ids.push(id);
                Matching::Continue
            })
            .unwrap();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_scratch_limit() {
        let db = database(&["/a/"]);
        let err = Workspace::new(&db, Some(1)).unwrap_err();
        assert!(matches!(err, ScratchError::OverLimit { limit: 1, .. }));
        assert!(Workspace::new(&db, Some(usize::MAX)).is_ok());
    }

    #[test]
    fn test_literal_workspace_counts_inline_bytes() {
        let db = database(&["/corpus/"]);
        let workspace = Workspace::new(&db, None).unwrap();
        let inline = mem::size_of::<Cache>() + mem::size_of::<PatternSet>();
        assert!(workspace.memory_usage() >= inline + db.len());

        let err = Workspace::new(&db, Some(inline)).unwrap_err();
        assert!(matches!(err, ScratchError::OverLimit { needed, .. } if needed > inline));
    }

    #[test]
    fn test_limit_checked_at_allocation_only() {
        let db = database(&[r"/[a-z]+\d{3}[A-Z]/", r"/\w+@\w+/", "/x{2,5}y/"]);
        let fresh = Workspace::new(&db, None).unwrap().memory_usage();
        let mut workspace = Workspace::new(&db, Some(fresh)).unwrap();

        let corpus = VectoredCorpus::from_blocks(&["abc123X someone@example xxxy ".repeat(64)]);
        db.scan(&corpus, &mut workspace, |_| Matching::Continue)
            .unwrap();
        assert!(workspace.memory_usage() >= fresh);

        assert!(workspace.reallocate(&db, Some(1)).is_err());
        workspace.reallocate(&db, None).unwrap();
    }

    #[test]
    fn test_expression_lookup() {
        let db = database(&["/cOrPuS/i", "plain"]);
        assert_eq!(db.expression(0), Some("cOrPuS"));
        assert_eq!(db.expression(1), Some("plain"));
        assert_eq!(db.expression(2), None);
        assert_eq!(db.len(), 2);
    }
}
