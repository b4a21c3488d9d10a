/// Scan results and their aggregation into expression strings.
///
/// A worker reports pattern *ids*; callers want the expressions they
/// submitted. The reply carries the database the scan ran against, so ids are
/// always resolved through the pattern list they were numbered in, even if an
/// update has swapped the engine's database while the reply was in flight.
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::matcher::{CompiledPattern, PatternDatabase};

/// The outcome of one successful scan
#[derive(Debug, Clone)]
pub struct ScanReply {
    /// Distinct ids of every pattern that matched
    pub matched: BTreeSet<usize>,
    /// The database the ids refer to
    pub database: Arc<PatternDatabase>,
}

impl ScanReply {
    pub fn new(database: Arc<PatternDatabase>) -> Self {
        Self {
            matched: BTreeSet::new(),
            database,
        }
    }

    /// Matched expressions, in pattern id order
    pub fn expressions(&self) -> Vec<String> {
        matched_expressions(&self.matched, self.database.patterns())
    }
}

/// Maps matched ids to their expression bodies by direct lookup.
/// Ids outside the pattern list are skipped.
pub fn matched_expressions<'a, I>(ids: I, patterns: &[CompiledPattern]) -> Vec<String>
where
    I: IntoIterator<Item = &'a usize>,
{
    ids.into_iter()
        .filter_map(|&id| patterns.get(id))
        .map(|pattern| pattern.expression.clone())
        .collect()
}
