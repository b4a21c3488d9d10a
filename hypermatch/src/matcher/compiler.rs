use rayon::prelude::*;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

use super::database::PatternDatabase;
use super::pattern::CompiledPattern;
use crate::config::EngineConfig;
use crate::errors::{MatchError, MatchResult};

/// Knobs for [`compile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Number of contiguous id ranges parsed in parallel
    pub partitions: NonZeroUsize,
    /// Automaton size limit in bytes
    pub size_limit: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            partitions: NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN),
            size_limit: None,
        }
    }
}

impl From<&EngineConfig> for CompileOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            partitions: config.compile_partitions,
            size_limit: config.size_limit,
        }
    }
}

/// Parses every expression and builds one database from the result.
///
/// Expressions are split into `options.partitions` contiguous ranges that
/// are parsed in parallel. A range stops at its first bad expression; the
/// others run to completion. All ranges are collected before deciding, and
/// ranges come back in input order, so the error reported is always the one
/// for the lowest-indexed bad expression.
pub fn compile<S>(
    patterns: &[S],
    options: &CompileOptions,
) -> MatchResult<(PatternDatabase, Arc<[CompiledPattern]>)>
where
    S: AsRef<str> + Sync,
{
    if patterns.is_empty() {
        return Err(MatchError::NoPatterns);
    }

    let chunk_size = patterns.len().div_ceil(options.partitions.get());
    debug!(
        "Compiling {} patterns in chunks of {}",
        patterns.len(),
        chunk_size
    );

    let partitions: Vec<MatchResult<Vec<CompiledPattern>>> = patterns
        .par_chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| parse_range(index * chunk_size, chunk))
        .collect();

    let mut compiled = Vec::with_capacity(patterns.len());
    for partition in partitions {
        compiled.extend(partition?);
    }

    let compiled: Arc<[CompiledPattern]> = compiled.into();
    let database = PatternDatabase::build(Arc::clone(&compiled), options.size_limit)
        .map_err(MatchError::build_error)?;

    info!(
        "Compiled {} patterns into database generation {}",
        compiled.len(),
        database.generation()
    );
    Ok((database, compiled))
}

fn parse_range<S: AsRef<str>>(first_id: usize, chunk: &[S]) -> MatchResult<Vec<CompiledPattern>> {
    chunk
        .iter()
        .enumerate()
        .map(|(offset, raw)| {
            let raw = raw.as_ref();
            CompiledPattern::parse(first_id + offset, raw)
                .map_err(|cause| MatchError::parse_error(raw, cause))
        })
        .collect()
}
