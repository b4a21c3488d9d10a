/// The pattern matching capability the engines are built on.
///
/// The engines only need a handful of operations from the matcher:
///
/// 1. **Parse**: turn `/body/flags` into a [`CompiledPattern`]
/// 2. **Build**: turn an ordered pattern list into an immutable [`PatternDatabase`]
/// 3. **Allocate**: create or rebind a mutable [`Workspace`] for a database
/// 4. **Scan**: run a database over a [`VectoredCorpus`] using a workspace,
///    reporting matching pattern ids through a callback
///
/// The automaton itself comes from `regex-automata`'s meta regex, built in
/// "all matches" mode over every pattern at once. Its per-thread search cache
/// is what a [`Workspace`] wraps: a database can be shared freely between
/// threads, a workspace cannot.
pub mod compiler;
pub mod corpus;
pub mod database;
pub mod pattern;

pub use compiler::{compile, CompileOptions};
pub use corpus::VectoredCorpus;
pub use database::{
    DatabaseError, Matching, PatternDatabase, ScanError, ScratchError, Workspace,
};
pub use pattern::{CompiledPattern, Flags, PatternError};
