pub mod config;
pub mod engine;
pub mod errors;
pub mod matcher;
pub mod metrics;
pub mod results;

pub use config::{EngineConfig, EngineOverrides};
pub use engine::{Engine, PooledEngine, SimpleEngine};
pub use errors::{MatchError, MatchResult};
pub use matcher::{CompiledPattern, Flags, VectoredCorpus};
pub use metrics::{EngineMetrics, EngineStats};
pub use results::ScanReply;
