use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::MatchResult;

/// Configuration for the matching engines.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.hypermatch.yaml` in the current directory
/// 3. Global `$HOME/.config/hypermatch/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Number of scan workers in the pool (default: CPU cores)
/// workers: 8
///
/// # Number of ranges patterns are parsed in, in parallel (default: CPU cores)
/// compile_partitions: 4
///
/// # Automaton size limit in bytes
/// size_limit: 10485760
///
/// # Per-worker workspace limit in bytes
/// scratch_limit: 1048576
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// Every field has a default, so an empty file (or no file at all) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of scan workers in the pooled engine
    pub workers: NonZeroUsize,

    /// Number of contiguous ranges patterns are parsed in
    pub compile_partitions: NonZeroUsize,

    /// Automaton size limit in bytes; `None` keeps the matcher's default
    pub size_limit: Option<usize>,

    /// Upper bound on a single worker's workspace in bytes
    pub scratch_limit: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Values supplied on the command line; `None` leaves the file value alone
#[derive(Debug, Clone, Default)]
pub struct EngineOverrides {
    pub workers: Option<NonZeroUsize>,
    pub compile_partitions: Option<NonZeroUsize>,
    pub size_limit: Option<usize>,
    pub scratch_limit: Option<usize>,
    pub log_level: Option<String>,
}

fn default_parallelism() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_parallelism(),
            compile_partitions: default_parallelism(),
            size_limit: None,
            scratch_limit: None,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the default locations
    pub fn load() -> MatchResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration, layering an explicit file over the default ones.
    /// The explicit file must exist; the default ones are optional.
    pub fn load_from(config_path: Option<&Path>) -> MatchResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let default_files = [
            dirs::config_dir().map(|p| p.join("hypermatch/config.yaml")),
            Some(PathBuf::from(".hypermatch.yaml")),
        ];
        for path in default_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Applies command-line values over the loaded configuration
    pub fn merge_with_cli(mut self, cli: EngineOverrides) -> Self {
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(partitions) = cli.compile_partitions {
            self.compile_partitions = partitions;
        }
        if cli.size_limit.is_some() {
            self.size_limit = cli.size_limit;
        }
        if cli.scratch_limit.is_some() {
            self.scratch_limit = cli.scratch_limit;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }

    pub fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_scratch_limit(mut self, limit: Option<usize>) -> Self {
        self.scratch_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MatchError;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            workers: 3
            compile_partitions: 2
            size_limit: 4096
            scratch_limit: 65536
            log_level: "debug"
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = EngineConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.workers, NonZeroUsize::new(3).unwrap());
        assert_eq!(config.compile_partitions, NonZeroUsize::new(2).unwrap());
        assert_eq!(config.size_limit, Some(4096));
        assert_eq!(config.scratch_limit, Some(65536));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"log_level: \"info\"\n").unwrap();

        let config = EngineConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.workers, default_parallelism());
        assert_eq!(config.compile_partitions, default_parallelism());
        assert_eq!(config.size_limit, None);
        assert_eq!(config.scratch_limit, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_merge_with_cli() {
        let file_config = EngineConfig {
            workers: NonZeroUsize::new(2).unwrap(),
            compile_partitions: NonZeroUsize::new(2).unwrap(),
            size_limit: Some(1024),
            scratch_limit: None,
            log_level: "warn".to_string(),
        };

        let merged = file_config.merge_with_cli(EngineOverrides {
            workers: NonZeroUsize::new(8),
            scratch_limit: Some(4096),
            log_level: Some("trace".to_string()),
            ..EngineOverrides::default()
        });

        assert_eq!(merged.workers, NonZeroUsize::new(8).unwrap()); // CLI value
        assert_eq!(merged.compile_partitions, NonZeroUsize::new(2).unwrap()); // File value
        assert_eq!(merged.size_limit, Some(1024)); // File value (CLI None)
        assert_eq!(merged.scratch_limit, Some(4096)); // CLI value
        assert_eq!(merged.log_level, "trace"); // CLI value
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(b"workers: 0\n").unwrap();

        let result = EngineConfig::load_from(Some(&config_path));
        assert!(matches!(result, Err(MatchError::Config(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = EngineConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }
}
