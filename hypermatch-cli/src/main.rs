use clap::{Parser, Subcommand};
use colored::Colorize;
use hypermatch::{
    matcher::{compile, CompileOptions},
    Engine, EngineConfig, EngineOverrides, MatchError, MatchResult, PooledEngine,
    VectoredCorpus,
};
use rayon::prelude::*;
use std::{fs, num::NonZeroUsize, path::Path, path::PathBuf, sync::Arc, thread};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file layered over the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
struct PatternArgs {
    /// Pattern in /body/flags form (can be specified multiple times)
    #[arg(short = 'p', long = "pattern")]
    patterns: Vec<String>,

    /// File with one pattern per line
    #[arg(short = 'f', long = "pattern-file")]
    pattern_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan files against a pattern set
    Scan {
        #[command(flatten)]
        patterns: PatternArgs,

        /// Number of scan workers
        #[arg(short = 'j', long)]
        workers: Option<NonZeroUsize>,

        /// Scan all files together as one corpus
        #[arg(long)]
        vectored: bool,

        /// Files to scan
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Compile a pattern set without scanning anything
    Check {
        #[command(flatten)]
        patterns: PatternArgs,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> MatchResult<()> {
    let cli = Cli::parse();

    let overrides = EngineOverrides {
        workers: match &cli.command {
            Commands::Scan { workers, .. } => *workers,
            Commands::Check { .. } => None,
        },
        log_level: cli.log_level.clone(),
        ..EngineOverrides::default()
    };
    let config = EngineConfig::load_from(cli.config.as_deref())?.merge_with_cli(overrides);
    init_logging(&config.log_level);

    match cli.command {
        Commands::Scan {
            patterns,
            vectored,
            files,
            ..
        } => {
            let patterns = patterns.collect()?;
            let engine = PooledEngine::new(config);
            engine.start()?;
            engine.update(&patterns)?;

            if vectored {
                let blocks = files
                    .iter()
                    .map(fs::read)
                    .collect::<Result<Vec<_>, _>>()?;
                let corpus = VectoredCorpus::from_blocks(&blocks);
                let matched = scan_until_accepted(&engine, &corpus)?;
                print_matches("(vectored)", &matched);
            } else {
                let results: Vec<(&PathBuf, MatchResult<Vec<String>>)> = files
                    .par_iter()
                    .map(|path| (path, scan_file(&engine, path)))
                    .collect();
                for (path, result) in results {
                    print_matches(&path.display().to_string(), &result?);
                }
            }

            engine.stop()?;
            Ok(())
        }
        Commands::Check { patterns } => {
            let patterns = patterns.collect()?;
            let (database, _) = compile(&patterns, &CompileOptions::from(&config))?;
            println!(
                "{} {} patterns compiled",
                "ok:".green().bold(),
                database.len()
            );
            Ok(())
        }
    }
}

impl PatternArgs {
    /// Command-line patterns first, then the pattern file's
    fn collect(self) -> MatchResult<Vec<String>> {
        let mut patterns = self.patterns;
        if let Some(path) = &self.pattern_file {
            patterns.extend(read_pattern_file(path)?);
        }
        if patterns.is_empty() {
            return Err(MatchError::NoPatterns);
        }
        Ok(patterns)
    }
}

/// One expression per line. Blank lines and `#` comments are skipped.
fn read_pattern_file(path: &Path) -> MatchResult<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

fn scan_file(engine: &PooledEngine, path: &Path) -> MatchResult<Vec<String>> {
    let content: Arc<[u8]> = fs::read(path)?.into();
    scan_until_accepted(engine, &VectoredCorpus::from(content))
}

/// The pool rejects work while every worker is busy; keep offering it
fn scan_until_accepted(
    engine: &PooledEngine,
    corpus: &VectoredCorpus,
) -> MatchResult<Vec<String>> {
    loop {
        match engine.match_vectored(corpus) {
            Err(e) if e.is_busy() => {
                debug!("Pool busy, retrying");
                thread::yield_now();
            }
            result => return result,
        }
    }
}

fn print_matches(label: &str, matched: &[String]) {
    if matched.is_empty() {
        println!("{}: {}", label.blue(), "no matches".dimmed());
        return;
    }
    println!("{}: {}", label.blue(), matched.join(", ").green());
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
