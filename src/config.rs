//! Command-line configuration, grouped per collaborator.
//!
//! Each group is flattened into the `run` subcommand and converted into the
//! plain configuration values the stages take in their constructors.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use index_sink::IndexSchema;
use postgresql_source::ConnectOpts;
use sync_core::{Cursor, Part};

use crate::extract::ExtractConfig;
use crate::load::IndexTarget;
use crate::pipeline::PipelineConfig;
use crate::retry::RetryPolicy;

pub mod duration;

pub use duration::{duration_arg, parse_duration};

/// Cursor of parts that have never been synced.
pub const DEFAULT_CURSOR: &str = "2010-01-01";

fn positive(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Index names are spliced into schema definitions, so only plain
/// identifiers are accepted.
fn index_name(s: &str) -> Result<String, String> {
    let mut chars = s.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(s.to_string())
    } else {
        Err(format!(
            "'{s}' is not a valid index name (letters, digits and '_', not starting with a digit)"
        ))
    }
}

#[derive(Parser, Clone, Debug)]
pub struct PostgresOpts {
    /// PostgreSQL host
    #[arg(long, default_value = "127.0.0.1", env = "PG_HOST")]
    pub pg_host: String,

    /// PostgreSQL port
    #[arg(long, default_value = "5432", env = "PG_PORT")]
    pub pg_port: u16,

    /// PostgreSQL user
    #[arg(long, default_value = "app", env = "PG_USER")]
    pub pg_user: String,

    /// PostgreSQL password
    #[arg(long, default_value = "", env = "PG_PASSWORD", hide_env_values = true)]
    pub pg_password: String,

    /// Database holding the `content` schema
    #[arg(long, default_value = "movies_database", env = "PG_DB")]
    pub pg_db: String,
}

impl From<&PostgresOpts> for ConnectOpts {
    fn from(opts: &PostgresOpts) -> Self {
        Self {
            host: opts.pg_host.clone(),
            port: opts.pg_port,
            user: opts.pg_user.clone(),
            password: opts.pg_password.clone(),
            dbname: opts.pg_db.clone(),
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct SurrealOpts {
    /// SurrealDB endpoint URL
    #[arg(
        long,
        default_value = "http://localhost:8000",
        env = "SURREAL_ENDPOINT"
    )]
    pub surreal_endpoint: String,

    /// SurrealDB username
    #[arg(long, default_value = "root", env = "SURREAL_USERNAME")]
    pub surreal_username: String,

    /// SurrealDB password
    #[arg(long, default_value = "root", env = "SURREAL_PASSWORD", hide_env_values = true)]
    pub surreal_password: String,

    /// Target namespace
    #[arg(long, default_value = "movies", env = "SURREAL_NAMESPACE")]
    pub surreal_namespace: String,

    /// Target database
    #[arg(long, default_value = "movies", env = "SURREAL_DATABASE")]
    pub surreal_database: String,

    /// Table the film documents are written to
    #[arg(long, default_value = "movies", env = "SURREAL_INDEX", value_parser = index_name)]
    pub index: String,

    /// SurrealQL file defining the index table; the built-in movies schema
    /// is used when omitted
    #[arg(long, value_name = "PATH")]
    pub index_schema: Option<PathBuf>,
}

impl SurrealOpts {
    pub fn index_target(&self) -> anyhow::Result<IndexTarget> {
        let schema = match &self.index_schema {
            Some(path) => IndexSchema::from_file(path)
                .with_context(|| format!("Failed to load index schema from {path:?}"))?,
            None => IndexSchema::builtin(&self.index),
        };
        Ok(IndexTarget {
            name: self.index.clone(),
            schema,
        })
    }
}

#[derive(Parser, Clone, Debug)]
pub struct PipelineOpts {
    /// Sync only the films part, to bootstrap an empty index
    #[arg(long, conflicts_with = "parts")]
    pub init: bool,

    /// Parts to sync, comma separated (films, persons, genres)
    #[arg(long, value_delimiter = ',')]
    pub parts: Vec<Part>,

    /// Rows fetched per query page
    #[arg(long, default_value = "1000", value_parser = positive)]
    pub extract_batch_size: usize,

    /// Actions sent per bulk write
    #[arg(long, default_value = "1000", value_parser = positive)]
    pub load_batch_size: usize,

    /// Cursor of parts that were never synced
    #[arg(long, default_value = DEFAULT_CURSOR)]
    pub default_cursor: Cursor,
}

impl PipelineOpts {
    /// The parts a run processes, in processing order.
    pub fn selected_parts(&self) -> Vec<Part> {
        if self.init {
            return Part::INITIAL.to_vec();
        }
        if self.parts.is_empty() {
            return Part::ALL.to_vec();
        }
        let mut parts = Vec::new();
        for part in &self.parts {
            if !parts.contains(part) {
                parts.push(*part);
            }
        }
        parts
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            parts: self.selected_parts(),
            extract: ExtractConfig {
                page_size: self.extract_batch_size,
                default_cursor: self.default_cursor,
            },
            chunk_size: self.load_batch_size,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct StateOpts {
    /// JSON file holding the sync cursors
    #[arg(long, default_value = "state.json", env = "STATE_FILE")]
    pub state_file: PathBuf,

    /// Keep the cursors in this SurrealDB table instead of the state file
    #[arg(long, value_parser = index_name)]
    pub state_table: Option<String>,
}

#[derive(Parser, Clone, Debug)]
pub struct RetryOpts {
    /// Delay after the first failed run
    #[arg(long, default_value = "100ms", value_parser = duration_arg)]
    pub retry_initial_delay: Duration,

    /// Upper bound of the delay between runs
    #[arg(long, default_value = "10s", value_parser = duration_arg)]
    pub retry_max_delay: Duration,

    /// Failed runs tolerated before the final attempt
    #[arg(long, default_value = "10")]
    pub retry_max_attempts: u32,
}

impl From<&RetryOpts> for RetryPolicy {
    fn from(opts: &RetryOpts) -> Self {
        Self {
            initial_delay: opts.retry_initial_delay,
            max_delay: opts.retry_max_delay,
            max_retries: opts.retry_max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        pipeline: PipelineOpts,
        #[command(flatten)]
        retry: RetryOpts,
        #[command(flatten)]
        surreal: SurrealOpts,
    }

    fn parse(args: &[&str]) -> Result<TestCli, clap::Error> {
        TestCli::try_parse_from(std::iter::once("test").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]).unwrap();
        let config = cli.pipeline.pipeline_config();
        assert_eq!(config.parts, Part::ALL.to_vec());
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.extract.default_cursor, Cursor::parse("2010-01-01").unwrap());

        let policy = RetryPolicy::from(&cli.retry);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.max_retries, 10);
    }

    #[test]
    fn test_init_selects_films_only() {
        let cli = parse(&["--init"]).unwrap();
        assert_eq!(cli.pipeline.selected_parts(), vec![Part::Films]);
    }

    #[test]
    fn test_parts_are_deduplicated_in_order() {
        let cli = parse(&["--parts", "genres,films,genres"]).unwrap();
        assert_eq!(cli.pipeline.selected_parts(), vec![Part::Genres, Part::Films]);
    }

    #[test]
    fn test_unknown_part_is_rejected() {
        assert!(parse(&["--parts", "films,directors"]).is_err());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        assert!(parse(&["--load-batch-size", "0"]).is_err());
        assert!(parse(&["--extract-batch-size", "0"]).is_err());
    }

    #[test]
    fn test_index_name_must_be_identifier() {
        assert!(parse(&["--index", "movies; REMOVE TABLE x"]).is_err());
        assert_eq!(parse(&["--index", "films_v2"]).unwrap().surreal.index, "films_v2");
    }
}
