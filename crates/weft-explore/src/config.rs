//! Checker configuration.
//!
//! Defaults cover the common case; a JSON file can override any subset of
//! fields and CLI flags override the file.

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use weft_runtime::DriverConfig;

/// Errors from loading or validating a configuration.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to read config {}", path.display()))]
    Read { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse config {}", path.display()))]
    Parse { path: PathBuf, source: serde_json::Error },

    #[snafu(display("unknown strategy '{name}' (expected random, replay or conflict)"))]
    UnknownStrategy { name: String },

    #[snafu(display("the replay strategy needs a bug record (replay_from)"))]
    MissingReplaySource,

    #[snafu(display("iterations must be at least 1"))]
    NoIterations,
}

/// Which search strategy drives the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Random,
    Replay,
    Conflict,
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" | "rand" => Ok(StrategyKind::Random),
            "replay" => Ok(StrategyKind::Replay),
            "conflict" | "guided" => Ok(StrategyKind::Conflict),
            other => UnknownStrategySnafu { name: other }.fail(),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::Random => "random",
            StrategyKind::Replay => "replay",
            StrategyKind::Conflict => "conflict",
        })
    }
}

/// Configuration for a checking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Maximum number of iterations.
    pub iterations: u64,
    pub strategy: StrategyKind,
    /// Master seed.
    pub seed: u64,
    /// Per-iteration event cap (0 = unlimited).
    pub max_events: usize,
    /// Stop at the first bug.
    pub fail_fast: bool,
    /// Where failing traces are written (none = not persisted).
    pub bug_dir: Option<PathBuf>,
    /// Bug record to follow under the replay strategy.
    pub replay_from: Option<PathBuf>,
    /// How long a granted thread may take to reach its next hook.
    pub stall_timeout_ms: u64,
    /// Log a progress line every this many iterations (0 = never).
    pub progress_interval: u64,
    /// Max frontier size for the conflict strategy.
    pub frontier_size: usize,
    pub verbose: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            strategy: StrategyKind::Random,
            seed: 42,
            max_events: 10_000,
            fail_fast: false,
            bug_dir: None,
            replay_from: None,
            stall_timeout_ms: 10_000,
            progress_interval: 100,
            frontier_size: 256,
            verbose: false,
        }
    }
}

impl CheckerConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).context(ReadSnafu { path })?;
        serde_json::from_str(&text).context(ParseSnafu { path })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return NoIterationsSnafu.fail();
        }
        if self.strategy == StrategyKind::Replay && self.replay_from.is_none() {
            return MissingReplaySourceSnafu.fail();
        }
        Ok(())
    }

    /// Default `env_logger` filter; `RUST_LOG` still takes precedence.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }

    /// Per-iteration limits for the scheduler driver.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            max_events: self.max_events,
            stall_timeout: Duration::from_millis(self.stall_timeout_ms),
        }
    }
}
