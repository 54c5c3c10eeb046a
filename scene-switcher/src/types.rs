use chrono::{DateTime, Utc};
use interfaces::defs::{Observation, SourceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::aggregator::CycleScore;
use crate::arbitration::ArbitrationOutcome;

/// Tuning for the polling and arbitration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitcherConfig {
    /// Cycles between arbitration decisions; a decision fires every `cadence + 1` cycles.
    pub cadence: u32,
    pub cooldown_ms: u64,
    pub target_class: String,
    /// Observations must score strictly above this.
    pub confidence_threshold: f32,
    pub open_timeout_ms: u64,
    /// Deadline for one source's read + detect in a cycle.
    pub read_timeout_ms: u64,
    /// Frames discarded after each read, independent of cadence.
    pub frames_per_cycle: u32,
    pub cycle_interval_ms: u64,
    pub connect_attempts: u32,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            cadence: 20,
            cooldown_ms: 2_000,
            target_class: "cat".to_string(),
            confidence_threshold: 0.5,
            open_timeout_ms: 10_000,
            read_timeout_ms: 5_000,
            frames_per_cycle: 1,
            cycle_interval_ms: 0,
            connect_attempts: 3,
        }
    }
}

impl SwitcherConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }
}

/// Why one source contributed nothing to a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceFailure {
    Read(SourceError),
    TimedOut(Duration),
    /// The worker is still busy with an earlier cycle.
    Busy,
    WorkerGone,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFailure::Read(e) => write!(f, "{}", e),
            SourceFailure::TimedOut(deadline) => write!(f, "no result within {:?}", deadline),
            SourceFailure::Busy => write!(f, "still working on a previous cycle"),
            SourceFailure::WorkerGone => write!(f, "worker stopped"),
        }
    }
}

/// One source's contribution to a polling round.
#[derive(Debug, Clone)]
pub struct SourceReading {
    pub label: String,
    /// Position in the configured source list.
    pub order: usize,
    pub outcome: std::result::Result<Vec<Observation>, SourceFailure>,
}

/// Everything that happened in one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub scores: CycleScore,
    pub failures: Vec<(String, SourceFailure)>,
    pub arbitration: Option<ArbitrationOutcome>,
}

/// Resources that could not be released cleanly at shutdown.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    pub released: usize,
    pub failures: Vec<(String, String)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SwitcherError {
    #[error("No usable sources: all {attempted} configured sources failed to open")]
    NoUsableSources { attempted: usize },

    #[error("Scene controller unavailable: {0}")]
    ControllerUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl SwitcherError {
    /// The two conditions that abort the process at startup.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            SwitcherError::NoUsableSources { .. } | SwitcherError::ControllerUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SwitcherError>;
