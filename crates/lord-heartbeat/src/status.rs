//! Scheduler status file, read by `lord health`.

use crate::persist::write_json_atomic;
use chrono::{DateTime, Utc};
use lord_core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPhase {
    Idle,
    Running,
    /// Terminal. Only a restart leaves this phase.
    Faulted,
}

impl std::fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Faulted => write!(f, "faulted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastOutcome {
    Published,
    Suppressed,
    Faulted,
}

impl std::fmt::Display for LastOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Published => write!(f, "published"),
            Self::Suppressed => write!(f, "suppressed"),
            Self::Faulted => write!(f, "faulted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub phase: SchedulerPhase,
    pub last_outcome: Option<LastOutcome>,
    pub last_tick: Option<u64>,
    pub ticks_run: u64,
    pub published: u64,
    pub suppressed: u64,
    /// Rolling approval rate of the moral gate.
    pub approval_rate: Option<f64>,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pid: u32,
}

impl StatusRecord {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            last_outcome: None,
            last_tick: None,
            ticks_run: 0,
            published: 0,
            suppressed: 0,
            approval_rate: None,
            last_error: None,
            started_at,
            updated_at: started_at,
            pid: std::process::id(),
        }
    }

    /// `Ok(None)` when no status file exists yet.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        Ok(())
    }
}
