//! Read-only health check over the structured files.
//!
//! Never starts a heartbeat and never writes anything, so an external
//! bootstrap script can call it while a heartbeat is running.

use crate::bus::read_bus_file;
use crate::config::PathConfig;
use crate::moral::MoralRegistry;
use crate::status::{LastOutcome, SchedulerPhase, StatusRecord};
use crate::topology::Topology;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    NeverRun,
    Running,
    Suppressed,
    Faulted,
    /// Topology or registry missing or invalid, or a status file that
    /// cannot be read back.
    Misconfigured,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeverRun => "never-run",
            Self::Running => "running",
            Self::Suppressed => "suppressed",
            Self::Faulted => "faulted",
            Self::Misconfigured => "misconfigured",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Running => 0,
            Self::NeverRun => 10,
            Self::Suppressed => 11,
            Self::Faulted => 12,
            Self::Misconfigured => 13,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileCheck {
    pub present: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileCheck {
    fn ok() -> Self {
        Self { present: true, valid: true, error: None }
    }

    fn missing() -> Self {
        Self { present: false, valid: false, error: None }
    }

    fn invalid(error: impl ToString) -> Self {
        Self { present: true, valid: false, error: Some(error.to_string()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub topology: FileCheck,
    pub registry: FileCheck,
    pub bus: FileCheck,
    pub status_file: FileCheck,
    pub phase: Option<SchedulerPhase>,
    pub last_outcome: Option<LastOutcome>,
    pub last_tick: Option<u64>,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Inspect the files named by `paths` and derive the heartbeat's status.
pub fn check(paths: &PathConfig) -> HealthReport {
    let topology = if !paths.topology.exists() {
        FileCheck::missing()
    } else {
        match Topology::load(&paths.topology) {
            Ok(_) => FileCheck::ok(),
            Err(e) => FileCheck::invalid(e),
        }
    };

    let registry = if !paths.registry.exists() {
        FileCheck::missing()
    } else {
        match MoralRegistry::load(&paths.registry) {
            Ok(_) => FileCheck::ok(),
            Err(e) => FileCheck::invalid(e),
        }
    };

    let bus = match read_bus_file(&paths.bus) {
        Ok(Some(_)) => FileCheck::ok(),
        Ok(None) => FileCheck::missing(),
        Err(e) => FileCheck::invalid(e),
    };

    let (status_file, record) = match StatusRecord::read(&paths.status) {
        Ok(Some(record)) => (FileCheck::ok(), Some(record)),
        Ok(None) => (FileCheck::missing(), None),
        Err(e) => (FileCheck::invalid(e), None),
    };
    let status_unreadable = status_file.present && !status_file.valid;

    let status = if !topology.valid || !registry.valid || status_unreadable {
        HealthStatus::Misconfigured
    } else {
        match &record {
            None => HealthStatus::NeverRun,
            Some(r) if r.phase == SchedulerPhase::Faulted => HealthStatus::Faulted,
            Some(r) => match r.last_outcome {
                Some(LastOutcome::Published) => HealthStatus::Running,
                Some(LastOutcome::Suppressed) => HealthStatus::Suppressed,
                Some(LastOutcome::Faulted) => HealthStatus::Faulted,
                None => HealthStatus::NeverRun,
            },
        }
    };

    HealthReport {
        status,
        topology,
        registry,
        bus,
        status_file,
        phase: record.as_ref().map(|r| r.phase),
        last_outcome: record.as_ref().and_then(|r| r.last_outcome),
        last_tick: record.as_ref().and_then(|r| r.last_tick),
        last_error: record.as_ref().and_then(|r| r.last_error.clone()),
        updated_at: record.as_ref().map(|r| r.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_and_codes_are_distinct() {
        let all = [
            HealthStatus::NeverRun,
            HealthStatus::Running,
            HealthStatus::Suppressed,
            HealthStatus::Faulted,
            HealthStatus::Misconfigured,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.as_str(), b.as_str());
                assert_ne!(a.exit_code(), b.exit_code());
            }
        }
        assert_eq!(HealthStatus::Running.exit_code(), 0);
        assert_eq!(
            serde_json::to_string(&HealthStatus::NeverRun).unwrap(),
            "\"never-run\""
        );
    }

    #[test]
    fn empty_directory_is_misconfigured() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = crate::config::HeartbeatConfig::default().resolve_paths(dir.path());
        let report = check(&paths);
        assert_eq!(report.status, HealthStatus::Misconfigured);
        assert!(!report.topology.present);
        assert!(!report.bus.present);
        assert!(!report.status_file.present);
        assert!(report.phase.is_none());
    }
}
