//! Heartbeat configuration
//!
//! All tunable parameters in one place. Read from `lord.toml` at startup;
//! a missing or unusable file leaves the heartbeat on built-in defaults.

use lord_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Locations of the structured files.
    pub paths: PathConfig,
    /// Tick cadence and simulated time.
    pub schedule: ScheduleConfig,
    /// Φ scaling and asymptotic growth.
    pub phi: PhiConfig,
    /// Exponential energy model.
    pub energy: EnergyConfig,
    pub entanglement: EntanglementConfig,
    pub resonance: ResonanceConfig,
    /// Node activation dynamics.
    pub dynamics: DynamicsConfig,
    /// Content bus retention and retry policy.
    pub bus: BusConfig,
    /// Moral gate diagnostics and registry reload.
    pub gate: GateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathConfig {
    /// Topology file.
    pub topology: PathBuf,
    /// Content bus file.
    pub bus: PathBuf,
    /// Moral registry file.
    pub registry: PathBuf,
    /// Scheduler status file read by the health check.
    pub status: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Wall-clock interval between ticks in milliseconds (1 Hz default).
    pub interval_ms: u64,
    /// Simulated time advanced per tick.
    pub time_step: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhiConfig {
    /// Multiplier applied to the mixed component score.
    pub scale: f64,
    /// Φ never exceeds this value.
    pub ceiling: f64,
    /// Once raw Φ exceeds the ceiling, each tick closes `1/(1+g)` of
    /// the remaining gap.
    pub growth_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnergyConfig {
    /// E(0).
    pub initial: f64,
    /// γ in E(t) = E(0)·exp(γt).
    pub gamma: f64,
    /// Upper clamp.
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntanglementConfig {
    /// Entanglement of a graph with no edge weight.
    pub baseline: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResonanceConfig {
    pub frequency_hz: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DynamicsConfig {
    /// Fraction of the gap to the neighbor mean closed per tick (0.0 - 1.0).
    pub coupling: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Number of states kept in history.
    pub retention: usize,
    /// Persist attempts before giving up.
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub multiplier: f64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Number of recent gate decisions in the rolling approval rate.
    pub approval_window: usize,
    /// Reload the registry between ticks when its mtime changes.
    pub watch_registry: bool,
}

// ============================================================
// Defaults
// ============================================================

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            paths: PathConfig::default(),
            schedule: ScheduleConfig::default(),
            phi: PhiConfig::default(),
            energy: EnergyConfig::default(),
            entanglement: EntanglementConfig::default(),
            resonance: ResonanceConfig::default(),
            dynamics: DynamicsConfig::default(),
            bus: BusConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            topology: PathBuf::from("circuit/core_architecture.json"),
            bus: PathBuf::from("circuit/content.bus.json"),
            registry: PathBuf::from("circuit/moral/registry.json"),
            status: PathBuf::from("circuit/heartbeat.status.json"),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_ms: 1000, time_step: 1.0 }
    }
}

impl Default for PhiConfig {
    fn default() -> Self {
        Self { scale: 3.2, ceiling: 10.0, growth_rate: 0.05 }
    }
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self { initial: 1.0, gamma: 0.15, max: 1e12 }
    }
}

impl Default for EntanglementConfig {
    fn default() -> Self {
        Self { baseline: 0.9 }
    }
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self { frequency_hz: 43.688 }
    }
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self { coupling: 0.1 }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { retention: 64, max_attempts: 3, backoff: BackoffConfig::default() }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { base_ms: 50, multiplier: 2.0, max_ms: 1000 }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { approval_window: 100, watch_registry: true }
    }
}

// ============================================================
// Loading
// ============================================================

impl HeartbeatConfig {
    /// Read the heartbeat config at `path`. Only this file is lenient: the
    /// topology and registry it points at are validated strictly later.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(config = %path.display(), "no heartbeat config, running on built-in defaults");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(
                    config = %path.display(),
                    error = %e,
                    "heartbeat config unreadable, running on built-in defaults"
                );
                return Self::default();
            }
        };
        match Self::parse(&text) {
            Ok(config) => {
                tracing::info!(
                    config = %path.display(),
                    interval_ms = config.schedule.interval_ms,
                    "heartbeat config loaded"
                );
                config
            }
            Err(e) => {
                tracing::warn!(
                    config = %path.display(),
                    error = %e,
                    "heartbeat config rejected, running on built-in defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse `lord.toml` text. Absent sections and keys take their defaults.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("lord.toml: {}", e)))
    }

    /// The effective config as TOML, as printed by `lord dump-config`.
    pub fn to_toml(&self) -> Result<String> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("cannot render heartbeat config: {}", e)))?;
        Ok(format!("# LORD heartbeat configuration\n\n{}", body))
    }

    /// Resolve every relative path against `base`.
    pub fn resolve_paths(&self, base: &Path) -> PathConfig {
        let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base.join(p) };
        PathConfig {
            topology: resolve(&self.paths.topology),
            bus: resolve(&self.paths.bus),
            registry: resolve(&self.paths.registry),
            status: resolve(&self.paths.status),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (1-based: the delay after the first failure).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let ms = (self.base_ms as f64 * self.multiplier.max(1.0).powi(exp)) as u64;
        Duration::from_millis(ms.min(self.max_ms))
    }
}
