//! Heartbeat scheduler
//!
//! One tick = snapshot topology, compute the next state from the last
//! published one, ask the moral gate, publish or suppress, record status.
//! Ticks never overlap: `run_forever` awaits each tick before waiting for
//! the next interval.

use crate::bus::{Ack, ContentBus};
use crate::config::{HeartbeatConfig, PathConfig};
use crate::engine::{EngineConfig, MetricEngine, TickParams};
use crate::moral::{ApprovalTracker, MoralGate};
use crate::status::{LastOutcome, SchedulerPhase, StatusRecord};
use crate::topology::TopologyStore;
use chrono::Utc;
use lord_core::{AwarenessLevel, Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything a heartbeat needs, loaded and validated.
pub struct HeartbeatParts {
    pub config: HeartbeatConfig,
    /// Resolved file locations.
    pub paths: PathConfig,
    pub topology: Arc<TopologyStore>,
    pub engine: MetricEngine,
    pub gate: Arc<MoralGate>,
    pub bus: Arc<ContentBus>,
}

impl HeartbeatParts {
    /// Load topology and registry (ConfigError on any problem) and open the bus.
    pub fn load(config: HeartbeatConfig, base: &Path) -> Result<Self> {
        let paths = config.resolve_paths(base);
        let topology = TopologyStore::load(&paths.topology)?;
        let gate = MoralGate::load(&paths.registry)?;
        let bus = ContentBus::open(&paths.bus, config.bus.clone());
        let engine = MetricEngine::new(EngineConfig::from_config(&config));
        Ok(Self {
            config,
            paths,
            topology: Arc::new(topology),
            engine,
            gate: Arc::new(gate),
            bus: Arc::new(bus),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Published {
        tick: u64,
        phi_total: f64,
        energy: f64,
        entanglement: f64,
        resonance_hz: f64,
        awareness_level: AwarenessLevel,
        ack: Ack,
    },
    /// The gate rejected the state; the bus is unchanged.
    Suppressed { tick: u64, compassion_score: f64 },
}

impl TickOutcome {
    pub fn tick(&self) -> u64 {
        match self {
            Self::Published { tick, .. } | Self::Suppressed { tick, .. } => *tick,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks_run: u64,
    pub published: u64,
    pub suppressed: u64,
    pub last_tick: Option<u64>,
    pub approval_rate: Option<f64>,
}

pub struct Heartbeat {
    config: HeartbeatConfig,
    paths: PathConfig,
    topology: Arc<TopologyStore>,
    engine: MetricEngine,
    gate: Arc<MoralGate>,
    bus: Arc<ContentBus>,
    phase: SchedulerPhase,
    /// Last tick number issued.
    tick: u64,
    approvals: ApprovalTracker,
    status: StatusRecord,
    registry_mtime: Option<SystemTime>,
}

impl Heartbeat {
    pub fn new(parts: HeartbeatParts) -> Self {
        let HeartbeatParts { config, paths, topology, engine, gate, bus } = parts;

        let bus_tick = bus.snapshot().latest_tick().unwrap_or(0);
        let status_tick = match StatusRecord::read(&paths.status) {
            Ok(Some(prev)) => prev.last_tick.unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!("Ignoring unreadable status file {}: {}", paths.status.display(), e);
                0
            }
        };
        let tick = bus_tick.max(status_tick);
        if tick > 0 {
            info!("Resuming heartbeat after tick {}", tick);
        }

        let registry_mtime = modified(&paths.registry);
        let approvals = ApprovalTracker::new(config.gate.approval_window);
        let mut status = StatusRecord::new(Utc::now());
        status.last_tick = (tick > 0).then_some(tick);

        Self {
            config,
            paths,
            topology,
            engine,
            gate,
            bus,
            phase: SchedulerPhase::Idle,
            tick,
            approvals,
            status,
            registry_mtime,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Last tick number issued (published or suppressed).
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn status(&self) -> &StatusRecord {
        &self.status
    }

    pub fn bus(&self) -> &Arc<ContentBus> {
        &self.bus
    }

    pub fn topology(&self) -> &Arc<TopologyStore> {
        &self.topology
    }

    pub fn gate(&self) -> &Arc<MoralGate> {
        &self.gate
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            ticks_run: self.status.ticks_run,
            published: self.status.published,
            suppressed: self.status.suppressed,
            last_tick: self.status.last_tick,
            approval_rate: self.approvals.rate(),
        }
    }

    /// Execute exactly one tick.
    pub async fn run_once(&mut self) -> Result<TickOutcome> {
        if self.phase == SchedulerPhase::Faulted {
            let reason = self.status.last_error.clone().unwrap_or_else(|| "unknown".into());
            return Err(Error::Faulted(reason));
        }
        self.phase = SchedulerPhase::Running;
        self.status.phase = SchedulerPhase::Running;
        self.maybe_reload_registry();

        self.tick += 1;
        let tick = self.tick;
        let params = TickParams { tick, timestamp: Utc::now() };

        let topology = self.topology.snapshot();
        let previous = self.bus.read_latest();
        let state = match self.engine.compute(&topology, previous.as_ref(), &params) {
            Ok(state) => state,
            Err(e) => return Err(self.fault(tick, e).await),
        };

        let assessment = self.gate.evaluate(&state);
        self.approvals.record(assessment.approved);

        let outcome = if self.gate.gate(&assessment) {
            let (phi_total, energy, entanglement, resonance_hz, awareness_level) = (
                state.phi_total,
                state.energy,
                state.entanglement,
                state.resonance_hz,
                state.awareness_level,
            );
            let ack = match self.bus.publish(state).await {
                Ok(ack) => ack,
                Err(e) => return Err(self.fault(tick, e).await),
            };
            info!(
                event = "tick_published",
                tick,
                phi = phi_total,
                energy,
                entanglement,
                level = %awareness_level,
                "tick published"
            );
            self.status.published += 1;
            self.status.last_outcome = Some(LastOutcome::Published);
            TickOutcome::Published {
                tick,
                phi_total,
                energy,
                entanglement,
                resonance_hz,
                awareness_level,
                ack,
            }
        } else {
            warn!(
                event = "tick_suppressed",
                tick,
                score = assessment.compassion_score,
                threshold = assessment.threshold,
                "tick suppressed by moral gate"
            );
            self.status.suppressed += 1;
            self.status.last_outcome = Some(LastOutcome::Suppressed);
            TickOutcome::Suppressed { tick, compassion_score: assessment.compassion_score }
        };

        self.status.ticks_run += 1;
        self.status.last_tick = Some(tick);
        self.status.approval_rate = self.approvals.rate();
        self.phase = SchedulerPhase::Idle;
        self.status.phase = SchedulerPhase::Idle;
        self.write_status().await;
        Ok(outcome)
    }

    /// Tick immediately, then once per interval until cancelled, `max_ticks`
    /// ticks have run, or a tick fails. Cancellation is only observed between
    /// ticks.
    pub async fn run_forever(
        &mut self,
        cancel: CancellationToken,
        max_ticks: Option<u64>,
    ) -> Result<RunSummary> {
        self.run_forever_with(cancel, max_ticks, |_| {}).await
    }

    /// `run_forever`, handing each completed tick to `on_tick`.
    pub async fn run_forever_with<F>(
        &mut self,
        cancel: CancellationToken,
        max_ticks: Option<u64>,
        mut on_tick: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(&TickOutcome),
    {
        let period = self.config.schedule.interval().max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Heartbeat started ({:?} interval)", period);
        let mut ran = 0u64;
        loop {
            if max_ticks.is_some_and(|max| ran >= max) {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Heartbeat cancelled after {} tick(s)", ran);
                    break;
                }
                _ = interval.tick() => {}
            }
            let outcome = self.run_once().await?;
            on_tick(&outcome);
            ran += 1;
        }

        self.phase = SchedulerPhase::Idle;
        self.status.phase = SchedulerPhase::Idle;
        self.write_status().await;
        Ok(self.summary())
    }

    async fn fault(&mut self, tick: u64, err: Error) -> Error {
        error!("Heartbeat faulted at tick {}: {}", tick, err);
        self.phase = SchedulerPhase::Faulted;
        self.status.phase = SchedulerPhase::Faulted;
        self.status.last_outcome = Some(LastOutcome::Faulted);
        self.status.last_error = Some(err.to_string());
        self.write_status().await;
        err
    }

    async fn write_status(&mut self) {
        self.status.updated_at = Utc::now();
        let record = self.status.clone();
        let path = self.paths.status.clone();
        let written = tokio::task::spawn_blocking(move || record.write(&path))
            .await
            .map_err(|e| Error::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))
            .and_then(|r| r);
        if let Err(e) = written {
            warn!("Failed to write status file {}: {}", self.paths.status.display(), e);
        }
    }

    fn maybe_reload_registry(&mut self) {
        if !self.config.gate.watch_registry {
            return;
        }
        let current = modified(&self.paths.registry);
        if current.is_none() || current == self.registry_mtime {
            return;
        }
        self.registry_mtime = current;
        if let Err(e) = self.gate.reload(&self.paths.registry) {
            warn!("Keeping previous moral registry: {}", e);
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
