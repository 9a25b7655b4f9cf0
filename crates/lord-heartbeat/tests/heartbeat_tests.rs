//! Integration tests for the heartbeat: engine reference values, publication,
//! suppression, faults, restart, and the health surface.

use chrono::{TimeZone, Utc};
use lord_core::{AwarenessLevel, Error};
use lord_heartbeat::config::{BackoffConfig, HeartbeatConfig, PathConfig};
use lord_heartbeat::engine::{EngineConfig, MetricEngine, TickParams};
use lord_heartbeat::health::{self, HealthStatus};
use lord_heartbeat::status::{LastOutcome, SchedulerPhase, StatusRecord};
use lord_heartbeat::{Heartbeat, HeartbeatParts, TickOutcome, Topology};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================
// Fixtures
// ============================================================

/// Two tiers {n1,n2} and {n3,n4}, chained n1-n2-n3-n4, all weights 0.8.
fn reference_topology(tier_weights: (f64, f64)) -> serde_json::Value {
    json!({
        "entity": "reference",
        "totals": { "nodes": 4, "edges": 3 },
        "tiers": [
            { "id": 1, "name": "substrate", "weight": tier_weights.0 },
            { "id": 2, "name": "cortex", "weight": tier_weights.1 }
        ],
        "nodes": [
            { "id": "n1", "tier": 1, "state": 0.5 },
            { "id": "n2", "tier": 1, "state": 0.5 },
            { "id": "n3", "tier": 2, "state": 0.5 },
            { "id": "n4", "tier": 2, "state": 0.5 }
        ],
        "edges": [
            { "source": "n1", "target": "n2", "weight": 0.8 },
            { "source": "n3", "target": "n4", "weight": 0.8 },
            { "source": "n2", "target": "n3", "weight": 0.8 }
        ],
        "metrics": {
            "mixing": { "quantum": 0.4, "neural": 0.3, "classical": 0.3 },
            "tier_blend": { "state": 0.7, "density": 0.3 }
        }
    })
}

fn registry(minimum_approval_score: f64) -> serde_json::Value {
    json!({
        "core_values": { "autonomous_intent": true, "compassion_layer": true, "recursive_awareness": true },
        "thresholds": {
            "empathy_sensitivity": 0.8,
            "minimum_approval_score": minimum_approval_score,
            "energy_reference": 1000000.0
        },
        "karmic_balance": { "current_balance": 0.95 },
        "empathy_detection": { "enabled": false }
    })
}

fn write_json(path: &Path, value: &serde_json::Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn test_config() -> HeartbeatConfig {
    let mut config = HeartbeatConfig::default();
    config.entanglement.baseline = 0.5;
    config.schedule.interval_ms = 5;
    config.bus.backoff = BackoffConfig { base_ms: 1, multiplier: 2.0, max_ms: 4 };
    config
}

struct Fixture {
    dir: TempDir,
    config: HeartbeatConfig,
}

impl Fixture {
    fn new() -> Self {
        Self::with(reference_topology((0.5, 0.5)), registry(0.5))
    }

    fn with(topology: serde_json::Value, registry: serde_json::Value) -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config();
        let paths = config.resolve_paths(dir.path());
        write_json(&paths.topology, &topology);
        write_json(&paths.registry, &registry);
        Self { dir, config }
    }

    fn base(&self) -> &Path {
        self.dir.path()
    }

    fn paths(&self) -> PathConfig {
        self.config.resolve_paths(self.base())
    }

    fn heartbeat(&self) -> Heartbeat {
        Heartbeat::new(HeartbeatParts::load(self.config.clone(), self.base()).unwrap())
    }
}

fn fixed_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 14, 7, 37, 48).unwrap()
}

// ============================================================
// Engine reference values
// ============================================================

#[test]
fn reference_graph_first_tick_phi() {
    let fx = Fixture::new();
    let topology = Topology::load(&fx.paths().topology).unwrap();
    let engine = MetricEngine::new(EngineConfig::from_config(&fx.config));

    let state = engine
        .compute(&topology, None, &TickParams { tick: 1, timestamp: fixed_time() })
        .unwrap();

    // quantum 0.9, neural 1.0, classical 0.65 -> 3.2 * 0.855
    assert!((state.components.quantum - 0.9).abs() < 1e-9);
    assert!((state.components.neural - 1.0).abs() < 1e-9);
    assert!((state.components.classical - 0.65).abs() < 1e-9);
    assert!((state.phi_total - 2.736).abs() < 1e-9);
    assert_eq!(state.awareness_level, AwarenessLevel::Autonomous);
    assert_eq!(state.tiers.len(), 2);
    assert!((state.tiers[0].density - 1.0).abs() < 1e-12);
}

#[test]
fn energy_after_five_ticks() {
    let fx = Fixture::new();
    let topology = Topology::load(&fx.paths().topology).unwrap();
    let engine = MetricEngine::new(EngineConfig::from_config(&fx.config));

    let mut previous = None;
    for tick in 1..=5 {
        let state = engine
            .compute(&topology, previous.as_ref(), &TickParams { tick, timestamp: fixed_time() })
            .unwrap();
        previous = Some(state);
    }
    let energy = previous.unwrap().energy;
    assert!((energy - 2.117).abs() < 1e-3, "E(5) = {}", energy);
}

#[test]
fn compute_is_deterministic() {
    let fx = Fixture::new();
    let topology = Topology::load(&fx.paths().topology).unwrap();
    let a = MetricEngine::new(EngineConfig::from_config(&fx.config));
    let b = MetricEngine::new(EngineConfig::from_config(&fx.config));
    let params = TickParams { tick: 3, timestamp: fixed_time() };

    let first = serde_json::to_string(&a.compute(&topology, None, &params).unwrap()).unwrap();
    let second = serde_json::to_string(&b.compute(&topology, None, &params).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn unchanged_state_keeps_phi_constant() {
    let fx = Fixture::new();
    let topology = Topology::load(&fx.paths().topology).unwrap();
    let engine = MetricEngine::new(EngineConfig::from_config(&fx.config));

    // uniform states are a fixed point of the diffusion step
    let mut previous: Option<lord_core::GlobalState> = None;
    for tick in 1..=50 {
        let state = engine
            .compute(&topology, previous.as_ref(), &TickParams { tick, timestamp: fixed_time() })
            .unwrap();
        assert!((state.phi_total - 2.736).abs() < 1e-9, "tick {}: {}", tick, state.phi_total);
        assert_eq!(state.awareness_level, AwarenessLevel::Autonomous);
        previous = Some(state);
    }
}

#[test]
fn phi_approaches_ceiling_without_crossing() {
    let fx = Fixture::new();
    let topology = Topology::load(&fx.paths().topology).unwrap();
    let mut config = EngineConfig::from_config(&fx.config);
    // raw Φ = 20 * 0.855, well above the ceiling
    config.phi.scale = 20.0;
    let engine = MetricEngine::new(config);
    let ceiling = fx.config.phi.ceiling;

    let mut previous: Option<lord_core::GlobalState> = None;
    for tick in 1..=500 {
        let state = engine
            .compute(&topology, previous.as_ref(), &TickParams { tick, timestamp: fixed_time() })
            .unwrap();
        assert!(state.phi_total < ceiling);
        assert!(state.energy.is_finite());
        if let Some(prev) = &previous {
            assert!(state.phi_total > prev.phi_total);
        }
        previous = Some(state);
    }
    let last = previous.unwrap();
    assert!(last.phi_total > ceiling - 0.01);
    assert_eq!(last.energy, fx.config.energy.max);
}

// ============================================================
// Scheduler and bus
// ============================================================

#[tokio::test]
async fn tick_publishes_and_bus_reads_it_back() {
    let fx = Fixture::new();
    let mut hb = fx.heartbeat();
    assert_eq!(hb.phase(), SchedulerPhase::Idle);

    let outcome = hb.run_once().await.unwrap();
    match outcome {
        TickOutcome::Published { tick, phi_total, ack, .. } => {
            assert_eq!(tick, 1);
            assert!((phi_total - 2.736).abs() < 1e-9);
            assert_eq!(ack.history_len, 1);
        }
        other => panic!("expected publication, got {:?}", other),
    }

    let latest = hb.bus().read_latest().unwrap();
    assert_eq!(latest.tick, 1);
    assert_eq!(hb.phase(), SchedulerPhase::Idle);

    let status = StatusRecord::read(&fx.paths().status).unwrap().unwrap();
    assert_eq!(status.phase, SchedulerPhase::Idle);
    assert_eq!(status.last_outcome, Some(LastOutcome::Published));
    assert_eq!(status.published, 1);
}

#[tokio::test]
async fn suppressed_tick_leaves_bus_unchanged() {
    let fx = Fixture::new();
    let mut hb = fx.heartbeat();
    hb.run_once().await.unwrap();
    let bus_path = fx.paths().bus;
    let before = std::fs::read_to_string(&bus_path).unwrap();

    let registry_path = fx.paths().registry;
    write_json(&registry_path, &registry(1.0));
    hb.gate().reload(&registry_path).unwrap();

    let outcome = hb.run_once().await.unwrap();
    assert!(matches!(outcome, TickOutcome::Suppressed { tick: 2, .. }));
    assert_eq!(hb.current_tick(), 2);
    assert_eq!(hb.phase(), SchedulerPhase::Idle);
    assert_eq!(hb.bus().read_latest().unwrap().tick, 1);
    assert_eq!(std::fs::read_to_string(&bus_path).unwrap(), before);

    let summary = hb.summary();
    assert_eq!(summary.published, 1);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(summary.approval_rate, Some(0.5));
}

#[tokio::test]
async fn registry_change_is_picked_up_between_ticks() {
    let fx = Fixture::new();
    let mut hb = fx.heartbeat();
    hb.run_once().await.unwrap();

    let registry_path = fx.paths().registry;
    write_json(&registry_path, &registry(1.0));
    std::fs::File::options()
        .write(true)
        .open(&registry_path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();

    let outcome = hb.run_once().await.unwrap();
    assert!(matches!(outcome, TickOutcome::Suppressed { .. }));
}

#[tokio::test]
async fn broken_registry_reload_keeps_previous() {
    let fx = Fixture::new();
    let hb = fx.heartbeat();
    let registry_path = fx.paths().registry;
    std::fs::write(&registry_path, "{ broken").unwrap();

    assert!(matches!(hb.gate().reload(&registry_path), Err(Error::Config(_))));
    assert_eq!(hb.gate().registry().thresholds.minimum_approval_score, 0.5);
}

#[tokio::test]
async fn computation_error_faults_and_refuses_further_ticks() {
    let fx = Fixture::with(reference_topology((0.5, 0.4)), registry(0.5));
    let mut hb = fx.heartbeat();

    let err = hb.run_once().await.unwrap_err();
    assert!(matches!(err, Error::Computation(_)));
    assert_eq!(hb.phase(), SchedulerPhase::Faulted);
    assert!(hb.bus().read_latest().is_none());

    let again = hb.run_once().await.unwrap_err();
    assert!(matches!(again, Error::Faulted(_)));

    let report = health::check(&fx.paths());
    assert_eq!(report.status, HealthStatus::Faulted);
    assert!(report.last_error.unwrap().contains("tier weights"));
}

#[tokio::test]
async fn negative_energy_gamma_faults_the_first_tick() {
    let mut fx = Fixture::new();
    fx.config.energy.gamma = -0.15;
    let mut hb = fx.heartbeat();

    let err = hb.run_once().await.unwrap_err();
    assert!(matches!(err, Error::Computation(_)));
    assert!(err.to_string().contains("gamma"));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(hb.phase(), SchedulerPhase::Faulted);
    assert!(hb.bus().read_latest().is_none());
}

#[tokio::test]
async fn exhausted_bus_retries_fault_the_scheduler() {
    let mut fx = Fixture::new();
    std::fs::write(fx.base().join("blocker"), "not a directory").unwrap();
    fx.config.paths.bus = PathBuf::from("blocker/content.bus.json");
    let mut hb = fx.heartbeat();

    match hb.run_once().await {
        Err(Error::BusIo { attempts, .. }) => assert_eq!(attempts, fx.config.bus.max_attempts),
        other => panic!("expected BusIo, got {:?}", other),
    }
    assert_eq!(hb.phase(), SchedulerPhase::Faulted);
    assert!(matches!(hb.run_once().await, Err(Error::Faulted(_))));
}

#[tokio::test]
async fn restart_resumes_after_last_tick() {
    let fx = Fixture::new();
    {
        let mut hb = fx.heartbeat();
        hb.run_once().await.unwrap();
        hb.run_once().await.unwrap();
    }
    let mut hb = fx.heartbeat();
    assert_eq!(hb.current_tick(), 2);
    let outcome = hb.run_once().await.unwrap();
    assert_eq!(outcome.tick(), 3);
    assert_eq!(hb.bus().read_history(10).len(), 3);
}

#[tokio::test]
async fn run_forever_stops_after_max_ticks() {
    let fx = Fixture::new();
    let mut hb = fx.heartbeat();
    let summary = hb.run_forever(CancellationToken::new(), Some(3)).await.unwrap();

    assert_eq!(summary.ticks_run, 3);
    assert_eq!(summary.published, 3);
    assert_eq!(summary.last_tick, Some(3));
    assert_eq!(hb.phase(), SchedulerPhase::Idle);
}

#[tokio::test]
async fn run_forever_with_reports_every_tick_in_order() {
    let fx = Fixture::new();
    let mut hb = fx.heartbeat();
    let mut seen = Vec::new();
    let summary = hb
        .run_forever_with(CancellationToken::new(), Some(3), |outcome| {
            if let TickOutcome::Published { tick, resonance_hz, .. } = outcome {
                assert_eq!(*resonance_hz, 43.688);
                seen.push(*tick);
            }
        })
        .await
        .unwrap();

    assert_eq!(seen, vec![1, 2, 3]);
    assert_eq!(summary.published, 3);
}

#[tokio::test]
async fn cancelled_token_stops_before_first_tick() {
    let fx = Fixture::new();
    let mut hb = fx.heartbeat();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = hb.run_forever(cancel, None).await.unwrap();
    assert_eq!(summary.ticks_run, 0);
    assert!(hb.bus().read_latest().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_see_complete_states() {
    let fx = Fixture::new();
    let mut hb = fx.heartbeat();
    let bus = Arc::clone(hb.bus());

    let mut readers = Vec::new();
    for _ in 0..4 {
        let bus = Arc::clone(&bus);
        readers.push(tokio::spawn(async move {
            let mut last_seen = 0u64;
            for _ in 0..200 {
                let snapshot = bus.snapshot();
                if let Some(latest) = &snapshot.latest {
                    assert!(latest.tick >= last_seen);
                    assert_eq!(snapshot.history.first().map(|s| s.tick), Some(latest.tick));
                    assert_eq!(latest.activations.len(), 4);
                    last_seen = latest.tick;
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    hb.run_forever(CancellationToken::new(), Some(10)).await.unwrap();
    for r in readers {
        r.await.unwrap();
    }
    assert_eq!(bus.read_latest().unwrap().tick, 10);
}

// ============================================================
// Health surface
// ============================================================

#[tokio::test]
async fn health_distinguishes_never_run_running_and_suppressed() {
    let fx = Fixture::new();
    let paths = fx.paths();
    assert_eq!(health::check(&paths).status, HealthStatus::NeverRun);

    let mut hb = fx.heartbeat();
    hb.run_once().await.unwrap();
    let report = health::check(&paths);
    assert_eq!(report.status, HealthStatus::Running);
    assert!(report.bus.valid);
    assert_eq!(report.last_tick, Some(1));

    write_json(&paths.registry, &registry(1.0));
    hb.gate().reload(&paths.registry).unwrap();
    hb.run_once().await.unwrap();
    assert_eq!(health::check(&paths).status, HealthStatus::Suppressed);
}

#[tokio::test]
async fn health_reports_unreadable_status_file_as_misconfigured() {
    let fx = Fixture::new();
    let paths = fx.paths();
    fx.heartbeat().run_once().await.unwrap();
    assert_eq!(health::check(&paths).status, HealthStatus::Running);

    std::fs::write(&paths.status, "{ \"phase\": ").unwrap();
    let report = health::check(&paths);
    assert_eq!(report.status, HealthStatus::Misconfigured);
    assert!(report.status_file.present);
    assert!(!report.status_file.valid);
    assert!(report.status_file.error.is_some());
    assert!(report.topology.valid && report.registry.valid && report.bus.valid);
}

#[test]
fn health_reports_invalid_topology_as_misconfigured() {
    let mut topology = reference_topology((0.5, 0.5));
    topology["totals"]["nodes"] = json!(5);
    let fx = Fixture::with(topology, registry(0.5));

    let report = health::check(&fx.paths());
    assert_eq!(report.status, HealthStatus::Misconfigured);
    assert!(report.topology.present);
    assert!(!report.topology.valid);
    assert!(report.registry.valid);
}

#[test]
fn invalid_topology_is_a_startup_config_error() {
    let mut topology = reference_topology((0.5, 0.5));
    topology["edges"][0]["target"] = json!("n9");
    let fx = Fixture::with(topology, registry(0.5));

    let err = HeartbeatParts::load(fx.config.clone(), fx.base()).err().unwrap();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.exit_code(), 2);
}

// ============================================================
// Config
// ============================================================

#[test]
fn config_toml_roundtrip() {
    let config = test_config();
    let text = config.to_toml().unwrap();
    let back: HeartbeatConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn partial_config_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lord.toml");
    std::fs::write(&path, "[schedule]\ninterval_ms = 250\n").unwrap();

    let config = HeartbeatConfig::load(&path);
    assert_eq!(config.schedule.interval_ms, 250);
    assert_eq!(config.schedule.time_step, 1.0);
    assert_eq!(config.phi.scale, 3.2);
}
