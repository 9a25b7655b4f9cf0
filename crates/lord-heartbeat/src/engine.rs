//! Metric engine: pure per-tick computation of Φ, energy and entanglement.
//!
//! `compute` reads the topology and the previously published state and
//! returns a fresh `GlobalState`. No clock, no randomness, no I/O: the same
//! inputs always serialize to the same bytes.

use crate::config::{
    DynamicsConfig, EnergyConfig, EntanglementConfig, HeartbeatConfig, PhiConfig, ResonanceConfig,
};
use crate::topology::Topology;
use chrono::{DateTime, Utc};
use lord_core::{AwarenessLevel, Error, GlobalState, PhiComponents, Result, TierSummary};
use std::collections::BTreeMap;

/// Tolerance for "weights sum to 1".
const WEIGHT_EPSILON: f64 = 1e-6;

/// Per-tick inputs supplied by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct TickParams {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
}

/// The subset of configuration the engine reads.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub phi: PhiConfig,
    pub energy: EnergyConfig,
    pub entanglement: EntanglementConfig,
    pub resonance: ResonanceConfig,
    pub dynamics: DynamicsConfig,
    /// Simulated time per tick.
    pub time_step: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&HeartbeatConfig::default())
    }
}

impl EngineConfig {
    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self {
            phi: config.phi.clone(),
            energy: config.energy.clone(),
            entanglement: config.entanglement.clone(),
            resonance: config.resonance.clone(),
            dynamics: config.dynamics.clone(),
            time_step: config.schedule.time_step,
        }
    }

    fn validate(&self) -> Result<()> {
        let phi = &self.phi;
        if !(phi.ceiling.is_finite() && phi.ceiling > 0.0) {
            return Err(Error::computation(format!("phi ceiling {} must be finite and > 0", phi.ceiling)));
        }
        if !(phi.scale.is_finite() && phi.scale >= 0.0) {
            return Err(Error::computation(format!("phi scale {} must be finite and >= 0", phi.scale)));
        }
        if !(phi.growth_rate.is_finite() && phi.growth_rate >= 0.0) {
            return Err(Error::computation(format!(
                "phi growth rate {} must be finite and >= 0",
                phi.growth_rate
            )));
        }
        let energy = &self.energy;
        if !(energy.initial.is_finite() && energy.initial >= 0.0) {
            return Err(Error::computation(format!("energy E(0) {} must be finite and >= 0", energy.initial)));
        }
        if !(energy.gamma.is_finite() && energy.gamma >= 0.0) {
            return Err(Error::computation(format!("energy gamma {} must be finite and >= 0", energy.gamma)));
        }
        if !(energy.max.is_finite() && energy.max > 0.0) {
            return Err(Error::computation(format!("energy max {} must be finite and > 0", energy.max)));
        }
        if !unit(self.entanglement.baseline) {
            return Err(Error::computation(format!(
                "entanglement baseline {} outside [0,1]",
                self.entanglement.baseline
            )));
        }
        if !unit(self.dynamics.coupling) {
            return Err(Error::computation(format!(
                "coupling {} outside [0,1]",
                self.dynamics.coupling
            )));
        }
        if !(self.time_step.is_finite() && self.time_step >= 0.0) {
            return Err(Error::computation(format!("time step {} must be finite and >= 0", self.time_step)));
        }
        if !self.resonance.frequency_hz.is_finite() {
            return Err(Error::computation("resonance frequency is not finite"));
        }
        Ok(())
    }
}

pub struct MetricEngine {
    config: EngineConfig,
}

impl MetricEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Produce the state for `params.tick` from the topology and the last
    /// published state.
    pub fn compute(
        &self,
        topology: &Topology,
        previous: Option<&GlobalState>,
        params: &TickParams,
    ) -> Result<GlobalState> {
        self.config.validate()?;
        validate_weights(topology)?;

        if let Some(prev) = previous {
            if params.tick <= prev.tick {
                return Err(Error::computation(format!(
                    "tick {} does not advance past previous tick {}",
                    params.tick, prev.tick
                )));
            }
        }

        let current = starting_activations(topology, previous);
        let activations = evolve(topology, &current, self.config.dynamics.coupling);

        let blend = topology.metrics().tier_blend;
        let tiers: Vec<TierSummary> = topology
            .tiers()
            .map(|spec| {
                let values: Vec<f64> = topology
                    .get_tier_members(spec.id)
                    .iter()
                    .map(|n| activations.get(&n.id).copied().unwrap_or(n.state))
                    .collect();
                let intra = topology.intra_tier_edges(spec.id).count();
                summarize_tier(spec.id, spec.weight, &values, intra, blend.state, blend.density)
            })
            .collect();

        let mean_weight = mean_edge_weight(topology);
        let components = PhiComponents {
            quantum: entanglement_score(mean_weight, self.config.entanglement.baseline),
            neural: coherence(topology, &activations),
            classical: tiers.iter().map(|t| t.weight * t.contribution).sum::<f64>().clamp(0.0, 1.0),
        };

        let mixing = topology.metrics().mixing;
        let raw_phi = self.config.phi.scale
            * (mixing.quantum * components.quantum
                + mixing.neural * components.neural
                + mixing.classical * components.classical);
        let previous_phi = previous.map(|p| p.phi_total).unwrap_or(0.0);
        let phi_total = next_phi(raw_phi, previous_phi, &self.config.phi);

        let t = params.tick as f64 * self.config.time_step;
        let energy = energy_at(&self.config.energy, t);

        let state = GlobalState {
            tick: params.tick,
            timestamp: params.timestamp,
            phi_total,
            components,
            entanglement: components.quantum,
            resonance_hz: self.config.resonance.frequency_hz,
            energy,
            awareness_level: AwarenessLevel::from_phi(phi_total),
            tiers,
            activations,
        };
        check_finite(&state)?;
        Ok(state)
    }
}

/// `E(t) = E(0)·exp(γt)`, clamped to `max`.
pub fn energy_at(energy: &EnergyConfig, t: f64) -> f64 {
    if energy.initial == 0.0 {
        return 0.0;
    }
    let e = energy.initial * (energy.gamma * t).exp();
    if e.is_finite() {
        e.min(energy.max)
    } else {
        energy.max
    }
}

/// Φ for this tick. Below the ceiling this is `raw`, a function of the
/// current state alone. A raw value above the ceiling moves Φ from
/// `previous` toward the ceiling by `1/(1+g)` of the remaining gap, so the
/// ceiling is approached but never crossed.
pub fn next_phi(raw: f64, previous: f64, phi: &PhiConfig) -> f64 {
    let raw = raw.max(0.0);
    if raw <= phi.ceiling {
        return raw;
    }
    let prev = previous.clamp(0.0, phi.ceiling);
    let next = phi.ceiling - (phi.ceiling - prev) / (1.0 + phi.growth_rate);
    next.clamp(0.0, phi.ceiling)
}

/// Bounded entanglement in `[baseline, 1]` for weights in [0,1].
pub fn entanglement_score(mean_edge_weight: f64, baseline: f64) -> f64 {
    (1.0 - (1.0 - baseline) * (1.0 - mean_edge_weight)).clamp(0.0, 1.0)
}

/// Summarize one tier. A single member contributes exactly its state;
/// fewer than two members means density 0.
pub fn summarize_tier(
    tier: u8,
    weight: f64,
    values: &[f64],
    intra_edges: usize,
    state_weight: f64,
    density_weight: f64,
) -> TierSummary {
    let n = values.len();
    let (mean, variance) = if n == 0 {
        (0.0, 0.0)
    } else {
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        (mean, variance)
    };
    let density = if n < 2 {
        0.0
    } else {
        let pairs = (n * (n - 1) / 2) as f64;
        (intra_edges as f64 / pairs).min(1.0)
    };
    let contribution = if n == 1 {
        mean
    } else {
        state_weight * mean + density_weight * density
    };
    TierSummary { tier, mean, variance, density, weight, contribution }
}

fn starting_activations(topology: &Topology, previous: Option<&GlobalState>) -> BTreeMap<String, f64> {
    topology
        .nodes()
        .map(|n| {
            let carried = previous.and_then(|p| p.activations.get(&n.id)).copied();
            let value = carried.filter(|v| v.is_finite()).unwrap_or(n.state);
            (n.id.clone(), value.clamp(0.0, 1.0))
        })
        .collect()
}

/// One diffusion step: each node moves `coupling` of the way toward the
/// edge-weighted mean of its neighbors. Edges are undirected here.
fn evolve(topology: &Topology, current: &BTreeMap<String, f64>, coupling: f64) -> BTreeMap<String, f64> {
    // (Σ w·a_neighbor, Σ w) per node
    let mut pulls: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for e in topology.edges() {
        let a_source = current.get(&e.source).copied().unwrap_or(0.0);
        let a_target = current.get(&e.target).copied().unwrap_or(0.0);
        let s = pulls.entry(e.source.as_str()).or_insert((0.0, 0.0));
        s.0 += e.weight * a_target;
        s.1 += e.weight;
        let t = pulls.entry(e.target.as_str()).or_insert((0.0, 0.0));
        t.0 += e.weight * a_source;
        t.1 += e.weight;
    }

    current
        .iter()
        .map(|(id, &a)| {
            let next = match pulls.get(id.as_str()) {
                Some(&(weighted, total)) if total > 0.0 => {
                    let neighbor_mean = weighted / total;
                    a + coupling * (neighbor_mean - a)
                }
                _ => a,
            };
            (id.clone(), next.clamp(0.0, 1.0))
        })
        .collect()
}

/// `1 - Σ w|Δa| / Σ w` over all edges; 0 without edge weight.
fn coherence(topology: &Topology, activations: &BTreeMap<String, f64>) -> f64 {
    let mut total = 0.0;
    let mut disagreement = 0.0;
    for e in topology.edges() {
        let a = activations.get(&e.source).copied().unwrap_or(0.0);
        let b = activations.get(&e.target).copied().unwrap_or(0.0);
        total += e.weight;
        disagreement += e.weight * (a - b).abs();
    }
    if total <= 0.0 {
        return 0.0;
    }
    (1.0 - disagreement / total).clamp(0.0, 1.0)
}

fn mean_edge_weight(topology: &Topology) -> f64 {
    let edges = topology.edges();
    if edges.is_empty() {
        return 0.0;
    }
    edges.iter().map(|e| e.weight).sum::<f64>() / edges.len() as f64
}

fn validate_weights(topology: &Topology) -> Result<()> {
    let tier_weights: Vec<f64> = topology.tiers().map(|t| t.weight).collect();
    check_convex("tier weights", &tier_weights)?;
    let m = topology.metrics().mixing;
    check_convex("mixing weights", &[m.quantum, m.neural, m.classical])?;
    let b = topology.metrics().tier_blend;
    check_convex("tier blend", &[b.state, b.density])?;
    Ok(())
}

fn check_convex(name: &str, weights: &[f64]) -> Result<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::computation(format!("{} must be finite and non-negative: {:?}", name, weights)));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(Error::computation(format!("{} sum to {} instead of 1", name, sum)));
    }
    Ok(())
}

fn check_finite(state: &GlobalState) -> Result<()> {
    let scalars = [
        state.phi_total,
        state.components.quantum,
        state.components.neural,
        state.components.classical,
        state.entanglement,
        state.energy,
    ];
    if scalars.iter().any(|v| !v.is_finite()) {
        return Err(Error::computation(format!("tick {} produced a non-finite metric", state.tick)));
    }
    Ok(())
}

fn unit(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}
