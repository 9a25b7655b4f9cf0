//! Topology store: the static node/edge graph and its metric weights.
//!
//! Loaded once and read-only afterwards. Updates replace the whole
//! `Topology` behind an `Arc`, so readers always hold a complete graph.

use lord_core::{Edge, Error, Node, Result, MAX_TIER, MIN_TIER};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Declared counts, cross-checked against the listed entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Totals {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierSpec {
    pub id: u8,
    #[serde(default)]
    pub name: String,
    pub weight: f64,
}

/// Weights of the three Φ components.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MixingWeights {
    pub quantum: f64,
    pub neural: f64,
    pub classical: f64,
}

impl Default for MixingWeights {
    fn default() -> Self {
        Self { quantum: 0.4, neural: 0.3, classical: 0.3 }
    }
}

/// How a tier's contribution blends mean state and edge density.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierBlend {
    pub state: f64,
    pub density: f64,
}

impl Default for TierBlend {
    fn default() -> Self {
        Self { state: 0.7, density: 0.3 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricWeights {
    pub mixing: MixingWeights,
    pub tier_blend: TierBlend,
}

/// On-disk shape of the topology file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyFile {
    #[serde(default)]
    pub entity: Option<String>,
    pub totals: Totals,
    pub tiers: Vec<TierSpec>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub metrics: MetricWeights,
}

/// A validated graph. Nodes are keyed and iterated by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    entity: Option<String>,
    tiers: BTreeMap<u8, TierSpec>,
    nodes: BTreeMap<String, Node>,
    edges: Vec<Edge>,
    metrics: MetricWeights,
}

impl Topology {
    /// Read and validate a topology file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read topology {}: {}", path.display(), e))
        })?;
        let file: TopologyFile = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!("cannot parse topology {}: {}", path.display(), e))
        })?;
        let topology = Self::from_file(file)?;
        info!(
            "Loaded topology from {}: {} nodes, {} tiers, {} edges",
            path.display(),
            topology.node_count(),
            topology.tier_count(),
            topology.edge_count()
        );
        Ok(topology)
    }

    /// Validate structure. Weight sums are left to the engine.
    pub fn from_file(file: TopologyFile) -> Result<Self> {
        if file.totals.nodes != file.nodes.len() {
            return Err(Error::config(format!(
                "declared {} nodes but {} listed",
                file.totals.nodes,
                file.nodes.len()
            )));
        }
        if file.totals.edges != file.edges.len() {
            return Err(Error::config(format!(
                "declared {} edges but {} listed",
                file.totals.edges,
                file.edges.len()
            )));
        }

        let mut tiers = BTreeMap::new();
        for spec in file.tiers {
            check_tier_id(spec.id)?;
            if !spec.weight.is_finite() {
                return Err(Error::config(format!("tier {} weight is not finite", spec.id)));
            }
            let id = spec.id;
            if tiers.insert(id, spec).is_some() {
                return Err(Error::config(format!("tier {} declared twice", id)));
            }
        }

        let mut nodes = BTreeMap::new();
        for node in file.nodes {
            check_tier_id(node.tier)?;
            if !tiers.contains_key(&node.tier) {
                return Err(Error::config(format!(
                    "node {} is in undeclared tier {}",
                    node.id, node.tier
                )));
            }
            if !unit_interval(node.state) {
                return Err(Error::config(format!(
                    "node {} state {} outside [0,1]",
                    node.id, node.state
                )));
            }
            let id = node.id.clone();
            if nodes.insert(id.clone(), node).is_some() {
                return Err(Error::config(format!("node {} declared twice", id)));
            }
        }

        // Tier ids must partition the node set: no empty declared tier.
        let populated: BTreeSet<u8> = nodes.values().map(|n| n.tier).collect();
        if let Some(empty) = tiers.keys().find(|t| !populated.contains(*t)) {
            return Err(Error::config(format!("tier {} has no nodes", empty)));
        }

        let mut seen_pairs = HashSet::new();
        for edge in &file.edges {
            for end in [&edge.source, &edge.target] {
                if !nodes.contains_key(end) {
                    return Err(Error::config(format!(
                        "edge {} -> {} references unknown node {}",
                        edge.source, edge.target, end
                    )));
                }
            }
            if edge.source == edge.target {
                return Err(Error::config(format!("self-loop on node {}", edge.source)));
            }
            if !unit_interval(edge.weight) {
                return Err(Error::config(format!(
                    "edge {} -> {} weight {} outside [0,1]",
                    edge.source, edge.target, edge.weight
                )));
            }
            let (a, b) = edge.pair();
            if !seen_pairs.insert((a.to_string(), b.to_string())) {
                return Err(Error::config(format!("duplicate edge between {} and {}", a, b)));
            }
        }

        Ok(Self {
            entity: file.entity,
            tiers,
            nodes,
            edges: file.edges,
            metrics: file.metrics,
        })
    }

    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Declared tiers in ascending id order.
    pub fn tiers(&self) -> impl Iterator<Item = &TierSpec> {
        self.tiers.values()
    }

    /// All nodes ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn metrics(&self) -> &MetricWeights {
        &self.metrics
    }

    /// Members of `tier`, ordered by node id. Empty for an unknown tier.
    pub fn get_tier_members(&self, tier: u8) -> Vec<&Node> {
        self.nodes.values().filter(|n| n.tier == tier).collect()
    }

    /// Edges whose endpoints both lie in `tier`.
    pub fn intra_tier_edges(&self, tier: u8) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| {
            self.tier_of(&e.source) == Some(tier) && self.tier_of(&e.target) == Some(tier)
        })
    }

    fn tier_of(&self, id: &str) -> Option<u8> {
        self.nodes.get(id).map(|n| n.tier)
    }
}

fn check_tier_id(tier: u8) -> Result<()> {
    if !(MIN_TIER..=MAX_TIER).contains(&tier) {
        return Err(Error::config(format!(
            "tier {} outside {}-{}",
            tier, MIN_TIER, MAX_TIER
        )));
    }
    Ok(())
}

fn unit_interval(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

/// Shared handle to the current topology. Readers take a snapshot `Arc`;
/// `replace` swaps the pointer in one step.
#[derive(Debug)]
pub struct TopologyStore {
    current: RwLock<Arc<Topology>>,
}

impl TopologyStore {
    pub fn new(topology: Topology) -> Self {
        Self { current: RwLock::new(Arc::new(topology)) }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(Topology::load(path)?))
    }

    pub fn snapshot(&self) -> Arc<Topology> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, topology: Topology) {
        let next = Arc::new(topology);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Load `path` and swap it in. On failure the current topology stays.
    pub fn reload(&self, path: &Path) -> Result<()> {
        let topology = Topology::load(path)?;
        self.replace(topology);
        Ok(())
    }
}
