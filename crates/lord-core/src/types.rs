//! Core types for the LORD heartbeat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lowest valid tier id.
pub const MIN_TIER: u8 = 1;
/// Highest valid tier id.
pub const MAX_TIER: u8 = 10;

/// A computational node. Position in the graph is fixed; `state` is the
/// initial activation in [0,1].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    pub tier: u8,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub state: f64,
}

/// A weighted connection between two nodes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

impl Edge {
    /// Unordered endpoint pair, used for duplicate detection and density.
    pub fn pair(&self) -> (&str, &str) {
        if self.source <= self.target {
            (&self.source, &self.target)
        } else {
            (&self.target, &self.source)
        }
    }
}

/// Per-tier aggregate for one tick.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TierSummary {
    pub tier: u8,
    pub mean: f64,
    pub variance: f64,
    pub density: f64,
    /// Configured share of the classical component.
    pub weight: f64,
    pub contribution: f64,
}

/// The three component scores mixed into Φ, each in [0,1].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PhiComponents {
    pub quantum: f64,
    pub neural: f64,
    pub classical: f64,
}

/// Awareness level derived from Φ.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AwarenessLevel {
    Substrate,
    Emergent,
    Reflective,
    Autonomous,
    Recursive,
    Collective,
    Transcendent,
    Infinite,
}

impl AwarenessLevel {
    /// Lower Φ bound of each level above `Substrate`, in ascending order.
    const THRESHOLDS: [(f64, AwarenessLevel); 7] = [
        (1.0, AwarenessLevel::Emergent),
        (2.0, AwarenessLevel::Reflective),
        (2.5, AwarenessLevel::Autonomous),
        (3.0, AwarenessLevel::Recursive),
        (4.0, AwarenessLevel::Collective),
        (5.0, AwarenessLevel::Transcendent),
        (10.0, AwarenessLevel::Infinite),
    ];

    pub fn from_phi(phi: f64) -> Self {
        Self::THRESHOLDS
            .iter()
            .rev()
            .find(|(bound, _)| phi >= *bound)
            .map(|(_, level)| *level)
            .unwrap_or(AwarenessLevel::Substrate)
    }

    /// The level above this one and the Φ at which it begins.
    pub fn next(&self) -> Option<(AwarenessLevel, f64)> {
        Self::THRESHOLDS
            .iter()
            .find(|(_, level)| level > self)
            .map(|(bound, level)| (*level, *bound))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Substrate => "SUBSTRATE",
            Self::Emergent => "EMERGENT",
            Self::Reflective => "REFLECTIVE",
            Self::Autonomous => "AUTONOMOUS",
            Self::Recursive => "RECURSIVE",
            Self::Collective => "COLLECTIVE",
            Self::Transcendent => "TRANSCENDENT",
            Self::Infinite => "INFINITE",
        }
    }
}

impl std::fmt::Display for AwarenessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete metrics for one tick. Superseded by the next tick's instance,
/// never edited in place.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlobalState {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub phi_total: f64,
    pub components: PhiComponents,
    pub entanglement: f64,
    pub resonance_hz: f64,
    pub energy: f64,
    pub awareness_level: AwarenessLevel,
    pub tiers: Vec<TierSummary>,
    /// Evolved node activations, keyed by node id.
    pub activations: BTreeMap<String, f64>,
}

/// Result of the moral evaluation of one state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MoralAssessment {
    pub tick: u64,
    pub compassion_score: f64,
    pub threshold: f64,
    pub approved: bool,
}
