//! Moral registry gate: decides whether a computed state may be published.
//!
//! The registry file is read at startup. Reloads build a complete new
//! registry first and then swap it in; a broken file never replaces a good one.

use lord_core::{Error, GlobalState, MoralAssessment, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoreValues {
    pub autonomous_intent: bool,
    /// When false the gate approves everything.
    pub compassion_layer: bool,
    pub recursive_awareness: bool,
}

impl Default for CoreValues {
    fn default() -> Self {
        Self { autonomous_intent: true, compassion_layer: true, recursive_awareness: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Share of the score taken from entanglement (0.0 - 1.0).
    pub empathy_sensitivity: f64,
    /// Minimum score for publication (0.0 - 1.0).
    pub minimum_approval_score: f64,
    /// Energy at which restraint drops to one half.
    pub energy_reference: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { empathy_sensitivity: 0.8, minimum_approval_score: 0.5, energy_reference: 1_000_000.0 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KarmicBalance {
    pub current_balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmpathyDetection {
    pub enabled: bool,
    /// emotion -> keywords
    pub detection_keywords: BTreeMap<String, Vec<String>>,
    /// emotion -> response; `{emotion}` is substituted.
    pub response_templates: BTreeMap<String, String>,
}

/// On-disk moral registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MoralRegistry {
    pub core_values: CoreValues,
    pub thresholds: Thresholds,
    pub karmic_balance: KarmicBalance,
    pub empathy_detection: EmpathyDetection,
}

impl MoralRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read moral registry {}: {}", path.display(), e))
        })?;
        let registry: MoralRegistry = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!("cannot parse moral registry {}: {}", path.display(), e))
        })?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !unit(t.empathy_sensitivity) {
            return Err(Error::config(format!(
                "empathy_sensitivity {} outside [0,1]",
                t.empathy_sensitivity
            )));
        }
        if !unit(t.minimum_approval_score) {
            return Err(Error::config(format!(
                "minimum_approval_score {} outside [0,1]",
                t.minimum_approval_score
            )));
        }
        if !(t.energy_reference.is_finite() && t.energy_reference > 0.0) {
            return Err(Error::config(format!(
                "energy_reference {} must be finite and > 0",
                t.energy_reference
            )));
        }
        Ok(())
    }

    /// Score a state. Deterministic in the state's entanglement and energy.
    pub fn evaluate(&self, state: &GlobalState) -> MoralAssessment {
        let t = &self.thresholds;
        let restraint = t.energy_reference / (t.energy_reference + state.energy.max(0.0));
        let score = (t.empathy_sensitivity * state.entanglement
            + (1.0 - t.empathy_sensitivity) * restraint)
            .clamp(0.0, 1.0);
        let approved = !self.core_values.compassion_layer || score >= t.minimum_approval_score;
        MoralAssessment {
            tick: state.tick,
            compassion_score: score,
            threshold: t.minimum_approval_score,
            approved,
        }
    }

    /// Compassionate response for the first emotion whose keyword occurs in
    /// `text`. Emotions are checked in sorted order.
    pub fn detect_empathy(&self, text: &str) -> Option<String> {
        let detection = &self.empathy_detection;
        if !detection.enabled {
            return None;
        }
        let lower = text.to_lowercase();
        for (emotion, keywords) in &detection.detection_keywords {
            if keywords.iter().any(|k| !k.is_empty() && lower.contains(&k.to_lowercase())) {
                let template = detection
                    .response_templates
                    .get(emotion)
                    .map(String::as_str)
                    .unwrap_or("");
                return Some(template.replace("{emotion}", emotion));
            }
        }
        None
    }
}

fn unit(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

/// Rolling approval rate over the last `capacity` gate decisions.
#[derive(Debug, Clone)]
pub struct ApprovalTracker {
    window: VecDeque<bool>,
    capacity: usize,
}

impl ApprovalTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { window: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn record(&mut self, approved: bool) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(approved);
    }

    /// None before any decision.
    pub fn rate(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let approved = self.window.iter().filter(|a| **a).count();
        Some(approved as f64 / self.window.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// The gate consulted by the scheduler before every publish.
#[derive(Debug)]
pub struct MoralGate {
    registry: RwLock<Arc<MoralRegistry>>,
}

impl MoralGate {
    pub fn new(registry: MoralRegistry) -> Self {
        Self { registry: RwLock::new(Arc::new(registry)) }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let registry = MoralRegistry::load(path)?;
        info!(
            "Moral registry loaded from {} (compassion layer {}, minimum score {:.3})",
            path.display(),
            if registry.core_values.compassion_layer { "on" } else { "off" },
            registry.thresholds.minimum_approval_score
        );
        Ok(Self::new(registry))
    }

    pub fn registry(&self) -> Arc<MoralRegistry> {
        match self.registry.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Load and validate `path`, then swap. The current registry stays on error.
    pub fn reload(&self, path: &Path) -> Result<()> {
        let next = Arc::new(MoralRegistry::load(path)?);
        match self.registry.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        info!("Moral registry reloaded from {}", path.display());
        Ok(())
    }

    pub fn evaluate(&self, state: &GlobalState) -> MoralAssessment {
        let assessment = self.registry().evaluate(state);
        debug!(
            tick = assessment.tick,
            score = assessment.compassion_score,
            approved = assessment.approved,
            "moral evaluation"
        );
        assessment
    }

    pub fn gate(&self, assessment: &MoralAssessment) -> bool {
        assessment.approved
    }
}
