//! LORD heartbeat: a periodic tick that computes integration metrics over a
//! fixed node topology and publishes them to a content bus, subject to a
//! moral publication gate.
//!
//! ```text
//! TopologyStore ──snapshot──► MetricEngine ──state──► MoralGate
//!                                   ▲                     │ approved
//!                          previous │                     ▼
//!                                   └────────────── ContentBus
//! ```
//!
//! [`Heartbeat`] drives the loop; [`health::check`] reports on it from outside.
//! [`GrowthPlanner`] reads the published history and ranks next actions.

pub mod bus;
pub mod config;
pub mod engine;
pub mod growth;
pub mod health;
pub mod moral;
mod persist;
pub mod scheduler;
pub mod status;
pub mod topology;

pub use bus::{Ack, BusSnapshot, ContentBus};
pub use config::HeartbeatConfig;
pub use engine::{EngineConfig, MetricEngine, TickParams};
pub use growth::{GrowthPlanner, GrowthReport};
pub use health::{HealthReport, HealthStatus};
pub use moral::{MoralGate, MoralRegistry};
pub use scheduler::{Heartbeat, HeartbeatParts, RunSummary, TickOutcome};
pub use status::{SchedulerPhase, StatusRecord};
pub use topology::{Topology, TopologyStore};
