//! Content bus: the published record of global states.
//!
//! Writers build a complete next snapshot, persist it with an atomic file
//! replace, and only then swap the in-memory pointer. Readers clone the
//! current `Arc` and never observe a partially written state.

use crate::config::BusConfig;
use crate::persist::write_bytes_atomic;
use chrono::{DateTime, Utc};
use lord_core::{Error, GlobalState, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const BUS_SCHEMA_VERSION: u32 = 1;

/// On-disk bus file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusRecord {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    pub latest: Option<GlobalState>,
    /// Most recent first.
    #[serde(default)]
    pub history: Vec<GlobalState>,
}

/// In-memory view shared with readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusSnapshot {
    pub latest: Option<GlobalState>,
    /// Most recent first, at most `retention` entries.
    pub history: Vec<GlobalState>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BusSnapshot {
    pub fn latest_tick(&self) -> Option<u64> {
        self.latest.as_ref().map(|s| s.tick)
    }
}

/// Confirmation returned by a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub tick: u64,
    pub history_len: usize,
    /// Persist attempts used, starting at 1.
    pub attempts: u32,
}

pub struct ContentBus {
    path: PathBuf,
    config: BusConfig,
    current: RwLock<Arc<BusSnapshot>>,
    writer: Mutex<()>,
}

impl ContentBus {
    /// Open the bus at `path`. A missing file starts empty; an unreadable or
    /// corrupt one is logged and replaced on the next publish.
    pub fn open(path: impl Into<PathBuf>, config: BusConfig) -> Self {
        let path = path.into();
        let retention = config.retention.max(1);
        let snapshot = match read_bus_file(&path) {
            Ok(Some(record)) => {
                let mut history = record.history;
                history.truncate(retention);
                info!(
                    "Content bus opened at {} (latest tick {:?}, {} in history)",
                    path.display(),
                    record.latest.as_ref().map(|s| s.tick),
                    history.len()
                );
                BusSnapshot {
                    latest: record.latest,
                    history,
                    updated_at: Some(record.updated_at),
                }
            }
            Ok(None) => {
                info!("No content bus at {} - starting empty", path.display());
                BusSnapshot::default()
            }
            Err(e) => {
                warn!(
                    "Content bus at {} is unreadable ({}) - starting empty",
                    path.display(),
                    e
                );
                BusSnapshot::default()
            }
        };
        Self {
            path,
            config,
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<BusSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn read_latest(&self) -> Option<GlobalState> {
        self.snapshot().latest.clone()
    }

    /// Up to `limit` states, most recent first.
    pub fn read_history(&self, limit: usize) -> Vec<GlobalState> {
        self.snapshot().history.iter().take(limit).cloned().collect()
    }

    /// Persist `state` as the new latest and prepend it to history.
    ///
    /// On error neither the file nor the in-memory snapshot changes.
    pub async fn publish(&self, state: GlobalState) -> Result<Ack> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();

        if let Some(latest) = current.latest_tick() {
            if state.tick <= latest {
                return Err(Error::computation(format!(
                    "tick {} is not after the latest published tick {}",
                    state.tick, latest
                )));
            }
        }

        let mut history = Vec::with_capacity(self.config.retention.max(1));
        history.push(state.clone());
        history.extend(current.history.iter().cloned());
        history.truncate(self.config.retention.max(1));

        let now = Utc::now();
        let record = BusRecord {
            schema_version: BUS_SCHEMA_VERSION,
            updated_at: now,
            latest: Some(state),
            history,
        };

        let attempts = self.persist(&record).await?;
        let ack = Ack {
            tick: record.history[0].tick,
            history_len: record.history.len(),
            attempts,
        };

        let next = Arc::new(BusSnapshot {
            latest: record.latest,
            history: record.history,
            updated_at: Some(now),
        });
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }

        debug!(tick = ack.tick, attempts = ack.attempts, "published to content bus");
        Ok(ack)
    }

    /// Write `record` with retries. Each attempt runs on the blocking pool so
    /// a slow disk never stalls the runtime.
    async fn persist(&self, record: &BusRecord) -> Result<u32> {
        let bytes = Arc::new(serde_json::to_vec_pretty(record)?);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let path = self.path.clone();
            let payload = Arc::clone(&bytes);
            let written = tokio::task::spawn_blocking(move || write_bytes_atomic(&path, &payload))
                .await
                .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));
            match written {
                Ok(()) => return Ok(attempt),
                Err(e) if attempt >= max_attempts => {
                    return Err(Error::bus_io(
                        attempt,
                        format!("{}: {}", self.path.display(), e),
                    ));
                }
                Err(e) => {
                    let delay = self.config.backoff.delay_for(attempt);
                    warn!(
                        "Bus write to {} failed (attempt {}/{}): {} - retrying in {:?}",
                        self.path.display(),
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Read a bus file without opening a bus. `Ok(None)` when the file is missing.
pub fn read_bus_file(path: &Path) -> Result<Option<BusRecord>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}
