//! Per-run item tracking.
//!
//! The tracker is created once per invocation and handed to every stage
//! call. It records each item's state and a timestamped log, and forwards
//! every entry to `tracing` with the run, item and stage attached.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{ObjectIdentifier, Stage};

/// A single log entry with timestamp and message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: Option<Stage>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Where an item is in the stage chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Acquired,
    Preprocessed,
    Detected,
    Published,
    Failed { stage: Stage, reason: String },
}

impl ItemState {
    /// State reached when `stage` succeeds.
    pub fn after(stage: Stage) -> ItemState {
        match stage {
            Stage::Catalog => ItemState::Pending,
            Stage::Acquisition => ItemState::Acquired,
            Stage::Preprocessing => ItemState::Preprocessed,
            Stage::Detection => ItemState::Detected,
            Stage::Publishing => ItemState::Published,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ItemState::Failed { .. })
    }
}

/// Item state and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub identifier: ObjectIdentifier,
    pub state: ItemState,
    pub logs: Vec<LogEntry>,
    pub updated_at: DateTime<Utc>,
}

impl ItemRecord {
    fn new(identifier: ObjectIdentifier) -> Self {
        Self {
            identifier,
            state: ItemState::Pending,
            logs: vec![],
            updated_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct TrackerState {
    items: HashMap<ObjectIdentifier, ItemRecord>,
    // Registration order, for stable reporting.
    order: Vec<ObjectIdentifier>,
}

impl TrackerState {
    fn entry(&mut self, identifier: &ObjectIdentifier) -> &mut ItemRecord {
        if !self.items.contains_key(identifier) {
            self.order.push(identifier.clone());
        }
        self.items
            .entry(identifier.clone())
            .or_insert_with(|| ItemRecord::new(identifier.clone()))
    }
}

/// In-memory run tracker, cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct RunTracker {
    run_id: Uuid,
    state: Arc<RwLock<TrackerState>>,
}

impl RunTracker {
    /// Create a tracker for a new run.
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    pub fn with_run_id(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: Arc::new(RwLock::new(TrackerState::default())),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Register items as `Pending`. Already-known items are left untouched.
    pub fn register(&self, identifiers: &[ObjectIdentifier]) {
        let mut state = self.state.write();
        for id in identifiers {
            state.entry(id);
        }
    }

    /// Add a log entry to an item and emit it as a tracing event.
    pub fn log(
        &self,
        identifier: &ObjectIdentifier,
        stage: Stage,
        level: LogLevel,
        message: impl Into<String>,
    ) {
        let message = message.into();
        emit(self.run_id, identifier, stage, level, &message);

        let mut state = self.state.write();
        let record = state.entry(identifier);
        record.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            stage: Some(stage),
            message,
        });
        record.updated_at = Utc::now();
    }

    /// Record that `stage` succeeded for an item.
    pub fn advance(&self, identifier: &ObjectIdentifier, stage: Stage) {
        self.log(
            identifier,
            stage,
            LogLevel::Success,
            format!("✓ {} complete", stage),
        );
        let mut state = self.state.write();
        state.entry(identifier).state = ItemState::after(stage);
    }

    /// Mark an item as failed at `stage`.
    pub fn fail(&self, identifier: &ObjectIdentifier, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        self.log(identifier, stage, LogLevel::Error, reason.clone());
        let mut state = self.state.write();
        state.entry(identifier).state = ItemState::Failed { stage, reason };
    }

    pub fn state(&self, identifier: &ObjectIdentifier) -> Option<ItemState> {
        self.state.read().items.get(identifier).map(|r| r.state.clone())
    }

    pub fn logs(&self, identifier: &ObjectIdentifier) -> Vec<LogEntry> {
        self.state
            .read()
            .items
            .get(identifier)
            .map(|r| r.logs.clone())
            .unwrap_or_default()
    }

    /// All records in registration order.
    pub fn records(&self) -> Vec<ItemRecord> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect()
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn emit(run_id: Uuid, identifier: &ObjectIdentifier, stage: Stage, level: LogLevel, message: &str) {
    match level {
        LogLevel::Info | LogLevel::Success => {
            tracing::info!(%run_id, item = %identifier, %stage, "{}", message)
        }
        LogLevel::Warning => tracing::warn!(%run_id, item = %identifier, %stage, "{}", message),
        LogLevel::Error => tracing::error!(%run_id, item = %identifier, %stage, "{}", message),
    }
}
