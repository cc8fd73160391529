//! Deployment events and the broadcast bus that delivers them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use gantry_core::{FeatureId, ModuleId, RegionId};

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Common metadata attached to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Component that emitted the event.
    pub source: String,
}

impl EventMetadata {
    /// Create metadata stamped with the current time.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

/// Feature lifecycle transition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureEventKind {
    /// The feature became installed in its region.
    Installed,
    /// The feature was removed from its region.
    Uninstalled,
}

/// A feature crossing the installed/uninstalled boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// The feature that changed.
    pub feature: FeatureId,
    /// The region it changed in.
    pub region: RegionId,
    /// Which way it crossed.
    pub kind: FeatureEventKind,
    /// `false` for live transitions, `true` when re-announcing already
    /// installed features to a newly attached listener.
    pub replay: bool,
}

/// Events published over the bus during a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeployEvent {
    /// A reconciliation began.
    DeploymentStarted {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// Modules were installed into a region.
    ModulesInstalled {
        /// Event metadata.
        metadata: EventMetadata,
        /// The region installed into.
        region: RegionId,
        /// The modules installed.
        modules: Vec<ModuleId>,
    },
    /// The resolver's wiring was handed to the runtime.
    ModulesResolved {
        /// Event metadata.
        metadata: EventMetadata,
    },
    /// A reconciliation finished.
    DeploymentFinished {
        /// Event metadata.
        metadata: EventMetadata,
        /// Whether any module or feature actually changed.
        changed: bool,
    },
    /// A feature lifecycle transition.
    Feature(FeatureEvent),
}

impl DeployEvent {
    /// Stable name of the event variant, for logs and filtering.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DeploymentStarted { .. } => "deployment_started",
            Self::ModulesInstalled { .. } => "modules_installed",
            Self::ModulesResolved { .. } => "modules_resolved",
            Self::DeploymentFinished { .. } => "deployment_finished",
            Self::Feature(event) => match event.kind {
                FeatureEventKind::Installed => "feature_installed",
                FeatureEventKind::Uninstalled => "feature_uninstalled",
            },
        }
    }
}

/// Broadcast bus delivering [`DeployEvent`]s to all subscribers.
///
/// Events are delivered asynchronously and in publish order. Clones share
/// the same channel.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DeployEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers that got the event.
    pub fn publish(&self, event: DeployEvent) -> usize {
        let event = Arc::new(event);
        trace!(event_type = %event.event_type(), "Publishing event");
        match self.sender.send(Arc::clone(&event)) {
            Ok(count) => {
                debug!(
                    event_type = %event.event_type(),
                    receiver_count = count,
                    "Event published"
                );
                count
            },
            Err(_) => {
                // No receivers - this is fine
                trace!(event_type = %event.event_type(), "No receivers for event");
                0
            },
        }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// The number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
        }
    }
}

/// Receiver for events from the bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<DeployEvent>>,
}

impl EventReceiver {
    /// Receive the next event, or `None` when the channel closed.
    pub async fn recv(&mut self) -> Option<Arc<DeployEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without blocking; `None` when nothing is pending.
    pub fn try_recv(&mut self) -> Option<Arc<DeployEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}
