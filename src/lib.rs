//! Monitor scheduling and alerting engine
//!
//! Periodically probes registered targets, tracks an UP/DOWN state machine per
//! monitor, persists samples and transition events, fans notifications out to
//! the attached channels and republishes everything on an in-process event
//! bus for live dashboards.

pub mod actors;
pub mod config;
pub mod event_bus;
pub mod notifications;
pub mod probes;
pub mod storage;

pub use actors::manager::{ManagerError, MonitorManager, MonitorUpsert, NotificationUpsert};
pub use actors::runner::{MonitorRunner, RunnerContext};
pub use actors::status::Outcome;
pub use event_bus::{BusEvent, EventBus};
pub use storage::{MonitorStatus, StorageBackend};
