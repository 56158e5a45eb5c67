//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to a runner via mpsc
//! 2. **Events**: Samples and status changes go out on the event bus, not here

use tokio::sync::oneshot;

use super::status::Outcome;
use crate::storage::MonitorStatus;

/// Commands that can be sent to a MonitorRunnerActor
#[derive(Debug)]
pub enum RunnerCommand {
    /// Run a check cycle now (bypassing the interval timer)
    CheckNow {
        /// Receives the outcome once the cycle has completed
        respond_to: oneshot::Sender<Outcome>,
    },

    /// Query the current status
    GetStatus {
        respond_to: oneshot::Sender<MonitorStatus>,
    },

    /// Stop after the current cycle
    Shutdown,
}
