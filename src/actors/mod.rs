//! Actor-based monitor scheduling
//!
//! Each active monitor runs as an independent async task communicating via
//! Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │  MonitorManager  │  registry: monitor id → runner
//!                  └────────┬─────────┘
//!                           │ start / stop / restart
//!            ┌──────────────┼──────────────┐
//!    ┌───────▼───────┐              ┌───────▼───────┐
//!    │  Runner (A)   │     ...      │  Runner (N)   │
//!    └───────┬───────┘              └───────┬───────┘
//!            │ probe → state machine → store → notify
//!            └──────────────┬──────────────┘
//!                  ┌────────▼─────────┐
//!                  │    Event Bus     │ (broadcast, per workspace)
//!                  └──────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each runner has an mpsc command channel for control messages
//! 2. **Events**: Samples and transitions go out on the broadcast event bus
//! 3. **Request/Response**: oneshot channels for check-now and status queries

pub mod manager;
pub mod messages;
pub mod runner;
pub mod status;
