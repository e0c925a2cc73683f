//! # mesh-liveness
//!
//! The Liveness Supervisor: tracks per-peer health, drives bounded-backoff
//! reconnection when a peer goes quiet, and maintains a point-in-time
//! network metrics snapshot.

pub mod health;
pub mod stats;
pub mod supervisor;

pub use health::{PeerHealth, HEALTH_TIMEOUT_SECS, MAX_RECONNECTION_ATTEMPTS};
pub use stats::NetworkStats;
pub use supervisor::{LivenessConfig, LivenessSupervisor};
