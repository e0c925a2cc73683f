//! # mesh-core
//!
//! Shared types for the mesh networking stack: peer identity, the wire
//! envelope format, error taxonomy, and network events. Every other crate
//! in the workspace depends on this one; it depends on nothing internal.

pub mod envelope;
pub mod error;
pub mod event;
pub mod identity;

pub use envelope::*;
pub use error::*;
pub use event::*;
pub use identity::*;
