//! # mesh-routing
//!
//! The overlay routing engine: a destination-keyed next-hop table, a
//! recent-message cache for loop and duplicate suppression, and the
//! [`RoutingEngine`] that dispatches envelopes using the Direct, Flood,
//! Multipath, and DiscoverRoute strategies.

pub mod error;
pub mod recent;
pub mod router;
pub mod table;

pub use error::{RoutingResult, NoRouteError};
pub use recent::RecentMessageCache;
pub use router::RoutingEngine;
pub use table::RoutingTable;
