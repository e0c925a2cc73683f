//! Routing errors: re-exports the shared no-route taxonomy.

pub use mesh_core::error::NoRouteError;

pub type RoutingResult<T> = Result<T, NoRouteError>;
