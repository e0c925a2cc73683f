//! Delivery errors: re-exports the shared fragmentation/reassembly taxonomy.

pub use mesh_core::error::DeliveryError;

pub type DeliveryResult<T> = Result<T, DeliveryError>;
