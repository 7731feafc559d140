//! Configuration types
//!
//! Device configurations, the configuration guard, and (with the `serde`
//! feature) postcard persistence.

#[cfg(feature = "serde")]
pub mod store;
pub mod types;

#[cfg(feature = "serde")]
pub use store::StoreError;
pub use types::*;
