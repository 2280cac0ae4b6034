//! Core types and lifecycle wiring for the Sopbilen waste collection sensor.

/// Persisted config entries, their registry, and the on-disk store.
pub mod entry;
/// Single-step setup flow that registers an address.
pub mod flow;
/// Domain models shared by the provider and the sensor.
pub mod model;
/// Bundle of a provider's metadata and backend.
pub mod plugin;
/// Traits describing provider and platform interfaces.
pub mod ports;
/// The waste collection sensor entity and its update cycle.
pub mod sensor;
/// Integration lifecycle: entry setup, unload, and polling.
pub mod service;

pub use entry::*;
pub use flow::*;
pub use model::*;
pub use plugin::*;
pub use ports::*;
pub use sensor::*;
pub use service::*;
