//! # homehub-app
//!
//! Application layer — the daemon core and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `DeviceStore` — local persistence of devices and entities
//!   - `ProtocolDriver` / `DriverFactory` — one protocol family (ESPHome,
//!     Matter, …) behind a uniform connect/pair/disconnect contract
//! - Provide the core services:
//!   - `DriverRegistry` — protocol tag → driver factory, populated at startup
//!   - `DeviceRegistry` — write-through device/entity state, serialized per id
//!   - `DriverManager` — pairing and connection supervision with timeouts and
//!     cancellation, isolated per device
//!   - `HubDaemon` — lifecycle supervisor owning all of the above
//!
//! ## Dependency rule
//! Depends on `homehub-domain` only (plus `tokio` sync/time primitives).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod daemon;
pub mod driver_manager;
pub mod driver_registry;
pub mod ports;
pub mod registry;

#[cfg(test)]
mod testing;
