//! # homehub-domain
//!
//! Pure domain model for the homehub daemon.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Devices** (accessories bound to one protocol) and their
//!   lifecycle state machine
//! - Define **Entities** (facets of a device) and the closed **Capability**
//!   set that describes them
//! - Define **Pairing sessions**, **driver events** and the daemon status
//!   report
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod credentials;
pub mod device;
pub mod entity;
pub mod event;
pub mod pairing;
pub mod protocol;
pub mod status;
