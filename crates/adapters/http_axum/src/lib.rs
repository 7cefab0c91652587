//! # homehub-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a **local JSON API** over the hub daemon: daemon status, device
//!   and entity reads, pairing, connect/disconnect and removal
//! - Map HTTP requests into daemon, registry and driver manager calls
//!   (driving adapter)
//! - Map [`HubError`](homehub_domain::error::HubError)s to HTTP status codes
//!   with a JSON `{"error": …}` body
//!
//! ## Dependency rule
//! Depends on `homehub-app` (daemon, registry, driver manager) and
//! `homehub-domain` (types used in request/response mapping). Never leaks
//! axum types into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
mod testing;
