//! Pairing sessions — one ephemeral commissioning attempt.
//!
//! Sessions live in memory for the duration of an attempt (plus a short
//! diagnostic history) and are never persisted.

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::entity::Entity;
use crate::id::{DeviceId, PairingSessionId};
use crate::protocol::ProtocolTag;
use crate::time::Timestamp;

/// What the caller wants to pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingTarget {
    /// Device to pair. A provisional id is minted when absent.
    pub device_id: Option<DeviceId>,
    /// Display name to record on success.
    pub name: Option<String>,
    /// Key material or connection parameters submitted by the operator.
    pub credentials: Option<Credentials>,
}

impl PairingTarget {
    #[must_use]
    pub fn device(device_id: DeviceId) -> Self {
        Self {
            device_id: Some(device_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// What a driver learned while pairing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairingReport {
    /// Canonical id assigned by the protocol (replaces a provisional id).
    pub device_id: Option<DeviceId>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    /// Normalised credentials to persist; falls back to the submitted ones.
    pub credentials: Option<Credentials>,
    /// Entities the device exposes. `device_id` on each is rewritten to the
    /// final device id before persisting.
    pub entities: Vec<Entity>,
}

/// Result of a finished pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PairingOutcome {
    Success { device_id: DeviceId },
    Failure { reason: String },
}

/// One commissioning attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingSession {
    pub id: PairingSessionId,
    pub device_id: DeviceId,
    pub provisional: bool,
    pub protocol: ProtocolTag,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub outcome: Option<PairingOutcome>,
}

impl PairingSession {
    /// Open a session for `device_id`.
    #[must_use]
    pub fn open(
        device_id: DeviceId,
        protocol: ProtocolTag,
        credentials: Option<Credentials>,
        at: Timestamp,
    ) -> Self {
        Self {
            id: PairingSessionId::new(),
            provisional: device_id.is_provisional(),
            device_id,
            protocol,
            credentials,
            started_at: at,
            finished_at: None,
            outcome: None,
        }
    }

    pub fn succeed(&mut self, device_id: DeviceId, at: Timestamp) {
        self.device_id = device_id.clone();
        self.provisional = false;
        self.finished_at = Some(at);
        self.outcome = Some(PairingOutcome::Success { device_id });
    }

    pub fn fail(&mut self, reason: impl Into<String>, at: Timestamp) {
        self.finished_at = Some(at);
        self.outcome = Some(PairingOutcome::Failure {
            reason: reason.into(),
        });
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}
