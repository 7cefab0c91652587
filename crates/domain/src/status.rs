//! Daemon lifecycle state and the aggregated status report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DeviceStatus;

/// Lifecycle of the hub daemon.
///
/// `created → initializing → ready → running → stopping → stopped`, with
/// `error` reachable from `initializing` and `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    #[default]
    Created,
    Initializing,
    Ready,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        })
    }
}

/// Per-protocol connection summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSummary {
    /// Non-removed devices bound to the protocol.
    pub devices: usize,
    pub online: usize,
    pub offline: usize,
    pub error: usize,
    pub pairing: usize,
    /// Driver sessions currently reporting `is_connected`.
    pub connected: usize,
}

impl ProtocolSummary {
    /// Count one device in `status`.
    pub fn record(&mut self, status: DeviceStatus) {
        if status == DeviceStatus::Removed {
            return;
        }
        self.devices += 1;
        match status {
            DeviceStatus::Online => self.online += 1,
            DeviceStatus::Offline => self.offline += 1,
            DeviceStatus::Error => self.error += 1,
            DeviceStatus::Pairing => self.pairing += 1,
            DeviceStatus::Discovered | DeviceStatus::Paired | DeviceStatus::Removed => {}
        }
    }
}

/// Snapshot returned by `get_status`.
///
/// Per-status counts come from the registry and `connected` from live driver
/// sessions. Before the daemon is started they can disagree: devices stored
/// as `online` are only moved to `offline` when `start` resumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub state: DaemonState,
    pub device_count: usize,
    pub protocols: BTreeMap<String, ProtocolSummary>,
}
