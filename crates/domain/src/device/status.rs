//! Device lifecycle status and its state machine.
//!
//! ```text
//! discovered → pairing → paired → online ⇄ offline
//!                                   ↕        ↕
//!                                  error ────┘
//! (any) → removed (terminal)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a device stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Discovered,
    Pairing,
    Paired,
    Online,
    Offline,
    Error,
    Removed,
}

impl DeviceStatus {
    pub const ALL: [Self; 7] = [
        Self::Discovered,
        Self::Pairing,
        Self::Paired,
        Self::Online,
        Self::Offline,
        Self::Error,
        Self::Removed,
    ];

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Self-transitions are accepted as no-op refreshes.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use DeviceStatus::{Discovered, Error, Offline, Online, Paired, Pairing, Removed};

        if self == next {
            return true;
        }
        match self {
            Discovered => matches!(next, Pairing | Removed),
            Pairing => matches!(next, Paired | Discovered | Removed),
            Paired => matches!(next, Online | Offline | Error | Removed),
            Online => matches!(next, Offline | Error | Removed),
            Offline => matches!(next, Online | Error | Removed),
            Error => matches!(next, Online | Offline | Removed),
            Removed => false,
        }
    }

    /// Whether pairing has completed for a device in this status.
    #[must_use]
    pub fn is_paired(self) -> bool {
        matches!(self, Self::Paired | Self::Online | Self::Offline | Self::Error)
    }

    /// Whether the device is currently talking to the hub.
    #[must_use]
    pub fn is_reachable(self) -> bool {
        matches!(self, Self::Online)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Removed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Pairing => "pairing",
            Self::Paired => "paired",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for [`DeviceStatus::from_str`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device status {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for DeviceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeviceStatus::{Discovered, Error, Offline, Online, Paired, Pairing, Removed};

    #[test]
    fn should_follow_the_happy_path() {
        let path = [Discovered, Pairing, Paired, Online, Offline, Online, Removed];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn should_recover_from_error_to_online_or_offline() {
        assert!(Online.can_transition_to(Error));
        assert!(Error.can_transition_to(Online));
        assert!(Error.can_transition_to(Offline));
    }

    #[test]
    fn should_reject_online_before_pairing() {
        assert!(!Discovered.can_transition_to(Online));
        assert!(!Pairing.can_transition_to(Online));
    }

    #[test]
    fn should_treat_removed_as_terminal() {
        for next in DeviceStatus::ALL {
            if next != Removed {
                assert!(!Removed.can_transition_to(next), "removed -> {next}");
            }
        }
        assert!(Removed.is_terminal());
    }

    #[test]
    fn should_allow_removal_from_every_live_status() {
        for status in DeviceStatus::ALL {
            assert!(status.can_transition_to(Removed), "{status} -> removed");
        }
    }

    #[test]
    fn should_report_paired_statuses() {
        assert!(Paired.is_paired());
        assert!(Error.is_paired());
        assert!(!Discovered.is_paired());
        assert!(!Removed.is_paired());
    }

    #[test]
    fn should_roundtrip_through_from_str() {
        for status in DeviceStatus::ALL {
            assert_eq!(status.as_str().parse::<DeviceStatus>().unwrap(), status);
        }
        assert!("zombie".parse::<DeviceStatus>().is_err());
    }

    #[test]
    fn should_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Online).unwrap(), "\"online\"");
    }
}
