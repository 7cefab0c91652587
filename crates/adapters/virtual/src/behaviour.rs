//! Failure injection knobs read from device credentials.
//!
//! | Key | Effect |
//! |-----|--------|
//! | `latency_ms` | every call sleeps this long first |
//! | `fail_connect` | `connect` fails with a connection error |
//! | `fail_pair` | `pair` fails with a pairing error |
//! | `hang_connect` | `connect` never completes |

use std::time::Duration;

use homehub_domain::credentials::Credentials;

pub const LATENCY_MS: &str = "latency_ms";
pub const FAIL_CONNECT: &str = "fail_connect";
pub const FAIL_PAIR: &str = "fail_pair";
pub const HANG_CONNECT: &str = "hang_connect";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Behaviour {
    pub latency: Duration,
    pub fail_connect: bool,
    pub fail_pair: bool,
    pub hang_connect: bool,
}

fn flag(credentials: &Credentials, key: &str) -> bool {
    credentials
        .get_non_empty(key)
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl Behaviour {
    /// Read the knobs; unknown or malformed values leave the default.
    #[must_use]
    pub fn from_credentials(credentials: Option<&Credentials>) -> Self {
        let Some(credentials) = credentials else {
            return Self::default();
        };
        let latency = credentials
            .get_non_empty(LATENCY_MS)
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_default();
        Self {
            latency,
            fail_connect: flag(credentials, FAIL_CONNECT),
            fail_pair: flag(credentials, FAIL_PAIR),
            hang_connect: flag(credentials, HANG_CONNECT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_behave_normally_without_credentials() {
        assert_eq!(Behaviour::from_credentials(None), Behaviour::default());
    }

    #[test]
    fn should_read_every_knob() {
        let credentials = Credentials::new()
            .with(LATENCY_MS, "25")
            .with(FAIL_CONNECT, "true")
            .with(FAIL_PAIR, "1")
            .with(HANG_CONNECT, "YES");

        let behaviour = Behaviour::from_credentials(Some(&credentials));

        assert_eq!(behaviour.latency, Duration::from_millis(25));
        assert!(behaviour.fail_connect);
        assert!(behaviour.fail_pair);
        assert!(behaviour.hang_connect);
    }

    #[test]
    fn should_ignore_malformed_values() {
        let credentials = Credentials::new()
            .with(LATENCY_MS, "soon")
            .with(FAIL_CONNECT, "maybe");

        let behaviour = Behaviour::from_credentials(Some(&credentials));

        assert_eq!(behaviour, Behaviour::default());
    }
}
