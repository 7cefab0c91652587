//! Connection parameters read from device credentials.
//!
//! | Key | Default | Meaning |
//! |-----|---------|---------|
//! | `host` | `<device_id>.local` | mDNS name or address of the node, required for provisional ids |
//! | `port` | config `port` (6053) | native API port |
//! | `encryption_key` | none | base64 noise PSK, 32 bytes once decoded |
//! | `password` | none | legacy API password |

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use homehub_domain::credentials::Credentials;
use homehub_domain::id::DeviceId;

use crate::error::EsphomeError;

pub const HOST: &str = "host";
pub const PORT: &str = "port";
pub const ENCRYPTION_KEY: &str = "encryption_key";
pub const PASSWORD: &str = "password";

/// Pre-shared key of an encrypted native API session.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Decode a base64 key.
    ///
    /// # Errors
    ///
    /// Returns [`EsphomeError::KeyEncoding`] or [`EsphomeError::KeyLength`].
    pub fn decode(encoded: &str) -> Result<Self, EsphomeError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(EsphomeError::KeyEncoding)?;
        let key = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| EsphomeError::KeyLength {
                actual: bytes.len(),
            })?;
        Ok(Self(key))
    }

    #[must_use]
    pub fn encode(&self) -> String {
        STANDARD.encode(self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Where and how to reach one node.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub encryption_key: Option<EncryptionKey>,
    pub password: Option<String>,
}

impl ConnectionParams {
    /// Read parameters from stored or submitted credentials.
    ///
    /// # Errors
    ///
    /// Returns an [`EsphomeError`] for a malformed port or key, and
    /// [`EsphomeError::HostRequired`] when a provisional id comes without a
    /// `host`.
    pub fn resolve(
        device_id: &DeviceId,
        credentials: Option<&Credentials>,
        default_port: u16,
    ) -> Result<Self, EsphomeError> {
        let lookup = |key: &str| credentials.and_then(|c| c.get_non_empty(key));

        let host = match lookup(HOST) {
            Some(host) => host.to_string(),
            None if device_id.is_provisional() => return Err(EsphomeError::HostRequired),
            None => format!("{device_id}.local"),
        };
        let port = match lookup(PORT) {
            None => default_port,
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| EsphomeError::InvalidPort(raw.to_string()))?,
        };
        let encryption_key = lookup(ENCRYPTION_KEY)
            .map(EncryptionKey::decode)
            .transpose()?;

        Ok(Self {
            host,
            port,
            encryption_key,
            password: lookup(PASSWORD).map(str::to_string),
        })
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.encryption_key.is_some()
    }

    /// Normalised form to persist after pairing.
    #[must_use]
    pub fn to_credentials(&self) -> Credentials {
        let mut credentials = Credentials::new()
            .with(HOST, &self.host)
            .with(PORT, self.port.to_string());
        if let Some(key) = &self.encryption_key {
            credentials.insert(ENCRYPTION_KEY, key.encode());
        }
        if let Some(password) = &self.password {
            credentials.insert(PASSWORD, password);
        }
        credentials
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encrypted", &self.is_encrypted())
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
