//! ESPHome adapter error types.

use homehub_domain::error::DriverError;

/// Errors specific to the ESPHome adapter.
#[derive(Debug, thiserror::Error)]
pub enum EsphomeError {
    /// The `encryption_key` credential is not base64.
    #[error("encryption key is not valid base64")]
    KeyEncoding(#[source] base64::DecodeError),

    /// The `encryption_key` credential decodes to the wrong size.
    #[error("encryption key must decode to 32 bytes, got {actual}")]
    KeyLength { actual: usize },

    /// A hub-minted device id has no `.local` name to fall back on.
    #[error("host is required when no device id is given")]
    HostRequired,

    /// The `port` credential is not a usable TCP port.
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// Plaintext sessions are disabled and the device has no key.
    #[error("an encryption key is required")]
    EncryptionRequired,

    /// The node could not be reached.
    #[error("{host}:{port} is unreachable: {source}")]
    Unreachable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The node refused the handshake (wrong key or password).
    #[error("session rejected: {0}")]
    Rejected(String),
}

impl From<EsphomeError> for DriverError {
    fn from(err: EsphomeError) -> Self {
        match err {
            EsphomeError::HostRequired
            | EsphomeError::InvalidPort(_)
            | EsphomeError::Unreachable { .. } => {
                Self::Connection(err.to_string())
            }
            EsphomeError::KeyEncoding(_)
            | EsphomeError::KeyLength { .. }
            | EsphomeError::EncryptionRequired
            | EsphomeError::Rejected(_) => Self::Auth(err.to_string()),
        }
    }
}
