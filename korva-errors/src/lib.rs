//! Error taxonomy surfaced across Korva's IPC boundary (spec §7).
//!
//! Introspection failures (bad device type, missing service) are deliberately
//! *not* part of this enum: they cause silent rejection of a device rather
//! than an IPC-visible error. See `korva_renderer::introspect`.

use thiserror::Error;

/// Errors the Push Coordinator (or any other IPC-facing operation) can
/// surface to a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KorvaError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file exists but is not accessible: {0}")]
    NotAccessible(String),

    #[error("no such device: {0}")]
    NoSuchDevice(String),

    #[error("no such transfer: {0}")]
    NoSuchTransfer(String),

    #[error("device is not compatible with this content: {0}")]
    NotCompatible(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("HTTP origin server is not available: {0}")]
    NoServer(String),
}

impl KorvaError {
    /// D-Bus error name this kind would be surfaced under by the (out of
    /// scope) IPC endpoint, matching the original implementation's
    /// `org.jensge.Korva.Error.*` domain.
    pub fn dbus_error_name(&self) -> &'static str {
        match self {
            KorvaError::FileNotFound(_) => "org.jensge.Korva.Error.FileNotFound",
            KorvaError::NotAccessible(_) => "org.jensge.Korva.Error.NotAccessible",
            KorvaError::NoSuchDevice(_) => "org.jensge.Korva.Error.NoSuchDevice",
            KorvaError::NoSuchTransfer(_) => "org.jensge.Korva.Error.NoSuchTransfer",
            KorvaError::NotCompatible(_) => "org.jensge.Korva.Error.NotCompatible",
            KorvaError::Timeout(_) => "org.jensge.Korva.Error.Timeout",
            KorvaError::InvalidArgs(_) => "org.jensge.Korva.Error.InvalidArgs",
            KorvaError::NoServer(_) => "org.jensge.Korva.Error.NoServer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbus_names_match_original_domain() {
        assert_eq!(
            KorvaError::FileNotFound("x".into()).dbus_error_name(),
            "org.jensge.Korva.Error.FileNotFound"
        );
        assert_eq!(
            KorvaError::NoSuchTransfer("tag".into()).dbus_error_name(),
            "org.jensge.Korva.Error.NoSuchTransfer"
        );
    }
}
