use thiserror::Error;

/// Errors internal to introspecting and driving a single renderer.
///
/// Introspection variants (`NotARenderer`, `InvalidDeviceType`,
/// `MissingService`) are never surfaced across IPC — they cause silent
/// device rejection (spec §7). Only `Timeout`/`NotCompatible` cross into
/// `korva_errors::KorvaError` during a push.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Device type classifies as `MediaServer` — a deliberate, known
    /// non-match (the original drops these silently rather than treating
    /// them as a parse failure).
    #[error("device is a MediaServer, not a renderer: {0}")]
    NotARenderer(String),

    /// Device type matches neither the `MediaServer` nor `MediaRenderer`
    /// pattern — a genuinely unrecognized device type string.
    #[error("device type does not match Server or Renderer pattern: {0}")]
    InvalidDeviceType(String),

    #[error("missing required service: {0}")]
    MissingService(&'static str),

    #[error("SOAP call timed out")]
    Timeout,

    #[error("transport is locked")]
    TransportLocked,

    #[error("device rejected the action: {0}")]
    ActionFailed(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}
