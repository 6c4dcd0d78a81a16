//! Drives the `AVTransport` push protocol (spec §4.E "Push protocol") and
//! protocol-info compatibility matching.

use reqwest::Client;
use tracing::{info, warn};

use crate::device::Device;
use crate::errors::RendererError;

/// Intersects the lease's computed `ProtocolInfo` against the device's
/// `Sink` list (spec §4.E "Protocol-info matching"). A sink entry is a
/// `protocol:network:mime:extras` tuple; Korva only compares the mime
/// field, since `extras` carries the DLNA profile as a free-form
/// `DLNA.ORG_PN=` token that isn't a strict equality match across vendors.
pub fn sink_accepts(sink: &[String], protocol_info: &str) -> bool {
    let mime = match protocol_info.split(':').nth(2) {
        Some(m) => m,
        None => return false,
    };
    sink.iter().any(|entry| {
        entry
            .split(':')
            .nth(2)
            .map(|candidate| candidate == mime || candidate == "*")
            .unwrap_or(false)
    })
}

/// Drives `Stop` → `SetAVTransportURI` → `Play` against `device` (spec
/// §4.E). `Stop` failures are tolerated (a `701` is expected when nothing
/// is playing); a `705 Transport Locked` from `SetAVTransportURI` is
/// retried exactly once before becoming fatal.
pub async fn push(
    device: &Device,
    http: Client,
    url: &str,
    didl: &str,
) -> Result<(), RendererError> {
    let transport = device.avtransport_client(http);

    if let Err(e) = transport.stop(0).await {
        warn!("Stop before push failed (tolerated): {}", e);
    }

    match transport.set_av_transport_uri(url, didl).await {
        Ok(()) => {}
        Err(RendererError::TransportLocked) => {
            info!("transport locked, retrying SetAVTransportURI once");
            transport.set_av_transport_uri(url, didl).await?;
        }
        Err(e) => return Err(e),
    }

    transport
        .play(0, "1")
        .await
        .map_err(|e| RendererError::ActionFailed(format!("Play failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_accepts_matching_mime() {
        let sink = vec!["http-get:*:image/jpeg:DLNA.ORG_PN=JPEG_SM".to_string()];
        assert!(sink_accepts(&sink, "http-get:*:image/jpeg:DLNA.ORG_PN=JPEG_SM;DLNA.ORG_OP=01"));
    }

    #[test]
    fn sink_rejects_unlisted_mime() {
        let sink = vec!["http-get:*:audio/mpeg:*".to_string()];
        assert!(!sink_accepts(&sink, "http-get:*:image/jpeg:*"));
    }

    #[test]
    fn sink_wildcard_mime_accepts_anything() {
        let sink = vec!["http-get:*:*:*".to_string()];
        assert!(sink_accepts(&sink, "http-get:*:video/mp4:*"));
    }

    #[test]
    fn sink_rejects_malformed_protocol_info() {
        let sink = vec!["http-get:*:image/jpeg:*".to_string()];
        assert!(!sink_accepts(&sink, "not-a-protocol-info"));
    }
}
