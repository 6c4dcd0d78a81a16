//! Push Coordinator (component G): orchestrates `push`/`unshare` end to
//! end across the Renderer Device, Metadata Resolver, and HTTP Origin
//! Server (spec §4.G).
//!
//! Grounded on `pmocontrol::control_point::ControlPoint` /
//! `pmocontrol::discovery::manager`-style orchestration objects that hold
//! `Arc`s to the registries they coordinate and expose a small async API.
//! Tag hashing reuses the `md5`/`hex` choice `korva_httpd::lease` makes for
//! lease ids, since spec §4.G only requires a stable opaque string.

pub mod net;
pub mod source;

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use korva_didl::{build_item_metadata, ItemMetadata, UpnpClass};
use korva_errors::KorvaError;
use korva_httpd::OriginServer;
use korva_renderer::push::{push as drive_push, sink_accepts};
use korva_renderer::{Device, RendererError, SharedDeviceRegistry};

pub use source::SourceMap;

/// A live push, enough to drive `unshare` (spec §4.G `unshare`).
#[derive(Debug, Clone)]
struct Transfer {
    device_uid: String,
    file: PathBuf,
    peer: IpAddr,
}

pub struct PushCoordinator {
    devices: SharedDeviceRegistry,
    origin: Arc<OriginServer>,
    http: reqwest::Client,
    transfers: RwLock<HashMap<String, Transfer>>,
    /// Per-device push serialization (spec §5: "a push in progress blocks
    /// a second push to the same device").
    device_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PushCoordinator {
    pub fn new(devices: SharedDeviceRegistry, origin: Arc<OriginServer>, http: reqwest::Client) -> Self {
        Self {
            devices,
            origin,
            http,
            transfers: RwLock::new(HashMap::new()),
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, device_uid: &str) -> Arc<Mutex<()>> {
        let mut locks = self.device_locks.lock().await;
        locks
            .entry(device_uid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drives a push end to end (spec §4.G steps 1-9). On any failure after
    /// the file is hosted, the peer is dropped from the lease before the
    /// error is returned.
    pub async fn push(&self, source: SourceMap, device_uid: &str) -> Result<String, KorvaError> {
        let uri = source
            .uri
            .clone()
            .ok_or_else(|| KorvaError::InvalidArgs("source map is missing URI".to_string()))?;
        let path = uri_to_path(&uri)?;

        let device = self
            .devices
            .get(device_uid)
            .await
            .ok_or_else(|| KorvaError::NoSuchDevice(device_uid.to_string()))?;

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| uri.clone());
        let record = korva_httpd::resolve(&path, &display_name, source.into_record())?;

        let (device_ip, local_iface) = reachable_endpoint(&device)
            .ok_or_else(|| KorvaError::NotCompatible(device_uid.to_string()))?;

        let (lease, url) = self
            .origin
            .host_file(path.clone(), record.clone(), local_iface, device_ip)
            .await;

        let protocol_info = protocol_info_for(&record);
        if !sink_accepts(&device.sink, &protocol_info) {
            self.origin.unhost_for_peer(&path, device_ip).await;
            return Err(KorvaError::NotCompatible(format!(
                "{device_uid} does not accept {protocol_info}"
            )));
        }

        let class = record.upnp_class().unwrap_or(UpnpClass::Photo);
        let title = record.title.clone().unwrap_or(display_name);
        let didl = build_item_metadata(&ItemMetadata {
            class,
            title: &title,
            size: record.size.unwrap_or(0),
            protocol_info: &protocol_info,
            url: &url,
        })
        .map_err(|e| KorvaError::InvalidArgs(format!("failed to build DIDL-Lite item: {e}")))?;

        let lock = self.lock_for(device_uid).await;
        let _guard = lock.lock().await;

        if let Err(e) = drive_push(&device, self.http.clone(), &url, &didl).await {
            warn!("push to {} failed: {}", device_uid, e);
            self.origin.unhost_for_peer(&path, device_ip).await;
            return Err(map_renderer_error(device_uid, e));
        }

        let tag = mint_tag(device_uid, &lease.id, device_ip);
        self.transfers.write().await.insert(
            tag.clone(),
            Transfer {
                device_uid: device_uid.to_string(),
                file: path,
                peer: device_ip,
            },
        );
        info!(%tag, %device_uid, "push complete");
        Ok(tag)
    }

    /// `unshare(tag)` (spec §4.G): best-effort `Stop`, then releases the
    /// peer from its lease.
    pub async fn unshare(&self, tag: &str) -> Result<(), KorvaError> {
        let transfer = self
            .transfers
            .write()
            .await
            .remove(tag)
            .ok_or_else(|| KorvaError::NoSuchTransfer(tag.to_string()))?;

        if let Some(device) = self.devices.get(&transfer.device_uid).await {
            let client = device.avtransport_client(self.http.clone());
            if let Err(e) = client.stop(0).await {
                warn!("best-effort Stop during unshare of {} failed: {}", tag, e);
            }
        }

        self.origin
            .unhost_for_peer(&transfer.file, transfer.peer)
            .await;
        Ok(())
    }
}

/// Picks the first proxy address whose subnet has a matching local
/// interface (spec §4.G step 4). A device reachable on several interfaces
/// just needs one compatible path.
fn reachable_endpoint(device: &Device) -> Option<(IpAddr, IpAddr)> {
    device
        .proxies
        .iter()
        .find_map(|proxy| net::local_iface_for(proxy.from).map(|iface| (proxy.from, iface)))
}

fn uri_to_path(uri: &str) -> Result<PathBuf, KorvaError> {
    uri.strip_prefix("file://")
        .map(PathBuf::from)
        .ok_or_else(|| KorvaError::InvalidArgs(format!("unsupported URI scheme: {uri}")))
}

/// `contentFeatures.dlna.org`'s `ProtocolInfo` shape, reused here to
/// describe the lease's content to `sink_accepts` (spec §4.E
/// "Protocol-info matching").
fn protocol_info_for(record: &korva_httpd::MetadataRecord) -> String {
    let mime = record.content_type.as_deref().unwrap_or("*");
    match record.dlna_profile.as_deref() {
        Some(profile) => format!("http-get:*:{mime}:DLNA.ORG_PN={profile};DLNA.ORG_OP=01"),
        None => format!("http-get:*:{mime}:*"),
    }
}

fn mint_tag(device_uid: &str, lease_id: &str, peer_ip: IpAddr) -> String {
    let input = format!("{device_uid}{lease_id}{peer_ip}");
    hex::encode(md5::compute(input.as_bytes()).0)
}

fn map_renderer_error(device_uid: &str, err: RendererError) -> KorvaError {
    match err {
        RendererError::Timeout => KorvaError::Timeout(format!("push to {device_uid} timed out")),
        RendererError::TransportLocked => {
            KorvaError::Timeout(format!("{device_uid}'s transport stayed locked after retry"))
        }
        RendererError::ActionFailed(msg) => KorvaError::NotCompatible(msg),
        RendererError::Http(e) => KorvaError::Timeout(e.to_string()),
        RendererError::Xml(e) => KorvaError::NotCompatible(format!("malformed SOAP response: {e}")),
        RendererError::NotARenderer(_)
        | RendererError::InvalidDeviceType(_)
        | RendererError::MissingService(_) => {
            KorvaError::NotCompatible(format!("{device_uid} is missing a required service"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_tag_for_same_inputs() {
        let ip: IpAddr = "192.168.1.5".parse().unwrap();
        assert_eq!(
            mint_tag("uuid:abc", "lease1", ip),
            mint_tag("uuid:abc", "lease1", ip)
        );
    }

    #[test]
    fn different_peer_yields_different_tag() {
        let a: IpAddr = "192.168.1.5".parse().unwrap();
        let b: IpAddr = "192.168.1.6".parse().unwrap();
        assert_ne!(mint_tag("uuid:abc", "lease1", a), mint_tag("uuid:abc", "lease1", b));
    }

    #[test]
    fn file_uri_strips_scheme() {
        assert_eq!(uri_to_path("file:///a/x.jpg").unwrap(), PathBuf::from("/a/x.jpg"));
    }

    #[test]
    fn non_file_uri_is_invalid_args() {
        assert!(matches!(
            uri_to_path("http://example.com/x.jpg"),
            Err(KorvaError::InvalidArgs(_))
        ));
    }

    #[test]
    fn protocol_info_without_profile_uses_wildcard_extras() {
        let record = korva_httpd::MetadataRecord {
            content_type: Some("image/jpeg".to_string()),
            dlna_profile: None,
            ..Default::default()
        };
        assert_eq!(protocol_info_for(&record), "http-get:*:image/jpeg:*");
    }

    #[test]
    fn protocol_info_with_profile_includes_dlna_pn() {
        let record = korva_httpd::MetadataRecord {
            content_type: Some("image/jpeg".to_string()),
            dlna_profile: Some("JPEG_SM".to_string()),
            ..Default::default()
        };
        assert_eq!(
            protocol_info_for(&record),
            "http-get:*:image/jpeg:DLNA.ORG_PN=JPEG_SM;DLNA.ORG_OP=01"
        );
    }
}
