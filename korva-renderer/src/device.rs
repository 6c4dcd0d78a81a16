//! The `Device`/`Proxy` multi-interface model (spec §3, §9 "Multi-interface
//! device identity") and the introspection state machine (spec §9
//! "Asynchronous introspection").
//!
//! Grounded on `pmocontrol::model::RendererInfo` for the device record
//! shape, trimmed to the single UPnP protocol and the two services Korva
//! drives (AVTransport, ConnectionManager) — no OpenHome/LinkPlay/Arylic
//! hybrid protocol detection, which only exists to support non-UPnP
//! renderers.

use std::collections::HashSet;
use std::net::IpAddr;

use reqwest::Client;

use crate::client::{AvTransportClient, ConnectionManagerClient};
use crate::description::{self, DeviceDescription, DeviceKind, ServiceEndpoint};
use crate::errors::RendererError;

/// One network interface a renderer is reachable on. Equality/hash is by
/// `from` address only: the same physical device re-announcing on the same
/// interface must collapse to one `Proxy`.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub from: IpAddr,
    pub location: String,
    pub server_header: String,
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from
    }
}
impl Eq for Proxy {}
impl std::hash::Hash for Proxy {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.from.hash(state);
    }
}

/// States of the introspection coroutine (spec §9). Each transition either
/// resolves (`Ready`/`Rejected`) or advances the pending result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntrospectionState {
    Classifying,
    Probing,
    FetchingIcon,
    Ready,
    Rejected,
}

/// A discovered renderer. Live iff `proxies` is non-empty (spec §3).
#[derive(Debug, Clone)]
pub struct Device {
    pub uid: String,
    pub display_name: String,
    pub icon_uri: Option<String>,
    pub kind: DeviceKind,
    pub sink: Vec<String>,
    pub avtransport: ServiceEndpoint,
    pub connection_manager: ServiceEndpoint,
    pub proxies: HashSet<Proxy>,
    pub state: IntrospectionState,
}

impl Device {
    /// Attaches a new network endpoint to an already-introspected device.
    pub fn add_proxy(&mut self, proxy: Proxy) {
        self.proxies.insert(proxy);
    }

    /// Detaches `from`'s endpoint; returns `true` iff this was the last one
    /// (the device is now considered gone).
    pub fn remove_proxy(&mut self, from: IpAddr) -> bool {
        self.proxies.retain(|p| p.from != from);
        self.proxies.is_empty()
    }

    pub fn is_live(&self) -> bool {
        !self.proxies.is_empty()
    }

    /// The `AvTransportClient` for this device, bound to a shared `reqwest`
    /// connection pool.
    pub fn avtransport_client(&self, http: Client) -> AvTransportClient {
        AvTransportClient::new(
            http,
            self.avtransport.control_url.clone(),
            self.avtransport.service_type.clone(),
        )
    }
}

/// Where introspection hands a picked icon URL off to be downloaded and
/// cached. Implemented by `korva_httpd::IconCache` so this crate never
/// depends on the HTTP-serving side of Korva.
#[async_trait::async_trait]
pub trait IconStore: Send + Sync {
    /// Downloads `icon_url` and stores it under `uid`; returns the cached
    /// file URL, or `None` on any failure (never fatal to introspection).
    async fn store(&self, uid: &str, icon_url: &str) -> Option<String>;
}

/// Runs introspection (spec §4.E steps 1–4) for a newly-seen proxy.
/// Returns a `Device` in `Ready` state on success, or `RendererError` on
/// rejection — rejection is silent at the caller (never surfaced as an IPC
/// error, spec §7).
pub async fn introspect(
    uid: &str,
    location: &str,
    server_header: &str,
    from: IpAddr,
    http: Client,
    icon_store: Option<&dyn IconStore>,
) -> Result<Device, RendererError> {
    let desc: DeviceDescription = description::fetch(location).await?;

    // Classifying
    let kind = description::classify(&desc.device_type)?;
    if kind == DeviceKind::Server {
        return Err(RendererError::NotARenderer(desc.device_type));
    }

    // Probing: locate services, then GetProtocolInfo.
    let avtransport = desc
        .avtransport
        .ok_or(RendererError::MissingService("AVTransport"))?;
    let connection_manager = desc
        .connection_manager
        .ok_or(RendererError::MissingService("ConnectionManager"))?;

    let cm_client = ConnectionManagerClient::new(
        http.clone(),
        connection_manager.control_url.clone(),
        connection_manager.service_type.clone(),
    );
    let sink = cm_client.get_protocol_info().await?;
    if sink.is_empty() {
        return Err(RendererError::MissingService("ConnectionManager.Sink"));
    }

    // FetchingIcon: download failure is not fatal, the device is admitted
    // either way.
    let mut icon_uri = None;
    if let (Some(icon), Some(store)) = (description::pick_icon(&desc.icons), icon_store) {
        icon_uri = store.store(uid, &icon.url).await;
    }

    let mut proxies = HashSet::new();
    proxies.insert(Proxy {
        from,
        location: location.to_string(),
        server_header: server_header.to_string(),
    });

    Ok(Device {
        uid: uid.to_string(),
        display_name: desc.friendly_name,
        icon_uri,
        kind,
        sink,
        avtransport,
        connection_manager,
        proxies,
        state: IntrospectionState::Ready,
    })
}
