//! Fans raw [`SsdpEvent`]s into de-duplicated proxy lifecycle events.
//!
//! This is the "SSDP fan-in, duplicate detection" half of the Device
//! Lister (component F); the "device lifecycle" half — promoting a proxy
//! into a live `Device`, introspecting it, emitting `DeviceAvailable` —
//! lives in `korva_renderer` since it owns the `Device`/`Proxy` model.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, trace};

use crate::client::{SsdpClient, SsdpEvent};
use crate::registry::{extract_udn_from_usn, UdnRegistry};
use crate::MEDIA_RENDERER_ST;

/// A de-duplicated device lifecycle signal, one per network interface a
/// device is reachable on.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    ProxyAvailable {
        udn: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ProxyUnavailable {
        udn: String,
        from: SocketAddr,
    },
}

pub struct DeviceLister {
    registry: UdnRegistry,
}

impl Default for DeviceLister {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLister {
    pub fn new() -> Self {
        DeviceLister {
            registry: UdnRegistry::new(),
        }
    }

    /// Runs the SSDP control point and the fan-in loop until `tx` is
    /// dropped. Spawns the socket receive loop and a periodic M-SEARCH
    /// resend task alongside the fold.
    pub async fn run(
        self,
        client: SsdpClient,
        resend_interval: Duration,
        search_mx: u32,
        tx: mpsc::Sender<DeviceEvent>,
    ) {
        let (raw_tx, mut raw_rx) = mpsc::channel::<SsdpEvent>(64);

        let client_for_recv = std::sync::Arc::new(client);
        let client_for_search = client_for_recv.clone();

        let recv_task = tokio::spawn(async move { client_for_recv.run(raw_tx).await });

        let search_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(resend_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = client_for_search
                    .send_msearch(MEDIA_RENDERER_ST, search_mx)
                    .await
                {
                    trace!("M-SEARCH resend failed: {}", e);
                }
            }
        });

        while let Some(event) = raw_rx.recv().await {
            if let Some(device_event) = self.fold(event) {
                if tx.send(device_event).await.is_err() {
                    break;
                }
            }
        }

        search_task.abort();
        recv_task.abort();
    }

    fn fold(&self, event: SsdpEvent) -> Option<DeviceEvent> {
        match event {
            SsdpEvent::Alive {
                usn,
                nt,
                location,
                server,
                max_age,
                from,
            } => {
                if nt != MEDIA_RENDERER_ST && !usn.contains(MEDIA_RENDERER_ST) {
                    return None;
                }
                let udn = extract_udn_from_usn(&usn)?;
                if self.registry.should_fetch(&udn, max_age as u64) {
                    info!(%udn, %location, "renderer proxy seen");
                    Some(DeviceEvent::ProxyAvailable {
                        udn,
                        location,
                        server,
                        max_age,
                        from,
                    })
                } else {
                    None
                }
            }
            SsdpEvent::SearchResponse {
                usn,
                st,
                location,
                server,
                max_age,
                from,
            } => {
                if st != MEDIA_RENDERER_ST {
                    return None;
                }
                let udn = extract_udn_from_usn(&usn)?;
                if self.registry.should_fetch(&udn, max_age as u64) {
                    info!(%udn, %location, "renderer proxy seen");
                    Some(DeviceEvent::ProxyAvailable {
                        udn,
                        location,
                        server,
                        max_age,
                        from,
                    })
                } else {
                    None
                }
            }
            SsdpEvent::ByeBye { usn, nt, from } => {
                if nt != MEDIA_RENDERER_ST && !usn.contains(MEDIA_RENDERER_ST) {
                    return None;
                }
                let udn = extract_udn_from_usn(&usn)?;
                self.registry.forget(&udn);
                info!(%udn, "renderer proxy said byebye");
                Some(DeviceEvent::ProxyUnavailable { udn, from })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:1900".parse().unwrap()
    }

    #[test]
    fn non_renderer_nt_is_ignored() {
        let lister = DeviceLister::new();
        let event = SsdpEvent::Alive {
            usn: "uuid:abc::urn:schemas-upnp-org:device:MediaServer:1".to_string(),
            nt: "urn:schemas-upnp-org:device:MediaServer:1".to_string(),
            location: "http://x/device.xml".to_string(),
            server: "x".to_string(),
            max_age: 1800,
            from: addr(),
        };
        assert!(lister.fold(event).is_none());
    }

    #[test]
    fn renderer_alive_promotes_to_proxy_available() {
        let lister = DeviceLister::new();
        let event = SsdpEvent::Alive {
            usn: "uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            nt: "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            location: "http://x/device.xml".to_string(),
            server: "x".to_string(),
            max_age: 1800,
            from: addr(),
        };
        assert!(matches!(
            lister.fold(event),
            Some(DeviceEvent::ProxyAvailable { .. })
        ));
    }

    #[test]
    fn repeat_alive_within_half_max_age_is_suppressed() {
        let lister = DeviceLister::new();
        let event = || SsdpEvent::Alive {
            usn: "uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            nt: "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            location: "http://x/device.xml".to_string(),
            server: "x".to_string(),
            max_age: 1800,
            from: addr(),
        };
        assert!(lister.fold(event()).is_some());
        assert!(lister.fold(event()).is_none());
    }

    #[test]
    fn byebye_yields_proxy_unavailable() {
        let lister = DeviceLister::new();
        let event = SsdpEvent::ByeBye {
            usn: "uuid:abc::urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            nt: "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            from: addr(),
        };
        assert!(matches!(
            lister.fold(event),
            Some(DeviceEvent::ProxyUnavailable { .. })
        ));
    }
}
