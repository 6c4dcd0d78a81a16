//! The live `devices` table and its `DeviceAvailable`/`DeviceUnavailable`
//! signal (spec §4.F, §6, §9 "Singletons"). `pending` (devices still mid
//! introspection) is not modelled here — it never needs to be looked up by
//! UID from outside the Device Lister, so it stays local to whatever task
//! drives introspection.
//!
//! Grounded on `pmocontrol::registry::DeviceRegistry` (UDN-keyed map plus a
//! broadcast bus of online/offline events), narrowed to a single device
//! kind and moved from `crossbeam_channel` to `tokio::sync::broadcast` to
//! fit the async loop model.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::device::{Device, Proxy};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A `DeviceAvailable`/`DeviceUnavailable` signal (spec §6).
#[derive(Debug, Clone)]
pub enum DeviceLifecycleEvent {
    Available(Device),
    Unavailable(String),
}

/// The `devices` table: UID-keyed, live (fully introspected) renderers.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    events: broadcast::Sender<DeviceLifecycleEvent>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            devices: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribes to `DeviceAvailable`/`DeviceUnavailable` signals.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceLifecycleEvent> {
        self.events.subscribe()
    }

    pub async fn get(&self, uid: &str) -> Option<Device> {
        self.devices.read().await.get(uid).cloned()
    }

    pub async fn snapshot(&self) -> Vec<Device> {
        self.devices.read().await.values().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Promotes a freshly introspected device into `devices` and emits
    /// `DeviceAvailable`. Never called for a device already present under
    /// the same UID — the Device Lister only inserts once per UDN.
    pub async fn insert(&self, device: Device) {
        let uid = device.uid.clone();
        self.devices.write().await.insert(uid, device.clone());
        let _ = self.events.send(DeviceLifecycleEvent::Available(device));
    }

    /// Attaches `proxy` to an already-live device. Returns `false` if `uid`
    /// isn't in `devices` (the caller should check `pending` instead).
    pub async fn add_proxy(&self, uid: &str, proxy: Proxy) -> bool {
        match self.devices.write().await.get_mut(uid) {
            Some(device) => {
                device.add_proxy(proxy);
                true
            }
            None => false,
        }
    }

    /// Detaches `from`'s endpoint from `uid`. If it was the last proxy, the
    /// device is dropped from `devices` and `DeviceUnavailable` is emitted.
    /// Returns `None` if `uid` isn't live.
    pub async fn remove_proxy(&self, uid: &str, from: IpAddr) -> Option<bool> {
        let mut devices = self.devices.write().await;
        let was_last = {
            let device = devices.get_mut(uid)?;
            device.remove_proxy(from)
        };
        if was_last {
            devices.remove(uid);
            drop(devices);
            let _ = self
                .events
                .send(DeviceLifecycleEvent::Unavailable(uid.to_string()));
        }
        Some(was_last)
    }
}

/// Shared handle type the rest of the process wires the registry through.
pub type SharedDeviceRegistry = Arc<DeviceRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{DeviceKind, ServiceEndpoint};
    use crate::device::IntrospectionState;
    use std::collections::HashSet;

    fn endpoint() -> ServiceEndpoint {
        ServiceEndpoint {
            service_type: "urn:schemas-upnp-org:service:AVTransport:1".to_string(),
            control_url: "http://192.168.1.5/ctrl".to_string(),
        }
    }

    fn device(uid: &str, from: IpAddr) -> Device {
        let mut proxies = HashSet::new();
        proxies.insert(Proxy {
            from,
            location: "http://x/device.xml".to_string(),
            server_header: "x".to_string(),
        });
        Device {
            uid: uid.to_string(),
            display_name: "TV".to_string(),
            icon_uri: None,
            kind: DeviceKind::Player,
            sink: vec!["http-get:*:image/jpeg:*".to_string()],
            avtransport: endpoint(),
            connection_manager: endpoint(),
            proxies,
            state: IntrospectionState::Ready,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let registry = DeviceRegistry::new();
        let from: IpAddr = "192.168.1.5".parse().unwrap();
        registry.insert(device("uuid:abc", from)).await;
        assert!(registry.get("uuid:abc").await.is_some());
    }

    #[tokio::test]
    async fn insert_emits_available() {
        let registry = DeviceRegistry::new();
        let mut rx = registry.subscribe();
        let from: IpAddr = "192.168.1.5".parse().unwrap();
        registry.insert(device("uuid:abc", from)).await;
        match rx.recv().await.unwrap() {
            DeviceLifecycleEvent::Available(d) => assert_eq!(d.uid, "uuid:abc"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn remove_last_proxy_drops_device_and_emits_unavailable() {
        let registry = DeviceRegistry::new();
        let mut rx = registry.subscribe();
        let from: IpAddr = "192.168.1.5".parse().unwrap();
        registry.insert(device("uuid:abc", from)).await;
        rx.recv().await.unwrap(); // Available

        let was_last = registry.remove_proxy("uuid:abc", from).await;
        assert_eq!(was_last, Some(true));
        assert!(registry.get("uuid:abc").await.is_none());
        match rx.recv().await.unwrap() {
            DeviceLifecycleEvent::Unavailable(uid) => assert_eq!(uid, "uuid:abc"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn remove_proxy_on_unknown_uid_is_none() {
        let registry = DeviceRegistry::new();
        let from: IpAddr = "192.168.1.5".parse().unwrap();
        assert_eq!(registry.remove_proxy("uuid:nope", from).await, None);
    }

    #[tokio::test]
    async fn add_proxy_to_unknown_uid_returns_false() {
        let registry = DeviceRegistry::new();
        let proxy = Proxy {
            from: "192.168.1.9".parse().unwrap(),
            location: "x".to_string(),
            server_header: "x".to_string(),
        };
        assert!(!registry.add_proxy("uuid:nope", proxy).await);
    }
}
