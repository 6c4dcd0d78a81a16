//! Host Lease (component D): per-file lease registry — peers, metadata,
//! and the idle-timeout lifecycle. Grounded on `pmocontrol::model` for the
//! record shape and on `vorce-qbz`'s `MediaEntry` for the "one entry per
//! hosted resource" idea, generalized to per-peer scoping and an idle
//! timer instead of a flat id→entry map.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::metadata::MetadataRecord;

/// An idle lease is torn down this long after its last access (spec §3,
/// §5 "Cancellation and timeouts").
pub const FILE_SERVER_DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry per locally-hosted file (spec §3 "Host Lease").
pub struct Lease {
    pub id: String,
    pub file: PathBuf,
    pub meta: MetadataRecord,
    peers: Mutex<HashSet<IpAddr>>,
    in_flight: Mutex<u32>,
    idle_timer: Mutex<Option<JoinHandle<()>>>,
    registry: Weak<LeaseRegistry>,
}

impl Lease {
    pub async fn peers(&self) -> HashSet<IpAddr> {
        self.peers.lock().await.clone()
    }

    pub async fn has_peer(&self, peer: IpAddr) -> bool {
        self.peers.lock().await.contains(&peer)
    }

    /// Marks the start of a request against this lease: bumps the
    /// in-flight counter and cancels any pending idle timer (spec §4.C
    /// "increments InFlightRequests, cancels the idle timer").
    pub async fn begin_request(&self) {
        *self.in_flight.lock().await += 1;
        self.cancel_timer().await;
    }

    /// Marks the end of a request. If no peers remain, restarts the idle
    /// timer (spec §4.C "restart idle timer").
    pub async fn end_request(self: &Arc<Self>) {
        let mut in_flight = self.in_flight.lock().await;
        *in_flight = in_flight.saturating_sub(1);
        let still_busy = *in_flight > 0;
        drop(in_flight);
        if !still_busy && self.peers.lock().await.is_empty() {
            self.touch().await;
        }
    }

    /// Restarts the idle timer unconditionally (spec §9 "a single touch(lease)
    /// operation"). Called from every access path. When the timer fires, the
    /// lease asks the registry to evict it if it is still evictable at that
    /// point (spec §4.D/§5: a grace period, not an immediate removal).
    pub async fn touch(self: &Arc<Self>) {
        self.cancel_timer().await;
        let weak_lease = Arc::downgrade(self);
        let registry = self.registry.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(FILE_SERVER_DEFAULT_TIMEOUT).await;
            let (Some(lease), Some(registry)) = (weak_lease.upgrade(), registry.upgrade()) else {
                return;
            };
            debug!(id = %lease.id, "lease idle timer fired");
            registry.evict_if_idle(&lease).await;
        });
        *self.idle_timer.lock().await = Some(handle);
    }

    async fn cancel_timer(&self) {
        if let Some(handle) = self.idle_timer.lock().await.take() {
            handle.abort();
        }
    }

    /// True once the lease has no peers and no in-flight requests (spec §8
    /// "eligible for idle eviction").
    pub async fn is_evictable(&self) -> bool {
        self.peers.lock().await.is_empty() && *self.in_flight.lock().await == 0
    }
}

/// The process-wide Host Lease registry.
#[derive(Default)]
pub struct LeaseRegistry {
    by_file: RwLock<std::collections::HashMap<PathBuf, Arc<Lease>>>,
    by_id: RwLock<std::collections::HashMap<String, Arc<Lease>>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `host_file` (spec §4.D): idempotent. Returns the lease, creating it
    /// if absent; adds `peer` either way.
    pub async fn host_file(
        self: &Arc<Self>,
        file: PathBuf,
        meta_if_new: impl FnOnce() -> MetadataRecord,
        peer: IpAddr,
    ) -> Arc<Lease> {
        let existing = self.by_file.read().await.get(&file).cloned();
        let lease = match existing {
            Some(lease) => lease,
            None => {
                let id = lease_id(&file);
                let lease = Arc::new(Lease {
                    id: id.clone(),
                    file: file.clone(),
                    meta: meta_if_new(),
                    peers: Mutex::new(HashSet::new()),
                    in_flight: Mutex::new(0),
                    idle_timer: Mutex::new(None),
                    registry: Arc::downgrade(self),
                });
                self.by_file.write().await.insert(file, lease.clone());
                self.by_id.write().await.insert(id, lease.clone());
                lease
            }
        };
        lease.peers.lock().await.insert(peer);
        lease.touch().await;
        lease
    }

    pub async fn by_id(&self, id: &str) -> Option<Arc<Lease>> {
        self.by_id.read().await.get(id).cloned()
    }

    /// `unhost_for_peer` (spec §4.D): removes `peer` and, if the lease is
    /// now evictable, arms the grace timer. The lease is not torn down here
    /// — `Lease::touch`'s timer calls back into `evict_if_idle` once the
    /// grace period elapses (spec §5 "torn down exactly 30s after its last
    /// access").
    pub async fn unhost_for_peer(&self, file: &PathBuf, peer: IpAddr) {
        let lease = match self.by_file.read().await.get(file).cloned() {
            Some(l) => l,
            None => return,
        };
        lease.peers.lock().await.remove(&peer);
        if lease.is_evictable().await {
            lease.touch().await;
        }
    }

    /// Called by a lease's idle timer when it fires. Removes the lease from
    /// both maps if it is still evictable at that point — a request that
    /// arrived during the grace period will have cancelled the timer via
    /// `begin_request`, so this only fires for a genuinely idle lease.
    pub async fn evict_if_idle(&self, lease: &Arc<Lease>) {
        if lease.is_evictable().await {
            self.by_file.write().await.remove(&lease.file);
            self.by_id.write().await.remove(&lease.id);
            debug!(id = %lease.id, "idle lease evicted");
        }
    }

    pub async fn idle(&self) -> bool {
        self.by_file.read().await.is_empty()
    }
}

/// `Id` = MD5 of the source path, hex-encoded (spec §3 "Id").
fn lease_id(file: &PathBuf) -> String {
    let digest = md5::compute(file.to_string_lossy().as_bytes());
    hex::encode(digest.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(ip: &str) -> IpAddr {
        ip.parse().unwrap()
    }

    #[tokio::test]
    async fn host_file_is_idempotent_and_unions_peers() {
        let registry = Arc::new(LeaseRegistry::new());
        let file = PathBuf::from("/tmp/x.jpg");
        let a = registry
            .host_file(file.clone(), MetadataRecord::default, peer("127.0.0.1"))
            .await;
        let b = registry
            .host_file(file.clone(), MetadataRecord::default, peer("192.168.1.5"))
            .await;
        assert_eq!(a.id, b.id);
        let peers = b.peers().await;
        assert!(peers.contains(&peer("127.0.0.1")));
        assert!(peers.contains(&peer("192.168.1.5")));
    }

    #[tokio::test]
    async fn same_file_always_yields_same_id() {
        let file = PathBuf::from("/tmp/stable.jpg");
        assert_eq!(lease_id(&file), lease_id(&file));
    }

    #[tokio::test(start_paused = true)]
    async fn unhost_last_peer_keeps_lease_during_grace_period() {
        let registry = Arc::new(LeaseRegistry::new());
        let file = PathBuf::from("/tmp/y.jpg");
        registry
            .host_file(file.clone(), MetadataRecord::default, peer("127.0.0.1"))
            .await;
        registry.unhost_for_peer(&file, peer("127.0.0.1")).await;
        assert!(!registry.idle().await);

        tokio::time::advance(FILE_SERVER_DEFAULT_TIMEOUT + Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(registry.idle().await);
    }

    #[tokio::test(start_paused = true)]
    async fn a_request_during_the_grace_period_cancels_eviction() {
        let registry = Arc::new(LeaseRegistry::new());
        let file = PathBuf::from("/tmp/w.jpg");
        let lease = registry
            .host_file(file.clone(), MetadataRecord::default, peer("127.0.0.1"))
            .await;
        registry.unhost_for_peer(&file, peer("127.0.0.1")).await;

        tokio::time::advance(FILE_SERVER_DEFAULT_TIMEOUT / 2).await;
        lease.begin_request().await;
        lease.end_request().await;

        tokio::time::advance(FILE_SERVER_DEFAULT_TIMEOUT / 2 + Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(!registry.idle().await);
    }

    #[tokio::test]
    async fn unknown_id_resolves_to_none() {
        let registry = Arc::new(LeaseRegistry::new());
        assert!(registry.by_id("deadbeef").await.is_none());
    }

    #[tokio::test]
    async fn in_flight_requests_block_eviction() {
        let registry = Arc::new(LeaseRegistry::new());
        let file = PathBuf::from("/tmp/z.jpg");
        let lease = registry
            .host_file(file.clone(), MetadataRecord::default, peer("127.0.0.1"))
            .await;
        lease.begin_request().await;
        registry.unhost_for_peer(&file, peer("127.0.0.1")).await;
        assert!(!registry.idle().await);
        lease.end_request().await;
    }
}
