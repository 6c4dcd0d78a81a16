//! Korva: discovers DLNA/UPnP renderers, stands up the HTTP origin server,
//! and orchestrates push/unshare (spec §1).
//!
//! Phased startup grounded on `PMOMusic/src/main.rs`'s style: infrastructure
//! first, device discovery second, then block on `Ctrl+C` with a grace
//! sleep before exit. The D-Bus `/Controller` surface itself is an external
//! collaborator (out of scope, spec §2) — this shell logs device lifecycle
//! signals in its place.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use korva_coordinator::PushCoordinator;
use korva_httpd::{IconCache, OriginServer};
use korva_renderer::{introspect, DeviceLifecycleEvent, DeviceRegistry, Proxy};
use korva_ssdp::{DeviceEvent, DeviceLister, SsdpClient};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ========== Phase 1: infrastructure ==========
    let config = korva_config::get_config();
    let http = reqwest::Client::new();

    info!("starting HTTP origin server");
    let origin = OriginServer::start().await?;
    info!(port = origin.port(), "HTTP origin server ready");

    let icon_cache_dir = config.icon_cache_dir()?;
    let icon_cache = Arc::new(IconCache::new(icon_cache_dir, http.clone())?);

    let devices = Arc::new(DeviceRegistry::new());
    // Kept alive for the (out-of-scope) IPC surface to drive `Push`/`Unshare` against.
    let _coordinator = Arc::new(PushCoordinator::new(devices.clone(), origin.clone(), http.clone()));

    tokio::spawn(log_device_lifecycle(devices.clone()));

    // ========== Phase 2: device discovery ==========
    info!("starting SSDP discovery");
    let ssdp_client = SsdpClient::new().await?;
    let lister = DeviceLister::new();
    let (tx, rx) = mpsc::channel::<DeviceEvent>(64);

    tokio::spawn(lister.run(
        ssdp_client,
        Duration::from_secs(config.ssdp_resend_interval_secs()),
        config.ssdp_search_timeout_secs() as u32,
        tx,
    ));

    tokio::spawn(promote_proxies(
        rx,
        devices.clone(),
        http.clone(),
        icon_cache,
    ));

    info!("Korva is ready");

    // ========== Phase 3: run until interrupted ==========
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, waiting for background tasks to settle");
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    info!("Korva stopped");
    std::process::exit(0);
}

/// The Device Lister's "proxy-available/unavailable → device lifecycle"
/// half (spec §4.F): looks up the UDN in `devices`, then `pending`, else
/// spawns introspection; a completed introspection promotes the device and
/// emits `DeviceAvailable`.
async fn promote_proxies(
    mut rx: mpsc::Receiver<DeviceEvent>,
    devices: Arc<DeviceRegistry>,
    http: reqwest::Client,
    icon_cache: Arc<IconCache>,
) {
    let pending = Arc::new(Mutex::new(HashSet::<String>::new()));

    while let Some(event) = rx.recv().await {
        match event {
            DeviceEvent::ProxyAvailable {
                udn,
                location,
                server,
                from,
                ..
            } => {
                let proxy = Proxy {
                    from: from.ip(),
                    location: location.clone(),
                    server_header: server.clone(),
                };
                if devices.add_proxy(&udn, proxy).await {
                    continue;
                }

                let mut pending_guard = pending.lock().await;
                if !pending_guard.insert(udn.clone()) {
                    continue;
                }
                drop(pending_guard);

                let devices = devices.clone();
                let http = http.clone();
                let icon_cache = icon_cache.clone();
                let pending = pending.clone();
                tokio::spawn(async move {
                    let result = introspect(
                        &udn,
                        &location,
                        &server,
                        from.ip(),
                        http,
                        Some(icon_cache.as_ref()),
                    )
                    .await;
                    match result {
                        Ok(device) => devices.insert(device).await,
                        Err(e) => warn!(%udn, "introspection rejected device: {}", e),
                    }
                    pending.lock().await.remove(&udn);
                });
            }
            DeviceEvent::ProxyUnavailable { udn, from } => {
                devices.remove_proxy(&udn, from.ip()).await;
            }
        }
    }
}

async fn log_device_lifecycle(devices: Arc<DeviceRegistry>) {
    let mut rx = devices.subscribe();
    loop {
        match rx.recv().await {
            Ok(DeviceLifecycleEvent::Available(device)) => {
                info!(uid = %device.uid, name = %device.display_name, "DeviceAvailable");
            }
            Ok(DeviceLifecycleEvent::Unavailable(uid)) => {
                info!(%uid, "DeviceUnavailable");
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "device lifecycle subscriber lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                error!("device lifecycle channel closed");
                break;
            }
        }
    }
}
