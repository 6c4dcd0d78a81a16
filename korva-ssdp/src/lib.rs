//! SSDP control point and device lifecycle fan-in (component F, Device
//! Lister).
//!
//! Split in two layers, same as the teacher's SSDP stack generalizes here:
//! [`client`] speaks the wire protocol (M-SEARCH, NOTIFY, search responses)
//! over an async UDP socket; [`lister`] de-duplicates repeat announcements
//! per UDN and turns the event stream into a `Proxy{Available,Unavailable}`
//! fan-in that a higher layer (which owns the actual `Device`/`Proxy`
//! model) folds into device lifecycle.

pub mod client;
pub mod lister;
pub mod registry;

pub use client::{SsdpClient, SsdpEvent};
pub use lister::{DeviceEvent, DeviceLister};
pub use registry::UdnRegistry;

/// SSDP multicast group address.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";
/// SSDP multicast port.
pub const SSDP_PORT: u16 = 1900;
/// Default `CACHE-CONTROL: max-age` assumed when a message omits it.
pub const MAX_AGE: u32 = 1800;
/// Search target Korva's control point hunts for; Korva only pushes to
/// renderers, so MediaServer discovery is out of scope.
pub const MEDIA_RENDERER_ST: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";
