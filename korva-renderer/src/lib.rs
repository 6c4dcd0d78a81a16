//! Renderer Device (component E): SOAP client, AVTransport/ConnectionManager
//! control, device-description fetch/classify, the multi-interface
//! `Device`/`Proxy` model, and the push protocol driver.

pub mod client;
pub mod description;
pub mod device;
pub mod errors;
pub mod push;
pub mod registry;
pub mod soap;

pub use client::{AvTransportClient, ConnectionManagerClient, TransportInfo};
pub use description::{pick_icon, DeviceDescription, DeviceKind, IconEntry, ServiceEndpoint};
pub use device::{introspect, Device, IconStore, IntrospectionState, Proxy};
pub use errors::RendererError;
pub use registry::{DeviceLifecycleEvent, DeviceRegistry, SharedDeviceRegistry};
