//! Fetches and parses a UPnP `device.xml`, classifying it per spec §4.E
//! step 1 and locating the AVTransport/ConnectionManager control endpoints.
//!
//! Ported from `pmocontrol::discovery::upnp_provider::ParsedDeviceDescription`:
//! same streaming `quick_xml::Reader` walk tracking `in_device`/`in_service`
//! and the current leaf tag, trimmed to the two services Korva drives (no
//! RenderingControl, ContentDirectory, or OpenHome — multi-backend support
//! is out of scope).

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::errors::RendererError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Server,
    Player,
}

#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub service_type: String,
    pub control_url: String,
}

#[derive(Debug, Clone)]
pub struct IconEntry {
    pub mimetype: String,
    pub width: u32,
    pub height: u32,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceDescription {
    pub udn: String,
    pub device_type: String,
    pub friendly_name: String,
    pub avtransport: Option<ServiceEndpoint>,
    pub connection_manager: Option<ServiceEndpoint>,
    pub icons: Vec<IconEntry>,
}

/// Picks an icon per spec §4.E step 4: prefer `image/png`, fall back to
/// `image/jpeg`; within a mimetype, the smallest icon at or above the
/// 64×64 floor wins (mirrors `gupnp_device_info_get_icon_url(..., 64, 64,
/// allow_size_greater=TRUE, ...)`).
pub fn pick_icon(icons: &[IconEntry]) -> Option<&IconEntry> {
    pick_for_mimetype(icons, "image/png").or_else(|| pick_for_mimetype(icons, "image/jpeg"))
}

fn pick_for_mimetype<'a>(icons: &'a [IconEntry], mimetype: &str) -> Option<&'a IconEntry> {
    icons
        .iter()
        .filter(|i| i.mimetype == mimetype && i.width >= 64 && i.height >= 64)
        .min_by_key(|i| i.width * i.height)
}

/// Classifies a UPnP device type string per spec §4.E step 1. `Server` short
/// circuits introspection (Korva never pushes to a MediaServer); `Player`
/// continues to service location.
pub fn classify(device_type: &str) -> Result<DeviceKind, RendererError> {
    let lower = device_type.to_ascii_lowercase();
    if matches_device_pattern(&lower, "mediaserver") {
        Ok(DeviceKind::Server)
    } else if matches_device_pattern(&lower, "mediarenderer") {
        Ok(DeviceKind::Player)
    } else {
        Err(RendererError::InvalidDeviceType(device_type.to_string()))
    }
}

fn matches_device_pattern(lower_device_type: &str, kind: &str) -> bool {
    // "urn:schemas-upnp-org:device:MediaRenderer:1" — match the device kind
    // token followed by ":<digits>" at the end, case-insensitively.
    let needle = format!(":device:{kind}:");
    match lower_device_type.find(&needle) {
        Some(idx) => {
            let rest = &lower_device_type[idx + needle.len()..];
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

pub async fn fetch(location: &str) -> Result<DeviceDescription, RendererError> {
    let body = reqwest::get(location).await?.bytes().await?;
    parse(&body, location)
}

fn parse(xml: &[u8], location: &str) -> Result<DeviceDescription, RendererError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut parsed = DeviceDescription::default();

    let mut in_device = false;
    let mut in_service = false;
    let mut in_icon = false;
    let mut current_tag: Option<String> = None;
    let mut current_service_type: Option<String> = None;
    let mut current_control_url: Option<String> = None;
    let mut current_icon: Option<(String, u32, u32, String)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "device" => {
                        in_device = true;
                        current_tag = None;
                    }
                    "service" if in_device => {
                        in_service = true;
                        current_service_type = None;
                        current_control_url = None;
                    }
                    "icon" if in_device => {
                        in_icon = true;
                        current_icon = Some((String::new(), 0, 0, String::new()));
                    }
                    _ if in_device => current_tag = Some(name),
                    _ => {}
                }
            }
            Event::Text(e) => {
                if in_device {
                    if let Some(tag) = &current_tag {
                        let text = e.unescape()?.into_owned();
                        match tag.as_str() {
                            "UDN" => parsed.udn = text,
                            "deviceType" => parsed.device_type = text,
                            "friendlyName" => parsed.friendly_name = text,
                            "serviceType" if in_service => current_service_type = Some(text),
                            "controlURL" if in_service => current_control_url = Some(text),
                            "mimetype" if in_icon => {
                                if let Some(icon) = &mut current_icon {
                                    icon.0 = text;
                                }
                            }
                            "width" if in_icon => {
                                if let Some(icon) = &mut current_icon {
                                    icon.1 = text.parse().unwrap_or(0);
                                }
                            }
                            "height" if in_icon => {
                                if let Some(icon) = &mut current_icon {
                                    icon.2 = text.parse().unwrap_or(0);
                                }
                            }
                            "url" if in_icon => {
                                if let Some(icon) = &mut current_icon {
                                    icon.3 = text;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "device" => in_device = false,
                    "service" if in_device && in_service => {
                        if let (Some(st), Some(ctrl)) =
                            (&current_service_type, &current_control_url)
                        {
                            let lower = st.to_ascii_lowercase();
                            let resolved = resolve_control_url(location, ctrl);
                            if lower.contains(":service:avtransport:")
                                && parsed.avtransport.is_none()
                            {
                                debug!(service_type = %st, control_url = %resolved, "found AVTransport");
                                parsed.avtransport = Some(ServiceEndpoint {
                                    service_type: st.clone(),
                                    control_url: resolved,
                                });
                            } else if lower.contains(":service:connectionmanager:")
                                && parsed.connection_manager.is_none()
                            {
                                debug!(service_type = %st, control_url = %resolved, "found ConnectionManager");
                                parsed.connection_manager = Some(ServiceEndpoint {
                                    service_type: st.clone(),
                                    control_url: resolved,
                                });
                            }
                        }
                        in_service = false;
                    }
                    "icon" if in_device && in_icon => {
                        if let Some((mimetype, width, height, url)) = current_icon.take() {
                            parsed.icons.push(IconEntry {
                                mimetype,
                                width,
                                height,
                                url: resolve_control_url(location, &url),
                            });
                        }
                        in_icon = false;
                    }
                    _ => {}
                }
                current_tag = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(parsed)
}

/// Resolves a `controlURL` (often relative) against the device description
/// location.
fn resolve_control_url(description_url: &str, control_url: &str) -> String {
    if control_url.starts_with("http://") || control_url.starts_with("https://") {
        return control_url.to_string();
    }
    if let Some((scheme, rest)) = description_url.split_once("://") {
        if let Some(pos) = rest.find('/') {
            let authority = &rest[..pos];
            let base = format!("{scheme}://{authority}");
            return if control_url.starts_with('/') {
                format!("{base}{control_url}")
            } else {
                format!("{base}/{control_url}")
            };
        }
    }
    control_url.to_string()
}
