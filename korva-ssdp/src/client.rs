//! Async SSDP control point.
//!
//! Korva is a control point only, never a device: it must *not* bind to
//! UDP port 1900. The SSDP server role (answering M-SEARCH) binds
//! `0.0.0.0:1900` and joins multicast; a control point binds an ephemeral
//! port and only sends M-SEARCH / listens for unicast HTTP/200 replies and
//! incidental NOTIFYs. Binding both roles to 1900 makes the kernel
//! load-balance datagrams between sockets and drops replies at random.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT};

/// Events a control point cares about.
#[derive(Debug, Clone)]
pub enum SsdpEvent {
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    SearchResponse {
        usn: String,
        st: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
}

pub struct SsdpClient {
    socket: Arc<UdpSocket>,
}

impl SsdpClient {
    /// Binds an ephemeral port and joins the SSDP multicast group on every
    /// non-loopback IPv4 interface (for incidental NOTIFY reception; the
    /// group membership is not required to receive unicast M-SEARCH replies).
    pub async fn new() -> std::io::Result<Self> {
        let socket2 = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        socket2.set_reuse_address(true)?;
        socket2.set_nonblocking(true)?;
        let bind_addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        socket2.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(socket2.into())?;
        socket.set_multicast_loop_v4(true)?;

        for iface in get_if_addrs::get_if_addrs()? {
            if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                if !ipv4.is_loopback() {
                    match socket.join_multicast_v4(SSDP_MULTICAST_ADDR.parse().unwrap(), ipv4) {
                        Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                        Err(e) => warn!(
                            "SSDP: failed to join {} on {}: {}",
                            SSDP_MULTICAST_ADDR, ipv4, e
                        ),
                    }
                }
            }
        }

        debug!("SSDP client ready on ephemeral port");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Sends an M-SEARCH for `st` with the given MX (response spread window,
    /// seconds).
    pub async fn send_msearch(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let mx = mx.max(1);
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {SSDP_MULTICAST_ADDR}:{SSDP_PORT}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {mx}\r\n\
             ST: {st}\r\n\
             USER-AGENT: Korva SSDP Client\r\n\
             \r\n"
        );
        let addr: SocketAddr = format!("{SSDP_MULTICAST_ADDR}:{SSDP_PORT}").parse().unwrap();
        self.socket.send_to(msg.as_bytes(), addr).await?;
        debug!("M-SEARCH sent (ST={}, MX={})", st, mx);
        Ok(())
    }

    /// Runs the receive loop, forwarding parsed events to `tx`. Returns when
    /// the socket errors unrecoverably or `tx` is closed.
    pub async fn run(&self, tx: mpsc::Sender<SsdpEvent>) {
        let mut buf = [0u8; 8192];
        loop {
            let (n, from) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("SSDP client read error: {}", e);
                    continue;
                }
            };
            let data = String::from_utf8_lossy(&buf[..n]);
            if let Some(event) = parse_message(&data, from) {
                trace!("SSDP event from {}: {:?}", from, event);
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    if upper.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else if upper.starts_with("HTTP/") && upper.contains(" 200 ") {
        handle_search_response(&headers, from)
    } else {
        // M-SEARCH from another control point, or unrecognized: we are
        // never a device, so we have nothing to answer with.
        None
    }
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN")?.to_string();

    if nts == "ssdp:alive" {
        let location = headers.get("LOCATION")?.to_string();
        let server = headers
            .get("SERVER")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let max_age = parse_max_age(headers.get("CACHE-CONTROL"));
        Some(SsdpEvent::Alive {
            usn,
            nt,
            location,
            server,
            max_age,
            from,
        })
    } else if nts == "ssdp:byebye" {
        Some(SsdpEvent::ByeBye { usn, nt, from })
    } else {
        None
    }
}

fn handle_search_response(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let st = headers.get("ST")?.to_string();
    let usn = headers.get("USN")?.to_string();
    let location = headers.get("LOCATION")?.to_string();
    let server = headers
        .get("SERVER")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    let max_age = parse_max_age(headers.get("CACHE-CONTROL"));
    Some(SsdpEvent::SearchResponse {
        usn,
        st,
        location,
        server,
        max_age,
        from,
    })
}

fn parse_headers<'a, I: Iterator<Item = &'a str>>(lines: I) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some(colon) = line.find(':') {
            let name = line[..colon].trim().to_ascii_uppercase();
            let value = line[colon + 1..].trim().to_string();
            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value);
            }
        }
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_key = &v[idx + 7..];
            let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
            let digits: String = after_eq.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
    }
    MAX_AGE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:1900".parse().unwrap()
    }

    #[test]
    fn parses_alive_notify() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                    HOST: 239.255.255.250:1900\r\n\
                    NT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                    NTS: ssdp:alive\r\n\
                    USN: uuid:abc-123::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                    LOCATION: http://192.168.1.5:8080/device.xml\r\n\
                    SERVER: Linux/1.0 UPnP/1.0 Example/1.0\r\n\
                    CACHE-CONTROL: max-age=900\r\n\r\n";
        let event = parse_message(msg, addr()).unwrap();
        match event {
            SsdpEvent::Alive {
                usn, location, max_age, ..
            } => {
                assert_eq!(usn, "uuid:abc-123::urn:schemas-upnp-org:device:MediaRenderer:1");
                assert_eq!(location, "http://192.168.1.5:8080/device.xml");
                assert_eq!(max_age, 900);
            }
            other => panic!("expected Alive, got {:?}", other),
        }
    }

    #[test]
    fn parses_byebye_notify() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                    NT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                    NTS: ssdp:byebye\r\n\
                    USN: uuid:abc-123::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\r\n";
        let event = parse_message(msg, addr()).unwrap();
        assert!(matches!(event, SsdpEvent::ByeBye { .. }));
    }

    #[test]
    fn parses_search_response() {
        let msg = "HTTP/1.1 200 OK\r\n\
                    ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                    USN: uuid:abc-123::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
                    LOCATION: http://192.168.1.5:8080/device.xml\r\n\
                    CACHE-CONTROL: max-age=1800\r\n\r\n";
        let event = parse_message(msg, addr()).unwrap();
        assert!(matches!(event, SsdpEvent::SearchResponse { .. }));
    }

    #[test]
    fn missing_location_drops_alive() {
        let msg = "NOTIFY * HTTP/1.1\r\n\
                    NT: x\r\n\
                    NTS: ssdp:alive\r\n\
                    USN: uuid:abc\r\n\r\n";
        assert!(parse_message(msg, addr()).is_none());
    }

    #[test]
    fn missing_cache_control_falls_back_to_default_max_age() {
        assert_eq!(parse_max_age(None), MAX_AGE);
    }
}
