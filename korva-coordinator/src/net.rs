//! Host-interface selection (spec §4.G step 4): "choose the interface whose
//! subnet contains the device IP".
//!
//! Grounded on `pmoupnp::ssdp::client`'s `get_if_addrs` interface walk
//! (reused as-is in `korva_ssdp::client::SsdpClient::new`), extended with
//! the netmask containment check an SSDP join doesn't need.

use std::net::{IpAddr, Ipv4Addr};

use get_if_addrs::IfAddr;

/// Returns the local IPv4 address whose subnet contains `device_ip`, or
/// `None` if no interface shares a subnet with it (spec: `NOT_COMPATIBLE`).
pub fn local_iface_for(device_ip: IpAddr) -> Option<IpAddr> {
    let IpAddr::V4(target) = device_ip else {
        return None;
    };
    let interfaces = get_if_addrs::get_if_addrs().ok()?;
    for iface in interfaces {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            if same_subnet(v4.ip, v4.netmask, target) {
                return Some(IpAddr::V4(v4.ip));
            }
        }
    }
    None
}

fn same_subnet(iface_ip: Ipv4Addr, netmask: Ipv4Addr, target: Ipv4Addr) -> bool {
    let mask = u32::from(netmask);
    u32::from(iface_ip) & mask == u32::from(target) & mask
}
