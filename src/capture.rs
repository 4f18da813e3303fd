use std::net::IpAddr;

use pcap::{Activated, Capture, Device};

/// Capture snapshot length: enough to reach the TCP options under
/// Ethernet + maximum IPv4 options + a TCP header carrying timestamps.
pub const SNAP_LEN: i32 = 144;

/// Milliseconds before a blocked live read returns so the shutdown flag
/// gets polled on idle links.
const READ_TIMEOUT_MS: i32 = 1000;

/// Open a live capture on `interface` with the BPF `filter` applied.
pub fn open_live(interface: &str, filter: &str) -> Result<Capture<dyn Activated>, pcap::Error> {
    let mut cap = Capture::from_device(interface)?
        .snaplen(SNAP_LEN)
        .promisc(true)
        .timeout(READ_TIMEOUT_MS)
        .open()?;
    cap.filter(filter, true)?;
    tracing::info!("capturing on {interface}, filter {filter:?}");
    Ok(cap.into())
}

/// Open a capture file with the same BPF `filter` applied.
pub fn open_offline(path: &str, filter: &str) -> Result<Capture<dyn Activated>, pcap::Error> {
    let mut cap = Capture::from_file(path)?;
    cap.filter(filter, true)?;
    tracing::info!("reading {path}, filter {filter:?}");
    Ok(cap.into())
}

/// First non-loopback address of the named interface, preferring IPv4.
/// `None` when the interface is unknown or carries no usable address.
pub fn local_addr_of(ifname: &str) -> Option<IpAddr> {
    let device = Device::list().ok()?.into_iter().find(|d| d.name == ifname)?;
    let mut v6 = None;
    for address in device.addresses {
        if address.addr.is_loopback() {
            continue;
        }
        match address.addr {
            IpAddr::V4(_) => return Some(address.addr),
            IpAddr::V6(_) => {
                if v6.is_none() {
                    v6 = Some(address.addr);
                }
            }
        }
    }
    v6
}

/// Assemble the BPF program: always TCP, optionally narrowed by a
/// user expression.
pub fn build_filter(extra: Option<&str>) -> String {
    match extra {
        Some(expr) => format!("tcp and ({expr})"),
        None => String::from("tcp"),
    }
}
