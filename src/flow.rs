use std::fmt;
use std::net::IpAddr;

/// `min_rtt` sentinel for a flow that has not produced a sample yet.
pub const MIN_RTT_SENTINEL: f64 = 1e30;

/// A directed flow: the ordered `(src, dst)` address pair. The reverse
/// direction of the same connection is a distinct key.
///
/// Displays as `"srcIP:srcPort+dstIP:dstPort"`, the form used in human
/// output (IPv6 addresses are canonical, without brackets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

impl FlowKey {
    /// The sibling flow running in the opposite direction.
    pub fn reversed(&self) -> FlowKey {
        FlowKey {
            src_ip: self.dst_ip,
            src_port: self.dst_port,
            dst_ip: self.src_ip,
            dst_port: self.src_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}+{}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Per-direction flow state.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    /// Capture-relative time of the most recent packet on this direction.
    pub last_seen: f64,
    /// Smallest RTT sample observed for this direction so far.
    pub min_rtt: f64,
    /// Cumulative wire bytes observed for this direction at the CP.
    pub bytes_sent: u64,
    /// `bytes_sent` captured when this direction last emitted a sample.
    pub bytes_at_last_sample: u64,
    /// Cumulative bytes the opposite direction had delivered up to the
    /// most recent echo point; written by the opposite direction.
    pub bytes_departed: u64,
    /// True once both directions of the connection have been observed.
    pub reverse_seen: bool,
}

impl FlowRecord {
    pub fn new(reverse_seen: bool) -> Self {
        Self {
            last_seen: 0.0,
            min_rtt: MIN_RTT_SENTINEL,
            bytes_sent: 0,
            bytes_at_last_sample: 0,
            bytes_departed: 0,
            reverse_seen,
        }
    }
}

/// One observed `(flow, TSval)` anchor awaiting its echo.
#[derive(Debug, Clone, Copy)]
pub struct TsEntry {
    /// CP-arrival time of the packet that first carried this TSval,
    /// capture-relative seconds. Used for age-based eviction even after
    /// the entry has matched.
    pub t: f64,
    /// The depositing flow's cumulative bytes including that packet.
    pub f_bytes: u64,
    /// The depositing flow's `bytes_departed` at insertion time.
    pub d_bytes: u64,
    /// Set after the first successful match; a consumed entry never
    /// matches again.
    pub consumed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn flow_key_display_is_textual_form() {
        let key = FlowKey {
            src_ip: "10.0.0.1".parse().unwrap(),
            src_port: 1000,
            dst_ip: "10.0.0.2".parse().unwrap(),
            dst_port: 2000,
        };
        assert_eq!(key.to_string(), "10.0.0.1:1000+10.0.0.2:2000");
        assert_eq!(key.reversed().to_string(), "10.0.0.2:2000+10.0.0.1:1000");
        assert_eq!(key.reversed().reversed(), key);
    }

    #[test]
    fn flow_key_display_ipv6_has_no_brackets() {
        let key = FlowKey {
            src_ip: IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
            src_port: 443,
            dst_ip: IpAddr::V6(Ipv6Addr::LOCALHOST),
            dst_port: 55000,
        };
        assert_eq!(key.to_string(), "2001:db8::1:443+::1:55000");
    }
}
