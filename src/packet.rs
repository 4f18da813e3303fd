use std::net::IpAddr;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};

/// TCP option kind and length of the Timestamps option (RFC 7323 §3.2).
const TCP_OPT_TIMESTAMPS: u8 = 8;
const TCP_OPT_TIMESTAMPS_LEN: u8 = 10;
const TCP_OPT_END: u8 = 0;
const TCP_OPT_NOP: u8 = 1;

/// Fields of an eligible packet needed by the matcher.
#[derive(Debug, Clone, Copy)]
pub struct PacketInfo {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub tsval: u32,
    pub tsecr: u32,
    pub syn: bool,
}

/// Outcome of classifying one captured frame. The drop variants mirror
/// the summary counters.
#[derive(Debug, Clone, Copy)]
pub enum Classified {
    NotTcp,
    NoTimestamp,
    NotIp,
    Flow(PacketInfo),
}

/// Classify a link-layer frame: TCP first, then the Timestamps option and
/// its eligibility rule, then the network layer.
///
/// A packet is ineligible when `TSval == 0`, or when `TSecr == 0` on a
/// non-SYN segment (a SYN legitimately carries `TSecr == 0`; a non-SYN
/// without an echo cannot produce a match).
pub fn classify(frame: &[u8]) -> Classified {
    let sliced = match SlicedPacket::from_ethernet(frame) {
        Ok(s) => s,
        Err(_) => return Classified::NotTcp,
    };

    let tcp = match sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => tcp,
        _ => return Classified::NotTcp,
    };

    let (tsval, tsecr) = timestamps(tcp.options());
    let syn = tcp.syn();
    if tsval == 0 || (tsecr == 0 && !syn) {
        return Classified::NoTimestamp;
    }

    let (src_ip, dst_ip) = match sliced.net {
        Some(NetSlice::Ipv4(v4)) => (
            IpAddr::V4(v4.header().source_addr()),
            IpAddr::V4(v4.header().destination_addr()),
        ),
        Some(NetSlice::Ipv6(v6)) => (
            IpAddr::V6(v6.header().source_addr()),
            IpAddr::V6(v6.header().destination_addr()),
        ),
        _ => return Classified::NotIp,
    };

    Classified::Flow(PacketInfo {
        src_ip,
        dst_ip,
        src_port: tcp.source_port(),
        dst_port: tcp.destination_port(),
        tsval,
        tsecr,
        syn,
    })
}

/// Scan the TCP options bytes for the Timestamps option and return
/// `(TSval, TSecr)`, or `(0, 0)` when absent or malformed.
pub fn timestamps(options: &[u8]) -> (u32, u32) {
    let mut pos = 0;
    while pos < options.len() {
        match options[pos] {
            TCP_OPT_END => break,
            TCP_OPT_NOP => {
                pos += 1;
            }
            kind => {
                if pos + 1 >= options.len() {
                    break;
                }
                let len = options[pos + 1] as usize;
                if len < 2 || pos + len > options.len() {
                    break;
                }
                if kind == TCP_OPT_TIMESTAMPS && len == TCP_OPT_TIMESTAMPS_LEN as usize {
                    let data = &options[pos + 2..pos + 10];
                    let tsval = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                    let tsecr = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
                    return (tsval, tsecr);
                }
                pos += len;
            }
        }
    }
    (0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::{PacketBuilder, TcpOptionElement};

    fn tcp_frame(tsval: u32, tsecr: u32, syn: bool) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(1000, 2000, 1, 64240);
        let builder = if syn { builder.syn() } else { builder };
        let builder = builder
            .options(&[TcpOptionElement::Timestamp(tsval, tsecr)])
            .unwrap();
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();
        frame
    }

    #[test]
    fn timestamps_parses_kind_8() {
        // NOP, NOP, Timestamps(0x01020304, 0x05060708)
        let opts = [
            1, 1, 8, 10, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ];
        assert_eq!(timestamps(&opts), (0x01020304, 0x05060708));
    }

    #[test]
    fn timestamps_absent_or_malformed() {
        // MSS only.
        assert_eq!(timestamps(&[2, 4, 0x05, 0xb4]), (0, 0));
        // End-of-options before anything useful.
        assert_eq!(timestamps(&[0, 8, 10]), (0, 0));
        // Truncated timestamps option.
        assert_eq!(timestamps(&[8, 10, 1, 2, 3]), (0, 0));
        // Zero-length option would not advance; must bail out.
        assert_eq!(timestamps(&[3, 0, 8, 10]), (0, 0));
        assert_eq!(timestamps(&[]), (0, 0));
    }

    #[test]
    fn syn_with_zero_tsecr_is_eligible() {
        match classify(&tcp_frame(100, 0, true)) {
            Classified::Flow(info) => {
                assert_eq!(info.tsval, 100);
                assert_eq!(info.tsecr, 0);
                assert!(info.syn);
                assert_eq!(info.src_ip, "10.0.0.1".parse::<IpAddr>().unwrap());
                assert_eq!(info.src_port, 1000);
                assert_eq!(info.dst_port, 2000);
            }
            other => panic!("expected eligible packet, got {other:?}"),
        }
    }

    #[test]
    fn non_syn_with_zero_tsecr_is_dropped() {
        assert!(matches!(
            classify(&tcp_frame(100, 0, false)),
            Classified::NoTimestamp
        ));
    }

    #[test]
    fn zero_tsval_is_dropped() {
        assert!(matches!(
            classify(&tcp_frame(0, 7, false)),
            Classified::NoTimestamp
        ));
    }

    #[test]
    fn missing_timestamp_option_is_dropped() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(1000, 2000, 1, 64240);
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();
        assert!(matches!(classify(&frame), Classified::NoTimestamp));
    }

    #[test]
    fn udp_is_not_tcp() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(1000, 2000);
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();
        assert!(matches!(classify(&frame), Classified::NotTcp));
    }

    #[test]
    fn garbage_is_not_tcp() {
        assert!(matches!(classify(&[0u8; 11]), Classified::NotTcp));
    }

    #[test]
    fn ipv6_addresses_are_reported() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv6(
                [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
                [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
                64,
            )
            .tcp(443, 55000, 1, 64240)
            .options(&[TcpOptionElement::Timestamp(42, 7)])
            .unwrap();
        let mut frame = Vec::with_capacity(builder.size(0));
        builder.write(&mut frame, &[]).unwrap();
        match classify(&frame) {
            Classified::Flow(info) => {
                assert_eq!(info.src_ip, "2001:db8::1".parse::<IpAddr>().unwrap());
                assert_eq!(info.dst_ip, "2001:db8::2".parse::<IpAddr>().unwrap());
            }
            other => panic!("expected eligible packet, got {other:?}"),
        }
    }
}
