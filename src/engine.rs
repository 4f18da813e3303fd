use std::collections::HashMap;
use std::io::{self, Write};
use std::net::IpAddr;

use crate::flow::{FlowKey, FlowRecord, TsEntry};
use crate::packet::{classify, Classified};
use crate::report::{Reporter, Sample};

/// Engine tuning; durations are in seconds, zero disables a limit.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Max age of an unmatched TSval anchor before eviction.
    pub tsval_max_age: f64,
    /// Idle time after which a flow is forgotten.
    pub flow_max_idle: f64,
    /// Interval between summary reports; 0 disables summaries.
    pub sum_interval: f64,
    /// Hard cap on the flow table; over-limit new flows are dropped.
    pub max_flows: usize,
    /// Stop after this many seconds of capture (0 = no limit).
    pub time_to_run: f64,
    /// Stop after this many processed packets (0 = no limit).
    pub max_packets: u64,
    /// When set, flows terminating at this address are not measured.
    pub local_addr: Option<IpAddr>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tsval_max_age: 10.0,
            flow_max_idle: 300.0,
            sum_interval: 10.0,
            max_flows: 10_000,
            time_to_run: 0.0,
            max_packets: 0,
            local_addr: None,
        }
    }
}

/// Per-interval drop and packet counters, reported in summaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub pkt_cnt: u64,
    pub no_ts: u64,
    pub uni_dir: u64,
    pub not_tcp: u64,
    pub not_v4or6: u64,
}

/// The packet-to-RTT pipeline: flow table, timestamp-echo table, clock
/// anchors, and counters, advanced one captured packet at a time.
///
/// Each outbound segment's TSval is remembered with its CP-arrival time;
/// the first packet in the reverse direction whose TSecr echoes it yields
/// one RTT sample for the echoing direction.
pub struct Engine<W: Write> {
    cfg: EngineConfig,
    reporter: Reporter<W>,
    pub(crate) flows: HashMap<FlowKey, FlowRecord>,
    pub(crate) ts_tbl: HashMap<(FlowKey, u32), TsEntry>,
    pub(crate) counters: Counters,
    /// Whole seconds of the first eligible packet's wall clock; −1 until
    /// anchored.
    off_tm: i64,
    /// Fractional-second offset of the first eligible packet.
    start_m: f64,
    /// Current capture time, seconds since `off_tm`.
    cap_tm: f64,
    next_sum: f64,
    next_clean: f64,
}

impl<W: Write> Engine<W> {
    pub fn new(cfg: EngineConfig, reporter: Reporter<W>) -> Self {
        Self {
            cfg,
            reporter,
            flows: HashMap::new(),
            ts_tbl: HashMap::new(),
            counters: Counters::default(),
            off_tm: -1,
            start_m: 0.0,
            cap_tm: 0.0,
            next_sum: 0.0,
            next_clean: 0.0,
        }
    }

    /// Process one captured frame. `wire_len` is the link-level length
    /// from the capture metadata, not the captured snapshot length.
    pub fn process_packet(
        &mut self,
        frame: &[u8],
        ts_sec: i64,
        ts_nsec: u32,
        wire_len: u32,
    ) -> io::Result<()> {
        let info = match classify(frame) {
            Classified::NotTcp => {
                self.counters.not_tcp += 1;
                return Ok(());
            }
            Classified::NoTimestamp => {
                self.counters.no_ts += 1;
                return Ok(());
            }
            Classified::NotIp => {
                self.counters.not_v4or6 += 1;
                return Ok(());
            }
            Classified::Flow(info) => info,
        };

        let fkey = FlowKey {
            src_ip: info.src_ip,
            src_port: info.src_port,
            dst_ip: info.dst_ip,
            dst_port: info.dst_port,
        };
        let rkey = fkey.reversed();

        // Anchor the capture clock on the first eligible packet.
        if self.off_tm < 0 {
            self.off_tm = ts_sec;
            self.start_m = ts_nsec as f64 * 1e-9;
            self.cap_tm = self.start_m;
            if self.cfg.sum_interval > 0.0 {
                self.reporter.first_packet(ts_sec, ts_nsec)?;
            }
        } else {
            self.cap_tm = (ts_sec - self.off_tm) as f64 + ts_nsec as f64 * 1e-9;
        }
        let cap_tm = self.cap_tm;

        if !self.flows.contains_key(&fkey) {
            if self.flows.len() >= self.cfg.max_flows {
                return Ok(());
            }
            // If the reverse direction already exists, both records learn
            // they are bi-directional; otherwise the reverse side will
            // retro-set both when it appears.
            let reverse_seen = match self.flows.get_mut(&rkey) {
                Some(rev) => {
                    rev.reverse_seen = true;
                    true
                }
                None => false,
            };
            self.flows.insert(fkey, FlowRecord::new(reverse_seen));
        }
        let Some(fr) = self.flows.get_mut(&fkey) else {
            return Ok(());
        };
        fr.last_seen = cap_tm;

        // A direction contributes samples only once its reverse sibling
        // has been observed.
        if !fr.reverse_seen {
            self.counters.uni_dir += 1;
            return Ok(());
        }

        let arr_fwd = fr.bytes_sent + wire_len as u64;
        fr.bytes_sent = arr_fwd;

        // Deposit the TSval anchor, unless the packet terminates at the
        // local host (which would confound CP-to-source RTT). First
        // writer wins: a retransmit's duplicate TSval never refreshes the
        // earliest arrival.
        if self.cfg.local_addr != Some(info.dst_ip) {
            let d_bytes = fr.bytes_departed;
            self.ts_tbl.entry((fkey, info.tsval)).or_insert(TsEntry {
                t: cap_tm,
                f_bytes: arr_fwd,
                d_bytes,
                consumed: false,
            });
        }

        // Echo match: does TSecr point at an anchor the reverse direction
        // deposited earlier?
        let mut emitted: Option<Sample> = None;
        if let Some(entry) = self.ts_tbl.get_mut(&(rkey, info.tsecr)) {
            if !entry.consumed {
                let rtt = cap_tm - entry.t;
                if rtt < fr.min_rtt {
                    fr.min_rtt = rtt;
                }
                let p_bytes = arr_fwd - fr.bytes_at_last_sample;
                fr.bytes_at_last_sample = arr_fwd;
                emitted = Some(Sample {
                    rtt,
                    min_rtt: fr.min_rtt,
                    f_bytes: entry.f_bytes,
                    d_bytes: entry.d_bytes,
                    p_bytes,
                });
                entry.consumed = true;
            }
        }
        if let Some(sample) = emitted {
            // The reverse flow now knows how many bytes its counterpart
            // had delivered up to the echo point. The reverse record can
            // be gone if the sweeper evicted it while this side stayed
            // active; the sample still stands.
            if let Some(rev) = self.flows.get_mut(&rkey) {
                rev.bytes_departed = sample.f_bytes;
            }
            self.reporter
                .sample(ts_sec, ts_nsec, cap_tm, self.off_tm, &sample, &fkey)?;
        }

        self.counters.pkt_cnt += 1;
        Ok(())
    }

    /// Opportunistic housekeeping, run by the driver after each packet:
    /// summary emission and stale-entry sweeps on capture-time cadence.
    pub fn housekeep(&mut self) -> io::Result<()> {
        if self.cap_tm >= self.next_sum && self.cfg.sum_interval > 0.0 {
            // The very first crossing only schedules; later crossings
            // emit and reset the interval counters.
            if self.next_sum > 0.0 {
                self.print_summary()?;
                self.counters = Counters::default();
            }
            self.next_sum = self.cap_tm + self.cfg.sum_interval;
        }
        if self.cap_tm >= self.next_clean {
            self.clean_up();
            self.next_clean = self.cap_tm + self.cfg.tsval_max_age;
        }
        Ok(())
    }

    /// True once a configured packet or time limit has been reached.
    pub fn limit_reached(&self) -> bool {
        (self.cfg.time_to_run > 0.0 && self.cap_tm - self.start_m >= self.cfg.time_to_run)
            || (self.cfg.max_packets > 0 && self.counters.pkt_cnt >= self.cfg.max_packets)
    }

    /// Emit the final summary and capture totals.
    pub fn finish(&mut self) -> io::Result<()> {
        self.print_summary()?;
        let elapsed = self.cap_tm - self.start_m;
        self.reporter.capture_end(self.counters.pkt_cnt, elapsed)
    }

    /// Evict TSval anchors older than `tsval_max_age` and flows idle
    /// longer than `flow_max_idle`. Flow eviction does not cascade to TS
    /// entries; those age out independently.
    pub fn clean_up(&mut self) {
        let cap_tm = self.cap_tm;
        let max_age = self.cfg.tsval_max_age;
        self.ts_tbl.retain(|_, e| cap_tm - e.t <= max_age);
        let max_idle = self.cfg.flow_max_idle;
        self.flows.retain(|_, fr| cap_tm - fr.last_seen <= max_idle);
    }

    fn print_summary(&mut self) -> io::Result<()> {
        self.reporter.summary(self.flows.len(), &self.counters)
    }
}
