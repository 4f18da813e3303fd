use std::io::{self, Write};
use std::time::Instant;

use chrono::{Local, TimeZone};

use crate::engine::Counters;
use crate::flow::FlowKey;

/// Default stdout flush interval in microseconds (~1.05 s). Machine mode
/// tightens this to a tenth (~100 ms).
const FLUSH_INTERVAL_US: i64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Human,
    Machine,
}

/// One RTT sample, ready for output.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub rtt: f64,
    pub min_rtt: f64,
    pub f_bytes: u64,
    pub d_bytes: u64,
    pub p_bytes: u64,
}

/// Formats samples and summaries onto an output stream.
///
/// Flushing is a best-effort timing hint: a monotonic microsecond clock is
/// consulted after each sample, and the stream is flushed whenever "now"
/// crosses `next_flush`.
pub struct Reporter<W: Write> {
    out: W,
    mode: Mode,
    clock: Instant,
    flush_interval: i64,
    next_flush: i64,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, mode: Mode) -> Self {
        let flush_interval = match mode {
            Mode::Human => FLUSH_INTERVAL_US,
            Mode::Machine => FLUSH_INTERVAL_US / 10,
        };
        Self {
            out,
            mode,
            clock: Instant::now(),
            flush_interval,
            next_flush: flush_interval,
        }
    }

    /// One-line notice for the first packet of the capture.
    pub fn first_packet(&mut self, ts_sec: i64, ts_nsec: u32) -> io::Result<()> {
        writeln!(self.out, "first packet at {}", local_stamp(ts_sec, ts_nsec, "%a %b %e %H:%M:%S %Y"))
    }

    /// Emit one RTT sample record.
    pub fn sample(
        &mut self,
        ts_sec: i64,
        ts_nsec: u32,
        cap_tm: f64,
        off_tm: i64,
        sample: &Sample,
        flow: &FlowKey,
    ) -> io::Result<()> {
        match self.mode {
            Mode::Human => writeln!(
                self.out,
                "{} {} {} {}",
                local_stamp(ts_sec, ts_nsec, "%H:%M:%S"),
                fmt_time_diff(sample.rtt),
                fmt_time_diff(sample.min_rtt),
                flow
            )?,
            Mode::Machine => {
                let sec = (cap_tm + off_tm as f64) as i64;
                let usec = ((cap_tm - cap_tm.trunc()) * 1e6) as i64;
                writeln!(
                    self.out,
                    "{sec}.{usec:06} {:.6} {:.6} {} {} {}",
                    sample.rtt, sample.min_rtt, sample.f_bytes, sample.d_bytes, sample.p_bytes
                )?
            }
        }
        self.maybe_flush()
    }

    /// Summary line; zero counters are omitted, `flow_cnt` and `pkt_cnt`
    /// always appear.
    pub fn summary(&mut self, flow_cnt: usize, c: &Counters) -> io::Result<()> {
        write!(self.out, "{} flows, {} packets", flow_cnt, c.pkt_cnt)?;
        if c.no_ts > 0 {
            write!(self.out, ", {} no TS opt", c.no_ts)?;
        }
        if c.uni_dir > 0 {
            write!(self.out, ", {} uni-directional", c.uni_dir)?;
        }
        if c.not_tcp > 0 {
            write!(self.out, ", {} not TCP", c.not_tcp)?;
        }
        if c.not_v4or6 > 0 {
            write!(self.out, ", {} not v4 or v6", c.not_v4or6)?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    /// Final line printed when the capture ends.
    pub fn capture_end(&mut self, pkt_cnt: u64, elapsed: f64) -> io::Result<()> {
        writeln!(self.out, "Captured {pkt_cnt} packets in {elapsed:.2} seconds")?;
        self.out.flush()
    }

    fn maybe_flush(&mut self) -> io::Result<()> {
        let now = self.clock.elapsed().as_micros() as i64;
        if now >= self.next_flush {
            self.next_flush = now + self.flush_interval;
            self.out.flush()?;
        }
        Ok(())
    }
}

fn local_stamp(ts_sec: i64, ts_nsec: u32, fmt: &str) -> String {
    match Local.timestamp_opt(ts_sec, ts_nsec).single() {
        Some(dt) => dt.format(fmt).to_string(),
        None => String::from("?"),
    }
}

/// Format a time difference in seconds with an SI-scaled unit: values
/// under 1 ms print in microseconds (`u`), under 1 s in milliseconds
/// (`m`), otherwise in seconds. Precision narrows as the scaled value
/// grows; three or more digits get a leading space.
pub fn fmt_time_diff(dt: f64) -> String {
    let (v, unit) = if dt < 1e-3 {
        (dt * 1e6, "u")
    } else if dt < 1.0 {
        (dt * 1e3, "m")
    } else {
        (dt, "")
    };
    if v < 10.0 {
        format!("{v:.2}{unit}s")
    } else if v < 100.0 {
        format!("{v:.1}{unit}s")
    } else {
        format!(" {v:.0}{unit}s")
    }
}
