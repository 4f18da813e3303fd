use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Application configuration, loadable from CLI or YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Network interface to capture on (live mode)
    #[serde(default)]
    pub interface: Option<String>,

    /// Capture file to read instead of a live interface
    #[serde(default)]
    pub read: Option<String>,

    /// Extra BPF filter, combined with the base filter as "tcp and (<expr>)"
    #[serde(default)]
    pub filter: Option<String>,

    /// Seconds between summary reports (0 disables)
    #[serde(default = "default_sum_int")]
    pub sum_int: u64,

    /// Report flows terminating at the capture interface's own address
    #[serde(default)]
    pub show_local: bool,

    /// Stop after capturing for this many seconds (0 = no limit)
    #[serde(default)]
    pub seconds: u64,

    /// Stop after processing this many packets (0 = no limit)
    #[serde(default)]
    pub count: u64,

    /// Machine readable output
    #[serde(default)]
    pub machine: bool,

    /// Max age in seconds of an unmatched TSval entry
    #[serde(default = "default_tsval_max_age")]
    pub tsval_max_age: u64,

    /// Seconds of idle time before a flow is forgotten
    #[serde(default = "default_flow_max_idle")]
    pub flow_max_idle: u64,

    /// Hard cap on tracked flows; new flows beyond it are dropped
    #[serde(default = "default_max_flows")]
    pub max_flows: usize,
}

fn default_sum_int() -> u64 {
    10
}

fn default_tsval_max_age() -> u64 {
    10
}

fn default_flow_max_idle() -> u64 {
    300
}

fn default_max_flows() -> usize {
    10_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            read: None,
            filter: None,
            sum_int: default_sum_int(),
            show_local: false,
            seconds: 0,
            count: 0,
            machine: false,
            tsval_max_age: default_tsval_max_age(),
            flow_max_idle: default_flow_max_idle(),
            max_flows: default_max_flows(),
        }
    }
}

impl Config {
    /// Load config from a YAML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Merge CLI args into config (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &CliArgs) {
        if cli.interface.is_some() {
            self.interface = cli.interface.clone();
        }
        if cli.read.is_some() {
            self.read = cli.read.clone();
        }
        if cli.filter.is_some() {
            self.filter = cli.filter.clone();
        }
        if cli.sum_int != default_sum_int() {
            self.sum_int = cli.sum_int;
        }
        if cli.show_local {
            self.show_local = true;
        }
        if cli.seconds != 0 {
            self.seconds = cli.seconds;
        }
        if cli.count != 0 {
            self.count = cli.count;
        }
        if cli.machine {
            self.machine = true;
        }
        if cli.tsval_max_age != default_tsval_max_age() {
            self.tsval_max_age = cli.tsval_max_age;
        }
        if cli.flow_max_idle != default_flow_max_idle() {
            self.flow_max_idle = cli.flow_max_idle;
        }
    }
}

use clap::Parser;

/// Passive TCP RTT measurement from a live interface or a capture file
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Network interface to capture on (live mode)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Read packets from a capture file instead of a live interface
    #[arg(short, long)]
    pub read: Option<String>,

    /// Extra BPF filter, combined with the base filter as "tcp and (<expr>)"
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Seconds between summary reports (0 disables)
    #[arg(short = 'q', long = "sumInt", default_value_t = default_sum_int())]
    pub sum_int: u64,

    /// Report flows terminating at the capture interface's own address
    #[arg(short = 'l', long = "showLocal")]
    pub show_local: bool,

    /// Stop after capturing for this many seconds (0 = no limit)
    #[arg(short, long, default_value_t = 0)]
    pub seconds: u64,

    /// Stop after processing this many packets (0 = no limit)
    #[arg(short, long, default_value_t = 0)]
    pub count: u64,

    /// Machine readable output
    #[arg(short, long)]
    pub machine: bool,

    /// Max age in seconds of an unmatched TSval entry
    #[arg(short = 'M', long = "tsvalMaxAge", default_value_t = default_tsval_max_age())]
    pub tsval_max_age: u64,

    /// Seconds of idle time before a flow is forgotten
    #[arg(short = 'F', long = "flowMaxIdle", default_value_t = default_flow_max_idle())]
    pub flow_max_idle: u64,

    /// Path to YAML config file
    #[arg(long)]
    pub config: Option<String>,
}
