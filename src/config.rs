//! Simulation configuration.
//!
//! Defaults are embedded, a TOML document can override them, and environment
//! variables (`NETSIM_*`) override both. Recognized keys:
//!
//! - `seed`: master seed for all deterministic randomness
//! - `workers`: worker count for the run
//! - `event_granularity`: calendar bucket width in virtual ms
//! - `timer_table_capacity`: initial per-host timer table capacity
//! - `use_wallclock_startup_time_offset`: guests see wall-epoch + virtual time
//! - `runahead_floor_ms`: lower clamp on the topology's minimum latency
//! - `heartbeat_batch`: max events dispatched per heartbeat
//! - `recv_queue_packets`: per-socket receive queue bound
//! - `max_time_ms`: optional hard stop for the virtual clock
//! - `stall_timeout_ms`: wall-clock bound on zero-progress stalls
//! - `trace_dispatch`: record per-worker dispatch logs (testing)

use std::fmt;

use serde::Deserialize;

#[derive(Debug)]
pub enum ConfigError {
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub seed: u64,
    pub workers: usize,
    pub event_granularity: u64,
    pub timer_table_capacity: usize,
    pub use_wallclock_startup_time_offset: bool,
    pub runahead_floor_ms: u64,
    pub heartbeat_batch: usize,
    pub recv_queue_packets: usize,
    pub max_time_ms: Option<u64>,
    pub stall_timeout_ms: u64,
    pub trace_dispatch: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            seed: 42,
            workers: 1,
            event_granularity: 1,
            timer_table_capacity: 64,
            use_wallclock_startup_time_offset: false,
            runahead_floor_ms: 10,
            heartbeat_batch: 1024,
            recv_queue_packets: 1024,
            max_time_ms: None,
            stall_timeout_ms: 5000,
            trace_dispatch: false,
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(doc: &str) -> Result<Self, ConfigError> {
        let cfg: SimConfig = toml::from_str(doc).map_err(ConfigError::Parse)?;
        cfg.validated()
    }

    /// Apply `NETSIM_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("NETSIM_SEED") {
            self.seed = v;
        }
        if let Some(v) = env_parse("NETSIM_WORKERS") {
            self.workers = v;
        }
        if let Some(v) = env_parse("NETSIM_RUNAHEAD_FLOOR_MS") {
            self.runahead_floor_ms = v;
        }
        if let Some(v) = env_parse("NETSIM_MAX_TIME_MS") {
            self.max_time_ms = Some(v);
        }
        if let Ok(v) = std::env::var("NETSIM_WALLCLOCK_OFFSET") {
            self.use_wallclock_startup_time_offset = v == "1" || v.eq_ignore_ascii_case("true");
        }
        self
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be >= 1".into()));
        }
        if self.event_granularity == 0 {
            return Err(ConfigError::Invalid(
                "event_granularity must be >= 1".into(),
            ));
        }
        if self.runahead_floor_ms < 2 {
            // With a lookahead below 2ms no worker can ever pull ahead of its
            // peers' barrier and the window protocol cannot make progress.
            return Err(ConfigError::Invalid(
                "runahead_floor_ms must be >= 2".into(),
            ));
        }
        if self.heartbeat_batch == 0 {
            return Err(ConfigError::Invalid("heartbeat_batch must be >= 1".into()));
        }
        Ok(self)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
