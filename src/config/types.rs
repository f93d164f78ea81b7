use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use mediaweave_common::ResolutionFlags;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-source overrides keyed by source id.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl Config {
    /// Overrides for `source_id`, if the config names it.
    pub fn source(&self, source_id: &str) -> Option<&SourceConfig> {
        self.sources.get(source_id)
    }

    /// Whether `source_id` may be registered with a broker.
    pub fn source_enabled(&self, source_id: &str) -> bool {
        self.source(source_id).map(|s| s.enabled).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Add IDLE_RELAY to every browse, search and query request
    #[serde(default)]
    pub idle_relay: bool,

    /// Upper bound for the blocking conveniences, in seconds (0 = wait forever)
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,
}

fn default_sync_timeout() -> u64 {
    30
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            idle_relay: false,
            sync_timeout_secs: default_sync_timeout(),
        }
    }
}

impl BrokerConfig {
    /// Flags merged into every result-stream request.
    pub fn default_flags(&self) -> ResolutionFlags {
        if self.idle_relay {
            ResolutionFlags::IDLE_RELAY
        } else {
            ResolutionFlags::empty()
        }
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        match self.sync_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "mediaweave=info,mediaweave_common=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ordering among sources for full resolution and multiple search;
    /// higher ranks are consulted first
    #[serde(default)]
    pub rank: Option<i32>,

    /// Page size above which requests are split into chunks (0 disables)
    #[serde(default)]
    pub auto_split_threshold: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rank: None,
            auto_split_threshold: None,
        }
    }
}
