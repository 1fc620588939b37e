use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    50999
}

fn default_discovery_port() -> u16 {
    50999
}

fn default_multicast_group() -> String {
    "224.0.0.251".to_string()
}

fn default_ttl() -> u64 {
    3600
}

fn default_display_name() -> String {
    format!("Peer_{}", std::process::id() % 9000 + 1000)
}

fn default_inbox_dir() -> String {
    "inbox".to_string()
}

/// Top-level configuration merged from layered YAML files and CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// UDP port this peer listens on for unicast traffic.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Fixed well-known port used for broadcast/multicast discovery.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// IPv4 multicast group joined for presence discovery.
    #[serde(default = "default_multicast_group")]
    pub multicast_group: String,

    /// Display name advertised in PROFILE frames.
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Default bearer token lifetime, in seconds.
    #[serde(default = "default_ttl")]
    pub token_ttl_secs: u64,

    /// Probability (0.0..=1.0) of simulating a dropped send for game/file traffic.
    #[serde(default)]
    pub loss_probability: f64,

    /// Force loopback-only addressing, tolerating FROM/IP mismatches from 127.0.0.1.
    #[serde(default)]
    pub loopback: bool,

    /// Root directory under which received files are written, per-sender.
    #[serde(default = "default_inbox_dir")]
    pub inbox_dir: String,

    /// Emit SEND/RECV/DROP traces for every frame, not just warnings.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            discovery_port: default_discovery_port(),
            multicast_group: default_multicast_group(),
            display_name: default_display_name(),
            token_ttl_secs: default_ttl(),
            loss_probability: 0.0,
            loopback: false,
            inbox_dir: default_inbox_dir(),
            verbose: false,
        }
    }
}
