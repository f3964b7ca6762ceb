//! Controller configuration.
//!
//! There is deliberately no CLI layer; orchestration tooling starts the
//! process and points switches at `udp:<ip>:<port>`. Environment variables
//! override the defaults for the few knobs that matter.

use std::env;
use std::time::Duration;

/// Default OpenFlow controller port.
pub const DEFAULT_PORT: u16 = 6653;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the controller socket on.
    pub host: String,
    pub port: u16,
    /// How often the keepalive monitor ticks (and ECHO_REQUESTs go out).
    pub keepalive_interval: Duration,
    /// Silence longer than this evicts a READY session. Held at 3x the
    /// keepalive interval so a single lost echo round does not kill a
    /// healthy switch.
    pub liveness_timeout: Duration,
    /// Bounded socket read wait, so the receive loop can notice shutdown.
    pub recv_timeout: Duration,
    /// Idle timeout for learned flows, seconds.
    pub flow_idle_timeout: u16,
    /// Hard timeout for learned flows, seconds.
    pub flow_hard_timeout: u16,
}

impl Default for Config {
    fn default() -> Config {
        let keepalive = Duration::from_secs(5);
        Config {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            keepalive_interval: keepalive,
            liveness_timeout: keepalive * 3,
            recv_timeout: Duration::from_millis(500),
            flow_idle_timeout: 30,
            flow_hard_timeout: 300,
        }
    }
}

impl Config {
    /// Defaults overridden by `OFP_UDP_HOST`, `OFP_UDP_PORT`,
    /// `OFP_KEEPALIVE_SECS`, `OFP_FLOW_IDLE_SECS`, and `OFP_FLOW_HARD_SECS`.
    /// Unparseable values fall back to the default rather than aborting.
    pub fn from_env() -> Config {
        let mut cfg = Config::default();
        if let Ok(host) = env::var("OFP_UDP_HOST") {
            cfg.host = host;
        }
        if let Some(port) = env_parse::<u16>("OFP_UDP_PORT") {
            cfg.port = port;
        }
        if let Some(secs) = env_parse::<u64>("OFP_KEEPALIVE_SECS") {
            if secs > 0 {
                cfg.keepalive_interval = Duration::from_secs(secs);
                cfg.liveness_timeout = cfg.keepalive_interval * 3;
            }
        }
        if let Some(secs) = env_parse::<u16>("OFP_FLOW_IDLE_SECS") {
            cfg.flow_idle_timeout = secs;
        }
        if let Some(secs) = env_parse::<u16>("OFP_FLOW_HARD_SECS") {
            cfg.flow_hard_timeout = secs;
        }
        cfg
    }

    /// The bind address in `host:port` form.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 6653);
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(5));
        assert_eq!(cfg.liveness_timeout, Duration::from_secs(15));
        assert_eq!(cfg.bind_addr(), "0.0.0.0:6653");
    }
}
