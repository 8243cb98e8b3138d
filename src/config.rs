//! Node Configuration
//!
//! Everything a node needs to know before it joins the grid: where it listens,
//! how many replicas each key gets, and the timeouts and L1 bounds used by the
//! routing layer.
//!
//! Values come from an optional JSON file (`--config <path>`) and are then
//! overridden by command line flags.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// UDP address used by the gossip membership protocol.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Gossip addresses of existing members. Empty means this node founds the cluster.
    #[serde(default)]
    pub seed_nodes: Vec<SocketAddr>,

    /// The HTTP port is the gossip port plus this offset.
    #[serde(default = "default_http_port_offset")]
    pub http_port_offset: u16,

    /// Replicas per key, primary included.
    #[serde(default = "default_num_owners")]
    pub num_owners: usize,

    #[serde(default = "default_num_segments")]
    pub num_segments: u32,

    /// Upper bound on any synchronous remote call (remote reads, forwarding, replication).
    #[serde(default = "default_sync_repl_timeout_ms")]
    pub sync_repl_timeout_ms: u64,

    #[serde(default = "default_lock_acquisition_timeout_ms")]
    pub lock_acquisition_timeout_ms: u64,

    /// Keep near-cache copies of entries fetched from remote owners.
    #[serde(default = "default_l1_enabled")]
    pub l1_enabled: bool,

    /// Maximum lifespan of a near-cache copy.
    #[serde(default = "default_l1_lifespan_ms")]
    pub l1_lifespan_ms: u64,

    /// How often expired entries, idle locks and stale operation ids are purged.
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,

    #[serde(default)]
    pub verbose: bool,
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a String> {
    args.get(i + 1)
        .ok_or_else(|| anyhow::anyhow!("{} requires a value", flag))
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_http_port_offset() -> u16 {
    1000
}

fn default_num_owners() -> usize {
    2
}

fn default_num_segments() -> u32 {
    256
}

fn default_sync_repl_timeout_ms() -> u64 {
    15_000
}

fn default_lock_acquisition_timeout_ms() -> u64 {
    10_000
}

fn default_l1_enabled() -> bool {
    true
}

fn default_l1_lifespan_ms() -> u64 {
    600_000
}

fn default_maintenance_interval_ms() -> u64 {
    1_000
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            seed_nodes: Vec::new(),
            http_port_offset: default_http_port_offset(),
            num_owners: default_num_owners(),
            num_segments: default_num_segments(),
            sync_repl_timeout_ms: default_sync_repl_timeout_ms(),
            lock_acquisition_timeout_ms: default_lock_acquisition_timeout_ms(),
            l1_enabled: default_l1_enabled(),
            l1_lifespan_ms: default_l1_lifespan_ms(),
            maintenance_interval_ms: default_maintenance_interval_ms(),
            verbose: false,
        }
    }
}

impl GridConfig {
    /// Builds a configuration from process arguments (`args[0]` is the program name).
    ///
    /// Recognised flags: `--config <path>`, `--bind <addr:port>`, `--seed <addr:port>`
    /// (repeatable), `--owners <n>`, `--segments <n>`, `--timeout-ms <n>`,
    /// `--l1-lifespan-ms <n>`, `--no-l1`, `--verbose`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = match args.iter().position(|arg| arg == "--config") {
            Some(idx) => {
                let path = args
                    .get(idx + 1)
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => GridConfig::default(),
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    i += 2;
                }
                "--bind" => {
                    config.bind_addr = flag_value(args, i, "--bind")?.parse()?;
                    i += 2;
                }
                "--seed" => {
                    config.seed_nodes.push(flag_value(args, i, "--seed")?.parse()?);
                    i += 2;
                }
                "--owners" => {
                    config.num_owners = flag_value(args, i, "--owners")?.parse()?;
                    i += 2;
                }
                "--segments" => {
                    config.num_segments = flag_value(args, i, "--segments")?.parse()?;
                    i += 2;
                }
                "--timeout-ms" => {
                    config.sync_repl_timeout_ms = flag_value(args, i, "--timeout-ms")?.parse()?;
                    i += 2;
                }
                "--l1-lifespan-ms" => {
                    config.l1_lifespan_ms = flag_value(args, i, "--l1-lifespan-ms")?.parse()?;
                    i += 2;
                }
                "--no-l1" => {
                    config.l1_enabled = false;
                    i += 1;
                }
                "--verbose" => {
                    config.verbose = true;
                    i += 1;
                }
                other => {
                    tracing::warn!("Ignoring unknown argument {}", other);
                    i += 1;
                }
            }
        }

        if config.num_owners == 0 {
            anyhow::bail!("--owners must be at least 1");
        }
        if config.num_segments == 0 {
            anyhow::bail!("--segments must be at least 1");
        }

        Ok(config)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.bind_addr.ip(),
            self.bind_addr.port() + self.http_port_offset,
        )
    }

    pub fn is_founder(&self) -> bool {
        self.seed_nodes.is_empty()
    }

    pub fn sync_repl_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_repl_timeout_ms)
    }

    pub fn lock_acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_acquisition_timeout_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}
