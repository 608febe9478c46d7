//! Resolver configuration

use anyhow::{bail, Result};
use fleet_lib::{
    CatalogConfig, EscalationPolicy, FailureCacheConfig, FleetResolverConfig,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "FLEET_CONFIG_FILE";

/// Resolver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding the vendor inventory snapshot
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Fraction of raw memory consumed by the hypervisor
    #[serde(default = "default_vm_memory_overhead")]
    pub vm_memory_overhead_percent: f64,

    #[serde(default = "default_quota_cache_ttl")]
    pub quota_cache_ttl_secs: u64,

    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,

    #[serde(default = "default_block_ttl")]
    pub block_ttl_secs: u64,

    /// Interval of the background purge of expired failure state
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_max_instance_types")]
    pub max_instance_types: usize,

    #[serde(default = "default_exact_failure_threshold")]
    pub exact_failure_threshold: u32,

    #[serde(default = "default_spot_zone_failure_threshold")]
    pub spot_zone_failure_threshold: u32,
}

fn default_instance_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("/var/lib/fleet-resolver/snapshot")
}

fn default_vm_memory_overhead() -> f64 {
    fleet_lib::capacity::DEFAULT_VM_MEMORY_OVERHEAD
}

fn default_quota_cache_ttl() -> u64 {
    600
}

fn default_failure_window() -> u64 {
    3600
}

fn default_block_ttl() -> u64 {
    600
}

fn default_purge_interval() -> u64 {
    60
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_instance_types() -> usize {
    60
}

fn default_exact_failure_threshold() -> u32 {
    3
}

fn default_spot_zone_failure_threshold() -> u32 {
    50
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            snapshot_dir: default_snapshot_dir(),
            vm_memory_overhead_percent: default_vm_memory_overhead(),
            quota_cache_ttl_secs: default_quota_cache_ttl(),
            failure_window_secs: default_failure_window(),
            block_ttl_secs: default_block_ttl(),
            purge_interval_secs: default_purge_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_instance_types: default_max_instance_types(),
            exact_failure_threshold: default_exact_failure_threshold(),
            spot_zone_failure_threshold: default_spot_zone_failure_threshold(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from the optional config file and `FLEET_*` environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file)
    }

    pub fn load_from(file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        let config: ResolverConfig = builder
            .add_source(config::Environment::with_prefix("FLEET").try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.vm_memory_overhead_percent) {
            bail!(
                "vm_memory_overhead_percent must be within [0.0, 1.0], got {}",
                self.vm_memory_overhead_percent
            );
        }
        for (name, value) in [
            ("quota_cache_ttl_secs", self.quota_cache_ttl_secs),
            ("failure_window_secs", self.failure_window_secs),
            ("block_ttl_secs", self.block_ttl_secs),
            ("purge_interval_secs", self.purge_interval_secs),
            ("fetch_timeout_secs", self.fetch_timeout_secs),
            ("max_instance_types", self.max_instance_types as u64),
            ("exact_failure_threshold", u64::from(self.exact_failure_threshold)),
            ("spot_zone_failure_threshold", u64::from(self.spot_zone_failure_threshold)),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    /// Engine tuning derived from this configuration
    pub fn engine(&self) -> FleetResolverConfig {
        FleetResolverConfig {
            catalog: CatalogConfig {
                survey_ttl: Duration::from_secs(self.quota_cache_ttl_secs),
                fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
                vm_memory_overhead: self.vm_memory_overhead_percent,
            },
            failures: FailureCacheConfig {
                failure_window: Duration::from_secs(self.failure_window_secs),
                block_ttl: Duration::from_secs(self.block_ttl_secs),
            },
            escalation: EscalationPolicy {
                exact_threshold: self.exact_failure_threshold,
                spot_zone_threshold: self.spot_zone_failure_threshold,
            },
            max_instance_types: self.max_instance_types,
        }
    }
}
