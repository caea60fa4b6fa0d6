//! Configuration management for the CCTX relayer node
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::ballot::Threshold;
use crate::capability::ForeignCoin;

use anyhow::{Context, Result};
use ethers::types::U256;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub node: NodeConfig,
    #[serde(default)]
    pub ballot: BallotConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub foreign_coins: Vec<ForeignCoin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Observer identity of this node
    pub observer_id: String,
    /// Ordered observer set; order decides broadcaster election
    pub observers: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    pub protocol_chain_id: i64,
    /// Finalized ballots older than this many blocks are pruned
    #[serde(default = "default_ballot_retention")]
    pub ballot_retention_blocks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BallotConfig {
    pub threshold_numerator: u64,
    pub threshold_denominator: u64,
}

impl Default for BallotConfig {
    fn default() -> Self {
        let threshold = Threshold::default();
        Self {
            threshold_numerator: threshold.numerator,
            threshold_denominator: threshold.denominator,
        }
    }
}

impl BallotConfig {
    pub fn threshold(&self) -> Threshold {
        Threshold {
            numerator: self.threshold_numerator,
            denominator: self.threshold_denominator,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    /// Used when an outbound leg carries no gas limit
    pub default_gas_limit: u64,
    pub broadcast_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 5000,
            default_gas_limit: 90_000,
            broadcast_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: i64,
    pub name: String,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    /// Gateway contract receiving `onReceive` calls
    #[serde(default)]
    pub gateway_address: String,
    /// Gas price in wei copied onto new outbound legs
    pub gas_price: String,
    #[serde(default)]
    pub start_nonce: u64,
    pub enabled: bool,
}

impl ChainConfig {
    pub fn gas_price(&self) -> Result<U256> {
        U256::from_dec_str(&self.gas_price)
            .with_context(|| format!("Invalid gas price for chain {}", self.name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the hex private key
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "CCTX_RELAYER_PRIVATE_KEY".to_string(),
        }
    }
}

fn default_ballot_retention() -> u64 {
    10_000
}

impl Settings {
    /// Load settings from the file named by `CCTX_RELAYER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("CCTX_RELAYER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.node.observers.is_empty() {
            anyhow::bail!("Observer set cannot be empty");
        }
        if !self.node.observers.contains(&self.node.observer_id) {
            tracing::warn!(
                "Observer {} is not in the observer set - will not vote or broadcast",
                self.node.observer_id
            );
        }
        self.ballot
            .threshold()
            .validate()
            .context("Invalid ballot threshold")?;

        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }
        for (name, chain) in &self.chains {
            if chain.chain_id == self.node.protocol_chain_id {
                anyhow::bail!("Chain {} uses the protocol chain id", name);
            }
            chain.gas_price()?;
            if chain.enabled && chain.rpc_urls.is_empty() {
                tracing::warn!("Chain {} has no RPC URLs configured - will not broadcast", name);
            }
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: i64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[node]
observer_id = "observer-0"
observers = ["observer-0", "observer-1", "observer-2"]
admins = ["admin"]
protocol_chain_id = 7000

[ballot]
threshold_numerator = 2
threshold_denominator = 3

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090

[chains.goerli]
chain_id = 5
name = "goerli"
rpc_urls = ["${CCTX_TEST_RPC}"]
gas_price = "20000000000"
enabled = true

[[foreign_coins]]
zrc20_contract = "0xzrc20"
foreign_chain_id = 5
coin_type = "gas"
symbol = "gETH"
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("CCTX_TEST_RPC", "http://localhost:8545");
        let file = write_config(SAMPLE);
        let settings = Settings::load_from(file.path()).unwrap();

        assert_eq!(settings.node.observers.len(), 3);
        assert_eq!(settings.ballot.threshold(), Threshold::default());
        assert_eq!(settings.monitor.poll_interval_ms, 5000);
        assert_eq!(settings.monitor.default_gas_limit, 90_000);
        let chain = settings.get_chain_by_id(5).unwrap();
        assert_eq!(chain.rpc_urls, vec!["http://localhost:8545".to_string()]);
        assert_eq!(chain.gas_price().unwrap(), U256::from(20_000_000_000u64));
        assert_eq!(settings.foreign_coins.len(), 1);
        assert_eq!(settings.wallet.private_key_env, "CCTX_RELAYER_PRIVATE_KEY");
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let content = SAMPLE.replace("threshold_numerator = 2", "threshold_numerator = 4");
        let file = write_config(&content);
        assert!(Settings::load_from(file.path()).is_err());
    }

    #[test]
    fn test_rejects_protocol_chain_as_external() {
        let content = SAMPLE.replace("chain_id = 5", "chain_id = 7000");
        let file = write_config(&content);
        assert!(Settings::load_from(file.path()).is_err());
    }
}
