use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::detector::engine::DetectionSettings;
use crate::detector::receipt::ReceiptStrategy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_http: String,
    pub rpc_ws: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Optional override of the built-in alert threshold, in native units.
    /// Kept as a string so the exact decimal survives parsing.
    pub min_native_threshold: Option<String>,
    /// Optional override of the built-in native-receipt strategy.
    pub receipt_strategy: Option<ReceiptStrategy>,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl ChainConfig {
    pub fn min_native_threshold_decimal(&self) -> eyre::Result<Option<BigDecimal>> {
        match &self.min_native_threshold {
            None => Ok(None),
            Some(raw) => BigDecimal::from_str(raw)
                .map(Some)
                .map_err(|e| eyre::eyre!("Invalid min_native_threshold '{}': {}", raw, e)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_low_nonce_threshold")]
    pub low_nonce_threshold: u64,
    #[serde(default = "default_min_swap_count")]
    pub min_swap_count: usize,
    #[serde(default = "default_max_swap_gap_secs")]
    pub max_swap_gap_secs: u64,
    #[serde(default = "default_sweep_cadence_blocks")]
    pub sweep_cadence_blocks: u64,
    /// When set, delay processing by this many distinct block confirmations.
    pub confirmation_delay_blocks: Option<u64>,
    /// USD threshold the price refresh converts into native units.
    #[serde(default = "default_min_usd_threshold")]
    pub min_usd_threshold: String,
    #[serde(default = "default_price_refresh_secs")]
    pub price_refresh_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            low_nonce_threshold: default_low_nonce_threshold(),
            min_swap_count: default_min_swap_count(),
            max_swap_gap_secs: default_max_swap_gap_secs(),
            sweep_cadence_blocks: default_sweep_cadence_blocks(),
            confirmation_delay_blocks: None,
            min_usd_threshold: default_min_usd_threshold(),
            price_refresh_secs: default_price_refresh_secs(),
        }
    }
}

fn default_low_nonce_threshold() -> u64 {
    150
}

fn default_min_swap_count() -> usize {
    2
}

fn default_max_swap_gap_secs() -> u64 {
    1800
}

fn default_sweep_cadence_blocks() -> u64 {
    10_000
}

fn default_min_usd_threshold() -> String {
    "50000".to_string()
}

fn default_price_refresh_secs() -> u64 {
    3600
}

impl DetectionConfig {
    pub fn settings(&self) -> DetectionSettings {
        DetectionSettings {
            low_nonce_threshold: self.low_nonce_threshold,
            min_swap_count: self.min_swap_count,
            max_swap_gap_secs: self.max_swap_gap_secs,
            sweep_cadence_blocks: self.sweep_cadence_blocks,
            confirmation_delay_blocks: self.confirmation_delay_blocks,
        }
    }

    pub fn min_usd_threshold_decimal(&self) -> eyre::Result<BigDecimal> {
        BigDecimal::from_str(&self.min_usd_threshold).map_err(|e| {
            eyre::eyre!(
                "Invalid min_usd_threshold '{}': {}",
                self.min_usd_threshold,
                e
            )
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.chains.is_empty() {
            return Err(eyre::eyre!("At least one chain must be configured"));
        }
        for chain in &self.chains {
            if !crate::chains::is_supported(chain.chain_id) {
                return Err(eyre::eyre!(
                    "Chain '{}' (id {}) is not supported",
                    chain.name,
                    chain.chain_id
                ));
            }
            chain.min_native_threshold_decimal()?;
        }
        if self.detection.min_swap_count == 0 {
            return Err(eyre::eyre!("min_swap_count must be at least 1"));
        }
        self.detection.min_usd_threshold_decimal()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[detection]
low_nonce_threshold = 100
min_swap_count = 3

[[chains]]
name = "ethereum"
chain_id = 1
rpc_http = "http://localhost:8545"
min_native_threshold = "30"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].chain_id, 1);
        assert_eq!(config.detection.low_nonce_threshold, 100);
        assert_eq!(config.detection.min_swap_count, 3);
        // defaults
        assert_eq!(config.detection.max_swap_gap_secs, 1800);
        assert_eq!(config.detection.sweep_cadence_blocks, 10_000);
        assert_eq!(config.chains[0].poll_interval_ms, 2000);
        assert_eq!(config.provider.timeout_ms, 5000);
        assert!(config.detection.confirmation_delay_blocks.is_none());
    }

    #[test]
    fn test_parse_strategy_override() {
        let toml_str = r#"
[[chains]]
name = "fantom"
chain_id = 250
rpc_http = "http://localhost:8545"
receipt_strategy = "burn-to-zero"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.chains[0].receipt_strategy,
            Some(ReceiptStrategy::BurnToZero)
        );
    }

    #[test]
    fn test_validate_empty_chains() {
        let config = Config {
            chains: vec![],
            detection: DetectionConfig::default(),
            provider: ProviderConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unsupported_chain() {
        let config = Config {
            chains: vec![ChainConfig {
                name: "mysterychain".to_string(),
                chain_id: 73,
                rpc_http: "http://localhost:8545".to_string(),
                rpc_ws: None,
                poll_interval_ms: 2000,
                min_native_threshold: None,
                receipt_strategy: None,
            }],
            detection: DetectionConfig::default(),
            provider: ProviderConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_threshold() {
        let config = Config {
            chains: vec![ChainConfig {
                name: "ethereum".to_string(),
                chain_id: 1,
                rpc_http: "http://localhost:8545".to_string(),
                rpc_ws: None,
                poll_interval_ms: 2000,
                min_native_threshold: Some("thirty".to_string()),
                receipt_strategy: None,
            }],
            detection: DetectionConfig::default(),
            provider: ProviderConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
