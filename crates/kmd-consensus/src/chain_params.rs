//! Consensus parameters for Komodo-family chains.
//!
//! ## Static Chain Parameters (`ConsensusParams`)
//!
//! Everything the retarget and proof-of-work rules need to know about a
//! chain, fixed for the lifetime of the process:
//! - `ConsensusParams::kmd_mainnet()` for the base chain
//! - `ConsensusParams::asset_chain()` for an asset chain with default settings
//! - `ConsensusParams::regtest()` for private test networks
//! - `ConsensusParams::from_config()` for anything loaded from TOML
//!
//! ## Configuration (`ConsensusParamsConfig`)
//!
//! All fields are optional so a partial file is reported with the name of
//! the first missing or invalid field rather than a generic parse error.

use crate::uint::U256;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Largest averaging window the ancestor window can serve (the window holds
/// 64 entries and the retarget needs one ancestor beyond the average).
pub const MAX_AVERAGING_WINDOW: u32 = 63;

/// Default asset-chain block time in seconds.
pub const DEFAULT_BLOCK_TIME: i32 = 60;

/// Base-chain proof-of-work limit.
const KMD_POW_LIMIT_HEX: &str = "0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f";

/// Limit for chains mined with a non-Equihash algorithm.
const KMD_POW_ALTERNATE_HEX: &str =
    "00000f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f";

// ============================================================================
// Enumerations
// ============================================================================

/// Proof-of-work algorithm a chain is mined with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowAlgorithm {
    /// Equihash; targets are bounded by `pow_limit`.
    Equihash,
    /// Any other algorithm; targets are bounded by `pow_limit_alternate`.
    Alternate,
}

/// Network the node is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Main,
    Test,
    Regtest,
}

/// Adaptive proof-of-work mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdaptivePowMode {
    /// Baseline retarget only.
    #[default]
    Off,
    /// Baseline retarget plus trigger-based corrections.
    Trigger,
    /// Time-weighted exponential moving average.
    TimeWeightedEma,
}

impl AdaptivePowMode {
    /// Map the configured level. Non-positive levels are off; only 1 and 2
    /// are defined above that.
    pub fn from_level(level: i32) -> Option<Self> {
        match level {
            i32::MIN..=0 => Some(Self::Off),
            1 => Some(Self::Trigger),
            2 => Some(Self::TimeWeightedEma),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Equihash `(N, K)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquihashParams {
    pub n: u32,
    pub k: u32,
}

impl Default for EquihashParams {
    fn default() -> Self {
        Self { n: 200, k: 9 }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error when constructing ConsensusParams from configuration.
#[derive(Debug, Clone)]
pub struct ChainParamsError {
    /// The field that is missing or invalid.
    pub field: &'static str,
    /// Description of the error.
    pub message: String,
}

impl ChainParamsError {
    fn missing(field: &'static str) -> Self {
        Self {
            field,
            message: "required field missing".to_string(),
        }
    }

    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ChainParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsensusParams error for '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for ChainParamsError {}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for loading ConsensusParams from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsensusParamsConfig {
    /// `main`, `test` or `regtest`.
    pub network: Option<NetworkKind>,
    /// Asset-chain ticker; absent for the base chain.
    pub asset_chain_symbol: Option<String>,
    /// `equihash` (default) or `alternate`.
    pub algorithm: Option<PowAlgorithm>,
    /// Custom Equihash N (requires `equihash_k`).
    pub equihash_n: Option<u32>,
    /// Custom Equihash K (requires `equihash_n`).
    pub equihash_k: Option<u32>,
    /// Proof-of-work limit as big-endian hex.
    pub pow_limit_hex: Option<String>,
    /// Limit for non-Equihash algorithms; defaults to `pow_limit_hex`.
    pub pow_limit_alternate_hex: Option<String>,
    pub averaging_window: Option<u32>,
    /// Percent.
    pub max_adjust_down: Option<i64>,
    /// Percent.
    pub max_adjust_up: Option<i64>,
    /// Seconds.
    pub target_spacing: Option<i64>,
    /// 0 off, 1 trigger, 2 TSA-EMA.
    pub adaptive_pow: Option<i32>,
    /// Asset-chain block time in seconds (default 60).
    pub block_time: Option<i32>,
    pub staked: Option<bool>,
    pub max_future_block_time: Option<i64>,
    pub hf22_height: Option<u32>,
    pub hf22_rotate_delta: Option<u32>,
}

impl ConsensusParamsConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ChainParamsError> {
        toml::from_str(contents).map_err(|e| ChainParamsError::invalid("config", e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChainParamsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ChainParamsError::invalid(
                "config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::from_toml_str(&contents)
    }
}

fn parse_limit(field: &'static str, hex_str: &str) -> Result<U256, ChainParamsError> {
    let limit = U256::from_hex(hex_str)
        .ok_or_else(|| ChainParamsError::invalid(field, format!("invalid hex string: '{}'", hex_str)))?;
    if limit.is_zero() {
        return Err(ChainParamsError::invalid(field, "limit cannot be zero"));
    }
    Ok(limit)
}

// ============================================================================
// Static Chain Parameters
// ============================================================================

/// Per-chain consensus parameters.
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    pub network: NetworkKind,

    /// Asset-chain symbol; `None` for the base chain.
    pub asset_chain_symbol: Option<String>,

    pub algorithm: PowAlgorithm,

    /// Custom `(N, K)`; `None` means the default 200/9.
    pub equihash_override: Option<EquihashParams>,

    /// Easiest target allowed for Equihash chains (and for heights 0 and 1).
    pub pow_limit: U256,

    /// Easiest target allowed for non-Equihash chains.
    pub pow_limit_alternate: U256,

    /// Number of ancestors averaged by the baseline retarget.
    pub averaging_window: u32,

    /// Maximum difficulty decrease per retarget, percent.
    pub max_adjust_down: i64,

    /// Maximum difficulty increase per retarget, percent.
    pub max_adjust_up: i64,

    /// Target spacing in seconds.
    pub target_spacing: i64,

    pub adaptive_pow: AdaptivePowMode,

    /// Block time `T` used by the adaptive engine, seconds.
    pub block_time: i32,

    /// Staked chains check every block against the minimum difficulty.
    pub staked: bool,

    /// Maximum time a block may be ahead of adjusted time, seconds.
    pub max_future_block_time: i64,

    /// Height after which notaries may mine a second block after a gap.
    pub hf22_height: Option<u32>,

    /// Seconds each priority slot stays open after the gap.
    pub hf22_rotate_delta: u32,
}

impl ConsensusParams {
    /// Base chain mainnet parameters.
    pub fn kmd_mainnet() -> Self {
        Self {
            network: NetworkKind::Main,
            asset_chain_symbol: None,
            algorithm: PowAlgorithm::Equihash,
            equihash_override: None,
            pow_limit: U256::from_hex(KMD_POW_LIMIT_HEX).expect("valid mainnet pow limit hex"),
            pow_limit_alternate: U256::from_hex(KMD_POW_ALTERNATE_HEX)
                .expect("valid mainnet alternate limit hex"),
            averaging_window: 17,
            max_adjust_down: 32,
            max_adjust_up: 16,
            target_spacing: 60,
            adaptive_pow: AdaptivePowMode::Off,
            block_time: DEFAULT_BLOCK_TIME,
            staked: false,
            max_future_block_time: 7 * 60,
            hf22_height: Some(2_973_260),
            hf22_rotate_delta: 20,
        }
    }

    /// Asset chain with default settings.
    pub fn asset_chain(symbol: &str) -> Self {
        Self {
            asset_chain_symbol: Some(symbol.to_string()),
            hf22_height: None,
            ..Self::kmd_mainnet()
        }
    }

    /// Regression-test network parameters.
    pub fn regtest() -> Self {
        Self {
            network: NetworkKind::Regtest,
            hf22_height: None,
            ..Self::kmd_mainnet()
        }
    }

    /// Create ConsensusParams from configuration.
    ///
    /// Returns an error naming the specific field if any required field is
    /// missing or invalid.
    pub fn from_config(config: &ConsensusParamsConfig) -> Result<Self, ChainParamsError> {
        let network = config
            .network
            .ok_or_else(|| ChainParamsError::missing("network"))?;

        let pow_limit_hex = config
            .pow_limit_hex
            .as_ref()
            .ok_or_else(|| ChainParamsError::missing("pow_limit_hex"))?;
        let pow_limit = parse_limit("pow_limit_hex", pow_limit_hex)?;
        let pow_limit_alternate = match &config.pow_limit_alternate_hex {
            Some(hex_str) => parse_limit("pow_limit_alternate_hex", hex_str)?,
            None => pow_limit.clone(),
        };

        let equihash_override = match (config.equihash_n, config.equihash_k) {
            (Some(n), Some(k)) => Some(EquihashParams { n, k }),
            (None, None) => None,
            (Some(_), None) => return Err(ChainParamsError::missing("equihash_k")),
            (None, Some(_)) => return Err(ChainParamsError::missing("equihash_n")),
        };

        let adaptive_level = config.adaptive_pow.unwrap_or(0);
        let adaptive_pow = AdaptivePowMode::from_level(adaptive_level).ok_or_else(|| {
            ChainParamsError::invalid(
                "adaptive_pow",
                format!("unsupported adaptive mode {}", adaptive_level),
            )
        })?;

        let hf22_rotate_delta = match config.hf22_height {
            Some(_) => config
                .hf22_rotate_delta
                .ok_or_else(|| ChainParamsError::missing("hf22_rotate_delta"))?,
            None => config.hf22_rotate_delta.unwrap_or(0),
        };

        let params = Self {
            network,
            asset_chain_symbol: config
                .asset_chain_symbol
                .clone()
                .filter(|symbol| !symbol.is_empty()),
            algorithm: config.algorithm.unwrap_or(PowAlgorithm::Equihash),
            equihash_override,
            pow_limit,
            pow_limit_alternate,
            averaging_window: config
                .averaging_window
                .ok_or_else(|| ChainParamsError::missing("averaging_window"))?,
            max_adjust_down: config
                .max_adjust_down
                .ok_or_else(|| ChainParamsError::missing("max_adjust_down"))?,
            max_adjust_up: config
                .max_adjust_up
                .ok_or_else(|| ChainParamsError::missing("max_adjust_up"))?,
            target_spacing: config
                .target_spacing
                .ok_or_else(|| ChainParamsError::missing("target_spacing"))?,
            adaptive_pow,
            block_time: config.block_time.unwrap_or(DEFAULT_BLOCK_TIME),
            staked: config.staked.unwrap_or(false),
            max_future_block_time: config
                .max_future_block_time
                .ok_or_else(|| ChainParamsError::missing("max_future_block_time"))?,
            hf22_height: config.hf22_height,
            hf22_rotate_delta,
        };

        params.validate()?;
        Ok(params)
    }

    /// Reject parameter combinations the retarget arithmetic cannot handle.
    pub fn validate(&self) -> Result<(), ChainParamsError> {
        if self.averaging_window == 0 || self.averaging_window > MAX_AVERAGING_WINDOW {
            return Err(ChainParamsError::invalid(
                "averaging_window",
                format!("must be between 1 and {}", MAX_AVERAGING_WINDOW),
            ));
        }
        if self.target_spacing <= 0 {
            return Err(ChainParamsError::invalid("target_spacing", "must be positive"));
        }
        if !(0..100).contains(&self.max_adjust_up) {
            return Err(ChainParamsError::invalid("max_adjust_up", "must be in 0..100"));
        }
        if self.max_adjust_down < 0 {
            return Err(ChainParamsError::invalid("max_adjust_down", "cannot be negative"));
        }
        if self.block_time <= 0 {
            return Err(ChainParamsError::invalid("block_time", "must be positive"));
        }
        if self.max_future_block_time < 0 {
            return Err(ChainParamsError::invalid(
                "max_future_block_time",
                "cannot be negative",
            ));
        }
        if self.pow_limit.is_zero() {
            return Err(ChainParamsError::invalid("pow_limit_hex", "limit cannot be zero"));
        }
        if self.pow_limit_alternate.is_zero() {
            return Err(ChainParamsError::invalid(
                "pow_limit_alternate_hex",
                "limit cannot be zero",
            ));
        }
        if self.hf22_height.is_some() && self.hf22_rotate_delta == 0 {
            return Err(ChainParamsError::invalid(
                "hf22_rotate_delta",
                "must be positive when hf22_height is set",
            ));
        }
        Ok(())
    }

    /// `averaging_window * target_spacing`.
    pub fn averaging_window_timespan(&self) -> i64 {
        self.averaging_window as i64 * self.target_spacing
    }

    pub fn min_actual_timespan(&self) -> i64 {
        (self.averaging_window_timespan() * (100 - self.max_adjust_up)) / 100
    }

    pub fn max_actual_timespan(&self) -> i64 {
        (self.averaging_window_timespan() * (100 + self.max_adjust_down)) / 100
    }

    pub fn is_base_chain(&self) -> bool {
        self.asset_chain_symbol.is_none()
    }

    pub fn is_equihash(&self) -> bool {
        self.algorithm == PowAlgorithm::Equihash
    }

    pub fn is_regtest(&self) -> bool {
        self.network == NetworkKind::Regtest
    }

    /// The `(N, K)` pair solutions are checked with.
    pub fn equihash_params(&self) -> EquihashParams {
        self.equihash_override.unwrap_or_default()
    }

    /// Easiest target the retarget may produce.
    pub fn retarget_limit(&self) -> &U256 {
        if self.is_equihash() {
            &self.pow_limit
        } else {
            &self.pow_limit_alternate
        }
    }

    /// Easiest target a block at `height` may claim.
    pub fn validation_limit(&self, height: u32) -> &U256 {
        if height <= 1 {
            &self.pow_limit
        } else {
            self.retarget_limit()
        }
    }
}
