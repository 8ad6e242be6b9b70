//! Run configuration: relaxation strategy and tile width

use crate::error::{ApspError, ApspResult};
use std::fmt;
use std::str::FromStr;

/// Default tile width `B` (32 × 32 = 1024 threads per block)
pub const DEFAULT_BLOCK_SIZE: u32 = 32;

/// Relaxation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// One full-matrix step per pivot vertex
    Naive,
    /// Tiled three-phase relaxation using block-local memory
    #[default]
    Blocked,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Naive => f.write_str("naive"),
            Self::Blocked => f.write_str("blocked"),
        }
    }
}

impl FromStr for Strategy {
    type Err = ApspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "blocked" => Ok(Self::Blocked),
            other => Err(ApspError::InvalidConfig(format!(
                "unknown strategy '{other}' (expected 'naive' or 'blocked')"
            ))),
        }
    }
}

/// Configuration of one APSP run
///
/// # Example
///
/// ```
/// use trueno_apsp::{ApspConfig, Strategy};
///
/// let config = ApspConfig::naive().with_block_size(16);
/// assert_eq!(config.strategy, Strategy::Naive);
/// assert!(config.validate().is_ok());
///
/// assert!(ApspConfig::blocked().with_block_size(24).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApspConfig {
    /// Relaxation strategy
    pub strategy: Strategy,

    /// Tile width `B`; each block holds `B × B` threads
    pub block_size: u32,
}

impl Default for ApspConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ApspConfig {
    /// Naive strategy with the default block size
    #[must_use]
    pub fn naive() -> Self {
        Self::default().with_strategy(Strategy::Naive)
    }

    /// Blocked strategy with the default block size
    #[must_use]
    pub fn blocked() -> Self {
        Self::default().with_strategy(Strategy::Blocked)
    }

    /// Replace the strategy
    #[must_use]
    pub const fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the block size
    #[must_use]
    pub const fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Threads in one block (`B²`)
    #[must_use]
    pub const fn threads_per_block(&self) -> u64 {
        self.block_size as u64 * self.block_size as u64
    }

    /// Check the configuration independently of any accelerator
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the block size is zero or not a power of two
    pub fn validate(&self) -> ApspResult<()> {
        if !self.block_size.is_power_of_two() {
            return Err(ApspError::InvalidConfig(format!(
                "block size must be a non-zero power of two, got {}",
                self.block_size
            )));
        }
        Ok(())
    }
}
