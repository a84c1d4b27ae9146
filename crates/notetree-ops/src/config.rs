//! Transfer engine configuration.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::verify::DEFAULT_CHUNK_SIZE;

/// Tunables for preflight and verified copying.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(default)]
pub struct TransferConfig {
    /// Read size used when hashing for verification.
    pub chunk_size: usize,

    /// File count above which the preflight report carries a warning.
    pub large_file_count: usize,

    /// Byte total above which the preflight report carries a warning.
    pub large_byte_total: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            large_file_count: 1000,
            large_byte_total: 1000 * 1024 * 1024,
        }
    }
}

impl TransferConfig {
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::default()
    }
}
