//! Model configuration
//!
//! [`RwkvConfig`] holds the user-facing dimensions; everything else (attention width,
//! feed-forward width, head count, state rows) is derived from it. Construction
//! validates the divisibility rules before any tensor is allocated.

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::error::{self, RwkvError};

/// Which time-mix cell every layer of the stack uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeMixVariant {
    /// Five mix targets (w, k, v, r, g), SiLU output gate, GroupNorm over heads.
    Gated,
    /// Four mix targets (r, k, v, w), no gate, LayerNorm, decay-coupled key scaling.
    Reduced,
}

/// Configuration of an RWKV stack.
#[derive(Config, Debug)]
pub struct RwkvConfig {
    /// Embedding width `E`.
    pub embedded_dim: usize,
    /// Number of blocks `L`.
    pub num_layers: usize,
    /// Head width `S`.
    #[config(default = 64)]
    pub head_size: usize,
    /// Scales the GroupNorm epsilon of the gated variant (`1e-5 * divisor^2`).
    #[config(default = 8)]
    pub head_size_divisor: usize,
    #[config(default = "TimeMixVariant::Reduced")]
    pub variant: TimeMixVariant,
    /// Bottleneck width of the mix generator, per target.
    #[config(default = 32)]
    pub mix_lora_dim: usize,
    /// Bottleneck width of the decay generator.
    #[config(default = 64)]
    pub decay_lora_dim: usize,
    /// Seed for every random draw made during construction and initialization.
    #[config(default = 42)]
    pub seed: u64,
}

impl RwkvConfig {
    /// Attention width. Always equal to the embedding width.
    pub fn dim_att(&self) -> usize {
        self.embedded_dim
    }

    /// Feed-forward width: `E * 3.5` rounded down to a multiple of 32.
    pub fn dim_ffn(&self) -> usize {
        (self.embedded_dim * 7 / 2) / 32 * 32
    }

    pub fn num_heads(&self) -> usize {
        self.dim_att() / self.head_size
    }

    /// State rows reserved per layer: channel shift, time shift, `S` accumulator rows.
    pub fn rows_per_layer(&self) -> usize {
        2 + self.head_size
    }

    pub fn state_rows(&self) -> usize {
        self.num_layers * self.rows_per_layer()
    }

    pub fn group_norm_epsilon(&self) -> f64 {
        let divisor = self.head_size_divisor as f64;
        1e-5 * divisor * divisor
    }

    /// Check every structural invariant of the configuration.
    pub fn validate(&self) -> error::Result<()> {
        if self.num_layers == 0 {
            return Err(RwkvError::invalid_config("num_layers must be at least 1"));
        }
        if self.head_size == 0 {
            return Err(RwkvError::invalid_config("head_size must be at least 1"));
        }
        if self.mix_lora_dim == 0 || self.decay_lora_dim == 0 {
            return Err(RwkvError::invalid_config(
                "low-rank generator widths must be at least 1",
            ));
        }

        for (name, value) in [
            ("embedded_dim", self.embedded_dim),
            ("dim_att", self.dim_att()),
            ("dim_ffn", self.dim_ffn()),
        ] {
            if value == 0 || value % 32 != 0 {
                return Err(RwkvError::NotMultipleOf32 { name, value });
            }
        }

        if self.dim_att() % self.head_size != 0 {
            return Err(RwkvError::HeadSizeMismatch {
                dim_att: self.dim_att(),
                head_size: self.head_size,
            });
        }

        Ok(())
    }
}
