//! # RWKV-RNN - RWKV x060 in recurrent mode (Rust)
//!
//! RWKV "x060" time mixing and channel mixing, stepped one token at a time with an
//! explicit finite-size state, on the Burn framework.
//!
//! ## Features
//!
//! - **Time mix**: low-rank data-dependent interpolation and decay, per-head
//!   decayed outer-product accumulator; gated and reduced variants
//! - **Channel mix**: squared-ReLU feed-forward with a sigmoid receptance gate
//! - **Explicit state**: per-layer records, immutable across steps, with a flat
//!   `[batch, L * (2 + S), E]` import/export form
//! - **Role-tagged initialization**: every parameter gets exactly one init rule,
//!   reproducible from a seed
//! - **Sequence driver**: encoder, stack and read-out over `[batch, seq, features]`
//! - **Precision**: decay map and accumulator run in at least f32, also on
//!   half-precision backends
//!
//! ## Quick Start
//!
//! ```rust
//! use rwkv_rnn::prelude::*;
//!
//! let config = RwkvConfig::new(64, 12);
//!
//! assert_eq!(config.dim_ffn(), 224);
//! assert_eq!(config.num_heads(), 1);
//! assert_eq!(config.state_rows(), 792);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Cell-level Usage
//!
//! For direct cell access (single layer, single step):
//!
//! ```ignore
//! use rwkv_rnn::cells::{TimeMixCell, TimeMixer};
//!
//! let cell = TimeMixer::<Backend>::new(&config, 0, &mut init, &device);
//! let (y, layer_state) = cell.forward(x, state.layer(0));
//! ```

pub mod activation;
pub mod cells;
pub mod config;
pub mod error;
pub mod init;
pub mod precision;
pub mod rnn;
pub mod state;

pub mod prelude {
    pub use crate::activation::{DoubleExpDecay, RwkvActivation, SquaredRelu};
    pub use crate::cells::{ChannelMix, TimeMixCell, TimeMixGated, TimeMixReduced, TimeMixer};
    pub use crate::config::{RwkvConfig, TimeMixVariant};
    pub use crate::error::{Result, RwkvError};
    pub use crate::init::{InitReport, ParamInitializer, ParamRole};
    pub use crate::rnn::{Block, Rwkv, SequenceModel, SequenceModelConfig};
    pub use crate::state::{LayerState, RwkvState};
}
