//! # Recurrent Cells
//!
//! Single-step RWKV operators. Each cell owns the parameters of one layer, reads
//! that layer's [`LayerState`](crate::state::LayerState) by reference and returns
//! its output together with a new record. Blocks in [`crate::rnn`] chain them.
//!
//! ## Cell Types
//!
//! | Cell | Description | State fields |
//! |------|-------------|--------------|
//! | [`TimeMixGated`] | 5 targets, SiLU gate, GroupNorm | `time_shift`, `wkv` |
//! | [`TimeMixReduced`] | 4 targets, LayerNorm, decay-scaled key | `time_shift`, `wkv` |
//! | [`ChannelMix`] | squared-ReLU feed-forward with receptance gate | `channel_shift` |
//!
//! [`TimeMixer`] wraps either time-mix variant behind the [`TimeMixCell`] trait;
//! the variant is chosen once from [`RwkvConfig::variant`](crate::config::RwkvConfig).
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | `x`, output | `[batch, E]` |
//! | `time_shift`, `channel_shift` | `[batch, E]` |
//! | `wkv` | `[batch, H, S, S]` |
//!
//! ## Example: stepping one cell
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use rwkv_rnn::cells::{TimeMixCell, TimeMixer};
//! use rwkv_rnn::config::RwkvConfig;
//! use rwkv_rnn::init::ParamInitializer;
//! use rwkv_rnn::state::LayerState;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! let config = RwkvConfig::new(64, 2).with_head_size(32);
//! let mut init = ParamInitializer::new(config.seed, config.num_layers, config.embedded_dim);
//! let cell = TimeMixer::<Backend>::new(&config, 0, &mut init, &device);
//!
//! let x = Tensor::<Backend, 2>::ones([2, 64], &device);
//! let state = LayerState::zeros(&config, 2, &device);
//! let (y, next) = cell.forward(x, &state);
//!
//! assert_eq!(y.dims(), [2, 64]);
//! assert_eq!(next.wkv.dims(), [2, 2, 32, 32]);
//! ```

pub mod channel_mix;
pub mod schedule;
pub mod time_mix;
pub mod time_mix_gated;
pub mod time_mix_reduced;

pub use channel_mix::ChannelMix;
pub use time_mix::{wkv_step, DecayGenerator, MixGenerator, TimeMixCell, TimeMixer, WkvInputs};
pub use time_mix_gated::TimeMixGated;
pub use time_mix_reduced::TimeMixReduced;
