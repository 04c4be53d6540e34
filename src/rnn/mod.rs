//! # Stack and Sequence Processing
//!
//! This module composes the cells of [`crate::cells`] into the full model.
//! **These are the primary APIs most users should use.**
//!
//! | Type | Role |
//! |------|------|
//! | [`Block`] | `ln0` (layer 0 only), `x + att(ln1(x))`, `x + ffn(ln2(x))` |
//! | [`Rwkv`] | all blocks in order, then `ln_out`; one time step per call |
//! | [`SequenceModel`] | encoder, stack and read-out over whole sequences |
//!
//! ## Quick Start
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use rwkv_rnn::prelude::*;
//!
//! type Backend = NdArray<f32>;
//! let device = Default::default();
//!
//! let model = RwkvConfig::new(64, 2)
//!     .with_head_size(32)
//!     .init::<Backend>(&device)
//!     .unwrap();
//!
//! let mut state = model.zero_state(4, &device);
//! for _ in 0..3 {
//!     let x = Tensor::<Backend, 2>::ones([4, 64], &device);
//!     let (y, next) = model.forward(x, state).unwrap();
//!     assert_eq!(y.dims(), [4, 64]);
//!     state = next;
//! }
//! ```
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape |
//! |--------|-------|
//! | step input / output | `[batch, E]` |
//! | flat state | `[batch, L * (2 + S), E]` |
//! | sequence input (batch-first, default) | `[batch, seq_len, features]` |
//! | sequence input (sequence-first) | `[seq_len, batch, features]` |
//!
//! ## Stateful Processing
//!
//! ```ignore
//! let (out1, state) = model.forward(chunk1, None)?;
//! let (out2, state) = model.forward(chunk2, Some(state))?;
//! // identical to running chunk1 ++ chunk2 in one call
//! ```

pub mod block;
pub mod sequence;
pub mod stack;

pub use block::Block;
pub use sequence::{SequenceModel, SequenceModelConfig};
pub use stack::Rwkv;
