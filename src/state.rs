//! Recurrent state
//!
//! The state of an `L`-layer stack is an ordered list of [`LayerState`] records,
//! one per block. Each cell reads its own record and returns fresh tensors; the
//! previous [`RwkvState`] is never written to, so a caller holding an older state
//! keeps valid values.
//!
//! ## Flat layout
//!
//! The flat form is a single `[batch, L * (2 + S), E]` tensor. For layer `i` with
//! base row `(2 + S) * i`:
//!
//! | Rows | Content |
//! |------|---------|
//! | `base` | channel-mix shift memory |
//! | `base + 1` | time-mix shift memory |
//! | `base + 2 .. base + 2 + S` | accumulator `[H, S, S]`, head-major, viewed as `[S, H * S]` |
//!
//! The accumulator record is held in at least f32; the flat form shares one dtype
//! with the shift rows.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::RwkvConfig;
use crate::error::{Result, RwkvError};
use crate::precision::{at_least_f32, cast_to};

/// State owned by one block.
#[derive(Debug, Clone)]
pub struct LayerState<B: Backend> {
    /// Last normalized input seen by the channel mixer, `[batch, E]`.
    pub channel_shift: Tensor<B, 2>,
    /// Last normalized input seen by the time mixer, `[batch, E]`.
    pub time_shift: Tensor<B, 2>,
    /// Per-head key/value accumulator, `[batch, H, S, S]`.
    pub wkv: Tensor<B, 4>,
}

impl<B: Backend> LayerState<B> {
    pub fn zeros(config: &RwkvConfig, batch_size: usize, device: &B::Device) -> Self {
        let e = config.embedded_dim;
        let (h, s) = (config.num_heads(), config.head_size);

        Self {
            channel_shift: Tensor::zeros([batch_size, e], device),
            time_shift: Tensor::zeros([batch_size, e], device),
            wkv: at_least_f32(Tensor::zeros([batch_size, h, s, s], device)),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.time_shift.dims()[0]
    }

    pub fn validate(&self, config: &RwkvConfig, batch_size: usize) -> Result<()> {
        let e = config.embedded_dim;
        let (h, s) = (config.num_heads(), config.head_size);

        check_dims("channel shift", [batch_size, e], self.channel_shift.dims())?;
        check_dims("time shift", [batch_size, e], self.time_shift.dims())?;
        check_dims("accumulator", [batch_size, h, s, s], self.wkv.dims())
    }
}

/// State of a whole stack, one record per layer in layer order.
#[derive(Debug, Clone)]
pub struct RwkvState<B: Backend> {
    layers: Vec<LayerState<B>>,
}

impl<B: Backend> RwkvState<B> {
    /// The all-zero initial state.
    pub fn zeros(config: &RwkvConfig, batch_size: usize, device: &B::Device) -> Self {
        let layers = (0..config.num_layers)
            .map(|_| LayerState::zeros(config, batch_size, device))
            .collect();

        Self { layers }
    }

    pub fn from_layers(layers: Vec<LayerState<B>>) -> Self {
        Self { layers }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn batch_size(&self) -> usize {
        self.layers.first().map_or(0, LayerState::batch_size)
    }

    /// Record of `layer_id`.
    ///
    /// # Panics
    ///
    /// If the state holds `layer_id` layers or fewer; see [`RwkvState::try_layer`].
    pub fn layer(&self, layer_id: usize) -> &LayerState<B> {
        &self.layers[layer_id]
    }

    /// Record of `layer_id`, or [`RwkvError::ShapeMismatch`] if the state is too short.
    pub fn try_layer(&self, layer_id: usize) -> Result<&LayerState<B>> {
        self.layers.get(layer_id).ok_or_else(|| {
            RwkvError::shape_mismatch("state layers", [layer_id + 1], [self.layers.len()])
        })
    }

    pub fn layers(&self) -> &[LayerState<B>] {
        &self.layers
    }

    /// Swap in a new record for `layer_id`, leaving every other layer untouched.
    ///
    /// # Panics
    ///
    /// If `layer_id` is out of range.
    pub fn replace_layer(mut self, layer_id: usize, layer: LayerState<B>) -> Self {
        self.layers[layer_id] = layer;
        self
    }

    /// Check layer count and every tensor shape against `config` and `batch_size`.
    pub fn validate(&self, config: &RwkvConfig, batch_size: usize) -> Result<()> {
        if self.layers.len() != config.num_layers {
            return Err(RwkvError::shape_mismatch(
                "state layers",
                [config.num_layers],
                [self.layers.len()],
            ));
        }

        self.layers
            .iter()
            .try_for_each(|layer| layer.validate(config, batch_size))
    }

    /// Pack into the flat `[batch, L * (2 + S), E]` tensor.
    pub fn to_flat(&self) -> Tensor<B, 3> {
        let mut rows = Vec::with_capacity(self.layers.len() * 3);

        for layer in &self.layers {
            let [batch, e] = layer.time_shift.dims();
            let [_, _, s, _] = layer.wkv.dims();

            rows.push(layer.channel_shift.clone().unsqueeze_dim::<3>(1));
            rows.push(layer.time_shift.clone().unsqueeze_dim::<3>(1));
            rows.push(cast_to(
                layer.wkv.clone().reshape([batch, s, e]),
                layer.time_shift.dtype(),
            ));
        }

        Tensor::cat(rows, 1)
    }

    /// Unpack a flat `[batch, L * (2 + S), E]` tensor.
    pub fn from_flat(flat: Tensor<B, 3>, config: &RwkvConfig) -> Result<Self> {
        let [batch, rows, e] = flat.dims();
        check_dims(
            "flat state",
            [batch, config.state_rows(), config.embedded_dim],
            [batch, rows, e],
        )?;

        let (h, s) = (config.num_heads(), config.head_size);
        let per_layer = config.rows_per_layer();

        let layers = (0..config.num_layers)
            .map(|layer_id| {
                let base = layer_id * per_layer;
                let row = |index: usize| {
                    flat.clone()
                        .slice([0..batch, index..index + 1, 0..e])
                        .reshape([batch, e])
                };

                LayerState {
                    channel_shift: row(base),
                    time_shift: row(base + 1),
                    wkv: at_least_f32(
                        flat.clone()
                            .slice([0..batch, base + 2..base + per_layer, 0..e])
                            .reshape([batch, h, s, s]),
                    ),
                }
            })
            .collect();

        Ok(Self { layers })
    }
}

fn check_dims<const D: usize>(
    what: &'static str,
    expected: [usize; D],
    actual: [usize; D],
) -> Result<()> {
    if expected != actual {
        return Err(RwkvError::shape_mismatch(what, expected, actual));
    }
    Ok(())
}
