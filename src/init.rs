//! Parameter initialization
//!
//! Every learnable tensor is tagged with a [`ParamRole`] where it is created. After
//! construction the whole stack is walked once and each tensor is rewritten
//! according to its role. Because a tensor carries exactly one role, a special case
//! (zeroed output projections, the embedding, the head) can never be overwritten by
//! a generic rule further down.
//!
//! The initializer counts the elements it touches and the stack compares that count
//! with [`burn::module::Module::num_params`]; a parameter that somebody forgot to
//! tag therefore fails initialization instead of silently keeping its default.
//!
//! All random draws come from one seeded [`StdRng`] on the host, so a given seed
//! reproduces the same parameters on any backend.

use burn::module::Param;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use log::trace;
use ndarray::Array2;
use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::error::{Result, RwkvError};

/// Initialization rule attached to a parameter when it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamRole {
    /// Normalizations, mixing biases, decay, bonus and low-rank generators.
    /// Keep the constructor-time value.
    Preserved,
    /// Scale of a time-mix output normalization: `((layer + 1) / num_layers)^0.7`.
    OutputNormScale,
    /// Input embedding table: uniform in `±1e-4`.
    Embedding,
    /// Read-out projection: orthogonal, gain `0.5 * sqrt(vocab / E)` when vocab > E.
    Head,
    /// Projections that start as no-ops: all zeros.
    ZeroProjection,
    /// Time-mix key and gate: orthogonal with gain 0.1.
    LowGainProjection,
    /// Any other weight matrix: orthogonal with gain 1.
    Orthogonal,
}

impl ParamRole {
    /// Classify a torch-style parameter name (`blocks.3.att.key.weight`, `head.weight`,
    /// ...) the way RWKV checkpoints name their tensors.
    ///
    /// The rules are checked in order; a name that reaches the generic bucket without
    /// ending in `.weight` is rejected.
    pub fn classify(name: &str) -> Result<Self> {
        if name.contains("ln_")
            || name.contains(".ln")
            || name.contains("time_")
            || ["_w", "_w1", "_w2", "_bias"]
                .iter()
                .any(|suffix| name.ends_with(suffix))
        {
            return Ok(if name.contains("ln_x.weight") {
                Self::OutputNormScale
            } else {
                Self::Preserved
            });
        }

        if name == "emb.weight" {
            return Ok(Self::Embedding);
        }
        if name == "head.weight" {
            return Ok(Self::Head);
        }
        // Collaborator layers outside the stack keep their framework defaults.
        if name.starts_with("encoder.") || name == "head.bias" {
            return Ok(Self::Preserved);
        }

        if !name.ends_with(".weight") {
            return Err(RwkvError::UnclassifiedParameter(name.to_string()));
        }

        if [".att.output.", ".ffn.value.", ".ffn.receptance."]
            .iter()
            .any(|part| name.contains(part))
        {
            Ok(Self::ZeroProjection)
        } else if [".att.key.", ".att.gate."]
            .iter()
            .any(|part| name.contains(part))
        {
            Ok(Self::LowGainProjection)
        } else {
            Ok(Self::Orthogonal)
        }
    }

    fn needs_matrix(self) -> bool {
        matches!(
            self,
            Self::Head | Self::ZeroProjection | Self::LowGainProjection | Self::Orthogonal
        )
    }
}

/// One line of the initialization log.
#[derive(Debug, Clone, PartialEq)]
pub struct InitRecord {
    pub name: String,
    pub role: ParamRole,
    pub dims: Vec<usize>,
}

impl InitRecord {
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Everything the initializer wrote, in visiting order.
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub records: Vec<InitRecord>,
}

impl InitReport {
    pub fn num_elements(&self) -> usize {
        self.records.iter().map(InitRecord::num_elements).sum()
    }

    pub fn find(&self, name: &str) -> Option<&InitRecord> {
        self.records.iter().find(|record| record.name == name)
    }
}

/// Rewrites parameters in place according to their [`ParamRole`].
pub struct ParamInitializer {
    rng: StdRng,
    num_layers: usize,
    embedded_dim: usize,
    vocab_size: usize,
    report: InitReport,
}

impl ParamInitializer {
    pub fn new(seed: u64, num_layers: usize, embedded_dim: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            num_layers,
            embedded_dim,
            vocab_size: 0,
            report: InitReport::default(),
        }
    }

    /// Output width of the read-out head, used for its gain.
    pub fn with_vocab_size(mut self, vocab_size: usize) -> Self {
        self.vocab_size = vocab_size;
        self
    }

    pub fn report(&self) -> &InitReport {
        &self.report
    }

    pub fn into_report(self) -> InitReport {
        self.report
    }

    /// Elements visited so far, across every role.
    pub fn visited_elements(&self) -> usize {
        self.report.num_elements()
    }

    /// Gain of the orthogonal roles, `None` for roles that are not orthogonal draws.
    pub fn gain(&self, role: ParamRole) -> Option<f64> {
        match role {
            ParamRole::Head => Some(if self.vocab_size > self.embedded_dim {
                0.5 * (self.vocab_size as f64 / self.embedded_dim as f64).sqrt()
            } else {
                0.5
            }),
            ParamRole::LowGainProjection => Some(0.1),
            ParamRole::Orthogonal => Some(1.0),
            ParamRole::Preserved
            | ParamRole::OutputNormScale
            | ParamRole::Embedding
            | ParamRole::ZeroProjection => None,
        }
    }

    /// Apply `role` to `param`.
    ///
    /// `layer` is the owning block (prefixes the name with `blocks.{layer}.` and feeds
    /// [`ParamRole::OutputNormScale`]); `None` for stack-level parameters.
    pub fn apply<B: Backend, const D: usize>(
        &mut self,
        layer: Option<usize>,
        name: &str,
        param: &mut Param<Tensor<B, D>>,
        role: ParamRole,
    ) -> Result<()> {
        let name = match layer {
            Some(layer_id) => format!("blocks.{layer_id}.{name}"),
            None => name.to_string(),
        };
        let dims: [usize; D] = param.dims();

        if role.needs_matrix() && D != 2 {
            return Err(RwkvError::RoleShapeMismatch {
                name,
                dims: dims.to_vec(),
                role,
            });
        }

        let device = param.device();
        let replacement: Option<Tensor<B, D>> = match role {
            ParamRole::Preserved => None,
            ParamRole::OutputNormScale => {
                let Some(layer_id) = layer else {
                    return Err(RwkvError::RoleShapeMismatch {
                        name,
                        dims: dims.to_vec(),
                        role,
                    });
                };
                let scale = ((layer_id + 1) as f64 / self.num_layers as f64).powf(0.7);
                Some(Tensor::ones(dims, &device).mul_scalar(scale))
            }
            ParamRole::Embedding => Some(host_uniform(&mut self.rng, dims, -1e-4, 1e-4, &device)),
            ParamRole::ZeroProjection => Some(Tensor::zeros(dims, &device)),
            ParamRole::Head | ParamRole::LowGainProjection | ParamRole::Orthogonal => {
                let gain = self.gain(role).unwrap_or(1.0);
                let values = orthogonal_values(&mut self.rng, dims[0], dims[1], gain);
                Some(Tensor::<B, 1>::from_floats(values.as_slice(), &device).reshape(dims))
            }
        };

        trace!(
            "{:<24} {:<60} [{:?}]",
            format!("{:?}", dims),
            name,
            role
        );

        if let Some(tensor) = replacement {
            *param = Param::from_tensor(tensor);
        }

        self.report.records.push(InitRecord {
            name,
            role,
            dims: dims.to_vec(),
        });

        Ok(())
    }

    /// Uniform draw from this initializer's stream; used for constructor-time values
    /// so construction and initialization share one seed.
    pub fn uniform<B: Backend, const D: usize>(
        &mut self,
        dims: [usize; D],
        low: f64,
        high: f64,
        device: &B::Device,
    ) -> Tensor<B, D> {
        host_uniform(&mut self.rng, dims, low, high, device)
    }
}

fn host_uniform<B: Backend, const D: usize>(
    rng: &mut StdRng,
    dims: [usize; D],
    low: f64,
    high: f64,
    device: &B::Device,
) -> Tensor<B, D> {
    let count: usize = dims.iter().product();
    let values: Vec<f32> = (0..count)
        .map(|_| rng.gen_range(low..high) as f32)
        .collect();

    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape(dims)
}

/// Row-major values of a `rows x cols` (semi-)orthogonal matrix scaled by `gain`.
///
/// Gaussian draw followed by modified Gram-Schmidt on the taller orientation. The
/// resulting `R` has a positive diagonal, which is the sign convention that makes
/// the QR factor unique.
pub fn orthogonal_values(rng: &mut StdRng, rows: usize, cols: usize, gain: f64) -> Vec<f32> {
    let transposed = rows < cols;
    let (m, n) = if transposed { (cols, rows) } else { (rows, cols) };

    let mut q = Array2::<f64>::from_shape_fn((m, n), |_| rng.sample(StandardNormal));

    for j in 0..n {
        for k in 0..j {
            let projection = q.column(k).dot(&q.column(j));
            let basis = q.column(k).to_owned();
            q.column_mut(j).scaled_add(-projection, &basis);
        }
        let norm = q.column(j).dot(&q.column(j)).sqrt() + 1e-12;
        q.column_mut(j).mapv_inplace(|value| value / norm);
    }

    let q = if transposed { q.reversed_axes() } else { q };

    q.iter().map(|&value| (value * gain) as f32).collect()
}
