//! Working precision of the recurrence
//!
//! The decay map and the key/value accumulator lose too much in half precision, so
//! on f16/bf16 backends they are lifted to f32 and the readout is cast back.
//! f32 and f64 tensors pass through without a cast, which keeps the autodiff graph
//! of those backends intact.

use burn::tensor::backend::Backend;
use burn::tensor::{DType, FloatDType, Tensor};

/// Lift half-precision tensors to f32; wider tensors are returned as is.
pub fn at_least_f32<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, D> {
    match tensor.dtype() {
        DType::F16 | DType::BF16 => tensor.cast(FloatDType::F32),
        _ => tensor,
    }
}

/// Cast `tensor` to `dtype` unless it already has it.
pub fn cast_to<B: Backend, const D: usize>(tensor: Tensor<B, D>, dtype: DType) -> Tensor<B, D> {
    if tensor.dtype() == dtype {
        tensor
    } else {
        tensor.cast(dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_single_precision_passes_through() {
        let device = Default::default();
        let tensor = Tensor::<NdArray<f32>, 2>::ones([2, 3], &device);

        let lifted = at_least_f32(tensor);
        assert_eq!(lifted.dtype(), DType::F32);
        assert_eq!(cast_to(lifted, DType::F32).dtype(), DType::F32);
    }

    #[test]
    fn test_double_precision_is_not_narrowed() {
        let device = Default::default();
        let tensor = Tensor::<NdArray<f64>, 1>::from_floats([1e-300, 0.5], &device);

        let lifted = at_least_f32(tensor);
        assert_eq!(lifted.dtype(), DType::F64);

        let values: Vec<f64> = lifted.into_data().to_vec().unwrap();
        assert_eq!(values[0], 1e-300);
    }

    #[test]
    fn test_cast_to_changes_width() {
        let device = Default::default();
        let tensor = Tensor::<NdArray<f64>, 1>::from_floats([0.25, 0.5], &device);

        let narrowed = cast_to(tensor, DType::F32);
        assert_eq!(narrowed.dtype(), DType::F32);

        let values: Vec<f32> = narrowed.into_data().to_vec().unwrap();
        assert_eq!(values, vec![0.25, 0.5]);
    }
}
