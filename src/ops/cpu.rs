//! Parallel CPU momentum kernels
//!
//! # CPU Backend
//!
//! The update is embarrassingly data-parallel: every output element depends
//! only on the input elements at the same index plus two scalars. Work is
//! split into fixed-size chunks that `rayon` spreads across its pool, and
//! each chunk runs the lane routine of its element type.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Optional AVX2 lanes for `f32` (enabled via the `simd` feature flag)
//! - Pure Rust fallback path when SIMD is disabled or unavailable
//!
//! ## Determinism
//!
//! The SIMD path multiplies, subtracts and adds exactly like the scalar path
//! (no fused multiply-add), so both produce bit-identical results and the
//! chunking never changes a value.

use rayon::prelude::*;

use crate::dtype::Element;
use crate::tensors::Tensor;

/// Elements handed to one `rayon` task.
const CHUNK: usize = 1024;

/// Element types with a momentum lane routine.
pub trait MomentumLanes: Element {
    /// Applies the update to one chunk. All slices have the same length.
    fn update(
        param: &[Self],
        grad: &[Self],
        velocity: &[Self],
        lr: Self,
        mu: Self,
        param_out: &mut [Self],
        velocity_out: &mut [Self],
    );
}

#[inline]
fn update_scalar<T: Element>(
    param: &[T],
    grad: &[T],
    velocity: &[T],
    lr: T,
    mu: T,
    param_out: &mut [T],
    velocity_out: &mut [T],
) {
    for i in 0..param.len() {
        let v = mu * velocity[i] - lr * grad[i];
        velocity_out[i] = v;
        param_out[i] = param[i] + v;
    }
}

impl MomentumLanes for f32 {
    #[cfg(not(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2")))]
    fn update(
        param: &[Self],
        grad: &[Self],
        velocity: &[Self],
        lr: Self,
        mu: Self,
        param_out: &mut [Self],
        velocity_out: &mut [Self],
    ) {
        update_scalar(param, grad, velocity, lr, mu, param_out, velocity_out);
    }

    #[cfg(all(feature = "simd", target_arch = "x86_64", target_feature = "avx2"))]
    fn update(
        param: &[Self],
        grad: &[Self],
        velocity: &[Self],
        lr: Self,
        mu: Self,
        param_out: &mut [Self],
        velocity_out: &mut [Self],
    ) {
        use core::arch::x86_64::{
            _mm256_add_ps, _mm256_loadu_ps, _mm256_mul_ps, _mm256_set1_ps, _mm256_storeu_ps,
            _mm256_sub_ps,
        };
        const LANES: usize = 8;

        let n = param.len();
        let body = n - n % LANES;

        // SAFETY: every access stays below `body <= n`, and all six slices
        // hold `n` elements.
        unsafe {
            let mu_v = _mm256_set1_ps(mu);
            let lr_v = _mm256_set1_ps(lr);
            let mut i = 0;
            while i < body {
                let p = _mm256_loadu_ps(param.as_ptr().add(i));
                let g = _mm256_loadu_ps(grad.as_ptr().add(i));
                let v = _mm256_loadu_ps(velocity.as_ptr().add(i));
                let v_new = _mm256_sub_ps(_mm256_mul_ps(mu_v, v), _mm256_mul_ps(lr_v, g));
                _mm256_storeu_ps(velocity_out.as_mut_ptr().add(i), v_new);
                _mm256_storeu_ps(param_out.as_mut_ptr().add(i), _mm256_add_ps(p, v_new));
                i += LANES;
            }
        }

        update_scalar(
            &param[body..],
            &grad[body..],
            &velocity[body..],
            lr,
            mu,
            &mut param_out[body..],
            &mut velocity_out[body..],
        );
    }
}

impl MomentumLanes for f64 {
    fn update(
        param: &[Self],
        grad: &[Self],
        velocity: &[Self],
        lr: Self,
        mu: Self,
        param_out: &mut [Self],
        velocity_out: &mut [Self],
    ) {
        update_scalar(param, grad, velocity, lr, mu, param_out, velocity_out);
    }
}

/// Computes one momentum step into fresh tensors.
///
/// # Formula
/// ```text
/// velocity_out = mu * velocity - lr * grad
/// param_out    = param + velocity_out
/// ```
///
/// # Returns
/// `(param_out, velocity_out)`, both shaped like `param`. The inputs are
/// left untouched.
///
/// # Panics
/// Panics if `grad` or `velocity` hold a different number of elements than
/// `param`; shape inference rules that out for compiled graphs.
///
/// # Example
/// ```rust
/// use momentum_op::ops::cpu::momentum;
/// use momentum_op::tensors::Tensor;
///
/// let param = Tensor::new(vec![2], vec![1.0f32, 2.0]);
/// let grad = Tensor::new(vec![2], vec![0.1f32, 0.2]);
/// let velocity = Tensor::new(vec![2], vec![0.0f32, 0.0]);
/// let (param_out, velocity_out) = momentum(&param, &grad, &velocity, 0.01, 0.9);
/// assert_eq!(param_out.shape, param.shape);
/// assert!(velocity_out.data[0] < 0.0);
/// ```
pub fn momentum<T: MomentumLanes>(
    param: &Tensor<T>,
    grad: &Tensor<T>,
    velocity: &Tensor<T>,
    lr: T,
    mu: T,
) -> (Tensor<T>, Tensor<T>) {
    let n = param.len();
    assert_eq!(n, grad.len(), "grad must match param element count");
    assert_eq!(n, velocity.len(), "velocity must match param element count");

    let mut param_out = vec![T::default(); n];
    let mut velocity_out = vec![T::default(); n];

    param_out
        .par_chunks_mut(CHUNK)
        .zip(velocity_out.par_chunks_mut(CHUNK))
        .zip(param.data.par_chunks(CHUNK))
        .zip(grad.data.par_chunks(CHUNK))
        .zip(velocity.data.par_chunks(CHUNK))
        .for_each(|((((p_out, v_out), p), g), v)| {
            T::update(p, g, v, lr, mu, p_out, v_out);
        });

    (
        Tensor {
            shape: param.shape.clone(),
            data: param_out,
        },
        Tensor {
            shape: param.shape.clone(),
            data: velocity_out,
        },
    )
}

/// Performs the momentum step in place, for callers whose outputs alias
/// `param` and `velocity`.
///
/// # Panics
/// Panics if the three tensors hold different element counts.
pub fn momentum_inplace<T: Element>(
    param: &mut Tensor<T>,
    velocity: &mut Tensor<T>,
    grad: &Tensor<T>,
    lr: T,
    mu: T,
) {
    assert_eq!(param.len(), grad.len(), "grad must match param element count");
    assert_eq!(
        param.len(),
        velocity.len(),
        "velocity must match param element count"
    );

    param
        .data
        .par_iter_mut()
        .zip(velocity.data.par_iter_mut())
        .zip(grad.data.par_iter())
        .for_each(|((p, v), &g)| {
            *v = mu * *v - lr * g;
            *p = *p + *v;
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn momentum_matches_reference_values() {
        let param = Tensor::new(vec![2], vec![1.0f32, 2.0]);
        let grad = Tensor::new(vec![2], vec![0.1f32, 0.2]);
        let velocity = Tensor::new(vec![2], vec![0.0f32, 0.0]);

        let (p_out, v_out) = momentum(&param, &grad, &velocity, 0.01, 0.9);

        let expected_v = [0.9f32 * 0.0 - 0.01 * 0.1, 0.9f32 * 0.0 - 0.01 * 0.2];
        assert_eq!(v_out.data, expected_v);
        assert_eq!(p_out.data, [1.0 + expected_v[0], 2.0 + expected_v[1]]);
        assert!((p_out.data[0] - 0.999).abs() < 1e-6);
        assert!((p_out.data[1] - 1.998).abs() < 1e-6);
    }

    #[test]
    fn chunk_boundaries_do_not_change_results() {
        // spans several chunks plus a ragged tail and a SIMD remainder
        let n = CHUNK * 3 + 13;
        let param: Vec<f32> = (0..n).map(|i| i as f32 * 0.5).collect();
        let grad: Vec<f32> = (0..n).map(|i| (i % 7) as f32 - 3.0).collect();
        let velocity: Vec<f32> = (0..n).map(|i| (i % 5) as f32 * 0.1).collect();

        let (p_out, v_out) = momentum(
            &Tensor::new(vec![n], param.clone()),
            &Tensor::new(vec![n], grad.clone()),
            &Tensor::new(vec![n], velocity.clone()),
            0.05,
            0.9,
        );

        for i in 0..n {
            let v = 0.9f32 * velocity[i] - 0.05 * grad[i];
            assert_eq!(v_out.data[i].to_bits(), v.to_bits(), "velocity at {i}");
            assert_eq!(p_out.data[i].to_bits(), (param[i] + v).to_bits(), "param at {i}");
        }
    }

    #[test]
    fn inplace_agrees_with_fresh_outputs() {
        let param = Tensor::new(vec![2, 2], vec![1.0f64, -2.0, 3.0, 0.5]);
        let grad = Tensor::new(vec![2, 2], vec![0.3f64, 0.1, -0.2, 1.0]);
        let velocity = Tensor::new(vec![2, 2], vec![0.1f64, 0.0, -0.1, 0.2]);

        let (p_out, v_out) = momentum(&param, &grad, &velocity, 0.1, 0.5);

        let mut p = param.clone();
        let mut v = velocity.clone();
        momentum_inplace(&mut p, &mut v, &grad, 0.1, 0.5);

        assert_eq!(p, p_out);
        assert_eq!(v, v_out);
    }

    #[test]
    fn empty_tensors_produce_empty_outputs() {
        let empty = Tensor::<f32>::new(vec![0, 3], vec![]);
        let (p_out, v_out) = momentum(&empty, &empty, &empty, 0.1, 0.9);
        assert!(p_out.is_empty() && v_out.is_empty());
        assert_eq!(p_out.shape.dims(), &[0, 3]);
    }
}
