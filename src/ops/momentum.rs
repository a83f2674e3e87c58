//! The `momentum` operator.
//!
//! Applies one step of the momentum update rule to a parameter, given its
//! gradient, its running velocity and a learning rate:
//!
//! ```text
//! velocity_out = mu * velocity - learning_rate * grad
//! param_out    = param + velocity_out
//! ```
//!
//! The operator is an update rule applied after gradients are computed, so
//! no gradient operator is registered for it.

use tracing::trace;

use crate::backend::Device;
use crate::error::{Error, Result};
use crate::infer::InferShapeContext;
use crate::kernel::{ExecutionContext, KernelKey};
use crate::registry::OpRegistryBuilder;
use crate::schema::{AttrType, OpSchema};

use super::cpu::{self, MomentumLanes};

/// Registered operator name.
pub const OP_TYPE: &str = "momentum";

pub const PARAM: &str = "Param";
pub const GRAD: &str = "Grad";
pub const VELOCITY: &str = "Velocity";
pub const LEARNING_RATE: &str = "LearningRate";
pub const PARAM_OUT: &str = "ParamOut";
pub const VELOCITY_OUT: &str = "VelocityOut";
pub const MU: &str = "mu";

/// Input slots, in the order shape inference checks them.
pub const INPUTS: [&str; 4] = [PARAM, GRAD, VELOCITY, LEARNING_RATE];
/// Output slots, in the order shape inference checks them.
pub const OUTPUTS: [&str; 2] = [PARAM_OUT, VELOCITY_OUT];

const DOC: &str = "\
Momentum Algorithm (momentum).

velocity_out = mu * velocity - learning_rate * grad
param_out = param + velocity_out

Ref: Sutskever, Ilya, et al. \"On the importance of initialization
     and momentum in deep learning.\" ICML 2013;
     http://jmlr.org/proceedings/papers/v28/sutskever13.pdf
";

/// The operator's schema: four inputs, two outputs and a required float
/// attribute `mu` without default.
pub fn schema() -> OpSchema {
    OpSchema::builder(OP_TYPE)
        .input(PARAM, "Input parameter")
        .input(GRAD, "Input gradient")
        .input(VELOCITY, "Input velocity")
        .input(LEARNING_RATE, "Input learning rate")
        .output(PARAM_OUT, "Output parameter")
        .output(VELOCITY_OUT, "Output velocity")
        .attr(MU, AttrType::Float, "Momentum coefficient")
        .doc(DOC)
        .differentiable(false)
        .build()
}

/// Shape inference.
///
/// Checks, stopping at the first failure: every input and output slot is
/// bound, `Grad` and `Velocity` have exactly `Param`'s shape, and
/// `LearningRate` holds a single element. On success both outputs get
/// `Param`'s shape.
///
/// # Errors
/// [`Error::MissingInput`], [`Error::MissingOutput`],
/// [`Error::ShapeMismatch`] or [`Error::NotScalar`], naming the slot.
pub fn infer_shape(ctx: &mut dyn InferShapeContext) -> Result<()> {
    let op = ctx.op_type().to_owned();

    if let Some(slot) = INPUTS.into_iter().find(|s| !ctx.has_input(s)) {
        return Err(Error::MissingInput {
            op,
            slot: slot.to_owned(),
        });
    }
    if let Some(slot) = OUTPUTS.into_iter().find(|s| !ctx.has_output(s)) {
        return Err(Error::MissingOutput {
            op,
            slot: slot.to_owned(),
        });
    }

    let param_dim = ctx.input_dim(PARAM)?;
    for slot in [GRAD, VELOCITY] {
        let dim = ctx.input_dim(slot)?;
        if dim != param_dim {
            return Err(Error::ShapeMismatch {
                op,
                reference: PARAM.to_owned(),
                slot: slot.to_owned(),
                expected: param_dim,
                got: dim,
            });
        }
    }

    let lr_dim = ctx.input_dim(LEARNING_RATE)?;
    if !lr_dim.is_scalar_like() {
        return Err(Error::NotScalar {
            op,
            slot: LEARNING_RATE.to_owned(),
            shape: lr_dim,
        });
    }

    ctx.set_output_dim(PARAM_OUT, param_dim.clone())?;
    ctx.set_output_dim(VELOCITY_OUT, param_dim)?;
    Ok(())
}

/// CPU kernel, instantiated once per element type.
fn cpu_kernel<T: MomentumLanes>(ctx: &mut ExecutionContext<'_>) -> Result<()> {
    let param = ctx.input::<T>(PARAM)?;
    let grad = ctx.input::<T>(GRAD)?;
    let velocity = ctx.input::<T>(VELOCITY)?;
    let lr_tensor = ctx.input::<T>(LEARNING_RATE)?;
    let lr = lr_tensor.item().ok_or_else(|| Error::NotScalar {
        op: ctx.op_type().to_owned(),
        slot: LEARNING_RATE.to_owned(),
        shape: lr_tensor.shape.clone(),
    })?;
    let mu = T::from_f32(ctx.attr_f32(MU)?);

    trace!(key = %ctx.key(), elements = param.len(), "momentum step");
    let (param_out, velocity_out) = cpu::momentum(param, grad, velocity, lr, mu);

    ctx.set_output(PARAM_OUT, param_out);
    ctx.set_output(VELOCITY_OUT, velocity_out);
    Ok(())
}

/// Registers the operator and its kernels.
///
/// # Errors
/// Propagates duplicate registrations from `builder`.
pub fn register(builder: &mut OpRegistryBuilder) -> Result<()> {
    builder.register_op(schema(), infer_shape)?;
    builder.register_kernel(OP_TYPE, KernelKey::of::<f32>(Device::Cpu), cpu_kernel::<f32>)?;
    builder.register_kernel(OP_TYPE, KernelKey::of::<f64>(Device::Cpu), cpu_kernel::<f64>)?;
    #[cfg(feature = "wgpu")]
    builder.register_kernel(
        OP_TYPE,
        KernelKey::of::<f32>(Device::Wgpu),
        super::wgpu::momentum_kernel,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infer::{BlockShapes, OpShapeContext};
    use crate::operator::OpDesc;
    use crate::schema::Attributes;
    use crate::shape::Shape;
    use crate::tensors::{AnyTensor, Tensor};

    fn full_desc() -> OpDesc {
        OpDesc::new(OP_TYPE)
            .input(PARAM, "p")
            .input(GRAD, "g")
            .input(VELOCITY, "v")
            .input(LEARNING_RATE, "lr")
            .output(PARAM_OUT, "p_out")
            .output(VELOCITY_OUT, "v_out")
    }

    fn shapes(param: &[usize], grad: &[usize], velocity: &[usize], lr: &[usize]) -> BlockShapes {
        BlockShapes::new()
            .with("p", param)
            .with("g", grad)
            .with("v", velocity)
            .with("lr", lr)
    }

    fn infer(desc: &OpDesc, shapes: &mut BlockShapes) -> Result<()> {
        infer_shape(&mut OpShapeContext::new(desc, shapes))
    }

    #[test]
    fn schema_declares_required_mu_and_no_gradient() {
        let schema = schema();
        assert_eq!(schema.name, "momentum");
        let mu = schema.attr(MU).unwrap();
        assert_eq!(mu.ty, AttrType::Float);
        assert!(mu.is_required());
        assert!(!schema.differentiable);
        assert!(schema.doc.contains("velocity_out = mu * velocity - learning_rate * grad"));
        assert!(schema.doc.contains("Sutskever"));
    }

    #[test]
    fn infer_sets_both_outputs_to_param_shape() {
        let desc = full_desc();
        let mut block = shapes(&[3, 4], &[3, 4], &[3, 4], &[1]);
        infer(&desc, &mut block).unwrap();
        assert_eq!(block.get("p_out"), Some(&Shape::from([3, 4])));
        assert_eq!(block.get("v_out"), Some(&Shape::from([3, 4])));
    }

    #[test]
    fn infer_rejects_rank_difference() {
        let desc = full_desc();
        let mut block = shapes(&[3], &[3, 1], &[3], &[]);
        let err = infer(&desc, &mut block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
        assert_eq!(err.culprit(), Some(GRAD));
        assert!(block.get("p_out").is_none());
    }

    #[test]
    fn infer_checks_grad_before_velocity() {
        let desc = full_desc();
        let mut block = shapes(&[2], &[3], &[4], &[1]);
        let err = infer(&desc, &mut block).unwrap_err();
        assert_eq!(err.culprit(), Some(GRAD));
    }

    #[test]
    fn infer_rejects_empty_learning_rate() {
        let desc = full_desc();
        let mut block = shapes(&[2], &[2], &[2], &[0]);
        let err = infer(&desc, &mut block).unwrap_err();
        assert!(matches!(err, Error::NotScalar { ref slot, .. } if slot == LEARNING_RATE));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn infer_rejects_overflowing_learning_rate() {
        let desc = full_desc();
        let mut block = shapes(&[3], &[3], &[3], &[1 << 33, 1 << 33]);
        let err = infer(&desc, &mut block).unwrap_err();
        assert!(matches!(err, Error::NotScalar { ref slot, .. } if slot == LEARNING_RATE));

        let mut block = shapes(&[3], &[3], &[3], &[3, 0xAAAA_AAAA_AAAA_AAAB]);
        let err = infer(&desc, &mut block).unwrap_err();
        assert_eq!(err.culprit(), Some(LEARNING_RATE));
        assert!(block.get("p_out").is_none());
    }

    #[test]
    fn kernel_rejects_non_scalar_learning_rate() {
        let attrs = Attributes::new().with(MU, 0.9f32);
        let p = AnyTensor::from(Tensor::new(vec![2], vec![1.0f32, 2.0]));
        let lr = AnyTensor::from(Tensor::new(vec![2], vec![0.1f32, 0.1]));
        let mut ctx = ExecutionContext::new(OP_TYPE, KernelKey::of::<f32>(Device::Cpu), &attrs)
            .with_input(PARAM, &p)
            .with_input(GRAD, &p)
            .with_input(VELOCITY, &p)
            .with_input(LEARNING_RATE, &lr);
        assert!(matches!(
            cpu_kernel::<f32>(&mut ctx),
            Err(Error::NotScalar { .. })
        ));
    }

    #[test]
    fn f64_kernel_computes_in_f64() {
        let attrs = Attributes::new().with(MU, 0.5f32);
        let p = AnyTensor::from(Tensor::new(vec![2], vec![1.0f64, 2.0]));
        let g = AnyTensor::from(Tensor::new(vec![2], vec![0.1f64, 0.2]));
        let v = AnyTensor::from(Tensor::new(vec![2], vec![1.0f64, -1.0]));
        let lr = AnyTensor::from(Tensor::scalar(0.01f64));
        let mut ctx = ExecutionContext::new(OP_TYPE, KernelKey::of::<f64>(Device::Cpu), &attrs)
            .with_input(PARAM, &p)
            .with_input(GRAD, &g)
            .with_input(VELOCITY, &v)
            .with_input(LEARNING_RATE, &lr);
        cpu_kernel::<f64>(&mut ctx).unwrap();

        let v_out = ctx.output(VELOCITY_OUT).and_then(AnyTensor::as_typed::<f64>).unwrap();
        assert_eq!(v_out.data, vec![0.5 - 0.01 * 0.1, -0.5 - 0.01 * 0.2]);
    }

    #[test]
    fn f64_kernel_uses_f32_rounded_mu() {
        let attrs = Attributes::new().with(MU, 0.9f32);
        let p = AnyTensor::from(Tensor::new(vec![1], vec![0.0f64]));
        let g = AnyTensor::from(Tensor::new(vec![1], vec![0.0f64]));
        let v = AnyTensor::from(Tensor::new(vec![1], vec![1.0f64]));
        let lr = AnyTensor::from(Tensor::scalar(0.0f64));
        let mut ctx = ExecutionContext::new(OP_TYPE, KernelKey::of::<f64>(Device::Cpu), &attrs)
            .with_input(PARAM, &p)
            .with_input(GRAD, &g)
            .with_input(VELOCITY, &v)
            .with_input(LEARNING_RATE, &lr);
        cpu_kernel::<f64>(&mut ctx).unwrap();

        let v_out = ctx.output(VELOCITY_OUT).and_then(AnyTensor::as_typed::<f64>).unwrap();
        assert_eq!(v_out.data, vec![f64::from(0.9f32)]);
        assert_eq!(v_out.data[0], 0.8999999761581421);
        assert_ne!(v_out.data[0], 0.9);
    }
}
