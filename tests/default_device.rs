//! Kept in its own test binary: it flips the process-wide default device.

use momentum_op::backend::{Device, default_device, set_default_device};
use momentum_op::error::Error;
use momentum_op::tensors::Tensor;
use momentum_op::{OpDesc, Operator, Scope};

fn scope() -> Scope {
    let mut scope = Scope::new();
    scope.set("p", Tensor::new(vec![3], vec![1.0f32, 2.0, 3.0]));
    scope.set("g", Tensor::new(vec![3], vec![1.0f32, 1.0, 1.0]));
    scope.set("v", Tensor::new(vec![3], vec![0.0f32; 3]));
    scope.set("lr", Tensor::scalar(0.5f32));
    scope
}

#[test]
fn test_run_uses_default_device() {
    let op = Operator::new(
        OpDesc::new("momentum")
            .input("Param", "p")
            .input("Grad", "g")
            .input("Velocity", "v")
            .input("LearningRate", "lr")
            .output("ParamOut", "p")
            .output("VelocityOut", "v")
            .attr("mu", 0.9f32),
    )
    .unwrap();

    assert_eq!(default_device(), Device::Cpu);
    let mut cpu = scope();
    op.run(&mut cpu).unwrap();
    assert_eq!(cpu.get_typed::<f32>("p").unwrap().data, vec![0.5, 1.5, 2.5]);

    set_default_device(Device::Wgpu);
    assert_eq!(default_device(), Device::Wgpu);
    let mut gpu = scope();
    let result = op.run(&mut gpu);
    set_default_device(Device::Cpu);

    if cfg!(feature = "wgpu") {
        // without an adapter the kernel reports a GPU error, never a CPU result
        if let Err(err) = result {
            assert!(!matches!(err, Error::NoKernel { .. }));
        } else {
            let p = gpu.get_typed::<f32>("p").unwrap();
            assert!((p.data[0] - 0.5).abs() < 1e-6);
        }
    } else {
        assert!(matches!(result, Err(Error::NoKernel { device: Device::Wgpu, .. })));
    }
}
