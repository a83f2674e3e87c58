//! GPU momentum kernel using WGPU.
//!
//! This module runs the momentum update as a WGSL compute shader. The GPU
//! context and the compute pipeline are created once, on first use, via
//! `lazy_static`. When no adapter or device can be acquired the kernel
//! reports [`Error::Gpu`] instead of panicking; it never falls back to the
//! CPU on its own, so a caller asking for `Device::Wgpu` always knows which
//! device did the work.
//!
//! Only `f32` tensors are supported, matching WGSL's native float type.

use tracing::{trace, warn};
use wgpu::util::DeviceExt;

use super::momentum::{GRAD, LEARNING_RATE, MU, PARAM, PARAM_OUT, VELOCITY, VELOCITY_OUT};
use crate::dtype::DataType;
use crate::error::{Error, Result};
use crate::kernel::ExecutionContext;
use crate::tensors::Tensor;

const MOMENTUM: &str = include_str!("shaders/momentum.wgsl");

const WORKGROUP_SIZE: u32 = 64;
const MAX_GROUPS_PER_DIM: u32 = 65_535;

/// Basic wrapper for common GPU errors.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    /// An error in requesting the adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    /// An error in requesting the device.
    #[error("device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    /// Waiting for submitted work failed.
    #[error("poll error: {0}")]
    Poll(#[from] wgpu::PollError),
    /// Mapping the readback buffer failed.
    #[error("buffer map error: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    /// No GPU context could be created in this process.
    #[error("no GPU context is available")]
    Unavailable,
    /// The tensor is larger than one dispatch can address.
    #[error("{0} elements exceed the dispatch limit")]
    TooLarge(usize),
}

impl From<GpuError> for Error {
    fn from(err: GpuError) -> Self {
        Self::Gpu(err.to_string())
    }
}

/// Holds the WGPU device, queue and the momentum pipeline.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// A queue for information related to the device.
    pub queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuContext {
    /// Selects the default adapter, creates a device + queue and compiles
    /// the momentum pipeline.
    ///
    /// # Errors
    ///
    /// `GpuError::Adapter` or `GpuError::Device` if acquisition fails.
    pub fn new() -> core::result::Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("momentum"),
            source: wgpu::ShaderSource::Wgsl(MOMENTUM.into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("momentum_bgl"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("momentum_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("momentum_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        Ok(Self {
            device,
            queue,
            layout,
            pipeline,
        })
    }
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Option<GpuContext> = GpuContext::new()
        .inspect_err(|err| warn!(%err, "GPU context unavailable"))
        .ok();
}

fn to_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(DataType::F32.size_in_bytes())
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Splits `n` invocations into a 2D grid of workgroups.
///
/// Returns `(groups_x, groups_y, row_stride)`.
fn dispatch_grid(n: usize) -> core::result::Result<(u32, u32, u32), GpuError> {
    let groups = u32::try_from(n.div_ceil(WORKGROUP_SIZE as usize))
        .map_err(|_| GpuError::TooLarge(n))?;
    let groups_x = groups.min(MAX_GROUPS_PER_DIM);
    let groups_y = groups.div_ceil(groups_x.max(1));
    if groups_y > MAX_GROUPS_PER_DIM {
        return Err(GpuError::TooLarge(n));
    }
    Ok((groups_x, groups_y, groups_x * WORKGROUP_SIZE))
}

fn readback(
    ctx: &GpuContext,
    buffer: &wgpu::Buffer,
) -> core::result::Result<Vec<f32>, GpuError> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |res| {
        let _ = tx.send(res);
    });
    ctx.device.poll(wgpu::PollType::Wait)?;
    rx.recv().map_err(|_| GpuError::Unavailable)??;

    let view = slice.get_mapped_range();
    let data = from_bytes(&view);
    drop(view);
    buffer.unmap();
    Ok(data)
}

/// Runs one momentum step on the GPU, returning `(param_out, velocity_out)`.
fn run_momentum_shader(
    param: &[f32],
    grad: &[f32],
    velocity: &[f32],
    lr: f32,
    mu: f32,
) -> core::result::Result<(Vec<f32>, Vec<f32>), GpuError> {
    let n = param.len();
    if n == 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let ctx = GPU_CONTEXT.as_ref().ok_or(GpuError::Unavailable)?;
    let device = &ctx.device;
    let (groups_x, groups_y, row_stride) = dispatch_grid(n)?;
    let len = u32::try_from(n).map_err(|_| GpuError::TooLarge(n))?;

    let input = |label, data: &[f32]| {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &to_bytes(data),
            usage: wgpu::BufferUsages::STORAGE,
        })
    };
    let param_buf = input("param", param);
    let grad_buf = input("grad", grad);
    let velocity_buf = input("velocity", velocity);

    let size = (n * DataType::F32.size_in_bytes()) as u64;
    let output = |label| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    };
    let param_out_buf = output("param_out");
    let velocity_out_buf = output("velocity_out");

    let mut uniform = Vec::with_capacity(16);
    uniform.extend_from_slice(&lr.to_le_bytes());
    uniform.extend_from_slice(&mu.to_le_bytes());
    uniform.extend_from_slice(&len.to_le_bytes());
    uniform.extend_from_slice(&row_stride.to_le_bytes());
    let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("momentum_params"),
        contents: &uniform,
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("momentum_bind_group"),
        layout: &ctx.layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: param_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: grad_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: velocity_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: param_out_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: velocity_out_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: params_buf.as_entire_binding(),
            },
        ],
    });

    let staging = |label| {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    };
    let param_staging = staging("param_staging");
    let velocity_staging = staging("velocity_staging");

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("momentum_encoder"),
    });
    {
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("momentum_pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(&ctx.pipeline);
        cpass.set_bind_group(0, &bind_group, &[]);
        cpass.dispatch_workgroups(groups_x, groups_y, 1);
    }
    encoder.copy_buffer_to_buffer(&param_out_buf, 0, &param_staging, 0, size);
    encoder.copy_buffer_to_buffer(&velocity_out_buf, 0, &velocity_staging, 0, size);
    ctx.queue.submit(Some(encoder.finish()));

    let param_out = readback(ctx, &param_staging)?;
    let velocity_out = readback(ctx, &velocity_staging)?;
    Ok((param_out, velocity_out))
}

/// `(Wgpu, F32)` kernel of the momentum operator.
///
/// # Errors
/// [`Error::Gpu`] when no GPU is available or the launch fails, plus the
/// usual input and attribute lookup errors.
pub fn momentum_kernel(ctx: &mut ExecutionContext<'_>) -> Result<()> {
    let param = ctx.input::<f32>(PARAM)?;
    let grad = ctx.input::<f32>(GRAD)?;
    let velocity = ctx.input::<f32>(VELOCITY)?;
    let lr_tensor = ctx.input::<f32>(LEARNING_RATE)?;
    let lr = lr_tensor.item().ok_or_else(|| Error::NotScalar {
        op: ctx.op_type().to_owned(),
        slot: LEARNING_RATE.to_owned(),
        shape: lr_tensor.shape.clone(),
    })?;
    let mu = ctx.attr_f32(MU)?;

    trace!(elements = param.len(), "momentum step on wgpu");
    let (param_out, velocity_out) =
        run_momentum_shader(&param.data, &grad.data, &velocity.data, lr, mu)?;

    ctx.set_output(
        PARAM_OUT,
        Tensor {
            shape: param.shape.clone(),
            data: param_out,
        },
    );
    ctx.set_output(
        VELOCITY_OUT,
        Tensor {
            shape: param.shape.clone(),
            data: velocity_out,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_grid_covers_every_element() {
        assert_eq!(dispatch_grid(1).unwrap(), (1, 1, 64));
        assert_eq!(dispatch_grid(64 * 10 + 1).unwrap(), (11, 1, 11 * 64));

        let n = 64 * MAX_GROUPS_PER_DIM as usize + 5;
        let (x, y, stride) = dispatch_grid(n).unwrap();
        assert_eq!(x, MAX_GROUPS_PER_DIM);
        assert_eq!(y, 2);
        assert!((x * y * WORKGROUP_SIZE) as usize >= n);
        assert_eq!(stride, MAX_GROUPS_PER_DIM * WORKGROUP_SIZE);
    }

    #[test]
    fn byte_conversion_round_trips() {
        let data = [1.5f32, -0.25, 3.0];
        assert_eq!(from_bytes(&to_bytes(&data)), data);
    }
}
