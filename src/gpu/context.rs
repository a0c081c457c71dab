//! Device bring-up and kernel compilation for the census kernels.
//!
//! A context is created explicitly and owned by the backend that runs the
//! enumeration; there is no process-wide device.

use thiserror::Error;
use wgpu::{
    Adapter, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType, BufferBindingType,
    ComputePipeline, ComputePipelineDescriptor, Device, DeviceDescriptor, ErrorFilter, Features, Instance,
    InstanceDescriptor, Maintain, PipelineLayoutDescriptor, PowerPreference, Queue, RequestAdapterOptions,
    ShaderModule, ShaderStages,
};

use super::shaders;
use super::GpuConfig;

/// Failures inside the wgpu layer, before they are folded into [`crate::Error`]
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("no GPU adapter: {0}")]
    NoAdapter(String),
    #[error("device request refused: {0}")]
    DeviceRequest(String),
    #[error("kernel compilation failed: {0}")]
    ShaderCompilation(String),
    #[error("buffer: {0}")]
    BufferError(String),
    #[error("dispatch: {0}")]
    ComputeError(String),
}

/// Binding kinds used by the census kernels, in binding order
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    Read,
    ReadWrite,
    Uniform,
}

/// A compiled kernel with its bind group layout
pub(crate) struct Kernel {
    pub pipeline: ComputePipeline,
    pub layout: BindGroupLayout,
}

/// Device, queue and the four compiled census kernels.
pub struct GpuContext {
    device: Device,
    queue: Queue,
    adapter: wgpu::AdapterInfo,
    pub(crate) signature: Kernel,
    pub(crate) rotation: Kernel,
    pub(crate) classify: Kernel,
    pub(crate) expand: Kernel,
    config: GpuConfig,
    /// Largest buffer that can also be bound as one storage binding
    binding_limit: u64,
    grid_limit: u32,
}

fn pick_adapter(config: &GpuConfig) -> Result<Adapter, GpuError> {
    let instance = Instance::new(InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let power_preference = match config.prefer_high_performance {
        true => PowerPreference::HighPerformance,
        false => PowerPreference::LowPower,
    };
    pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
        power_preference,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| GpuError::NoAdapter("no adapter matched the request".to_string()))
}

impl GpuContext {
    /// Opens a device with the adapter's own limits, so large batches are not
    /// capped by the conservative defaults, and compiles every kernel inside
    /// a validation error scope.
    pub fn new(config: &GpuConfig) -> Result<Self, GpuError> {
        let adapter = pick_adapter(config)?;
        let info = adapter.get_info();
        log::info!("GPU adapter: {} ({:?}), driver {}", info.name, info.backend, info.driver);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &DeviceDescriptor {
                label: Some("census device"),
                required_features: Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        let limits = device.limits();
        let binding_limit = limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size));

        device.push_error_scope(ErrorFilter::Validation);
        let signature = Self::create_kernel(
            &device,
            shaders::SIGNATURE_SHADER,
            "compute_signature",
            &[Slot::Read, Slot::ReadWrite, Slot::Uniform],
            "Signature",
        );
        let rotation = Self::create_kernel(
            &device,
            shaders::ROTATION_SHADER,
            "compute_rotation_key",
            &[Slot::Read, Slot::Read, Slot::ReadWrite, Slot::Uniform],
            "Rotation",
        );
        let classify = Self::create_kernel(
            &device,
            shaders::CLASSIFY_SHADER,
            "compute_outcome",
            &[Slot::Read, Slot::Read, Slot::ReadWrite, Slot::ReadWrite, Slot::Uniform],
            "Classify",
        );
        let expand = Self::create_kernel(
            &device,
            shaders::EXPAND_SHADER,
            "compute_children",
            &[Slot::Read, Slot::ReadWrite, Slot::ReadWrite, Slot::Uniform],
            "Expand",
        );
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::ShaderCompilation(err.to_string()));
        }

        Ok(Self {
            device,
            queue,
            adapter: info,
            signature,
            rotation,
            classify,
            expand,
            config: config.clone(),
            binding_limit,
            grid_limit: limits.max_compute_workgroups_per_dimension.max(1),
        })
    }

    fn create_kernel(device: &Device, source: &str, entry_point: &str, slots: &[Slot], label: &str) -> Kernel {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} Shader", label)),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout = Self::create_bind_group_layout(device, slots, label);
        let pipeline = Self::create_compute_pipeline(device, &shader, entry_point, &layout, label);
        Kernel { pipeline, layout }
    }

    fn create_bind_group_layout(device: &Device, slots: &[Slot], label: &str) -> BindGroupLayout {
        let entries: Vec<BindGroupLayoutEntry> = slots
            .iter()
            .enumerate()
            .map(|(binding, slot)| BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::Buffer {
                    ty: match slot {
                        Slot::Read => BufferBindingType::Storage { read_only: true },
                        Slot::ReadWrite => BufferBindingType::Storage { read_only: false },
                        Slot::Uniform => BufferBindingType::Uniform,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some(&format!("{} Bind Group Layout", label)),
            entries: &entries,
        })
    }

    /// Creates a compute pipeline with the specified shader and entry point
    fn create_compute_pipeline(
        device: &Device,
        shader: &ShaderModule,
        entry_point: &str,
        bind_group_layout: &BindGroupLayout,
        label: &str,
    ) -> ComputePipeline {
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(&format!("{} Layout", label)),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });

        device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some(&format!("{} Pipeline", label)),
            layout: Some(&pipeline_layout),
            module: shader,
            entry_point,
            compilation_options: Default::default(),
            cache: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter.name
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    /// Byte ceiling for any one buffer a kernel binds
    pub fn max_buffer_size(&self) -> u64 {
        self.binding_limit
    }

    /// Workgroup grid for `count` invocations, spilling into y past the per-dimension limit
    pub fn workgroups(&self, count: u32) -> (u32, u32) {
        let groups = count.div_ceil(shaders::WORKGROUP_SIZE).max(1);
        let x = groups.min(self.grid_limit);
        (x, groups.div_ceil(x))
    }

    /// Blocks until `commands` have executed.
    pub fn submit_and_wait(&self, commands: wgpu::CommandBuffer) {
        self.queue.submit([commands]);
        self.device.poll(Maintain::Wait);
    }

    pub fn debug_info(&self) -> String {
        format!(
            "{} on {:?} (driver {}), bindings up to {} MiB, budget {} MiB",
            self.adapter.name,
            self.adapter.backend,
            self.adapter.driver,
            self.binding_limit >> 20,
            self.config.memory_budget_bytes >> 20
        )
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpuContext({})", self.debug_info())
    }
}
