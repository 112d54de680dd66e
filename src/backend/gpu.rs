use std::borrow::Cow;

use glam::Vec2;
use log::{error, info};
use wgpu::util::DeviceExt;

use super::SimulationStep;
use crate::{
    config::SimulationConfig,
    error::{Result, SimError},
    kernel::TickInput,
    particle::ParticleStore,
    utils::multiple_of,
};

pub const PARTICLES_PER_WORKGROUP: u32 = 256;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    dt: f32,
    count: u32,
    mouse_pos: Vec2,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PushConstants {
    right: f32,
    bottom: f32,
    restitution: f32,
    draw: u32,
}

const PUSH_CONSTANTS_SIZE: u32 = std::mem::size_of::<PushConstants>() as u32;

/// Headless device, the simulation never presents anything itself.
struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuContext {
    async fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .ok_or(SimError::NoAdapter)?;

        let required_features = wgpu::Features::PUSH_CONSTANTS;
        let missing = required_features.difference(adapter.features());
        if !missing.is_empty() {
            return Err(SimError::MissingFeatures(missing));
        }

        let info = adapter.get_info();
        info!("GPU backend using {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("collision"),
                    required_features,
                    required_limits: adapter.limits(),
                },
                None,
            )
            .await?;

        Ok(Self { device, queue })
    }
}

/// One compute invocation per particle against every other particle.
///
/// Motion state lives in two sets of storage buffers, each tick reads from
/// `current` and writes to the other set before the roles swap. The new state
/// is copied to a staging buffer and mapped after a blocking poll, which is
/// the per-tick fence.
pub struct GpuBackend {
    ctx: GpuContext,
    count: u32,
    restitution: f32,

    position_buffers: [wgpu::Buffer; 2],
    velocity_buffers: [wgpu::Buffer; 2],
    param_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,

    current: usize,

    bind_groups: [wgpu::BindGroup; 2],
    count_pipeline: wgpu::ComputePipeline,
    advance_pipeline: wgpu::ComputePipeline,
}

impl GpuBackend {
    pub async fn new(config: &SimulationConfig, store: &ParticleStore) -> Result<Self> {
        config.validate()?;

        let ctx = GpuContext::new().await?;
        let device = &ctx.device;
        let count = store.len() as u32;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("collision"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("collision.wgsl"))),
        });

        let motion_usage = wgpu::BufferUsages::VERTEX
            | wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        let motion_size = motion_bytes(count);

        let position_buffers = [
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Positions A"),
                contents: bytemuck::cast_slice(store.positions()),
                usage: motion_usage,
            }),
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Positions B"),
                size: motion_size,
                usage: motion_usage,
                mapped_at_creation: false,
            }),
        ];
        let velocity_buffers = [
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Velocities A"),
                contents: bytemuck::cast_slice(store.velocities()),
                usage: motion_usage,
            }),
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Velocities B"),
                size: motion_size,
                usage: motion_usage,
                mapped_at_creation: false,
            }),
        ];

        let radii_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Radii"),
            contents: bytemuck::cast_slice(store.radii()),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE,
        });
        let contacts_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Contacts"),
            size: count as u64 * std::mem::size_of::<u32>() as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let param_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Collision Parameter Buffer"),
            contents: bytemuck::bytes_of(&Params {
                dt: 0.0,
                count,
                mouse_pos: Vec2::ZERO,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read-back"),
            size: motion_size * 2,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("collision"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
                storage_entry(5, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
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

        // Group `k` reads set `k` and writes the other one.
        let bind_groups = [0, 1].map(|k| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: position_buffers[k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: velocity_buffers[k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: radii_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: contacts_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: position_buffers[1 - k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: velocity_buffers[1 - k].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: param_buffer.as_entire_binding(),
                    },
                ],
            })
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("collision"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::COMPUTE,
                range: 0..PUSH_CONSTANTS_SIZE,
            }],
        });
        let count_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("count_contacts"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "count_contacts",
        });
        let advance_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("advance"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "advance",
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(SimError::Pipeline(err.to_string()));
        }

        info!(
            "GPU backend dispatching {} workgroups of {PARTICLES_PER_WORKGROUP}",
            workgroup_count(count)
        );

        Ok(Self {
            ctx,
            count,
            restitution: config.restitution,

            position_buffers,
            velocity_buffers,
            param_buffer,
            staging_buffer,

            current: 0,

            bind_groups,
            count_pipeline,
            advance_pipeline,
        })
    }

    /// Buffer holding the latest positions, laid out as `vec2<f32>` per
    /// particle so a renderer can bind it as an instance buffer directly.
    pub fn current_positions_buffer(&self) -> &wgpu::Buffer {
        &self.position_buffers[self.current]
    }

    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        push_constants: &PushConstants,
    ) {
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: None,
            timestamp_writes: None,
        });

        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, &self.bind_groups[self.current], &[]);
        cpass.set_push_constants(0, bytemuck::bytes_of(push_constants));
        cpass.dispatch_workgroups(workgroup_count(self.count), 1, 1);
    }

    /// Blocks until the last submitted tick finished, then copies its result
    /// into the store.
    fn read_back(&self, store: &mut ParticleStore) -> bool {
        let slice = self.staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });

        self.ctx.device.poll(wgpu::Maintain::wait()).panic_on_timeout();
        let Ok(Ok(())) = rx.recv() else {
            return false;
        };

        {
            let data = slice.get_mapped_range();
            let motion: &[Vec2] = bytemuck::cast_slice(&data);
            let (positions, velocities) = store.motion_mut();
            let n = positions.len();
            positions.copy_from_slice(&motion[..n]);
            velocities.copy_from_slice(&motion[n..n * 2]);
        }

        self.staging_buffer.unmap();
        true
    }
}

impl SimulationStep for GpuBackend {
    const NAME: &'static str = "gpu";

    fn step(&mut self, store: &mut ParticleStore, input: &TickInput) {
        let interaction = input.interaction.filter(|i| i.active);
        let params = Params {
            dt: input.dt,
            count: self.count,
            mouse_pos: interaction.map_or(Vec2::ZERO, |i| i.position),
        };
        self.ctx
            .queue
            .write_buffer(&self.param_buffer, 0, bytemuck::bytes_of(&params));

        let push_constants = PushConstants {
            right: input.bounds.right,
            bottom: input.bounds.bottom,
            restitution: self.restitution,
            draw: interaction.is_some() as u32,
        };

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        self.dispatch(&mut encoder, &self.count_pipeline, &push_constants);
        self.dispatch(&mut encoder, &self.advance_pipeline, &push_constants);

        let output = 1 - self.current;
        let size = motion_bytes(self.count);
        encoder.copy_buffer_to_buffer(&self.position_buffers[output], 0, &self.staging_buffer, 0, size);
        encoder.copy_buffer_to_buffer(
            &self.velocity_buffers[output],
            0,
            &self.staging_buffer,
            size,
            size,
        );

        self.ctx.queue.submit(Some(encoder.finish()));
        self.current = output;

        if !self.read_back(store) {
            error!("Failed to read particle state back from the GPU, keeping the previous tick");
        }
    }
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

fn motion_bytes(count: u32) -> u64 {
    count as u64 * std::mem::size_of::<Vec2>() as u64
}

fn workgroup_count(count: u32) -> u32 {
    multiple_of(count, PARTICLES_PER_WORKGROUP) / PARTICLES_PER_WORKGROUP
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{
        config::Bounds,
        kernel::Interaction,
        particle::Particle,
    };

    fn backend(store: &ParticleStore) -> Option<GpuBackend> {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let config = SimulationConfig {
            particles: store.len(),
            bounds: Bounds::new(800.0, 600.0),
            ..Default::default()
        };
        match rt.block_on(GpuBackend::new(&config, store)) {
            Ok(backend) => Some(backend),
            Err(err) => {
                eprintln!("skipping: {err}");
                None
            }
        }
    }

    fn resting(position: Vec2) -> ParticleStore {
        ParticleStore::from_particles([Particle {
            position,
            velocity: Vec2::ZERO,
            color: Vec3::ONE,
            radius: 2.0,
        }])
    }

    #[test]
    fn invalid_config_fails_before_touching_the_device() {
        let store = resting(Vec2::new(100.0, 100.0));
        let config = SimulationConfig {
            restitution: 2.0,
            ..Default::default()
        };

        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(matches!(
            rt.block_on(GpuBackend::new(&config, &store)),
            Err(SimError::InvalidRestitution(_))
        ));
    }

    #[test]
    fn workgroups_cover_every_particle() {
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(256), 1);
        assert_eq!(workgroup_count(257), 2);
        assert_eq!(workgroup_count(1000), 4);
    }

    #[test]
    fn active_pointer_attracts_nearby_particles() {
        let mut store = resting(Vec2::new(100.0, 100.0));
        let Some(mut gpu) = backend(&store) else {
            return;
        };

        let mut input = TickInput::new(0.1, Bounds::new(800.0, 600.0));
        input.interaction = Some(Interaction {
            position: Vec2::new(150.0, 100.0),
            active: true,
        });
        gpu.step(&mut store, &input);

        let velocity = store.velocities()[0];
        assert!(velocity.x > 0.0, "{velocity:?}");
        assert!(velocity.y.abs() < 1e-6);
        assert!(store.positions()[0].x > 100.0);
    }

    #[test]
    fn inactive_pointer_is_ignored() {
        let mut store = resting(Vec2::new(100.0, 100.0));
        let Some(mut gpu) = backend(&store) else {
            return;
        };

        let mut input = TickInput::new(0.1, Bounds::new(800.0, 600.0));
        input.interaction = Some(Interaction {
            position: Vec2::new(150.0, 100.0),
            active: false,
        });
        gpu.step(&mut store, &input);

        assert_eq!(store.velocities()[0], Vec2::ZERO);
        assert_eq!(store.positions()[0], Vec2::new(100.0, 100.0));
    }

    #[test]
    fn buffers_swap_every_tick() {
        let mut store = resting(Vec2::new(50.0, 50.0));
        let Some(mut gpu) = backend(&store) else {
            return;
        };

        let input = TickInput::new(0.1, Bounds::new(100.0, 100.0));
        let before = gpu.current_positions_buffer().global_id();
        gpu.step(&mut store, &input);
        assert_ne!(gpu.current_positions_buffer().global_id(), before);
        gpu.step(&mut store, &input);
        assert_eq!(gpu.current_positions_buffer().global_id(), before);
    }
}
