use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferInitDescriptor, BufferUsages, ShaderStages,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bevy::render::{Extract, ExtractSchedule, Render, RenderApp, RenderSet};

use crate::gpu::ffi::{HrParticle, LrParticle, VolumeMapTransform};
use crate::plugin::Simulation;
use crate::simulation::RenderView;

// ==================== resources ======================================

/// Latest committed slot read back from the simulation (main world).
#[derive(Resource, Default)]
pub struct LatestRenderView(pub Option<RenderView>);

// binding 0 = LR particles, 1 = HR particles, 2 = volume map transforms
#[derive(Resource, Clone)]
pub struct ParticleBindGroupLayout(pub BindGroupLayout);

#[derive(Resource, Clone)]
pub struct ParticleBindGroup(pub BindGroup);

#[derive(Resource)]
pub struct ParticleBuffers {
    pub lr_buffer: Buffer,
    pub hr_buffer: Buffer,
    pub transforms_buffer: Buffer,
    pub num_lr: u32,
    pub num_hr: u32,
}

// Rendering world copy
#[derive(Resource, Clone, ExtractResource)]
pub struct ExtractedParticleBuffers {
    pub lr_buffer: Buffer,
    pub hr_buffer: Buffer,
    pub transforms_buffer: Buffer,
    pub num_lr: u32,
    pub num_hr: u32,
}

// =====================================================================

// ========================== systems ==================================

// Startup systems that have to run only once

fn init_particle_buffers(
    mut commands: Commands,
    render_device: Option<Res<RenderDevice>>, // headless apps have no device
    sim: Option<Res<Simulation>>,
) {
    let (Some(render_device), Some(sim)) = (render_device, sim) else {
        return;
    };
    let store = sim.0.store();
    let transforms = padded_transforms(sim.0.boundary().transforms());
    commands.insert_resource(ParticleBuffers::new(&render_device, &store.lr, &store.hr, &transforms));
}

fn init_particle_bind_group_layout(mut commands: Commands, render_device: Option<Res<RenderDevice>>) {
    let Some(render_device) = render_device else {
        return;
    };
    let entry = |binding| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT | ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    let layout = render_device.create_bind_group_layout(
        Some("granular_particle_bind_group_layout"),
        &[entry(0), entry(1), entry(2)],
    );
    commands.insert_resource(ParticleBindGroupLayout(layout));
}

// Update systems that have to run per frame

fn queue_particle_buffers(
    view: Res<LatestRenderView>,
    particle_buffers: Option<Res<ParticleBuffers>>,
    render_queue: Option<Res<RenderQueue>>,
) {
    let (Some(particle_buffers), Some(render_queue)) = (particle_buffers, render_queue) else {
        return;
    };
    let Some(view) = &view.0 else {
        return;
    };
    // buffers were sized at startup; the particle count never changes
    if view.lr.len() as u32 != particle_buffers.num_lr || view.hr.len() as u32 != particle_buffers.num_hr {
        return;
    }
    render_queue.write_buffer(&particle_buffers.lr_buffer, 0, bytemuck::cast_slice(&view.lr));
    render_queue.write_buffer(&particle_buffers.hr_buffer, 0, bytemuck::cast_slice(&view.hr));
    let transforms = padded_transforms(&view.transforms);
    if (transforms.len() * size_of::<VolumeMapTransform>()) as u64 == particle_buffers.transforms_buffer.size() {
        render_queue.write_buffer(&particle_buffers.transforms_buffer, 0, bytemuck::cast_slice(&transforms));
    }
}

// Extract systems that send from App to Render

fn extract_particle_buffers(mut commands: Commands, particle_buffers: Extract<Option<Res<ParticleBuffers>>>) {
    let Some(particle_buffers) = &*particle_buffers else {
        return;
    };
    commands.insert_resource(ExtractedParticleBuffers {
        lr_buffer: particle_buffers.lr_buffer.clone(),
        hr_buffer: particle_buffers.hr_buffer.clone(),
        transforms_buffer: particle_buffers.transforms_buffer.clone(),
        num_lr: particle_buffers.num_lr,
        num_hr: particle_buffers.num_hr,
    });
}

fn extract_bind_group_layout(mut commands: Commands, layout: Extract<Option<Res<ParticleBindGroupLayout>>>) {
    if let Some(layout) = &*layout {
        commands.insert_resource(ParticleBindGroupLayout(layout.0.clone()));
    }
}

// Prepare systems in Render

fn prepare_particle_bind_group(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    layout: Option<Res<ParticleBindGroupLayout>>,
    extracted: Option<Res<ExtractedParticleBuffers>>,
) {
    let (Some(layout), Some(extracted)) = (layout, extracted) else {
        return;
    };
    let bind_group = render_device.create_bind_group(
        Some("granular_particle_bind_group"),
        &layout.0,
        &[
            BindGroupEntry { binding: 0, resource: extracted.lr_buffer.as_entire_binding() },
            BindGroupEntry { binding: 1, resource: extracted.hr_buffer.as_entire_binding() },
            BindGroupEntry { binding: 2, resource: extracted.transforms_buffer.as_entire_binding() },
        ],
    );
    commands.insert_resource(ParticleBindGroup(bind_group));
}

// Implementations

fn padded_transforms(transforms: &[VolumeMapTransform]) -> Vec<VolumeMapTransform> {
    if transforms.is_empty() {
        vec![VolumeMapTransform::new([0.0; 2], [1.0; 2]).enabled(false)]
    } else {
        transforms.to_vec()
    }
}

impl ParticleBuffers {
    pub fn new(
        render_device: &RenderDevice,
        lr: &[LrParticle],
        hr: &[HrParticle],
        transforms: &[VolumeMapTransform],
    ) -> Self {
        let storage = |label: &'static str, contents: &[u8]| {
            render_device.create_buffer_with_data(&BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            })
        };
        Self {
            lr_buffer: storage("LR Particle Buffer", bytemuck::cast_slice(lr)),
            hr_buffer: storage("HR Particle Buffer", bytemuck::cast_slice(hr)),
            transforms_buffer: storage("Volume Map Transform Buffer", bytemuck::cast_slice(transforms)),
            num_lr: lr.len() as u32,
            num_hr: hr.len() as u32,
        }
    }
}

// =====================================================================

/// Registers the main-world and render-world halves of the particle buffers.
pub fn add_particle_buffer_systems(app: &mut App) {
    app.init_resource::<LatestRenderView>()
        .add_systems(PostStartup, (init_particle_buffers, init_particle_bind_group_layout))
        .add_systems(Last, queue_particle_buffers);

    let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
        return;
    };
    render_app
        .add_systems(ExtractSchedule, (extract_particle_buffers, extract_bind_group_layout))
        .add_systems(Render, prepare_particle_bind_group.in_set(RenderSet::Prepare));
}
