use anyhow::{bail, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use super::animated_state::{AnimatedStateGpu, AnimationParamsGpu, PerInstanceAnimatedState};

pub const ANIMATION_WORKGROUP_SIZE: u32 = 64;

/// Unit cube vertex. `front` is 1.0 on the +Z face, which samples the atlas.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ItemVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub front: f32,
}

/// Static per-instance data, uploaded once per chunk.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ItemInstanceGpu {
    pub model: [[f32; 4]; 4],
    pub base_color: [f32; 4],
    pub layer: u32,
    pub _pad: [u32; 3],
}

impl ItemInstanceGpu {
    /// `placement` positions the item; the unit cube is scaled to `half_extents * 2`.
    pub fn new(placement: Mat4, half_extents: Vec3, base_color: [f32; 4], layer: u32) -> Self {
        let model = placement * Mat4::from_scale(half_extents * 2.0);
        Self { model: model.to_cols_array_2d(), base_color, layer, _pad: [0; 3] }
    }
}

const ITEM_VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Float32,
];

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 6] = wgpu::vertex_attr_array![
    4 => Float32x4,
    5 => Float32x4,
    6 => Float32x4,
    7 => Float32x4,
    8 => Float32x4,
    9 => Uint32,
];

// hover_z and unavailable are read together; the trailing padding is skipped.
const ANIMATED_ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
    10 => Float32x4,
    11 => Float32x2,
];

pub fn item_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<ItemVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ITEM_VERTEX_ATTRIBUTES,
    }
}

pub fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<ItemInstanceGpu>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRIBUTES,
    }
}

pub fn animated_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<AnimatedStateGpu>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &ANIMATED_ATTRIBUTES,
    }
}

/// Unit cube centred on the origin, counter-clockwise outward faces.
pub fn cube_mesh() -> (Vec<ItemVertex>, Vec<u16>) {
    // (normal, u axis, v axis) with u x v == normal.
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u_axis, v_axis) in faces {
        let base = vertices.len() as u16;
        let center = normal * 0.5;
        let front = if normal == Vec3::Z { 1.0 } else { 0.0 };
        for (u, v) in [(0.0f32, 0.0f32), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let position = center + u_axis * (u - 0.5) + v_axis * (v - 0.5);
            vertices.push(ItemVertex { position: position.to_array(), normal: normal.to_array(), uv: [u, v], front });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Bind group layouts shared by every chunk and by the item pipelines.
pub struct ChunkLayouts {
    pub animation: wgpu::BindGroupLayout,
    pub atlas: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
}

impl ChunkLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let animation = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Animated State Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, false),
            ],
        });
        let atlas = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Atlas Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Atlas Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self { animation, atlas, sampler }
    }
}

/// GPU buffers owned by one chunk. Dropping it releases them together.
pub struct ChunkGpu {
    instance_buffer: wgpu::Buffer,
    target_buffer: wgpu::Buffer,
    current_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    animation_bind_group: wgpu::BindGroup,
    atlas_bind_group: wgpu::BindGroup,
    instance_count: u32,
}

impl ChunkGpu {
    pub fn new(
        device: &wgpu::Device,
        layouts: &ChunkLayouts,
        label: &str,
        instances: &[ItemInstanceGpu],
        animated: &PerInstanceAnimatedState,
        atlas_view: &wgpu::TextureView,
    ) -> Result<Self> {
        if instances.is_empty() || animated.len() != instances.len() {
            bail!("Chunk '{label}' has {} instances and {} animated states", instances.len(), animated.len());
        }
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Item Instances"),
            contents: bytemuck::cast_slice(instances),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let target_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Animated Targets"),
            contents: bytemuck::cast_slice(animated.targets()),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let current_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Animated Current"),
            contents: bytemuck::cast_slice(animated.currents()),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Animation Params"),
            contents: bytemuck::bytes_of(&animated.params(0.0)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let animation_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Animated State Bind Group"),
            layout: &layouts.animation,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: target_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: current_buffer.as_entire_binding() },
            ],
        });
        let atlas_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Atlas Bind Group"),
            layout: &layouts.atlas,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(atlas_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&layouts.sampler) },
            ],
        });
        Ok(Self {
            instance_buffer,
            target_buffer,
            current_buffer,
            params_buffer,
            animation_bind_group,
            atlas_bind_group,
            instance_count: instances.len() as u32,
        })
    }

    pub fn instance_buffer(&self) -> &wgpu::Buffer {
        &self.instance_buffer
    }

    pub fn target_buffer(&self) -> &wgpu::Buffer {
        &self.target_buffer
    }

    pub fn current_buffer(&self) -> &wgpu::Buffer {
        &self.current_buffer
    }

    pub fn animation_bind_group(&self) -> &wgpu::BindGroup {
        &self.animation_bind_group
    }

    pub fn atlas_bind_group(&self) -> &wgpu::BindGroup {
        &self.atlas_bind_group
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn workgroups(&self) -> u32 {
        self.instance_count.div_ceil(ANIMATION_WORKGROUP_SIZE)
    }

    pub fn write_params(&self, queue: &wgpu::Queue, params: &AnimationParamsGpu) {
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));
    }

    pub fn destroy(&self) {
        self.instance_buffer.destroy();
        self.target_buffer.destroy();
        self.current_buffer.destroy();
        self.params_buffer.destroy();
    }
}
