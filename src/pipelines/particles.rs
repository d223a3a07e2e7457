//! GPU skinning of particle clouds.
//!
//! The skeleton is posed on the CPU, its bone matrices are written into a
//! float texture once per frame, and the vertex shader skins each particle
//! from that texture. There is no per-particle work left on the CPU.
//!
//! Wiring, in order:
//! 1. [`crate::skinning::prepare_particle_attributes`] when the particles are created,
//!    uploaded with [`ParticleBuffers::new`]
//! 2. [`setup_gpu_skinning`] once the skinned mesh is loaded
//! 3. [`GpuSkinning::update`] every frame after the animation player advanced
//! 4. [`mk_particle_pipeline`] + [`ParticleBuffers::draw`] to render

use anyhow::{Context, bail};
use wgpu::util::DeviceExt;

use crate::{
    data_structures::{bone_texture::BoneTexture, scene_graph::Pose},
    pipelines::Vertex,
    skinning::{NormParams, ParticleSkinAttributes, ParticleSkinVertex, SkinnedMesh},
};

/// WGSL source of the particle skinning shader (`vs_main` / `fs_main`).
pub const PARTICLE_SKINNING_SHADER: &str = include_str!("particle_skinning.wgsl");

pub const BONE_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Vertices per particle quad (two triangles).
pub const VERTICES_PER_PARTICLE: u32 = 6;

/// Matches `SkinningUniform` in the shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkinningUniform {
    pub bind_matrix: [[f32; 4]; 4],
    pub bind_matrix_inverse: [[f32; 4]; 4],
    pub norm_center: [f32; 3],
    pub norm_scale: f32,
    pub bone_count: u32,
    pub use_gpu_skinning: u32,
    _padding: [u32; 2],
}

impl SkinningUniform {
    pub fn new(
        bind_matrix: cgmath::Matrix4<f32>,
        bind_matrix_inverse: cgmath::Matrix4<f32>,
        norm: NormParams,
        bone_count: usize,
    ) -> Self {
        Self {
            bind_matrix: bind_matrix.into(),
            bind_matrix_inverse: bind_matrix_inverse.into(),
            norm_center: norm.center.into(),
            norm_scale: norm.scale,
            bone_count: bone_count as u32,
            use_gpu_skinning: 1,
            _padding: [0; 2],
        }
    }

    /// Uniform for meshes without a skeleton: particles use their fallback position.
    pub fn disabled() -> Self {
        let identity: [[f32; 4]; 4] = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self {
            bind_matrix: identity,
            bind_matrix_inverse: identity,
            norm_center: [0.0; 3],
            norm_scale: 1.0,
            bone_count: 0,
            use_gpu_skinning: 0,
            _padding: [0; 2],
        }
    }
}

/// Matches `ParticleFrame` in the shader. Rewritten every frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleFrameUniform {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub camera_dir: [f32; 3],
    pub time: f32,
    pub color: [f32; 4],
    pub viewport: [f32; 2],
    pub scatter: f32,
    pub effect_start: f32,
    pub dissipation: f32,
    pub float_away: f32,
    pub float_dir: f32,
    pub surface_float: f32,
    pub surface_speed: f32,
    /// 0 linear, 1 quadratic, 2 cubic, 3 exponential, 4 logarithmic.
    pub falloff_curve: u32,
    /// 1 measures depth towards the camera, anything else along model z.
    pub reference: u32,
    _padding: u32,
}

impl Default for ParticleFrameUniform {
    fn default() -> Self {
        let identity: [[f32; 4]; 4] = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self {
            model: identity,
            view: identity,
            projection: identity,
            camera_dir: [0.0, 0.0, -1.0],
            time: 0.0,
            color: [1.0, 1.0, 1.0, 1.0],
            viewport: [800.0, 600.0],
            scatter: 0.0,
            effect_start: 0.5,
            dissipation: 0.0,
            float_away: 0.0,
            float_dir: 0.0,
            surface_float: 0.0,
            surface_speed: 1.0,
            falloff_curve: 0,
            reference: 0,
            _padding: 0,
        }
    }
}

/// Effect attributes of one particle; the skinning attributes live in a second buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleVertex {
    /// Position used when GPU skinning is disabled.
    pub position: [f32; 3],
    pub size: f32,
    pub scattered_position: [f32; 3],
    pub seeds: [f32; 4],
    pub drift: [f32; 3],
}

impl Vertex for ParticleVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ParticleVertex>() as wgpu::BufferAddress,
            // one quad per particle, so particles advance per instance
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 7]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 11]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

impl Vertex for ParticleSkinVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ParticleSkinVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Uint32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 11]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Uint32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 20]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

pub fn skinning_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    // read with textureLoad, 32-bit floats are not filterable everywhere
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("skinning_bind_group_layout"),
    })
}

pub fn frame_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("particle_frame_bind_group_layout"),
    })
}

/// Bone texture, skinning uniform and the bind group the vertex shader reads them through.
#[derive(Debug)]
pub struct GpuSkinning {
    pub bone_texture: wgpu::Texture,
    pub bone_texture_size: u32,
    pub bone_count: usize,
    pub uniform: SkinningUniform,
    pub uniform_buffer: wgpu::Buffer,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
}

impl GpuSkinning {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bones: &BoneTexture,
        uniform: SkinningUniform,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: bones.size,
            height: bones.size,
            depth_or_array_layers: 1,
        };
        let bone_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("bone texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BONE_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = bone_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Skinning Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = skinning_bind_group_layout(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
            label: Some("skinning_bind_group"),
        });

        let skinning = Self {
            bone_texture,
            bone_texture_size: bones.size,
            bone_count: bones.bone_count(),
            uniform,
            uniform_buffer,
            bind_group_layout,
            bind_group,
        };
        skinning.write_bones(queue, bones);
        log::info!(
            "GPU skinning setup complete: {} bones, bone texture {}x{}",
            skinning.bone_count,
            skinning.bone_texture_size,
            skinning.bone_texture_size
        );
        skinning
    }

    fn write_bones(&self, queue: &wgpu::Queue, bones: &BoneTexture) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.bone_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            bones.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bones.bytes_per_row()),
                rows_per_image: Some(bones.size),
            },
            wgpu::Extent3d {
                width: bones.size,
                height: bones.size,
                depth_or_array_layers: 1,
            },
        );
    }

    /**
     * Uploads the bone matrices of the current pose.
     *
     * This is the only per-frame skinning work on the CPU. The texture was
     * allocated for a fixed bone count, so a texture of another size is
     * rejected rather than silently truncated.
     */
    pub fn update(&self, queue: &wgpu::Queue, bones: &BoneTexture) -> anyhow::Result<()> {
        if bones.size != self.bone_texture_size {
            bail!(
                "bone texture is {}x{} but GPU skinning was set up with {}x{}",
                bones.size,
                bones.size,
                self.bone_texture_size,
                self.bone_texture_size
            );
        }
        self.write_bones(queue, bones);
        Ok(())
    }

    pub fn set_enabled(&mut self, queue: &wgpu::Queue, enabled: bool) {
        self.uniform.use_gpu_skinning = enabled as u32;
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

/**
 * Connects a skinned mesh to the particle shader: computes the bone
 * texture for `pose` and creates the skinning uniforms and bind group.
 *
 * Fails when the mesh has no skeleton; the caller then keeps drawing the
 * particles at their CPU positions.
 */
pub fn setup_gpu_skinning(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    mesh: &SkinnedMesh,
    pose: &Pose,
    norm: NormParams,
) -> anyhow::Result<GpuSkinning> {
    let skeleton = mesh
        .skeleton
        .as_ref()
        .with_context(|| format!("no skeleton found for mesh {}", mesh.name))?;
    let bones = mesh.bone_texture(pose);
    let uniform = SkinningUniform::new(
        mesh.bind_matrix,
        mesh.bind_matrix_inverse,
        norm,
        skeleton.bone_count(),
    );
    Ok(GpuSkinning::new(device, queue, &bones, uniform))
}

#[derive(Debug)]
pub struct ParticleFrame {
    pub uniform: ParticleFrameUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub bind_group: wgpu::BindGroup,
}

impl ParticleFrame {
    pub fn new(device: &wgpu::Device, uniform: ParticleFrameUniform) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Frame Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = frame_bind_group_layout(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("particle_frame_bind_group"),
        });
        Self {
            uniform,
            buffer,
            bind_group_layout,
            bind_group,
        }
    }

    pub fn write_to_buffer(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

/// Both per-particle vertex buffers.
#[derive(Debug)]
pub struct ParticleBuffers {
    pub particles: wgpu::Buffer,
    pub skinning: wgpu::Buffer,
    pub amount: u32,
}

impl ParticleBuffers {
    pub fn new(
        device: &wgpu::Device,
        particles: &[ParticleVertex],
        skinning: &ParticleSkinAttributes,
    ) -> anyhow::Result<Self> {
        if particles.len() != skinning.len() {
            bail!(
                "{} particles but skinning attributes for {}",
                particles.len(),
                skinning.len()
            );
        }
        let particle_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Vertex Buffer"),
            contents: bytemuck::cast_slice(particles),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let skinning_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Skinning Buffer"),
            contents: bytemuck::cast_slice(&skinning.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Ok(Self {
            particles: particle_buffer,
            skinning: skinning_buffer,
            amount: particles.len() as u32,
        })
    }

    pub fn draw<'a>(
        &'a self,
        render_pass: &mut wgpu::RenderPass<'a>,
        skinning: &'a GpuSkinning,
        frame: &'a ParticleFrame,
    ) {
        if self.amount == 0 {
            log::warn!("you attempted to draw a particle cloud with zero particles");
            return;
        }
        render_pass.set_bind_group(0, &skinning.bind_group, &[]);
        render_pass.set_bind_group(1, &frame.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.particles.slice(..));
        render_pass.set_vertex_buffer(1, self.skinning.slice(..));
        render_pass.draw(0..VERTICES_PER_PARTICLE, 0..self.amount);
    }
}

pub fn mk_particle_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    skinning_bind_group_layout: &wgpu::BindGroupLayout,
    frame_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Particle Pipeline Layout"),
        bind_group_layouts: &[Some(skinning_bind_group_layout), Some(frame_bind_group_layout)],
        immediate_size: 0,
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Particle Skinning Shader"),
        source: wgpu::ShaderSource::Wgsl(PARTICLE_SKINNING_SHADER.into()),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Particle Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[ParticleVertex::desc(), ParticleSkinVertex::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // quads are generated in clip space, their winding carries no meaning
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        // particles blend, so they test against depth but never write it
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: Some(false),
            depth_compare: Some(wgpu::CompareFunction::Less),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}
