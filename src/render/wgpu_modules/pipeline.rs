//! WGPU 管线创建
//!
//! 把后端无关的顶点布局与反射得到的 uniform 块翻译为 wgpu 对象。

use crate::render::backend::{IndexFormat, VertexFormat, VertexLayout, VertexStepMode};
use crate::render::shader_compiler::{UniformBlock, UNIFORM_BINDING};

/// 深度缓冲格式
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// 绘制使用的索引格式（三角带重启值随之确定）
pub const STRIP_INDEX_FORMAT: wgpu::IndexFormat = wgpu::IndexFormat::Uint32;

pub fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
    }
}

pub fn step_mode(mode: VertexStepMode) -> wgpu::VertexStepMode {
    match mode {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

pub fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

/// 链接所需的全部输入
pub struct ProgramDescriptor<'a> {
    pub color_format: wgpu::TextureFormat,
    pub vertex_module: &'a wgpu::ShaderModule,
    pub vertex_entry: &'a str,
    pub fragment_module: &'a wgpu::ShaderModule,
    pub fragment_entry: &'a str,
    pub layouts: &'a [VertexLayout],
}

/// uniform 块的 GPU 资源
pub struct UniformResources {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// 管线构建器
pub struct PipelineBuilder;

impl PipelineBuilder {
    /// 创建 uniform 绑定组布局
    pub fn create_uniform_bind_group_layout(
        device: &wgpu::Device,
        block: &UniformBlock,
    ) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Hex Uniform BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: UNIFORM_BINDING,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(block.size as u64),
                },
                count: None,
            }],
        })
    }

    /// 创建 uniform 缓冲区及绑定组
    pub fn create_uniform_resources(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        block: &UniformBlock,
    ) -> UniformResources {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Hex Uniform Buffer"),
            size: block.size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Hex Uniform Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: buffer.as_entire_binding(),
            }],
        });
        UniformResources { buffer, bind_group }
    }

    /// 创建六边形实例化管线
    ///
    /// 三角带拓扑、无剔除；深度测试恒通过，深度缓冲只用于清除。
    pub fn create_hex_pipeline(
        device: &wgpu::Device,
        desc: &ProgramDescriptor<'_>,
        uniform_bgl: Option<&wgpu::BindGroupLayout>,
    ) -> wgpu::RenderPipeline {
        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> = uniform_bgl.into_iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Hex Pipeline Layout"),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        offset: a.offset,
                        shader_location: a.location,
                        format: vertex_format(a.format),
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = desc
            .layouts
            .iter()
            .zip(&attributes)
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.stride,
                step_mode: step_mode(layout.step_mode),
                attributes,
            })
            .collect();

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Hex Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: desc.vertex_module,
                entry_point: desc.vertex_entry,
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: desc.fragment_module,
                entry_point: desc.fragment_entry,
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: Some(STRIP_INDEX_FORMAT),
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
    }

    /// 创建与表面同尺寸的深度视图
    pub fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }
}
