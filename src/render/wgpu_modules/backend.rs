//! 基于 wgpu 的渲染后端

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::pipeline::{self, PipelineBuilder, ProgramDescriptor};
use crate::core::error::{RenderError, RenderResult};
use crate::render::backend::{
    BufferDescriptor, BufferHandle, BufferUsage, ProgramHandle, RenderBackend, RenderCommand,
    ShaderCompilation, ShaderHandle, ShaderStage, UniformLocation, VertexLayout,
};
use crate::render::shader_compiler::{self, CompiledStage, LinkedInterface};

struct WgpuShader {
    stage: ShaderStage,
    compiled: Option<(wgpu::ShaderModule, CompiledStage)>,
}

struct WgpuProgram {
    pipeline: wgpu::RenderPipeline,
    interface: LinkedInterface,
    uniforms: Option<pipeline::UniformResources>,
}

/// wgpu 后端
///
/// 持有表面、设备与队列；所有 GPU 对象通过句柄表管理。
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    ready: Arc<AtomicBool>,
    next_id: u64,
    buffers: HashMap<BufferHandle, wgpu::Buffer>,
    shaders: HashMap<ShaderHandle, WgpuShader>,
    programs: HashMap<ProgramHandle, WgpuProgram>,
    current_program: Option<ProgramHandle>,
}

impl WgpuBackend {
    /// 创建表面并请求设备
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> RenderResult<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::Surface(e.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("hexmap device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        // 颜色按原值写入，优先线性格式
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| RenderError::Surface("surface reports no supported formats".into()))?;
        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let depth_view = PipelineBuilder::create_depth_view(&device, config.width, config.height);

        let ready = Arc::new(AtomicBool::new(true));
        let lost = Arc::clone(&ready);
        device.set_device_lost_callback(move |reason, message| {
            lost.store(false, Ordering::SeqCst);
            tracing::error!(target: "render", ?reason, %message, "graphics device lost");
        });
        device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            tracing::error!(target: "render", %error, "uncaptured wgpu error");
        }));

        let info = adapter.get_info();
        tracing::info!(
            target: "render",
            adapter = %info.name,
            backend = ?info.backend,
            ?format,
            "wgpu backend created"
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_view,
            ready,
            next_id: 1,
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
        })
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn compiled(&self, handle: ShaderHandle) -> Result<&(wgpu::ShaderModule, CompiledStage), String> {
        let shader = self
            .shaders
            .get(&handle)
            .ok_or_else(|| format!("shader {} is not alive", handle.0))?;
        shader
            .compiled
            .as_ref()
            .ok_or_else(|| format!("attached {} shader did not compile", shader.stage))
    }

    fn acquire_frame(&self) -> RenderResult<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                self.surface.get_current_texture().map_err(surface_error)
            }
            Err(e) => Err(surface_error(e)),
        }
    }

    fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        commands: &[RenderCommand],
    ) -> RenderResult<()> {
        let (color, depth) = commands
            .iter()
            .find_map(|c| match c {
                RenderCommand::Clear { color, depth } => Some((*color, *depth)),
                _ => None,
            })
            .unwrap_or(([0.0, 0.0, 0.0, 1.0], 1.0));

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Hex Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: color[0] as f64,
                        g: color[1] as f64,
                        b: color[2] as f64,
                        a: color[3] as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let buffer = |handle: &BufferHandle| {
            self.buffers
                .get(handle)
                .ok_or_else(|| RenderError::Submission(format!("buffer {} is not alive", handle.0)))
        };

        for command in commands {
            match command {
                RenderCommand::Clear { .. } => {}
                RenderCommand::SetProgram { program } => {
                    let program = self.programs.get(program).ok_or_else(|| {
                        RenderError::Submission(format!("program {} is not alive", program.0))
                    })?;
                    pass.set_pipeline(&program.pipeline);
                    if let Some(uniforms) = &program.uniforms {
                        pass.set_bind_group(0, &uniforms.bind_group, &[]);
                    }
                }
                RenderCommand::SetVertexBuffer { slot, buffer: handle } => {
                    pass.set_vertex_buffer(*slot, buffer(handle)?.slice(..));
                }
                RenderCommand::SetIndexBuffer { buffer: handle, format } => {
                    pass.set_index_buffer(buffer(handle)?.slice(..), pipeline::index_format(*format));
                }
                RenderCommand::DrawIndexed {
                    index_count,
                    instance_count,
                } => {
                    pass.draw_indexed(0..*index_count, 0, 0..*instance_count);
                }
            }
        }
        Ok(())
    }
}

/// 只有显存耗尽不可恢复，其余情况跳过本帧
fn surface_error(error: wgpu::SurfaceError) -> RenderError {
    match error {
        wgpu::SurfaceError::OutOfMemory => RenderError::Surface(error.to_string()),
        _ => RenderError::FrameSkipped(error.to_string()),
    }
}

fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut usages = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::VERTEX) {
        usages |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        usages |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        usages |= wgpu::BufferUsages::COPY_DST;
    }
    usages
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle> {
        let limit = self.device.limits().max_buffer_size;
        if desc.size > limit {
            return Err(RenderError::BufferAllocation(format!(
                "{} bytes exceeds the device limit of {} bytes",
                desc.size, limit
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: buffer_usages(desc.usage),
            mapped_at_creation: false,
        });
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = validation.or(out_of_memory) {
            buffer.destroy();
            return Err(RenderError::BufferAllocation(error.to_string()));
        }

        let handle = BufferHandle(self.next_handle());
        self.buffers.insert(handle, buffer);
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        match self.buffers.get(&buffer) {
            Some(target) => self.queue.write_buffer(target, offset, data),
            None => {
                tracing::warn!(target: "render", buffer = buffer.0, "write to unknown buffer ignored")
            }
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buffer) = self.buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> ShaderCompilation {
        let (compiled, log) = match shader_compiler::compile_stage(stage, source) {
            Ok(reflection) => {
                let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(stage.as_str()),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
                (Some((module, reflection)), None)
            }
            Err(log) => (None, Some(log)),
        };
        let handle = ShaderHandle(self.next_handle());
        self.shaders.insert(handle, WgpuShader { stage, compiled });
        ShaderCompilation { handle, log }
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader);
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
        layouts: &[VertexLayout],
    ) -> Result<ProgramHandle, String> {
        let (vertex_module, vertex_stage) = self.compiled(vertex)?;
        let (fragment_module, fragment_stage) = self.compiled(fragment)?;
        let interface = shader_compiler::link_stages(vertex_stage, fragment_stage, layouts)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let uniform_bgl = interface
            .uniform_block
            .as_ref()
            .map(|block| PipelineBuilder::create_uniform_bind_group_layout(&self.device, block));
        let pipeline = PipelineBuilder::create_hex_pipeline(
            &self.device,
            &ProgramDescriptor {
                color_format: self.config.format,
                vertex_module,
                vertex_entry: &vertex_stage.entry_point,
                fragment_module,
                fragment_entry: &fragment_stage.entry_point,
                layouts,
            },
            uniform_bgl.as_ref(),
        );
        let uniforms = interface
            .uniform_block
            .as_ref()
            .zip(uniform_bgl.as_ref())
            .map(|(block, bgl)| PipelineBuilder::create_uniform_resources(&self.device, bgl, block));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(error.to_string());
        }

        let handle = ProgramHandle(self.next_handle());
        self.programs.insert(
            handle,
            WgpuProgram {
                pipeline,
                interface,
                uniforms,
            },
        );
        Ok(handle)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.interface.uniform_location(name)
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if self.programs.contains_key(&program) {
            self.current_program = Some(program);
        }
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32) {
        let Some(uniforms) = self
            .current_program
            .and_then(|p| self.programs.get(&p))
            .and_then(|p| p.uniforms.as_ref())
        else {
            return;
        };
        if location.0 as u64 + 4 <= uniforms.buffer.size() {
            self.queue
                .write_buffer(&uniforms.buffer, location.0 as u64, &value.to_le_bytes());
        }
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if let Some(removed) = self.programs.remove(&program) {
            if let Some(uniforms) = removed.uniforms {
                uniforms.buffer.destroy();
            }
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = PipelineBuilder::create_depth_view(&self.device, width, height);
    }

    fn submit(&mut self, commands: &[RenderCommand]) -> RenderResult<()> {
        if !self.is_ready() {
            return Err(RenderError::ContextNotReady);
        }
        let frame = self.acquire_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Hex Frame Encoder"),
            });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let encoded = self.encode(&mut encoder, &view, commands);
        self.queue.submit(std::iter::once(encoder.finish()));
        let error = pollster::block_on(self.device.pop_error_scope());
        frame.present();

        encoded?;
        match error {
            Some(error) => Err(RenderError::Submission(error.to_string())),
            None => Ok(()),
        }
    }
}
