//! 内存渲染后端
//!
//! 不依赖 GPU：缓冲区保存在内存中可随时回读，着色器经过与 wgpu 后端相同的 naga 前端，
//! 提交的命令按帧记录，绘制前会按绑定的缓冲区大小做越界检查。

use std::collections::HashMap;

use crate::core::error::{RenderError, RenderResult};
use crate::render::backend::{
    BufferDescriptor, BufferHandle, IndexFormat, ProgramHandle, RenderBackend, RenderCommand,
    ShaderCompilation, ShaderHandle, ShaderStage, UniformLocation, VertexLayout, VertexStepMode,
};
use crate::render::shader_compiler::{self, CompiledStage, LinkedInterface};

/// 与 wgpu 默认 `max_buffer_size` 一致
pub const DEFAULT_MAX_BUFFER_SIZE: u64 = 1 << 28;

struct HeadlessBuffer {
    data: Vec<u8>,
}

struct HeadlessShader {
    stage: ShaderStage,
    compiled: Option<CompiledStage>,
}

struct HeadlessProgram {
    interface: LinkedInterface,
    layouts: Vec<VertexLayout>,
    uniforms: Vec<u8>,
}

/// 一次实例化绘制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub index_count: u32,
    pub instance_count: u32,
}

/// 内存后端
pub struct HeadlessBackend {
    ready: bool,
    max_buffer_size: u64,
    pending_skips: u32,
    next_id: u64,
    buffers: HashMap<BufferHandle, HeadlessBuffer>,
    shaders: HashMap<ShaderHandle, HeadlessShader>,
    programs: HashMap<ProgramHandle, HeadlessProgram>,
    current_program: Option<ProgramHandle>,
    target_size: (u32, u32),
    frames: Vec<Vec<RenderCommand>>,
    draw_calls: Vec<DrawCall>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self {
            ready: true,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            pending_skips: 0,
            next_id: 1,
            buffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            target_size: (0, 0),
            frames: Vec::new(),
            draw_calls: Vec::new(),
        }
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟上下文可用/丢失
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// 单个缓冲区的最大字节数
    pub fn set_max_buffer_size(&mut self, size: u64) {
        self.max_buffer_size = size;
    }

    pub fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }

    /// 模拟表面超时：接下来 `count` 次提交返回 `FrameSkipped`
    pub fn skip_next_frames(&mut self, count: u32) {
        self.pending_skips = count;
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// 回读缓冲区内容
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.current_program
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    /// 读取程序 uniform 块中某个 f32 成员的当前值
    pub fn uniform_value(&self, program: ProgramHandle, name: &str) -> Option<f32> {
        let program = self.programs.get(&program)?;
        let offset = program.interface.uniform_location(name)?.0 as usize;
        let bytes = program.uniforms.get(offset..offset + 4)?;
        Some(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// 已提交的帧
    pub fn frames(&self) -> &[Vec<RenderCommand>] {
        &self.frames
    }

    /// 已执行的绘制调用（跨所有帧）
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// 清空帧记录
    pub fn clear_frames(&mut self) {
        self.frames.clear();
        self.draw_calls.clear();
    }

    fn compiled_stage(&self, handle: ShaderHandle) -> Result<&CompiledStage, String> {
        let shader = self
            .shaders
            .get(&handle)
            .ok_or_else(|| format!("shader {} is not alive", handle.0))?;
        shader
            .compiled
            .as_ref()
            .ok_or_else(|| format!("attached {} shader did not compile", shader.stage))
    }

    fn buffer_len(&self, buffer: BufferHandle) -> RenderResult<u64> {
        self.buffers
            .get(&buffer)
            .map(|b| b.data.len() as u64)
            .ok_or_else(|| RenderError::Submission(format!("buffer {} is not alive", buffer.0)))
    }

    fn max_index(&self, buffer: BufferHandle, format: IndexFormat, count: u32) -> Option<u32> {
        let data = &self.buffers.get(&buffer)?.data;
        let width = format.size() as usize;
        data.chunks_exact(width)
            .take(count as usize)
            .map(|chunk| match format {
                IndexFormat::Uint16 => u16::from_le_bytes([chunk[0], chunk[1]]) as u32,
                IndexFormat::Uint32 => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            })
            .max()
    }

    fn validate_draw(
        &self,
        program: Option<ProgramHandle>,
        vertex_buffers: &HashMap<u32, BufferHandle>,
        index_buffer: Option<(BufferHandle, IndexFormat)>,
        index_count: u32,
        instance_count: u32,
    ) -> RenderResult<ProgramHandle> {
        let program = program
            .ok_or_else(|| RenderError::Submission("draw issued without a program".into()))?;
        let layouts = &self
            .programs
            .get(&program)
            .ok_or_else(|| RenderError::Submission(format!("program {} is not alive", program.0)))?
            .layouts;
        let (index_buffer, format) = index_buffer
            .ok_or_else(|| RenderError::Submission("draw issued without an index buffer".into()))?;

        let index_bytes = index_count as u64 * format.size();
        if self.buffer_len(index_buffer)? < index_bytes {
            return Err(RenderError::Submission(format!(
                "index buffer holds fewer than {} indices",
                index_count
            )));
        }
        let vertex_count = self
            .max_index(index_buffer, format, index_count)
            .map_or(0, |max| max as u64 + 1);

        for (slot, layout) in layouts.iter().enumerate() {
            let slot = slot as u32;
            let buffer = vertex_buffers.get(&slot).copied().ok_or_else(|| {
                RenderError::Submission(format!("no vertex buffer bound at slot {}", slot))
            })?;
            let elements = match layout.step_mode {
                VertexStepMode::Vertex => vertex_count,
                VertexStepMode::Instance => instance_count as u64,
            };
            let required = elements * layout.stride;
            let available = self.buffer_len(buffer)?;
            if available < required {
                return Err(RenderError::Submission(format!(
                    "vertex buffer at slot {} holds {} bytes, draw reads {}",
                    slot, available, required
                )));
            }
        }
        Ok(program)
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> RenderResult<BufferHandle> {
        if desc.size > self.max_buffer_size {
            return Err(RenderError::BufferAllocation(format!(
                "{} bytes exceeds the {} byte buffer limit",
                desc.size, self.max_buffer_size
            )));
        }
        let handle = BufferHandle(self.next_handle());
        self.buffers.insert(
            handle,
            HeadlessBuffer {
                data: vec![0; desc.size as usize],
            },
        );
        Ok(handle)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(target) = self.buffers.get_mut(&buffer) else {
            tracing::warn!(target: "render", buffer = buffer.0, "write to unknown buffer ignored");
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > target.data.len() {
            tracing::warn!(
                target: "render",
                buffer = buffer.0,
                end,
                size = target.data.len(),
                "out-of-range buffer write ignored"
            );
            return;
        }
        target.data[start..end].copy_from_slice(data);
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> ShaderCompilation {
        let handle = ShaderHandle(self.next_handle());
        let (compiled, log) = match shader_compiler::compile_stage(stage, source) {
            Ok(compiled) => (Some(compiled), None),
            Err(log) => (None, Some(log)),
        };
        self.shaders.insert(handle, HeadlessShader { stage, compiled });
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
        let interface = shader_compiler::link_stages(
            self.compiled_stage(vertex)?,
            self.compiled_stage(fragment)?,
            layouts,
        )?;

        let handle = ProgramHandle(self.next_handle());
        let uniforms = vec![0; interface.uniform_block_size() as usize];
        self.programs.insert(
            handle,
            HeadlessProgram {
                interface,
                layouts: layouts.to_vec(),
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
        } else {
            tracing::warn!(target: "render", program = program.0, "use of unknown program ignored");
        }
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32) {
        let Some(program) = self
            .current_program
            .and_then(|p| self.programs.get_mut(&p))
        else {
            return;
        };
        let offset = location.0 as usize;
        if let Some(slot) = program.uniforms.get_mut(offset..offset + 4) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        self.target_size = (width, height);
    }

    fn submit(&mut self, commands: &[RenderCommand]) -> RenderResult<()> {
        if !self.ready {
            return Err(RenderError::ContextNotReady);
        }
        if self.pending_skips > 0 {
            self.pending_skips -= 1;
            return Err(RenderError::FrameSkipped("surface texture timed out".into()));
        }

        let mut program = None;
        let mut vertex_buffers = HashMap::new();
        let mut index_buffer = None;
        let mut draws = Vec::new();

        for command in commands {
            match command {
                RenderCommand::Clear { .. } => {}
                RenderCommand::SetProgram { program: p } => program = Some(*p),
                RenderCommand::SetVertexBuffer { slot, buffer } => {
                    vertex_buffers.insert(*slot, *buffer);
                }
                RenderCommand::SetIndexBuffer { buffer, format } => {
                    index_buffer = Some((*buffer, *format));
                }
                RenderCommand::DrawIndexed {
                    index_count,
                    instance_count,
                } => {
                    let program = self.validate_draw(
                        program,
                        &vertex_buffers,
                        index_buffer,
                        *index_count,
                        *instance_count,
                    )?;
                    draws.push(DrawCall {
                        program,
                        index_count: *index_count,
                        instance_count: *instance_count,
                    });
                }
            }
        }

        self.draw_calls.extend(draws);
        self.frames.push(commands.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backend::BufferUsage;
    use crate::render::shaders::{HEX_FRAGMENT_SHADER, HEX_VERTEX_SHADER};
    use crate::render::types::HEX_LAYOUTS;

    fn buffer(backend: &mut HeadlessBackend, size: u64) -> BufferHandle {
        backend.create_buffer(&BufferDescriptor {
            label: None,
            size,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        })
        .unwrap()
    }

    #[test]
    fn test_write_and_read_back() {
        let mut backend = HeadlessBackend::new();
        let handle = buffer(&mut backend, 8);
        backend.write_buffer(handle, 4, &[1, 2, 3, 4]);
        assert_eq!(backend.buffer_contents(handle), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));

        // 越界写入被忽略
        backend.write_buffer(handle, 6, &[9, 9, 9, 9]);
        assert_eq!(backend.buffer_contents(handle).unwrap()[6..], [3, 4]);

        backend.destroy_buffer(handle);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_program_uniforms() {
        let mut backend = HeadlessBackend::new();
        let vs = backend.compile_shader(ShaderStage::Vertex, HEX_VERTEX_SHADER);
        let fs = backend.compile_shader(ShaderStage::Fragment, HEX_FRAGMENT_SHADER);
        assert!(vs.succeeded() && fs.succeeded());

        let program = backend
            .link_program(vs.handle, fs.handle, &HEX_LAYOUTS)
            .unwrap();
        backend.use_program(program);
        let zoom = backend.uniform_location(program, "zoom").unwrap();
        backend.set_uniform_f32(zoom, 2.5);
        assert_eq!(backend.uniform_value(program, "zoom"), Some(2.5));
        assert_eq!(backend.uniform_value(program, "size_x"), Some(0.0));
    }

    #[test]
    fn test_link_rejects_failed_stage() {
        let mut backend = HeadlessBackend::new();
        let vs = backend.compile_shader(ShaderStage::Vertex, "not wgsl");
        let fs = backend.compile_shader(ShaderStage::Fragment, HEX_FRAGMENT_SHADER);
        assert!(!vs.succeeded());
        let err = backend
            .link_program(vs.handle, fs.handle, &HEX_LAYOUTS)
            .unwrap_err();
        assert!(err.contains("vertex"));
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_submit_requires_ready_context() {
        let mut backend = HeadlessBackend::new();
        backend.set_ready(false);
        let result = backend.submit(&[RenderCommand::Clear {
            color: [0.0; 4],
            depth: 1.0,
        }]);
        assert_eq!(result, Err(RenderError::ContextNotReady));
        assert!(backend.frames().is_empty());
    }

    #[test]
    fn test_draw_without_program_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let result = backend.submit(&[RenderCommand::DrawIndexed {
            index_count: 6,
            instance_count: 1,
        }]);
        assert!(matches!(result, Err(RenderError::Submission(_))));
    }

    #[test]
    fn test_buffer_limit() {
        let mut backend = HeadlessBackend::new();
        backend.set_max_buffer_size(16);
        let result = backend.create_buffer(&BufferDescriptor {
            label: None,
            size: 17,
            usage: BufferUsage::VERTEX,
        });
        assert!(matches!(result, Err(RenderError::BufferAllocation(_))));
        assert_eq!(backend.live_buffers(), 0);
        buffer(&mut backend, 16);
        assert_eq!(backend.live_buffers(), 1);
    }

    #[test]
    fn test_skipped_frames_are_not_recorded() {
        let mut backend = HeadlessBackend::new();
        backend.skip_next_frames(1);
        let clear = [RenderCommand::Clear {
            color: [0.0; 4],
            depth: 1.0,
        }];
        assert!(matches!(
            backend.submit(&clear),
            Err(RenderError::FrameSkipped(_))
        ));
        assert!(backend.frames().is_empty());
        assert!(backend.submit(&clear).is_ok());
        assert_eq!(backend.frames().len(), 1);
    }
}
