//! 每帧绘制驱动
//!
//! 维护视口 uniform（宽高比、地图尺寸、缩放），每帧清屏后发出一次实例化绘制。

use crate::core::error::{RenderError, RenderResult};
use crate::render::backend::{IndexFormat, RenderBackend, RenderCommand};
use crate::render::buffer::BufferManager;
use crate::render::shader::{ShaderManager, Uniform};
use crate::render::types::{INSTANCE_SLOT, VERTEX_SLOT};
use crate::render::view::ViewportState;

/// 默认背景色
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

/// 单帧统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub instances: u32,
}

/// 渲染驱动
#[derive(Debug, Clone)]
pub struct RenderDriver {
    viewport: ViewportState,
    clear_color: [f32; 4],
}

impl Default for RenderDriver {
    fn default() -> Self {
        Self::new(DEFAULT_CLEAR_COLOR)
    }
}

impl RenderDriver {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self {
            viewport: ViewportState::default(),
            clear_color,
        }
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// 视口尺寸变化
    ///
    /// 高度为 0 时返回错误，宽高比保持不变。
    pub fn resize_viewport<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        shader: &ShaderManager,
        width: u32,
        height: u32,
    ) -> RenderResult<f32> {
        if height == 0 {
            return Err(RenderError::DivideByZeroViewport);
        }
        let aspect_ratio = width as f32 / height as f32;
        self.viewport.aspect_ratio = aspect_ratio;
        backend.resize_target(width, height);
        shader.set_uniform(backend, Uniform::AspectRatio, aspect_ratio);
        Ok(aspect_ratio)
    }

    /// 地图逻辑尺寸变化
    pub fn resize_map<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        shader: &ShaderManager,
        size_x: f32,
        size_y: f32,
    ) {
        self.viewport.size_x = size_x;
        self.viewport.size_y = size_y;
        shader.set_uniform(backend, Uniform::SizeX, size_x);
        shader.set_uniform(backend, Uniform::SizeY, size_y);
    }

    pub fn set_zoom<B: RenderBackend>(&mut self, backend: &mut B, shader: &ShaderManager, zoom: f32) {
        self.viewport.zoom = zoom;
        shader.set_uniform(backend, Uniform::Zoom, zoom);
    }

    /// 重新推送全部 uniform（程序重新链接后调用）
    pub fn push_all<B: RenderBackend>(&self, backend: &mut B, shader: &ShaderManager) {
        let view = self.viewport;
        shader.set_uniform(backend, Uniform::AspectRatio, view.aspect_ratio);
        shader.set_uniform(backend, Uniform::SizeX, view.size_x);
        shader.set_uniform(backend, Uniform::SizeY, view.size_y);
        shader.set_uniform(backend, Uniform::Zoom, view.zoom);
    }

    /// 绘制一帧，实例数取自最近一次成功分配的容量
    pub fn draw_frame<B: RenderBackend>(
        &self,
        backend: &mut B,
        buffers: &BufferManager,
        shader: &ShaderManager,
    ) -> RenderResult<FrameStats> {
        self.draw_instances(backend, buffers, shader, buffers.capacity())
    }

    /// 以显式实例数绘制一帧，实例数不得超过容量
    pub fn draw_instances<B: RenderBackend>(
        &self,
        backend: &mut B,
        buffers: &BufferManager,
        shader: &ShaderManager,
        count: usize,
    ) -> RenderResult<FrameStats> {
        if count > buffers.capacity() {
            return Err(RenderError::InstanceCountExceedsCapacity {
                requested: count,
                capacity: buffers.capacity(),
            });
        }

        let mut commands = vec![RenderCommand::Clear {
            color: self.clear_color,
            depth: 1.0,
        }];
        let mut stats = FrameStats::default();

        if count == 0 {
            tracing::trace!(target: "render", "no instances; frame cleared only");
        } else {
            match (shader.program(), buffers.bindings()) {
                (Some(program), Some(bindings))
                    if bindings.program == program
                        && bindings.generation == buffers.generation() =>
                {
                    commands.extend([
                        RenderCommand::SetProgram { program },
                        RenderCommand::SetVertexBuffer {
                            slot: VERTEX_SLOT,
                            buffer: bindings.vertex,
                        },
                        RenderCommand::SetVertexBuffer {
                            slot: INSTANCE_SLOT,
                            buffer: bindings.instance,
                        },
                        RenderCommand::SetIndexBuffer {
                            buffer: bindings.index,
                            format: IndexFormat::Uint32,
                        },
                        RenderCommand::DrawIndexed {
                            index_count: buffers.index_count(),
                            instance_count: count as u32,
                        },
                    ]);
                    stats = FrameStats {
                        draw_calls: 1,
                        instances: count as u32,
                    };
                }
                (None, _) => {
                    tracing::warn!(target: "render", "no linked program; draw skipped");
                }
                _ => {
                    tracing::warn!(target: "render", "attribute bindings are stale; draw skipped");
                }
            }
        }

        backend.submit(&commands)?;
        Ok(stats)
    }
}
