//! 渲染上下文
//!
//! 拥有后端与三个管理器，实现宿主调用的完整协议：
//!
//! ```text
//! new ──init──▶ Ready ──teardown / drop──▶ TornDown
//! ```
//!
//! 初始化时若着色器编译或链接失败，错误会返回给调用方，但上下文仍进入 `Ready`：
//! 缓冲区可用，之后可以通过 `set_shader_source` 修复。

use crate::config::GraphicsConfig;
use crate::core::error::{RenderError, RenderResult};
use crate::grid::{GeometryProvider, InstanceDataProvider, UnitHexGeometry};
use crate::render::backend::RenderBackend;
use crate::render::buffer::BufferManager;
use crate::render::driver::{FrameStats, RenderDriver};
use crate::render::shader::ShaderManager;
use crate::render::shaders::{HEX_FRAGMENT_SHADER, HEX_VERTEX_SHADER};
use crate::render::types::InstanceRecord;
use crate::render::view::ViewportState;

/// 上下文生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Ready,
    TornDown,
}

/// 渲染上下文
pub struct RenderContext<B: RenderBackend> {
    backend: B,
    buffers: BufferManager,
    shader: ShaderManager,
    driver: RenderDriver,
    state: ContextState,
}

impl<B: RenderBackend> RenderContext<B> {
    /// 使用内置着色器和默认背景色创建
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            buffers: BufferManager::new(),
            shader: ShaderManager::with_source(HEX_VERTEX_SHADER, HEX_FRAGMENT_SHADER),
            driver: RenderDriver::default(),
            state: ContextState::Created,
        }
    }

    /// 按图形配置创建（背景色）
    pub fn with_config(backend: B, config: &GraphicsConfig) -> Self {
        let mut context = Self::new(backend);
        context.driver.set_clear_color(config.clear_color);
        context
    }

    fn ensure_ready(&self) -> RenderResult<()> {
        match self.state {
            ContextState::Ready => Ok(()),
            ContextState::Created => Err(RenderError::ContextNotReady),
            ContextState::TornDown => Err(RenderError::InvalidState(
                "render context has been torn down".into(),
            )),
        }
    }

    fn ensure_alive(&self) -> RenderResult<()> {
        if self.state == ContextState::TornDown {
            return Err(RenderError::InvalidState(
                "render context has been torn down".into(),
            ));
        }
        Ok(())
    }

    /// 用内置六边形几何初始化
    pub fn init(&mut self, capacity: usize) -> RenderResult<()> {
        self.init_with_geometry(&UnitHexGeometry, capacity)
    }

    /// 创建缓冲区、分配实例容量并编译着色器
    pub fn init_with_geometry(
        &mut self,
        geometry: &impl GeometryProvider,
        capacity: usize,
    ) -> RenderResult<()> {
        if self.state != ContextState::Created {
            return Err(RenderError::InvalidState(
                "render context is already initialized".into(),
            ));
        }
        self.buffers.initialize(&mut self.backend, geometry)?;
        self.buffers
            .allocate_instance_capacity(&mut self.backend, capacity)?;
        self.state = ContextState::Ready;

        tracing::info!(
            target: "render",
            backend = self.backend.name(),
            capacity,
            "render context initialized"
        );
        self.relink()
    }

    /// 替换着色器源码；已初始化时立即重新编译链接
    pub fn set_shader_source(
        &mut self,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) -> RenderResult<()> {
        self.ensure_alive()?;
        self.shader.set_source(vertex, fragment)?;
        if self.state == ContextState::Ready {
            self.relink()?;
        }
        Ok(())
    }

    fn relink(&mut self) -> RenderResult<()> {
        let linked = self.shader.compile_and_link(&mut self.backend);
        // 失败时旧程序可能仍然可用
        self.rebind()?;
        if self.shader.program().is_some() {
            self.driver.push_all(&mut self.backend, &self.shader);
        }
        linked.map(|_| ())
    }

    fn rebind(&mut self) -> RenderResult<()> {
        if let Some(program) = self.shader.program() {
            if self.buffers.instance_buffer().is_some() {
                self.buffers.bind_attributes(program)?;
            }
        }
        Ok(())
    }

    /// 窗口尺寸变化，返回新的宽高比
    pub fn resize_viewport(&mut self, width: u32, height: u32) -> RenderResult<f32> {
        self.ensure_alive()?;
        self.driver
            .resize_viewport(&mut self.backend, &self.shader, width, height)
    }

    /// 地图逻辑尺寸变化
    pub fn resize_map(&mut self, size_x: f32, size_y: f32) -> RenderResult<()> {
        self.ensure_alive()?;
        self.driver
            .resize_map(&mut self.backend, &self.shader, size_x, size_y);
        Ok(())
    }

    pub fn set_zoom(&mut self, zoom: f32) -> RenderResult<()> {
        self.ensure_alive()?;
        self.driver.set_zoom(&mut self.backend, &self.shader, zoom);
        Ok(())
    }

    /// 从提供者拉取 `width * height` 条记录并上传
    ///
    /// 数量变化时先重新分配实例缓冲区并重建绑定；数量不变只做整体覆盖。
    /// 提供者给出外包尺寸时同时推送地图尺寸。
    pub fn refresh_instances(
        &mut self,
        provider: &impl InstanceDataProvider,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        self.ensure_ready()?;
        let expected = width as usize * height as usize;
        let records = provider.instance_data(width, height);
        if records.len() != expected {
            return Err(RenderError::BufferSizeMismatch {
                expected,
                actual: records.len(),
            });
        }

        if expected != self.buffers.capacity() {
            self.allocate_instance_capacity(expected)?;
        }
        self.buffers.upload_instances(&mut self.backend, &records)?;

        if let Some((size_x, size_y)) = provider.map_extent(width, height) {
            self.driver
                .resize_map(&mut self.backend, &self.shader, size_x, size_y);
        }
        tracing::debug!(target: "render", width, height, "instances refreshed");
        Ok(())
    }

    /// 重新分配实例缓冲区并重建绑定
    pub fn allocate_instance_capacity(&mut self, count: usize) -> RenderResult<()> {
        self.ensure_ready()?;
        self.buffers
            .allocate_instance_capacity(&mut self.backend, count)?;
        self.rebind()
    }

    /// 整体替换实例数据，数量必须等于当前容量
    pub fn upload_instances(&mut self, records: &[InstanceRecord]) -> RenderResult<()> {
        self.ensure_ready()?;
        self.buffers.upload_instances(&mut self.backend, records)
    }

    /// 绘制一帧
    pub fn draw_frame(&mut self) -> RenderResult<FrameStats> {
        self.ensure_ready()?;
        self.driver
            .draw_frame(&mut self.backend, &self.buffers, &self.shader)
    }

    /// 以显式实例数绘制一帧
    pub fn draw_instances(&mut self, count: usize) -> RenderResult<FrameStats> {
        self.ensure_ready()?;
        self.driver
            .draw_instances(&mut self.backend, &self.buffers, &self.shader, count)
    }

    /// 释放全部 GPU 资源，只执行一次
    pub fn teardown(&mut self) {
        if self.state == ContextState::TornDown {
            return;
        }
        self.buffers.destroy(&mut self.backend);
        self.shader.destroy(&mut self.backend);
        self.state = ContextState::TornDown;
        tracing::info!(target: "render", "render context torn down");
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn buffers(&self) -> &BufferManager {
        &self.buffers
    }

    pub fn shader(&self) -> &ShaderManager {
        &self.shader
    }

    pub fn viewport(&self) -> &ViewportState {
        self.driver.viewport()
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.driver.clear_color()
    }
}

impl<B: RenderBackend> Drop for RenderContext<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
