//! 六边形地图查看器
//!
//! 窗口、事件循环与渲染上下文之间的胶水层。
//!
//! 查看器的生命周期：
//! 1. **初始化**：加载配置、创建窗口与 wgpu 后端、生成地图并上传实例
//! 2. **运行**：处理输入，按需重绘
//! 3. **关闭**：释放 GPU 资源
//!
//! 按键：
//! - 滚轮：缩放
//! - `R`：重置缩放
//! - `G`：以新种子重新生成地形
//! - `+` / `-`：放大/缩小地图
//! - `Esc`：退出

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::config::graphics::MAX_INSTANCE_CAPACITY;
use crate::config::ViewerConfig;
use crate::core::error::{RenderError, RenderResult, ViewerError, ViewerResult};
use crate::grid::HexGrid;
use crate::render::backend::RenderBackend;
use crate::render::context::{ContextState, RenderContext};
use crate::render::view::ZoomLevel;
use crate::render::wgpu_modules::WgpuBackend;

/// `+` / `-` 每次改变的行列数
pub const MAP_RESIZE_STEP: u32 = 5;

/// 像素滚动量折算为一行
const PIXELS_PER_SCROLL_LINE: f64 = 40.0;

/// 用户操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerAction {
    /// 按滚轮行数缩放，正数放大
    Zoom(i32),
    ResetZoom,
    Regenerate,
    GrowMap,
    ShrinkMap,
    Exit,
}

impl ViewerAction {
    /// 按键映射
    pub fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(c) => match c.as_str() {
                "r" | "R" => Some(Self::ResetZoom),
                "g" | "G" => Some(Self::Regenerate),
                "+" | "=" => Some(Self::GrowMap),
                "-" | "_" => Some(Self::ShrinkMap),
                _ => None,
            },
            Key::Named(NamedKey::Escape) => Some(Self::Exit),
            _ => None,
        }
    }

    /// 滚轮映射，零行时不产生操作
    pub fn from_scroll(delta: &MouseScrollDelta) -> Option<Self> {
        let lines = match delta {
            MouseScrollDelta::LineDelta(_, y) => y.round() as i32,
            MouseScrollDelta::PixelDelta(position) => {
                (position.y / PIXELS_PER_SCROLL_LINE).round() as i32
            }
        };
        (lines != 0).then_some(Self::Zoom(lines))
    }
}

/// 地图与视图状态
///
/// 与窗口无关，任何后端上的上下文都可以驱动。
#[derive(Debug, Clone)]
pub struct MapSession {
    grid: HexGrid,
    zoom: ZoomLevel,
    seed: u64,
}

impl MapSession {
    pub fn new(size_x: u32, size_y: u32, seed: u64) -> Self {
        Self {
            grid: HexGrid::generate(size_x, size_y, seed),
            zoom: ZoomLevel::default(),
            seed,
        }
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn zoom(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 上传全部实例并推送缩放
    pub fn upload<B: RenderBackend>(&self, context: &mut RenderContext<B>) -> RenderResult<()> {
        context.refresh_instances(&self.grid, self.grid.size_x(), self.grid.size_y())?;
        context.set_zoom(self.zoom.factor())
    }

    /// 执行一个操作，返回是否需要重绘
    ///
    /// `Exit` 不在这里处理。
    pub fn apply<B: RenderBackend>(
        &mut self,
        action: ViewerAction,
        context: &mut RenderContext<B>,
    ) -> RenderResult<bool> {
        match action {
            ViewerAction::Zoom(lines) => {
                self.zoom.scroll(lines);
                context.set_zoom(self.zoom.factor())?;
            }
            ViewerAction::ResetZoom => {
                self.zoom.reset();
                context.set_zoom(self.zoom.factor())?;
            }
            ViewerAction::Regenerate => {
                self.seed = self.seed.wrapping_add(1);
                self.grid.regenerate(self.seed);
                self.upload(context)?;
            }
            ViewerAction::GrowMap => {
                let Some((size_x, size_y)) = grown_size(self.grid.size_x(), self.grid.size_y())
                else {
                    tracing::debug!(target: "viewer", "map already at instance limit");
                    return Ok(false);
                };
                self.resize(size_x, size_y, context)?;
            }
            ViewerAction::ShrinkMap => {
                let size_x = self.grid.size_x().saturating_sub(MAP_RESIZE_STEP).max(1);
                let size_y = self.grid.size_y().saturating_sub(MAP_RESIZE_STEP).max(1);
                if (size_x, size_y) == (self.grid.size_x(), self.grid.size_y()) {
                    return Ok(false);
                }
                self.resize(size_x, size_y, context)?;
            }
            ViewerAction::Exit => return Ok(false),
        }
        Ok(true)
    }

    fn resize<B: RenderBackend>(
        &mut self,
        size_x: u32,
        size_y: u32,
        context: &mut RenderContext<B>,
    ) -> RenderResult<()> {
        self.grid.resize(size_x, size_y, self.seed);
        tracing::info!(target: "viewer", size_x, size_y, "map resized");
        self.upload(context)
    }
}

/// 放大一步后的尺寸，超出 `MAX_INSTANCE_CAPACITY` 时为 `None`
fn grown_size(size_x: u32, size_y: u32) -> Option<(u32, u32)> {
    let size_x = size_x.checked_add(MAP_RESIZE_STEP)?;
    let size_y = size_y.checked_add(MAP_RESIZE_STEP)?;
    let area = size_x as u64 * size_y as u64;
    (area <= MAX_INSTANCE_CAPACITY as u64).then_some((size_x, size_y))
}

/// 绘制一帧，返回是否真正提交
///
/// 表面暂时不可用时跳过本帧，不视为错误。
pub fn present_frame<B: RenderBackend>(context: &mut RenderContext<B>) -> RenderResult<bool> {
    match context.draw_frame() {
        Ok(_) => Ok(true),
        Err(err) if err.is_transient() => {
            tracing::debug!(target: "viewer", %err, "frame skipped");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// 查看器入口
pub struct Viewer;

impl Viewer {
    /// 运行查看器直到窗口关闭
    pub fn run() -> ViewerResult<()> {
        let config = Self::load_config()?;
        Self::initialize_logging(&config);

        let event_loop = EventLoop::new()
            .map_err(|e| ViewerError::EventLoop(format!("Failed to create event loop: {}", e)))?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title("Hexmap Viewer")
                .with_inner_size(PhysicalSize::new(
                    config.graphics.resolution.width,
                    config.graphics.resolution.height,
                ))
                .build(&event_loop)
                .map_err(|e| ViewerError::Window(e.to_string()))?,
        );

        let size = window.inner_size();
        let backend = pollster::block_on(WgpuBackend::new(
            window.clone(),
            size.width,
            size.height,
            config.graphics.vsync,
        ))?;

        let mut context = RenderContext::with_config(backend, &config.graphics);
        let (vertex, fragment) = config.shaders.load_sources()?;
        context.set_shader_source(vertex, fragment)?;
        context.init(config.graphics.initial_capacity)?;

        let seed = config.map.seed.unwrap_or_else(rand::random);
        let session = MapSession::new(config.map.size_x, config.map.size_y, seed);
        session.upload(&mut context)?;
        if size.height > 0 {
            context.resize_viewport(size.width, size.height)?;
        }
        tracing::info!(
            target: "viewer",
            size_x = config.map.size_x,
            size_y = config.map.size_y,
            seed,
            "map ready"
        );

        Self::run_event_loop(event_loop, window, context, session)?;
        tracing::info!(target: "viewer", "Viewer shutting down");
        Ok(())
    }

    fn load_config() -> ViewerResult<ViewerConfig> {
        let mut config = ViewerConfig::load_or_default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `RUST_LOG` 优先，其次使用配置中的级别
    fn initialize_logging(config: &ViewerConfig) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_filter()));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        tracing::info!(target: "viewer", "Viewer starting");
    }

    fn run_event_loop(
        event_loop: EventLoop<()>,
        window: Arc<Window>,
        mut context: RenderContext<WgpuBackend>,
        mut session: MapSession,
    ) -> ViewerResult<()> {
        let failure: Rc<RefCell<Option<RenderError>>> = Rc::new(RefCell::new(None));
        let loop_failure = failure.clone();

        window.request_redraw();
        let result = event_loop.run(move |event, elwt| {
            elwt.set_control_flow(ControlFlow::Wait);
            if let Event::WindowEvent { event, .. } = event {
                if let Err(err) =
                    Self::handle_window_event(&event, &window, &mut context, &mut session, elwt)
                {
                    tracing::error!(target: "viewer", %err, "fatal render error");
                    loop_failure.borrow_mut().replace(err);
                    context.teardown();
                    elwt.exit();
                }
            }
        });

        result.map_err(|e| ViewerError::EventLoop(format!("Event loop error: {}", e)))?;
        let failure = failure.borrow_mut().take();
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// 处理窗口事件，只有不可恢复的错误才返回 `Err`
    fn handle_window_event(
        event: &WindowEvent,
        window: &Window,
        context: &mut RenderContext<WgpuBackend>,
        session: &mut MapSession,
        elwt: &EventLoopWindowTarget<()>,
    ) -> RenderResult<()> {
        // 退出请求之后仍可能收到事件
        if context.state() == ContextState::TornDown {
            return Ok(());
        }
        let action = match event {
            WindowEvent::CloseRequested => Some(ViewerAction::Exit),
            WindowEvent::Resized(size) => {
                match context.resize_viewport(size.width, size.height) {
                    Ok(aspect_ratio) => {
                        tracing::debug!(target: "viewer", aspect_ratio, "viewport resized");
                        window.request_redraw();
                    }
                    // 最小化
                    Err(RenderError::DivideByZeroViewport) => {}
                    Err(err) => return Err(err),
                }
                None
            }
            WindowEvent::RedrawRequested => {
                if !present_frame(context)? {
                    window.request_redraw();
                }
                None
            }
            WindowEvent::MouseWheel { delta, .. } => ViewerAction::from_scroll(delta),
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                ViewerAction::from_key(&event.logical_key)
            }
            _ => None,
        };

        match action {
            Some(ViewerAction::Exit) => {
                context.teardown();
                elwt.exit();
            }
            Some(action) => {
                tracing::debug!(target: "viewer", ?action, "input");
                if session.apply(action, context)? {
                    window.request_redraw();
                }
            }
            None => {}
        }
        Ok(())
    }
}
