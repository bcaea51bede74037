//! 渲染模块测试
//!
//! 通过 `HeadlessBackend` 驱动完整的宿主协议。

#[cfg(test)]
mod tests {
    use crate::core::error::RenderError;
    use crate::grid::InstanceDataProvider;
    use crate::render::backend::{RenderCommand, ShaderStage};
    use crate::render::context::{ContextState, RenderContext};
    use crate::render::headless::HeadlessBackend;
    use crate::render::shaders::{HEX_FRAGMENT_SHADER, HEX_VERTEX_SHADER};
    use crate::render::types::{InstanceRecord, HEX_INDEX_ORDER};

    const RED: [f32; 3] = [1.0, 0.0, 0.0];
    const GREEN: [f32; 3] = [0.0, 1.0, 0.0];

    /// 红绿交替的棋盘
    struct Checkerboard;

    impl InstanceDataProvider for Checkerboard {
        fn instance_data(&self, width: u32, height: u32) -> Vec<InstanceRecord> {
            (0..height)
                .flat_map(|row| (0..width).map(move |col| (col, row)))
                .map(|(col, row)| {
                    let color = if (col + row) % 2 == 0 { RED } else { GREEN };
                    InstanceRecord::new([col as f32, row as f32], color)
                })
                .collect()
        }

        fn map_extent(&self, width: u32, height: u32) -> Option<(f32, f32)> {
            Some((width as f32, height as f32))
        }
    }

    /// 总是少给一条记录
    struct ShortProvider;

    impl InstanceDataProvider for ShortProvider {
        fn instance_data(&self, width: u32, height: u32) -> Vec<InstanceRecord> {
            vec![InstanceRecord::default(); (width * height).saturating_sub(1) as usize]
        }
    }

    fn ready_context() -> RenderContext<HeadlessBackend> {
        let mut context = RenderContext::new(HeadlessBackend::new());
        context.init(0).unwrap();
        context
    }

    fn instance_bytes(context: &RenderContext<HeadlessBackend>) -> Vec<u8> {
        let buffer = context.buffers().instance_buffer().unwrap();
        context.backend().buffer_contents(buffer).unwrap().to_vec()
    }

    // ========================================
    // 视口测试
    // ========================================

    #[test]
    fn test_aspect_ratio_is_exact() {
        let mut context = ready_context();
        let aspect = context.resize_viewport(1920, 1080).unwrap();
        assert_eq!(aspect, 1920.0 / 1080.0);

        let program = context.shader().program().unwrap();
        assert_eq!(
            context.backend().uniform_value(program, "aspect_ratio"),
            Some(1920.0 / 1080.0)
        );
    }

    #[test]
    fn test_zero_height_viewport() {
        let mut context = ready_context();
        context.resize_viewport(300, 100).unwrap();
        assert_eq!(
            context.resize_viewport(300, 0),
            Err(RenderError::DivideByZeroViewport)
        );
        assert_eq!(context.viewport().aspect_ratio, 3.0);
    }

    // ========================================
    // 实例数据测试
    // ========================================

    #[test]
    fn test_upload_round_trip() {
        let mut context = ready_context();
        context.allocate_instance_capacity(3).unwrap();
        let records = [
            InstanceRecord::new([0.5, 0.5], RED),
            InstanceRecord::new([1.5, 0.5], GREEN),
            InstanceRecord::new([1.0, 1.37], [0.2, 0.4, 0.6]),
        ];
        context.upload_instances(&records).unwrap();
        assert_eq!(
            instance_bytes(&context),
            bytemuck::cast_slice::<InstanceRecord, u8>(&records)
        );
    }

    #[test]
    fn test_mismatched_upload_is_rejected() {
        let mut context = ready_context();
        context.refresh_instances(&Checkerboard, 2, 2).unwrap();
        let before = instance_bytes(&context);

        let err = context
            .upload_instances(&[InstanceRecord::default(); 3])
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::BufferSizeMismatch {
                expected: 4,
                actual: 3
            }
        );
        assert_eq!(instance_bytes(&context), before);
        assert_eq!(context.buffers().capacity(), 4);
    }

    #[test]
    fn test_short_provider_is_rejected() {
        let mut context = ready_context();
        let generation = context.buffers().generation();
        assert_eq!(
            context.refresh_instances(&ShortProvider, 3, 3),
            Err(RenderError::BufferSizeMismatch {
                expected: 9,
                actual: 8
            })
        );
        assert_eq!(context.buffers().generation(), generation);
    }

    // ========================================
    // 绘制测试
    // ========================================

    #[test]
    fn test_zero_instances_issue_no_draw() {
        let mut context = ready_context();
        let stats = context.draw_frame().unwrap();
        assert_eq!(stats.draw_calls, 0);
        assert!(context.backend().draw_calls().is_empty());
        assert_eq!(context.backend().frames().len(), 1);
    }

    #[test]
    fn test_red_green_grid_scenario() {
        let mut context = ready_context();
        context.refresh_instances(&Checkerboard, 4, 5).unwrap();
        let stats = context.draw_frame().unwrap();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.instances, 20);

        let backend = context.backend();
        let draws = backend.draw_calls();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].index_count, 6);
        assert_eq!(draws[0].instance_count, 20);

        let index_buffer = context.buffers().index_buffer().unwrap();
        assert_eq!(
            backend.buffer_contents(index_buffer).unwrap(),
            bytemuck::cast_slice::<u32, u8>(&HEX_INDEX_ORDER)
        );

        let expected = Checkerboard.instance_data(4, 5);
        assert_eq!(expected[0].color, RED);
        assert_eq!(expected[1].color, GREEN);
        assert_eq!(
            instance_bytes(&context),
            bytemuck::cast_slice::<InstanceRecord, u8>(&expected)
        );

        let frame = &backend.frames()[0];
        assert!(matches!(frame[0], RenderCommand::Clear { .. }));
        assert!(frame.contains(&RenderCommand::SetVertexBuffer {
            slot: 1,
            buffer: context.buffers().instance_buffer().unwrap(),
        }));

        let program = context.shader().program().unwrap();
        assert_eq!(backend.uniform_value(program, "size_x"), Some(4.0));
        assert_eq!(backend.uniform_value(program, "size_y"), Some(5.0));
    }

    #[test]
    fn test_reallocation_rebinds_attributes() {
        let mut context = ready_context();
        context.refresh_instances(&Checkerboard, 4, 5).unwrap();
        let first = context.buffers().instance_buffer().unwrap();
        let generation = context.buffers().generation();

        context.refresh_instances(&Checkerboard, 5, 7).unwrap();
        let second = context.buffers().instance_buffer().unwrap();
        assert_ne!(first, second);
        assert_eq!(context.buffers().capacity(), 35);
        assert_eq!(context.buffers().generation(), generation + 1);

        let bindings = *context.buffers().bindings().unwrap();
        assert_eq!(bindings.instance, second);
        assert_eq!(Some(bindings.program), context.shader().program());

        assert_eq!(
            instance_bytes(&context),
            bytemuck::cast_slice::<InstanceRecord, u8>(&Checkerboard.instance_data(5, 7))
        );

        context.draw_frame().unwrap();
        let draw = context.backend().draw_calls()[0];
        assert_eq!(draw.instance_count, 35);
        assert!(context.backend().buffer_contents(first).is_none());
    }

    #[test]
    fn test_failed_reallocation_keeps_previous_map() {
        let mut context = ready_context();
        context.refresh_instances(&Checkerboard, 4, 5).unwrap();
        let buffer = context.buffers().instance_buffer();
        let generation = context.buffers().generation();
        let before = instance_bytes(&context);

        let limit = 30 * InstanceRecord::STRIDE;
        context.backend_mut().set_max_buffer_size(limit);
        assert!(matches!(
            context.refresh_instances(&Checkerboard, 5, 7),
            Err(RenderError::BufferAllocation(_))
        ));
        assert_eq!(context.buffers().instance_buffer(), buffer);
        assert_eq!(context.buffers().capacity(), 20);
        assert_eq!(context.buffers().generation(), generation);
        assert_eq!(instance_bytes(&context), before);

        let stats = context.draw_frame().unwrap();
        assert_eq!(stats.instances, 20);
    }

    #[test]
    fn test_same_count_refresh_keeps_buffer() {
        let mut context = ready_context();
        context.refresh_instances(&Checkerboard, 4, 5).unwrap();
        let buffer = context.buffers().instance_buffer();
        let generation = context.buffers().generation();

        context.refresh_instances(&Checkerboard, 5, 4).unwrap();
        assert_eq!(context.buffers().instance_buffer(), buffer);
        assert_eq!(context.buffers().generation(), generation);
    }

    #[test]
    fn test_draw_count_is_bounds_checked() {
        let mut context = ready_context();
        context.refresh_instances(&Checkerboard, 2, 2).unwrap();
        assert_eq!(
            context.draw_instances(5),
            Err(RenderError::InstanceCountExceedsCapacity {
                requested: 5,
                capacity: 4
            })
        );
        assert_eq!(context.draw_instances(3).unwrap().instances, 3);
    }

    // ========================================
    // 着色器测试
    // ========================================

    #[test]
    fn test_vertex_compile_error_is_reported() {
        let mut context = RenderContext::new(HeadlessBackend::new());
        context
            .set_shader_source("@vertex fn vs_main( -> {", HEX_FRAGMENT_SHADER)
            .unwrap();
        match context.init(4) {
            Err(RenderError::ShaderCompile { stage, log }) => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // 缓冲区可用，只是没有程序
        assert_eq!(context.state(), ContextState::Ready);
        assert_eq!(context.draw_frame().unwrap().draw_calls, 0);
    }

    #[test]
    fn test_fragment_compile_error_is_reported() {
        let mut context = ready_context();
        let broken = "@fragment fn fs_main() -> @location(0) vec4<f32> { return undefined; }";
        let err = context
            .set_shader_source(HEX_VERTEX_SHADER, broken)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::ShaderCompile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
    }

    #[test]
    fn test_relink_repushes_uniforms() {
        let mut context = ready_context();
        context.refresh_instances(&Checkerboard, 3, 3).unwrap();
        context.set_zoom(2.0).unwrap();
        context.resize_viewport(200, 100).unwrap();
        let old = context.shader().program().unwrap();

        context
            .set_shader_source(HEX_VERTEX_SHADER, HEX_FRAGMENT_SHADER)
            .unwrap();
        let new = context.shader().program().unwrap();
        assert_ne!(old, new);

        let backend = context.backend();
        assert_eq!(backend.uniform_value(new, "zoom"), Some(2.0));
        assert_eq!(backend.uniform_value(new, "aspect_ratio"), Some(2.0));
        assert_eq!(backend.uniform_value(new, "size_x"), Some(3.0));
        assert_eq!(context.buffers().bindings().unwrap().program, new);

        context.draw_frame().unwrap();
        assert_eq!(context.backend().draw_calls()[0].program, new);
    }

    // ========================================
    // 生命周期测试
    // ========================================

    #[test]
    fn test_init_requires_ready_backend() {
        let mut backend = HeadlessBackend::new();
        backend.set_ready(false);
        let mut context = RenderContext::new(backend);
        assert_eq!(context.init(4), Err(RenderError::ContextNotReady));
        assert_eq!(context.state(), ContextState::Created);
    }

    #[test]
    fn test_calls_before_init() {
        let mut context = RenderContext::new(HeadlessBackend::new());
        assert_eq!(context.draw_frame(), Err(RenderError::ContextNotReady));
        assert_eq!(
            context.refresh_instances(&Checkerboard, 1, 1),
            Err(RenderError::ContextNotReady)
        );
        // 视口参数可以提前设置
        context.resize_viewport(640, 480).unwrap();
        context.init(0).unwrap();
        let program = context.shader().program().unwrap();
        assert_eq!(
            context.backend().uniform_value(program, "aspect_ratio"),
            Some(640.0 / 480.0)
        );
    }

    #[test]
    fn test_double_init_is_rejected() {
        let mut context = ready_context();
        assert!(matches!(context.init(1), Err(RenderError::InvalidState(_))));
    }

    #[test]
    fn test_teardown_releases_everything_once() {
        let mut context = ready_context();
        context.refresh_instances(&Checkerboard, 4, 5).unwrap();
        context.teardown();
        context.teardown();

        assert_eq!(context.state(), ContextState::TornDown);
        assert_eq!(context.backend().live_buffers(), 0);
        assert_eq!(context.backend().live_programs(), 0);
        assert_eq!(context.backend().live_shaders(), 0);
        assert!(matches!(
            context.draw_frame(),
            Err(RenderError::InvalidState(_))
        ));
        assert!(context.set_zoom(1.0).is_err());
    }
}
