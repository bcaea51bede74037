//! 缓冲区管理
//!
//! 拥有三块缓冲区：
//! - 顶点缓冲区：六边形基础几何，初始化时写入一次
//! - 索引缓冲区：三角带索引，初始化时写入一次
//! - 实例缓冲区：每实例偏移 + 颜色，按需重新分配，每次刷新整体替换
//!
//! 实例缓冲区重新分配后，之前建立的属性绑定全部失效，必须重新调用 `bind_attributes`。

use crate::core::error::{RenderError, RenderResult};
use crate::grid::GeometryProvider;
use crate::render::backend::{
    BufferDescriptor, BufferHandle, BufferUsage, ProgramHandle, RenderBackend,
};
use crate::render::types::InstanceRecord;

/// 已建立的属性绑定
///
/// 槽位 0 为逐顶点的六边形坐标，槽位 1 为逐实例的偏移与颜色。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBindings {
    pub program: ProgramHandle,
    pub vertex: BufferHandle,
    pub instance: BufferHandle,
    pub index: BufferHandle,
    /// 建立绑定时的实例缓冲区代数
    pub generation: u64,
}

/// 缓冲区管理器
#[derive(Debug, Default)]
pub struct BufferManager {
    vertex_buffer: Option<BufferHandle>,
    index_buffer: Option<BufferHandle>,
    instance_buffer: Option<BufferHandle>,
    index_count: u32,
    capacity: usize,
    generation: u64,
    bindings: Option<AttributeBindings>,
    destroyed: bool,
}

impl BufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建并写入静态的顶点与索引缓冲区
    pub fn initialize<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        geometry: &impl GeometryProvider,
    ) -> RenderResult<()> {
        if self.destroyed {
            return Err(RenderError::InvalidState(
                "buffer manager has been destroyed".into(),
            ));
        }
        if !backend.is_ready() {
            return Err(RenderError::ContextNotReady);
        }
        if self.vertex_buffer.is_some() {
            return Err(RenderError::InvalidState(
                "buffer manager is already initialized".into(),
            ));
        }

        let vertices = geometry.hex_vertices();
        let indices = geometry.index_order();

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let vertex_buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("hex vertex buffer".into()),
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        })?;
        backend.write_buffer(vertex_buffer, 0, vertex_bytes);

        let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
        let index_buffer = match backend.create_buffer(&BufferDescriptor {
            label: Some("hex index buffer".into()),
            size: index_bytes.len() as u64,
            usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
        }) {
            Ok(buffer) => buffer,
            Err(err) => {
                backend.destroy_buffer(vertex_buffer);
                return Err(err);
            }
        };
        backend.write_buffer(index_buffer, 0, index_bytes);

        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        self.index_count = indices.len() as u32;

        tracing::debug!(
            target: "render",
            vertices = vertices.len(),
            indices = self.index_count,
            "hex geometry uploaded"
        );
        Ok(())
    }

    /// 为恰好 `count` 条记录分配实例缓冲区
    ///
    /// 旧缓冲区在新缓冲区创建后释放；绑定失效，代数加一。
    /// 创建失败时旧缓冲区、容量、代数与绑定都保持不变。
    pub fn allocate_instance_capacity<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        count: usize,
    ) -> RenderResult<()> {
        if !backend.is_ready() {
            return Err(RenderError::ContextNotReady);
        }
        if self.vertex_buffer.is_none() || self.destroyed {
            return Err(RenderError::InvalidState(
                "instance capacity requested before buffers were initialized".into(),
            ));
        }

        let buffer = backend.create_buffer(&BufferDescriptor {
            label: Some("hex instance buffer".into()),
            size: count as u64 * InstanceRecord::STRIDE,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        })?;
        if let Some(old) = self.instance_buffer.replace(buffer) {
            backend.destroy_buffer(old);
        }

        self.capacity = count;
        self.generation += 1;
        self.bindings = None;

        tracing::debug!(
            target: "render",
            capacity = count,
            generation = self.generation,
            "instance buffer allocated"
        );
        Ok(())
    }

    /// 整体替换实例缓冲区内容
    ///
    /// 记录数必须等于当前容量，否则不做任何 GPU 调用直接返回错误。
    pub fn upload_instances<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        records: &[InstanceRecord],
    ) -> RenderResult<()> {
        if records.len() != self.capacity {
            return Err(RenderError::BufferSizeMismatch {
                expected: self.capacity,
                actual: records.len(),
            });
        }
        if !backend.is_ready() {
            return Err(RenderError::ContextNotReady);
        }
        let buffer = self.instance_buffer.ok_or_else(|| {
            RenderError::InvalidState("no instance buffer has been allocated".into())
        })?;

        if !records.is_empty() {
            backend.write_buffer(buffer, 0, bytemuck::cast_slice(records));
        }
        Ok(())
    }

    /// 针对程序建立属性绑定
    ///
    /// 幂等：同一程序、同一代实例缓冲区上重复调用不产生变化。
    pub fn bind_attributes(&mut self, program: ProgramHandle) -> RenderResult<AttributeBindings> {
        let (Some(vertex), Some(instance), Some(index)) =
            (self.vertex_buffer, self.instance_buffer, self.index_buffer)
        else {
            return Err(RenderError::InvalidState(
                "attribute bindings need the vertex, index and instance buffers".into(),
            ));
        };

        if let Some(bindings) = self.bindings {
            if bindings.program == program && bindings.generation == self.generation {
                return Ok(bindings);
            }
        }

        let bindings = AttributeBindings {
            program,
            vertex,
            instance,
            index,
            generation: self.generation,
        };
        self.bindings = Some(bindings);
        tracing::debug!(
            target: "render",
            program = program.0,
            generation = self.generation,
            "instance attributes bound"
        );
        Ok(bindings)
    }

    /// 当前绑定，重新分配后为 `None`
    pub fn bindings(&self) -> Option<&AttributeBindings> {
        self.bindings.as_ref()
    }

    /// 实例缓冲区可容纳的记录数
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn instance_buffer(&self) -> Option<BufferHandle> {
        self.instance_buffer
    }

    pub fn vertex_buffer(&self) -> Option<BufferHandle> {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> Option<BufferHandle> {
        self.index_buffer
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// 实例缓冲区分配次数
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_initialized(&self) -> bool {
        self.vertex_buffer.is_some()
    }

    /// 释放全部缓冲区，重复调用无效果
    pub fn destroy<B: RenderBackend>(&mut self, backend: &mut B) {
        if self.destroyed {
            return;
        }
        for buffer in [
            self.vertex_buffer.take(),
            self.index_buffer.take(),
            self.instance_buffer.take(),
        ]
        .into_iter()
        .flatten()
        {
            backend.destroy_buffer(buffer);
        }
        self.bindings = None;
        self.capacity = 0;
        self.index_count = 0;
        self.destroyed = true;
        tracing::debug!(target: "render", "buffers destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::UnitHexGeometry;
    use crate::render::headless::HeadlessBackend;
    use crate::render::types::{HexVertex, HEX_INDEX_ORDER};

    fn initialized() -> (HeadlessBackend, BufferManager) {
        let mut backend = HeadlessBackend::new();
        let mut buffers = BufferManager::new();
        buffers.initialize(&mut backend, &UnitHexGeometry).unwrap();
        (backend, buffers)
    }

    #[test]
    fn test_initialize_uploads_geometry() {
        let (backend, buffers) = initialized();
        assert_eq!(buffers.index_count(), 6);

        let indices = backend.buffer_contents(buffers.index_buffer().unwrap()).unwrap();
        assert_eq!(indices, bytemuck::cast_slice::<u32, u8>(&HEX_INDEX_ORDER));

        let vertices = backend.buffer_contents(buffers.vertex_buffer().unwrap()).unwrap();
        let expected = UnitHexGeometry.hex_vertices();
        assert_eq!(vertices, bytemuck::cast_slice::<HexVertex, u8>(&expected));
    }

    #[test]
    fn test_initialize_twice_is_rejected() {
        let (mut backend, mut buffers) = initialized();
        let err = buffers.initialize(&mut backend, &UnitHexGeometry).unwrap_err();
        assert!(matches!(err, RenderError::InvalidState(_)));
        assert_eq!(backend.live_buffers(), 2);
    }

    #[test]
    fn test_initialize_requires_ready_context() {
        let mut backend = HeadlessBackend::new();
        backend.set_ready(false);
        let mut buffers = BufferManager::new();
        assert_eq!(
            buffers.initialize(&mut backend, &UnitHexGeometry),
            Err(RenderError::ContextNotReady)
        );
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_reallocation_releases_previous_buffer() {
        let (mut backend, mut buffers) = initialized();
        buffers.allocate_instance_capacity(&mut backend, 20).unwrap();
        let first = buffers.instance_buffer().unwrap();
        buffers.bind_attributes(ProgramHandle(99)).unwrap();

        buffers.allocate_instance_capacity(&mut backend, 35).unwrap();
        let second = buffers.instance_buffer().unwrap();

        assert_ne!(first, second);
        assert!(backend.buffer_contents(first).is_none());
        assert_eq!(backend.buffer_contents(second).unwrap().len(), 35 * 20);
        assert_eq!(backend.live_buffers(), 3);
        assert_eq!(buffers.generation(), 2);
        assert!(buffers.bindings().is_none());
    }

    #[test]
    fn test_oversized_allocation_keeps_state() {
        let (mut backend, mut buffers) = initialized();
        buffers.allocate_instance_capacity(&mut backend, 20).unwrap();
        let bindings = buffers.bind_attributes(ProgramHandle(99)).unwrap();
        let buffer = buffers.instance_buffer();

        backend.set_max_buffer_size(30 * InstanceRecord::STRIDE);
        let err = buffers
            .allocate_instance_capacity(&mut backend, 35)
            .unwrap_err();
        assert!(matches!(err, RenderError::BufferAllocation(_)));

        assert_eq!(buffers.capacity(), 20);
        assert_eq!(buffers.generation(), 1);
        assert_eq!(buffers.instance_buffer(), buffer);
        assert_eq!(buffers.bindings(), Some(&bindings));
        assert_eq!(backend.live_buffers(), 3);
    }

    #[test]
    fn test_initialize_failure_leaks_nothing() {
        let mut backend = HeadlessBackend::new();
        backend.set_max_buffer_size(2);
        let mut buffers = BufferManager::new();
        assert!(buffers.initialize(&mut backend, &UnitHexGeometry).is_err());
        assert_eq!(backend.live_buffers(), 0);
        assert!(!buffers.is_initialized());
    }

    #[test]
    fn test_upload_mismatch_leaves_buffer_untouched() {
        let (mut backend, mut buffers) = initialized();
        buffers.allocate_instance_capacity(&mut backend, 2).unwrap();
        let records = [InstanceRecord::new([1.0, 1.0], [1.0, 0.0, 0.0]); 2];
        buffers.upload_instances(&mut backend, &records).unwrap();

        let err = buffers
            .upload_instances(&mut backend, &records[..1])
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::BufferSizeMismatch {
                expected: 2,
                actual: 1
            }
        );
        let bytes = backend.buffer_contents(buffers.instance_buffer().unwrap()).unwrap();
        assert_eq!(bytes, bytemuck::cast_slice::<InstanceRecord, u8>(&records));
    }

    #[test]
    fn test_zero_capacity() {
        let (mut backend, mut buffers) = initialized();
        buffers.allocate_instance_capacity(&mut backend, 0).unwrap();
        assert_eq!(buffers.capacity(), 0);
        buffers.upload_instances(&mut backend, &[]).unwrap();
        let bytes = backend.buffer_contents(buffers.instance_buffer().unwrap()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_bind_attributes_is_idempotent() {
        let (mut backend, mut buffers) = initialized();
        assert!(buffers.bind_attributes(ProgramHandle(1)).is_err());

        buffers.allocate_instance_capacity(&mut backend, 4).unwrap();
        let first = buffers.bind_attributes(ProgramHandle(1)).unwrap();
        let second = buffers.bind_attributes(ProgramHandle(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.instance, buffers.instance_buffer().unwrap());
    }

    #[test]
    fn test_destroy_releases_everything_once() {
        let (mut backend, mut buffers) = initialized();
        buffers.allocate_instance_capacity(&mut backend, 4).unwrap();
        buffers.destroy(&mut backend);
        buffers.destroy(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
        assert!(buffers.initialize(&mut backend, &UnitHexGeometry).is_err());
    }
}
