//! The graphics device contract the compositor renders through.
//!
//! Nothing in this crate talks to a GPU API directly. Everything goes through
//! [`GraphicsContext`], which a driver implements over its native API. [`SoftContext`] is a
//! complete software implementation used for headless rendering and tests.

mod desc;
mod reflect;
pub(crate) mod soft;

pub use desc::{
    AddressMode, BlendHandle, BlendMode, BuiltinProgram, ComputeProgramHandle,
    ConstantBufferHandle, DeviceCaps, DeviceObject, Filter, Format, FragmentProgramHandle,
    IndexBufferHandle, SamplerDesc, SamplerHandle, SurfaceRef, TextureDesc, TextureHandle,
    TextureUsage, UavHandle, VertexBufferHandle, VertexElement, VertexElementFormat,
    VertexFormatHandle, VertexLayout, VertexProgramHandle, VertexSemantic, Viewport,
};
pub use reflect::{
    ReflectedBinding, ReflectedConstantBuffer, ReflectedMember, ReflectedVariable,
    ShaderReflection, VariableClass,
};
pub use soft::{SoftContext, SoftStats};

use crate::foundation::error::ScanoutResult;

/// A fully resolved indexed draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawCall<'a> {
    /// Vertex input layout.
    pub vertex_format: VertexFormatHandle,
    /// Vertex program.
    pub vertex_program: VertexProgramHandle,
    /// Fragment program.
    pub fragment_program: FragmentProgramHandle,
    /// Blend state; `None` overwrites the target.
    pub blend: Option<BlendHandle>,
    /// Vertex source.
    pub vertex_buffer: VertexBufferHandle,
    /// Byte offset of vertex 0; indices are relative to it.
    pub vertex_offset: u32,
    /// Number of vertices addressable from `vertex_offset`.
    pub vertex_count: u32,
    /// Index source.
    pub index_buffer: IndexBufferHandle,
    /// First index, in indices.
    pub index_offset: u32,
    /// Index count; a multiple of 3 (triangle list).
    pub index_count: u32,
    /// Fragment texture slots.
    pub textures: &'a [Option<TextureHandle>],
    /// Fragment sampler slots.
    pub samplers: &'a [Option<SamplerHandle>],
    /// Vertex program constant buffer slots.
    pub vertex_constants: &'a [Option<ConstantBufferHandle>],
    /// Fragment program constant buffer slots.
    pub fragment_constants: &'a [Option<ConstantBufferHandle>],
}

/// A fully resolved compute dispatch.
#[derive(Clone, Copy, Debug)]
pub struct DispatchCall<'a> {
    /// Compute program.
    pub program: ComputeProgramHandle,
    /// Read-only texture slots.
    pub textures: &'a [Option<TextureHandle>],
    /// Sampler slots.
    pub samplers: &'a [Option<SamplerHandle>],
    /// Writable texture slots.
    pub uavs: &'a [Option<UavHandle>],
    /// Constant buffer slots.
    pub constants: &'a [Option<ConstantBufferHandle>],
    /// Thread group counts.
    pub groups: [u32; 3],
}

/// Graphics device abstraction consumed by the node graph.
///
/// All calls happen on the thread that owns the device; implementations need no internal
/// locking. Destroying an object that does not exist is a no-op.
pub trait GraphicsContext {
    /// Device capabilities.
    fn caps(&self) -> DeviceCaps;

    /// Whether `format` can be created with `usage`.
    fn is_format_supported(&self, format: Format, usage: TextureUsage) -> bool;

    /// Create an uninitialized texture.
    fn create_texture(&mut self, desc: &TextureDesc) -> ScanoutResult<TextureHandle>;

    /// Upload texels into `mip` of `texture`. `data` rows are `pitch` bytes apart and in the
    /// texture's format.
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip: u32,
        data: &[u8],
        pitch: usize,
    ) -> ScanoutResult<()>;

    /// Creation parameters of a live texture.
    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc>;

    /// Create a writable view over mip 0 of `texture`.
    fn create_uav(&mut self, texture: TextureHandle) -> ScanoutResult<UavHandle>;

    /// Create a sampler state object.
    fn create_sampler(&mut self, desc: &SamplerDesc) -> ScanoutResult<SamplerHandle>;

    /// Create a blend state object.
    fn create_blend_state(&mut self, mode: BlendMode) -> ScanoutResult<BlendHandle>;

    /// Create a vertex input layout.
    fn create_vertex_format(&mut self, layout: &VertexLayout)
    -> ScanoutResult<VertexFormatHandle>;

    /// Create a vertex program from device bytecode.
    fn create_vertex_program(&mut self, bytecode: &[u8]) -> ScanoutResult<VertexProgramHandle>;

    /// Create a fragment program from device bytecode.
    fn create_fragment_program(&mut self, bytecode: &[u8])
    -> ScanoutResult<FragmentProgramHandle>;

    /// Create a compute program from device bytecode.
    fn create_compute_program(&mut self, bytecode: &[u8]) -> ScanoutResult<ComputeProgramHandle>;

    /// Enumerate the uniforms, textures and samplers a program declares.
    fn reflect_program(&self, bytecode: &[u8]) -> ScanoutResult<ShaderReflection>;

    /// Bytecode for a built-in program in this device's native format.
    fn builtin_program(&self, program: BuiltinProgram) -> &'static [u8];

    /// Create a vertex buffer of `bytes` bytes.
    fn create_vertex_buffer(&mut self, bytes: u32) -> ScanoutResult<VertexBufferHandle>;

    /// Overwrite part of a vertex buffer.
    fn write_vertex_buffer(
        &mut self,
        buffer: VertexBufferHandle,
        offset: u32,
        data: &[u8],
    ) -> ScanoutResult<()>;

    /// Create an index buffer of `indices` 16-bit indices.
    fn create_index_buffer(&mut self, indices: u32) -> ScanoutResult<IndexBufferHandle>;

    /// Overwrite part of an index buffer; `offset` is in indices.
    fn write_index_buffer(
        &mut self,
        buffer: IndexBufferHandle,
        offset: u32,
        data: &[u16],
    ) -> ScanoutResult<()>;

    /// Create a constant buffer of `bytes` bytes.
    fn create_constant_buffer(&mut self, bytes: u32) -> ScanoutResult<ConstantBufferHandle>;

    /// Replace the start of a constant buffer's contents.
    fn write_constant_buffer(
        &mut self,
        buffer: ConstantBufferHandle,
        data: &[u8],
    ) -> ScanoutResult<()>;

    /// Release an object.
    fn destroy(&mut self, object: DeviceObject);

    /// Bind a render target; `None` binds the default (presentation) target.
    fn set_render_target(&mut self, target: Option<SurfaceRef>, bypass_srgb: bool);

    /// Currently bound render target; `None` is the default target.
    fn render_target(&self) -> Option<SurfaceRef>;

    /// Set the viewport.
    fn set_viewport(&mut self, viewport: Viewport);

    /// Current viewport.
    fn viewport(&self) -> Viewport;

    /// Fill the viewport area of the bound target with a `0xAARRGGBB` color.
    fn clear(&mut self, color: u32);

    /// Submit an indexed triangle-list draw.
    fn draw(&mut self, call: &DrawCall<'_>) -> ScanoutResult<()>;

    /// Submit a compute dispatch.
    fn dispatch(&mut self, call: &DispatchCall<'_>) -> ScanoutResult<()>;

    /// Open a named debug scope.
    fn begin_scope(&mut self, _name: &str) {}

    /// Close the innermost debug scope.
    fn end_scope(&mut self) {}

    /// Whether the device needs a reset before it can render again.
    fn is_device_lost(&self) -> bool {
        false
    }
}
