//! Software implementation of [`GraphicsContext`].
//!
//! Textures are stored as linear RGBA floats; programs are the small textual kernels described
//! in [`program`]. Rendering is single-threaded and exact enough for pixel tests.

mod program;
mod raster;

use tracing::{debug, warn};

use self::program::{Kernel, SoftProgram, Stage, builtin_bytecode, parse_program};
use self::raster::{
    RasterVertex, ShadeInputs, SoftTexture, Texel, decode_row, raster_triangle, shade_compute,
    shade_fragment,
};
use super::{
    AddressMode, BlendHandle, BlendMode, BuiltinProgram, ComputeProgramHandle,
    ConstantBufferHandle, DeviceCaps, DeviceObject, DispatchCall, DrawCall, Filter, Format,
    FragmentProgramHandle, GraphicsContext, IndexBufferHandle, SamplerDesc, SamplerHandle,
    ShaderReflection, SurfaceRef, TextureDesc, TextureHandle, TextureUsage, UavHandle,
    VariableClass, VertexBufferHandle, VertexElementFormat, VertexFormatHandle, VertexLayout,
    VertexProgramHandle, VertexSemantic, Viewport,
};
use crate::foundation::core::{pack_argb, unpack_argb};
use crate::foundation::error::{ScanoutError, ScanoutResult};

/// Counters accumulated by a [`SoftContext`] since creation or the last
/// [`SoftContext::reset_stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SoftStats {
    /// Draw calls executed.
    pub draws: u64,
    /// Compute dispatches executed.
    pub dispatches: u64,
    /// Clears executed.
    pub clears: u64,
    /// Triangles submitted.
    pub triangles: u64,
    /// Vertex buffer writes.
    pub vertex_uploads: u64,
    /// Index buffer writes.
    pub index_uploads: u64,
    /// Constant buffer writes.
    pub constant_uploads: u64,
    /// Textures created.
    pub textures_created: u64,
    /// Programs created, all stages.
    pub programs_created: u64,
}

fn insert<T>(arena: &mut Vec<Option<T>>, value: T) -> u32 {
    arena.push(Some(value));
    (arena.len() - 1) as u32
}

fn lookup<T>(arena: &[Option<T>], raw: u32) -> Option<&T> {
    arena.get(raw as usize).and_then(Option::as_ref)
}

fn release<T>(arena: &mut [Option<T>], raw: u32) {
    if let Some(slot) = arena.get_mut(raw as usize) {
        *slot = None;
    }
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    bytes
        .get(offset..offset + 4)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .unwrap_or(0.0)
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect()
}

/// Headless [`GraphicsContext`] with an owned backbuffer.
///
/// The backbuffer is the default render target (`set_render_target(None, ..)`). Device loss can
/// be simulated with [`lose_device`](Self::lose_device); while lost, draws and dispatches fail
/// with [`ScanoutError::DeviceLost`] until [`reset`](Self::reset) discards every render target
/// and writable texture except the backbuffer.
pub struct SoftContext {
    caps: DeviceCaps,
    disabled_formats: Vec<Format>,
    textures: Vec<Option<SoftTexture>>,
    uavs: Vec<Option<TextureHandle>>,
    samplers: Vec<Option<SamplerDesc>>,
    blends: Vec<Option<BlendMode>>,
    vertex_formats: Vec<Option<VertexLayout>>,
    vertex_programs: Vec<Option<SoftProgram>>,
    fragment_programs: Vec<Option<SoftProgram>>,
    compute_programs: Vec<Option<SoftProgram>>,
    vertex_buffers: Vec<Option<Vec<u8>>>,
    index_buffers: Vec<Option<Vec<u16>>>,
    constant_buffers: Vec<Option<Vec<u8>>>,
    backbuffer: TextureHandle,
    target: Option<SurfaceRef>,
    viewport: Viewport,
    scopes: Vec<String>,
    lost: bool,
    stats: SoftStats,
}

impl SoftContext {
    /// Context whose backbuffer is `width x height` BGRA8.
    pub fn new(width: u32, height: u32) -> Self {
        let desc = TextureDesc::render_target(width.max(1), height.max(1), Format::Bgra8Unorm);
        Self {
            caps: DeviceCaps::default(),
            disabled_formats: Vec::new(),
            textures: vec![Some(SoftTexture::new(desc))],
            uavs: Vec::new(),
            samplers: Vec::new(),
            blends: Vec::new(),
            vertex_formats: Vec::new(),
            vertex_programs: Vec::new(),
            fragment_programs: Vec::new(),
            compute_programs: Vec::new(),
            vertex_buffers: Vec::new(),
            index_buffers: Vec::new(),
            constant_buffers: Vec::new(),
            backbuffer: TextureHandle::from_raw(0),
            target: None,
            viewport: Viewport::new(desc.width, desc.height),
            scopes: Vec::new(),
            lost: false,
            stats: SoftStats::default(),
        }
    }

    /// Replace the reported capabilities.
    pub fn with_caps(mut self, caps: DeviceCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Make `format` unsupported for every usage.
    pub fn disable_format(&mut self, format: Format) {
        if !self.disabled_formats.contains(&format) {
            self.disabled_formats.push(format);
        }
    }

    /// The default render target.
    pub fn backbuffer(&self) -> TextureHandle {
        self.backbuffer
    }

    /// Texel of mip 0 as `0xAARRGGBB`, clamped to 8 bits per channel.
    pub fn read_pixel(&self, texture: TextureHandle, x: u32, y: u32) -> Option<u32> {
        self.read_texel(texture, x, y).map(pack_argb)
    }

    /// Raw RGBA texel of mip 0.
    pub fn read_texel(&self, texture: TextureHandle, x: u32, y: u32) -> Option<[f32; 4]> {
        let tex = lookup(&self.textures, texture.raw())?;
        let (w, h) = tex.size(0);
        (x < w && y < h).then(|| tex.levels[0][(y * w + x) as usize])
    }

    /// Backbuffer texel as `0xAARRGGBB`.
    pub fn backbuffer_pixel(&self, x: u32, y: u32) -> Option<u32> {
        self.read_pixel(self.backbuffer, x, y)
    }

    /// Counters since creation or the last reset.
    pub fn stats(&self) -> SoftStats {
        self.stats
    }

    /// Zero all counters.
    pub fn reset_stats(&mut self) {
        self.stats = SoftStats::default();
    }

    /// Number of live textures, including the backbuffer.
    pub fn live_textures(&self) -> usize {
        self.textures.iter().filter(|t| t.is_some()).count()
    }

    /// Depth of open debug scopes.
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Simulate a lost device.
    pub fn lose_device(&mut self) {
        warn!("soft device lost");
        self.lost = true;
    }

    /// Recover from device loss; render targets and writable textures other than the
    /// backbuffer are discarded, the way a driver would on reset.
    pub fn reset(&mut self) {
        let backbuffer = self.backbuffer.raw() as usize;
        let mut discarded = 0usize;
        for (i, slot) in self.textures.iter_mut().enumerate() {
            let volatile = slot.as_ref().is_some_and(|t| {
                let usage = t.desc.usage;
                usage.contains(TextureUsage::RENDER) || usage.contains(TextureUsage::UAV)
            });
            if i != backbuffer && volatile {
                *slot = None;
                discarded += 1;
            }
        }
        self.uavs.iter_mut().for_each(|u| *u = None);
        self.target = None;
        self.lost = false;
        debug!(discarded, "soft device reset");
    }

    fn target_surface(&self) -> SurfaceRef {
        self.target
            .unwrap_or_else(|| SurfaceRef::level0(self.backbuffer))
    }

    fn create_program(
        arena: &mut Vec<Option<SoftProgram>>,
        stats: &mut SoftStats,
        bytecode: &[u8],
        stage: Stage,
    ) -> ScanoutResult<u32> {
        let program = parse_program(bytecode)?;
        if program.kernel.stage() != stage {
            return Err(ScanoutError::device(format!(
                "program kernel {:?} cannot be used as a {stage:?} program",
                program.kernel
            )));
        }
        stats.programs_created += 1;
        Ok(insert(arena, program))
    }

    fn bound_textures<'a>(
        &'a self,
        textures: &[Option<TextureHandle>],
        samplers: &[Option<SamplerHandle>],
    ) -> Vec<Option<(&'a SoftTexture, SamplerDesc)>> {
        let default_sampler = SamplerDesc::new(Filter::Bilinear, AddressMode::Clamp);
        textures
            .iter()
            .enumerate()
            .map(|(slot, handle)| {
                let tex = handle.and_then(|h| lookup(&self.textures, h.raw()))?;
                let sampler = samplers
                    .get(slot)
                    .copied()
                    .flatten()
                    .and_then(|s| lookup(&self.samplers, s.raw()).copied())
                    .unwrap_or(default_sampler);
                Some((tex, sampler))
            })
            .collect()
    }

    fn constants(&self, slots: &[Option<ConstantBufferHandle>], slot: usize) -> Vec<f32> {
        slots
            .get(slot)
            .copied()
            .flatten()
            .and_then(|h| lookup(&self.constant_buffers, h.raw()))
            .map(|b| floats(b))
            .unwrap_or_default()
    }

    fn clip_rect(&self, surface: SurfaceRef) -> Option<(i64, i64, i64, i64)> {
        let tex = lookup(&self.textures, surface.texture.raw())?;
        if surface.mip >= tex.desc.mip_levels {
            return None;
        }
        let (w, h) = tex.size(surface.mip);
        let vp = self.viewport;
        let x0 = i64::from(vp.x).max(0);
        let y0 = i64::from(vp.y).max(0);
        let x1 = (i64::from(vp.x) + i64::from(vp.width)).min(i64::from(w));
        let y1 = (i64::from(vp.y) + i64::from(vp.height)).min(i64::from(h));
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    fn store(&mut self, surface: SurfaceRef, writes: Vec<(u32, u32, Texel)>, blend: BlendMode) {
        if let Some(tex) = self
            .textures
            .get_mut(surface.texture.raw() as usize)
            .and_then(Option::as_mut)
        {
            for (x, y, texel) in writes {
                tex.store(surface.mip, x, y, texel, blend);
            }
        }
    }
}

// Position transform declared by a vertex program: `modelViewProj` in its slot-0 buffer.
fn vertex_transform(program: &SoftProgram, constants: &[f32]) -> Option<[f32; 16]> {
    let cb = program
        .reflection
        .constant_buffers
        .iter()
        .find(|cb| cb.slot == 0)?;
    let var = cb.variables.iter().find(|v| v.name == "modelViewProj")?;
    let VariableClass::Matrix { row_major, .. } = var.class else {
        return None;
    };
    let base = (var.offset / 4) as usize;
    let mut m = [0.0f32; 16];
    for (i, v) in m.iter_mut().enumerate() {
        *v = constants.get(base + i).copied().unwrap_or(0.0);
    }
    if !row_major {
        let t = m;
        for r in 0..4 {
            for c in 0..4 {
                m[r * 4 + c] = t[c * 4 + r];
            }
        }
    }
    Some(m)
}

fn fetch_vertex(
    layout: &VertexLayout,
    bytes: &[u8],
    base: usize,
    transform: Option<&[f32; 16]>,
    vp: Viewport,
) -> RasterVertex {
    let mut pos = [0.0, 0.0, 0.0, 1.0];
    let mut uv = [[0.0f32; 2]; 3];
    for e in &layout.elements {
        let at = base + e.offset as usize;
        match e.semantic {
            VertexSemantic::Position => {
                let n = match e.format {
                    VertexElementFormat::Float2 => 2,
                    VertexElementFormat::Float3 => 3,
                    VertexElementFormat::Float4 => 4,
                    VertexElementFormat::Unorm8x4 => 0,
                };
                for (i, p) in pos.iter_mut().enumerate().take(n) {
                    *p = read_f32(bytes, at + i * 4);
                }
            }
            VertexSemantic::TexCoord(set) if (set as usize) < uv.len() => {
                uv[set as usize] = [read_f32(bytes, at), read_f32(bytes, at + 4)];
            }
            _ => {}
        }
    }

    if let Some(m) = transform {
        let src = pos;
        for (c, p) in pos.iter_mut().enumerate() {
            *p = (0..4).map(|r| src[r] * m[r * 4 + c]).sum();
        }
    }

    let w = if pos[3] == 0.0 { 1.0 } else { pos[3] };
    RasterVertex {
        x: vp.x as f32 + (pos[0] / w + 1.0) * 0.5 * vp.width as f32,
        y: vp.y as f32 + (1.0 - pos[1] / w) * 0.5 * vp.height as f32,
        uv,
    }
}

impl GraphicsContext for SoftContext {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn is_format_supported(&self, format: Format, usage: TextureUsage) -> bool {
        if self.disabled_formats.contains(&format) {
            return false;
        }
        // Half floats cannot be uploaded, only rendered.
        !(format == Format::Rgba16Float && usage == TextureUsage::SHADER)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> ScanoutResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(ScanoutError::device(format!(
                "invalid texture size {}x{} ({} mips)",
                desc.width, desc.height, desc.mip_levels
            )));
        }
        if desc.width > self.caps.max_texture_width || desc.height > self.caps.max_texture_height
        {
            return Err(ScanoutError::device(format!(
                "texture {}x{} exceeds device limits",
                desc.width, desc.height
            )));
        }
        if !self.is_format_supported(desc.format, desc.usage) {
            return Err(ScanoutError::device(format!(
                "format {:?} unsupported",
                desc.format
            )));
        }
        self.stats.textures_created += 1;
        Ok(TextureHandle::from_raw(insert(
            &mut self.textures,
            SoftTexture::new(*desc),
        )))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip: u32,
        data: &[u8],
        pitch: usize,
    ) -> ScanoutResult<()> {
        let tex = self
            .textures
            .get_mut(texture.raw() as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| ScanoutError::device("write to unknown texture"))?;
        if mip >= tex.desc.mip_levels {
            return Err(ScanoutError::device(format!("mip {mip} out of range")));
        }
        let (w, h) = tex.size(mip);
        let row_bytes = w as usize * tex.desc.format.bytes_per_pixel();
        let needed = pitch * (h as usize - 1) + row_bytes;
        if pitch < row_bytes || data.len() < needed {
            return Err(ScanoutError::device(format!(
                "texture upload too small: {} bytes, need {needed}",
                data.len()
            )));
        }
        let format = tex.desc.format;
        let level = &mut tex.levels[mip as usize];
        for y in 0..h as usize {
            let src = &data[y * pitch..y * pitch + row_bytes];
            let dst = &mut level[y * w as usize..(y + 1) * w as usize];
            if !decode_row(format, src, dst) {
                return Err(ScanoutError::device(format!(
                    "uploads in {format:?} are not supported"
                )));
            }
        }
        Ok(())
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        lookup(&self.textures, texture.raw()).map(|t| t.desc)
    }

    fn create_uav(&mut self, texture: TextureHandle) -> ScanoutResult<UavHandle> {
        let desc = self
            .texture_desc(texture)
            .ok_or_else(|| ScanoutError::device("UAV over unknown texture"))?;
        if !self.caps.compute || !desc.usage.contains(TextureUsage::UAV) {
            return Err(ScanoutError::device("texture was not created for UAV use"));
        }
        Ok(UavHandle::from_raw(insert(&mut self.uavs, texture)))
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> ScanoutResult<SamplerHandle> {
        Ok(SamplerHandle::from_raw(insert(&mut self.samplers, *desc)))
    }

    fn create_blend_state(&mut self, mode: BlendMode) -> ScanoutResult<BlendHandle> {
        Ok(BlendHandle::from_raw(insert(&mut self.blends, mode)))
    }

    fn create_vertex_format(
        &mut self,
        layout: &VertexLayout,
    ) -> ScanoutResult<VertexFormatHandle> {
        if !layout
            .elements
            .iter()
            .any(|e| e.semantic == VertexSemantic::Position)
        {
            return Err(ScanoutError::device("vertex layout has no position"));
        }
        Ok(VertexFormatHandle::from_raw(insert(
            &mut self.vertex_formats,
            layout.clone(),
        )))
    }

    fn create_vertex_program(&mut self, bytecode: &[u8]) -> ScanoutResult<VertexProgramHandle> {
        Self::create_program(
            &mut self.vertex_programs,
            &mut self.stats,
            bytecode,
            Stage::Vertex,
        )
        .map(VertexProgramHandle::from_raw)
    }

    fn create_fragment_program(
        &mut self,
        bytecode: &[u8],
    ) -> ScanoutResult<FragmentProgramHandle> {
        Self::create_program(
            &mut self.fragment_programs,
            &mut self.stats,
            bytecode,
            Stage::Fragment,
        )
        .map(FragmentProgramHandle::from_raw)
    }

    fn create_compute_program(&mut self, bytecode: &[u8]) -> ScanoutResult<ComputeProgramHandle> {
        if !self.caps.compute {
            return Err(ScanoutError::device("compute programs are not supported"));
        }
        Self::create_program(
            &mut self.compute_programs,
            &mut self.stats,
            bytecode,
            Stage::Compute,
        )
        .map(ComputeProgramHandle::from_raw)
    }

    fn reflect_program(&self, bytecode: &[u8]) -> ScanoutResult<ShaderReflection> {
        parse_program(bytecode).map(|p| p.reflection)
    }

    fn builtin_program(&self, program: BuiltinProgram) -> &'static [u8] {
        builtin_bytecode(program)
    }

    fn create_vertex_buffer(&mut self, bytes: u32) -> ScanoutResult<VertexBufferHandle> {
        Ok(VertexBufferHandle::from_raw(insert(
            &mut self.vertex_buffers,
            vec![0; bytes as usize],
        )))
    }

    fn write_vertex_buffer(
        &mut self,
        buffer: VertexBufferHandle,
        offset: u32,
        data: &[u8],
    ) -> ScanoutResult<()> {
        let buf = self
            .vertex_buffers
            .get_mut(buffer.raw() as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| ScanoutError::device("write to unknown vertex buffer"))?;
        let dst = buf
            .get_mut(offset as usize..offset as usize + data.len())
            .ok_or_else(|| ScanoutError::device("vertex buffer write out of range"))?;
        dst.copy_from_slice(data);
        self.stats.vertex_uploads += 1;
        Ok(())
    }

    fn create_index_buffer(&mut self, indices: u32) -> ScanoutResult<IndexBufferHandle> {
        Ok(IndexBufferHandle::from_raw(insert(
            &mut self.index_buffers,
            vec![0; indices as usize],
        )))
    }

    fn write_index_buffer(
        &mut self,
        buffer: IndexBufferHandle,
        offset: u32,
        data: &[u16],
    ) -> ScanoutResult<()> {
        let buf = self
            .index_buffers
            .get_mut(buffer.raw() as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| ScanoutError::device("write to unknown index buffer"))?;
        let dst = buf
            .get_mut(offset as usize..offset as usize + data.len())
            .ok_or_else(|| ScanoutError::device("index buffer write out of range"))?;
        dst.copy_from_slice(data);
        self.stats.index_uploads += 1;
        Ok(())
    }

    fn create_constant_buffer(&mut self, bytes: u32) -> ScanoutResult<ConstantBufferHandle> {
        Ok(ConstantBufferHandle::from_raw(insert(
            &mut self.constant_buffers,
            vec![0; bytes as usize],
        )))
    }

    fn write_constant_buffer(
        &mut self,
        buffer: ConstantBufferHandle,
        data: &[u8],
    ) -> ScanoutResult<()> {
        let buf = self
            .constant_buffers
            .get_mut(buffer.raw() as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| ScanoutError::device("write to unknown constant buffer"))?;
        let dst = buf
            .get_mut(..data.len())
            .ok_or_else(|| ScanoutError::device("constant buffer write out of range"))?;
        dst.copy_from_slice(data);
        self.stats.constant_uploads += 1;
        Ok(())
    }

    fn destroy(&mut self, object: DeviceObject) {
        match object {
            DeviceObject::Texture(h) => {
                if h != self.backbuffer {
                    release(&mut self.textures, h.raw());
                }
            }
            DeviceObject::Uav(h) => release(&mut self.uavs, h.raw()),
            DeviceObject::Sampler(h) => release(&mut self.samplers, h.raw()),
            DeviceObject::Blend(h) => release(&mut self.blends, h.raw()),
            DeviceObject::VertexFormat(h) => release(&mut self.vertex_formats, h.raw()),
            DeviceObject::VertexProgram(h) => release(&mut self.vertex_programs, h.raw()),
            DeviceObject::FragmentProgram(h) => release(&mut self.fragment_programs, h.raw()),
            DeviceObject::ComputeProgram(h) => release(&mut self.compute_programs, h.raw()),
            DeviceObject::VertexBuffer(h) => release(&mut self.vertex_buffers, h.raw()),
            DeviceObject::IndexBuffer(h) => release(&mut self.index_buffers, h.raw()),
            DeviceObject::ConstantBuffer(h) => release(&mut self.constant_buffers, h.raw()),
        }
    }

    fn set_render_target(&mut self, target: Option<SurfaceRef>, _bypass_srgb: bool) {
        self.target = target.filter(|s| s.texture != self.backbuffer || s.mip != 0);
    }

    fn render_target(&self) -> Option<SurfaceRef> {
        self.target
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn clear(&mut self, color: u32) {
        self.stats.clears += 1;
        let surface = self.target_surface();
        let Some((x0, y0, x1, y1)) = self.clip_rect(surface) else {
            return;
        };
        let texel = unpack_argb(color);
        let mut writes = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
        for y in y0..y1 {
            for x in x0..x1 {
                writes.push((x as u32, y as u32, texel));
            }
        }
        self.store(surface, writes, BlendMode::Replace);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> ScanoutResult<()> {
        if self.lost {
            return Err(ScanoutError::DeviceLost);
        }
        let layout = lookup(&self.vertex_formats, call.vertex_format.raw())
            .ok_or_else(|| ScanoutError::device("draw with unknown vertex format"))?;
        let vp_program = lookup(&self.vertex_programs, call.vertex_program.raw())
            .ok_or_else(|| ScanoutError::device("draw with unknown vertex program"))?;
        let fp_program = lookup(&self.fragment_programs, call.fragment_program.raw())
            .ok_or_else(|| ScanoutError::device("draw with unknown fragment program"))?;
        let vertices = lookup(&self.vertex_buffers, call.vertex_buffer.raw())
            .ok_or_else(|| ScanoutError::device("draw with unknown vertex buffer"))?;
        let indices = lookup(&self.index_buffers, call.index_buffer.raw())
            .ok_or_else(|| ScanoutError::device("draw with unknown index buffer"))?;
        let blend = match call.blend {
            Some(h) => *lookup(&self.blends, h.raw())
                .ok_or_else(|| ScanoutError::device("draw with unknown blend state"))?,
            None => BlendMode::Replace,
        };

        let first = call.index_offset as usize;
        let index_range = indices
            .get(first..first + call.index_count as usize)
            .ok_or_else(|| ScanoutError::device("index range out of bounds"))?;
        let stride = layout.stride as usize;
        let vertex_end = call.vertex_offset as usize + call.vertex_count as usize * stride;
        if vertex_end > vertices.len() {
            return Err(ScanoutError::device("vertex range out of bounds"));
        }

        let surface = self.target_surface();
        let Some(clip) = self.clip_rect(surface) else {
            return Err(ScanoutError::device("render target is not a live texture"));
        };

        let vertex_constants = self.constants(call.vertex_constants, 0);
        let fragment_constants = self.constants(call.fragment_constants, 0);
        let transform = vertex_transform(vp_program, &vertex_constants);
        let inputs = ShadeInputs {
            textures: self.bound_textures(call.textures, call.samplers),
            constants: &fragment_constants,
        };
        let kernel: Kernel = fp_program.kernel;

        let mut writes = Vec::new();
        let mut triangles = 0u64;
        for tri in index_range.chunks_exact(3) {
            let mut corners = [RasterVertex {
                x: 0.0,
                y: 0.0,
                uv: [[0.0; 2]; 3],
            }; 3];
            for (corner, &index) in corners.iter_mut().zip(tri) {
                if u32::from(index) >= call.vertex_count {
                    return Err(ScanoutError::device(format!(
                        "index {index} exceeds vertex count {}",
                        call.vertex_count
                    )));
                }
                let base = call.vertex_offset as usize + usize::from(index) * stride;
                *corner = fetch_vertex(layout, vertices, base, transform.as_ref(), self.viewport);
            }
            triangles += 1;
            raster_triangle(corners, clip, |x, y, uv| {
                writes.push((x, y, shade_fragment(kernel, &inputs, uv)));
            });
        }
        self.stats.draws += 1;
        self.stats.triangles += triangles;
        self.store(surface, writes, blend);
        Ok(())
    }

    fn dispatch(&mut self, call: &DispatchCall<'_>) -> ScanoutResult<()> {
        if self.lost {
            return Err(ScanoutError::DeviceLost);
        }
        let program = lookup(&self.compute_programs, call.program.raw())
            .ok_or_else(|| ScanoutError::device("dispatch with unknown program"))?;
        let target = call
            .uavs
            .first()
            .copied()
            .flatten()
            .and_then(|u| lookup(&self.uavs, u.raw()).copied())
            .ok_or_else(|| ScanoutError::device("dispatch without a bound UAV"))?;
        let (w, h) = lookup(&self.textures, target.raw())
            .map(|t| t.size(0))
            .ok_or_else(|| ScanoutError::device("UAV texture was released"))?;

        let [tx, ty, _] = program.reflection.thread_group;
        let span_x = (call.groups[0] * tx).min(w);
        let span_y = (call.groups[1] * ty).min(h);
        let kernel = program.kernel;
        let constants = self.constants(call.constants, 0);
        let inputs = ShadeInputs {
            textures: self.bound_textures(call.textures, call.samplers),
            constants: &constants,
        };

        let mut writes = Vec::with_capacity((span_x * span_y) as usize);
        for y in 0..span_y {
            for x in 0..span_x {
                let uv = [(x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32];
                writes.push((x, y, shade_compute(kernel, &inputs, uv)));
            }
        }
        self.stats.dispatches += 1;
        self.store(SurfaceRef::level0(target), writes, BlendMode::Replace);
        Ok(())
    }

    fn begin_scope(&mut self, name: &str) {
        self.scopes.push(name.to_owned());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn is_device_lost(&self) -> bool {
        self.lost
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/device/soft.rs"]
mod tests;
