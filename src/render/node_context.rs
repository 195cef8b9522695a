use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::{debug, warn};

use super::ring_cache::{CacheRange, RingCache};
use super::vertex::VertexKind;
use super::view::{RenderView, SoftViewport};
use crate::device::{
    AddressMode, BlendHandle, BlendMode, BuiltinProgram, ComputeProgramHandle, DeviceObject,
    Filter, Format, FragmentProgramHandle, GraphicsContext, IndexBufferHandle, SamplerDesc,
    SamplerHandle, SurfaceRef, TextureUsage, VertexBufferHandle, VertexFormatHandle,
    VertexProgramHandle,
};
use crate::foundation::error::ScanoutResult;
use crate::foundation::math::content_hash;

/// Construction options for [`NodeContext::init`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NodeContextOpts {
    /// Render in linear light when the device has sRGB render targets.
    pub prefer_linear: bool,
    /// Size of the shared vertex ring, in bytes.
    pub vertex_cache_bytes: u32,
    /// Size of the shared index ring, in 16-bit indices.
    pub index_cache_indices: u32,
}

impl Default for NodeContextOpts {
    fn default() -> Self {
        Self {
            prefer_linear: false,
            vertex_cache_bytes: 262_144,
            index_cache_indices: 16_384,
        }
    }
}

impl NodeContextOpts {
    pub fn with_prefer_linear(mut self, prefer_linear: bool) -> Self {
        self.prefer_linear = prefer_linear;
        self
    }

    pub fn with_vertex_cache_bytes(mut self, bytes: u32) -> Self {
        self.vertex_cache_bytes = bytes;
        self
    }

    pub fn with_index_cache_indices(mut self, indices: u32) -> Self {
        self.index_cache_indices = indices;
        self
    }
}

/// Tone shoulder applied by V2 bloom nodes.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BloomV2Settings {
    /// Input level that maps to full output.
    pub limit_x: f32,
    /// Slope of the curve at `limit_x`.
    pub limit_slope: f32,
    /// Input level where the linear segment ends.
    pub shoulder_x: f32,
    /// Output level at `shoulder_x`.
    pub shoulder_y: f32,
}

impl Default for BloomV2Settings {
    fn default() -> Self {
        Self {
            limit_x: 2.0,
            limit_slope: 0.0,
            shoulder_x: 0.5,
            shoulder_y: 0.5,
        }
    }
}

/// Texture formats chosen for the device at init.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatSet {
    /// General purpose RGBA; preferred for render targets.
    pub rgba: Format,
    /// RGBA with implicit sRGB conversion.
    pub rgba_srgb: Format,
    /// Target for passes that take gamma-space input and must produce sRGB-encoded output.
    pub rgba_gamma_to_srgb: Format,
    /// BGRA for uploads of `0xAARRGGBB` data without swizzling.
    pub bgra: Format,
    /// BGRA with implicit sRGB conversion.
    pub bgra_srgb: Format,
    /// Extended-range float format.
    pub hdr: Format,
}

fn select_formats(ctx: &dyn GraphicsContext, prefer_linear: bool) -> (FormatSet, bool) {
    let rt = TextureUsage::SHADER | TextureUsage::RENDER;
    let pick = |candidates: &[Format], fallback: Format| {
        candidates
            .iter()
            .copied()
            .find(|&f| ctx.is_format_supported(f, rt))
            .unwrap_or(fallback)
    };

    let bgra = Format::Bgra8Unorm;
    let rgba = pick(&[Format::Rgba8Unorm], bgra);
    let rgba_srgb = pick(&[Format::Rgba8UnormSrgb], rgba);
    let bgra_srgb = pick(&[Format::Bgra8UnormSrgb], bgra);
    let hdr = pick(&[Format::Rgba16Float, Format::Rgba32Float], rgba);
    let render_linear = prefer_linear && rgba_srgb.is_srgb();

    let formats = FormatSet {
        rgba,
        rgba_srgb,
        rgba_gamma_to_srgb: if render_linear { rgba_srgb } else { rgba },
        bgra,
        bgra_srgb,
        hdr,
    };
    (formats, render_linear)
}

/// Content-keyed program cache. Keys hash the bytecode; equality compares it in full.
struct ProgramCache<H> {
    entries: HashMap<u64, SmallVec<[(Box<[u8]>, H); 1]>>,
}

impl<H: Copy> ProgramCache<H> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.entries.values().map(|b| b.len()).sum()
    }

    fn get_or_create(
        &mut self,
        bytecode: &[u8],
        create: impl FnOnce(&[u8]) -> ScanoutResult<H>,
    ) -> ScanoutResult<H> {
        let bucket = self.entries.entry(content_hash(bytecode)).or_default();
        if let Some((_, h)) = bucket.iter().find(|(k, _)| **k == *bytecode) {
            return Ok(*h);
        }
        let h = create(bytecode)?;
        bucket.push((bytecode.into(), h));
        Ok(h)
    }

    fn drain(&mut self) -> impl Iterator<Item = H> + '_ {
        self.entries
            .drain()
            .flat_map(|(_, bucket)| bucket.into_iter().map(|(_, h)| h))
    }
}

/// Device objects every node shares.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SharedObjects {
    pub(crate) vertex_formats: [VertexFormatHandle; 3],
    pub(crate) vertex_programs: [VertexProgramHandle; 3],
    pub(crate) blit: FragmentProgramHandle,
    pub(crate) point: SamplerHandle,
    pub(crate) bilinear: SamplerHandle,
    pub(crate) bilinear_repeat_mip: SamplerHandle,
    pub(crate) border: SamplerHandle,
    pub(crate) over: BlendHandle,
}

/// Per-device state shared by every node: common programs and states, format choices, the vertex
/// and index rings, and program caches keyed by bytecode.
///
/// Created after the device and shut down before it; nodes borrow it for the duration of each
/// call.
pub struct NodeContext {
    opts: NodeContextOpts,
    shared: SharedObjects,
    formats: FormatSet,
    render_linear: bool,

    vertex_buffer: VertexBufferHandle,
    index_buffer: IndexBufferHandle,
    vertex_ring: RingCache,
    index_ring: RingCache,

    soft_viewport: SoftViewport,
    bypass_srgb: bool,

    vertex_programs: ProgramCache<VertexProgramHandle>,
    fragment_programs: ProgramCache<FragmentProgramHandle>,
    compute_programs: ProgramCache<ComputeProgramHandle>,

    trace_render_targets: bool,
    traced: Vec<SurfaceRef>,

    bloom_v2: BloomV2Settings,
    bloom_v2_generation: u32,

    shut_down: bool,
}

impl NodeContext {
    /// Create the shared device objects. Fails, releasing whatever was created, if any of them
    /// cannot be made.
    #[tracing::instrument(skip_all, fields(prefer_linear = opts.prefer_linear))]
    pub fn init(ctx: &mut dyn GraphicsContext, opts: NodeContextOpts) -> ScanoutResult<Self> {
        let mut created: Vec<DeviceObject> = Vec::new();
        match Self::create_shared(ctx, &opts, &mut created) {
            Ok((shared, vertex_buffer, index_buffer)) => {
                let (formats, render_linear) = select_formats(ctx, opts.prefer_linear);
                debug!(?formats, render_linear, "node context ready");
                Ok(Self {
                    opts,
                    shared,
                    formats,
                    render_linear,
                    vertex_buffer,
                    index_buffer,
                    vertex_ring: RingCache::new(opts.vertex_cache_bytes),
                    index_ring: RingCache::new(opts.index_cache_indices),
                    soft_viewport: SoftViewport::IDENTITY,
                    bypass_srgb: false,
                    vertex_programs: ProgramCache::new(),
                    fragment_programs: ProgramCache::new(),
                    compute_programs: ProgramCache::new(),
                    trace_render_targets: false,
                    traced: Vec::new(),
                    bloom_v2: BloomV2Settings::default(),
                    bloom_v2_generation: 0,
                    shut_down: false,
                })
            }
            Err(e) => {
                warn!(error = %e, "node context init failed");
                for obj in created {
                    ctx.destroy(obj);
                }
                Err(e)
            }
        }
    }

    fn create_shared(
        ctx: &mut dyn GraphicsContext,
        opts: &NodeContextOpts,
        created: &mut Vec<DeviceObject>,
    ) -> ScanoutResult<(SharedObjects, VertexBufferHandle, IndexBufferHandle)> {
        fn track<H: Copy + Into<DeviceObject>>(created: &mut Vec<DeviceObject>, h: H) -> H {
            created.push(h.into());
            h
        }

        let mut vertex_formats = [VertexFormatHandle::from_raw(0); 3];
        let mut vertex_programs = [VertexProgramHandle::from_raw(0); 3];
        for kind in VertexKind::ALL {
            let builtin = match kind {
                VertexKind::Tex1 => BuiltinProgram::VertexTex1,
                VertexKind::Tex2 => BuiltinProgram::VertexTex2,
                VertexKind::Tex3 => BuiltinProgram::VertexTex3,
            };
            vertex_formats[kind.slot()] =
                track(created, ctx.create_vertex_format(&kind.layout())?);
            let bytecode = ctx.builtin_program(builtin);
            vertex_programs[kind.slot()] = track(created, ctx.create_vertex_program(bytecode)?);
        }

        let bytecode = ctx.builtin_program(BuiltinProgram::FragmentBlit);
        let blit = track(created, ctx.create_fragment_program(bytecode)?);
        let point = track(
            created,
            ctx.create_sampler(&SamplerDesc::new(Filter::Point, AddressMode::Clamp))?,
        );
        let bilinear = track(
            created,
            ctx.create_sampler(&SamplerDesc::new(Filter::Bilinear, AddressMode::Clamp))?,
        );
        let bilinear_repeat_mip = track(
            created,
            ctx.create_sampler(&SamplerDesc::new(Filter::Trilinear, AddressMode::Wrap))?,
        );
        let border = track(
            created,
            ctx.create_sampler(&SamplerDesc::new(Filter::Bilinear, AddressMode::Border))?,
        );
        let over = track(
            created,
            ctx.create_blend_state(BlendMode::PremultipliedAlpha)?,
        );
        let vb = track(created, ctx.create_vertex_buffer(opts.vertex_cache_bytes)?);
        let ib = track(created, ctx.create_index_buffer(opts.index_cache_indices)?);

        Ok((
            SharedObjects {
                vertex_formats,
                vertex_programs,
                blit,
                point,
                bilinear,
                bilinear_repeat_mip,
                border,
                over,
            },
            vb,
            ib,
        ))
    }

    /// Release every device object owned by the context, including cached programs. Calling it
    /// again does nothing.
    pub fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let s = self.shared;
        for h in s.vertex_formats {
            ctx.destroy(h.into());
        }
        for h in s.vertex_programs {
            ctx.destroy(h.into());
        }
        for obj in [
            DeviceObject::from(s.blit),
            s.point.into(),
            s.bilinear.into(),
            s.bilinear_repeat_mip.into(),
            s.border.into(),
            s.over.into(),
            self.vertex_buffer.into(),
            self.index_buffer.into(),
        ] {
            ctx.destroy(obj);
        }
        for h in self.vertex_programs.drain() {
            ctx.destroy(h.into());
        }
        for h in self.fragment_programs.drain() {
            ctx.destroy(h.into());
        }
        for h in self.compute_programs.drain() {
            ctx.destroy(h.into());
        }
        self.traced.clear();
        debug!("node context shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn opts(&self) -> &NodeContextOpts {
        &self.opts
    }

    pub fn formats(&self) -> FormatSet {
        self.formats
    }

    /// Whether nodes should work in linear light.
    pub fn render_linear(&self) -> bool {
        self.render_linear
    }

    pub fn vertex_format(&self, kind: VertexKind) -> VertexFormatHandle {
        self.shared.vertex_formats[kind.slot()]
    }

    pub fn vertex_program(&self, kind: VertexKind) -> VertexProgramHandle {
        self.shared.vertex_programs[kind.slot()]
    }

    pub fn blit_program(&self) -> FragmentProgramHandle {
        self.shared.blit
    }

    pub fn point_sampler(&self) -> SamplerHandle {
        self.shared.point
    }

    pub fn bilinear_sampler(&self) -> SamplerHandle {
        self.shared.bilinear
    }

    pub fn bilinear_repeat_mip_sampler(&self) -> SamplerHandle {
        self.shared.bilinear_repeat_mip
    }

    pub fn border_sampler(&self) -> SamplerHandle {
        self.shared.border
    }

    /// Premultiplied-alpha "over" blend.
    pub fn over_blend(&self) -> BlendHandle {
        self.shared.over
    }

    pub(crate) fn vertex_cache_buffer(&self) -> VertexBufferHandle {
        self.vertex_buffer
    }

    pub(crate) fn index_cache_buffer(&self) -> IndexBufferHandle {
        self.index_buffer
    }

    /// Start a frame; with `trace` set, every render target applied until the next call is
    /// recorded.
    pub fn begin_scene(&mut self, trace: bool) {
        self.trace_render_targets = trace;
        self.traced.clear();
    }

    pub fn clear_trace(&mut self) {
        self.traced.clear();
    }

    /// Render targets applied since [`begin_scene`](Self::begin_scene), in first-use order.
    pub fn traced_render_targets(&self) -> &[SurfaceRef] {
        &self.traced
    }

    /// The view currently bound on `ctx`, with this context's soft viewport.
    pub fn capture_render_view(&self, ctx: &dyn GraphicsContext) -> RenderView {
        RenderView {
            target: ctx.render_target(),
            bypass_srgb: self.bypass_srgb,
            viewport: ctx.viewport(),
            soft_viewport: self.soft_viewport,
        }
    }

    /// Bind `view` on the device and adopt its soft viewport.
    pub fn apply_render_view(&mut self, ctx: &mut dyn GraphicsContext, view: &RenderView) {
        ctx.set_render_target(view.target, view.bypass_srgb);
        ctx.set_viewport(view.viewport);
        self.soft_viewport = view.soft_viewport;
        self.bypass_srgb = view.bypass_srgb;

        if self.trace_render_targets
            && let Some(target) = view.target
            && !self.traced.contains(&target)
        {
            self.traced.push(target);
        }
    }

    /// Bind `view` restricted to the pixel rectangle `area` of its viewport.
    pub fn apply_render_view_with_subrect(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        view: &RenderView,
        area: crate::foundation::core::Rect,
    ) {
        self.apply_render_view(ctx, &view.with_subrect(area));
    }

    pub fn soft_viewport(&self) -> SoftViewport {
        self.soft_viewport
    }

    /// Return the cached vertex program for `bytecode`, creating it on first use.
    pub fn init_vp(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        bytecode: &[u8],
    ) -> ScanoutResult<VertexProgramHandle> {
        self.vertex_programs
            .get_or_create(bytecode, |b| ctx.create_vertex_program(b))
    }

    /// Return the cached fragment program for `bytecode`, creating it on first use.
    pub fn init_fp(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        bytecode: &[u8],
    ) -> ScanoutResult<FragmentProgramHandle> {
        self.fragment_programs
            .get_or_create(bytecode, |b| ctx.create_fragment_program(b))
    }

    /// Return the cached compute program for `bytecode`, creating it on first use.
    pub fn init_cp(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        bytecode: &[u8],
    ) -> ScanoutResult<ComputeProgramHandle> {
        self.compute_programs
            .get_or_create(bytecode, |b| ctx.create_compute_program(b))
    }

    /// Number of cached (vertex, fragment, compute) programs.
    pub fn cached_program_counts(&self) -> (usize, usize, usize) {
        (
            self.vertex_programs.len(),
            self.fragment_programs.len(),
            self.compute_programs.len(),
        )
    }

    /// Append vertex bytes to the shared ring. `None` if `data` is larger than the ring or the
    /// upload failed.
    pub fn cache_vb(&mut self, ctx: &mut dyn GraphicsContext, data: &[u8]) -> Option<CacheRange> {
        let len = u32::try_from(data.len()).ok()?;
        let Some(range) = self.vertex_ring.reserve(len) else {
            warn!(len, capacity = self.vertex_ring.capacity(), "vertex data exceeds cache");
            return None;
        };
        match ctx.write_vertex_buffer(self.vertex_buffer, range.offset, data) {
            Ok(()) => Some(range),
            Err(e) => {
                warn!(error = %e, "vertex cache upload failed");
                None
            }
        }
    }

    /// Append indices to the shared ring. `None` if `data` is larger than the ring or the upload
    /// failed.
    pub fn cache_ib(&mut self, ctx: &mut dyn GraphicsContext, data: &[u16]) -> Option<CacheRange> {
        let len = u32::try_from(data.len()).ok()?;
        let Some(range) = self.index_ring.reserve(len) else {
            warn!(len, capacity = self.index_ring.capacity(), "index data exceeds cache");
            return None;
        };
        match ctx.write_index_buffer(self.index_buffer, range.offset, data) {
            Ok(()) => Some(range),
            Err(e) => {
                warn!(error = %e, "index cache upload failed");
                None
            }
        }
    }

    pub fn vertex_ring(&self) -> &RingCache {
        &self.vertex_ring
    }

    pub fn index_ring(&self) -> &RingCache {
        &self.index_ring
    }

    /// Forget everything in both rings, e.g. after the device discarded buffer contents.
    pub fn invalidate_caches(&mut self) {
        self.vertex_ring.invalidate();
        self.index_ring.invalidate();
    }

    pub fn bloom_v2_settings(&self) -> BloomV2Settings {
        self.bloom_v2
    }

    /// Replace the V2 bloom shoulder; every V2 bloom node rebuilds on its next draw.
    pub fn set_bloom_v2_settings(&mut self, settings: BloomV2Settings) {
        self.bloom_v2 = settings;
        self.bloom_v2_generation = self.bloom_v2_generation.wrapping_add(1);
    }

    /// Bumped by every [`set_bloom_v2_settings`](Self::set_bloom_v2_settings).
    pub fn bloom_v2_generation(&self) -> u32 {
        self.bloom_v2_generation
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/node_context.rs"]
mod tests;
