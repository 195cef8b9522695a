use smallvec::SmallVec;
use tracing::{debug, warn};

use super::builders::{DispatchBuilder, MeshBuilder};
use super::node_context::NodeContext;
use super::pool::{PoolCommandIndex, PoolRenderViewId, PoolTextureIndex};
use super::ring_cache::CacheRange;
use super::vertex::VertexTransformer;
use super::view::{RenderView, SoftViewport};
use crate::device::{
    BlendHandle, ComputeProgramHandle, ConstantBufferHandle, DeviceObject, DispatchCall, DrawCall,
    Format, FragmentProgramHandle, GraphicsContext, SamplerHandle, SurfaceRef, TextureDesc,
    TextureHandle, TextureUsage, UavHandle, VertexFormatHandle, VertexProgramHandle, Viewport,
};
use crate::foundation::core::Rect;
use crate::foundation::math::align_up;

/// `start..start + count` into one of the list's slot tables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SlotRange {
    pub(crate) start: u32,
    pub(crate) count: u32,
}

impl SlotRange {
    pub(crate) fn range(self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.count) as usize
    }
}

/// Device constant buffer owned by the list.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConstantBlock {
    pub(crate) buffer: ConstantBufferHandle,
    pub(crate) len: usize,
}

pub(crate) type ConstantSlots = SmallVec<[Option<usize>; 2]>;

#[derive(Clone, Debug)]
pub(crate) struct MeshCommand {
    pub(crate) vertex_format: Option<VertexFormatHandle>,
    pub(crate) vertex_program: Option<VertexProgramHandle>,
    pub(crate) fragment_program: Option<FragmentProgramHandle>,
    pub(crate) blend: Option<BlendHandle>,

    pub(crate) textures: SlotRange,
    pub(crate) samplers: SlotRange,

    pub(crate) clear: Option<u32>,
    pub(crate) render_view: Option<PoolRenderViewId>,

    pub(crate) vs_constants: ConstantSlots,
    pub(crate) fs_constants: ConstantSlots,

    /// Words in `vertex_data`.
    pub(crate) vertex_source: SlotRange,
    pub(crate) vertex_size: u32,
    pub(crate) vertex_count: u32,
    pub(crate) index_source: SlotRange,

    pub(crate) vertex_cache: CacheRange,
    pub(crate) index_cache: CacheRange,
    pub(crate) last_soft_viewport: SoftViewport,
    pub(crate) transformer: Option<VertexTransformer>,
}

impl Default for MeshCommand {
    fn default() -> Self {
        Self {
            vertex_format: None,
            vertex_program: None,
            fragment_program: None,
            blend: None,
            textures: SlotRange::default(),
            samplers: SlotRange::default(),
            clear: None,
            render_view: None,
            vs_constants: SmallVec::new(),
            fs_constants: SmallVec::new(),
            vertex_source: SlotRange::default(),
            vertex_size: 0,
            vertex_count: 0,
            index_source: SlotRange::default(),
            vertex_cache: CacheRange::default(),
            index_cache: CacheRange::default(),
            last_soft_viewport: SoftViewport::NONE,
            transformer: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct DispatchCommand {
    pub(crate) program: Option<ComputeProgramHandle>,
    pub(crate) textures: SlotRange,
    pub(crate) samplers: SlotRange,
    pub(crate) uavs: SlotRange,
    pub(crate) constants: Option<usize>,
    pub(crate) groups: [u32; 3],
}

#[derive(Clone, Debug)]
pub(crate) enum Command {
    Mesh(MeshCommand),
    Dispatch(DispatchCommand),
}

/// A render view slot; targets named by pool texture are resolved at execution.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ViewSlot {
    pub(crate) view: RenderView,
    pub(crate) pool_target: Option<(PoolTextureIndex, u32)>,
}

/// Recorded, replayable batch of draws and dispatches.
///
/// Commands are recorded once through [`MeshBuilder`] and [`DispatchBuilder`] and replayed each
/// frame with [`execute_all`](Self::execute_all). Textures and render targets are bound through
/// pool indices, so rebinding a texture with [`set_texture`](Self::set_texture) changes what the
/// next replay reads without re-recording.
///
/// Failures while recording or executing set an error flag ([`is_ok`](Self::is_ok)) instead of
/// being returned; the frame should then be skipped.
#[derive(Debug, Default)]
pub struct CommandList {
    pub(crate) vertex_data: Vec<u32>,
    pub(crate) transformed: Vec<u32>,
    pub(crate) index_data: Vec<u16>,
    pub(crate) samplers: Vec<Option<SamplerHandle>>,
    pub(crate) textures: Vec<Option<TextureHandle>>,
    pub(crate) texture_slots: Vec<Option<PoolTextureIndex>>,
    pub(crate) constants: Vec<ConstantBlock>,
    pub(crate) commands: Vec<Command>,
    pub(crate) owned_textures: Vec<TextureHandle>,
    pub(crate) uavs: Vec<Option<UavHandle>>,
    pub(crate) render_views: Vec<ViewSlot>,
    pub(crate) error: bool,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// No recording or execution failure so far.
    pub fn is_ok(&self) -> bool {
        !self.error
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub(crate) fn fail(&mut self, what: &str) {
        warn!(what, "command list error");
        self.error = true;
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Index the next recorded command will get.
    pub fn next_command_index(&self) -> PoolCommandIndex {
        PoolCommandIndex::from_usize(self.commands.len()).unwrap_or_default()
    }

    /// Drop every command and table entry, releasing list-owned device objects.
    pub fn clear(&mut self, ctx: &mut dyn GraphicsContext) {
        for tex in self.owned_textures.drain(..) {
            ctx.destroy(tex.into());
        }
        for block in self.constants.drain(..) {
            ctx.destroy(block.buffer.into());
        }
        self.vertex_data.clear();
        self.transformed.clear();
        self.index_data.clear();
        self.samplers.clear();
        self.textures.clear();
        self.texture_slots.clear();
        self.commands.clear();
        self.uavs.clear();
        self.render_views.clear();
        self.error = false;
    }

    /// Release list-owned device objects; same as [`clear`](Self::clear).
    pub fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.clear(ctx);
    }

    /// Rebind a texture pool slot.
    pub fn set_texture(&mut self, index: PoolTextureIndex, texture: Option<TextureHandle>) {
        match self.textures.get_mut(index.to_usize()) {
            Some(slot) => *slot = texture,
            None => self.fail("set_texture on an unknown pool index"),
        }
    }

    /// Currently bound texture of a pool slot.
    pub fn texture(&self, index: PoolTextureIndex) -> Option<TextureHandle> {
        self.textures.get(index.to_usize()).copied().flatten()
    }

    /// Add a pool slot for an externally owned texture.
    pub fn register_texture(&mut self, texture: Option<TextureHandle>) -> PoolTextureIndex {
        match PoolTextureIndex::from_usize(self.textures.len()) {
            Some(index) => {
                self.textures.push(texture);
                index
            }
            None => {
                self.fail("texture pool exhausted");
                PoolTextureIndex::default()
            }
        }
    }

    /// Create a render-target texture owned by the list and add a pool slot for it. Compute
    /// capable devices also get UAV usage. On failure the slot is empty and the error flag is set.
    pub fn add_temp_texture(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        width: u32,
        height: u32,
        format: Format,
        mip_levels: u32,
    ) -> PoolTextureIndex {
        let mut usage = TextureUsage::SHADER | TextureUsage::RENDER;
        if ctx.caps().compute && ctx.is_format_supported(format, usage | TextureUsage::UAV) {
            usage = usage | TextureUsage::UAV;
        }
        let desc = TextureDesc {
            width,
            height,
            format,
            mip_levels: mip_levels.max(1),
            usage,
        };
        match ctx.create_texture(&desc) {
            Ok(tex) => {
                debug!(width, height, ?format, mip_levels, "temp texture");
                self.owned_textures.push(tex);
                self.register_texture(Some(tex))
            }
            Err(e) => {
                warn!(error = %e, width, height, ?format, "temp texture creation failed");
                self.error = true;
                self.register_texture(None)
            }
        }
    }

    pub(crate) fn push_view(&mut self, slot: ViewSlot) -> PoolRenderViewId {
        match PoolRenderViewId::from_usize(self.render_views.len()) {
            Some(id) => {
                self.render_views.push(slot);
                id
            }
            None => {
                self.fail("render view pool exhausted");
                PoolRenderViewId::default()
            }
        }
    }

    /// Add a render view slot.
    pub fn register_render_view(&mut self, view: RenderView) -> PoolRenderViewId {
        self.push_view(ViewSlot {
            view,
            pool_target: None,
        })
    }

    /// Replace a render view slot.
    pub fn set_render_view(&mut self, id: PoolRenderViewId, view: RenderView) {
        match self.render_views.get_mut(id.to_usize()) {
            Some(slot) => {
                *slot = ViewSlot {
                    view,
                    pool_target: None,
                }
            }
            None => self.fail("set_render_view on an unknown id"),
        }
    }

    /// Replace a render view slot with `view` restricted to the pixel rectangle `area`.
    pub fn set_render_view_with_subrect(
        &mut self,
        id: PoolRenderViewId,
        view: RenderView,
        area: Rect,
    ) {
        self.set_render_view(id, view.with_subrect(area));
    }

    /// Replace a render view slot with whatever is bound on the device right now.
    pub fn set_render_view_from_current(
        &mut self,
        id: PoolRenderViewId,
        ctx: &dyn GraphicsContext,
        dctx: &NodeContext,
    ) {
        self.set_render_view(id, dctx.capture_render_view(ctx));
    }

    /// Record a new draw.
    pub fn add_mesh<'a>(
        &'a mut self,
        ctx: &'a mut dyn GraphicsContext,
        dctx: &'a mut NodeContext,
    ) -> MeshBuilder<'a> {
        let index = self.commands.len();
        if PoolCommandIndex::from_usize(index).is_none() {
            self.fail("command pool exhausted");
        }
        self.commands.push(Command::Mesh(MeshCommand::default()));
        MeshBuilder::new(self, ctx, dctx, index)
    }

    /// Reopen a recorded draw for in-place changes. `None` if `index` is not a draw.
    pub fn update_mesh<'a>(
        &'a mut self,
        ctx: &'a mut dyn GraphicsContext,
        dctx: &'a mut NodeContext,
        index: PoolCommandIndex,
    ) -> Option<MeshBuilder<'a>> {
        match self.commands.get(index.to_usize()) {
            Some(Command::Mesh(_)) => Some(MeshBuilder::new(self, ctx, dctx, index.to_usize())),
            _ => None,
        }
    }

    /// Record a new compute dispatch.
    pub fn add_dispatch<'a>(
        &'a mut self,
        ctx: &'a mut dyn GraphicsContext,
        dctx: &'a mut NodeContext,
    ) -> DispatchBuilder<'a> {
        let index = self.commands.len();
        if PoolCommandIndex::from_usize(index).is_none() {
            self.fail("command pool exhausted");
        }
        self.commands.push(Command::Dispatch(DispatchCommand::default()));
        DispatchBuilder::new(self, ctx, dctx, index)
    }

    /// Overwrite the constants of a recorded dispatch.
    pub fn update_dispatch_constants(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        index: PoolCommandIndex,
        data: &[u8],
    ) {
        let block = match self.commands.get(index.to_usize()) {
            Some(Command::Dispatch(cmd)) => cmd.constants,
            _ => {
                self.fail("update_dispatch_constants on a non-dispatch command");
                return;
            }
        };
        match block {
            Some(block) => self.write_constants(ctx, block, data),
            None => self.fail("dispatch has no constant buffer to update"),
        }
    }

    /// Rebind one UAV slot of a recorded dispatch.
    pub fn update_dispatch_uav(&mut self, index: PoolCommandIndex, slot: u32, uav: Option<UavHandle>) {
        let range = match self.commands.get(index.to_usize()) {
            Some(Command::Dispatch(cmd)) if slot < cmd.uavs.count => cmd.uavs,
            _ => {
                self.fail("update_dispatch_uav out of range");
                return;
            }
        };
        self.uavs[range.start as usize + slot as usize] = uav;
    }

    /// Create a constant block holding `data`, padded to 16 bytes.
    pub(crate) fn create_constants(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        data: &[u8],
    ) -> Option<usize> {
        let Ok(len) = u32::try_from(data.len()) else {
            self.fail("constant data too large");
            return None;
        };
        let buffer = match ctx.create_constant_buffer(align_up(len.max(16), 16)) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(error = %e, "constant buffer creation failed");
                self.error = true;
                return None;
            }
        };
        if let Err(e) = ctx.write_constant_buffer(buffer, data) {
            warn!(error = %e, "constant upload failed");
            self.error = true;
        }
        self.constants.push(ConstantBlock {
            buffer,
            len: data.len(),
        });
        Some(self.constants.len() - 1)
    }

    pub(crate) fn write_constants(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        block: usize,
        data: &[u8],
    ) {
        let Some(&ConstantBlock { buffer, len }) = self.constants.get(block) else {
            self.fail("unknown constant block");
            return;
        };
        if data.len() > len {
            self.fail("constant update larger than the recorded block");
            return;
        }
        if let Err(e) = ctx.write_constant_buffer(buffer, data) {
            warn!(error = %e, "constant upload failed");
            self.error = true;
        }
    }

    /// Replay every command in order.
    pub fn execute_all(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext) {
        self.execute_span(ctx, dctx, 0, self.commands.len());
    }

    /// Replay `count` commands starting at `start`.
    pub fn execute(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        start: PoolCommandIndex,
        count: u32,
    ) {
        let start = start.to_usize();
        self.execute_span(ctx, dctx, start, start + count as usize);
    }

    /// Replay commands `start..end`.
    pub fn execute_range(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        start: PoolCommandIndex,
        end: PoolCommandIndex,
    ) {
        self.execute_span(ctx, dctx, start.to_usize(), end.to_usize());
    }

    fn execute_span(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        start: usize,
        end: usize,
    ) {
        let end = end.min(self.commands.len());
        for i in start..end {
            let ok = match &self.commands[i] {
                Command::Mesh(_) => self.execute_mesh(ctx, dctx, i),
                Command::Dispatch(_) => self.execute_dispatch(ctx, i),
            };
            if !ok {
                self.error = true;
            }
        }
    }

    fn resolve_view(&self, id: PoolRenderViewId) -> Option<RenderView> {
        let slot = self.render_views.get(id.to_usize())?;
        let mut view = slot.view;
        if let Some((pool, mip)) = slot.pool_target {
            let texture = self.texture(pool)?;
            view.target = Some(SurfaceRef { texture, mip });
        }
        Some(view)
    }

    fn resolve_textures(&self, range: SlotRange) -> SmallVec<[Option<TextureHandle>; 4]> {
        self.texture_slots[range.range()]
            .iter()
            .map(|slot| slot.and_then(|i| self.texture(i)))
            .collect()
    }

    fn execute_mesh(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        i: usize,
    ) -> bool {
        let Command::Mesh(cmd) = &self.commands[i] else {
            return false;
        };
        let cmd = cmd.clone();

        if let Some(id) = cmd.render_view {
            match self.resolve_view(id) {
                Some(view) => dctx.apply_render_view(ctx, &view),
                None => {
                    warn!(command = i, "render view has no live target");
                    return false;
                }
            }
        }
        if let Some(color) = cmd.clear {
            ctx.clear(color);
        }
        if cmd.vertex_count == 0 || cmd.index_source.count == 0 {
            return true;
        }

        let (Some(vertex_format), Some(vertex_program), Some(fragment_program)) =
            (cmd.vertex_format, cmd.vertex_program, cmd.fragment_program)
        else {
            warn!(command = i, "draw is missing a vertex format or program");
            return false;
        };

        let soft_viewport = dctx.soft_viewport();
        let mut vertex_cache = cmd.vertex_cache;
        let mut last_soft_viewport = cmd.last_soft_viewport;
        let moved = cmd.transformer.is_some() && soft_viewport != cmd.last_soft_viewport;
        if moved || !dctx.vertex_ring().is_valid(vertex_cache) {
            let src = &self.vertex_data[cmd.vertex_source.range()];
            let uploaded = match cmd.transformer {
                Some(transform) => {
                    self.transformed.clear();
                    self.transformed.resize(src.len(), 0);
                    if !transform(src, &mut self.transformed, soft_viewport.size, soft_viewport.offset) {
                        warn!(command = i, "vertex transform rejected the vertex data");
                        return false;
                    }
                    dctx.cache_vb(ctx, bytemuck::cast_slice(&self.transformed))
                }
                None => dctx.cache_vb(ctx, bytemuck::cast_slice(src)),
            };
            let Some(range) = uploaded else {
                return false;
            };
            vertex_cache = range;
            last_soft_viewport = soft_viewport;
        }

        let mut index_cache = cmd.index_cache;
        if !dctx.index_ring().is_valid(index_cache) {
            let Some(range) = dctx.cache_ib(ctx, &self.index_data[cmd.index_source.range()])
            else {
                return false;
            };
            index_cache = range;
        }

        if let Command::Mesh(stored) = &mut self.commands[i] {
            stored.vertex_cache = vertex_cache;
            stored.index_cache = index_cache;
            stored.last_soft_viewport = last_soft_viewport;
        }

        let textures = self.resolve_textures(cmd.textures);
        let constants = |slots: &ConstantSlots| -> SmallVec<[Option<ConstantBufferHandle>; 2]> {
            slots
                .iter()
                .map(|s| s.and_then(|b| self.constants.get(b)).map(|b| b.buffer))
                .collect()
        };
        let vertex_constants = constants(&cmd.vs_constants);
        let fragment_constants = constants(&cmd.fs_constants);

        let call = DrawCall {
            vertex_format,
            vertex_program,
            fragment_program,
            blend: cmd.blend,
            vertex_buffer: dctx.vertex_cache_buffer(),
            vertex_offset: vertex_cache.offset,
            vertex_count: cmd.vertex_count,
            index_buffer: dctx.index_cache_buffer(),
            index_offset: index_cache.offset,
            index_count: cmd.index_source.count,
            textures: &textures,
            samplers: &self.samplers[cmd.samplers.range()],
            vertex_constants: &vertex_constants,
            fragment_constants: &fragment_constants,
        };
        match ctx.draw(&call) {
            Ok(()) => true,
            Err(e) => {
                warn!(command = i, error = %e, "draw failed");
                false
            }
        }
    }

    fn execute_dispatch(&mut self, ctx: &mut dyn GraphicsContext, i: usize) -> bool {
        let Command::Dispatch(cmd) = &self.commands[i] else {
            return false;
        };
        let Some(program) = cmd.program else {
            warn!(command = i, "dispatch has no program");
            return false;
        };
        let textures = self.resolve_textures(cmd.textures);
        let constants: SmallVec<[Option<ConstantBufferHandle>; 1]> = cmd
            .constants
            .and_then(|b| self.constants.get(b))
            .map(|b| b.buffer)
            .into_iter()
            .map(Some)
            .collect();
        let call = DispatchCall {
            program,
            textures: &textures,
            samplers: &self.samplers[cmd.samplers.range()],
            uavs: &self.uavs[cmd.uavs.range()],
            constants: &constants,
            groups: cmd.groups,
        };
        match ctx.dispatch(&call) {
            Ok(()) => true,
            Err(e) => {
                warn!(command = i, error = %e, "dispatch failed");
                false
            }
        }
    }

    /// Viewport covering mip `mip` of a pool texture's current binding.
    pub(crate) fn pool_viewport(
        &self,
        ctx: &dyn GraphicsContext,
        texture: PoolTextureIndex,
        mip: u32,
    ) -> Option<Viewport> {
        let desc = ctx.texture_desc(self.texture(texture)?)?;
        Some(Viewport::new((desc.width >> mip).max(1), (desc.height >> mip).max(1)))
    }

    /// Destroy a texture through the list if it owns it.
    pub(crate) fn release_owned(&mut self, ctx: &mut dyn GraphicsContext, texture: TextureHandle) {
        if let Some(pos) = self.owned_textures.iter().position(|&t| t == texture) {
            self.owned_textures.swap_remove(pos);
            ctx.destroy(DeviceObject::Texture(texture));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/command_list.rs"]
mod tests;
