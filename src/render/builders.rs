use super::command_list::{Command, CommandList, DispatchCommand, MeshCommand, SlotRange, ViewSlot};
use super::node_context::NodeContext;
use super::pool::{PoolCommandIndex, PoolRenderViewId, PoolTextureIndex};
use super::ring_cache::CacheRange;
use super::vertex::{DisplayVertex, VertexKind, VertexTransformer, transform_vertices};
use super::view::{RenderView, SoftViewport};
use crate::device::{
    BlendHandle, ComputeProgramHandle, FragmentProgramHandle, GraphicsContext, SamplerHandle,
    UavHandle, VertexFormatHandle, VertexProgramHandle, Viewport,
};

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

/// Append `items` to `table`, or overwrite `current` in place when it has the same length.
fn store_slots<T: Copy>(table: &mut Vec<T>, current: SlotRange, items: &[T]) -> Option<SlotRange> {
    let count = u32::try_from(items.len()).ok()?;
    if current.count == count && count > 0 {
        table[current.range()].copy_from_slice(items);
        return Some(current);
    }
    let start = u32::try_from(table.len()).ok()?;
    table.extend_from_slice(items);
    Some(SlotRange { start, count })
}

/// Records or updates one draw in a [`CommandList`].
///
/// Obtained from [`CommandList::add_mesh`] or [`CommandList::update_mesh`]. Failures set the
/// list's error flag.
pub struct MeshBuilder<'a> {
    list: &'a mut CommandList,
    ctx: &'a mut dyn GraphicsContext,
    dctx: &'a mut NodeContext,
    index: usize,
}

impl<'a> MeshBuilder<'a> {
    pub(crate) fn new(
        list: &'a mut CommandList,
        ctx: &'a mut dyn GraphicsContext,
        dctx: &'a mut NodeContext,
        index: usize,
    ) -> Self {
        Self {
            list,
            ctx,
            dctx,
            index,
        }
    }

    fn cmd(&mut self) -> Option<&mut MeshCommand> {
        match self.list.commands.get_mut(self.index) {
            Some(Command::Mesh(cmd)) => Some(cmd),
            _ => None,
        }
    }

    fn edit(&mut self, f: impl FnOnce(&mut MeshCommand)) -> &mut Self {
        match self.cmd() {
            Some(cmd) => f(cmd),
            None => self.list.fail("mesh builder lost its command"),
        }
        self
    }

    /// Index of the command being built.
    pub fn command_index(&self) -> PoolCommandIndex {
        PoolCommandIndex::from_usize(self.index).unwrap_or_default()
    }

    /// Use the shared vertex format and program for `kind`.
    pub fn set_vertex_kind(&mut self, kind: VertexKind) -> &mut Self {
        let format = self.dctx.vertex_format(kind);
        let program = self.dctx.vertex_program(kind);
        self.edit(|c| {
            c.vertex_format = Some(format);
            c.vertex_program = Some(program);
        })
    }

    pub fn set_vertex_format(&mut self, format: VertexFormatHandle) -> &mut Self {
        self.edit(|c| c.vertex_format = Some(format))
    }

    pub fn set_vertex_program(&mut self, program: VertexProgramHandle) -> &mut Self {
        self.edit(|c| c.vertex_program = Some(program))
    }

    /// Use the node context's cached program for `bytecode`.
    pub fn set_vertex_program_bytecode(&mut self, bytecode: &[u8]) -> &mut Self {
        match self.dctx.init_vp(self.ctx, bytecode) {
            Ok(program) => self.set_vertex_program(program),
            Err(e) => {
                self.list.fail(&format!("vertex program: {e}"));
                self
            }
        }
    }

    pub fn set_fragment_program(&mut self, program: FragmentProgramHandle) -> &mut Self {
        self.edit(|c| c.fragment_program = Some(program))
    }

    /// Use the node context's cached program for `bytecode`.
    pub fn set_fragment_program_bytecode(&mut self, bytecode: &[u8]) -> &mut Self {
        match self.dctx.init_fp(self.ctx, bytecode) {
            Ok(program) => self.set_fragment_program(program),
            Err(e) => {
                self.list.fail(&format!("fragment program: {e}"));
                self
            }
        }
    }

    fn set_const_data(&mut self, data: &[u8], slot: usize, fragment: bool) -> &mut Self {
        let Some(block) = self.list.create_constants(self.ctx, data) else {
            return self;
        };
        self.edit(|c| {
            let slots = if fragment {
                &mut c.fs_constants
            } else {
                &mut c.vs_constants
            };
            if slots.len() <= slot {
                slots.resize(slot + 1, None);
            }
            slots[slot] = Some(block);
        })
    }

    fn update_const_data(&mut self, data: &[u8], slot: usize, fragment: bool) -> &mut Self {
        let block = self.cmd().and_then(|c| {
            let slots = if fragment {
                &c.fs_constants
            } else {
                &c.vs_constants
            };
            slots.get(slot).copied().flatten()
        });
        match block {
            Some(block) => {
                self.list.write_constants(self.ctx, block, data);
                self
            }
            None => self.set_const_data(data, slot, fragment),
        }
    }

    fn reuse_const_data(&mut self, fragment: bool) -> &mut Self {
        let previous = self.index.checked_sub(1).and_then(|i| match &self.list.commands[i] {
            Command::Mesh(prev) => Some(if fragment {
                prev.fs_constants.clone()
            } else {
                prev.vs_constants.clone()
            }),
            Command::Dispatch(_) => None,
        });
        match previous {
            Some(slots) => self.edit(|c| {
                if fragment {
                    c.fs_constants = slots;
                } else {
                    c.vs_constants = slots;
                }
            }),
            None => {
                self.list.fail("constant reuse without a previous draw");
                self
            }
        }
    }

    /// Give vertex constant slot `slot` a new buffer holding `data`.
    pub fn set_vp_const_data(&mut self, data: &[u8], slot: usize) -> &mut Self {
        self.set_const_data(data, slot, false)
    }

    pub fn set_vp_constants<T: bytemuck::Pod>(&mut self, value: &T, slot: usize) -> &mut Self {
        self.set_vp_const_data(bytemuck::bytes_of(value), slot)
    }

    /// Share the previous draw's vertex constant buffers.
    pub fn set_vp_const_data_reuse(&mut self) -> &mut Self {
        self.reuse_const_data(false)
    }

    /// Overwrite the buffer in vertex constant slot `slot`, creating it if absent.
    pub fn update_vp_const_data(&mut self, data: &[u8], slot: usize) -> &mut Self {
        self.update_const_data(data, slot, false)
    }

    /// Give fragment constant slot `slot` a new buffer holding `data`.
    pub fn set_fp_const_data(&mut self, data: &[u8], slot: usize) -> &mut Self {
        self.set_const_data(data, slot, true)
    }

    pub fn set_fp_constants<T: bytemuck::Pod>(&mut self, value: &T, slot: usize) -> &mut Self {
        self.set_fp_const_data(bytemuck::bytes_of(value), slot)
    }

    /// Share the previous draw's fragment constant buffers.
    pub fn set_fp_const_data_reuse(&mut self) -> &mut Self {
        self.reuse_const_data(true)
    }

    /// Overwrite the buffer in fragment constant slot `slot`, creating it if absent.
    pub fn update_fp_const_data(&mut self, data: &[u8], slot: usize) -> &mut Self {
        self.update_const_data(data, slot, true)
    }

    pub fn update_fp_constants<T: bytemuck::Pod>(&mut self, value: &T, slot: usize) -> &mut Self {
        self.update_fp_const_data(bytemuck::bytes_of(value), slot)
    }

    fn store_vertices<T: bytemuck::Pod>(
        &mut self,
        vertices: &[T],
        transformer: Option<VertexTransformer>,
    ) -> &mut Self {
        let Ok(words) = bytemuck::try_cast_slice::<T, u32>(vertices) else {
            self.list.fail("vertex type is not a whole number of words");
            return self;
        };
        let (Ok(size), Ok(count)) = (
            u32::try_from(size_of::<T>()),
            u32::try_from(vertices.len()),
        ) else {
            self.list.fail("too many vertices");
            return self;
        };
        let current = self.cmd().map(|c| c.vertex_source).unwrap_or_default();
        let Some(source) = store_slots(&mut self.list.vertex_data, current, words) else {
            self.list.fail("vertex storage exhausted");
            return self;
        };
        self.edit(|c| {
            c.vertex_source = source;
            c.vertex_size = size;
            c.vertex_count = count;
            c.transformer = transformer;
            c.vertex_cache = CacheRange::default();
            c.last_soft_viewport = SoftViewport::NONE;
        })
    }

    /// Vertices uploaded as-is, ignoring the soft viewport.
    pub fn set_vertices<T: bytemuck::Pod>(&mut self, vertices: &[T]) -> &mut Self {
        self.store_vertices(vertices, None)
    }

    /// Vertices whose positions are mapped through the soft viewport active at execution.
    pub fn set_transformed_vertices<T: DisplayVertex>(&mut self, vertices: &[T]) -> &mut Self {
        self.store_vertices(vertices, Some(transform_vertices::<T>))
    }

    /// Triangle list indices.
    pub fn set_indices(&mut self, indices: &[u16]) -> &mut Self {
        if indices.len() % 3 != 0 {
            self.list.fail("index count is not a multiple of 3");
            return self;
        }
        let current = self.cmd().map(|c| c.index_source).unwrap_or_default();
        let Some(source) = store_slots(&mut self.list.index_data, current, indices) else {
            self.list.fail("index storage exhausted");
            return self;
        };
        self.edit(|c| {
            c.index_source = source;
            c.index_cache = CacheRange::default();
        })
    }

    /// Two triangles over four vertices ordered top-left, top-right, bottom-left, bottom-right.
    pub fn set_topology_quad(&mut self) -> &mut Self {
        self.set_indices(&QUAD_INDICES)
    }

    /// Bind pool textures to fragment slots `0..textures.len()`.
    pub fn set_textures(&mut self, textures: &[PoolTextureIndex]) -> &mut Self {
        let items: Vec<Option<PoolTextureIndex>> = textures.iter().copied().map(Some).collect();
        let current = self.cmd().map(|c| c.textures).unwrap_or_default();
        match store_slots(&mut self.list.texture_slots, current, &items) {
            Some(range) => self.edit(|c| c.textures = range),
            None => {
                self.list.fail("texture slot storage exhausted");
                self
            }
        }
    }

    /// Rebind one slot set by [`set_textures`](Self::set_textures).
    pub fn set_texture(&mut self, slot: u32, texture: PoolTextureIndex) -> &mut Self {
        let range = self.cmd().map(|c| c.textures).unwrap_or_default();
        if slot >= range.count {
            self.list.fail("texture slot out of range");
            return self;
        }
        self.list.texture_slots[(range.start + slot) as usize] = Some(texture);
        self
    }

    pub fn set_samplers(&mut self, samplers: &[SamplerHandle]) -> &mut Self {
        let items: Vec<Option<SamplerHandle>> = samplers.iter().copied().map(Some).collect();
        let current = self.cmd().map(|c| c.samplers).unwrap_or_default();
        match store_slots(&mut self.list.samplers, current, &items) {
            Some(range) => self.edit(|c| c.samplers = range),
            None => {
                self.list.fail("sampler storage exhausted");
                self
            }
        }
    }

    pub fn set_sampler(&mut self, slot: u32, sampler: SamplerHandle) -> &mut Self {
        let range = self.cmd().map(|c| c.samplers).unwrap_or_default();
        if slot >= range.count {
            self.list.fail("sampler slot out of range");
            return self;
        }
        self.list.samplers[(range.start + slot) as usize] = Some(sampler);
        self
    }

    /// Clear the render view to `0xAARRGGBB` before drawing.
    pub fn set_clear(&mut self, color: u32) -> &mut Self {
        self.edit(|c| c.clear = Some(color))
    }

    /// `None` overwrites the target.
    pub fn set_blend(&mut self, blend: Option<BlendHandle>) -> &mut Self {
        self.edit(|c| c.blend = blend)
    }

    /// Draw into a registered render view.
    pub fn set_render_view(&mut self, id: PoolRenderViewId) -> &mut Self {
        self.edit(|c| c.render_view = Some(id))
    }

    /// Register `view` and draw into it.
    pub fn set_new_render_view(&mut self, view: RenderView) -> PoolRenderViewId {
        let id = self.list.register_render_view(view);
        self.set_render_view(id);
        id
    }

    /// Draw into mip `mip` of a pool texture, covering the whole level.
    pub fn set_render_view_texture(
        &mut self,
        texture: PoolTextureIndex,
        mip: u32,
        bypass_srgb: bool,
    ) -> PoolRenderViewId {
        let viewport = match self.list.pool_viewport(self.ctx, texture, mip) {
            Some(viewport) => viewport,
            None => {
                self.list.fail("render view texture is not bound");
                Viewport::default()
            }
        };
        self.set_render_view_texture_with_viewport(texture, mip, bypass_srgb, viewport)
    }

    /// Draw into mip `mip` of a pool texture through `viewport`.
    pub fn set_render_view_texture_with_viewport(
        &mut self,
        texture: PoolTextureIndex,
        mip: u32,
        bypass_srgb: bool,
        viewport: Viewport,
    ) -> PoolRenderViewId {
        let id = self.list.push_view(ViewSlot {
            view: RenderView {
                target: None,
                bypass_srgb,
                viewport,
                soft_viewport: SoftViewport::IDENTITY,
            },
            pool_target: Some((texture, mip)),
        });
        self.set_render_view(id);
        id
    }
}

/// Records one compute dispatch in a [`CommandList`].
pub struct DispatchBuilder<'a> {
    list: &'a mut CommandList,
    ctx: &'a mut dyn GraphicsContext,
    dctx: &'a mut NodeContext,
    index: usize,
}

impl<'a> DispatchBuilder<'a> {
    pub(crate) fn new(
        list: &'a mut CommandList,
        ctx: &'a mut dyn GraphicsContext,
        dctx: &'a mut NodeContext,
        index: usize,
    ) -> Self {
        Self {
            list,
            ctx,
            dctx,
            index,
        }
    }

    fn edit(&mut self, f: impl FnOnce(&mut DispatchCommand)) -> &mut Self {
        match self.list.commands.get_mut(self.index) {
            Some(Command::Dispatch(cmd)) => f(cmd),
            _ => self.list.fail("dispatch builder lost its command"),
        }
        self
    }

    fn current(&self) -> DispatchCommand {
        match self.list.commands.get(self.index) {
            Some(Command::Dispatch(cmd)) => cmd.clone(),
            _ => DispatchCommand::default(),
        }
    }

    pub fn command_index(&self) -> PoolCommandIndex {
        PoolCommandIndex::from_usize(self.index).unwrap_or_default()
    }

    pub fn set_program(&mut self, program: ComputeProgramHandle) -> &mut Self {
        self.edit(|c| c.program = Some(program))
    }

    /// Use the node context's cached program for `bytecode`.
    pub fn set_program_bytecode(&mut self, bytecode: &[u8]) -> &mut Self {
        match self.dctx.init_cp(self.ctx, bytecode) {
            Ok(program) => self.set_program(program),
            Err(e) => {
                self.list.fail(&format!("compute program: {e}"));
                self
            }
        }
    }

    pub fn set_constants(&mut self, data: &[u8]) -> &mut Self {
        match self.list.create_constants(self.ctx, data) {
            Some(block) => self.edit(|c| c.constants = Some(block)),
            None => self,
        }
    }

    /// Share the constant buffer of the previous command.
    pub fn set_constants_reuse(&mut self) -> &mut Self {
        let previous = self.index.checked_sub(1).and_then(|i| match &self.list.commands[i] {
            Command::Dispatch(prev) => prev.constants,
            Command::Mesh(prev) => prev.fs_constants.first().copied().flatten(),
        });
        match previous {
            Some(block) => self.edit(|c| c.constants = Some(block)),
            None => {
                self.list.fail("constant reuse without a previous command");
                self
            }
        }
    }

    pub fn set_textures(&mut self, textures: &[PoolTextureIndex]) -> &mut Self {
        let items: Vec<Option<PoolTextureIndex>> = textures.iter().copied().map(Some).collect();
        let current = self.current().textures;
        match store_slots(&mut self.list.texture_slots, current, &items) {
            Some(range) => self.edit(|c| c.textures = range),
            None => {
                self.list.fail("texture slot storage exhausted");
                self
            }
        }
    }

    pub fn set_samplers(&mut self, samplers: &[SamplerHandle]) -> &mut Self {
        let items: Vec<Option<SamplerHandle>> = samplers.iter().copied().map(Some).collect();
        let current = self.current().samplers;
        match store_slots(&mut self.list.samplers, current, &items) {
            Some(range) => self.edit(|c| c.samplers = range),
            None => {
                self.list.fail("sampler storage exhausted");
                self
            }
        }
    }

    pub fn set_uavs(&mut self, uavs: &[Option<UavHandle>]) -> &mut Self {
        let current = self.current().uavs;
        match store_slots(&mut self.list.uavs, current, uavs) {
            Some(range) => self.edit(|c| c.uavs = range),
            None => {
                self.list.fail("UAV storage exhausted");
                self
            }
        }
    }

    pub fn set_thread_groups(&mut self, x: u32, y: u32, z: u32) -> &mut Self {
        self.edit(|c| c.groups = [x, y, z])
    }
}
