//! Effect backend that records each pass as a draw in a shared [`CommandList`].

use tracing::debug;

use crate::device::{AddressMode, Filter, GraphicsContext, SamplerDesc, SamplerHandle};
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{
    CommandList, NodeContext, PoolCommandIndex, PoolRenderViewId, PoolTextureIndex, RenderView,
    VertexKind,
};

use super::binding::{ConstantLayout, VarShape};
use super::pipeline::{EffectBackend, PassFrame, PassSetup, effect_quad};
use super::vars::{ScalarGather, VarStorage};

/// A constant buffer image and the words refreshed into it before each run.
#[derive(Debug)]
struct PassConstants {
    slot: usize,
    words: Vec<u32>,
    floats: Vec<ScalarGather>,
    bools: Vec<ScalarGather>,
}

impl PassConstants {
    fn new(layout: &ConstantLayout, pass: u32, vars: &mut VarStorage) -> Self {
        let mut floats = Vec::new();
        let mut bools = Vec::new();
        for b in &layout.vars {
            let (p, e) = (b.frame.pass, b.frame.element);
            match b.shape {
                VarShape::Scalar => floats.extend(vars.request_vector(b.offset, b.var, p, e).scalars(1)),
                VarShape::Vector(c) => floats.extend(vars.request_vector(b.offset, b.var, p, e).scalars(c)),
                VarShape::Bool => bools.extend(vars.request_vector(b.offset, b.var, p, e).scalars(1)),
                VarShape::Matrix { row_major } => {
                    let m = if row_major {
                        vars.request_row_major_matrix(b.offset, b.var, p, e)
                    } else {
                        vars.request_column_major_matrix(b.offset, b.var, p, e)
                    };
                    for row in &m.rows {
                        floats.extend(row.scalars(4));
                    }
                }
            }
        }
        // Gathers past the buffer would be dropped anyway.
        let words = (layout.size as usize).div_ceil(4);
        floats.retain(|g| (g.dst as usize / 4) < words);
        bools.retain(|g| (g.dst as usize / 4) < words);
        debug!(
            pass,
            buffer = %layout.name,
            floats = floats.len(),
            bools = bools.len(),
            "constant gathers"
        );
        Self {
            slot: layout.slot as usize,
            words: layout.initial_words(words),
            floats,
            bools,
        }
    }

    fn refresh(&mut self, vars: &VarStorage) {
        vars.gather_floats(&mut self.words, &self.floats);
        vars.gather_bools(&mut self.words, &self.bools);
    }
}

/// Device objects of one pass.
#[derive(Debug)]
pub(crate) struct ModernPass {
    index: u32,
    command: PoolCommandIndex,
    view: PoolRenderViewId,
    /// Pool texture per fragment slot.
    pool: Vec<PoolTextureIndex>,
    vertex_constants: Vec<PassConstants>,
    fragment_constants: Vec<PassConstants>,
}

/// Backend over the command list machinery used by the built-in nodes.
#[derive(Debug, Default)]
pub(crate) struct ModernBackend {
    list: CommandList,
    point: Option<SamplerHandle>,
    linear: Option<SamplerHandle>,
}

impl ModernBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn samplers(&mut self, ctx: &mut dyn GraphicsContext) -> ScanoutResult<(SamplerHandle, SamplerHandle)> {
        if self.point.is_none() {
            self.point = Some(ctx.create_sampler(&SamplerDesc::new(Filter::Point, AddressMode::Clamp))?);
        }
        if self.linear.is_none() {
            self.linear = Some(ctx.create_sampler(&SamplerDesc::new(Filter::Bilinear, AddressMode::Clamp))?);
        }
        let (Some(point), Some(linear)) = (self.point, self.linear) else {
            return Err(ScanoutError::device("effect samplers unavailable"));
        };
        Ok((point, linear))
    }

    fn check(&self, index: u32, what: &str) -> ScanoutResult<()> {
        if self.list.has_error() {
            return Err(ScanoutError::device(format!("pass {index}: {what} failed")));
        }
        Ok(())
    }
}

impl EffectBackend for ModernBackend {
    type Pass = ModernPass;

    fn create_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        setup: &PassSetup,
        vars: &mut VarStorage,
    ) -> ScanoutResult<ModernPass> {
        let (point, linear) = self.samplers(ctx)?;
        let bindings = &setup.bindings;
        let slots = bindings.slot_count();

        let pool: Vec<PoolTextureIndex> =
            (0..slots).map(|_| self.list.register_texture(None)).collect();
        let samplers: Vec<SamplerHandle> = (0..slots as u32)
            .map(|slot| match bindings.samplers.iter().find(|s| s.slot == slot) {
                Some(s) if s.linear => linear,
                _ => point,
            })
            .collect();
        let view = self.list.register_render_view(RenderView::default());

        let vertex_constants: Vec<PassConstants> = bindings
            .vertex_constants
            .iter()
            .map(|l| PassConstants::new(l, setup.index, vars))
            .collect();
        let fragment_constants: Vec<PassConstants> = bindings
            .fragment_constants
            .iter()
            .map(|l| PassConstants::new(l, setup.index, vars))
            .collect();

        let mut mb = self.list.add_mesh(ctx, dctx);
        mb.set_vertex_kind(VertexKind::Tex2)
            .set_vertex_program_bytecode(&setup.vertex_bytecode)
            .set_fragment_program_bytecode(&setup.fragment_bytecode)
            .set_textures(&pool)
            .set_samplers(&samplers)
            .set_transformed_vertices(&effect_quad([0.0, 0.0, 1.0, 1.0]))
            .set_topology_quad()
            .set_render_view(view);
        for cb in &vertex_constants {
            mb.set_vp_const_data(bytemuck::cast_slice(&cb.words), cb.slot);
        }
        for cb in &fragment_constants {
            mb.set_fp_const_data(bytemuck::cast_slice(&cb.words), cb.slot);
        }
        let command = mb.command_index();
        self.check(setup.index, "recording")?;

        Ok(ModernPass {
            index: setup.index,
            command,
            view,
            pool,
            vertex_constants,
            fragment_constants,
        })
    }

    fn update_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        pass: &mut ModernPass,
        frame: &PassFrame<'_>,
    ) -> ScanoutResult<()> {
        self.list.set_render_view(pass.view, frame.target);
        for &(slot, texture) in frame.textures {
            if let Some(&index) = pass.pool.get(slot as usize) {
                self.list.set_texture(index, texture);
            }
        }
        for cb in pass.vertex_constants.iter_mut().chain(&mut pass.fragment_constants) {
            cb.refresh(frame.vars);
        }

        let Some(mut mb) = self.list.update_mesh(ctx, dctx, pass.command) else {
            return Err(ScanoutError::device(format!(
                "pass {}: recorded draw is missing",
                pass.index
            )));
        };
        mb.set_transformed_vertices(&effect_quad(frame.input_uv));
        for cb in &pass.vertex_constants {
            mb.update_vp_const_data(bytemuck::cast_slice(&cb.words), cb.slot);
        }
        for cb in &pass.fragment_constants {
            mb.update_fp_const_data(bytemuck::cast_slice(&cb.words), cb.slot);
        }
        self.check(pass.index, "update")
    }

    fn submit_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        pass: &mut ModernPass,
    ) -> ScanoutResult<()> {
        self.list.execute(ctx, dctx, pass.command, 1);
        self.check(pass.index, "draw")
    }

    fn release_pass(&mut self, _ctx: &mut dyn GraphicsContext, pass: ModernPass) {
        // Commands live in the shared list until `release`.
        for index in pass.pool {
            self.list.set_texture(index, None);
        }
    }

    fn release(&mut self, ctx: &mut dyn GraphicsContext) {
        self.list.clear(ctx);
        for sampler in [self.point.take(), self.linear.take()].into_iter().flatten() {
            ctx.destroy(sampler.into());
        }
    }
}
