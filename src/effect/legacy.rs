//! Effect backend that draws each pass directly through the device.
//!
//! Constants follow register rules: every vector or matrix variable owns whole 16-byte registers,
//! scalars and bools own one word.

use tracing::debug;

use crate::device::{
    AddressMode, ConstantBufferHandle, DrawCall, Filter, FragmentProgramHandle, GraphicsContext,
    SamplerDesc, SamplerHandle, TextureHandle, VertexProgramHandle,
};
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::foundation::math::align_up;
use crate::render::{DisplayVertex, NodeContext, VertexKind};

use super::binding::{ConstantLayout, VarShape};
use super::pipeline::{EffectBackend, PassFrame, PassSetup, effect_quad};
use super::vars::{ScalarGather, VarStorage, Vec4Gather};

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 1, 3];

#[derive(Debug)]
struct RegisterBlock {
    slot: usize,
    buffer: ConstantBufferHandle,
    words: Vec<u32>,
    vectors: Vec<Vec4Gather>,
    scalars: Vec<ScalarGather>,
    bools: Vec<ScalarGather>,
}

impl RegisterBlock {
    fn create(
        ctx: &mut dyn GraphicsContext,
        layout: &ConstantLayout,
        vars: &mut VarStorage,
    ) -> ScanoutResult<Self> {
        let mut vectors = Vec::new();
        let mut scalars = Vec::new();
        let mut bools = Vec::new();
        for b in &layout.vars {
            let (p, e) = (b.frame.pass, b.frame.element);
            match b.shape {
                VarShape::Scalar => scalars.extend(vars.request_vector(b.offset, b.var, p, e).scalars(1)),
                VarShape::Bool => bools.extend(vars.request_vector(b.offset, b.var, p, e).scalars(1)),
                VarShape::Vector(_) => vectors.push(vars.request_vector(b.offset, b.var, p, e)),
                VarShape::Matrix { row_major } => {
                    let m = if row_major {
                        vars.request_row_major_matrix(b.offset, b.var, p, e)
                    } else {
                        vars.request_column_major_matrix(b.offset, b.var, p, e)
                    };
                    vectors.extend(m.rows);
                }
            }
        }

        let bytes = align_up(layout.size.max(16), 16);
        let buffer = ctx.create_constant_buffer(bytes)?;
        Ok(Self {
            slot: layout.slot as usize,
            buffer,
            words: layout.initial_words(bytes as usize / 4),
            vectors,
            scalars,
            bools,
        })
    }

    fn upload(&mut self, ctx: &mut dyn GraphicsContext, vars: &VarStorage) -> ScanoutResult<()> {
        vars.gather_vecs(&mut self.words, &self.vectors);
        vars.gather_floats(&mut self.words, &self.scalars);
        vars.gather_bools(&mut self.words, &self.bools);
        ctx.write_constant_buffer(self.buffer, bytemuck::cast_slice(&self.words))
    }
}

fn slot_table(blocks: &[RegisterBlock]) -> Vec<Option<ConstantBufferHandle>> {
    let len = blocks.iter().map(|b| b.slot + 1).max().unwrap_or(0);
    let mut table = vec![None; len];
    for b in blocks {
        table[b.slot] = Some(b.buffer);
    }
    table
}

/// Device objects of one pass.
#[derive(Debug)]
pub(crate) struct LegacyPass {
    index: u32,
    vertex_program: VertexProgramHandle,
    fragment_program: FragmentProgramHandle,
    vertex_blocks: Vec<RegisterBlock>,
    fragment_blocks: Vec<RegisterBlock>,
    samplers: Vec<Option<SamplerHandle>>,
    textures: Vec<Option<TextureHandle>>,
}

impl LegacyPass {
    fn destroy(self, ctx: &mut dyn GraphicsContext) {
        ctx.destroy(self.vertex_program.into());
        ctx.destroy(self.fragment_program.into());
        for b in self.vertex_blocks.into_iter().chain(self.fragment_blocks) {
            ctx.destroy(b.buffer.into());
        }
    }
}

/// Backend issuing one immediate draw per pass.
#[derive(Debug, Default)]
pub(crate) struct LegacyBackend {
    point: Option<SamplerHandle>,
    linear: Option<SamplerHandle>,
}

impl LegacyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn sampler(&mut self, ctx: &mut dyn GraphicsContext, linear: bool) -> ScanoutResult<SamplerHandle> {
        let (slot, filter) = if linear {
            (&mut self.linear, Filter::Bilinear)
        } else {
            (&mut self.point, Filter::Point)
        };
        if let Some(s) = *slot {
            return Ok(s);
        }
        let sampler = ctx.create_sampler(&SamplerDesc::new(filter, AddressMode::Clamp))?;
        Ok(*slot.insert(sampler))
    }

    fn build(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        setup: &PassSetup,
        vars: &mut VarStorage,
        pass: &mut LegacyPass,
    ) -> ScanoutResult<()> {
        let bindings = &setup.bindings;
        for layout in &bindings.vertex_constants {
            pass.vertex_blocks.push(RegisterBlock::create(ctx, layout, vars)?);
        }
        for layout in &bindings.fragment_constants {
            pass.fragment_blocks.push(RegisterBlock::create(ctx, layout, vars)?);
        }
        let slots = bindings.slot_count();
        pass.samplers = vec![None; slots];
        pass.textures = vec![None; slots];
        for slot in 0..slots {
            let linear = bindings
                .samplers
                .iter()
                .find(|s| s.slot as usize == slot)
                .is_some_and(|s| s.linear);
            pass.samplers[slot] = Some(self.sampler(ctx, linear)?);
        }
        Ok(())
    }
}

impl EffectBackend for LegacyBackend {
    type Pass = LegacyPass;

    fn create_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        _dctx: &mut NodeContext,
        setup: &PassSetup,
        vars: &mut VarStorage,
    ) -> ScanoutResult<LegacyPass> {
        let vertex_program = ctx.create_vertex_program(&setup.vertex_bytecode)?;
        let fragment_program = match ctx.create_fragment_program(&setup.fragment_bytecode) {
            Ok(p) => p,
            Err(e) => {
                ctx.destroy(vertex_program.into());
                return Err(e);
            }
        };
        let mut pass = LegacyPass {
            index: setup.index,
            vertex_program,
            fragment_program,
            vertex_blocks: Vec::new(),
            fragment_blocks: Vec::new(),
            samplers: Vec::new(),
            textures: Vec::new(),
        };
        if let Err(e) = self.build(ctx, setup, vars, &mut pass) {
            pass.destroy(ctx);
            return Err(e);
        }
        debug!(
            pass = setup.index,
            vertex_buffers = pass.vertex_blocks.len(),
            fragment_buffers = pass.fragment_blocks.len(),
            "legacy pass created"
        );
        Ok(pass)
    }

    fn update_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        pass: &mut LegacyPass,
        frame: &PassFrame<'_>,
    ) -> ScanoutResult<()> {
        for b in pass.vertex_blocks.iter_mut().chain(&mut pass.fragment_blocks) {
            b.upload(ctx, frame.vars)?;
        }
        pass.textures.fill(None);
        for &(slot, texture) in frame.textures {
            if let Some(t) = pass.textures.get_mut(slot as usize) {
                *t = texture;
            }
        }

        dctx.apply_render_view(ctx, &frame.target);
        let sv = dctx.soft_viewport();
        let mut quad = effect_quad(frame.input_uv);
        for v in &mut quad {
            v.set_position(sv.transform(v.position()));
        }
        let lost = || ScanoutError::device(format!("pass {}: geometry upload failed", pass.index));
        let vb = dctx.cache_vb(ctx, bytemuck::cast_slice(&quad)).ok_or_else(lost)?;
        let ib = dctx.cache_ib(ctx, &QUAD_INDICES).ok_or_else(lost)?;

        ctx.draw(&DrawCall {
            vertex_format: dctx.vertex_format(VertexKind::Tex2),
            vertex_program: pass.vertex_program,
            fragment_program: pass.fragment_program,
            blend: None,
            vertex_buffer: dctx.vertex_cache_buffer(),
            vertex_offset: vb.offset,
            vertex_count: quad.len() as u32,
            index_buffer: dctx.index_cache_buffer(),
            index_offset: ib.offset,
            index_count: QUAD_INDICES.len() as u32,
            textures: &pass.textures,
            samplers: &pass.samplers,
            vertex_constants: &slot_table(&pass.vertex_blocks),
            fragment_constants: &slot_table(&pass.fragment_blocks),
        })
    }

    fn submit_pass(
        &mut self,
        _ctx: &mut dyn GraphicsContext,
        _dctx: &mut NodeContext,
        _pass: &mut LegacyPass,
    ) -> ScanoutResult<()> {
        Ok(())
    }

    fn release_pass(&mut self, ctx: &mut dyn GraphicsContext, pass: LegacyPass) {
        pass.destroy(ctx);
    }

    fn release(&mut self, ctx: &mut dyn GraphicsContext) {
        for sampler in [self.point.take(), self.linear.take()].into_iter().flatten() {
            ctx.destroy(sampler.into());
        }
    }
}
