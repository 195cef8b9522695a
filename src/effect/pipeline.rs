//! Backend-neutral multi-pass effect driver.
//!
//! The pipeline owns everything about an effect that does not depend on how draws reach the
//! device: the pass list and its settings, the per-pass output textures and their history, the
//! shared variable storage, and the frame grid every texture reference resolves against. Grid row
//! 0 holds the source frames (`ORIG`, `PREV`, ...); row `p + 1` holds the outputs of pass `p`,
//! which is also the `IN` of pass `p + 1`.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::device::{
    BuiltinProgram, DeviceCaps, Format, GraphicsContext, SurfaceRef, TextureDesc, TextureHandle,
    TextureUsage,
};
use crate::foundation::core::{Float2, Float4x4};
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::nodes::SourceTexMapping;
use crate::render::{NodeContext, RenderView, Vertex2T};

use super::binding::{BindingScope, CustomTextureInfo, PassBindings, TextureSource};
use super::frame_ref::FrameRef;
use super::pass::PassProps;
use super::props::{EffectProps, PropKey};
use super::vars::{EffectVariable, FrameParamOffsets, PassParamOffsets, VarStorage};
use super::{CustomEffect, Extent, PassInfo};

const MAX_PASSES: i32 = 100;

/// Static description of one pass, kept so backends can rebuild it after a device reset.
#[derive(Clone, Debug)]
pub(crate) struct PassSetup {
    pub index: u32,
    pub vertex_bytecode: Vec<u8>,
    pub fragment_bytecode: Vec<u8>,
    pub bindings: PassBindings,
}

/// Per-run inputs handed to a backend.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PassFrame<'a> {
    pub vars: &'a VarStorage,
    /// `(slot, texture)` for every texture binding, in binding order.
    pub textures: &'a [(u32, Option<TextureHandle>)],
    pub target: RenderView,
    /// UV rectangle of the pass input image.
    pub input_uv: [f32; 4],
}

/// Device-facing half of an effect pipeline.
pub(crate) trait EffectBackend {
    type Pass;

    /// Build the device objects for a pass, requesting its variables from `vars`.
    fn create_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        setup: &PassSetup,
        vars: &mut VarStorage,
    ) -> ScanoutResult<Self::Pass>;

    /// Refresh a pass's constants and bindings for this frame. Variables are final by now.
    fn update_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        pass: &mut Self::Pass,
        frame: &PassFrame<'_>,
    ) -> ScanoutResult<()>;

    /// Issue the work recorded by the last [`update_pass`](Self::update_pass).
    fn submit_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        pass: &mut Self::Pass,
    ) -> ScanoutResult<()>;

    fn release_pass(&mut self, ctx: &mut dyn GraphicsContext, pass: Self::Pass);

    /// Release objects shared by all passes.
    fn release(&mut self, ctx: &mut dyn GraphicsContext);
}

/// A texture in the frame grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TexSpec {
    pub texture: Option<TextureHandle>,
    pub image: Extent,
    pub tex: Extent,
}

impl TexSpec {
    fn uv_rect(&self) -> [f32; 4] {
        let u = self.image.width as f32 / self.tex.width.max(1) as f32;
        let v = self.image.height as f32 / self.tex.height.max(1) as f32;
        [0.0, 0.0, u, v]
    }
}

struct CustomTexture {
    info: CustomTextureInfo,
    texture: TextureHandle,
}

struct PipelinePass<P> {
    setup: PassSetup,
    props: PassProps,
    input_rows: Vec<u32>,
    cacheable: bool,
    /// Output history, newest first.
    outputs: Vec<TexSpec>,
    output_format: Option<Format>,
    frame: u32,
    pass_params: PassParamOffsets,
    /// Frame counter offsets per element of the input row.
    frame_params: Vec<FrameParamOffsets>,
    elapsed: Option<Duration>,
    backend: Option<P>,
}

/// Full quad with `uv0` over the input image and `uv1` over `0..1`.
pub(crate) fn effect_quad(uv: [f32; 4]) -> [Vertex2T; 4] {
    let [u0, v0, u1, v1] = uv;
    [
        Vertex2T::new(-1.0, 1.0, Float2::new(u0, v0), Float2::new(0.0, 0.0)),
        Vertex2T::new(1.0, 1.0, Float2::new(u1, v0), Float2::new(1.0, 0.0)),
        Vertex2T::new(-1.0, -1.0, Float2::new(u0, v1), Float2::new(0.0, 1.0)),
        Vertex2T::new(1.0, -1.0, Float2::new(u1, v1), Float2::new(1.0, 1.0)),
    ]
}

/// A loaded effect running on backend `B`.
pub(crate) struct EffectPipeline<B: EffectBackend> {
    backend: B,
    caps: DeviceCaps,
    passes: Vec<PipelinePass<B::Pass>>,
    custom: Vec<CustomTexture>,
    vars: VarStorage,
    orig: Vec<TexSpec>,
    /// Per grid row: whether it changed this frame.
    invalidated: Vec<bool>,
    new_frame: bool,
    show_stats: bool,
    viewport: Extent,
}

fn read_asset(path: &Path) -> ScanoutResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| ScanoutError::asset(format!("{}: {e}", path.display())))
}

impl<B: EffectBackend> EffectPipeline<B> {
    /// Load the effect description at `path`, its textures and every pass program.
    pub fn load(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        path: &Path,
        backend: B,
    ) -> ScanoutResult<Self> {
        let mut pipeline = Self {
            backend,
            caps: ctx.caps(),
            passes: Vec::new(),
            custom: Vec::new(),
            vars: VarStorage::new(),
            orig: Vec::new(),
            invalidated: Vec::new(),
            new_frame: true,
            show_stats: false,
            viewport: Extent::default(),
        };
        match pipeline.init(ctx, dctx, path) {
            Ok(()) => Ok(pipeline),
            Err(e) => {
                pipeline.shutdown(ctx);
                Err(e)
            }
        }
    }

    fn init(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        path: &Path,
    ) -> ScanoutResult<()> {
        let text = String::from_utf8(read_asset(path)?).map_err(|_| {
            ScanoutError::asset(format!("{}: effect description is not UTF-8", path.display()))
        })?;
        let props = EffectProps::parse(&text)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        self.load_textures(ctx, dctx, &props, &base)?;

        let pass_count = match props.get_int(&PropKey::plain("shaders"))? {
            Some(n) if (1..=MAX_PASSES).contains(&n) => n as u32,
            Some(_) => return Err(ScanoutError::validation("invalid 'shaders' value")),
            None => (0..)
                .take_while(|&i| props.get_indexed("shader", i).is_some())
                .count() as u32,
        };
        if pass_count == 0 {
            return Err(ScanoutError::validation(
                "effect contains no passes; it needs at least a shader0 entry",
            ));
        }

        let pass_props = (0..pass_count)
            .map(|i| PassProps::parse(&props, i))
            .collect::<ScanoutResult<Vec<_>>>()?;
        let inputs_filtered: Vec<bool> = pass_props.iter().map(|p| p.filter_input).collect();
        let custom_info: Vec<CustomTextureInfo> =
            self.custom.iter().map(|c| c.info.clone()).collect();

        let mut setups = Vec::with_capacity(pass_count as usize);
        for (i, pp) in pass_props.iter().enumerate() {
            let index = i as u32;
            let shader = props
                .get_indexed("shader", index)
                .ok_or_else(|| ScanoutError::validation(format!("missing entry 'shader{index}'")))?;
            let fragment_bytecode = read_asset(&base.join(shader))?;
            let vertex_bytecode = match props.get_indexed("vertex", index) {
                Some(p) => read_asset(&base.join(p))?,
                None => ctx.builtin_program(BuiltinProgram::VertexEffect).to_vec(),
            };
            let in_pass = |e: ScanoutError| match e {
                ScanoutError::Asset(m) => ScanoutError::asset(format!("pass {index}: {m}")),
                other => other,
            };
            let vertex = ctx.reflect_program(&vertex_bytecode).map_err(in_pass)?;
            let fragment = ctx.reflect_program(&fragment_bytecode).map_err(in_pass)?;
            let scope = BindingScope {
                pass: index,
                filter_input: pp.filter_input,
                inputs_filtered: &inputs_filtered,
                custom: &custom_info,
            };
            let bindings = PassBindings::analyze(&scope, &vertex, &fragment)?;
            setups.push(PassSetup {
                index,
                vertex_bytecode,
                fragment_bytecode,
                bindings,
            });
        }

        // Deepest history each grid row must keep.
        let mut max_prev = vec![0u32; pass_count as usize + 1];
        for r in setups.iter().flat_map(|s| &s.bindings.refs) {
            if let Some(m) = max_prev.get_mut(r.pass as usize) {
                *m = (*m).max(r.element);
            }
        }

        let last = pass_count as usize - 1;
        for (i, (setup, pp)) in setups.into_iter().zip(pass_props).enumerate() {
            let backend = self.backend.create_pass(ctx, dctx, &setup, &mut self.vars)?;
            self.passes.push(PipelinePass {
                input_rows: setup.bindings.input_rows(),
                cacheable: !setup.bindings.uses_frame_count && i != last,
                outputs: vec![TexSpec::default(); max_prev[i + 1] as usize + 1],
                output_format: None,
                frame: 0,
                pass_params: PassParamOffsets::default(),
                frame_params: vec![FrameParamOffsets::default(); max_prev[i] as usize + 1],
                elapsed: None,
                backend: Some(backend),
                setup,
                props: pp,
            });
        }

        self.reset_variables();
        self.orig = vec![TexSpec::default(); max_prev[0] as usize + 1];
        self.invalidated = vec![true; pass_count as usize + 1];
        self.show_stats = props.get_bool(&PropKey::plain("shader_show_stats"), false);
        debug!(
            passes = pass_count,
            custom_textures = self.custom.len(),
            prev_frames = max_prev[0],
            "custom effect loaded"
        );
        Ok(())
    }

    /// Resolve the storage offsets every pass refreshes and reset the constant variables.
    ///
    /// Runs once every pass has requested its variables.
    fn reset_variables(&mut self) {
        let mvp = self.vars.var_offset(EffectVariable::ModelViewProj, 0, 0);
        self.vars.set_matrix(mvp, &Float4x4::IDENTITY);
        for (i, pass) in self.passes.iter_mut().enumerate() {
            let row = i as u32;
            pass.pass_params = self.vars.resolve_pass_params(row);
            for (e, params) in pass.frame_params.iter_mut().enumerate() {
                *params = self.vars.resolve_frame_params(row, e as u32);
            }
            self.vars
                .set_vector(pass.pass_params.frame_direction, [1.0, 0.0, 0.0, 0.0]);
        }
    }

    fn load_textures(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &NodeContext,
        props: &EffectProps,
        base: &Path,
    ) -> ScanoutResult<()> {
        let Some(list) = props.get_plain("textures") else {
            return Ok(());
        };
        for name in list.split(';').map(str::trim).filter(|n| !n.is_empty()) {
            if self.custom.iter().any(|c| c.info.name == name) {
                continue;
            }
            let rel = props
                .get_plain(name)
                .ok_or_else(|| ScanoutError::validation(format!("no path specified for texture: {name}")))?;
            let linear = props.get_bool(&PropKey::plain(&format!("{name}_linear")), true);
            let texture = self.load_texture(ctx, dctx, name, &base.join(rel))?;
            self.custom.push(CustomTexture {
                info: CustomTextureInfo {
                    name: name.to_owned(),
                    linear,
                },
                texture,
            });
        }
        Ok(())
    }

    fn load_texture(
        &self,
        ctx: &mut dyn GraphicsContext,
        dctx: &NodeContext,
        name: &str,
        path: &Path,
    ) -> ScanoutResult<TextureHandle> {
        let img = image::open(path)
            .map_err(|e| ScanoutError::asset(format!("{}: {e}", path.display())))?
            .to_rgba8();
        let (w, h) = img.dimensions();
        let caps = self.caps;
        if w > caps.max_texture_width || h > caps.max_texture_height {
            return Err(ScanoutError::device(format!(
                "unable to create {w}x{h} texture '{name}': exceeds device limit of {}x{}",
                caps.max_texture_width, caps.max_texture_height
            )));
        }
        if !caps.non_pow2 && (!w.is_power_of_two() || !h.is_power_of_two()) {
            return Err(ScanoutError::device(format!(
                "unable to create {w}x{h} texture '{name}': device requires power-of-two texture sizes"
            )));
        }

        let mut bgra = img.into_raw();
        for px in bgra.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        let texture = ctx.create_texture(&TextureDesc::shader(w, h, dctx.formats().bgra))?;
        if let Err(e) = ctx.write_texture(texture, 0, &bgra, w as usize * 4) {
            ctx.destroy(texture.into());
            return Err(e);
        }
        Ok(texture)
    }

    fn spec(&self, r: FrameRef) -> TexSpec {
        let row = match r.pass.checked_sub(1) {
            None => &self.orig,
            Some(p) => match self.passes.get(p as usize) {
                Some(pass) => &pass.outputs,
                None => return TexSpec::default(),
            },
        };
        row.get(r.element as usize).copied().unwrap_or_default()
    }

    fn output_format(&self, ctx: &dyn GraphicsContext, dctx: &NodeContext, props: &PassProps) -> Format {
        let formats = dctx.formats();
        if props.float_framebuffer || props.halffloat_framebuffer {
            let rt = TextureUsage::SHADER | TextureUsage::RENDER;
            if !props.halffloat_framebuffer && ctx.is_format_supported(Format::Rgba32Float, rt) {
                Format::Rgba32Float
            } else {
                formats.hdr
            }
        } else if props.srgb_framebuffer {
            formats.bgra_srgb
        } else {
            formats.bgra
        }
    }

    fn destroy_outputs(ctx: &mut dyn GraphicsContext, outputs: &mut [TexSpec]) {
        for out in outputs {
            if let Some(tex) = out.texture.take() {
                ctx.destroy(tex.into());
            }
        }
    }

    /// Allocate missing output textures of pass `index` for a `render` sized image.
    fn ensure_outputs(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &NodeContext,
        index: usize,
        render: Extent,
    ) -> ScanoutResult<()> {
        let non_pow2 = self.caps.non_pow2;
        let format = self.output_format(ctx, dctx, &self.passes[index].props);
        let caps = self.caps;
        let pass = &mut self.passes[index];

        if pass.outputs[0].image != render || pass.output_format != Some(format) {
            Self::destroy_outputs(ctx, &mut pass.outputs);
            let tex = PassProps::texture_size(render, non_pow2);
            for out in &mut pass.outputs {
                out.image = render;
                out.tex = tex;
            }
            pass.output_format = Some(format);
            debug!(
                pass = index,
                width = render.width,
                height = render.height,
                ?format,
                "pass outputs resized"
            );
        }

        for out in &mut pass.outputs {
            if out.texture.is_some() {
                continue;
            }
            if out.tex.width > caps.max_texture_width || out.tex.height > caps.max_texture_height {
                return Err(ScanoutError::device(format!(
                    "pass {index}: unable to allocate {}x{} output texture: exceeds device limit of {}x{}",
                    out.tex.width, out.tex.height, caps.max_texture_width, caps.max_texture_height
                )));
            }
            let desc = TextureDesc::render_target(out.tex.width, out.tex.height, format);
            let texture = ctx.create_texture(&desc).map_err(|e| {
                ScanoutError::device(format!(
                    "pass {index}: unable to allocate {}x{} output texture: {e}",
                    out.tex.width, out.tex.height
                ))
            })?;
            out.texture = Some(texture);
        }
        Ok(())
    }

    /// Bring pass `index` up to date. `Ok(false)` if its cached output is still valid.
    ///
    /// With `target` set the pass draws there instead of into its own output.
    fn update_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        index: usize,
        target: Option<RenderView>,
    ) -> ScanoutResult<bool> {
        let started = self.show_stats.then(Instant::now);
        let pass = &mut self.passes[index];
        if pass.cacheable
            && pass.outputs.last().is_some_and(|o| o.texture.is_some())
            && !pass.input_rows.iter().any(|&r| self.invalidated[r as usize])
        {
            return Ok(false);
        }

        pass.outputs.rotate_right(1);
        pass.frame = if pass.frame >= pass.props.frame_count_limit {
            0
        } else {
            pass.frame + 1
        };

        let mut frame = pass.frame;
        for params in &pass.frame_params {
            self.vars
                .set_vector(params.frame_count, [frame as f32, 0.0, 0.0, 0.0]);
            frame = frame.saturating_sub(1);
        }

        let input = self.spec(FrameRef::new(index as u32, 0));
        let pass = &self.passes[index];
        let render = pass.props.render_size(input.image, self.viewport);
        let params = pass.pass_params;
        let size = |e: Extent| [e.width as f32, e.height as f32, 0.0, 0.0];
        self.vars.set_vector(params.video_size, size(input.image));
        self.vars.set_vector(params.texture_size, size(input.tex));
        self.vars.set_vector(params.output_size, size(render));

        let target = match target {
            Some(view) => view,
            None => {
                self.ensure_outputs(ctx, dctx, index, render)?;
                let out = self.passes[index].outputs[0];
                RenderView::new(out.texture.map(SurfaceRef::level0), render.width, render.height)
            }
        };

        let textures: Vec<(u32, Option<TextureHandle>)> = self.passes[index]
            .setup
            .bindings
            .textures
            .iter()
            .map(|b| {
                let tex = match b.source {
                    TextureSource::Frame(r) => self.spec(r).texture,
                    TextureSource::Custom(i) => self.custom.get(i).map(|c| c.texture),
                };
                (b.slot, tex)
            })
            .collect();

        let Self {
            backend,
            passes,
            vars,
            ..
        } = self;
        let pass = &mut passes[index];
        let backend_pass = pass.backend.as_mut().ok_or_else(|| {
            ScanoutError::device(format!("pass {index}: device objects were not restored"))
        })?;
        backend.update_pass(
            ctx,
            dctx,
            backend_pass,
            &PassFrame {
                vars,
                textures: &textures,
                target,
                input_uv: input.uv_rect(),
            },
        )?;
        pass.elapsed = started.map(|t| t.elapsed());
        Ok(true)
    }

    fn submit_pass(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        index: usize,
    ) -> ScanoutResult<()> {
        let started = self.show_stats.then(Instant::now);
        let Self {
            backend, passes, ..
        } = self;
        let pass = &mut passes[index];
        if let Some(bp) = pass.backend.as_mut() {
            backend.submit_pass(ctx, dctx, bp)?;
        }
        if let (Some(t), Some(e)) = (started, pass.elapsed.as_mut()) {
            *e += t.elapsed();
        }
        Ok(())
    }

    fn chain_render_size(&self, count: usize, src: Extent, viewport: Extent) -> Extent {
        self.passes
            .iter()
            .take(count)
            .fold(src, |size, p| p.props.render_size(size, viewport))
    }
}

impl<B: EffectBackend> CustomEffect for EffectPipeline<B> {
    fn contains_final_blit(&self) -> bool {
        self.passes.last().is_some_and(|p| p.props.has_scaling_factor)
    }

    fn max_prev_frames(&self) -> u32 {
        self.orig.len().saturating_sub(1) as u32
    }

    fn increment_frame(&mut self) {
        self.new_frame = true;
    }

    fn pre_run(&mut self, ctx: &mut dyn GraphicsContext, _dctx: &mut NodeContext) {
        ctx.begin_scope("custom effect");
        for pass in &mut self.passes {
            pass.elapsed = None;
        }
    }

    fn run(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        sources: &[Option<TextureHandle>],
        mapping: &SourceTexMapping,
        viewport: Extent,
    ) -> ScanoutResult<()> {
        if self.passes.is_empty() {
            return Ok(());
        }
        self.viewport = viewport;
        self.invalidated.fill(false);
        self.invalidated[0] = std::mem::take(&mut self.new_frame);

        let image = Extent::new(
            mapping.texel_size.x.round() as u32,
            mapping.texel_size.y.round() as u32,
        );
        let tex = Extent::new(mapping.tex_width, mapping.tex_height);
        for (e, spec) in self.orig.iter_mut().enumerate() {
            *spec = TexSpec {
                texture: sources.get(e).copied().flatten(),
                image,
                tex,
            };
        }

        let count = self.passes.len() - usize::from(self.contains_final_blit());
        let saved = dctx.capture_render_view(ctx);
        let mut ran = vec![false; count];
        let mut result = Ok(());
        for (i, r) in ran.iter_mut().enumerate() {
            match self.update_pass(ctx, dctx, i, None) {
                Ok(did) => {
                    *r = did;
                    self.invalidated[i + 1] = did;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if result.is_ok() {
            for (i, _) in ran.iter().enumerate().filter(|(_, r)| **r) {
                if let Err(e) = self.submit_pass(ctx, dctx, i) {
                    result = Err(e);
                    break;
                }
            }
        }
        dctx.apply_render_view(ctx, &saved);
        if let Err(e) = &result {
            warn!(error = %e, "custom effect run failed");
        }
        result
    }

    fn run_final(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        view: &RenderView,
    ) -> ScanoutResult<()> {
        if !self.contains_final_blit() {
            return Ok(());
        }
        let last = self.passes.len() - 1;
        let saved = dctx.capture_render_view(ctx);
        let result = self
            .update_pass(ctx, dctx, last, Some(*view))
            .and_then(|ran| {
                self.invalidated[last + 1] = ran;
                self.submit_pass(ctx, dctx, last)
            });
        dctx.apply_render_view(ctx, &saved);
        if let Err(e) = &result {
            warn!(error = %e, "custom effect final pass failed");
        }
        result
    }

    fn post_run(&mut self, ctx: &mut dyn GraphicsContext, _dctx: &mut NodeContext) {
        ctx.end_scope();
    }

    fn compute_final_output_mapping(&self, src: Extent, viewport: Extent) -> SourceTexMapping {
        let Some(last) = self.passes.last() else {
            return SourceTexMapping::new(src.width, src.height, src.width, src.height);
        };
        let input = self.chain_render_size(self.passes.len() - 1, src, viewport);
        last.props.output_mapping(input, viewport, self.caps.non_pow2)
    }

    fn final_output(&self) -> Option<TextureHandle> {
        if self.contains_final_blit() {
            return None;
        }
        self.passes.last().and_then(|p| p.outputs[0].texture)
    }

    fn pass_infos(&self) -> Vec<PassInfo> {
        self.passes
            .iter()
            .enumerate()
            .map(|(i, p)| PassInfo {
                index: i as u32,
                output: p.outputs[0].image,
                format: p.output_format,
                cached: !self.invalidated.get(i + 1).copied().unwrap_or(false),
                elapsed: p.elapsed,
            })
            .collect()
    }

    fn on_pre_device_reset(&mut self, ctx: &mut dyn GraphicsContext) {
        for pass in &mut self.passes {
            if let Some(bp) = pass.backend.take() {
                self.backend.release_pass(ctx, bp);
            }
            Self::destroy_outputs(ctx, &mut pass.outputs);
        }
        self.backend.release(ctx);
        debug!(passes = self.passes.len(), "custom effect released for device reset");
    }

    fn on_post_device_reset(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
    ) -> ScanoutResult<()> {
        for pass in &mut self.passes {
            if pass.backend.is_none() {
                pass.backend =
                    Some(self.backend.create_pass(ctx, dctx, &pass.setup, &mut self.vars)?);
            }
        }
        self.reset_variables();
        self.new_frame = true;
        Ok(())
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.on_pre_device_reset(ctx);
        for c in self.custom.drain(..) {
            ctx.destroy(c.texture.into());
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effect/pipeline.rs"]
mod tests;
