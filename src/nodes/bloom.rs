use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{DisplayNode, SourceNodeRef, SourceTexMapping, clipped_view, draw_source};
use crate::device::{BuiltinProgram, DeviceObject, GraphicsContext, UavHandle};
use crate::foundation::core::{Float2, Rect};
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{
    BloomV2Settings, CommandList, NodeContext, PoolRenderViewId, PoolTextureIndex, RenderView,
    Vertex2T, VertexKind, quad_1t,
};

/// Pyramid levels below the full-size start level.
const V2_LEVELS: usize = 5;

/// Placement and strength of a bloom pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomParams {
    /// Where the result lands in the view, in pixels.
    pub dest_area: Rect,
    /// Pixels of the view the pass may touch; `None` allows the whole view.
    pub clip_area: Option<Rect>,
    /// Level below which pixels do not bloom (V1 only).
    pub threshold: f32,
    /// Blur radius in source pixels at an adjustment of 1.
    pub blur_base_radius: f32,
    /// User scale on the blur radius.
    pub blur_adjust_radius: f32,
    /// Weight of the unblurred image.
    pub direct_intensity: f32,
    /// Weight of the blurred glow.
    pub indirect_intensity: f32,
    pub render_linear: bool,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            dest_area: Rect::ZERO,
            clip_area: None,
            threshold: 0.0,
            blur_base_radius: 1.0,
            blur_adjust_radius: 1.0,
            direct_intensity: 1.0,
            indirect_intensity: 1.0,
            render_linear: false,
        }
    }
}

/// Inputs of [`compute_bloom_v2_params`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BloomV2ControlParams {
    pub base_radius: f32,
    pub adjust_radius: f32,
    pub direct_intensity: f32,
    pub indirect_intensity: f32,
    pub render_linear: bool,
}

impl From<&BloomParams> for BloomV2ControlParams {
    fn from(p: &BloomParams) -> Self {
        Self {
            base_radius: p.blur_base_radius,
            adjust_radius: p.blur_adjust_radius,
            direct_intensity: p.direct_intensity,
            indirect_intensity: p.indirect_intensity,
            render_linear: p.render_linear,
        }
    }
}

/// Derived per-pass constants of the V2 pyramid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BloomV2RenderParams {
    /// `(coarse, fine)` weights of the five upsample passes, coarsest first; entry 5 holds the
    /// weight of the finished pyramid in the final pass.
    pub pass_blend_factors: [Float2; 6],
    /// Cubic coefficients `(a, b, c, d)` of the tone shoulder.
    pub shoulder: [f32; 4],
    /// `(linear slope, shoulder start, limit, 0)`.
    pub thresholds: [f32; 4],
    /// Tap spacing of the direct filter, in texels.
    pub base_uv_step_scale: f32,
    /// Direct filter weights `(corner, side, center, 0)`.
    pub base_weights: [f32; 4],
}

impl BloomV2RenderParams {
    /// Total weight of the direct 3x3 filter.
    pub fn base_weight_sum(&self) -> f32 {
        self.base_weights[0] * 4.0 + self.base_weights[1] * 4.0 + self.base_weights[2]
    }
}

fn pyramid_filter(x: f32) -> f32 {
    if x >= 2.0 {
        2f32.powf(-1.5 * (x - 2.0))
    } else if x >= 1.0 {
        x - 1.0
    } else {
        0.0
    }
}

// Hermite cubic through (x1, y1) and (x2, y2) with slopes m1 and m2, expanded into
// a*x^3 + b*x^2 + c*x + d.
fn shoulder_cubic(x1: f32, m1: f32, y1: f32, x2: f32, m2: f32, y2: f32) -> [f32; 4] {
    let dx = x2 - x1;
    if dx < 1e-5 {
        return [0.0, 0.0, 0.0, y1];
    }
    let (m1, m2) = (m1 * dx, m2 * dx);
    let inv = 1.0 / dx;
    let a = (2.0 * (y1 - y2) + m1 + m2) * inv * inv * inv;
    let b = (3.0 * (y2 - y1) - 2.0 * m1 - m2) * inv * inv;
    let c = m1 * inv;
    let d = y1;
    [
        a,
        -3.0 * a * x1 + b,
        3.0 * a * x1 * x1 - 2.0 * b * x1 + c,
        -a * x1 * x1 * x1 + b * x1 * x1 - c * x1 + d,
    ]
}

/// Spread a blur radius over an 8-level pyramid and derive every pass constant.
pub fn compute_bloom_v2_params(
    control: &BloomV2ControlParams,
    settings: &BloomV2Settings,
) -> BloomV2RenderParams {
    // The reference glow is a 2.2 pixel wide gaussian at the finest level.
    let radius = (control.adjust_radius * control.base_radius / 2.2).max(0.001);
    let bias = radius.log2();

    let mut weights = [0.0f32; 8];
    for (i, w) in weights.iter_mut().enumerate() {
        *w = pyramid_filter(i as f32 - bias);
    }
    let total: f32 = weights.iter().sum();
    let scale = if total > 0.0 {
        control.indirect_intensity / total
    } else {
        0.0
    };
    for w in &mut weights {
        *w *= scale;
    }

    let mut out = BloomV2RenderParams::default();
    let mut running = 1.0f32;
    for i in (0..V2_LEVELS).rev() {
        let coarse = if i == V2_LEVELS - 1 { weights[i + 3] } else { 1.0 };
        let factors = Float2::new(coarse * running, weights[i + 2]);
        running = (factors.x + factors.y).clamp(0.01, 100.0);
        out.pass_blend_factors[V2_LEVELS - 1 - i] = factors * (1.0 / running);
    }
    out.pass_blend_factors[V2_LEVELS] = Float2::new(running, 0.0);

    let limit_x = settings.limit_x.max(0.1);
    let shoulder_x = settings.shoulder_x.clamp(0.0, limit_x);
    let shoulder_y = settings.shoulder_y.clamp(0.0, 1.0);
    let mid_slope = if shoulder_x > 0.0 {
        shoulder_y / shoulder_x
    } else {
        1.0
    };
    if control.render_linear {
        out.shoulder = [0.0; 4];
        out.thresholds = [mid_slope, 100.0, 100.0, 0.0];
    } else {
        out.shoulder = shoulder_cubic(
            shoulder_x,
            mid_slope,
            shoulder_y,
            limit_x,
            settings.limit_slope,
            1.0,
        );
        out.thresholds = [mid_slope, shoulder_x, limit_x, 0.0];
    }

    // The two finest levels are folded into a 3x3 filter over the source instead.
    let w01 = weights[0] + weights[1];
    let ratio = weights[1] / w01.max(1e-5);
    out.base_uv_step_scale = 1.0 + 0.2 * ratio;
    out.base_weights = [
        w01 * 25.0 / 256.0,
        w01 * 30.0 / 256.0,
        w01 * 36.0 / 256.0 + control.direct_intensity,
        0.0,
    ];
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BloomVersion {
    V1,
    V2,
}

/// Glow around bright areas of a source, composited over the unblurred image.
///
/// V1 thresholds, blurs separably and composites. V2 builds a six level pyramid (start, five
/// downsamples, five upsamples, final); its command list is recorded once and replayed until
/// the parameters or the node context's V2 settings change.
pub struct BloomNode {
    source: SourceNodeRef,
    mapping: SourceTexMapping,
    version: BloomVersion,
    params: BloomParams,
    list: CommandList,
    texture: PoolTextureIndex,
    output: PoolRenderViewId,
    uavs: Vec<UavHandle>,
    render_params: BloomV2RenderParams,
    change_counter: u32,
    built_counter: u32,
    built_generation: u32,
    remake_count: u32,
    remake_failed: bool,
    source_failed: bool,
}

impl BloomNode {
    pub fn init_v1(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        params: BloomParams,
        source: SourceNodeRef,
    ) -> ScanoutResult<Self> {
        Self::init(ctx, dctx, params, source, BloomVersion::V1)
    }

    pub fn init_v2(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        params: BloomParams,
        source: SourceNodeRef,
    ) -> ScanoutResult<Self> {
        Self::init(ctx, dctx, params, source, BloomVersion::V2)
    }

    fn init(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        params: BloomParams,
        source: SourceNodeRef,
        version: BloomVersion,
    ) -> ScanoutResult<Self> {
        if params.dest_area.width() <= 0.0 || params.dest_area.height() <= 0.0 {
            return Err(ScanoutError::validation("bloom destination is empty"));
        }
        let mapping = source
            .try_borrow()
            .map(|s| s.texture_mapping())
            .map_err(|_| ScanoutError::validation("bloom source is in use"))?;

        let mut node = Self {
            source,
            mapping,
            version,
            params,
            list: CommandList::new(),
            texture: PoolTextureIndex::default(),
            output: PoolRenderViewId::default(),
            uavs: Vec::new(),
            render_params: BloomV2RenderParams::default(),
            change_counter: 0,
            built_counter: 0,
            built_generation: 0,
            remake_count: 0,
            remake_failed: false,
            source_failed: false,
        };
        node.remake(ctx, dctx)?;
        Ok(node)
    }

    pub fn params(&self) -> &BloomParams {
        &self.params
    }

    /// Takes effect on the next draw. Identical parameters are ignored.
    pub fn set_params(&mut self, params: BloomParams) {
        if params != self.params {
            self.params = params;
            self.change_counter = self.change_counter.wrapping_add(1);
        }
    }

    /// Number of times the command list was recorded, including init.
    pub fn remake_count(&self) -> u32 {
        self.remake_count
    }

    /// Constants of the current V2 recording.
    pub fn render_params(&self) -> &BloomV2RenderParams {
        &self.render_params
    }

    fn needs_remake(&self, dctx: &NodeContext) -> bool {
        self.change_counter != self.built_counter
            || (self.version == BloomVersion::V2
                && dctx.bloom_v2_generation() != self.built_generation)
    }

    fn release(&mut self, ctx: &mut dyn GraphicsContext) {
        for uav in self.uavs.drain(..) {
            ctx.destroy(DeviceObject::Uav(uav));
        }
        self.list.clear(ctx);
    }

    fn remake(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext) -> ScanoutResult<()> {
        self.release(ctx);
        self.texture = self.list.register_texture(None);
        self.output = self.list.register_render_view(RenderView::default());
        match self.version {
            BloomVersion::V1 => self.record_v1(ctx, dctx),
            BloomVersion::V2 => self.record_v2(ctx, dctx),
        }

        self.built_counter = self.change_counter;
        self.built_generation = dctx.bloom_v2_generation();
        self.remake_count += 1;
        debug!(
            version = ?self.version,
            remakes = self.remake_count,
            commands = self.list.len(),
            "bloom recorded"
        );
        self.remake_failed = self.list.has_error();
        if self.remake_failed {
            self.release(ctx);
            return Err(ScanoutError::device("bloom recording failed"));
        }
        Ok(())
    }

    fn source_size(&self) -> (u32, u32) {
        (
            (self.mapping.texel_size.x.round() as u32).max(1),
            (self.mapping.texel_size.y.round() as u32).max(1),
        )
    }

    fn final_quad(&self) -> [Vertex2T; 4] {
        let [u0, v0, u1, v1] = self.mapping.uv_rect();
        [
            Vertex2T::new(-1.0, 1.0, Float2::new(u0, v0), Float2::new(0.0, 0.0)),
            Vertex2T::new(1.0, 1.0, Float2::new(u1, v0), Float2::new(1.0, 0.0)),
            Vertex2T::new(-1.0, -1.0, Float2::new(u0, v1), Float2::new(0.0, 1.0)),
            Vertex2T::new(1.0, -1.0, Float2::new(u1, v1), Float2::new(1.0, 1.0)),
        ]
    }

    fn record_v1(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext) {
        let p = self.params;
        let (w, h) = self.source_size();
        let [u0, v0, u1, v1] = self.mapping.uv_rect();
        let format = dctx.formats().rgba;
        let bilinear = dctx.bilinear_sampler();
        let threshold = ctx.builtin_program(BuiltinProgram::FragmentBloomThreshold);
        let blur = ctx.builtin_program(BuiltinProgram::FragmentBloomBlur);
        let composite = ctx.builtin_program(BuiltinProgram::FragmentBloomFinal);

        // Five taps two steps apart on either side span the radius.
        let step = (p.blur_base_radius * p.blur_adjust_radius * 0.5).max(0.5);
        let gain = 1.0 / (1.0 - p.threshold.clamp(0.0, 0.99));
        let quad = quad_1t(0.0, 0.0, 1.0, 1.0);
        let final_quad = self.final_quad();

        let list = &mut self.list;
        let bright = list.add_temp_texture(ctx, w, h, format, 1);
        let blurred = list.add_temp_texture(ctx, w, h, format, 1);

        {
            let mut mesh = list.add_mesh(ctx, dctx);
            mesh.set_vertex_kind(VertexKind::Tex1)
                .set_fragment_program_bytecode(threshold)
                .set_fp_constants(&[p.threshold, gain, 0.0, 0.0], 0)
                .set_textures(&[self.texture])
                .set_samplers(&[bilinear])
                .set_vertices(&quad_1t(u0, v0, u1, v1))
                .set_topology_quad();
            mesh.set_render_view_texture(bright, 0, true);
        }
        for (input, target, dir) in [
            (bright, blurred, Float2::new(step / w as f32, 0.0)),
            (blurred, bright, Float2::new(0.0, step / h as f32)),
        ] {
            let mut mesh = list.add_mesh(ctx, dctx);
            mesh.set_vertex_kind(VertexKind::Tex1)
                .set_fragment_program_bytecode(blur)
                .set_fp_constants(&[dir.x, dir.y, 0.0, 0.0], 0)
                .set_textures(&[input])
                .set_samplers(&[bilinear])
                .set_vertices(&quad)
                .set_topology_quad();
            mesh.set_render_view_texture(target, 0, true);
        }
        list.add_mesh(ctx, dctx)
            .set_vertex_kind(VertexKind::Tex2)
            .set_fragment_program_bytecode(composite)
            .set_fp_constants(&[p.direct_intensity, p.indirect_intensity, 0.0, 0.0], 0)
            .set_textures(&[self.texture, bright])
            .set_samplers(&[bilinear, bilinear])
            .set_transformed_vertices(&final_quad)
            .set_topology_quad()
            .set_render_view(self.output);
    }

    fn record_v2(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext) {
        let rp = compute_bloom_v2_params(
            &BloomV2ControlParams::from(&self.params),
            &dctx.bloom_v2_settings(),
        );
        self.render_params = rp;

        let (w, h) = self.source_size();
        let [u0, v0, u1, v1] = self.mapping.uv_rect();
        let format = dctx.formats().hdr;
        let bilinear = dctx.bilinear_sampler();
        let start_fp = ctx.builtin_program(BuiltinProgram::FragmentBloomThreshold);
        let start_cp = ctx.builtin_program(BuiltinProgram::ComputeBloomThreshold);
        let down = ctx.builtin_program(BuiltinProgram::FragmentBloomDown);
        let up = ctx.builtin_program(BuiltinProgram::FragmentBloomUp);
        let composite = ctx.builtin_program(BuiltinProgram::FragmentBloomFinal);
        let quad = quad_1t(0.0, 0.0, 1.0, 1.0);
        let final_quad = self.final_quad();
        let sizes: Vec<(u32, u32)> = (0..=V2_LEVELS)
            .map(|i| ((w >> i).max(1), (h >> i).max(1)))
            .collect();

        let list = &mut self.list;
        let levels: Vec<PoolTextureIndex> = sizes
            .iter()
            .map(|&(lw, lh)| list.add_temp_texture(ctx, lw, lh, format, 1))
            .collect();
        let blended: Vec<PoolTextureIndex> = sizes[..V2_LEVELS]
            .iter()
            .map(|&(lw, lh)| list.add_temp_texture(ctx, lw, lh, format, 1))
            .collect();

        // The compute start pass writes texel centers of the level directly, so it only fits a
        // source that fills its texture.
        let full_texture = u0 == 0.0 && v0 == 0.0 && u1 == 1.0 && v1 == 1.0;
        let start_uav = if ctx.caps().compute && full_texture {
            match list.texture(levels[0]).map(|t| ctx.create_uav(t)) {
                Some(Ok(uav)) => Some(uav),
                _ => None,
            }
        } else {
            None
        };
        let start = [0.0f32, 1.0, 0.0, 0.0];
        match start_uav {
            Some(uav) => {
                self.uavs.push(uav);
                list.add_dispatch(ctx, dctx)
                    .set_program_bytecode(start_cp)
                    .set_constants(bytemuck::bytes_of(&start))
                    .set_textures(&[self.texture])
                    .set_samplers(&[bilinear])
                    .set_uavs(&[Some(uav)])
                    .set_thread_groups(w.div_ceil(8), h.div_ceil(8), 1);
            }
            None => {
                let mut mesh = list.add_mesh(ctx, dctx);
                mesh.set_vertex_kind(VertexKind::Tex1)
                    .set_fragment_program_bytecode(start_fp)
                    .set_fp_constants(&start, 0)
                    .set_textures(&[self.texture])
                    .set_samplers(&[bilinear])
                    .set_vertices(&quad_1t(u0, v0, u1, v1))
                    .set_topology_quad();
                mesh.set_render_view_texture(levels[0], 0, true);
            }
        }

        for i in 1..=V2_LEVELS {
            let (pw, ph) = sizes[i - 1];
            let texel = [1.0 / pw as f32, 1.0 / ph as f32, 0.0, 0.0];
            let mut mesh = list.add_mesh(ctx, dctx);
            mesh.set_vertex_kind(VertexKind::Tex1)
                .set_fragment_program_bytecode(down)
                .set_fp_constants(&texel, 0)
                .set_textures(&[levels[i - 1]])
                .set_samplers(&[bilinear])
                .set_vertices(&quad)
                .set_topology_quad();
            mesh.set_render_view_texture(levels[i], 0, true);
        }

        for pass in 0..V2_LEVELS {
            let level = V2_LEVELS - 1 - pass;
            let coarse = if pass == 0 {
                levels[V2_LEVELS]
            } else {
                blended[level + 1]
            };
            let f = rp.pass_blend_factors[pass];
            let mut mesh = list.add_mesh(ctx, dctx);
            mesh.set_vertex_kind(VertexKind::Tex1)
                .set_fragment_program_bytecode(up)
                .set_fp_constants(&[f.x, f.y, 0.0, 0.0], 0)
                .set_textures(&[coarse, levels[level]])
                .set_samplers(&[bilinear, bilinear])
                .set_vertices(&quad)
                .set_topology_quad();
            mesh.set_render_view_texture(blended[level], 0, true);
        }

        let weights = [
            rp.base_weight_sum(),
            rp.pass_blend_factors[V2_LEVELS].x,
            0.0,
            0.0,
        ];
        list.add_mesh(ctx, dctx)
            .set_vertex_kind(VertexKind::Tex2)
            .set_fragment_program_bytecode(composite)
            .set_fp_constants(&weights, 0)
            .set_textures(&[self.texture, blended[0]])
            .set_samplers(&[bilinear, bilinear])
            .set_transformed_vertices(&final_quad)
            .set_topology_quad()
            .set_render_view(self.output);
    }
}

impl DisplayNode for BloomNode {
    fn name(&self) -> &'static str {
        "bloom"
    }

    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        if self.needs_remake(dctx)
            && let Err(e) = self.remake(ctx, dctx)
        {
            warn!(error = %e, "bloom rebuild failed");
            return;
        }
        let texture = draw_source(&self.source, ctx, dctx);
        self.source_failed = texture.is_none();
        if self.source_failed {
            return;
        }
        self.list.set_texture(self.texture, texture);
        self.list.set_render_view(
            self.output,
            clipped_view(view, self.params.dest_area, self.params.clip_area),
        );
        self.list.execute_all(ctx, dctx);
        dctx.apply_render_view(ctx, view);
    }

    fn has_error(&self) -> bool {
        self.remake_failed || self.source_failed || self.list.has_error()
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.release(ctx);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/nodes/bloom.rs"]
mod tests;
