use super::{DisplayNode, SourceNodeRef, SourceTexMapping, draw_source, full_area};
use crate::device::{BuiltinProgram, GraphicsContext};
use crate::foundation::core::{Float2, Rect};
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{
    CommandList, NodeContext, PoolRenderViewId, PoolTextureIndex, RenderView, VertexKind, quad_1t,
};

fn source_mapping(source: &SourceNodeRef, what: &str) -> ScanoutResult<SourceTexMapping> {
    source
        .try_borrow()
        .map(|s| s.texture_mapping())
        .map_err(|_| ScanoutError::validation(format!("{what} source is in use")))
}

/// Copies a source's image into the view, point sampled, bilinear, or bilinear with sharpened
/// texel transitions.
pub struct BlitNode {
    source: SourceNodeRef,
    list: CommandList,
    texture: PoolTextureIndex,
    dest_area: Option<Rect>,
    source_failed: bool,
}

impl BlitNode {
    /// `sharpness` of 1 on both axes is plain bilinear filtering; larger values narrow the
    /// blend between neighboring texels. Ignored without `linear`.
    pub fn init(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        source: SourceNodeRef,
        linear: bool,
        sharpness: Float2,
    ) -> ScanoutResult<Self> {
        let mapping = source_mapping(&source, "blit")?;
        let [u0, v0, u1, v1] = mapping.uv_rect();
        let sharp = linear && (sharpness.x > 1.0 || sharpness.y > 1.0);
        let sampler = if linear {
            dctx.bilinear_sampler()
        } else {
            dctx.point_sampler()
        };
        let blit = dctx.blit_program();
        let sharp_bytes = ctx.builtin_program(BuiltinProgram::FragmentBlitSharp);

        let mut list = CommandList::new();
        let texture = list.register_texture(None);
        {
            let mut mesh = list.add_mesh(ctx, dctx);
            mesh.set_vertex_kind(VertexKind::Tex1)
                .set_textures(&[texture])
                .set_samplers(&[sampler])
                .set_transformed_vertices(&quad_1t(u0, v0, u1, v1))
                .set_topology_quad();
            if sharp {
                let constants = [
                    sharpness.x,
                    sharpness.y,
                    mapping.tex_width as f32,
                    mapping.tex_height as f32,
                ];
                mesh.set_fragment_program_bytecode(sharp_bytes)
                    .set_fp_constants(&constants, 0);
            } else {
                mesh.set_fragment_program(blit);
            }
        }

        if list.has_error() {
            list.shutdown(ctx);
            return Err(ScanoutError::device("blit node recording failed"));
        }
        Ok(Self {
            source,
            list,
            texture,
            dest_area: None,
            source_failed: false,
        })
    }

    /// Draw into `area` of the view instead of all of it.
    pub fn set_dest_area(&mut self, area: Option<Rect>) {
        self.dest_area = area;
    }
}

impl DisplayNode for BlitNode {
    fn name(&self) -> &'static str {
        "blit"
    }

    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        let texture = draw_source(&self.source, ctx, dctx);
        self.source_failed = texture.is_none();
        if self.source_failed {
            return;
        }
        self.list.set_texture(self.texture, texture);
        let area = self.dest_area.unwrap_or_else(|| full_area(view));
        dctx.apply_render_view_with_subrect(ctx, view, area);
        self.list.execute_all(ctx, dctx);
        dctx.apply_render_view(ctx, view);
    }

    fn has_error(&self) -> bool {
        self.source_failed || self.list.has_error()
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.list.shutdown(ctx);
    }
}

/// Placement of a bicubic stretch.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BicubicParams {
    /// Width the image is stretched to; the horizontal pass renders at this width.
    pub dst_width: u32,
    /// Height the image is stretched to.
    pub dst_height: u32,
    /// Where the stretched image lands in the view, in pixels.
    pub dest_area: Rect,
}

impl BicubicParams {
    /// Stretch to exactly fill `area`.
    pub fn fill(area: Rect) -> Self {
        Self {
            dst_width: area.width().round().max(1.0) as u32,
            dst_height: area.height().round().max(1.0) as u32,
            dest_area: area,
        }
    }
}

/// Separable bicubic stretch: a horizontal pass into an intermediate texture of the output
/// width and source height, then a vertical pass into the view.
pub struct BicubicNode {
    source: SourceNodeRef,
    params: BicubicParams,
    list: CommandList,
    texture: PoolTextureIndex,
    output: PoolRenderViewId,
    source_failed: bool,
}

impl BicubicNode {
    pub fn init(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        source: SourceNodeRef,
        params: BicubicParams,
    ) -> ScanoutResult<Self> {
        let mapping = source_mapping(&source, "bicubic")?;
        if params.dst_width == 0 || params.dst_height == 0 {
            return Err(ScanoutError::validation("bicubic output size is empty"));
        }
        let src_height = (mapping.texel_size.y.round() as u32).max(1);
        let [u0, v0, u1, v1] = mapping.uv_rect();
        let point = dctx.point_sampler();
        let format = dctx.formats().rgba;
        let h_bytes = ctx.builtin_program(BuiltinProgram::FragmentBicubicH);
        let v_bytes = ctx.builtin_program(BuiltinProgram::FragmentBicubicV);

        let mut list = CommandList::new();
        let texture = list.register_texture(None);
        let temp = list.add_temp_texture(ctx, params.dst_width, src_height, format, 1);
        let output = list.register_render_view(RenderView::default());

        {
            let mut mesh = list.add_mesh(ctx, dctx);
            mesh.set_vertex_kind(VertexKind::Tex1)
                .set_fragment_program_bytecode(h_bytes)
                .set_fp_constants(
                    &[mapping.tex_width as f32, mapping.tex_height as f32, 0.0, 0.0],
                    0,
                )
                .set_textures(&[texture])
                .set_samplers(&[point])
                .set_vertices(&quad_1t(u0, v0, u1, v1))
                .set_topology_quad();
            mesh.set_render_view_texture(temp, 0, false);
        }
        list.add_mesh(ctx, dctx)
            .set_vertex_kind(VertexKind::Tex1)
            .set_fragment_program_bytecode(v_bytes)
            .set_fp_constants(&[params.dst_width as f32, src_height as f32, 0.0, 0.0], 0)
            .set_textures(&[temp])
            .set_samplers(&[point])
            .set_transformed_vertices(&quad_1t(0.0, 0.0, 1.0, 1.0))
            .set_topology_quad()
            .set_render_view(output);

        if list.has_error() {
            list.shutdown(ctx);
            return Err(ScanoutError::device("bicubic node recording failed"));
        }
        Ok(Self {
            source,
            params,
            list,
            texture,
            output,
            source_failed: false,
        })
    }

    pub fn params(&self) -> BicubicParams {
        self.params
    }
}

impl DisplayNode for BicubicNode {
    fn name(&self) -> &'static str {
        "bicubic"
    }

    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        let texture = draw_source(&self.source, ctx, dctx);
        self.source_failed = texture.is_none();
        if self.source_failed {
            return;
        }
        self.list.set_texture(self.texture, texture);
        self.list
            .set_render_view(self.output, view.with_subrect(self.params.dest_area));
        self.list.execute_all(ctx, dctx);
        dctx.apply_render_view(ctx, view);
    }

    fn has_error(&self) -> bool {
        self.source_failed || self.list.has_error()
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.list.shutdown(ctx);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/nodes/blit.rs"]
mod tests;
