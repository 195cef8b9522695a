use super::{DisplayNode, SourceNodeRef, draw_source, full_area};
use crate::device::{BuiltinProgram, GraphicsContext};
use crate::foundation::core::Rect;
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{CommandList, NodeContext, PoolTextureIndex, RenderView, VertexKind, quad_1t};

/// Blends every source row with the row `dy` lines away, the way a PAL decoder averages chroma
/// over adjacent lines.
pub struct ArtifactingNode {
    source: SourceNodeRef,
    list: CommandList,
    texture: PoolTextureIndex,
    dy: f32,
    dest_area: Option<Rect>,
    source_failed: bool,
}

impl ArtifactingNode {
    /// With `extended_output` the result is stored as `(v + 1) / 2` for a screen FX pass
    /// configured for signed input.
    pub fn init(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        source: SourceNodeRef,
        dy: f32,
        extended_output: bool,
    ) -> ScanoutResult<Self> {
        let mapping = source
            .try_borrow()
            .map(|s| s.texture_mapping())
            .map_err(|_| ScanoutError::validation("artifacting source is in use"))?;
        let texel = mapping.texel_uv();
        let [u0, v0, u1, v1] = mapping.uv_rect();
        let constants = [
            texel.x,
            texel.y,
            dy,
            if extended_output { 1.0 } else { 0.0 },
        ];
        let point = dctx.point_sampler();
        let bytes = ctx.builtin_program(BuiltinProgram::FragmentArtifacting);

        let mut list = CommandList::new();
        let texture = list.register_texture(None);
        list.add_mesh(ctx, dctx)
            .set_vertex_kind(VertexKind::Tex1)
            .set_fragment_program_bytecode(bytes)
            .set_fp_constants(&constants, 0)
            .set_textures(&[texture])
            .set_samplers(&[point])
            .set_transformed_vertices(&quad_1t(u0, v0, u1, v1))
            .set_topology_quad();

        if list.has_error() {
            list.shutdown(ctx);
            return Err(ScanoutError::device("artifacting node recording failed"));
        }
        Ok(Self {
            source,
            list,
            texture,
            dy,
            dest_area: None,
            source_failed: false,
        })
    }

    pub fn dy(&self) -> f32 {
        self.dy
    }

    pub fn set_dest_area(&mut self, area: Option<Rect>) {
        self.dest_area = area;
    }
}

impl DisplayNode for ArtifactingNode {
    fn name(&self) -> &'static str {
        "artifacting"
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

#[cfg(test)]
#[path = "../../tests/unit/nodes/artifacting.rs"]
mod tests;
