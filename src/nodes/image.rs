use super::{DisplayNode, full_area, upload_format, upload_palette, upload_pixmap};
use crate::device::{
    BuiltinProgram, DeviceObject, Format, GraphicsContext, SamplerHandle, TextureDesc,
    TextureHandle,
};
use crate::foundation::core::{Pixmap, PixmapFormat, Rect};
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{CommandList, NodeContext, PoolCommandIndex, RenderView, VertexKind, quad_1t};

fn create_palette_texture(ctx: &mut dyn GraphicsContext) -> ScanoutResult<TextureHandle> {
    let tex = ctx.create_texture(&TextureDesc::shader(256, 1, Format::Bgra8Unorm))?;
    if let Err(e) = upload_palette(ctx, tex, &[0; 256]) {
        ctx.destroy(DeviceObject::Texture(tex));
        return Err(e);
    }
    Ok(tex)
}

/// Draws a CPU-side image uploaded with [`load`](ImageNode::load).
///
/// `Xrgb8888` frames are blitted directly, `Y8` frames are expanded to gray and `Pal8` frames
/// are looked up in the pixmap's palette on the device.
pub struct ImageNode {
    format: PixmapFormat,
    width: u32,
    height: u32,
    image: TextureHandle,
    palette: Option<TextureHandle>,
    list: CommandList,
    mesh: PoolCommandIndex,
    bilinear: bool,
    dest_area: Option<Rect>,
}

impl ImageNode {
    pub fn init(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        width: u32,
        height: u32,
        format: PixmapFormat,
    ) -> ScanoutResult<Self> {
        let image = ctx.create_texture(&TextureDesc::shader(width, height, upload_format(format)))?;
        let palette = match format {
            PixmapFormat::Pal8 => match create_palette_texture(ctx) {
                Ok(tex) => Some(tex),
                Err(e) => {
                    ctx.destroy(DeviceObject::Texture(image));
                    return Err(e);
                }
            },
            _ => None,
        };

        let mut node = Self {
            format,
            width,
            height,
            image,
            palette,
            list: CommandList::new(),
            mesh: PoolCommandIndex::default(),
            bilinear: false,
            dest_area: None,
        };
        if let Err(e) = node.record(ctx, dctx) {
            node.shutdown(ctx);
            return Err(e);
        }
        Ok(node)
    }

    fn record(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext) -> ScanoutResult<()> {
        let program = match self.format {
            PixmapFormat::Xrgb8888 => dctx.blit_program(),
            PixmapFormat::Y8 => {
                let bytes = ctx.builtin_program(BuiltinProgram::FragmentBlitY);
                dctx.init_fp(ctx, bytes)?
            }
            PixmapFormat::Pal8 => {
                let bytes = ctx.builtin_program(BuiltinProgram::FragmentBlitPal8);
                dctx.init_fp(ctx, bytes)?
            }
        };

        let mut textures = vec![self.list.register_texture(Some(self.image))];
        if let Some(palette) = self.palette {
            textures.push(self.list.register_texture(Some(palette)));
        }
        let samplers = self.samplers(dctx);

        self.mesh = self
            .list
            .add_mesh(ctx, dctx)
            .set_vertex_kind(VertexKind::Tex1)
            .set_fragment_program(program)
            .set_textures(&textures)
            .set_samplers(&samplers)
            .set_transformed_vertices(&quad_1t(0.0, 0.0, 1.0, 1.0))
            .set_topology_quad()
            .command_index();

        if self.list.has_error() {
            return Err(ScanoutError::device("image node recording failed"));
        }
        Ok(())
    }

    fn samplers(&self, dctx: &NodeContext) -> Vec<SamplerHandle> {
        let image = if self.bilinear && self.can_stretch() {
            dctx.bilinear_sampler()
        } else {
            dctx.point_sampler()
        };
        match self.palette {
            Some(_) => vec![image, dctx.point_sampler()],
            None => vec![image],
        }
    }

    /// Whether the image can be filtered when drawn larger or smaller. Palettized images are
    /// only ever point sampled.
    pub fn can_stretch(&self) -> bool {
        self.format != PixmapFormat::Pal8
    }

    pub fn set_bilinear(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        bilinear: bool,
    ) {
        if self.bilinear == bilinear {
            return;
        }
        self.bilinear = bilinear;
        let samplers = self.samplers(dctx);
        if let Some(mut mesh) = self.list.update_mesh(ctx, dctx, self.mesh) {
            mesh.set_samplers(&samplers);
        }
    }

    /// Draw into `area` of the view instead of all of it.
    pub fn set_dest_area(&mut self, area: Option<Rect>) {
        self.dest_area = area;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Upload a new image; it must match the size and format given at init.
    pub fn load(&mut self, ctx: &mut dyn GraphicsContext, px: &Pixmap) -> ScanoutResult<()> {
        if px.format != self.format || px.width != self.width || px.height != self.height {
            return Err(ScanoutError::validation(format!(
                "image node is {}x{} {:?}, got {}x{} {:?}",
                self.width, self.height, self.format, px.width, px.height, px.format
            )));
        }
        upload_pixmap(ctx, self.image, px)?;
        if let Some(palette) = self.palette {
            let entries = px
                .palette
                .as_deref()
                .ok_or_else(|| ScanoutError::validation("palettized image without a palette"))?;
            upload_palette(ctx, palette, entries)?;
        }
        Ok(())
    }
}

impl DisplayNode for ImageNode {
    fn name(&self) -> &'static str {
        "image"
    }

    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        let area = self.dest_area.unwrap_or_else(|| full_area(view));
        dctx.apply_render_view_with_subrect(ctx, view, area);
        self.list.execute_all(ctx, dctx);
        dctx.apply_render_view(ctx, view);
    }

    fn has_error(&self) -> bool {
        self.list.has_error()
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.list.shutdown(ctx);
        ctx.destroy(DeviceObject::Texture(self.image));
        if let Some(palette) = self.palette.take() {
            ctx.destroy(DeviceObject::Texture(palette));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/nodes/image.rs"]
mod tests;
