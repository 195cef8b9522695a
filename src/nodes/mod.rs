//! The display node graph.
//!
//! Display nodes draw into a [`RenderView`]; source nodes produce a texture for display nodes to
//! sample. Nodes are shared through `Rc<RefCell<..>>` so a source can feed several consumers and a
//! sequence can own heterogeneous children. Every call borrows the device and the
//! [`NodeContext`] for its duration only.

mod artifacting;
mod basic;
mod bloom;
mod blit;
mod custom_effect;
mod image;
mod screenfx;
mod source;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

pub use artifacting::ArtifactingNode;
pub use basic::{ClearNode, SequenceNode};
pub use bloom::{
    BloomNode, BloomParams, BloomV2ControlParams, BloomV2RenderParams, compute_bloom_v2_params,
};
pub use blit::{BicubicNode, BicubicParams, BlitNode};
pub use custom_effect::{
    CustomEffectNode, CustomEffectPipelineNode, CustomEffectPipelineRef, CustomEffectSourceNode,
};
pub use image::ImageNode;
pub use screenfx::{
    BasicScreenFxTextures, DistortionMapper, ScreenFxNode, ScreenFxParams, ScreenFxTextureBuilder,
    ScreenMaskParams, ScreenMaskType,
};
pub use source::{BufferSourceNode, ImageSourceNode, TextureSourceNode};

use crate::device::{Format, GraphicsContext, TextureHandle, Viewport};
use crate::foundation::core::{Float2, Pixmap, PixmapFormat, Rect};
use crate::foundation::error::ScanoutResult;
use crate::render::{NodeContext, RenderView, SoftViewport};

/// Where a source's image sits inside its texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceTexMapping {
    /// Top-left of the image in UV space.
    pub uv_offset: Float2,
    /// Top-left of the image in texels.
    pub texel_offset: Float2,
    /// Extent of the image in UV space.
    pub uv_size: Float2,
    /// Extent of the image in texels.
    pub texel_size: Float2,
    pub tex_width: u32,
    pub tex_height: u32,
}

impl SourceTexMapping {
    /// A `w x h` image at the origin of a `tex_width x tex_height` texture.
    pub fn new(w: u32, h: u32, tex_width: u32, tex_height: u32) -> Self {
        Self {
            uv_offset: Float2::ZERO,
            texel_offset: Float2::ZERO,
            uv_size: Float2::new(
                w as f32 / tex_width.max(1) as f32,
                h as f32 / tex_height.max(1) as f32,
            ),
            texel_size: Float2::new(w as f32, h as f32),
            tex_width,
            tex_height,
        }
    }

    /// Size of one texel in UV space.
    pub fn texel_uv(&self) -> Float2 {
        Float2::new(
            1.0 / self.tex_width.max(1) as f32,
            1.0 / self.tex_height.max(1) as f32,
        )
    }

    /// UV rectangle `(u0, v0, u1, v1)` covering the image.
    pub fn uv_rect(&self) -> [f32; 4] {
        let end = self.uv_offset + self.uv_size;
        [self.uv_offset.x, self.uv_offset.y, end.x, end.y]
    }
}

/// A node that draws into a render view.
pub trait DisplayNode {
    /// Short label for debug scopes.
    fn name(&self) -> &'static str;

    /// Draw into `view`. Failures are recorded, not returned; see [`has_error`](Self::has_error).
    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView);

    /// Whether recording or the last draw failed anywhere in this node or its children.
    fn has_error(&self) -> bool {
        false
    }

    /// Release device objects owned by the node.
    fn shutdown(&mut self, _ctx: &mut dyn GraphicsContext) {}
}

/// A node that supplies a texture.
pub trait SourceNode {
    /// Placement of the image in the texture [`draw`](Self::draw) returns. Valid from init on and
    /// identical across draws; consumers capture it once.
    fn texture_mapping(&self) -> SourceTexMapping;

    /// Produce this frame's texture, rendering it first if needed. Only the latest returned
    /// texture is valid.
    fn draw(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
    ) -> Option<TextureHandle>;

    /// Whether the image changed since the last call. Sources that cannot tell report `true`.
    fn content_changed(&mut self) -> bool {
        true
    }

    fn has_error(&self) -> bool {
        false
    }

    fn shutdown(&mut self, _ctx: &mut dyn GraphicsContext) {}
}

/// A source that keeps a window of its recent output textures.
pub trait QueuedSourceNode: SourceNode {
    /// Keep `len` (at least 1) output textures.
    fn set_queue_length(&mut self, ctx: &mut dyn GraphicsContext, len: u32) -> ScanoutResult<()>;

    /// Move to the next queue slot; the next draw overwrites the oldest retained texture.
    fn advance_queue(&mut self);

    /// Output `past` frames back from the current slot; `None` past the queue length.
    fn result_texture(&self, past: u32) -> Option<TextureHandle>;
}

pub type DisplayNodeRef = Rc<RefCell<dyn DisplayNode>>;
pub type SourceNodeRef = Rc<RefCell<dyn SourceNode>>;
pub type QueuedSourceNodeRef = Rc<RefCell<dyn QueuedSourceNode>>;

/// Wrap a node for sharing.
pub fn shared<T>(node: T) -> Rc<RefCell<T>> {
    Rc::new(RefCell::new(node))
}

/// Texture format used to upload a pixmap of `format`.
pub(crate) fn upload_format(format: PixmapFormat) -> Format {
    match format {
        PixmapFormat::Xrgb8888 => Format::Bgra8Unorm,
        PixmapFormat::Y8 | PixmapFormat::Pal8 => Format::R8Unorm,
    }
}

/// Upload `px` into mip 0 of `texture`. `0x00RRGGBB` data is made opaque on the way.
pub(crate) fn upload_pixmap(
    ctx: &mut dyn GraphicsContext,
    texture: TextureHandle,
    px: &Pixmap,
) -> ScanoutResult<()> {
    match px.format {
        PixmapFormat::Xrgb8888 => {
            let mut rows = px.packed_rows();
            for texel in rows.chunks_exact_mut(4) {
                texel[3] = 0xff;
            }
            ctx.write_texture(texture, 0, &rows, px.width as usize * 4)
        }
        PixmapFormat::Y8 | PixmapFormat::Pal8 => {
            ctx.write_texture(texture, 0, &px.data, px.pitch)
        }
    }
}

/// Upload a 256-entry `0x00RRGGBB` palette into a 256x1 BGRA texture.
pub(crate) fn upload_palette(
    ctx: &mut dyn GraphicsContext,
    texture: TextureHandle,
    palette: &[u32; 256],
) -> ScanoutResult<()> {
    let opaque: Vec<u32> = palette.iter().map(|c| c | 0xff00_0000).collect();
    ctx.write_texture(texture, 0, bytemuck::cast_slice(&opaque), 256 * 4)
}

/// Default destination: the whole view.
pub(crate) fn full_area(view: &RenderView) -> Rect {
    Rect::new(
        0.0,
        0.0,
        f64::from(view.viewport.width),
        f64::from(view.viewport.height),
    )
}

/// `view` narrowed to draw at `dest`, touching only the `clip` pixels when given.
pub(crate) fn clipped_view(view: &RenderView, dest: Rect, clip: Option<Rect>) -> RenderView {
    let Some(clip) = clip else {
        return view.with_subrect(dest);
    };
    let clip = clip.intersect(full_area(view));
    let width = clip.width().round().max(1.0) as u32;
    let height = clip.height().round().max(1.0) as u32;
    let viewport = Viewport {
        x: view.viewport.x + clip.x0.round() as i32,
        y: view.viewport.y + clip.y0.round() as i32,
        width,
        height,
    };
    RenderView {
        viewport,
        soft_viewport: SoftViewport::IDENTITY.with_subrect(
            width,
            height,
            dest - clip.origin().to_vec2(),
        ),
        ..*view
    }
}

/// Pull this frame's texture from a shared source. `None` (with a warning) if the source is
/// already borrowed or produced nothing.
pub(crate) fn draw_source(
    source: &SourceNodeRef,
    ctx: &mut dyn GraphicsContext,
    dctx: &mut NodeContext,
) -> Option<TextureHandle> {
    let Ok(mut source) = source.try_borrow_mut() else {
        warn!("source node is already being drawn");
        return None;
    };
    let texture = source.draw(ctx, dctx);
    if texture.is_none() {
        warn!("source node produced no texture");
    }
    texture
}
