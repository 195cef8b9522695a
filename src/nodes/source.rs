use tracing::{debug, warn};

use super::{
    DisplayNodeRef, QueuedSourceNode, SourceNode, SourceTexMapping, upload_format, upload_pixmap,
};
use crate::device::{
    DeviceObject, Format, GraphicsContext, SurfaceRef, TextureDesc, TextureHandle, TextureUsage,
};
use crate::foundation::core::{Pixmap, PixmapFormat, Rect};
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{NodeContext, RenderView};

/// Ring of identically shaped textures; slot `current` is the one being produced.
#[derive(Debug)]
pub(crate) struct TextureQueue {
    desc: TextureDesc,
    textures: Vec<TextureHandle>,
    current: usize,
}

impl TextureQueue {
    pub(crate) fn new(desc: TextureDesc) -> Self {
        Self {
            desc,
            textures: Vec::new(),
            current: 0,
        }
    }

    pub(crate) fn desc(&self) -> TextureDesc {
        self.desc
    }

    pub(crate) fn len(&self) -> usize {
        self.textures.len()
    }

    /// Grow or shrink to `len` textures. Newly created textures are returned so the caller can
    /// initialize them.
    pub(crate) fn resize(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        len: u32,
    ) -> ScanoutResult<Vec<TextureHandle>> {
        let len = len.max(1) as usize;
        // Oldest first, newest last. Growth adds slots at the old end and shrinking drops them.
        let n = self.textures.len();
        if n > 0 {
            self.textures.rotate_left((self.current + 1) % n);
        }
        if n > len {
            for tex in self.textures.drain(..n - len) {
                ctx.destroy(DeviceObject::Texture(tex));
            }
        }
        self.current = self.textures.len().saturating_sub(1);
        let mut created = Vec::new();
        while self.textures.len() < len {
            let tex = ctx.create_texture(&self.desc)?;
            if !self.textures.is_empty() {
                self.current += 1;
            }
            self.textures.insert(0, tex);
            created.push(tex);
        }
        debug!(len, width = self.desc.width, height = self.desc.height, "texture queue resized");
        Ok(created)
    }

    pub(crate) fn advance(&mut self) {
        if !self.textures.is_empty() {
            self.current = (self.current + 1) % self.textures.len();
        }
    }

    pub(crate) fn current(&self) -> Option<TextureHandle> {
        self.textures.get(self.current).copied()
    }

    pub(crate) fn past(&self, past: u32) -> Option<TextureHandle> {
        let n = self.textures.len();
        let past = past as usize;
        if past >= n {
            return None;
        }
        self.textures.get((self.current + n - past) % n).copied()
    }

    pub(crate) fn release(&mut self, ctx: &mut dyn GraphicsContext) {
        for tex in self.textures.drain(..) {
            ctx.destroy(DeviceObject::Texture(tex));
        }
        self.current = 0;
    }
}

/// Wraps an externally owned texture.
#[derive(Debug)]
pub struct TextureSourceNode {
    texture: Option<TextureHandle>,
    mapping: SourceTexMapping,
    changed: bool,
}

impl TextureSourceNode {
    pub fn new(texture: TextureHandle, mapping: SourceTexMapping) -> Self {
        Self {
            texture: Some(texture),
            mapping,
            changed: true,
        }
    }

    /// Swap the wrapped texture. It must match the mapping given at construction.
    pub fn set_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
        self.changed = true;
    }
}

impl SourceNode for TextureSourceNode {
    fn texture_mapping(&self) -> SourceTexMapping {
        self.mapping
    }

    fn draw(
        &mut self,
        _ctx: &mut dyn GraphicsContext,
        _dctx: &mut NodeContext,
    ) -> Option<TextureHandle> {
        self.texture
    }

    fn content_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

/// Supplies uploaded frames, keeping a queue of recent ones.
///
/// Only frames that upload without conversion are accepted: `Xrgb8888` goes to a BGRA texture
/// and `Y8` to a single-channel one.
#[derive(Debug)]
pub struct ImageSourceNode {
    format: PixmapFormat,
    queue: TextureQueue,
    mapping: SourceTexMapping,
    changed: bool,
    error: bool,
}

impl ImageSourceNode {
    pub fn init(
        ctx: &mut dyn GraphicsContext,
        _dctx: &mut NodeContext,
        width: u32,
        height: u32,
        format: PixmapFormat,
    ) -> ScanoutResult<Self> {
        if format == PixmapFormat::Pal8 {
            return Err(ScanoutError::validation(
                "image sources cannot hold palettized frames",
            ));
        }
        let mut queue = TextureQueue::new(TextureDesc::shader(width, height, upload_format(format)));
        let created = queue.resize(ctx, 1)?;
        let mut node = Self {
            format,
            queue,
            mapping: SourceTexMapping::new(width, height, width, height),
            changed: true,
            error: false,
        };
        node.clear_textures(ctx, &created);
        Ok(node)
    }

    fn clear_textures(&mut self, ctx: &mut dyn GraphicsContext, textures: &[TextureHandle]) {
        let desc = self.queue.desc();
        let black = vec![0u8; desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel()];
        for &tex in textures {
            if let Err(e) = ctx.write_texture(
                tex,
                0,
                &black,
                desc.width as usize * desc.format.bytes_per_pixel(),
            ) {
                warn!(error = %e, "image source texture init failed");
                self.error = true;
            }
        }
    }

    /// Upload `px` into the current queue slot.
    pub fn load(&mut self, ctx: &mut dyn GraphicsContext, px: &Pixmap) -> ScanoutResult<()> {
        let desc = self.queue.desc();
        if px.format != self.format || px.width != desc.width || px.height != desc.height {
            return Err(ScanoutError::validation(format!(
                "image source is {}x{} {:?}, got {}x{} {:?}",
                desc.width, desc.height, self.format, px.width, px.height, px.format
            )));
        }
        let tex = self
            .queue
            .current()
            .ok_or_else(|| ScanoutError::device("image source has no textures"))?;
        upload_pixmap(ctx, tex, px)?;
        self.changed = true;
        Ok(())
    }
}

impl SourceNode for ImageSourceNode {
    fn texture_mapping(&self) -> SourceTexMapping {
        self.mapping
    }

    fn draw(
        &mut self,
        _ctx: &mut dyn GraphicsContext,
        _dctx: &mut NodeContext,
    ) -> Option<TextureHandle> {
        self.queue.current()
    }

    fn content_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    fn has_error(&self) -> bool {
        self.error
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.queue.release(ctx);
    }
}

impl QueuedSourceNode for ImageSourceNode {
    fn set_queue_length(&mut self, ctx: &mut dyn GraphicsContext, len: u32) -> ScanoutResult<()> {
        let created = self.queue.resize(ctx, len)?;
        self.clear_textures(ctx, &created);
        Ok(())
    }

    fn advance_queue(&mut self) {
        self.queue.advance();
    }

    fn result_texture(&self, past: u32) -> Option<TextureHandle> {
        self.queue.past(past)
    }
}

/// Renders a display subtree into a queue of render textures and supplies the result.
pub struct BufferSourceNode {
    out_area: Rect,
    queue: TextureQueue,
    mapping: SourceTexMapping,
    child: DisplayNodeRef,
    error: bool,
}

impl BufferSourceNode {
    /// `width x height` buffer in the node context's RGBA format, or its HDR format with `hdr`.
    /// The child draws into `out_area` of the buffer.
    pub fn init(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        out_area: Rect,
        width: u32,
        height: u32,
        hdr: bool,
        child: DisplayNodeRef,
    ) -> ScanoutResult<Self> {
        let formats = dctx.formats();
        let format = if hdr { formats.hdr } else { formats.rgba };
        Self::init_with_format(ctx, dctx, out_area, width, height, format, child)
    }

    pub fn init_with_format(
        ctx: &mut dyn GraphicsContext,
        _dctx: &mut NodeContext,
        out_area: Rect,
        width: u32,
        height: u32,
        format: Format,
        child: DisplayNodeRef,
    ) -> ScanoutResult<Self> {
        let usage = TextureUsage::SHADER | TextureUsage::RENDER;
        if !ctx.is_format_supported(format, usage) {
            return Err(ScanoutError::device(format!(
                "{format:?} cannot be used as a render target"
            )));
        }
        let mut queue = TextureQueue::new(TextureDesc::render_target(width, height, format));
        queue.resize(ctx, 1)?;
        Ok(Self {
            out_area,
            queue,
            mapping: SourceTexMapping::new(width, height, width, height),
            child,
            error: false,
        })
    }
}

impl SourceNode for BufferSourceNode {
    fn texture_mapping(&self) -> SourceTexMapping {
        self.mapping
    }

    fn draw(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
    ) -> Option<TextureHandle> {
        let target = self.queue.current()?;
        let desc = self.queue.desc();
        let Ok(mut child) = self.child.try_borrow_mut() else {
            warn!("buffer source child is already being drawn");
            self.error = true;
            return None;
        };

        let saved = dctx.capture_render_view(ctx);
        let view = RenderView::new(Some(SurfaceRef::level0(target)), desc.width, desc.height);
        dctx.apply_render_view(ctx, &view);
        ctx.clear(0);
        child.draw(ctx, dctx, &view.with_subrect(self.out_area));
        dctx.apply_render_view(ctx, &saved);

        Some(target)
    }

    fn has_error(&self) -> bool {
        self.error || self.child.try_borrow().is_ok_and(|c| c.has_error())
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.queue.release(ctx);
    }
}

impl QueuedSourceNode for BufferSourceNode {
    fn set_queue_length(&mut self, ctx: &mut dyn GraphicsContext, len: u32) -> ScanoutResult<()> {
        self.queue.resize(ctx, len).map(|_| ())
    }

    fn advance_queue(&mut self) {
        self.queue.advance();
    }

    fn result_texture(&self, past: u32) -> Option<TextureHandle> {
        self.queue.past(past)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/nodes/source.rs"]
mod tests;
