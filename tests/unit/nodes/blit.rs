use super::*;
use crate::device::{Format, SoftContext, TextureDesc, TextureHandle};
use crate::nodes::{TextureSourceNode, shared};
use crate::render::NodeContextOpts;

fn setup(w: u32, h: u32) -> (SoftContext, NodeContext, RenderView) {
    let mut ctx = SoftContext::new(w, h);
    let dctx = NodeContext::init(&mut ctx, NodeContextOpts::default()).unwrap();
    (ctx, dctx, RenderView::new(None, w, h))
}

fn texture(ctx: &mut SoftContext, w: u32, h: u32, pixels: &[u32]) -> TextureHandle {
    let tex = ctx
        .create_texture(&TextureDesc::shader(w, h, Format::Bgra8Unorm))
        .unwrap();
    ctx.write_texture(tex, 0, bytemuck::cast_slice(pixels), w as usize * 4)
        .unwrap();
    tex
}

fn red(px: u32) -> u32 {
    (px >> 16) & 0xff
}

#[test]
fn point_blit_copies_texels() {
    let (mut ctx, mut dctx, view) = setup(2, 1);
    let tex = texture(&mut ctx, 2, 1, &[0xFFFF_0000, 0xFF00_00FF]);
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(2, 1, 2, 1)));
    let mut node = BlitNode::init(&mut ctx, &mut dctx, source, false, Float2::ONE).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFFFF_0000));
    assert_eq!(ctx.backbuffer_pixel(1, 0), Some(0xFF00_00FF));
}

#[test]
fn blit_respects_the_source_mapping() {
    let (mut ctx, mut dctx, view) = setup(2, 2);
    // Image is the top-left 1x1 of a 2x2 texture.
    let tex = texture(
        &mut ctx,
        2,
        2,
        &[0xFF00_FF00, 0xFFFF_FFFF, 0xFFFF_FFFF, 0xFFFF_FFFF],
    );
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(1, 1, 2, 2)));
    let mut node = BlitNode::init(&mut ctx, &mut dctx, source, false, Float2::ONE).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        assert_eq!(ctx.backbuffer_pixel(x, y), Some(0xFF00_FF00));
    }
}

#[test]
fn sharp_blit_narrows_the_transition() {
    let (mut ctx, mut dctx, view) = setup(8, 1);
    let tex = texture(&mut ctx, 2, 1, &[0xFF00_0000, 0xFFFF_FFFF]);
    let mapping = SourceTexMapping::new(2, 1, 2, 1);

    let soft = shared(TextureSourceNode::new(tex, mapping));
    let mut bilinear = BlitNode::init(&mut ctx, &mut dctx, soft, true, Float2::ONE).unwrap();
    bilinear.draw(&mut ctx, &mut dctx, &view);
    let soft_value = red(ctx.backbuffer_pixel(2, 0).unwrap());

    let crisp = shared(TextureSourceNode::new(tex, mapping));
    let mut sharp =
        BlitNode::init(&mut ctx, &mut dctx, crisp, true, Float2::new(8.0, 8.0)).unwrap();
    sharp.draw(&mut ctx, &mut dctx, &view);
    let sharp_value = red(ctx.backbuffer_pixel(2, 0).unwrap());

    assert!(soft_value > 0);
    assert!(sharp_value < soft_value);
    assert!(!sharp.has_error());
}

#[test]
fn dest_area_places_the_blit() {
    let (mut ctx, mut dctx, view) = setup(4, 4);
    ctx.clear(0xFF00_0000);
    let tex = texture(&mut ctx, 1, 1, &[0xFFFF_FFFF]);
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(1, 1, 1, 1)));
    let mut node = BlitNode::init(&mut ctx, &mut dctx, source, false, Float2::ONE).unwrap();
    node.set_dest_area(Some(Rect::new(0.0, 2.0, 2.0, 4.0)));
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(0, 3), Some(0xFFFF_FFFF));
    assert_eq!(ctx.backbuffer_pixel(3, 3), Some(0xFF00_0000));
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFF00_0000));
    assert_eq!(dctx.capture_render_view(&ctx), view);
}

#[test]
fn missing_source_texture_is_reported() {
    let (mut ctx, mut dctx, view) = setup(2, 2);
    let tex = texture(&mut ctx, 1, 1, &[0xFFFF_FFFF]);
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(1, 1, 1, 1)));
    let mut node =
        BlitNode::init(&mut ctx, &mut dctx, source.clone(), false, Float2::ONE).unwrap();
    source.borrow_mut().set_texture(None);
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(node.has_error());

    source.borrow_mut().set_texture(Some(tex));
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
}

#[test]
fn bicubic_keeps_flat_color_flat() {
    let (mut ctx, mut dctx, view) = setup(6, 6);
    let tex = texture(&mut ctx, 2, 2, &[0xFF40_80C0; 4]);
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(2, 2, 2, 2)));
    let params = BicubicParams::fill(Rect::new(0.0, 0.0, 6.0, 6.0));
    let mut node = BicubicNode::init(&mut ctx, &mut dctx, source, params).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    for (x, y) in [(0, 0), (2, 3), (5, 5)] {
        assert_eq!(ctx.backbuffer_pixel(x, y), Some(0xFF40_80C0));
    }
    // The device is left on the caller's view.
    assert_eq!(dctx.capture_render_view(&ctx), view);
}

#[test]
fn bicubic_stretch_ramps_between_texels() {
    let (mut ctx, mut dctx, view) = setup(8, 1);
    let tex = texture(&mut ctx, 2, 1, &[0xFF00_0000, 0xFFFF_FFFF]);
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(2, 1, 2, 1)));
    let params = BicubicParams::fill(Rect::new(0.0, 0.0, 8.0, 1.0));
    let mut node = BicubicNode::init(&mut ctx, &mut dctx, source, params).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);

    let left = red(ctx.backbuffer_pixel(0, 0).unwrap());
    let middle = red(ctx.backbuffer_pixel(4, 0).unwrap());
    let right = red(ctx.backbuffer_pixel(7, 0).unwrap());
    assert!(left < middle && middle < right);
    assert_eq!(left, 0);
    assert_eq!(right, 0xff);
}

#[test]
fn bicubic_owns_its_intermediate_texture() {
    let (mut ctx, mut dctx, _) = setup(4, 4);
    let tex = texture(&mut ctx, 2, 2, &[0xFFFF_FFFF; 4]);
    let live = ctx.live_textures();
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(2, 2, 2, 2)));
    let mut node = BicubicNode::init(
        &mut ctx,
        &mut dctx,
        source,
        BicubicParams::fill(Rect::new(0.0, 0.0, 4.0, 4.0)),
    )
    .unwrap();
    assert_eq!(ctx.live_textures(), live + 1);
    node.shutdown(&mut ctx);
    assert_eq!(ctx.live_textures(), live);
}
