use super::*;
use crate::device::SoftContext;
use crate::nodes::{ClearNode, shared};
use crate::render::NodeContextOpts;

fn setup() -> (SoftContext, NodeContext) {
    let mut ctx = SoftContext::new(4, 4);
    let dctx = NodeContext::init(&mut ctx, NodeContextOpts::default()).unwrap();
    (ctx, dctx)
}

#[test]
fn texture_source_returns_the_wrapped_texture() {
    let (mut ctx, mut dctx) = setup();
    let tex = ctx
        .create_texture(&TextureDesc::shader(8, 8, Format::Bgra8Unorm))
        .unwrap();
    let mapping = SourceTexMapping::new(6, 4, 8, 8);
    let mut node = TextureSourceNode::new(tex, mapping);
    assert_eq!(node.draw(&mut ctx, &mut dctx), Some(tex));
    assert_eq!(node.texture_mapping().uv_size.x, 0.75);
    assert_eq!(node.texture_mapping().uv_size.y, 0.5);
}

#[test]
fn image_source_mapping_is_stable_across_draws() {
    let (mut ctx, mut dctx) = setup();
    let mut node = ImageSourceNode::init(&mut ctx, &mut dctx, 3, 2, PixmapFormat::Xrgb8888).unwrap();
    let mapping = node.texture_mapping();
    for i in 0..10u32 {
        node.load(&mut ctx, &Pixmap::solid(3, 2, i)).unwrap();
        assert!(node.draw(&mut ctx, &mut dctx).is_some());
        assert_eq!(node.texture_mapping(), mapping);
    }
}

#[test]
fn image_source_rejects_mismatched_frames() {
    let (mut ctx, mut dctx) = setup();
    let mut node = ImageSourceNode::init(&mut ctx, &mut dctx, 2, 2, PixmapFormat::Y8).unwrap();
    assert!(node.load(&mut ctx, &Pixmap::solid(2, 2, 0)).is_err());
    assert!(node.load(&mut ctx, &Pixmap::y8(2, 2, vec![9; 4]).unwrap()).is_ok());
    assert!(ImageSourceNode::init(&mut ctx, &mut dctx, 2, 2, PixmapFormat::Pal8).is_err());
}

#[test]
fn queue_returns_recent_frames_newest_first() {
    let (mut ctx, mut dctx) = setup();
    let mut node = ImageSourceNode::init(&mut ctx, &mut dctx, 1, 1, PixmapFormat::Xrgb8888).unwrap();
    node.set_queue_length(&mut ctx, 3).unwrap();

    let colors = [0x11_0000, 0x22_0000, 0x33_0000, 0x44_0000];
    let mut drawn = Vec::new();
    for &c in &colors {
        node.advance_queue();
        node.load(&mut ctx, &Pixmap::solid(1, 1, c)).unwrap();
        drawn.push(node.draw(&mut ctx, &mut dctx).unwrap());
    }

    let newest = node.result_texture(0).unwrap();
    assert_eq!(newest, drawn[3]);
    assert_eq!(ctx.read_pixel(newest, 0, 0), Some(0xFF44_0000));
    let oldest = node.result_texture(2).unwrap();
    assert_eq!(ctx.read_pixel(oldest, 0, 0), Some(0xFF22_0000));
    // Four frames into a queue of three: the first one is gone.
    assert!(node.result_texture(3).is_none());
    assert_eq!(oldest, drawn[1]);
}

#[test]
fn shrinking_the_queue_releases_textures() {
    let (mut ctx, mut dctx) = setup();
    let mut node = ImageSourceNode::init(&mut ctx, &mut dctx, 1, 1, PixmapFormat::Xrgb8888).unwrap();
    let base = ctx.live_textures();
    node.set_queue_length(&mut ctx, 4).unwrap();
    assert_eq!(ctx.live_textures(), base + 3);
    node.set_queue_length(&mut ctx, 0).unwrap();
    assert_eq!(ctx.live_textures(), base);
    assert!(node.result_texture(0).is_some());
    node.shutdown(&mut ctx);
    assert_eq!(ctx.live_textures(), base - 1);
}

#[test]
fn shrinking_the_queue_keeps_the_newest_frames() {
    let (mut ctx, mut dctx) = setup();
    let mut node = ImageSourceNode::init(&mut ctx, &mut dctx, 1, 1, PixmapFormat::Xrgb8888).unwrap();
    node.set_queue_length(&mut ctx, 3).unwrap();
    for i in 0..5u32 {
        node.advance_queue();
        node.load(&mut ctx, &Pixmap::solid(1, 1, i << 16)).unwrap();
    }
    let base = ctx.live_textures();

    node.set_queue_length(&mut ctx, 2).unwrap();
    assert_eq!(ctx.live_textures(), base - 1);
    let pixel = |ctx: &SoftContext, tex: Option<TextureHandle>| ctx.read_pixel(tex.unwrap(), 0, 0);
    assert_eq!(pixel(&ctx, node.result_texture(0)), Some(0xFF04_0000));
    assert_eq!(pixel(&ctx, node.result_texture(1)), Some(0xFF03_0000));
    assert!(node.result_texture(2).is_none());

    node.advance_queue();
    node.load(&mut ctx, &Pixmap::solid(1, 1, 5 << 16)).unwrap();
    assert_eq!(pixel(&ctx, node.result_texture(0)), Some(0xFF05_0000));
    assert_eq!(pixel(&ctx, node.result_texture(1)), Some(0xFF04_0000));
}

#[test]
fn growing_the_queue_adds_slots_behind_the_history() {
    let (mut ctx, mut dctx) = setup();
    let mut node = ImageSourceNode::init(&mut ctx, &mut dctx, 1, 1, PixmapFormat::Xrgb8888).unwrap();
    node.set_queue_length(&mut ctx, 2).unwrap();
    for i in 1..4u32 {
        node.advance_queue();
        node.load(&mut ctx, &Pixmap::solid(1, 1, i << 16)).unwrap();
    }

    node.set_queue_length(&mut ctx, 4).unwrap();
    let newest = node.result_texture(0).unwrap();
    let previous = node.result_texture(1).unwrap();
    assert_eq!(ctx.read_pixel(newest, 0, 0), Some(0xFF03_0000));
    assert_eq!(ctx.read_pixel(previous, 0, 0), Some(0xFF02_0000));
    assert!(node.result_texture(3).is_some());

    node.advance_queue();
    node.load(&mut ctx, &Pixmap::solid(1, 1, 4 << 16)).unwrap();
    assert_eq!(node.result_texture(1), Some(newest));
    assert_eq!(node.result_texture(2), Some(previous));
}

#[test]
fn buffer_source_renders_its_child_and_restores_the_view() {
    let (mut ctx, mut dctx) = setup();
    let child = shared(ClearNode::new(0xFF00_FF00));
    let mut node = BufferSourceNode::init(
        &mut ctx,
        &mut dctx,
        Rect::new(0.0, 0.0, 2.0, 2.0),
        2,
        2,
        false,
        child,
    )
    .unwrap();
    let mapping = node.texture_mapping();

    let outer = RenderView::new(None, 4, 4);
    dctx.apply_render_view(&mut ctx, &outer);
    let tex = node.draw(&mut ctx, &mut dctx).unwrap();
    assert_eq!(ctx.read_pixel(tex, 1, 1), Some(0xFF00_FF00));
    assert_eq!(dctx.capture_render_view(&ctx), outer);
    assert_eq!(node.texture_mapping(), mapping);
    assert_eq!(mapping.tex_width, 2);
    assert!(!node.has_error());
}

#[test]
fn buffer_source_queue_keeps_history() {
    let (mut ctx, mut dctx) = setup();
    let child = shared(ClearNode::new(0xFF00_0000));
    let mut node = BufferSourceNode::init(
        &mut ctx,
        &mut dctx,
        Rect::new(0.0, 0.0, 1.0, 1.0),
        1,
        1,
        true,
        child.clone(),
    )
    .unwrap();
    node.set_queue_length(&mut ctx, 2).unwrap();

    let first = node.draw(&mut ctx, &mut dctx).unwrap();
    node.advance_queue();
    child.borrow_mut().set_clear_color(0xFFFF_FFFF);
    let second = node.draw(&mut ctx, &mut dctx).unwrap();

    assert_ne!(first, second);
    assert_eq!(node.result_texture(1), Some(first));
    assert_eq!(ctx.read_pixel(first, 0, 0), Some(0xFF00_0000));
    assert_eq!(ctx.read_pixel(second, 0, 0), Some(0xFFFF_FFFF));
}
