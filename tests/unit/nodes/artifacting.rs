use super::*;
use crate::device::{Format, SoftContext, TextureDesc};
use crate::nodes::{SourceTexMapping, TextureSourceNode, shared};
use crate::render::NodeContextOpts;

fn setup() -> (SoftContext, NodeContext, RenderView, SourceNodeRef) {
    let mut ctx = SoftContext::new(1, 2);
    let dctx = NodeContext::init(&mut ctx, NodeContextOpts::default()).unwrap();
    let tex = ctx
        .create_texture(&TextureDesc::shader(1, 2, Format::Bgra8Unorm))
        .unwrap();
    let rows: [u32; 2] = [0xFF00_0000, 0xFFFF_FFFF];
    ctx.write_texture(tex, 0, bytemuck::cast_slice(&rows), 4)
        .unwrap();
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(1, 2, 1, 2)));
    (ctx, dctx, RenderView::new(None, 1, 2), source)
}

#[test]
fn rows_are_averaged_with_their_neighbor() {
    let (mut ctx, mut dctx, view, source) = setup();
    let mut node = ArtifactingNode::init(&mut ctx, &mut dctx, source, 1.0, false).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFF80_8080));
    // The last row blends with the clamped edge, i.e. itself.
    assert_eq!(ctx.backbuffer_pixel(0, 1), Some(0xFFFF_FFFF));
}

#[test]
fn negative_offset_blends_upward() {
    let (mut ctx, mut dctx, view, source) = setup();
    let mut node = ArtifactingNode::init(&mut ctx, &mut dctx, source, -1.0, false).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFF00_0000));
    assert_eq!(ctx.backbuffer_pixel(0, 1), Some(0xFF80_8080));
}

#[test]
fn dest_area_leaves_the_caller_view_bound() {
    let (mut ctx, mut dctx, view, source) = setup();
    let mut node = ArtifactingNode::init(&mut ctx, &mut dctx, source, 1.0, false).unwrap();
    node.set_dest_area(Some(Rect::new(0.0, 1.0, 1.0, 2.0)));
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    assert_eq!(dctx.capture_render_view(&ctx), view);
}

#[test]
fn extended_output_is_signed_encoded() {
    let (mut ctx, mut dctx, view, source) = setup();
    let mut node = ArtifactingNode::init(&mut ctx, &mut dctx, source, 1.0, true).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFFBF_BFBF));
    assert_eq!(ctx.backbuffer_pixel(0, 1), Some(0xFFFF_FFFF));
}

#[test]
fn busy_source_fails_init() {
    let (mut ctx, mut dctx, _, source) = setup();
    let _guard = source.borrow_mut();
    assert!(ArtifactingNode::init(&mut ctx, &mut dctx, source.clone(), 1.0, false).is_err());
}
