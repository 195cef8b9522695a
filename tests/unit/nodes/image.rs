use super::*;
use crate::device::SoftContext;
use crate::render::NodeContextOpts;

fn setup(w: u32, h: u32) -> (SoftContext, NodeContext, RenderView) {
    let mut ctx = SoftContext::new(w, h);
    let dctx = NodeContext::init(&mut ctx, NodeContextOpts::default()).unwrap();
    (ctx, dctx, RenderView::new(None, w, h))
}

#[test]
fn xrgb_image_fills_the_view() {
    let (mut ctx, mut dctx, view) = setup(4, 4);
    let mut node = ImageNode::init(&mut ctx, &mut dctx, 2, 2, PixmapFormat::Xrgb8888).unwrap();
    node.load(&mut ctx, &Pixmap::solid(2, 2, 0x0012_3456)).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    for (x, y) in [(0, 0), (3, 0), (0, 3), (3, 3)] {
        assert_eq!(ctx.backbuffer_pixel(x, y), Some(0xFF12_3456));
    }
}

#[test]
fn dest_area_limits_the_draw() {
    let (mut ctx, mut dctx, view) = setup(4, 4);
    ctx.clear(0xFF00_0000);
    let mut node = ImageNode::init(&mut ctx, &mut dctx, 1, 1, PixmapFormat::Xrgb8888).unwrap();
    node.load(&mut ctx, &Pixmap::solid(1, 1, 0x00FF_FFFF)).unwrap();
    node.set_dest_area(Some(Rect::new(2.0, 2.0, 4.0, 4.0)));
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(3, 3), Some(0xFFFF_FFFF));
    assert_eq!(ctx.backbuffer_pixel(2, 2), Some(0xFFFF_FFFF));
    assert_eq!(ctx.backbuffer_pixel(1, 1), Some(0xFF00_0000));
    assert_eq!(ctx.backbuffer_pixel(3, 0), Some(0xFF00_0000));
    assert_eq!(dctx.capture_render_view(&ctx), view);
}

#[test]
fn y8_images_expand_to_gray() {
    let (mut ctx, mut dctx, view) = setup(2, 2);
    let mut node = ImageNode::init(&mut ctx, &mut dctx, 2, 2, PixmapFormat::Y8).unwrap();
    node.load(&mut ctx, &Pixmap::y8(2, 2, vec![0x80; 4]).unwrap()).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(1, 0), Some(0xFF80_8080));
}

#[test]
fn pal8_images_use_their_palette() {
    let (mut ctx, mut dctx, view) = setup(2, 1);
    let mut palette = Box::new([0u32; 256]);
    palette[3] = 0x00AA_BBCC;
    palette[200] = 0x0011_2233;
    let px = Pixmap::pal8(2, 1, vec![3, 200], palette).unwrap();

    let mut node = ImageNode::init(&mut ctx, &mut dctx, 2, 1, PixmapFormat::Pal8).unwrap();
    assert!(!node.can_stretch());
    node.load(&mut ctx, &px).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFFAA_BBCC));
    assert_eq!(ctx.backbuffer_pixel(1, 0), Some(0xFF11_2233));
}

#[test]
fn load_rejects_other_shapes() {
    let (mut ctx, mut dctx, _) = setup(2, 2);
    let mut node = ImageNode::init(&mut ctx, &mut dctx, 2, 2, PixmapFormat::Xrgb8888).unwrap();
    assert!(node.load(&mut ctx, &Pixmap::solid(3, 2, 0)).is_err());
    assert!(node.load(&mut ctx, &Pixmap::y8(2, 2, vec![0; 4]).unwrap()).is_err());
}

#[test]
fn bilinear_toggle_updates_the_recorded_draw() {
    let (mut ctx, mut dctx, view) = setup(4, 1);
    let mut node = ImageNode::init(&mut ctx, &mut dctx, 2, 1, PixmapFormat::Xrgb8888).unwrap();
    node.load(&mut ctx, &Pixmap::xrgb8888(2, 1, &[0x0000_0000, 0x00FF_FFFF]).unwrap())
        .unwrap();

    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(1, 0), Some(0xFF00_0000));

    node.set_bilinear(&mut ctx, &mut dctx, true);
    node.draw(&mut ctx, &mut dctx, &view);
    let px = ctx.backbuffer_pixel(1, 0).unwrap();
    let red = (px >> 16) & 0xff;
    assert!(red > 0 && red < 0xff, "expected a filtered value, got {px:#x}");
    assert!(!node.has_error());
}

#[test]
fn shutdown_releases_textures() {
    let (mut ctx, mut dctx, _) = setup(2, 2);
    let live = ctx.live_textures();
    let mut node = ImageNode::init(&mut ctx, &mut dctx, 2, 2, PixmapFormat::Pal8).unwrap();
    assert_eq!(ctx.live_textures(), live + 2);
    node.shutdown(&mut ctx);
    assert_eq!(ctx.live_textures(), live);
}
