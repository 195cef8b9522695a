use super::*;
use crate::device::{SoftContext, TextureHandle};
use crate::nodes::{TextureSourceNode, shared};
use crate::render::NodeContextOpts;

fn setup(w: u32, h: u32) -> (SoftContext, NodeContext, RenderView) {
    let mut ctx = SoftContext::new(w, h);
    let dctx = NodeContext::init(&mut ctx, NodeContextOpts::default()).unwrap();
    (ctx, dctx, RenderView::new(None, w, h))
}

fn flat_source(ctx: &mut SoftContext, w: u32, h: u32, color: u32) -> (TextureHandle, SourceNodeRef) {
    let tex = ctx
        .create_texture(&TextureDesc::shader(w, h, Format::Bgra8Unorm))
        .unwrap();
    let pixels = vec![color; (w * h) as usize];
    ctx.write_texture(tex, 0, bytemuck::cast_slice(&pixels), w as usize * 4)
        .unwrap();
    let source = shared(TextureSourceNode::new(tex, SourceTexMapping::new(w, h, w, h)));
    (tex, source)
}

fn params(w: f64, h: f64) -> ScreenFxParams {
    ScreenFxParams {
        dest_area: Rect::new(0.0, 0.0, w, h),
        linear: false,
        ..ScreenFxParams::default()
    }
}

fn red(px: u32) -> u32 {
    (px >> 16) & 0xff
}

#[test]
fn neutral_params_pass_the_source_through() {
    let (mut ctx, mut dctx, view) = setup(4, 4);
    let (_, source) = flat_source(&mut ctx, 2, 2, 0xFF40_8020);
    let mut node =
        ScreenFxNode::init(&mut ctx, &mut dctx, source, params(4.0, 4.0), &BasicScreenFxTextures)
            .unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFF40_8020));
    assert_eq!(ctx.backbuffer_pixel(3, 3), Some(0xFF40_8020));
    assert_eq!(dctx.capture_render_view(&ctx), view);
}

#[test]
fn color_correction_matrix_is_applied() {
    let (mut ctx, mut dctx, view) = setup(2, 2);
    let (_, source) = flat_source(&mut ctx, 2, 2, 0xFF40_8020);
    let p = ScreenFxParams {
        color_correction: Some([[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        ..params(2.0, 2.0)
    };
    let mut node =
        ScreenFxNode::init(&mut ctx, &mut dctx, source, p, &BasicScreenFxTextures).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(1, 1), Some(0xFF20_8040));
}

#[test]
fn scanlines_darken_alternate_row_pairs() {
    let (mut ctx, mut dctx, view) = setup(4, 8);
    let (_, source) = flat_source(&mut ctx, 2, 2, 0xFFFF_FFFF);
    let p = ScreenFxParams {
        scanline_intensity: Some(0.0),
        ..params(4.0, 8.0)
    };
    let mut node =
        ScreenFxNode::init(&mut ctx, &mut dctx, source, p, &BasicScreenFxTextures).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());

    let row = |ctx: &SoftContext, y| red(ctx.backbuffer_pixel(1, y).unwrap());
    let (bright, dark, again) = (row(&ctx, 0), row(&ctx, 2), row(&ctx, 4));
    assert!(bright > dark + 50, "bright {bright} dark {dark}");
    assert!(bright.abs_diff(again) <= 1);
}

#[test]
fn clip_area_limits_the_pass() {
    let (mut ctx, mut dctx, view) = setup(8, 8);
    ctx.clear(0xFF00_0000);
    let (_, source) = flat_source(&mut ctx, 2, 2, 0xFFFF_FFFF);
    let p = ScreenFxParams {
        clip_area: Some(Rect::new(0.0, 0.0, 4.0, 8.0)),
        ..params(8.0, 8.0)
    };
    let mut node =
        ScreenFxNode::init(&mut ctx, &mut dctx, source, p, &BasicScreenFxTextures).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(2, 4), Some(0xFFFF_FFFF));
    assert_eq!(ctx.backbuffer_pixel(6, 4), Some(0xFF00_0000));
    assert_eq!(dctx.capture_render_view(&ctx), view);
}

#[test]
fn distortion_leaves_the_corners_untouched() {
    let (mut ctx, mut dctx, view) = setup(32, 32);
    ctx.clear(0xFF00_0000);
    let (_, source) = flat_source(&mut ctx, 4, 4, 0xFFFF_FFFF);
    let p = ScreenFxParams {
        distortion_x: 90.0,
        distortion_y_ratio: 1.0,
        ..params(32.0, 32.0)
    };
    let mut node =
        ScreenFxNode::init(&mut ctx, &mut dctx, source, p, &BasicScreenFxTextures).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    assert_eq!(ctx.backbuffer_pixel(16, 16), Some(0xFFFF_FFFF));
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFF00_0000));
    assert_eq!(ctx.backbuffer_pixel(31, 31), Some(0xFF00_0000));
}

#[test]
fn empty_destination_is_rejected() {
    let (mut ctx, mut dctx, _) = setup(4, 4);
    let (_, source) = flat_source(&mut ctx, 2, 2, 0xFFFF_FFFF);
    let err = ScreenFxNode::init(
        &mut ctx,
        &mut dctx,
        source,
        ScreenFxParams::default(),
        &BasicScreenFxTextures,
    );
    assert!(err.is_err());
}

#[test]
fn shutdown_releases_generated_textures() {
    let (mut ctx, mut dctx, _) = setup(8, 8);
    let (_, source) = flat_source(&mut ctx, 4, 4, 0xFFFF_FFFF);
    let live = ctx.live_textures();
    let p = ScreenFxParams {
        gamma: 2.0,
        scanline_intensity: Some(0.5),
        screen_mask: ScreenMaskParams {
            mask_type: ScreenMaskType::ApertureGrille,
            ..ScreenMaskParams::default()
        },
        ..params(8.0, 8.0)
    };
    let mut node =
        ScreenFxNode::init(&mut ctx, &mut dctx, source, p, &BasicScreenFxTextures).unwrap();
    assert_eq!(ctx.live_textures(), live + 3);
    node.shutdown(&mut ctx);
    assert_eq!(ctx.live_textures(), live);
}

#[test]
fn set_params_rebuilds_in_place() {
    let (mut ctx, mut dctx, view) = setup(2, 2);
    let (_, source) = flat_source(&mut ctx, 2, 2, 0xFF40_8020);
    let mut node =
        ScreenFxNode::init(&mut ctx, &mut dctx, source, params(2.0, 2.0), &BasicScreenFxTextures)
            .unwrap();
    let swapped = ScreenFxParams {
        color_correction: Some([[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        ..params(2.0, 2.0)
    };
    node.set_params(&mut ctx, &mut dctx, swapped, &BasicScreenFxTextures)
        .unwrap();
    assert_eq!(node.params(), &swapped);
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFF20_8040));

    assert!(
        node.set_params(&mut ctx, &mut dctx, ScreenFxParams::default(), &BasicScreenFxTextures)
            .is_err()
    );
    assert_eq!(node.params(), &swapped);
}

#[test]
fn identity_gamma_ramp_is_exact() {
    let ramp = BasicScreenFxTextures.gamma_ramp(false, 0.0, 1.0);
    for (i, v) in ramp.iter().enumerate() {
        assert_eq!(usize::from(*v), i);
    }
    let brighter = BasicScreenFxTextures.gamma_ramp(false, 0.0, 2.0);
    assert_eq!(brighter[0], 0);
    assert_eq!(brighter[255], 255);
    assert_eq!(brighter[64], 128);
}

#[test]
fn scanline_mask_follows_source_rows() {
    let mask = BasicScreenFxTextures.scanline_mask(2, 8, 0.0, true);
    assert_eq!(mask.len(), 8);
    assert!(mask[0] > mask[2]);
    assert_eq!(mask[0], mask[1]);
    assert_eq!(mask[0], mask[4]);

    let full = BasicScreenFxTextures.scanline_mask(2, 8, 1.0, true);
    assert!(full.iter().all(|&v| v == 255));

    // Too few output rows per scanline to resolve them.
    let flat = BasicScreenFxTextures.scanline_mask(8, 8, 0.0, true);
    assert!(flat.iter().all(|&v| v == 128));
}

#[test]
fn aperture_grille_stripes_rgb() {
    let mask = ScreenMaskParams {
        mask_type: ScreenMaskType::ApertureGrille,
        ..ScreenMaskParams::default()
    };
    let px = BasicScreenFxTextures.screen_mask(&mask, 4, 12, 2);
    let words: &[u32] = bytemuck::cast_slice(&px.data);
    assert_eq!(&words[..3], &[0x00FF_0000, 0x0000_FF00, 0x0000_00FF]);
    assert_eq!(words[12], 0x00FF_0000);
}

#[test]
fn distortion_mapping_round_trips() {
    let mapper = DistortionMapper::new(60.0, 1.0, 4.0 / 3.0);
    let (center, valid) = mapper.map_screen_to_image(Float2::new(0.5, 0.5));
    assert!(valid);
    assert!((center.x - 0.5).abs() < 1e-6 && (center.y - 0.5).abs() < 1e-6);

    let p = Float2::new(0.3, 0.6);
    let (image, valid) = mapper.map_screen_to_image(p);
    assert!(valid);
    let (back, valid) = mapper.map_image_to_screen(image);
    assert!(valid);
    assert!((back.x - p.x).abs() < 1e-4 && (back.y - p.y).abs() < 1e-4);

    // The horizontal screen edge lies beyond the curved image.
    let (_, valid) = mapper.map_screen_to_image(Float2::new(1.0, 0.5));
    assert!(!valid);
    let (_, valid) = mapper.map_image_to_screen(Float2::new(1.5, 0.5));
    assert!(!valid);
}
