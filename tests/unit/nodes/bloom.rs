use super::*;
use crate::device::{DeviceCaps, Format, SoftContext, TextureDesc};
use crate::nodes::{TextureSourceNode, shared};
use crate::render::NodeContextOpts;

fn setup(ctx: SoftContext, size: u32) -> (SoftContext, NodeContext, RenderView) {
    let mut ctx = ctx;
    let dctx = NodeContext::init(&mut ctx, NodeContextOpts::default()).unwrap();
    (ctx, dctx, RenderView::new(None, size, size))
}

fn flat_source(ctx: &mut SoftContext, size: u32, color: u32) -> SourceNodeRef {
    let tex = ctx
        .create_texture(&TextureDesc::shader(size, size, Format::Bgra8Unorm))
        .unwrap();
    let pixels = vec![color; (size * size) as usize];
    ctx.write_texture(tex, 0, bytemuck::cast_slice(&pixels), size as usize * 4)
        .unwrap();
    shared(TextureSourceNode::new(
        tex,
        SourceTexMapping::new(size, size, size, size),
    ))
}

fn params(size: f64) -> BloomParams {
    BloomParams {
        dest_area: Rect::new(0.0, 0.0, size, size),
        ..BloomParams::default()
    }
}

fn channel_close(px: u32, expected: u32) -> bool {
    (0..3).all(|k| {
        let a = (px >> (k * 8)) & 0xff;
        let b = (expected >> (k * 8)) & 0xff;
        a.abs_diff(b) <= 1
    })
}

#[test]
fn v2_weights_sum_to_the_requested_intensity() {
    let control = BloomV2ControlParams {
        base_radius: 4.0,
        adjust_radius: 1.5,
        direct_intensity: 0.25,
        indirect_intensity: 0.75,
        render_linear: false,
    };
    let rp = compute_bloom_v2_params(&control, &BloomV2Settings::default());
    let total = rp.base_weight_sum() + rp.pass_blend_factors[5].x;
    assert!((total - 1.0).abs() < 1e-3, "total {total}");
    assert!(rp.base_uv_step_scale >= 1.0 && rp.base_uv_step_scale <= 1.2);
    for f in &rp.pass_blend_factors[..5] {
        assert!((f.x + f.y - 1.0).abs() < 1e-4);
    }
}

#[test]
fn v2_linear_rendering_disables_the_shoulder() {
    let control = BloomV2ControlParams {
        base_radius: 1.0,
        adjust_radius: 1.0,
        direct_intensity: 1.0,
        indirect_intensity: 1.0,
        render_linear: true,
    };
    let rp = compute_bloom_v2_params(&control, &BloomV2Settings::default());
    assert_eq!(rp.shoulder, [0.0; 4]);
    assert_eq!(rp.thresholds, [1.0, 100.0, 100.0, 0.0]);

    let gamma = compute_bloom_v2_params(
        &BloomV2ControlParams {
            render_linear: false,
            ..control
        },
        &BloomV2Settings::default(),
    );
    assert_eq!(gamma.thresholds, [1.0, 0.5, 2.0, 0.0]);
    // The shoulder passes through (shoulder_x, shoulder_y).
    let [a, b, c, d] = gamma.shoulder;
    let x = 0.5f32;
    assert!((a * x * x * x + b * x * x + c * x + d - 0.5).abs() < 1e-4);
}

#[test]
fn v1_below_threshold_keeps_the_image() {
    let (mut ctx, mut dctx, view) = setup(SoftContext::new(8, 8), 8);
    let source = flat_source(&mut ctx, 8, 0xFF40_4040);
    let p = BloomParams {
        threshold: 0.5,
        ..params(8.0)
    };
    let mut node = BloomNode::init_v1(&mut ctx, &mut dctx, p, source).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    assert_eq!(ctx.backbuffer_pixel(3, 3), Some(0xFF40_4040));
    assert_eq!(dctx.capture_render_view(&ctx), view);
}

#[test]
fn v1_flat_field_blends_direct_and_glow() {
    let (mut ctx, mut dctx, view) = setup(SoftContext::new(8, 8), 8);
    let source = flat_source(&mut ctx, 8, 0xFF80_4020);
    let p = BloomParams {
        direct_intensity: 0.5,
        indirect_intensity: 0.5,
        ..params(8.0)
    };
    let mut node = BloomNode::init_v1(&mut ctx, &mut dctx, p, source).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    let px = ctx.backbuffer_pixel(4, 4).unwrap();
    assert!(channel_close(px, 0xFF80_4020), "{px:08x}");
}

#[test]
fn v2_flat_field_preserves_energy() {
    let (mut ctx, mut dctx, view) = setup(SoftContext::new(16, 16), 16);
    let source = flat_source(&mut ctx, 16, 0xFF60_6060);
    let p = BloomParams {
        direct_intensity: 0.0,
        indirect_intensity: 1.0,
        ..params(16.0)
    };
    let mut node = BloomNode::init_v2(&mut ctx, &mut dctx, p, source).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    assert!(!node.has_error());
    for (x, y) in [(0, 0), (8, 8), (15, 15)] {
        let px = ctx.backbuffer_pixel(x, y).unwrap();
        assert!(channel_close(px, 0xFF60_6060), "({x}, {y}) {px:08x}");
    }
}

#[test]
fn v2_direct_only_is_a_copy() {
    let (mut ctx, mut dctx, view) = setup(SoftContext::new(8, 8), 8);
    let source = flat_source(&mut ctx, 8, 0xFF20_A0E0);
    let p = BloomParams {
        direct_intensity: 1.0,
        indirect_intensity: 0.0,
        ..params(8.0)
    };
    let mut node = BloomNode::init_v2(&mut ctx, &mut dctx, p, source).unwrap();
    node.draw(&mut ctx, &mut dctx, &view);
    let px = ctx.backbuffer_pixel(2, 5).unwrap();
    assert!(channel_close(px, 0xFF20_A0E0), "{px:08x}");
}

#[test]
fn v2_start_pass_uses_compute_when_available() {
    let (mut ctx, mut dctx, view) = setup(SoftContext::new(8, 8), 8);
    let source = flat_source(&mut ctx, 8, 0xFF80_8080);
    let mut node = BloomNode::init_v2(&mut ctx, &mut dctx, params(8.0), source).unwrap();
    ctx.reset_stats();
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.stats().dispatches, 1);

    let no_compute = SoftContext::new(8, 8).with_caps(DeviceCaps {
        compute: false,
        ..DeviceCaps::default()
    });
    let (mut ctx, mut dctx, view) = setup(no_compute, 8);
    let source = flat_source(&mut ctx, 8, 0xFF80_8080);
    let mut node = BloomNode::init_v2(&mut ctx, &mut dctx, params(8.0), source).unwrap();
    ctx.reset_stats();
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(ctx.stats().dispatches, 0);
    assert!(!node.has_error());
}

#[test]
fn v2_rebuilds_only_on_change() {
    let (mut ctx, mut dctx, view) = setup(SoftContext::new(8, 8), 8);
    let source = flat_source(&mut ctx, 8, 0xFF80_8080);
    let mut node = BloomNode::init_v2(&mut ctx, &mut dctx, params(8.0), source).unwrap();
    assert_eq!(node.remake_count(), 1);

    node.draw(&mut ctx, &mut dctx, &view);
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(node.remake_count(), 1);

    node.set_params(params(8.0));
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(node.remake_count(), 1);

    node.set_params(BloomParams {
        indirect_intensity: 0.5,
        ..params(8.0)
    });
    node.draw(&mut ctx, &mut dctx, &view);
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(node.remake_count(), 2);

    dctx.set_bloom_v2_settings(BloomV2Settings {
        shoulder_y: 0.75,
        ..BloomV2Settings::default()
    });
    node.draw(&mut ctx, &mut dctx, &view);
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(node.remake_count(), 3);
}

#[test]
fn v1_ignores_v2_settings() {
    let (mut ctx, mut dctx, view) = setup(SoftContext::new(8, 8), 8);
    let source = flat_source(&mut ctx, 8, 0xFF80_8080);
    let mut node = BloomNode::init_v1(&mut ctx, &mut dctx, params(8.0), source).unwrap();
    dctx.set_bloom_v2_settings(BloomV2Settings::default());
    node.draw(&mut ctx, &mut dctx, &view);
    assert_eq!(node.remake_count(), 1);
}

#[test]
fn shutdown_releases_the_pyramid() {
    let (mut ctx, mut dctx, _) = setup(SoftContext::new(8, 8), 8);
    let source = flat_source(&mut ctx, 8, 0xFF80_8080);
    let live = ctx.live_textures();
    let mut node = BloomNode::init_v2(&mut ctx, &mut dctx, params(8.0), source).unwrap();
    assert_eq!(ctx.live_textures(), live + 11);
    node.shutdown(&mut ctx);
    assert_eq!(ctx.live_textures(), live);
}

#[test]
fn empty_destination_is_rejected() {
    let (mut ctx, mut dctx, _) = setup(SoftContext::new(8, 8), 8);
    let source = flat_source(&mut ctx, 8, 0xFF80_8080);
    assert!(BloomNode::init_v1(&mut ctx, &mut dctx, BloomParams::default(), source).is_err());
}
