use super::*;

fn close(a: Float2, b: Float2) -> bool {
    (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6
}

#[test]
fn identity_leaves_positions_alone() {
    let p = Float2::new(0.25, -0.5);
    assert_eq!(SoftViewport::IDENTITY.transform(p), p);
    assert_eq!(SoftViewport::default(), SoftViewport::IDENTITY);
}

#[test]
fn subrect_maps_clip_corners_onto_the_pixel_rectangle() {
    // Right half of a 4x2 viewport.
    let sv = SoftViewport::IDENTITY.with_subrect(4, 2, Rect::new(2.0, 0.0, 4.0, 2.0));
    assert!(close(sv.transform(Float2::new(-1.0, 1.0)), Float2::new(0.0, 1.0)));
    assert!(close(sv.transform(Float2::new(1.0, -1.0)), Float2::new(1.0, -1.0)));

    // Top-left pixel of a 2x2 viewport.
    let sv = SoftViewport::IDENTITY.with_subrect(2, 2, Rect::new(0.0, 0.0, 1.0, 1.0));
    assert!(close(sv.transform(Float2::new(-1.0, 1.0)), Float2::new(-1.0, 1.0)));
    assert!(close(sv.transform(Float2::new(1.0, -1.0)), Float2::new(0.0, 0.0)));
}

#[test]
fn nested_subrects_compose() {
    let outer = SoftViewport::IDENTITY.with_subrect(4, 4, Rect::new(2.0, 2.0, 4.0, 4.0));
    let nested = outer.with_subrect(4, 4, Rect::new(0.0, 0.0, 2.0, 2.0));
    // Top-left quarter of the bottom-right quarter.
    assert!(close(nested.transform(Float2::new(-1.0, 1.0)), Float2::new(0.0, 0.0)));
    assert!(close(nested.transform(Float2::new(1.0, -1.0)), Float2::new(0.5, -0.5)));
}

#[test]
fn render_view_subrect_keeps_target_and_viewport() {
    let view = RenderView::new(None, 8, 8);
    let sub = view.with_subrect(Rect::new(0.0, 0.0, 4.0, 8.0));
    assert_eq!(sub.viewport, view.viewport);
    assert_eq!(sub.target, None);
    assert!(close(sub.soft_viewport.size, Float2::new(0.5, 1.0)));
}
