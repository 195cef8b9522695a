use super::*;

#[test]
fn float2_ops_are_componentwise() {
    let a = Float2::new(2.0, 3.0);
    let b = Float2::new(4.0, 6.0);
    assert_eq!(a + b, Float2::new(6.0, 9.0));
    assert_eq!(b - a, Float2::new(2.0, 3.0));
    assert_eq!(a * b, Float2::new(8.0, 18.0));
    assert_eq!(b / a, Float2::new(2.0, 2.0));
    assert_eq!(a * 0.5, Float2::new(1.0, 1.5));
}

#[test]
fn transpose_is_involution() {
    let m = Float4x4([
        [1.0, 2.0, 3.0, 4.0],
        [5.0, 6.0, 7.0, 8.0],
        [9.0, 10.0, 11.0, 12.0],
        [13.0, 14.0, 15.0, 16.0],
    ]);
    assert_eq!(m.transpose().0[0], [1.0, 5.0, 9.0, 13.0]);
    assert_eq!(m.transpose().transpose(), m);
    assert_eq!(Float4x4::IDENTITY.transpose(), Float4x4::IDENTITY);
}

#[test]
fn pixmap_constructors_validate_sizes() {
    assert!(Pixmap::xrgb8888(2, 2, &[0; 3]).is_err());
    assert!(Pixmap::y8(2, 2, vec![0; 4]).is_ok());
    let p = Pixmap::xrgb8888(2, 1, &[0x00112233, 0x00445566]).unwrap();
    assert_eq!(p.row(0), &[0x33, 0x22, 0x11, 0x00, 0x66, 0x55, 0x44, 0x00]);
}

#[test]
fn packed_rows_strip_pitch_padding() {
    let p = Pixmap {
        width: 2,
        height: 2,
        format: PixmapFormat::Y8,
        pitch: 4,
        data: vec![1, 2, 0, 0, 3, 4, 0, 0],
        palette: None,
    };
    assert_eq!(p.packed_rows(), vec![1, 2, 3, 4]);
}

#[test]
fn argb_pack_roundtrips_bytes() {
    for c in [0xFF00_0000u32, 0x00FF_0000, 0x8012_3456, 0xFFFF_FFFF] {
        assert_eq!(pack_argb(unpack_argb(c)), c);
    }
}
