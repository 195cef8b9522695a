use super::*;

#[test]
fn requests_share_storage_per_address() {
    let mut vars = VarStorage::new();
    assert_eq!(vars.byte_len(), 16);

    let a = vars.request_vector(0, EffectVariable::VideoSize, 1, 0);
    let b = vars.request_vector(32, EffectVariable::VideoSize, 1, 0);
    assert_eq!(a.src, b.src);
    assert_eq!(a.src, [16, 20, 24, 28]);
    assert_eq!(b.dst, 32);

    // Only frame counters are per history element.
    let c = vars.request_vector(0, EffectVariable::VideoSize, 1, 3);
    assert_eq!(c.src, a.src);
    let f0 = vars.request_vector(0, EffectVariable::FrameCount, 0, 0);
    let f1 = vars.request_vector(0, EffectVariable::FrameCount, 0, 1);
    assert_ne!(f0.src, f1.src);
    assert_eq!(vars.byte_len(), 16 + 3 * 16);
}

#[test]
fn offsets_resolve_only_after_a_request() {
    let mut vars = VarStorage::new();
    assert_eq!(vars.resolve_pass_params(2), PassParamOffsets::default());

    vars.request_vector(0, EffectVariable::OutputSize, 2, 0);
    vars.request_vector(0, EffectVariable::FrameCount, 2, 1);
    let pass = vars.resolve_pass_params(2);
    assert_eq!(pass.output_size, Some(16));
    assert_eq!(pass.video_size, None);
    assert_eq!(vars.resolve_frame_params(2, 1).frame_count, Some(32));
    assert_eq!(vars.resolve_frame_params(2, 0).frame_count, None);
}

#[test]
fn vectors_and_gathers() {
    let mut vars = VarStorage::new();
    let g = vars.request_vector(16, EffectVariable::TextureSize, 0, 0);
    vars.set_vector(vars.var_offset(EffectVariable::TextureSize, 0, 0), [256.0, 128.0, 0.0, 0.0]);
    vars.set_vector(None, [9.0; 4]);

    let mut dst = [0u32; 8];
    vars.gather_vecs(&mut dst, &[g]);
    assert_eq!(f32::from_bits(dst[4]), 256.0);
    assert_eq!(f32::from_bits(dst[5]), 128.0);
    assert_eq!(dst[..4], [0; 4]);

    let scalars: Vec<ScalarGather> = g.scalars(2).collect();
    assert_eq!(scalars.len(), 2);
    let mut dst = [0u32; 8];
    vars.gather_floats(&mut dst, &scalars);
    assert_eq!(f32::from_bits(dst[5]), 128.0);
    assert_eq!(dst[6], 0);

    let mut bools = [7u32; 2];
    vars.gather_bools(
        &mut bools,
        &[
            ScalarGather { dst: 0, src: g.src[0] },
            ScalarGather { dst: 4, src: g.src[2] },
        ],
    );
    assert_eq!(bools, [1, 0]);
}

#[test]
fn out_of_range_gathers_are_skipped() {
    let vars = VarStorage::new();
    let mut dst = [5u32; 2];
    vars.gather_floats(&mut dst, &[ScalarGather { dst: 64, src: 0 }]);
    vars.gather_vecs(&mut dst, &[Vec4Gather { dst: 0, src: [0; 4] }]);
    assert_eq!(dst, [5, 5]);
}

#[test]
fn matrices_row_and_column_major() {
    let mut vars = VarStorage::new();
    let rm = vars.request_row_major_matrix(0, EffectVariable::ModelViewProj, 0, 0);
    let cm = vars.request_column_major_matrix(64, EffectVariable::ModelViewProj, 0, 0);

    let mut m = Float4x4::IDENTITY;
    m.0[0][3] = 5.0;
    vars.set_matrix(vars.var_offset(EffectVariable::ModelViewProj, 0, 0), &m);

    let mut dst = [0u32; 32];
    vars.gather_vecs(&mut dst, &rm.rows);
    vars.gather_vecs(&mut dst, &cm.rows);
    let f = |i: usize| f32::from_bits(dst[i]);
    // Row 0, column 3 in both layouts.
    assert_eq!(f(3), 5.0);
    assert_eq!(f(16 + 12), 5.0);
    assert_eq!(f(0), 1.0);
    assert_eq!(f(16), 1.0);
    assert_eq!(f(16 + 5), 1.0);
}

#[test]
fn vector_as_matrix_pads_with_zero_rows() {
    let mut vars = VarStorage::new();
    let m = vars.request_row_major_matrix(0, EffectVariable::OutputSize, 1, 0);
    assert_eq!(m.rows[1].src, [ZERO_OFFSET; 4]);
    assert_eq!(m.rows[3].dst, 48);
    vars.set_vector(vars.var_offset(EffectVariable::OutputSize, 1, 0), [2.0, 3.0, 0.0, 0.0]);

    let mut dst = [u32::MAX; 16];
    vars.gather_vecs(&mut dst, &m.rows);
    assert_eq!(f32::from_bits(dst[1]), 3.0);
    assert!(dst[4..].iter().all(|&w| w == 0));
}

#[test]
fn member_names_map_to_variables() {
    assert_eq!(
        EffectVariable::from_member_name("frame_count"),
        Some(EffectVariable::FrameCount)
    );
    assert_eq!(EffectVariable::from_member_name("modelViewProj"), None);
}
