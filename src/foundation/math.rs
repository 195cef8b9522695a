use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x5ca7_0c7d_11e5_b1a5;

/// Smallest power of two `>= v` (with `ceil_pow2(0) == 1`).
pub(crate) fn ceil_pow2(v: u32) -> u32 {
    v.max(1).checked_next_power_of_two().unwrap_or(1 << 31)
}

/// Round half away from zero, saturating at the `i32` range.
pub(crate) fn round_to_int(v: f32) -> i32 {
    v.round() as i32
}

pub(crate) fn ceil_to_int(v: f32) -> i32 {
    v.ceil() as i32
}

pub(crate) fn align_up(v: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (v + align - 1) & !(align - 1)
}

/// Content hash for byte blobs such as program bytecode.
pub(crate) fn content_hash(bytes: &[u8]) -> u64 {
    let mut h = Xxh3::with_seed(XXH3_SEED);
    h.update(&(bytes.len() as u64).to_le_bytes());
    h.update(bytes);
    h.digest()
}
