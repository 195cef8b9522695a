//! Shared variable storage for effect passes.
//!
//! Every value a pass shader can ask for (sizes, frame counters, the transform) lives once in a
//! flat float block. Passes record gathers at load time, lists of storage offsets to copy into
//! their constant memory, and replay them each time they run.

use std::collections::HashMap;

use crate::foundation::core::Float4x4;

/// Storage offset that always reads zero.
pub const ZERO_OFFSET: u32 = 0;

/// Values effect shaders can bind by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectVariable {
    VideoSize,
    TextureSize,
    OutputSize,
    FrameCount,
    FrameDirection,
    ModelViewProj,
}

impl EffectVariable {
    /// Frame-struct member name for this variable.
    pub fn from_member_name(name: &str) -> Option<Self> {
        Some(match name {
            "video_size" => Self::VideoSize,
            "texture_size" => Self::TextureSize,
            "output_size" => Self::OutputSize,
            "frame_count" => Self::FrameCount,
            "frame_direction" => Self::FrameDirection,
            _ => return None,
        })
    }

    fn floats(self) -> usize {
        match self {
            Self::ModelViewProj => 16,
            _ => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct VarAddress {
    var: EffectVariable,
    pass: u32,
    element: u32,
}

/// Copy one 32-bit word: `dst` in the destination block, `src` in storage (bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalarGather {
    pub dst: u32,
    pub src: u32,
}

/// Copy four words into `dst..dst + 16` from four storage offsets (bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Vec4Gather {
    pub dst: u32,
    pub src: [u32; 4],
}

impl Vec4Gather {
    /// The first `columns` components as scalar gathers.
    pub fn scalars(&self, columns: u32) -> impl Iterator<Item = ScalarGather> + '_ {
        (0..columns.min(4)).map(move |i| ScalarGather {
            dst: self.dst + 4 * i,
            src: self.src[i as usize],
        })
    }
}

/// Four register-sized row gathers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mat4Gather {
    pub rows: [Vec4Gather; 4],
}

/// Storage offsets of the per-pass size and direction parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassParamOffsets {
    pub video_size: Option<u32>,
    pub texture_size: Option<u32>,
    pub output_size: Option<u32>,
    pub frame_direction: Option<u32>,
}

/// Storage offsets of per-frame parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameParamOffsets {
    pub frame_count: Option<u32>,
}

/// Flat float block holding every requested variable.
#[derive(Clone, Debug)]
pub struct VarStorage {
    data: Vec<f32>,
    map: HashMap<VarAddress, u32>,
}

impl Default for VarStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl VarStorage {
    pub fn new() -> Self {
        Self {
            data: vec![0.0; 4],
            map: HashMap::new(),
        }
    }

    fn address(var: EffectVariable, pass: u32, element: u32) -> VarAddress {
        // Only frame counters differ between history frames.
        let element = if var == EffectVariable::FrameCount { element } else { 0 };
        VarAddress { var, pass, element }
    }

    fn allocate(&mut self, var: EffectVariable, pass: u32, element: u32) -> u32 {
        let addr = Self::address(var, pass, element);
        if let Some(&offset) = self.map.get(&addr) {
            return offset;
        }
        let offset = (self.data.len() * 4) as u32;
        self.data.resize(self.data.len() + var.floats(), 0.0);
        self.map.insert(addr, offset);
        offset
    }

    /// Storage size in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len() * 4
    }

    /// Ensure `var` exists and return a gather copying it as a vector to `dst`.
    pub fn request_vector(
        &mut self,
        dst: u32,
        var: EffectVariable,
        pass: u32,
        element: u32,
    ) -> Vec4Gather {
        let offset = self.allocate(var, pass, element);
        Vec4Gather {
            dst,
            src: [offset, offset + 4, offset + 8, offset + 12],
        }
    }

    /// Gathers writing `var` as a row-major matrix at `dst`. Vector variables become the first
    /// row, followed by zero rows.
    pub fn request_row_major_matrix(
        &mut self,
        dst: u32,
        var: EffectVariable,
        pass: u32,
        element: u32,
    ) -> Mat4Gather {
        if var != EffectVariable::ModelViewProj {
            let first = self.request_vector(dst, var, pass, element);
            let zero = |i: u32| Vec4Gather {
                dst: dst + 16 * i,
                src: [ZERO_OFFSET; 4],
            };
            return Mat4Gather {
                rows: [first, zero(1), zero(2), zero(3)],
            };
        }
        let offset = self.allocate(var, pass, element);
        let row = |i: u32| {
            let base = offset + 16 * i;
            Vec4Gather {
                dst: dst + 16 * i,
                src: [base, base + 4, base + 8, base + 12],
            }
        };
        Mat4Gather {
            rows: [row(0), row(1), row(2), row(3)],
        }
    }

    /// Same as [`request_row_major_matrix`](Self::request_row_major_matrix), transposed.
    pub fn request_column_major_matrix(
        &mut self,
        dst: u32,
        var: EffectVariable,
        pass: u32,
        element: u32,
    ) -> Mat4Gather {
        let rm = self.request_row_major_matrix(dst, var, pass, element);
        let column = |c: usize| Vec4Gather {
            dst: dst + 16 * c as u32,
            src: [
                rm.rows[0].src[c],
                rm.rows[1].src[c],
                rm.rows[2].src[c],
                rm.rows[3].src[c],
            ],
        };
        Mat4Gather {
            rows: [column(0), column(1), column(2), column(3)],
        }
    }

    /// Byte offset of a previously requested variable.
    pub fn var_offset(&self, var: EffectVariable, pass: u32, element: u32) -> Option<u32> {
        self.map.get(&Self::address(var, pass, element)).copied()
    }

    pub fn resolve_pass_params(&self, pass: u32) -> PassParamOffsets {
        PassParamOffsets {
            video_size: self.var_offset(EffectVariable::VideoSize, pass, 0),
            texture_size: self.var_offset(EffectVariable::TextureSize, pass, 0),
            output_size: self.var_offset(EffectVariable::OutputSize, pass, 0),
            frame_direction: self.var_offset(EffectVariable::FrameDirection, pass, 0),
        }
    }

    pub fn resolve_frame_params(&self, pass: u32, frame: u32) -> FrameParamOffsets {
        FrameParamOffsets {
            frame_count: self.var_offset(EffectVariable::FrameCount, pass, frame),
        }
    }

    /// Store a vector; unrequested variables (`None`) are ignored.
    pub fn set_vector(&mut self, offset: Option<u32>, v: [f32; 4]) {
        if let Some(offset) = offset {
            let start = offset as usize / 4;
            if let Some(dst) = self.data.get_mut(start..start + 4) {
                dst.copy_from_slice(&v);
            }
        }
    }

    /// Store a matrix row by row.
    pub fn set_matrix(&mut self, offset: Option<u32>, m: &Float4x4) {
        if let Some(offset) = offset {
            let start = offset as usize / 4;
            if let Some(dst) = self.data.get_mut(start..start + 16) {
                for (row, src) in dst.chunks_exact_mut(4).zip(m.0.iter()) {
                    row.copy_from_slice(src);
                }
            }
        }
    }

    fn word(&self, src: u32) -> f32 {
        self.data.get(src as usize / 4).copied().unwrap_or(0.0)
    }

    /// `dst` word = 1 if the source float is non-zero, else 0.
    pub fn gather_bools(&self, dst: &mut [u32], gathers: &[ScalarGather]) {
        for g in gathers {
            if let Some(d) = dst.get_mut(g.dst as usize / 4) {
                *d = u32::from(self.word(g.src) != 0.0);
            }
        }
    }

    /// Copy float bits word by word.
    pub fn gather_floats(&self, dst: &mut [u32], gathers: &[ScalarGather]) {
        for g in gathers {
            if let Some(d) = dst.get_mut(g.dst as usize / 4) {
                *d = self.word(g.src).to_bits();
            }
        }
    }

    /// Copy whole vectors.
    pub fn gather_vecs(&self, dst: &mut [u32], gathers: &[Vec4Gather]) {
        for g in gathers {
            let start = g.dst as usize / 4;
            if let Some(d) = dst.get_mut(start..start + 4) {
                for (d, &src) in d.iter_mut().zip(&g.src) {
                    *d = self.word(src).to_bits();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effect/vars.rs"]
mod tests;
