//! Textual bytecode understood by [`SoftContext`](super::SoftContext).
//!
//! ```text
//! soft-program
//! kernel tint
//! cbuffer params 0 16
//! vector color 0 4
//! texture IN_texture 0
//! sampler IN_sampler 0
//! ```
//!
//! Lines after the header declare the kernel, constant buffers and their members (members
//! attach to the most recent `cbuffer`, struct members to the most recent `struct`), texture
//! and sampler slots, and the compute thread group size. `#` starts a comment line.

use crate::device::{
    BuiltinProgram, ReflectedBinding, ReflectedConstantBuffer, ReflectedMember,
    ReflectedVariable, ShaderReflection, VariableClass,
};
use crate::foundation::error::{ScanoutError, ScanoutResult};

const HEADER: &str = "soft-program";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Stage {
    Vertex,
    Fragment,
    Compute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Kernel {
    Vertex,
    Blit,
    BlitSharp,
    BlitY,
    BlitPal8,
    BicubicH,
    BicubicV,
    ScreenFx,
    Artifacting,
    BloomThreshold,
    BloomBlur,
    BloomDown,
    BloomUp,
    BloomFinal,
    Solid,
    Tint,
    Add,
    BloomThresholdCs,
}

impl Kernel {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "vertex" => Self::Vertex,
            "blit" => Self::Blit,
            "blit_sharp" => Self::BlitSharp,
            "blit_y" => Self::BlitY,
            "blit_pal8" => Self::BlitPal8,
            "bicubic_h" => Self::BicubicH,
            "bicubic_v" => Self::BicubicV,
            "screenfx" => Self::ScreenFx,
            "artifacting" => Self::Artifacting,
            "bloom_threshold" => Self::BloomThreshold,
            "bloom_blur" => Self::BloomBlur,
            "bloom_down" => Self::BloomDown,
            "bloom_up" => Self::BloomUp,
            "bloom_final" => Self::BloomFinal,
            "solid" => Self::Solid,
            "tint" => Self::Tint,
            "add" => Self::Add,
            "bloom_threshold_cs" => Self::BloomThresholdCs,
            _ => return None,
        })
    }

    pub(crate) fn stage(self) -> Stage {
        match self {
            Self::Vertex => Stage::Vertex,
            Self::BloomThresholdCs => Stage::Compute,
            _ => Stage::Fragment,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SoftProgram {
    pub(crate) kernel: Kernel,
    pub(crate) reflection: ShaderReflection,
}

pub(crate) fn parse_program(bytecode: &[u8]) -> ScanoutResult<SoftProgram> {
    let text = std::str::from_utf8(bytecode)
        .map_err(|_| ScanoutError::asset("soft program bytecode is not UTF-8 text"))?;
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

    match lines.next() {
        Some((_, HEADER)) => {}
        _ => return Err(ScanoutError::asset("missing soft-program header")),
    }

    let mut kernel = None;
    let mut reflection = ShaderReflection {
        thread_group: [1, 1, 1],
        ..ShaderReflection::default()
    };

    for (line_no, line) in lines {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tok = line.split_whitespace();
        let Some(directive) = tok.next() else {
            continue;
        };
        let args: Vec<&str> = tok.collect();
        let bad = |what: &str| ScanoutError::asset(format!("line {line_no}: {what}: '{line}'"));
        let num = |i: usize| -> ScanoutResult<u32> {
            args.get(i)
                .and_then(|s| s.parse::<u32>().ok())
                .ok_or_else(|| bad("expected number"))
        };
        let name = |i: usize| -> ScanoutResult<String> {
            args.get(i)
                .map(|s| (*s).to_owned())
                .ok_or_else(|| bad("expected name"))
        };

        match directive {
            "kernel" => {
                let k = args
                    .first()
                    .and_then(|s| Kernel::parse(s))
                    .ok_or_else(|| bad("unknown kernel"))?;
                kernel = Some(k);
            }
            "threads" => {
                reflection.thread_group = [num(0)?, num(1)?, num(2)?];
            }
            "cbuffer" => {
                reflection.constant_buffers.push(ReflectedConstantBuffer {
                    name: name(0)?,
                    slot: num(1)?,
                    size: num(2)?,
                    variables: Vec::new(),
                });
            }
            "scalar" | "bool" | "vector" | "matrix" | "struct" => {
                let var_name = name(0)?;
                let offset = num(1)?;
                let (class, size) = match directive {
                    "scalar" => (VariableClass::Scalar, 4),
                    "bool" => (VariableClass::Bool, 4),
                    "vector" => {
                        let columns = num(2)?;
                        if !(1..=4).contains(&columns) {
                            return Err(bad("vector width must be 1..=4"));
                        }
                        (VariableClass::Vector { columns }, columns * 4)
                    }
                    "matrix" => {
                        let rows = num(2)?;
                        let columns = num(3)?;
                        let row_major = match args.get(4).copied() {
                            Some("row") => true,
                            Some("col") => false,
                            _ => return Err(bad("matrix order must be row or col")),
                        };
                        let regs = if row_major { columns } else { rows };
                        let comps = if row_major { rows } else { columns };
                        (
                            VariableClass::Matrix {
                                rows,
                                columns,
                                row_major,
                            },
                            (regs.saturating_sub(1)) * 16 + 4 * comps,
                        )
                    }
                    _ => (VariableClass::Struct { members: Vec::new() }, num(2)?),
                };
                let cb = reflection
                    .constant_buffers
                    .last_mut()
                    .ok_or_else(|| bad("variable outside cbuffer"))?;
                cb.variables.push(ReflectedVariable {
                    name: var_name,
                    offset,
                    size,
                    class,
                    default: None,
                });
            }
            "member" => {
                let member = ReflectedMember {
                    name: name(0)?,
                    offset: num(1)?,
                    columns: num(2)?,
                };
                let var = reflection
                    .constant_buffers
                    .last_mut()
                    .and_then(|cb| cb.variables.last_mut())
                    .ok_or_else(|| bad("member outside struct"))?;
                match &mut var.class {
                    VariableClass::Struct { members } => members.push(member),
                    _ => return Err(bad("member outside struct")),
                }
            }
            "default" => {
                let mut bytes = Vec::with_capacity(args.len() * 4);
                for a in &args {
                    let v: f32 = a.parse().map_err(|_| bad("expected float"))?;
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                let var = reflection
                    .constant_buffers
                    .last_mut()
                    .and_then(|cb| cb.variables.last_mut())
                    .ok_or_else(|| bad("default outside variable"))?;
                var.default = Some(bytes);
            }
            "texture" => reflection.textures.push(ReflectedBinding {
                name: name(0)?,
                slot: num(1)?,
            }),
            "sampler" => reflection.samplers.push(ReflectedBinding {
                name: name(0)?,
                slot: num(1)?,
            }),
            _ => return Err(bad("unknown directive")),
        }
    }

    let kernel = kernel.ok_or_else(|| ScanoutError::asset("soft program declares no kernel"))?;
    Ok(SoftProgram { kernel, reflection })
}

// Constant layouts below are what the node implementations upload into slot 0.
pub(crate) fn builtin_bytecode(program: BuiltinProgram) -> &'static [u8] {
    match program {
        BuiltinProgram::VertexTex1 => b"soft-program\n# position + uv0\nkernel vertex\n",
        BuiltinProgram::VertexTex2 => b"soft-program\n# position + uv0 + uv1\nkernel vertex\n",
        BuiltinProgram::VertexTex3 => {
            b"soft-program\n# position + uv0 + uv1 + uv2\nkernel vertex\n"
        }
        BuiltinProgram::VertexEffect => {
            b"soft-program\nkernel vertex\ncbuffer transform 0 64\nmatrix modelViewProj 0 4 4 row\n"
        }
        BuiltinProgram::FragmentBlit => b"soft-program\nkernel blit\n",
        // (sharpness.xy, texture size.xy)
        BuiltinProgram::FragmentBlitSharp => b"soft-program\nkernel blit_sharp\n",
        BuiltinProgram::FragmentBlitY => b"soft-program\nkernel blit_y\n",
        BuiltinProgram::FragmentBlitPal8 => b"soft-program\nkernel blit_pal8\n",
        // (source size.xy, 0, 0)
        BuiltinProgram::FragmentBicubicH => b"soft-program\nkernel bicubic_h\n",
        BuiltinProgram::FragmentBicubicV => b"soft-program\nkernel bicubic_v\n",
        // 3 matrix rows, (scanline strength, hdr scale, signed input, matrix enabled), then
        // (sharpness.xy, texture size.xy) with sharpness 0 meaning plain sampling;
        // textures: source, gamma ramp, scanline mask (uv1), screen mask (uv2)
        BuiltinProgram::FragmentScreenFx => b"soft-program\nkernel screenfx\n",
        // (texel size.xy, dy, signed output)
        BuiltinProgram::FragmentArtifacting => b"soft-program\nkernel artifacting\n",
        // (threshold, scale, 0, 0)
        BuiltinProgram::FragmentBloomThreshold => b"soft-program\nkernel bloom_threshold\n",
        // (uv step.xy, 0, 0)
        BuiltinProgram::FragmentBloomBlur => b"soft-program\nkernel bloom_blur\n",
        // (texel size.xy, 0, 0)
        BuiltinProgram::FragmentBloomDown => b"soft-program\nkernel bloom_down\n",
        // (coarse weight, fine weight, 0, 0)
        BuiltinProgram::FragmentBloomUp => b"soft-program\nkernel bloom_up\n",
        // (base weight, bloom weight, 0, 0)
        BuiltinProgram::FragmentBloomFinal => b"soft-program\nkernel bloom_final\n",
        BuiltinProgram::ComputeBloomThreshold => {
            b"soft-program\nkernel bloom_threshold_cs\nthreads 8 8 1\n"
        }
    }
}
