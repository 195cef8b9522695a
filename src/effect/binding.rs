//! Name-based binding of effect program resources.
//!
//! Pass programs declare textures, samplers and constants by name (`IN_texture`,
//! `PASS2_sampler`, a struct `ORIG` with a `video_size` member, `modelViewProj`, ...). Analysis
//! turns a program's reflection into backend-neutral bindings; each backend then turns them into
//! its own gathers and slots.

use crate::device::{ReflectedVariable, ShaderReflection, VariableClass};
use crate::foundation::error::{ScanoutError, ScanoutResult};

use super::frame_ref::FrameRef;
use super::vars::EffectVariable;

/// A custom texture as seen by binding analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CustomTextureInfo {
    pub name: String,
    pub linear: bool,
}

/// What a pass is being analyzed against.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BindingScope<'a> {
    pub pass: u32,
    pub filter_input: bool,
    /// `filter_linear` of every pass, by pass index.
    pub inputs_filtered: &'a [bool],
    pub custom: &'a [CustomTextureInfo],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TextureSource {
    Frame(FrameRef),
    Custom(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TextureBinding {
    pub slot: u32,
    pub source: TextureSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SamplerBinding {
    pub slot: u32,
    pub linear: bool,
}

/// Storage shape of a bound variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VarShape {
    Scalar,
    Bool,
    Vector(u32),
    Matrix { row_major: bool },
}

/// An effect variable written at `offset` bytes into a constant buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct VarBinding {
    pub offset: u32,
    pub var: EffectVariable,
    pub frame: FrameRef,
    pub shape: VarShape,
}

/// One constant buffer: its initial contents and the variables refreshed into it.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ConstantLayout {
    pub name: String,
    pub slot: u32,
    pub size: u32,
    pub defaults: Vec<u8>,
    pub vars: Vec<VarBinding>,
}

impl ConstantLayout {
    /// Initial contents as words, zero padded to `words`.
    pub fn initial_words(&self, words: usize) -> Vec<u32> {
        let mut out = vec![0u32; words];
        for (w, chunk) in out.iter_mut().zip(self.defaults.chunks(4)) {
            let mut b = [0u8; 4];
            b[..chunk.len()].copy_from_slice(chunk);
            *w = u32::from_le_bytes(b);
        }
        out
    }
}

/// Everything a pass binds by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct PassBindings {
    pub textures: Vec<TextureBinding>,
    pub samplers: Vec<SamplerBinding>,
    pub vertex_constants: Vec<ConstantLayout>,
    pub fragment_constants: Vec<ConstantLayout>,
    /// Every frame read through a texture or variable.
    pub refs: Vec<FrameRef>,
    pub uses_frame_count: bool,
}

impl PassBindings {
    pub fn analyze(
        scope: &BindingScope<'_>,
        vertex: &ShaderReflection,
        fragment: &ShaderReflection,
    ) -> ScanoutResult<Self> {
        let mut out = Self::default();

        for tex in &fragment.textures {
            let source = resolve_texture(scope, &tex.name, tex.slot, &["_texture"])?;
            if let TextureSource::Frame(r) = source {
                out.refs.push(r);
            }
            out.textures.push(TextureBinding {
                slot: tex.slot,
                source,
            });
        }

        for sampler in &fragment.samplers {
            let source = resolve_texture(scope, &sampler.name, sampler.slot, &["_sampler", "_texture"])?;
            out.samplers.push(SamplerBinding {
                slot: sampler.slot,
                linear: source_linear(scope, source),
            });
        }

        // Texture slots without a declared sampler sample with their source's filtering.
        for tex in &out.textures {
            if !out.samplers.iter().any(|s| s.slot == tex.slot) {
                out.samplers.push(SamplerBinding {
                    slot: tex.slot,
                    linear: source_linear(scope, tex.source),
                });
            }
        }

        out.vertex_constants = analyze_constants(scope, vertex, &mut out.refs)?;
        out.fragment_constants = analyze_constants(scope, fragment, &mut out.refs)?;
        out.uses_frame_count = out
            .vertex_constants
            .iter()
            .chain(&out.fragment_constants)
            .flat_map(|cb| &cb.vars)
            .any(|v| v.var == EffectVariable::FrameCount);
        Ok(out)
    }

    /// Grid rows this pass reads, ascending.
    pub fn input_rows(&self) -> Vec<u32> {
        let mut rows: Vec<u32> = self.refs.iter().map(|r| r.pass).collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }

    /// Slots needed to hold every texture and sampler binding.
    pub fn slot_count(&self) -> usize {
        self.textures
            .iter()
            .map(|t| t.slot)
            .chain(self.samplers.iter().map(|s| s.slot))
            .max()
            .map_or(0, |s| s as usize + 1)
    }
}

fn resolve_texture(
    scope: &BindingScope<'_>,
    name: &str,
    slot: u32,
    suffixes: &[&str],
) -> ScanoutResult<TextureSource> {
    let stem = suffixes
        .iter()
        .find_map(|s| name.strip_suffix(s))
        .unwrap_or(name);

    if let Some(r) = FrameRef::parse(stem, scope.pass)? {
        return Ok(TextureSource::Frame(r));
    }
    if let Some(i) = scope
        .custom
        .iter()
        .position(|c| c.name == stem || c.name == name)
    {
        return Ok(TextureSource::Custom(i));
    }
    if slot == 0 {
        return Ok(TextureSource::Frame(FrameRef::new(scope.pass, 0)));
    }
    Err(ScanoutError::validation(format!(
        "pass {}: '{name}' does not name a frame or custom texture",
        scope.pass
    )))
}

fn source_linear(scope: &BindingScope<'_>, source: TextureSource) -> bool {
    match source {
        TextureSource::Frame(r) if r.pass >= scope.pass => scope.filter_input,
        TextureSource::Frame(r) => scope
            .inputs_filtered
            .get(r.pass as usize)
            .copied()
            .unwrap_or(scope.filter_input),
        TextureSource::Custom(i) => scope.custom.get(i).is_some_and(|c| c.linear),
    }
}

fn shape_of(class: &VariableClass) -> Option<VarShape> {
    Some(match class {
        VariableClass::Scalar => VarShape::Scalar,
        VariableClass::Bool => VarShape::Bool,
        VariableClass::Vector { columns } => VarShape::Vector(*columns),
        VariableClass::Matrix { row_major, .. } => VarShape::Matrix {
            row_major: *row_major,
        },
        VariableClass::Struct { .. } => return None,
    })
}

fn member_shape(columns: u32) -> VarShape {
    if columns <= 1 {
        VarShape::Scalar
    } else {
        VarShape::Vector(columns.min(4))
    }
}

/// Frame implied by a constant buffer's name, for buffers that hold one frame's parameters.
fn frame_buffer(name: &str, pass: u32) -> Option<FrameRef> {
    match name.to_ascii_lowercase().as_str() {
        "orig" => Some(FrameRef::new(0, 0)),
        "input" => Some(FrameRef::new(pass, 0)),
        "prev" => Some(FrameRef::new(0, 1)),
        _ => None,
    }
}

fn analyze_constants(
    scope: &BindingScope<'_>,
    reflection: &ShaderReflection,
    refs: &mut Vec<FrameRef>,
) -> ScanoutResult<Vec<ConstantLayout>> {
    let mut layouts = Vec::with_capacity(reflection.constant_buffers.len());
    for cb in &reflection.constant_buffers {
        let mut layout = ConstantLayout {
            name: cb.name.clone(),
            slot: cb.slot,
            size: cb.size,
            defaults: vec![0; cb.size as usize],
            vars: Vec::new(),
        };
        let cb_frame = frame_buffer(&cb.name, scope.pass);
        let prefix = format!("{}_", cb.name.to_ascii_lowercase());

        for v in &cb.variables {
            if v.offset.checked_add(v.size).is_none_or(|end| end > cb.size) {
                return Err(ScanoutError::validation(format!(
                    "pass {}: variable '{}' extends outside constant buffer '{}'",
                    scope.pass, v.name, cb.name
                )));
            }
            if let Some(default) = &v.default {
                let start = v.offset as usize;
                let len = default.len().min(v.size as usize);
                layout.defaults[start..start + len].copy_from_slice(&default[..len]);
            }

            let before = layout.vars.len();
            bind_variable(scope, cb_frame, &prefix, v, &mut layout.vars)?;
            refs.extend(
                layout.vars[before..]
                    .iter()
                    .filter(|b| b.var != EffectVariable::ModelViewProj)
                    .map(|b| b.frame),
            );
        }
        layouts.push(layout);
    }
    Ok(layouts)
}

fn bind_variable(
    scope: &BindingScope<'_>,
    cb_frame: Option<FrameRef>,
    prefix: &str,
    v: &ReflectedVariable,
    out: &mut Vec<VarBinding>,
) -> ScanoutResult<()> {
    let name = v.name.strip_prefix('$').unwrap_or(&v.name);

    if name == "modelViewProj" {
        if let VariableClass::Matrix { row_major, .. } = v.class {
            out.push(VarBinding {
                offset: v.offset,
                var: EffectVariable::ModelViewProj,
                frame: FrameRef::new(0, 0),
                shape: VarShape::Matrix { row_major },
            });
        }
        return Ok(());
    }

    if let Some(frame) = cb_frame {
        let member = name.strip_prefix(prefix).unwrap_or(name);
        if let (Some(var), Some(shape)) = (EffectVariable::from_member_name(member), shape_of(&v.class)) {
            out.push(VarBinding {
                offset: v.offset,
                var,
                frame,
                shape,
            });
        }
        return Ok(());
    }

    if let VariableClass::Struct { members } = &v.class {
        let Some(frame) = FrameRef::parse(name, scope.pass)? else {
            return Ok(());
        };
        for m in members {
            if let Some(var) = EffectVariable::from_member_name(&m.name) {
                out.push(VarBinding {
                    offset: v.offset + m.offset,
                    var,
                    frame,
                    shape: member_shape(m.columns),
                });
            }
        }
        return Ok(());
    }

    if let Some((head, member)) = name.split_once('.')
        && let Some(var) = EffectVariable::from_member_name(member)
        && let Some(shape) = shape_of(&v.class)
        && let Some(frame) = FrameRef::parse(head, scope.pass)?
    {
        out.push(VarBinding {
            offset: v.offset,
            var,
            frame,
            shape,
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/effect/binding.rs"]
mod tests;
