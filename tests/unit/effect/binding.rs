use super::*;
use crate::device::{ReflectedBinding, ReflectedConstantBuffer, ReflectedMember};

fn binding(name: &str, slot: u32) -> ReflectedBinding {
    ReflectedBinding {
        name: name.to_owned(),
        slot,
    }
}

fn var(name: &str, offset: u32, size: u32, class: VariableClass) -> ReflectedVariable {
    ReflectedVariable {
        name: name.to_owned(),
        offset,
        size,
        class,
        default: None,
    }
}

fn cbuffer(name: &str, size: u32, variables: Vec<ReflectedVariable>) -> ReflectedConstantBuffer {
    ReflectedConstantBuffer {
        name: name.to_owned(),
        slot: 0,
        size,
        variables,
    }
}

fn custom() -> Vec<CustomTextureInfo> {
    vec![CustomTextureInfo {
        name: "LUT".to_owned(),
        linear: false,
    }]
}

fn analyze(pass: u32, fragment: &ShaderReflection) -> ScanoutResult<PassBindings> {
    let filtered = [true, false, true];
    let custom = custom();
    let scope = BindingScope {
        pass,
        filter_input: true,
        inputs_filtered: &filtered,
        custom: &custom,
    };
    PassBindings::analyze(&scope, &ShaderReflection::default(), fragment)
}

#[test]
fn textures_resolve_frames_and_custom_names() {
    let fragment = ShaderReflection {
        textures: vec![
            binding("IN_texture", 0),
            binding("ORIG_texture", 1),
            binding("LUT", 2),
            binding("PASS1_texture", 3),
        ],
        ..ShaderReflection::default()
    };
    let b = analyze(2, &fragment).unwrap();
    let sources: Vec<TextureSource> = b.textures.iter().map(|t| t.source).collect();
    assert_eq!(
        sources,
        [
            TextureSource::Frame(FrameRef::new(2, 0)),
            TextureSource::Frame(FrameRef::new(0, 0)),
            TextureSource::Custom(0),
            TextureSource::Frame(FrameRef::new(1, 0)),
        ]
    );
    assert_eq!(b.input_rows(), [0, 1, 2]);
    assert_eq!(b.slot_count(), 4);
}

#[test]
fn unnamed_slot_zero_is_the_pass_input() {
    let fragment = ShaderReflection {
        textures: vec![binding("tex", 0)],
        ..ShaderReflection::default()
    };
    let b = analyze(1, &fragment).unwrap();
    assert_eq!(b.textures[0].source, TextureSource::Frame(FrameRef::new(1, 0)));

    let fragment = ShaderReflection {
        textures: vec![binding("tex", 1)],
        ..ShaderReflection::default()
    };
    assert!(analyze(1, &fragment).is_err());
}

#[test]
fn sampler_filtering_follows_the_reading_pass() {
    let fragment = ShaderReflection {
        textures: vec![binding("IN_texture", 0), binding("PASS1_texture", 1), binding("LUT", 2)],
        samplers: vec![binding("IN_sampler", 0)],
        ..ShaderReflection::default()
    };
    let b = analyze(2, &fragment).unwrap();
    let linear = |slot: u32| b.samplers.iter().find(|s| s.slot == slot).unwrap().linear;
    // IN uses this pass's filter, PASS1 the filter of pass 1, LUT its own flag.
    assert!(linear(0));
    assert!(!linear(1));
    assert!(!linear(2));
    assert_eq!(b.samplers.len(), 3);
}

#[test]
fn frame_structs_and_flattened_members() {
    let fragment = ShaderReflection {
        constant_buffers: vec![cbuffer(
            "params",
            64,
            vec![
                var(
                    "IN",
                    0,
                    32,
                    VariableClass::Struct {
                        members: vec![
                            ReflectedMember {
                                name: "video_size".to_owned(),
                                offset: 0,
                                columns: 2,
                            },
                            ReflectedMember {
                                name: "frame_count".to_owned(),
                                offset: 16,
                                columns: 1,
                            },
                        ],
                    },
                ),
                var("ORIG.texture_size", 32, 8, VariableClass::Vector { columns: 2 }),
                var("user_gain", 48, 4, VariableClass::Scalar),
            ],
        )],
        ..ShaderReflection::default()
    };
    let b = analyze(1, &fragment).unwrap();
    let vars = &b.fragment_constants[0].vars;
    assert_eq!(vars.len(), 3);
    assert_eq!(vars[0].var, EffectVariable::VideoSize);
    assert_eq!(vars[0].shape, VarShape::Vector(2));
    assert_eq!(vars[1].offset, 16);
    assert_eq!(vars[1].shape, VarShape::Scalar);
    assert_eq!(vars[2].frame, FrameRef::new(0, 0));
    assert!(b.uses_frame_count);
    assert_eq!(b.input_rows(), [0, 1]);
}

#[test]
fn frame_buffers_bind_top_level_members() {
    let fragment = ShaderReflection {
        constant_buffers: vec![cbuffer(
            "orig",
            32,
            vec![
                var("orig_video_size", 0, 8, VariableClass::Vector { columns: 2 }),
                var("texture_size", 16, 8, VariableClass::Vector { columns: 2 }),
            ],
        )],
        ..ShaderReflection::default()
    };
    let b = analyze(1, &fragment).unwrap();
    let vars = &b.fragment_constants[0].vars;
    assert_eq!(vars.len(), 2);
    assert!(vars.iter().all(|v| v.frame == FrameRef::new(0, 0)));
    assert!(!b.uses_frame_count);
}

#[test]
fn transform_and_defaults() {
    let mut gain = var("gain", 64, 4, VariableClass::Scalar);
    gain.default = Some(0.5f32.to_le_bytes().to_vec());
    let vertex = ShaderReflection {
        constant_buffers: vec![cbuffer(
            "transform",
            80,
            vec![
                var(
                    "$modelViewProj",
                    0,
                    64,
                    VariableClass::Matrix {
                        rows: 4,
                        columns: 4,
                        row_major: false,
                    },
                ),
                gain,
            ],
        )],
        ..ShaderReflection::default()
    };
    let custom = custom();
    let scope = BindingScope {
        pass: 0,
        filter_input: false,
        inputs_filtered: &[false],
        custom: &custom,
    };
    let b = PassBindings::analyze(&scope, &vertex, &ShaderReflection::default()).unwrap();
    let cb = &b.vertex_constants[0];
    assert_eq!(cb.vars[0].var, EffectVariable::ModelViewProj);
    assert_eq!(cb.vars[0].shape, VarShape::Matrix { row_major: false });
    assert!(b.refs.is_empty());
    let words = cb.initial_words(20);
    assert_eq!(f32::from_bits(words[16]), 0.5);
    assert_eq!(words[0], 0);
}

#[test]
fn bad_layouts_and_references_are_rejected() {
    let fragment = ShaderReflection {
        constant_buffers: vec![cbuffer(
            "params",
            16,
            vec![var("wide", 8, 16, VariableClass::Vector { columns: 4 })],
        )],
        ..ShaderReflection::default()
    };
    let err = analyze(1, &fragment).unwrap_err();
    assert!(err.to_string().contains("extends outside"));

    let fragment = ShaderReflection {
        textures: vec![binding("PASS3_texture", 0)],
        ..ShaderReflection::default()
    };
    assert!(analyze(2, &fragment).is_err());
}
