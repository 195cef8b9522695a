use super::*;

struct Quad {
    format: VertexFormatHandle,
    vp: VertexProgramHandle,
    vb: VertexBufferHandle,
    ib: IndexBufferHandle,
}

fn fullscreen_quad(ctx: &mut SoftContext) -> Quad {
    let layout = VertexLayout {
        elements: vec![
            crate::device::VertexElement {
                semantic: VertexSemantic::Position,
                format: VertexElementFormat::Float2,
                offset: 0,
            },
            crate::device::VertexElement {
                semantic: VertexSemantic::TexCoord(0),
                format: VertexElementFormat::Float2,
                offset: 8,
            },
        ],
        stride: 16,
    };
    let verts: [f32; 16] = [
        -1.0, 1.0, 0.0, 0.0, //
        1.0, 1.0, 1.0, 0.0, //
        1.0, -1.0, 1.0, 1.0, //
        -1.0, -1.0, 0.0, 1.0,
    ];
    let format = ctx.create_vertex_format(&layout).unwrap();
    let vp = ctx
        .create_vertex_program(builtin_bytecode(BuiltinProgram::VertexTex1))
        .unwrap();
    let vb = ctx.create_vertex_buffer(64).unwrap();
    ctx.write_vertex_buffer(vb, 0, bytemuck::cast_slice(&verts))
        .unwrap();
    let ib = ctx.create_index_buffer(6).unwrap();
    ctx.write_index_buffer(ib, 0, &[0, 1, 2, 0, 2, 3]).unwrap();
    Quad { format, vp, vb, ib }
}

fn draw_quad(
    ctx: &mut SoftContext,
    quad: &Quad,
    fp: FragmentProgramHandle,
    textures: &[Option<TextureHandle>],
    constants: &[Option<ConstantBufferHandle>],
) -> ScanoutResult<()> {
    ctx.draw(&DrawCall {
        vertex_format: quad.format,
        vertex_program: quad.vp,
        fragment_program: fp,
        blend: None,
        vertex_buffer: quad.vb,
        vertex_offset: 0,
        vertex_count: 4,
        index_buffer: quad.ib,
        index_offset: 0,
        index_count: 6,
        textures,
        samplers: &[],
        vertex_constants: &[],
        fragment_constants: constants,
    })
}

fn solid_texture(ctx: &mut SoftContext, w: u32, h: u32, argb: u32) -> TextureHandle {
    let tex = ctx
        .create_texture(&TextureDesc::shader(w, h, Format::Bgra8Unorm))
        .unwrap();
    let data: Vec<u32> = vec![argb; (w * h) as usize];
    ctx.write_texture(tex, 0, bytemuck::cast_slice(&data), w as usize * 4)
        .unwrap();
    tex
}

#[test]
fn clear_fills_only_the_viewport() {
    let mut ctx = SoftContext::new(4, 4);
    ctx.clear(0xFF00_0000);
    ctx.set_viewport(Viewport {
        x: 2,
        y: 0,
        width: 2,
        height: 4,
    });
    ctx.clear(0xFFFF_0000);

    assert_eq!(ctx.backbuffer_pixel(0, 0), Some(0xFF00_0000));
    assert_eq!(ctx.backbuffer_pixel(1, 3), Some(0xFF00_0000));
    assert_eq!(ctx.backbuffer_pixel(2, 0), Some(0xFFFF_0000));
    assert_eq!(ctx.backbuffer_pixel(3, 3), Some(0xFFFF_0000));
    assert_eq!(ctx.stats().clears, 2);
}

#[test]
fn blit_copies_a_texture_over_the_viewport() {
    let mut ctx = SoftContext::new(2, 2);
    ctx.clear(0xFFFF_0000);
    let quad = fullscreen_quad(&mut ctx);
    let fp = ctx
        .create_fragment_program(builtin_bytecode(BuiltinProgram::FragmentBlit))
        .unwrap();
    let tex = solid_texture(&mut ctx, 1, 1, 0xFF00_FF00);

    draw_quad(&mut ctx, &quad, fp, &[Some(tex)], &[]).unwrap();

    for y in 0..2 {
        for x in 0..2 {
            assert_eq!(ctx.backbuffer_pixel(x, y), Some(0xFF00_FF00), "pixel {x},{y}");
        }
    }
    assert_eq!(ctx.stats().draws, 1);
    assert_eq!(ctx.stats().triangles, 2);
}

#[test]
fn solid_kernel_reads_fragment_constants() {
    let mut ctx = SoftContext::new(2, 2);
    let quad = fullscreen_quad(&mut ctx);
    let fp = ctx
        .create_fragment_program(b"soft-program\nkernel solid\n")
        .unwrap();
    let cb = ctx.create_constant_buffer(16).unwrap();
    ctx.write_constant_buffer(cb, bytemuck::cast_slice(&[0.0f32, 0.0, 1.0, 1.0]))
        .unwrap();

    draw_quad(&mut ctx, &quad, fp, &[], &[Some(cb)]).unwrap();
    assert_eq!(ctx.backbuffer_pixel(1, 1), Some(0xFF00_00FF));
}

#[test]
fn program_stage_must_match_creation_call() {
    let mut ctx = SoftContext::new(1, 1);
    let blit = builtin_bytecode(BuiltinProgram::FragmentBlit);
    assert!(ctx.create_vertex_program(blit).is_err());
    assert!(ctx.create_fragment_program(blit).is_ok());
    assert!(ctx.create_fragment_program(b"not a program").is_err());
}

#[test]
fn effect_vertex_program_reflects_its_transform() {
    let ctx = SoftContext::new(1, 1);
    let refl = ctx
        .reflect_program(builtin_bytecode(BuiltinProgram::VertexEffect))
        .unwrap();
    let cb = &refl.constant_buffers[0];
    assert_eq!(cb.name, "transform");
    assert_eq!(cb.variables[0].name, "modelViewProj");
    assert_eq!(cb.variables[0].size, 64);

    let cs = ctx
        .reflect_program(builtin_bytecode(BuiltinProgram::ComputeBloomThreshold))
        .unwrap();
    assert_eq!(cs.thread_group, [8, 8, 1]);
}

#[test]
fn reflection_parses_structs_and_bindings() {
    let ctx = SoftContext::new(1, 1);
    let src = b"soft-program
kernel tint
cbuffer params 0 48
struct IN 0 32
member video_size 0 2
member texture_size 8 2
bool enabled 32
default 1
texture IN_texture 0
sampler IN_sampler 0
";
    let refl = ctx.reflect_program(src).unwrap();
    let vars = &refl.constant_buffers[0].variables;
    match &vars[0].class {
        VariableClass::Struct { members } => {
            assert_eq!(members.len(), 2);
            assert_eq!(members[1].name, "texture_size");
            assert_eq!(members[1].offset, 8);
        }
        other => panic!("unexpected class {other:?}"),
    }
    assert_eq!(vars[1].class, VariableClass::Bool);
    assert_eq!(vars[1].default.as_deref(), Some(&1.0f32.to_le_bytes()[..]));
    assert_eq!(refl.textures[0].name, "IN_texture");
    assert_eq!(refl.samplers[0].slot, 0);
}

#[test]
fn lost_device_rejects_draws_until_reset() {
    let mut ctx = SoftContext::new(2, 2);
    let quad = fullscreen_quad(&mut ctx);
    let fp = ctx
        .create_fragment_program(builtin_bytecode(BuiltinProgram::FragmentBlit))
        .unwrap();
    let rt = ctx
        .create_texture(&TextureDesc::render_target(2, 2, Format::Bgra8Unorm))
        .unwrap();
    let src = solid_texture(&mut ctx, 1, 1, 0xFFFF_FFFF);

    ctx.lose_device();
    assert!(ctx.is_device_lost());
    assert!(matches!(
        draw_quad(&mut ctx, &quad, fp, &[Some(src)], &[]),
        Err(ScanoutError::DeviceLost)
    ));

    ctx.reset();
    assert!(!ctx.is_device_lost());
    assert!(ctx.texture_desc(rt).is_none());
    assert!(ctx.texture_desc(src).is_some());
    assert!(ctx.texture_desc(ctx.backbuffer()).is_some());
    draw_quad(&mut ctx, &quad, fp, &[Some(src)], &[]).unwrap();
}

#[test]
fn uploads_are_validated() {
    let mut ctx = SoftContext::new(1, 1);
    let tex = ctx
        .create_texture(&TextureDesc::shader(2, 2, Format::R8Unorm))
        .unwrap();
    assert!(ctx.write_texture(tex, 0, &[1, 2, 3], 2).is_err());
    assert!(ctx.write_texture(tex, 1, &[0; 4], 2).is_err());
    ctx.write_texture(tex, 0, &[255, 0, 0, 255], 2).unwrap();
    assert_eq!(ctx.read_pixel(tex, 0, 0), Some(0xFFFF_0000));

    assert!(!ctx.is_format_supported(Format::Rgba16Float, TextureUsage::SHADER));
    ctx.disable_format(Format::Rgba32Float);
    assert!(
        ctx.create_texture(&TextureDesc::render_target(1, 1, Format::Rgba32Float))
            .is_err()
    );
}

#[test]
fn textures_over_device_limits_are_rejected() {
    let mut ctx = SoftContext::new(1, 1).with_caps(DeviceCaps {
        max_texture_width: 16,
        max_texture_height: 16,
        ..DeviceCaps::default()
    });
    assert!(
        ctx.create_texture(&TextureDesc::shader(17, 1, Format::Bgra8Unorm))
            .is_err()
    );
}

#[test]
fn threshold_dispatch_writes_the_uav() {
    let mut ctx = SoftContext::new(1, 1);
    let src = solid_texture(&mut ctx, 4, 4, 0xFFCC_CCCC);
    let dst = ctx
        .create_texture(&TextureDesc {
            width: 4,
            height: 4,
            format: Format::Rgba32Float,
            mip_levels: 1,
            usage: TextureUsage::SHADER | TextureUsage::UAV,
        })
        .unwrap();
    let uav = ctx.create_uav(dst).unwrap();
    let cs = ctx
        .create_compute_program(builtin_bytecode(BuiltinProgram::ComputeBloomThreshold))
        .unwrap();
    let cb = ctx.create_constant_buffer(16).unwrap();
    ctx.write_constant_buffer(cb, bytemuck::cast_slice(&[0.5f32, 2.0, 0.0, 0.0]))
        .unwrap();

    ctx.dispatch(&DispatchCall {
        program: cs,
        textures: &[Some(src)],
        samplers: &[],
        uavs: &[Some(uav)],
        constants: &[Some(cb)],
        groups: [1, 1, 1],
    })
    .unwrap();

    let texel = ctx.read_texel(dst, 3, 3).unwrap();
    let expected = (0xCC as f32 / 255.0 - 0.5) * 2.0;
    assert!((texel[0] - expected).abs() < 1e-5);
    assert_eq!(texel[3], 1.0);
    assert_eq!(ctx.stats().dispatches, 1);
}

#[test]
fn destroy_releases_objects_but_keeps_the_backbuffer() {
    let mut ctx = SoftContext::new(1, 1);
    let tex = solid_texture(&mut ctx, 1, 1, 0);
    assert_eq!(ctx.live_textures(), 2);
    ctx.destroy(tex.into());
    ctx.destroy(ctx.backbuffer().into());
    ctx.destroy(DeviceObject::Texture(tex));
    assert_eq!(ctx.live_textures(), 1);
}
