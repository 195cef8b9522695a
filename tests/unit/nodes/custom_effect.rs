use std::path::PathBuf;

use super::*;
use crate::device::SoftContext;
use crate::effect::{EffectBackendKind, load_custom_effect};
use crate::foundation::core::{Pixmap, PixmapFormat};
use crate::nodes::{ImageSourceNode, QueuedSourceNode, shared};
use crate::render::NodeContextOpts;

const TINT: &str = "soft-program\nkernel tint\ncbuffer params 0 16\nvector color 0 4\ndefault 0.5 1 1 1\ntexture IN_texture 0\n";

fn effect_file(name: &str, effect: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("scanout-cenode-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    for (file, text) in files {
        std::fs::write(dir.join(file), text).unwrap();
    }
    let path = dir.join("effect.cgp");
    std::fs::write(&path, effect).unwrap();
    path
}

struct Rig {
    ctx: SoftContext,
    dctx: NodeContext,
    source: Rc<RefCell<ImageSourceNode>>,
}

fn rig() -> Rig {
    let mut ctx = SoftContext::new(4, 4);
    let mut dctx = NodeContext::init(&mut ctx, NodeContextOpts::default()).unwrap();
    let source = shared(
        ImageSourceNode::init(&mut ctx, &mut dctx, 4, 4, PixmapFormat::Xrgb8888).unwrap(),
    );
    Rig { ctx, dctx, source }
}

fn pipeline(rig: &mut Rig, path: &std::path::Path) -> CustomEffectPipelineRef {
    let effect =
        load_custom_effect(&mut rig.ctx, &mut rig.dctx, path, EffectBackendKind::Modern).unwrap();
    let source: QueuedSourceNodeRef = rig.source.clone();
    Rc::new(RefCell::new(
        CustomEffectPipelineNode::init(&mut rig.ctx, effect, source, Extent::new(4, 4)).unwrap(),
    ))
}

#[test]
fn queue_is_sized_to_the_effect_history() {
    let mut rig = rig();
    let add = "soft-program\nkernel add\ntexture IN_texture 0\ntexture PREV_texture 1\n";
    let path = effect_file("queue", "shader0 = add.soft\n", &[("add.soft", add)]);
    let p = pipeline(&mut rig, &path);
    assert_eq!(p.borrow().effect().max_prev_frames(), 1);
    assert!(rig.source.borrow().result_texture(1).is_some());
    assert!(rig.source.borrow().result_texture(2).is_none());
}

#[test]
fn source_node_rejects_final_blit() {
    let mut rig = rig();
    let path = effect_file(
        "blit",
        "shader0 = tint.soft\nscale_type0 = viewport\nscale0 = 1\n",
        &[("tint.soft", TINT)],
    );
    let p = pipeline(&mut rig, &path);
    assert!(CustomEffectSourceNode::init(p).is_err());
}

#[test]
fn display_node_requires_final_blit() {
    let mut rig = rig();
    let path = effect_file("nofinal", "shader0 = tint.soft\n", &[("tint.soft", TINT)]);
    let p = pipeline(&mut rig, &path);
    assert!(!p.borrow().effect().contains_final_blit());
    let err = CustomEffectNode::init(p.clone(), None).err().unwrap();
    assert!(matches!(err, ScanoutError::Validation(_)), "{err}");
    assert!(CustomEffectSourceNode::init(p).is_ok());
}

#[test]
fn source_node_supplies_the_last_pass_output() {
    let mut rig = rig();
    let path = effect_file("out", "shader0 = tint.soft\n", &[("tint.soft", TINT)]);
    let p = pipeline(&mut rig, &path);
    let mut node = CustomEffectSourceNode::init(p.clone()).unwrap();
    assert_eq!(node.texture_mapping().texel_size.x, 4.0);

    rig.source
        .borrow_mut()
        .load(&mut rig.ctx, &Pixmap::solid(4, 4, 0x00FF_8040))
        .unwrap();
    let tex = node.draw(&mut rig.ctx, &mut rig.dctx).unwrap();
    assert_eq!(rig.ctx.read_pixel(tex, 1, 2), Some(0xFF80_8040));
    assert!(!node.has_error());
    assert_eq!(rig.ctx.scope_depth(), 0);
}

#[test]
fn busy_source_is_reported_as_an_error() {
    let mut rig = rig();
    let path = effect_file("busy", "shader0 = tint.soft\n", &[("tint.soft", TINT)]);
    let p = pipeline(&mut rig, &path);
    let _held = rig.source.borrow_mut();
    let mut node = p.borrow_mut();
    node.run(&mut rig.ctx, &mut rig.dctx);
    assert!(node.final_texture().is_none());
}
