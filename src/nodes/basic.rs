use tracing::warn;

use super::{DisplayNode, DisplayNodeRef};
use crate::device::GraphicsContext;
use crate::render::{NodeContext, RenderView};

/// Draws its children in order into the same view; later children draw over earlier ones.
#[derive(Default)]
pub struct SequenceNode {
    children: Vec<DisplayNodeRef>,
}

impl SequenceNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: DisplayNodeRef) {
        self.children.push(node);
    }

    pub fn remove_all(&mut self) {
        self.children.clear();
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl DisplayNode for SequenceNode {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        for (i, child) in self.children.iter().enumerate() {
            let Ok(mut child) = child.try_borrow_mut() else {
                warn!(child = i, "sequence child is already being drawn");
                continue;
            };
            ctx.begin_scope(child.name());
            child.draw(ctx, dctx, view);
            ctx.end_scope();
        }
    }

    fn has_error(&self) -> bool {
        self.children
            .iter()
            .any(|c| c.try_borrow().is_ok_and(|c| c.has_error()))
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        for child in &self.children {
            if let Ok(mut child) = child.try_borrow_mut() {
                child.shutdown(ctx);
            }
        }
    }
}

/// Fills the whole view with one color.
#[derive(Clone, Copy, Debug)]
pub struct ClearNode {
    color: u32,
}

impl ClearNode {
    /// `color` is `0xAARRGGBB`.
    pub fn new(color: u32) -> Self {
        Self { color }
    }

    pub fn set_clear_color(&mut self, color: u32) {
        self.color = color;
    }

    pub fn clear_color(&self) -> u32 {
        self.color
    }
}

impl DisplayNode for ClearNode {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        dctx.apply_render_view(ctx, view);
        ctx.clear(self.color);
    }
}
