use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use super::{DisplayNode, QueuedSourceNodeRef, SourceNode, SourceTexMapping, clipped_view, full_area};
use crate::device::{GraphicsContext, TextureHandle};
use crate::effect::{CustomEffect, Extent};
use crate::foundation::core::Rect;
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{NodeContext, RenderView};

/// Drives a [`CustomEffect`] from a queued source.
///
/// Shared by the node that presents the effect and the source that exposes its output.
pub struct CustomEffectPipelineNode {
    effect: Box<dyn CustomEffect>,
    source: QueuedSourceNodeRef,
    viewport: Extent,
    inputs: Vec<Option<TextureHandle>>,
    error: bool,
}

pub type CustomEffectPipelineRef = Rc<RefCell<CustomEffectPipelineNode>>;

impl CustomEffectPipelineNode {
    /// Sizes the source's queue to the history the effect samples.
    pub fn init(
        ctx: &mut dyn GraphicsContext,
        effect: Box<dyn CustomEffect>,
        source: QueuedSourceNodeRef,
        viewport: Extent,
    ) -> ScanoutResult<Self> {
        let frames = effect.max_prev_frames() + 1;
        source
            .try_borrow_mut()
            .map_err(|_| ScanoutError::validation("custom effect source is in use"))?
            .set_queue_length(ctx, frames)?;
        Ok(Self {
            effect,
            source,
            viewport,
            inputs: Vec::with_capacity(frames as usize),
            error: false,
        })
    }

    pub fn effect(&self) -> &dyn CustomEffect {
        self.effect.as_ref()
    }

    pub fn viewport(&self) -> Extent {
        self.viewport
    }

    /// Move the source to a new frame. Call before the frame's image is loaded.
    pub fn advance_queue(&mut self) {
        let Ok(mut source) = self.source.try_borrow_mut() else {
            warn!("custom effect source is in use; queue not advanced");
            return;
        };
        source.advance_queue();
        self.effect.increment_frame();
    }

    pub fn pre_run(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext) {
        self.effect.pre_run(ctx, dctx);
    }

    /// Pull the source frames and run every pass but a final blit.
    pub fn run(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext) {
        self.error = false;
        let Ok(mut source) = self.source.try_borrow_mut() else {
            warn!("custom effect source is already being drawn");
            self.error = true;
            return;
        };
        let current = source.draw(ctx, dctx);
        if current.is_none() {
            warn!("custom effect source produced no texture");
            self.error = true;
            return;
        }
        if source.content_changed() {
            self.effect.increment_frame();
        }

        self.inputs.clear();
        self.inputs.push(current);
        self.inputs
            .extend((1..=self.effect.max_prev_frames()).map(|past| source.result_texture(past)));
        let mapping = source.texture_mapping();
        drop(source);

        if self
            .effect
            .run(ctx, dctx, &self.inputs, &mapping, self.viewport)
            .is_err()
        {
            self.error = true;
        }
    }

    pub fn run_final(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        if self.error {
            return;
        }
        if self.effect.run_final(ctx, dctx, view).is_err() {
            self.error = true;
        }
    }

    pub fn post_run(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext) {
        self.effect.post_run(ctx, dctx);
    }

    /// Mapping of [`final_texture`](Self::final_texture).
    pub fn final_result_mapping(&self) -> SourceTexMapping {
        let src = self
            .source
            .try_borrow()
            .map(|s| s.texture_mapping())
            .unwrap_or_else(|_| SourceTexMapping::new(1, 1, 1, 1));
        let image = Extent::new(
            src.texel_size.x.round() as u32,
            src.texel_size.y.round() as u32,
        );
        self.effect.compute_final_output_mapping(image, self.viewport)
    }

    pub fn final_texture(&self) -> Option<TextureHandle> {
        if self.error {
            return None;
        }
        self.effect.final_output()
    }

    pub fn has_error(&self) -> bool {
        self.error || self.source.try_borrow().is_ok_and(|s| s.has_error())
    }

    pub fn on_pre_device_reset(&mut self, ctx: &mut dyn GraphicsContext) {
        self.effect.on_pre_device_reset(ctx);
    }

    pub fn on_post_device_reset(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
    ) -> ScanoutResult<()> {
        self.effect.on_post_device_reset(ctx, dctx)
    }

    /// Release the effect. The source is left to its owner.
    pub fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.effect.shutdown(ctx);
    }
}

fn borrow_pipeline(
    pipeline: &CustomEffectPipelineRef,
) -> Option<std::cell::RefMut<'_, CustomEffectPipelineNode>> {
    let borrowed = pipeline.try_borrow_mut().ok();
    if borrowed.is_none() {
        warn!("custom effect pipeline is already running");
    }
    borrowed
}

/// Exposes the output of an effect without a final blit as a source.
pub struct CustomEffectSourceNode {
    pipeline: CustomEffectPipelineRef,
    mapping: SourceTexMapping,
}

impl CustomEffectSourceNode {
    pub fn init(pipeline: CustomEffectPipelineRef) -> ScanoutResult<Self> {
        let mapping = {
            let p = pipeline
                .try_borrow()
                .map_err(|_| ScanoutError::validation("custom effect pipeline is in use"))?;
            if p.effect().contains_final_blit() {
                return Err(ScanoutError::validation(
                    "custom effect ends in a display-scaled pass and has no texture output",
                ));
            }
            p.final_result_mapping()
        };
        Ok(Self { pipeline, mapping })
    }
}

impl SourceNode for CustomEffectSourceNode {
    fn texture_mapping(&self) -> SourceTexMapping {
        self.mapping
    }

    fn draw(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
    ) -> Option<TextureHandle> {
        let mut p = borrow_pipeline(&self.pipeline)?;
        p.pre_run(ctx, dctx);
        p.run(ctx, dctx);
        p.post_run(ctx, dctx);
        p.final_texture()
    }

    fn has_error(&self) -> bool {
        self.pipeline.try_borrow().is_ok_and(|p| p.has_error())
    }
}

/// Presents an effect, drawing its final pass into a rectangle of the view.
pub struct CustomEffectNode {
    pipeline: CustomEffectPipelineRef,
    dest: Option<Rect>,
    clip: Option<Rect>,
}

impl CustomEffectNode {
    /// Draws into `dest` of the view, or all of it. The effect must end in a final blit.
    pub fn init(pipeline: CustomEffectPipelineRef, dest: Option<Rect>) -> ScanoutResult<Self> {
        {
            let p = pipeline
                .try_borrow()
                .map_err(|_| ScanoutError::validation("custom effect pipeline is in use"))?;
            if !p.effect().contains_final_blit() {
                return Err(ScanoutError::validation(
                    "custom effect has no display-scaled last pass to present",
                ));
            }
        }
        Ok(Self {
            pipeline,
            dest,
            clip: None,
        })
    }

    /// Touch only the `clip` pixels of the view.
    pub fn set_clip(&mut self, clip: Option<Rect>) {
        self.clip = clip;
    }
}

impl DisplayNode for CustomEffectNode {
    fn name(&self) -> &'static str {
        "custom effect"
    }

    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        let Some(mut p) = borrow_pipeline(&self.pipeline) else {
            return;
        };
        let dest = self.dest.unwrap_or_else(|| full_area(view));
        p.pre_run(ctx, dctx);
        p.run(ctx, dctx);
        p.run_final(ctx, dctx, &clipped_view(view, dest, self.clip));
        p.post_run(ctx, dctx);
    }

    fn has_error(&self) -> bool {
        self.pipeline.try_borrow().is_ok_and(|p| p.has_error())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/nodes/custom_effect.rs"]
mod tests;
