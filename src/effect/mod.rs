//! User-authored multi-pass effects.
//!
//! An effect description lists pass programs and their settings; [`load_custom_effect`] turns one
//! into a [`CustomEffect`] running on either backend. Pass logic (ordering, caching, history
//! frames, variable propagation) is shared; backends only create and bind device objects.

mod binding;
mod frame_ref;
mod legacy;
mod modern;
mod pass;
mod pipeline;
mod props;
mod vars;

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::device::{Format, GraphicsContext, TextureHandle};
use crate::foundation::error::ScanoutResult;
use crate::nodes::SourceTexMapping;
use crate::render::{NodeContext, RenderView};

pub use frame_ref::{FrameRef, MAX_PREV_INDEX};
pub use pass::{PassProps, ScaleType};
pub use props::{EffectProps, PropKey};
pub use vars::EffectVariable;

use legacy::LegacyBackend;
use modern::ModernBackend;
use pipeline::EffectPipeline;

/// A size in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Per-pass state after a run, for statistics overlays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassInfo {
    pub index: u32,
    /// Output image size; zero before the pass first ran.
    pub output: Extent,
    /// Output texture format; `None` for a pass drawing straight to the display.
    pub format: Option<Format>,
    /// The pass reused its previous output on the last run.
    pub cached: bool,
    /// CPU time spent on the pass, when `shader_show_stats` is set.
    pub elapsed: Option<Duration>,
}

/// Which device path an effect is built for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectBackendKind {
    /// Passes recorded into a command list.
    #[default]
    Modern,
    /// Immediate draws with register-style constants.
    Legacy,
}

/// A loaded effect chain.
///
/// A frame is `pre_run`, `run`, optionally `run_final`, then `post_run`.
pub trait CustomEffect {
    /// The last pass scales to the display and must be drawn by [`run_final`](Self::run_final).
    fn contains_final_blit(&self) -> bool;

    /// Number of previous source frames the effect samples.
    fn max_prev_frames(&self) -> u32;

    /// Mark the source as changed since the last run.
    fn increment_frame(&mut self);

    fn pre_run(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext);

    /// Run every pass except a final blit. `sources[n]` is the source frame `n` frames back;
    /// `mapping` places the image in `sources[0]`.
    fn run(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        sources: &[Option<TextureHandle>],
        mapping: &SourceTexMapping,
        viewport: Extent,
    ) -> ScanoutResult<()>;

    /// Draw the final pass into `view`. A no-op without a final blit.
    fn run_final(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        view: &RenderView,
    ) -> ScanoutResult<()>;

    fn post_run(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext);

    /// Mapping of [`final_output`](Self::final_output) for a `src` image and `viewport`.
    fn compute_final_output_mapping(&self, src: Extent, viewport: Extent) -> SourceTexMapping;

    /// Output of the last pass; `None` with a final blit or before the first run.
    fn final_output(&self) -> Option<TextureHandle>;

    fn pass_infos(&self) -> Vec<PassInfo>;

    /// Release every device object that does not survive a device reset.
    fn on_pre_device_reset(&mut self, ctx: &mut dyn GraphicsContext);

    /// Recreate what [`on_pre_device_reset`](Self::on_pre_device_reset) released.
    fn on_post_device_reset(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
    ) -> ScanoutResult<()>;

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext);
}

/// Load the effect description at `path` for the `kind` backend.
#[tracing::instrument(skip_all, fields(path = %path.display(), ?kind))]
pub fn load_custom_effect(
    ctx: &mut dyn GraphicsContext,
    dctx: &mut NodeContext,
    path: &Path,
    kind: EffectBackendKind,
) -> ScanoutResult<Box<dyn CustomEffect>> {
    Ok(match kind {
        EffectBackendKind::Modern => {
            Box::new(EffectPipeline::load(ctx, dctx, path, ModernBackend::new())?)
        }
        EffectBackendKind::Legacy => {
            Box::new(EffectPipeline::load(ctx, dctx, path, LegacyBackend::new())?)
        }
    })
}

/// Owner of the installed effect.
#[derive(Default)]
pub struct CustomEffectHost {
    effect: Option<Box<dyn CustomEffect>>,
}

impl std::fmt::Debug for CustomEffectHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomEffectHost")
            .field("loaded", &self.effect.is_some())
            .finish()
    }
}

impl CustomEffectHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` and install it. The previous effect stays installed if loading fails.
    pub fn load(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        path: &Path,
        kind: EffectBackendKind,
    ) -> ScanoutResult<()> {
        match load_custom_effect(ctx, dctx, path, kind) {
            Ok(effect) => {
                if let Some(mut old) = self.effect.replace(effect) {
                    old.shutdown(ctx);
                }
                info!(path = %path.display(), "custom effect installed");
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "custom effect load failed");
                Err(e)
            }
        }
    }

    pub fn effect(&self) -> Option<&dyn CustomEffect> {
        self.effect.as_deref()
    }

    pub fn effect_mut(&mut self) -> Option<&mut (dyn CustomEffect + 'static)> {
        self.effect.as_deref_mut()
    }

    /// Take the installed effect out, e.g. to hand it to a node.
    pub fn take(&mut self) -> Option<Box<dyn CustomEffect>> {
        self.effect.take()
    }

    pub fn is_loaded(&self) -> bool {
        self.effect.is_some()
    }

    /// Unload the installed effect.
    pub fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        if let Some(mut effect) = self.effect.take() {
            effect.shutdown(ctx);
        }
    }
}
