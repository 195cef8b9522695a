use crate::device::{SurfaceRef, Viewport};
use crate::foundation::core::{Float2, Rect};

/// Normalized sub-rectangle overlaid on a physical viewport.
///
/// Clip-space positions are mapped through `p * size + offset` before rasterization, so a node can
/// draw into a logically smaller or shifted region without touching the surface or the device
/// viewport.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SoftViewport {
    /// Scale applied to clip-space x/y.
    pub size: Float2,
    /// Offset added after scaling.
    pub offset: Float2,
}

impl Default for SoftViewport {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SoftViewport {
    /// The full viewport.
    pub const IDENTITY: Self = Self {
        size: Float2::ONE,
        offset: Float2::ZERO,
    };

    /// Degenerate viewport that never equals a live one; used to force a first transform.
    pub(crate) const NONE: Self = Self {
        size: Float2::ZERO,
        offset: Float2::ZERO,
    };

    /// Map a clip-space position.
    pub fn transform(&self, p: Float2) -> Float2 {
        p * self.size + self.offset
    }

    /// Restrict to the pixel rectangle `area` of a `width x height` viewport, composed with `self`.
    pub fn with_subrect(&self, width: u32, height: u32, area: Rect) -> Self {
        let vw = width.max(1) as f32;
        let vh = height.max(1) as f32;
        let x = area.x0 as f32;
        let y = area.y0 as f32;
        let w = area.width() as f32;
        let h = area.height() as f32;

        let inner = Self {
            size: Float2::new(w / vw, h / vh),
            offset: Float2::new((2.0 * x + w) / vw - 1.0, 1.0 - (2.0 * y + h) / vh),
        };

        Self {
            size: inner.size * self.size,
            offset: inner.offset * self.size + self.offset,
        }
    }
}

/// Logical render target: surface, viewport and soft viewport.
///
/// A `target` of `None` is the device's default (presentation) target.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderView {
    /// Surface to draw into.
    pub target: Option<SurfaceRef>,
    /// Draw without implicit sRGB conversion.
    pub bypass_srgb: bool,
    /// Device viewport.
    pub viewport: Viewport,
    /// Logical sub-rectangle of `viewport`.
    pub soft_viewport: SoftViewport,
}

impl RenderView {
    /// View over all of `target`, which is `width x height`.
    pub fn new(target: Option<SurfaceRef>, width: u32, height: u32) -> Self {
        Self {
            target,
            bypass_srgb: false,
            viewport: Viewport::new(width, height),
            soft_viewport: SoftViewport::IDENTITY,
        }
    }

    /// The same view restricted to the pixel rectangle `area` of its viewport.
    pub fn with_subrect(&self, area: Rect) -> Self {
        Self {
            soft_viewport: self.soft_viewport.with_subrect(
                self.viewport.width,
                self.viewport.height,
                area,
            ),
            ..*self
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/view.rs"]
mod tests;
