#![forbid(unsafe_code)]

mod foundation;

pub mod device;
pub mod effect;
pub mod nodes;
pub mod render;
pub mod settings;

pub use device::{GraphicsContext, SoftContext};
pub use effect::{CustomEffect, CustomEffectHost, EffectBackendKind, load_custom_effect};
pub use foundation::core::{
    Float2, Float4, Float4x4, Pixmap, PixmapFormat, Point, Rect, Vec2, pack_argb, unpack_argb,
};
pub use foundation::error::{ScanoutError, ScanoutResult};
pub use render::{CommandList, NodeContext, NodeContextOpts, RenderView};
pub use settings::DisplaySettings;
