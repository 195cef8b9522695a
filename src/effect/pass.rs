//! Per-pass settings shared by both backends.

use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::foundation::math::{ceil_pow2, round_to_int};
use crate::nodes::SourceTexMapping;

use super::Extent;
use super::props::{EffectProps, PropKey};

/// What a pass's output size is relative to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScaleType {
    /// The pass input's image size.
    #[default]
    Source,
    /// The final viewport.
    Viewport,
    /// The factor is the size in pixels.
    Absolute,
}

impl ScaleType {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "source" => Self::Source,
            "viewport" => Self::Viewport,
            "absolute" => Self::Absolute,
            _ => return None,
        })
    }

    fn apply(self, factor: f32, source: u32, viewport: u32) -> u32 {
        let size = match self {
            Self::Source => round_to_int(source as f32 * factor),
            Self::Viewport => round_to_int(viewport as f32 * factor),
            Self::Absolute => round_to_int(factor),
        };
        size.max(1) as u32
    }
}

/// Pass settings from the `<name><pass>` keys of an effect description.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassProps {
    pub index: u32,
    /// Any `scale_type*` key was given.
    pub has_scaling_factor: bool,
    pub scale_type_x: ScaleType,
    pub scale_type_y: ScaleType,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Frame counter wraps to 0 after this value.
    pub frame_count_limit: u32,
    pub srgb_framebuffer: bool,
    pub float_framebuffer: bool,
    pub halffloat_framebuffer: bool,
    /// Sample the pass input bilinearly.
    pub filter_input: bool,
}

impl PassProps {
    pub fn parse(props: &EffectProps, index: u32) -> ScanoutResult<Self> {
        let key = |name: &str| PropKey::indexed(name, index);
        let fail = |what: String| ScanoutError::validation(format!("pass {index}: {what}"));

        let mut types = [ScaleType::Source; 3];
        let mut found = [false; 3];
        for (i, name) in ["scale_type", "scale_type_x", "scale_type_y"].iter().enumerate() {
            if let Some(s) = props.get(&key(name)) {
                types[i] = ScaleType::parse(s)
                    .ok_or_else(|| fail(format!("invalid scale mode \"{s}\"")))?;
                found[i] = true;
            }
        }
        let (mut scale_type_x, mut scale_type_y) = if found[0] {
            (types[0], types[0])
        } else {
            (types[1], types[2])
        };
        let has_scaling_factor = found.iter().any(|&f| f);

        let mut scale_x = 1.0;
        let mut scale_y = 1.0;
        if has_scaling_factor {
            let mut factors = [1.0f32; 3];
            let mut found = [false; 3];
            for (i, name) in ["scale", "scale_x", "scale_y"].iter().enumerate() {
                let Some(s) = props.get(&key(name)) else {
                    continue;
                };
                if i == 0 && scale_type_x != scale_type_y {
                    return Err(fail(
                        "can't use a single scale factor with mixed scale types".to_owned(),
                    ));
                }
                factors[i] = s
                    .trim_start()
                    .parse::<f32>()
                    .ok()
                    .filter(|f| *f > 0.0 && *f < 16384.0)
                    .ok_or_else(|| fail(format!("invalid scale factor: {s}")))?;
                found[i] = true;
            }

            if !found.iter().any(|&f| f) {
                scale_type_x = ScaleType::Source;
                scale_type_y = ScaleType::Source;
            } else if found[0] {
                scale_x = factors[0];
                scale_y = factors[0];
            } else {
                if found[1] {
                    scale_x = factors[1];
                } else {
                    scale_type_x = ScaleType::Source;
                }
                if found[2] {
                    scale_y = factors[2];
                } else {
                    scale_type_y = ScaleType::Source;
                }
            }
        }

        let frame_count_limit = match props.get(&key("frame_count_mod")) {
            Some(s) => match s.trim_start().parse::<u32>() {
                Ok(m) if m > 0 => m - 1,
                _ => return Err(fail(format!("invalid frame_count_mod value: {s}"))),
            },
            None => u32::MAX,
        };

        let srgb_framebuffer = props.get_bool(&key("srgb_framebuffer"), false);
        let float_framebuffer = props.get_bool(&key("float_framebuffer"), false);
        if float_framebuffer && srgb_framebuffer {
            return Err(fail(
                "cannot request floating-point sRGB framebuffer".to_owned(),
            ));
        }
        let halffloat_framebuffer =
            float_framebuffer && props.get_bool(&key("halffloat_framebuffer"), false);

        Ok(Self {
            index,
            has_scaling_factor,
            scale_type_x,
            scale_type_y,
            scale_x,
            scale_y,
            frame_count_limit,
            srgb_framebuffer,
            float_framebuffer,
            halffloat_framebuffer,
            filter_input: props.get_bool(&key("filter_linear"), true),
        })
    }

    /// Output image size for an input of `source` pixels drawn for a `viewport`-sized display.
    pub fn render_size(&self, source: Extent, viewport: Extent) -> Extent {
        Extent::new(
            self.scale_type_x
                .apply(self.scale_x, source.width, viewport.width),
            self.scale_type_y
                .apply(self.scale_y, source.height, viewport.height),
        )
    }

    /// Texture size holding a `render` image; rounded up to powers of two without
    /// `non_pow2` support.
    pub fn texture_size(render: Extent, non_pow2: bool) -> Extent {
        if non_pow2 {
            render
        } else {
            Extent::new(ceil_pow2(render.width), ceil_pow2(render.height))
        }
    }

    /// Mapping of this pass's output as a texture source.
    pub fn output_mapping(&self, source: Extent, viewport: Extent, non_pow2: bool) -> SourceTexMapping {
        let render = self.render_size(source, viewport);
        let tex = Self::texture_size(render, non_pow2);
        SourceTexMapping::new(render.width, render.height, tex.width, tex.height)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/effect/pass.rs"]
mod tests;
