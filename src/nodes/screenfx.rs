use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DisplayNode, SourceNodeRef, SourceTexMapping, clipped_view, draw_source, upload_pixmap};
use crate::device::{
    BuiltinProgram, DeviceObject, Format, GraphicsContext, TextureDesc, TextureHandle,
};
use crate::foundation::core::{Float2, Pixmap, PixmapFormat, Rect};
use crate::foundation::error::{ScanoutError, ScanoutResult};
use crate::render::{CommandList, NodeContext, PoolTextureIndex, RenderView, Vertex3T, VertexKind};

/// Cells per side of the image-space grid drawn when distortion is on.
const DISTORTION_GRID: u16 = 16;

/// Phosphor mask pattern overlaid on the image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenMaskType {
    #[default]
    None,
    /// Vertical RGB stripes.
    ApertureGrille,
    /// Stripes broken into staggered slots.
    SlotMask,
    /// Staggered RGB dots.
    TriadDot,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenMaskParams {
    pub mask_type: ScreenMaskType,
    /// Source pixels covered by one triad horizontally.
    pub source_pixels_per_dot: f32,
    /// Fraction of each phosphor that passes light, `0..=1`.
    pub openness: f32,
}

impl Default for ScreenMaskParams {
    fn default() -> Self {
        Self {
            mask_type: ScreenMaskType::None,
            source_pixels_per_dot: 1.0,
            openness: 0.75,
        }
    }
}

/// Parameters of a [`ScreenFxNode`]. Every field can be left at its default.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenFxParams {
    /// Where the image lands in the view, in pixels.
    pub dest_area: Rect,
    /// Pixels of the view the pass may touch; `None` allows the whole view.
    pub clip_area: Option<Rect>,
    /// Bilinear source sampling.
    pub linear: bool,
    /// Sharpened bilinear sampling per axis; 0 disables it.
    pub sharpness: Float2,
    /// Gamma adjustment; 1 is neutral.
    pub gamma: f32,
    /// Display gamma for input conversion; 0 selects sRGB.
    pub output_gamma: f32,
    /// The frame is rendered in linear light.
    pub render_linear: bool,
    /// Source channels are stored as `(v + 1) / 2`.
    pub signed_input: bool,
    /// Output scale for HDR targets; 0 disables it.
    pub hdr_scale: f32,
    /// Horizontal view angle of the simulated tube, in degrees; 0 is a flat screen.
    pub distortion_x: f32,
    /// Vertical curvature relative to horizontal.
    pub distortion_y_ratio: f32,
    /// Brightness between scanlines; `None` disables scanlines.
    pub scanline_intensity: Option<f32>,
    /// Rows of a 3x3 color correction applied to RGB.
    pub color_correction: Option<[[f32; 3]; 3]>,
    pub screen_mask: ScreenMaskParams,
}

impl Default for ScreenFxParams {
    fn default() -> Self {
        Self {
            dest_area: Rect::ZERO,
            clip_area: None,
            linear: true,
            sharpness: Float2::ZERO,
            gamma: 1.0,
            output_gamma: 0.0,
            render_linear: false,
            signed_input: false,
            hdr_scale: 0.0,
            distortion_x: 0.0,
            distortion_y_ratio: 0.0,
            scanline_intensity: None,
            color_correction: None,
            screen_mask: ScreenMaskParams::default(),
        }
    }
}

impl ScreenFxParams {
    fn uses_gamma_ramp(&self) -> bool {
        self.gamma != 1.0 || self.render_linear
    }

    fn distorted(&self) -> bool {
        self.distortion_x > 0.0
    }
}

/// Builds the static textures a [`ScreenFxNode`] combines with its source.
pub trait ScreenFxTextureBuilder {
    /// 256 output levels indexed by input level.
    fn gamma_ramp(&self, input_conversion: bool, output_gamma: f32, gamma: f32) -> [u8; 256];

    /// One mask value per destination row for a `src_height` image shown `dst_height` tall.
    fn scanline_mask(
        &self,
        src_height: u32,
        dst_height: u32,
        intensity: f32,
        render_linear: bool,
    ) -> Vec<u8>;

    /// `dst_width x dst_height` mask for a `src_width` wide image.
    fn screen_mask(
        &self,
        params: &ScreenMaskParams,
        src_width: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Pixmap;
}

/// Straightforward implementations of the screen FX textures.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicScreenFxTextures;

impl ScreenFxTextureBuilder for BasicScreenFxTextures {
    fn gamma_ramp(&self, input_conversion: bool, output_gamma: f32, gamma: f32) -> [u8; 256] {
        let mut exponent = 1.0 / gamma.max(1e-3);
        let mut srgb = false;
        if input_conversion {
            if output_gamma > 0.0 {
                exponent /= output_gamma;
            } else {
                srgb = true;
            }
        }

        let mut ramp = [0u8; 256];
        for (i, out) in ramp.iter_mut().enumerate() {
            let mut x = i as f32 / 255.0;
            if srgb {
                x = if x < 0.003_130_8 {
                    x * 12.92
                } else {
                    1.055 * x.powf(1.0 / 2.4) - 0.055
                };
            }
            *out = (x.powf(exponent) * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
        }
        ramp
    }

    fn scanline_mask(
        &self,
        src_height: u32,
        dst_height: u32,
        intensity: f32,
        render_linear: bool,
    ) -> Vec<u8> {
        let step = src_height as f32 / dst_height.max(1) as f32;
        let floor = intensity.clamp(0.0, 1.0).powf(2.2);
        let mut v = 0.25 + step * 0.5;
        (0..dst_height)
            .map(|_| {
                // Below two rows per scanline only the average survives.
                let raw = if step <= 0.5 {
                    0.5 - 0.5 * ((v - v.floor()) * std::f32::consts::TAU).cos()
                } else {
                    0.5
                };
                v += step;
                let mut y = raw * (1.0 - floor) + floor;
                if !render_linear {
                    y = y.powf(1.0 / 2.2);
                }
                (y * 255.0 + 0.5) as u8
            })
            .collect()
    }

    fn screen_mask(
        &self,
        params: &ScreenMaskParams,
        src_width: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Pixmap {
        let triad = (dst_width as f32 / src_width.max(1) as f32 * params.source_pixels_per_dot)
            .max(1.0);
        let open = params.openness.clamp(0.0, 1.0) / 6.0;
        let channel = |phase: f32, k: usize| {
            let center = (k as f32 + 0.5) / 3.0;
            u32::from((phase - center).abs() <= open)
        };

        let mut pixels = Vec::with_capacity(dst_width as usize * dst_height as usize);
        for y in 0..dst_height {
            for x in 0..dst_width {
                let px = (x as f32 + 0.5) / triad;
                let py = (y as f32 + 0.5) / triad;
                let (phase, lit) = match params.mask_type {
                    ScreenMaskType::None => {
                        pixels.push(0x00FF_FFFF);
                        continue;
                    }
                    ScreenMaskType::ApertureGrille => (px.fract(), true),
                    ScreenMaskType::SlotMask => {
                        let stagger = if px.floor() as i64 % 2 == 0 { 0.0 } else { 0.5 };
                        (px.fract(), (py + stagger).fract() < 0.85)
                    }
                    ScreenMaskType::TriadDot => {
                        let stagger = if py.floor() as i64 % 2 == 0 { 0.0 } else { 0.5 };
                        ((px + stagger).fract(), true)
                    }
                };
                let rgb = if lit {
                    (channel(phase, 0) * 0xff) << 16
                        | (channel(phase, 1) * 0xff) << 8
                        | channel(phase, 2) * 0xff
                } else {
                    0
                };
                pixels.push(rgb);
            }
        }
        Pixmap {
            width: dst_width,
            height: dst_height,
            format: PixmapFormat::Xrgb8888,
            pitch: dst_width as usize * 4,
            data: bytemuck::cast_slice(&pixels).to_vec(),
            palette: None,
        }
    }
}

/// Maps between normalized image and screen coordinates of a curved tube.
///
/// The screen is the front of an ellipsoid sized so the mapped image stays inscribed in the
/// destination; an axis without curvature degenerates to a cylinder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistortionMapper {
    scale: Float2,
    sq_radius: f32,
}

impl DistortionMapper {
    /// `view_angle_x` in degrees; `view_ratio_y` scales the vertical curvature; `aspect` is the
    /// destination width over height.
    pub fn new(view_angle_x: f32, view_ratio_y: f32, aspect: f32) -> Self {
        let inv_radius_x = (view_angle_x.to_radians() * 0.5).sin();
        let inv_radius_y = inv_radius_x * view_ratio_y / aspect.max(1e-6);
        let max_inv = inv_radius_x.min(inv_radius_y);
        let inv_image_scale = 2.0 / (1.0 - max_inv * max_inv).max(1e-6).sqrt();
        Self {
            scale: Float2::new(inv_radius_x * inv_image_scale, inv_radius_y * inv_image_scale),
            sq_radius: inv_image_scale * inv_image_scale / 4.0,
        }
    }

    /// Image point to screen point. The flag is false when `pt` was outside the image and got
    /// clamped.
    pub fn map_image_to_screen(&self, pt: Float2) -> (Float2, bool) {
        let clamped = Float2::new(pt.x.clamp(0.0, 1.0), pt.y.clamp(0.0, 1.0));
        let half = Float2::new(0.5, 0.5);
        let v = clamped - half;
        let v2 = v * self.scale;
        let out = v * (self.sq_radius / (1.0 + v2.dot(v2))).sqrt() + half;
        (out, clamped == pt)
    }

    /// Screen point to image point. The flag is false when the point falls outside the image;
    /// the result is then clipped to the image border.
    pub fn map_screen_to_image(&self, pt: Float2) -> (Float2, bool) {
        let half = Float2::new(0.5, 0.5);
        let mut v = pt - half;
        let v2 = v * self.scale;
        let d = (self.sq_radius - v2.dot(v2)).max(1e-5);
        v = v * (1.0 / d.sqrt());

        let dmax = v.x.abs().max(v.y.abs());
        let valid = dmax <= 0.5;
        if !valid {
            v = v * (1.0 / (2.0 * dmax));
        }
        (v + half, valid)
    }
}

fn screen_vertex(screen: Float2, image: Float2, mapping: &SourceTexMapping) -> Vertex3T {
    let uv0 = mapping.uv_offset + image * mapping.uv_size;
    Vertex3T {
        x: screen.x * 2.0 - 1.0,
        y: 1.0 - screen.y * 2.0,
        z: 0.0,
        u0: uv0.x,
        v0: uv0.y,
        u1: image.x,
        v1: image.y,
        u2: screen.x,
        v2: screen.y,
    }
}

fn flat_mesh(mapping: &SourceTexMapping) -> (Vec<Vertex3T>, Vec<u16>) {
    let corners = [
        Float2::new(0.0, 0.0),
        Float2::new(1.0, 0.0),
        Float2::new(0.0, 1.0),
        Float2::new(1.0, 1.0),
    ];
    let vertices = corners
        .iter()
        .map(|&p| screen_vertex(p, p, mapping))
        .collect();
    (vertices, vec![0, 1, 2, 2, 1, 3])
}

fn distorted_mesh(mapper: &DistortionMapper, mapping: &SourceTexMapping) -> (Vec<Vertex3T>, Vec<u16>) {
    let n = DISTORTION_GRID;
    let row = n + 1;
    let mut vertices = Vec::with_capacity(usize::from(row) * usize::from(row));
    for j in 0..=n {
        for i in 0..=n {
            let image = Float2::new(f32::from(i) / f32::from(n), f32::from(j) / f32::from(n));
            let (screen, _) = mapper.map_image_to_screen(image);
            vertices.push(screen_vertex(screen, image, mapping));
        }
    }
    let mut indices = Vec::with_capacity(usize::from(n) * usize::from(n) * 6);
    for j in 0..n {
        for i in 0..n {
            let tl = j * row + i;
            let (tr, bl) = (tl + 1, tl + row);
            indices.extend_from_slice(&[tl, tr, bl, bl, tr, bl + 1]);
        }
    }
    (vertices, indices)
}

/// CRT simulation in a single pass: color correction, gamma, scanlines, phosphor mask and
/// screen curvature over a source image.
pub struct ScreenFxNode {
    source: SourceNodeRef,
    params: ScreenFxParams,
    list: CommandList,
    texture: PoolTextureIndex,
    owned: Vec<TextureHandle>,
    source_failed: bool,
}

impl ScreenFxNode {
    pub fn init(
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        source: SourceNodeRef,
        params: ScreenFxParams,
        textures: &dyn ScreenFxTextureBuilder,
    ) -> ScanoutResult<Self> {
        let mapping = source
            .try_borrow()
            .map(|s| s.texture_mapping())
            .map_err(|_| ScanoutError::validation("screen fx source is in use"))?;
        let dst_w = params.dest_area.width().round() as u32;
        let dst_h = params.dest_area.height().round() as u32;
        if dst_w == 0 || dst_h == 0 {
            return Err(ScanoutError::validation("screen fx destination is empty"));
        }

        let mut node = Self {
            source,
            params,
            list: CommandList::new(),
            texture: PoolTextureIndex::default(),
            owned: Vec::new(),
            source_failed: false,
        };
        if let Err(e) = node.record(ctx, dctx, &mapping, dst_w, dst_h, textures) {
            node.shutdown(ctx);
            return Err(e);
        }
        debug!(
            width = dst_w,
            height = dst_h,
            distorted = params.distorted(),
            "screen fx recorded"
        );
        Ok(node)
    }

    fn create_texture(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        desc: TextureDesc,
    ) -> ScanoutResult<TextureHandle> {
        let tex = ctx.create_texture(&desc)?;
        self.owned.push(tex);
        Ok(tex)
    }

    fn record(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        mapping: &SourceTexMapping,
        dst_w: u32,
        dst_h: u32,
        builder: &dyn ScreenFxTextureBuilder,
    ) -> ScanoutResult<()> {
        let p = self.params;

        let gamma = if p.uses_gamma_ramp() {
            let ramp = builder.gamma_ramp(p.render_linear, p.output_gamma, p.gamma);
            let tex = self.create_texture(ctx, TextureDesc::shader(256, 1, Format::R8Unorm))?;
            ctx.write_texture(tex, 0, &ramp, 256)?;
            Some(tex)
        } else {
            None
        };

        let scanlines = match p.scanline_intensity {
            Some(intensity) => {
                let src_h = mapping.texel_size.y.round() as u32;
                let mask = builder.scanline_mask(src_h, dst_h, intensity, p.render_linear);
                let tex = self.create_texture(ctx, TextureDesc::shader(1, dst_h, Format::R8Unorm))?;
                ctx.write_texture(tex, 0, &mask, 1)?;
                Some(tex)
            }
            None => None,
        };

        let mask = match p.screen_mask.mask_type {
            ScreenMaskType::None => None,
            _ => {
                let src_w = mapping.texel_size.x.round() as u32;
                let px = builder.screen_mask(&p.screen_mask, src_w, dst_w, dst_h);
                let tex =
                    self.create_texture(ctx, TextureDesc::shader(dst_w, dst_h, Format::Bgra8Unorm))?;
                upload_pixmap(ctx, tex, &px)?;
                Some(tex)
            }
        };

        let (vertices, indices) = if p.distorted() {
            let mapper = DistortionMapper::new(
                p.distortion_x,
                p.distortion_y_ratio,
                dst_w as f32 / dst_h as f32,
            );
            distorted_mesh(&mapper, mapping)
        } else {
            flat_mesh(mapping)
        };

        let mut constants = [0.0f32; 20];
        if let Some(m) = p.color_correction {
            for (r, row) in m.iter().enumerate() {
                constants[r * 4..r * 4 + 3].copy_from_slice(row);
            }
            constants[15] = 1.0;
        }
        constants[12] = 1.0;
        constants[13] = p.hdr_scale;
        constants[14] = if p.signed_input { 1.0 } else { 0.0 };
        if p.linear && (p.sharpness.x > 0.0 || p.sharpness.y > 0.0) {
            constants[16] = p.sharpness.x.max(1.0);
            constants[17] = p.sharpness.y.max(1.0);
            constants[18] = mapping.tex_width as f32;
            constants[19] = mapping.tex_height as f32;
        }

        let source_sampler = if p.linear {
            dctx.bilinear_sampler()
        } else {
            dctx.point_sampler()
        };
        let samplers = [
            source_sampler,
            dctx.bilinear_sampler(),
            dctx.bilinear_sampler(),
            dctx.point_sampler(),
        ];
        let bytes = ctx.builtin_program(BuiltinProgram::FragmentScreenFx);

        self.texture = self.list.register_texture(None);
        let slots = [
            self.texture,
            self.list.register_texture(gamma),
            self.list.register_texture(scanlines),
            self.list.register_texture(mask),
        ];
        self.list
            .add_mesh(ctx, dctx)
            .set_vertex_kind(VertexKind::Tex3)
            .set_fragment_program_bytecode(bytes)
            .set_fp_constants(&constants, 0)
            .set_textures(&slots)
            .set_samplers(&samplers)
            .set_transformed_vertices(&vertices)
            .set_indices(&indices);

        if self.list.has_error() {
            return Err(ScanoutError::device("screen fx recording failed"));
        }
        Ok(())
    }

    pub fn params(&self) -> &ScreenFxParams {
        &self.params
    }

    /// Re-record with new parameters. The node is unchanged if that fails.
    pub fn set_params(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        dctx: &mut NodeContext,
        params: ScreenFxParams,
        textures: &dyn ScreenFxTextureBuilder,
    ) -> ScanoutResult<()> {
        let fresh = Self::init(ctx, dctx, self.source.clone(), params, textures)?;
        self.shutdown(ctx);
        *self = fresh;
        Ok(())
    }
}

impl DisplayNode for ScreenFxNode {
    fn name(&self) -> &'static str {
        "screenfx"
    }

    fn draw(&mut self, ctx: &mut dyn GraphicsContext, dctx: &mut NodeContext, view: &RenderView) {
        let texture = draw_source(&self.source, ctx, dctx);
        self.source_failed = texture.is_none();
        if self.source_failed {
            return;
        }
        self.list.set_texture(self.texture, texture);
        let out = clipped_view(view, self.params.dest_area, self.params.clip_area);
        dctx.apply_render_view(ctx, &out);
        self.list.execute_all(ctx, dctx);
        dctx.apply_render_view(ctx, view);
    }

    fn has_error(&self) -> bool {
        self.source_failed || self.list.has_error()
    }

    fn shutdown(&mut self, ctx: &mut dyn GraphicsContext) {
        self.list.shutdown(ctx);
        for tex in self.owned.drain(..) {
            ctx.destroy(DeviceObject::Texture(tex));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/nodes/screenfx.rs"]
mod tests;
