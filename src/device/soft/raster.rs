use super::program::Kernel;
use crate::device::{AddressMode, BlendMode, Filter, Format, SamplerDesc, TextureDesc};

pub(crate) type Texel = [f32; 4];

pub(crate) struct SoftTexture {
    pub(crate) desc: TextureDesc,
    pub(crate) levels: Vec<Vec<Texel>>,
}

impl SoftTexture {
    pub(crate) fn new(desc: TextureDesc) -> Self {
        let mut levels = Vec::with_capacity(desc.mip_levels as usize);
        for mip in 0..desc.mip_levels {
            let (w, h) = level_size(&desc, mip);
            levels.push(vec![[0.0; 4]; (w * h) as usize]);
        }
        Self { desc, levels }
    }

    pub(crate) fn size(&self, mip: u32) -> (u32, u32) {
        level_size(&self.desc, mip)
    }

    fn fetch(&self, x: i64, y: i64, sampler: &SamplerDesc) -> Texel {
        let (w, h) = self.size(0);
        let (Some(x), Some(y)) = (
            address(x, w, sampler.address_u),
            address(y, h, sampler.address_v),
        ) else {
            return [0.0; 4];
        };
        self.levels[0][(y * w + x) as usize]
    }

    pub(crate) fn sample(&self, sampler: &SamplerDesc, u: f32, v: f32) -> Texel {
        let (w, h) = self.size(0);
        let fx = u * w as f32;
        let fy = v * h as f32;

        match sampler.filter {
            Filter::Point => self.fetch(fx.floor() as i64, fy.floor() as i64, sampler),
            Filter::Bilinear | Filter::Trilinear => {
                let tx = fx - 0.5;
                let ty = fy - 0.5;
                let x0 = tx.floor();
                let y0 = ty.floor();
                let ax = tx - x0;
                let ay = ty - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let t00 = self.fetch(x0, y0, sampler);
                let t10 = self.fetch(x0 + 1, y0, sampler);
                let t01 = self.fetch(x0, y0 + 1, sampler);
                let t11 = self.fetch(x0 + 1, y0 + 1, sampler);
                let mut out = [0.0; 4];
                for c in 0..4 {
                    let top = t00[c] + (t10[c] - t00[c]) * ax;
                    let bottom = t01[c] + (t11[c] - t01[c]) * ax;
                    out[c] = top + (bottom - top) * ay;
                }
                out
            }
        }
    }

    pub(crate) fn store(&mut self, mip: u32, x: u32, y: u32, value: Texel, blend: BlendMode) {
        let (w, _) = self.size(mip);
        let clamp = !self.desc.format.is_float();
        let dst = &mut self.levels[mip as usize][(y * w + x) as usize];
        let mut out = match blend {
            BlendMode::Replace => value,
            BlendMode::PremultipliedAlpha => {
                let inv = 1.0 - value[3];
                [
                    value[0] + dst[0] * inv,
                    value[1] + dst[1] * inv,
                    value[2] + dst[2] * inv,
                    value[3] + dst[3] * inv,
                ]
            }
            BlendMode::Additive => [
                value[0] + dst[0],
                value[1] + dst[1],
                value[2] + dst[2],
                value[3] + dst[3],
            ],
        };
        if clamp {
            for c in &mut out {
                *c = c.clamp(0.0, 1.0);
            }
        }
        if self.desc.format == Format::R8Unorm {
            out[1] = 0.0;
            out[2] = 0.0;
            out[3] = 1.0;
        }
        *dst = out;
    }
}

fn level_size(desc: &TextureDesc, mip: u32) -> (u32, u32) {
    ((desc.width >> mip).max(1), (desc.height >> mip).max(1))
}

fn address(i: i64, size: u32, mode: AddressMode) -> Option<u32> {
    let n = i64::from(size);
    match mode {
        AddressMode::Clamp => Some(i.clamp(0, n - 1) as u32),
        AddressMode::Wrap => Some(i.rem_euclid(n) as u32),
        AddressMode::Border => (0..n).contains(&i).then_some(i as u32),
    }
}

/// Decode upload bytes in `format` into texels.
pub(crate) fn decode_row(format: Format, src: &[u8], dst: &mut [Texel]) -> bool {
    let n = |b: u8| f32::from(b) / 255.0;
    match format {
        Format::R8Unorm => {
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = [n(s), 0.0, 0.0, 1.0];
            }
        }
        Format::Rgba8Unorm | Format::Rgba8UnormSrgb => {
            for (d, s) in dst.iter_mut().zip(src.chunks_exact(4)) {
                *d = [n(s[0]), n(s[1]), n(s[2]), n(s[3])];
            }
        }
        Format::Bgra8Unorm | Format::Bgra8UnormSrgb => {
            for (d, s) in dst.iter_mut().zip(src.chunks_exact(4)) {
                *d = [n(s[2]), n(s[1]), n(s[0]), n(s[3])];
            }
        }
        Format::Rgba32Float => {
            for (d, s) in dst.iter_mut().zip(src.chunks_exact(16)) {
                for (c, b) in d.iter_mut().zip(s.chunks_exact(4)) {
                    *c = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                }
            }
        }
        Format::Rgba16Float => return false,
    }
    true
}

/// Screen-space vertex after the viewport transform.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RasterVertex {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) uv: [[f32; 2]; 3],
}

fn edge(ax: f32, ay: f32, bx: f32, by: f32, px: f32, py: f32) -> f32 {
    (bx - ax) * (py - ay) - (by - ay) * (px - ax)
}

// Ties on an edge go to exactly one of the two triangles sharing it.
fn owns_edge(ax: f32, ay: f32, bx: f32, by: f32) -> bool {
    let dx = bx - ax;
    let dy = by - ay;
    dy > 0.0 || (dy == 0.0 && dx < 0.0)
}

/// Visit every pixel center covered by the triangle inside `clip` (x0, y0, x1, y1; exclusive
/// max), passing interpolated texture coordinates.
pub(crate) fn raster_triangle(
    tri: [RasterVertex; 3],
    clip: (i64, i64, i64, i64),
    mut shade: impl FnMut(u32, u32, [[f32; 2]; 3]),
) {
    let [mut a, mut b, c] = tri;
    let mut area = edge(a.x, a.y, b.x, b.y, c.x, c.y);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut a, &mut b);
        area = -area;
    }

    let min_x = (a.x.min(b.x).min(c.x).floor() as i64).max(clip.0);
    let min_y = (a.y.min(b.y).min(c.y).floor() as i64).max(clip.1);
    let max_x = (a.x.max(b.x).max(c.x).ceil() as i64).min(clip.2);
    let max_y = (a.y.max(b.y).max(c.y).ceil() as i64).min(clip.3);

    let own_bc = owns_edge(b.x, b.y, c.x, c.y);
    let own_ca = owns_edge(c.x, c.y, a.x, a.y);
    let own_ab = owns_edge(a.x, a.y, b.x, b.y);

    for py in min_y..max_y {
        for px in min_x..max_x {
            let fx = px as f32 + 0.5;
            let fy = py as f32 + 0.5;
            let w0 = edge(b.x, b.y, c.x, c.y, fx, fy);
            let w1 = edge(c.x, c.y, a.x, a.y, fx, fy);
            let w2 = edge(a.x, a.y, b.x, b.y, fx, fy);
            let inside = |w: f32, owned: bool| w > 0.0 || (w == 0.0 && owned);
            if !(inside(w0, own_bc) && inside(w1, own_ca) && inside(w2, own_ab)) {
                continue;
            }

            let (b0, b1, b2) = (w0 / area, w1 / area, w2 / area);
            let mut uv = [[0.0f32; 2]; 3];
            for (set, out) in uv.iter_mut().enumerate() {
                for (k, o) in out.iter_mut().enumerate() {
                    *o = a.uv[set][k] * b0 + b.uv[set][k] * b1 + c.uv[set][k] * b2;
                }
            }
            shade(px as u32, py as u32, uv);
        }
    }
}

/// Bound resources visible to a kernel invocation.
pub(crate) struct ShadeInputs<'a> {
    pub(crate) textures: Vec<Option<(&'a SoftTexture, SamplerDesc)>>,
    pub(crate) constants: &'a [f32],
}

impl ShadeInputs<'_> {
    fn c(&self, i: usize) -> f32 {
        self.constants.get(i).copied().unwrap_or(0.0)
    }

    fn has(&self, slot: usize) -> bool {
        matches!(self.textures.get(slot), Some(Some(_)))
    }

    fn sample(&self, slot: usize, u: f32, v: f32) -> Texel {
        match self.textures.get(slot) {
            Some(Some((t, s))) => t.sample(s, u, v),
            _ => [0.0, 0.0, 0.0, 1.0],
        }
    }

    fn sample_with(&self, slot: usize, filter: Filter, u: f32, v: f32) -> Texel {
        match self.textures.get(slot) {
            Some(Some((t, s))) => {
                let s = SamplerDesc { filter, ..*s };
                t.sample(&s, u, v)
            }
            _ => [0.0, 0.0, 0.0, 1.0],
        }
    }
}

fn mad(acc: &mut Texel, t: Texel, w: f32) {
    for c in 0..4 {
        acc[c] += t[c] * w;
    }
}

// Squeeze the bilinear blend between texels toward the texel edges by `sharp`.
fn sharpen(p: f32, size: f32, sharp: f32) -> f32 {
    let t = p * size - 0.5;
    let base = t.floor();
    let f = ((t - base - 0.5) * sharp + 0.5).clamp(0.0, 1.0);
    (base + f + 0.5) / size
}

fn cubic_weights(t: f32) -> [f32; 4] {
    const A: f32 = -0.75;
    let w = |x: f32| {
        let x = x.abs();
        if x < 1.0 {
            ((A + 2.0) * x - (A + 3.0)) * x * x + 1.0
        } else if x < 2.0 {
            ((A * x - 5.0 * A) * x + 8.0 * A) * x - 4.0 * A
        } else {
            0.0
        }
    };
    [w(1.0 + t), w(t), w(1.0 - t), w(2.0 - t)]
}

fn bicubic(inputs: &ShadeInputs<'_>, uv: [f32; 2], horizontal: bool) -> Texel {
    let (w, h) = (inputs.c(0).max(1.0), inputs.c(1).max(1.0));
    let (pos, size) = if horizontal { (uv[0] * w, w) } else { (uv[1] * h, h) };
    let t = pos - 0.5;
    let base = t.floor();
    let weights = cubic_weights(t - base);
    let mut acc = [0.0; 4];
    for (k, wk) in weights.iter().enumerate() {
        let coord = (base + k as f32 - 1.0 + 0.5) / size;
        let (u, v) = if horizontal {
            (coord, uv[1])
        } else {
            (uv[0], coord)
        };
        mad(&mut acc, inputs.sample_with(0, Filter::Point, u, v), *wk);
    }
    acc
}

pub(crate) fn shade_fragment(kernel: Kernel, inputs: &ShadeInputs<'_>, uv: [[f32; 2]; 3]) -> Texel {
    let [u0, v0] = uv[0];
    match kernel {
        Kernel::Blit => inputs.sample(0, u0, v0),
        Kernel::BlitSharp => {
            let (sx, sy) = (inputs.c(0), inputs.c(1));
            let (tw, th) = (inputs.c(2).max(1.0), inputs.c(3).max(1.0));
            inputs.sample(0, sharpen(u0, tw, sx), sharpen(v0, th, sy))
        }
        Kernel::BlitY => {
            let y = inputs.sample(0, u0, v0)[0];
            [y, y, y, 1.0]
        }
        Kernel::BlitPal8 => {
            let index = (inputs.sample_with(0, Filter::Point, u0, v0)[0] * 255.0).round();
            let mut c = inputs.sample_with(1, Filter::Point, (index + 0.5) / 256.0, 0.5);
            c[3] = 1.0;
            c
        }
        Kernel::BicubicH => bicubic(inputs, uv[0], true),
        Kernel::BicubicV => bicubic(inputs, uv[0], false),
        Kernel::ScreenFx => {
            // (sharpness.xy, texture size.xy) follow the flags when sharpening is on.
            let mut c = if inputs.c(16) > 0.0 {
                let (tw, th) = (inputs.c(18).max(1.0), inputs.c(19).max(1.0));
                inputs.sample(0, sharpen(u0, tw, inputs.c(16)), sharpen(v0, th, inputs.c(17)))
            } else {
                inputs.sample(0, u0, v0)
            };
            if inputs.c(14) != 0.0 {
                c[0] = c[0] * 2.0 - 1.0;
                c[1] = c[1] * 2.0 - 1.0;
                c[2] = c[2] * 2.0 - 1.0;
            }
            if inputs.c(15) != 0.0 {
                let src = c;
                for (r, out) in c.iter_mut().take(3).enumerate() {
                    *out = inputs.c(r * 4) * src[0]
                        + inputs.c(r * 4 + 1) * src[1]
                        + inputs.c(r * 4 + 2) * src[2];
                }
            }
            // Slot 1 is a 256x1 ramp indexed by each channel.
            if inputs.has(1) {
                for ch in c.iter_mut().take(3) {
                    let u = (ch.clamp(0.0, 1.0) * 255.0 + 0.5) / 256.0;
                    *ch = inputs.sample_with(1, Filter::Bilinear, u, 0.5)[0];
                }
            }
            let hdr = inputs.c(13);
            let mut scale = if hdr > 0.0 { hdr } else { 1.0 };
            if inputs.has(2) {
                let [su, sv] = uv[1];
                let m = inputs.sample(2, su, sv)[0];
                scale *= 1.0 - inputs.c(12) * (1.0 - m);
            }
            let mask = if inputs.has(3) {
                let [mu, mv] = uv[2];
                inputs.sample(3, mu, mv)
            } else {
                [1.0; 4]
            };
            [c[0] * scale * mask[0], c[1] * scale * mask[1], c[2] * scale * mask[2], 1.0]
        }
        Kernel::Artifacting => {
            let th = inputs.c(1);
            let dy = inputs.c(2);
            let a = inputs.sample(0, u0, v0);
            let b = inputs.sample(0, u0, v0 + dy * th);
            let mut out = [0.0; 4];
            mad(&mut out, a, 0.5);
            mad(&mut out, b, 0.5);
            // Signed encoding for consumers that expect (v + 1) / 2.
            if inputs.c(3) != 0.0 {
                for ch in out.iter_mut().take(3) {
                    *ch = *ch * 0.5 + 0.5;
                }
            }
            out[3] = 1.0;
            out
        }
        Kernel::BloomThreshold => {
            let c = inputs.sample(0, u0, v0);
            let (t, s) = (inputs.c(0), inputs.c(1));
            [
                (c[0] - t).max(0.0) * s,
                (c[1] - t).max(0.0) * s,
                (c[2] - t).max(0.0) * s,
                1.0,
            ]
        }
        Kernel::BloomBlur => {
            let (du, dv) = (inputs.c(0), inputs.c(1));
            let mut acc = [0.0; 4];
            for (k, w) in [1.0, 4.0, 6.0, 4.0, 1.0].iter().enumerate() {
                let o = k as f32 - 2.0;
                mad(
                    &mut acc,
                    inputs.sample(0, u0 + du * o, v0 + dv * o),
                    w / 16.0,
                );
            }
            acc
        }
        Kernel::BloomDown => {
            let (tw, th) = (inputs.c(0), inputs.c(1));
            let mut acc = [0.0; 4];
            for (ox, oy) in [(-0.5, -0.5), (0.5, -0.5), (-0.5, 0.5), (0.5, 0.5)] {
                mad(&mut acc, inputs.sample(0, u0 + ox * tw, v0 + oy * th), 0.25);
            }
            acc
        }
        Kernel::BloomUp => {
            let mut acc = [0.0; 4];
            mad(&mut acc, inputs.sample(0, u0, v0), inputs.c(0));
            mad(&mut acc, inputs.sample(1, u0, v0), inputs.c(1));
            acc[3] = 1.0;
            acc
        }
        Kernel::BloomFinal => {
            let [u1, v1] = uv[1];
            let mut acc = [0.0; 4];
            mad(&mut acc, inputs.sample(0, u0, v0), inputs.c(0));
            mad(&mut acc, inputs.sample(1, u1, v1), inputs.c(1));
            acc[3] = 1.0;
            acc
        }
        Kernel::Solid => [inputs.c(0), inputs.c(1), inputs.c(2), inputs.c(3)],
        Kernel::Tint => {
            let c = inputs.sample(0, u0, v0);
            [
                c[0] * inputs.c(0),
                c[1] * inputs.c(1),
                c[2] * inputs.c(2),
                c[3] * inputs.c(3),
            ]
        }
        Kernel::Add => {
            let a = inputs.sample(0, u0, v0);
            let b = inputs.sample(1, u0, v0);
            [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3].max(b[3])]
        }
        Kernel::Vertex | Kernel::BloomThresholdCs => [0.0; 4],
    }
}

/// Per-texel compute kernels; `uv` is the texel center of the written UAV.
pub(crate) fn shade_compute(kernel: Kernel, inputs: &ShadeInputs<'_>, uv: [f32; 2]) -> Texel {
    match kernel {
        Kernel::BloomThresholdCs => {
            shade_fragment(Kernel::BloomThreshold, inputs, [uv, [0.0; 2], [0.0; 2]])
        }
        _ => [0.0; 4],
    }
}
