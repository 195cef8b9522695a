use crate::foundation::error::{ScanoutError, ScanoutResult};
use std::ops::{Add, Div, Mul, Sub};

pub use kurbo::{Point, Rect, Vec2};

#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    bytemuck::Pod,
    bytemuck::Zeroable,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Float2 {
    pub x: f32,
    pub y: f32,
}

impl Float2 {
    pub const ZERO: Self = Self::new(0.0, 0.0);
    pub const ONE: Self = Self::new(1.0, 1.0);

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }
}

impl Add for Float2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Float2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul for Float2 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y)
    }
}

impl Mul<f32> for Float2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div for Float2 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self::new(self.x / rhs.x, self.y / rhs.y)
    }
}

#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    bytemuck::Pod,
    bytemuck::Zeroable,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Float4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Float4 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub const fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// Row-major 4x4 matrix, laid out the way constant data expects it.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Float4x4(pub [[f32; 4]; 4]);

impl Float4x4 {
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    pub fn transpose(self) -> Self {
        let m = self.0;
        let mut out = [[0.0f32; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = m[c][r];
            }
        }
        Self(out)
    }
}

impl Default for Float4x4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Memory layout of a [`Pixmap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PixmapFormat {
    /// 32-bit little-endian `0x00RRGGBB` words; the top byte is ignored.
    Xrgb8888,
    /// 8-bit luma.
    Y8,
    /// 8-bit palette indices with a 256-entry `0x00RRGGBB` palette.
    Pal8,
}

impl PixmapFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Xrgb8888 => 4,
            Self::Y8 | Self::Pal8 => 1,
        }
    }
}

/// CPU-side frame handed to image nodes and image sources for upload.
#[derive(Clone, Debug, PartialEq)]
pub struct Pixmap {
    pub width: u32,
    pub height: u32,
    pub format: PixmapFormat,
    /// Bytes per row. May exceed `width * bytes_per_pixel`.
    pub pitch: usize,
    pub data: Vec<u8>,
    /// Present for [`PixmapFormat::Pal8`] only.
    pub palette: Option<Box<[u32; 256]>>,
}

impl Pixmap {
    pub fn xrgb8888(width: u32, height: u32, pixels: &[u32]) -> ScanoutResult<Self> {
        let expected = (width as usize) * (height as usize);
        if pixels.len() != expected {
            return Err(ScanoutError::validation(format!(
                "pixmap {width}x{height} needs {expected} pixels, got {}",
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            format: PixmapFormat::Xrgb8888,
            pitch: width as usize * 4,
            data: bytemuck::cast_slice(pixels).to_vec(),
            palette: None,
        })
    }

    pub fn solid(width: u32, height: u32, color: u32) -> Self {
        let pixels = vec![color; (width as usize) * (height as usize)];
        Self {
            width,
            height,
            format: PixmapFormat::Xrgb8888,
            pitch: width as usize * 4,
            data: bytemuck::cast_slice(&pixels).to_vec(),
            palette: None,
        }
    }

    pub fn y8(width: u32, height: u32, data: Vec<u8>) -> ScanoutResult<Self> {
        Self::new_8bit(width, height, PixmapFormat::Y8, data, None)
    }

    pub fn pal8(
        width: u32,
        height: u32,
        data: Vec<u8>,
        palette: Box<[u32; 256]>,
    ) -> ScanoutResult<Self> {
        Self::new_8bit(width, height, PixmapFormat::Pal8, data, Some(palette))
    }

    fn new_8bit(
        width: u32,
        height: u32,
        format: PixmapFormat,
        data: Vec<u8>,
        palette: Option<Box<[u32; 256]>>,
    ) -> ScanoutResult<Self> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(ScanoutError::validation(format!(
                "pixmap {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            pitch: width as usize,
            data,
            palette,
        })
    }

    /// Row `y` without pitch padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.pitch;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    /// Repack into tightly pitched rows.
    pub fn packed_rows(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(self.width as usize * self.height as usize * self.format.bytes_per_pixel());
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}

/// Split a `0xAARRGGBB` word into normalized `[r, g, b, a]`.
pub fn unpack_argb(c: u32) -> [f32; 4] {
    let ch = |shift: u32| ((c >> shift) & 0xff) as f32 / 255.0;
    [ch(16), ch(8), ch(0), ch(24)]
}

/// Pack normalized `[r, g, b, a]` into `0xAARRGGBB`, clamping each channel.
pub fn pack_argb(rgba: [f32; 4]) -> u32 {
    let q = |v: f32| ((v.clamp(0.0, 1.0) * 255.0) + 0.5) as u32;
    (q(rgba[3]) << 24) | (q(rgba[0]) << 16) | (q(rgba[1]) << 8) | q(rgba[2])
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
