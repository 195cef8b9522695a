use std::ops::BitOr;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a device-assigned id.
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// The device-assigned id.
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

define_handle!(
    /// A 2D texture, optionally mipmapped.
    TextureHandle
);
define_handle!(
    /// Unordered-access view over mip 0 of a texture.
    UavHandle
);
define_handle!(
    /// Sampler state object.
    SamplerHandle
);
define_handle!(
    /// Blend state object.
    BlendHandle
);
define_handle!(
    /// Vertex input layout.
    VertexFormatHandle
);
define_handle!(
    /// Compiled vertex program.
    VertexProgramHandle
);
define_handle!(
    /// Compiled fragment program.
    FragmentProgramHandle
);
define_handle!(
    /// Compiled compute program.
    ComputeProgramHandle
);
define_handle!(
    /// Vertex buffer.
    VertexBufferHandle
);
define_handle!(
    /// 16-bit index buffer.
    IndexBufferHandle
);
define_handle!(
    /// Constant (uniform) buffer.
    ConstantBufferHandle
);

/// Any device object, for [`GraphicsContext::destroy`](super::GraphicsContext::destroy).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceObject {
    /// See [`TextureHandle`].
    Texture(TextureHandle),
    /// See [`UavHandle`].
    Uav(UavHandle),
    /// See [`SamplerHandle`].
    Sampler(SamplerHandle),
    /// See [`BlendHandle`].
    Blend(BlendHandle),
    /// See [`VertexFormatHandle`].
    VertexFormat(VertexFormatHandle),
    /// See [`VertexProgramHandle`].
    VertexProgram(VertexProgramHandle),
    /// See [`FragmentProgramHandle`].
    FragmentProgram(FragmentProgramHandle),
    /// See [`ComputeProgramHandle`].
    ComputeProgram(ComputeProgramHandle),
    /// See [`VertexBufferHandle`].
    VertexBuffer(VertexBufferHandle),
    /// See [`IndexBufferHandle`].
    IndexBuffer(IndexBufferHandle),
    /// See [`ConstantBufferHandle`].
    ConstantBuffer(ConstantBufferHandle),
}

macro_rules! impl_device_object_from {
    ($($handle:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$handle> for DeviceObject {
                fn from(h: $handle) -> Self {
                    Self::$variant(h)
                }
            }
        )*
    };
}

impl_device_object_from!(
    TextureHandle => Texture,
    UavHandle => Uav,
    SamplerHandle => Sampler,
    BlendHandle => Blend,
    VertexFormatHandle => VertexFormat,
    VertexProgramHandle => VertexProgram,
    FragmentProgramHandle => FragmentProgram,
    ComputeProgramHandle => ComputeProgram,
    VertexBufferHandle => VertexBuffer,
    IndexBufferHandle => IndexBuffer,
    ConstantBufferHandle => ConstantBuffer,
);

/// Texel formats the engine asks devices for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Format {
    /// Single 8-bit channel.
    R8Unorm,
    /// 8-bit RGBA, memory order R, G, B, A.
    Rgba8Unorm,
    /// 8-bit RGBA with sRGB encoding.
    Rgba8UnormSrgb,
    /// 8-bit BGRA, memory order B, G, R, A.
    Bgra8Unorm,
    /// 8-bit BGRA with sRGB encoding.
    Bgra8UnormSrgb,
    /// Half-float RGBA.
    Rgba16Float,
    /// Float RGBA.
    Rgba32Float,
}

impl Format {
    /// Bytes per texel in upload data.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Bgra8Unorm | Self::Bgra8UnormSrgb => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Whether sampling decodes and rendering encodes sRGB.
    pub fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb | Self::Bgra8UnormSrgb)
    }

    /// Whether texels are stored as floating point.
    pub fn is_float(self) -> bool {
        matches!(self, Self::Rgba16Float | Self::Rgba32Float)
    }
}

/// How a texture may be bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct TextureUsage(u8);

impl TextureUsage {
    /// Sampled by programs.
    pub const SHADER: Self = Self(1);
    /// Bound as a render target.
    pub const RENDER: Self = Self(2);
    /// Written by compute programs.
    pub const UAV: Self = Self(4);

    /// Whether every flag in `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TextureUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Texture creation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    /// Width of mip 0 in texels.
    pub width: u32,
    /// Height of mip 0 in texels.
    pub height: u32,
    /// Texel format.
    pub format: Format,
    /// Number of mip levels (at least 1).
    pub mip_levels: u32,
    /// Allowed bindings.
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Single-level sampled texture.
    pub fn shader(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels: 1,
            usage: TextureUsage::SHADER,
        }
    }

    /// Single-level texture that can be rendered to and sampled.
    pub fn render_target(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels: 1,
            usage: TextureUsage::SHADER | TextureUsage::RENDER,
        }
    }
}

/// A mip level of a texture used as a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceRef {
    /// Owning texture.
    pub texture: TextureHandle,
    /// Mip level.
    pub mip: u32,
}

impl SurfaceRef {
    /// Mip 0 of `texture`.
    pub fn level0(texture: TextureHandle) -> Self {
        Self { texture, mip: 0 }
    }
}

/// Pixel rectangle of the bound render target that clip space maps onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Viewport {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Viewport covering `width x height` from the origin.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Texture filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Nearest texel.
    Point,
    /// Bilinear within mip 0.
    Bilinear,
    /// Bilinear with mip selection.
    Trilinear,
}

/// Behaviour outside the `[0, 1]` UV range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// Clamp to the edge texel.
    Clamp,
    /// Repeat.
    Wrap,
    /// Transparent black outside the texture.
    Border,
}

/// Sampler creation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    /// Filtering.
    pub filter: Filter,
    /// Horizontal addressing.
    pub address_u: AddressMode,
    /// Vertical addressing.
    pub address_v: AddressMode,
}

impl SamplerDesc {
    /// Same addressing on both axes.
    pub fn new(filter: Filter, address: AddressMode) -> Self {
        Self {
            filter,
            address_u: address,
            address_v: address,
        }
    }
}

/// Output merge mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Overwrite the target.
    Replace,
    /// `src + dst * (1 - src.a)`.
    PremultipliedAlpha,
    /// `src + dst`.
    Additive,
}

/// Vertex attribute meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    /// Clip-space position; x and y are always the first two floats.
    Position,
    /// Packed RGBA8 color.
    Color,
    /// Texture coordinate set `n`.
    TexCoord(u8),
}

/// Vertex attribute storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexElementFormat {
    /// Two floats.
    Float2,
    /// Three floats.
    Float3,
    /// Four floats.
    Float4,
    /// Four normalized bytes.
    Unorm8x4,
}

/// One attribute in a [`VertexLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// What the attribute means.
    pub semantic: VertexSemantic,
    /// How it is stored.
    pub format: VertexElementFormat,
    /// Byte offset within the vertex.
    pub offset: u32,
}

/// Vertex input layout description.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Attributes in any order.
    pub elements: Vec<VertexElement>,
    /// Bytes between consecutive vertices.
    pub stride: u32,
}

impl VertexLayout {
    /// Byte offset of texture coordinate set `n`, if present.
    pub fn texcoord_offset(&self, n: u8) -> Option<u32> {
        self.elements
            .iter()
            .find(|e| e.semantic == VertexSemantic::TexCoord(n))
            .map(|e| e.offset)
    }
}

/// What a device can do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Largest texture width.
    pub max_texture_width: u32,
    /// Largest texture height.
    pub max_texture_height: u32,
    /// Non-power-of-two textures are supported.
    pub non_pow2: bool,
    /// Compute programs and UAVs are supported.
    pub compute: bool,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            max_texture_width: 8192,
            max_texture_height: 8192,
            non_pow2: true,
            compute: true,
        }
    }
}

/// Programs every device ships precompiled for the built-in nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinProgram {
    /// Position + one texcoord pass-through.
    VertexTex1,
    /// Position + two texcoords pass-through.
    VertexTex2,
    /// Position + three texcoords pass-through.
    VertexTex3,
    /// Default vertex program for custom effect passes.
    VertexEffect,
    /// Plain textured blit.
    FragmentBlit,
    /// Sharp-bilinear blit.
    FragmentBlitSharp,
    /// Luma-only source expanded to gray.
    FragmentBlitY,
    /// Palette lookup.
    FragmentBlitPal8,
    /// Horizontal bicubic pass.
    FragmentBicubicH,
    /// Vertical bicubic pass.
    FragmentBicubicV,
    /// CRT screen effect.
    FragmentScreenFx,
    /// PAL chroma blending.
    FragmentArtifacting,
    /// Bloom threshold / prescale.
    FragmentBloomThreshold,
    /// Bloom separable blur.
    FragmentBloomBlur,
    /// Bloom pyramid downsample.
    FragmentBloomDown,
    /// Bloom pyramid upsample.
    FragmentBloomUp,
    /// Bloom composite.
    FragmentBloomFinal,
    /// Compute version of the bloom threshold pass.
    ComputeBloomThreshold,
}
