use crate::device::{VertexElement, VertexElementFormat, VertexLayout, VertexSemantic};
use crate::foundation::core::Float2;

/// Shared vertex layouts the node context creates formats and programs for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexKind {
    /// Position + one texture coordinate set.
    Tex1,
    /// Position + two texture coordinate sets.
    Tex2,
    /// Position + three texture coordinate sets.
    Tex3,
}

impl VertexKind {
    pub(crate) const ALL: [Self; 3] = [Self::Tex1, Self::Tex2, Self::Tex3];

    pub(crate) fn slot(self) -> usize {
        self as usize
    }

    /// Device layout: `float3` position followed by `float2` texcoords.
    pub fn layout(self) -> VertexLayout {
        let sets = self.slot() as u8 + 1;
        let mut elements = vec![VertexElement {
            semantic: VertexSemantic::Position,
            format: VertexElementFormat::Float3,
            offset: 0,
        }];
        for set in 0..sets {
            elements.push(VertexElement {
                semantic: VertexSemantic::TexCoord(set),
                format: VertexElementFormat::Float2,
                offset: 12 + 8 * u32::from(set),
            });
        }
        VertexLayout {
            elements,
            stride: 12 + 8 * u32::from(sets),
        }
    }
}

/// A vertex type whose clip-space position a [`SoftViewport`](super::SoftViewport) can rewrite.
pub trait DisplayVertex: bytemuck::Pod {
    /// Clip-space x/y.
    fn position(&self) -> Float2;

    /// Replace clip-space x/y.
    fn set_position(&mut self, p: Float2);
}

/// Vertex with one texture coordinate set.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex1T {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u: f32,
    pub v: f32,
}

/// Vertex with two texture coordinate sets.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex2T {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

/// Vertex with three texture coordinate sets.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex3T {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
    pub u2: f32,
    pub v2: f32,
}

macro_rules! impl_display_vertex {
    ($($ty:ty),*) => {
        $(
            impl DisplayVertex for $ty {
                fn position(&self) -> Float2 {
                    Float2::new(self.x, self.y)
                }

                fn set_position(&mut self, p: Float2) {
                    self.x = p.x;
                    self.y = p.y;
                }
            }
        )*
    };
}

impl_display_vertex!(Vertex1T, Vertex2T, Vertex3T);

impl Vertex1T {
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self { x, y, z: 0.0, u, v }
    }
}

impl Vertex2T {
    pub const fn new(x: f32, y: f32, uv0: Float2, uv1: Float2) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            u0: uv0.x,
            v0: uv0.y,
            u1: uv1.x,
            v1: uv1.y,
        }
    }
}

/// Rewrites the positions of packed vertices: `dst = src` with `p * scale + offset`.
pub(crate) type VertexTransformer = fn(&[u32], &mut [u32], Float2, Float2) -> bool;

pub(crate) fn transform_vertices<T: DisplayVertex>(
    src: &[u32],
    dst: &mut [u32],
    scale: Float2,
    offset: Float2,
) -> bool {
    let (Ok(src), Ok(dst)) = (
        bytemuck::try_cast_slice::<u32, T>(src),
        bytemuck::try_cast_slice_mut::<u32, T>(dst),
    ) else {
        return false;
    };
    for (d, s) in dst.iter_mut().zip(src) {
        *d = *s;
        d.set_position(s.position() * scale + offset);
    }
    true
}

/// Full-target quad in `[0, 1]` UV space, in the order [`set_topology_quad`] expects.
///
/// [`set_topology_quad`]: super::MeshBuilder::set_topology_quad
pub fn quad_1t(u0: f32, v0: f32, u1: f32, v1: f32) -> [Vertex1T; 4] {
    [
        Vertex1T::new(-1.0, 1.0, u0, v0),
        Vertex1T::new(1.0, 1.0, u1, v0),
        Vertex1T::new(-1.0, -1.0, u0, v1),
        Vertex1T::new(1.0, -1.0, u1, v1),
    ]
}
