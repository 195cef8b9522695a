/// Introspection result for a compiled program.
///
/// Produced by [`GraphicsContext::reflect_program`](super::GraphicsContext::reflect_program).
/// Custom effects use it to bind uniforms and textures by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShaderReflection {
    /// Constant buffers in declaration order.
    pub constant_buffers: Vec<ReflectedConstantBuffer>,
    /// Texture bindings.
    pub textures: Vec<ReflectedBinding>,
    /// Sampler bindings.
    pub samplers: Vec<ReflectedBinding>,
    /// Compute thread group size; `[1, 1, 1]` for graphics programs.
    pub thread_group: [u32; 3],
}

/// A constant buffer declared by a program.
#[derive(Clone, Debug, PartialEq)]
pub struct ReflectedConstantBuffer {
    /// Declared name.
    pub name: String,
    /// Binding slot.
    pub slot: u32,
    /// Size in bytes.
    pub size: u32,
    /// Members.
    pub variables: Vec<ReflectedVariable>,
}

/// A top-level member of a constant buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct ReflectedVariable {
    /// Declared name.
    pub name: String,
    /// Byte offset within the buffer.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
    /// Shape.
    pub class: VariableClass,
    /// Initial value bytes, if the program declares one.
    pub default: Option<Vec<u8>>,
}

/// Shape of a [`ReflectedVariable`].
#[derive(Clone, Debug, PartialEq)]
pub enum VariableClass {
    /// One float.
    Scalar,
    /// One boolean stored as a 32-bit word.
    Bool,
    /// `columns` floats.
    Vector {
        /// Component count, 1 to 4.
        columns: u32,
    },
    /// Float matrix.
    Matrix {
        /// Row count.
        rows: u32,
        /// Column count.
        columns: u32,
        /// Storage order.
        row_major: bool,
    },
    /// Structure of float members.
    Struct {
        /// Members.
        members: Vec<ReflectedMember>,
    },
}

/// Float member of a structure variable.
#[derive(Clone, Debug, PartialEq)]
pub struct ReflectedMember {
    /// Declared name.
    pub name: String,
    /// Byte offset relative to the owning variable.
    pub offset: u32,
    /// Component count.
    pub columns: u32,
}

/// Named texture or sampler slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflectedBinding {
    /// Declared name.
    pub name: String,
    /// Binding slot.
    pub slot: u32,
}
