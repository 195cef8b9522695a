//! Small typed indices into a [`CommandList`](super::CommandList)'s resource tables.
//!
//! Commands never hold device handles for textures or render targets directly; they hold one of
//! these indices, and the list resolves it when the command executes.

macro_rules! define_pool_index {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name($repr);

        impl $name {
            /// Position in the owning table.
            pub fn to_usize(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_usize(idx: usize) -> Option<Self> {
                <$repr>::try_from(idx).ok().map(Self)
            }
        }
    };
}

define_pool_index!(
    /// Slot in a command list's texture table.
    PoolTextureIndex(u16)
);
define_pool_index!(
    /// Slot in a command list's render view table.
    PoolRenderViewId(u8)
);
define_pool_index!(
    /// Position of a recorded command.
    PoolCommandIndex(u16)
);
