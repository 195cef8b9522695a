//! Recording and replay of display work: pool indices, render views, the shared node context and
//! command lists.

mod builders;
mod command_list;
mod node_context;
mod pool;
mod ring_cache;
mod vertex;
mod view;

pub use builders::{DispatchBuilder, MeshBuilder};
pub use command_list::CommandList;
pub use node_context::{BloomV2Settings, FormatSet, NodeContext, NodeContextOpts};
pub use pool::{PoolCommandIndex, PoolRenderViewId, PoolTextureIndex};
pub use ring_cache::{CacheRange, RingCache};
pub use vertex::{DisplayVertex, Vertex1T, Vertex2T, Vertex3T, VertexKind, quad_1t};
pub use view::{RenderView, SoftViewport};
