//! Explicit memory layout: which rules apply to a block, and whether its
//! `Offset`, `ArrayStride` and `MatrixStride` decorations satisfy them.

mod measure;
mod policy;
mod walker;

pub use measure::MAX_TYPE_DEPTH;
pub use policy::{BlockRules, LayoutPolicy, Packing, allows_layout};
pub(crate) use walker::{LayoutWalker, block_decoration};
