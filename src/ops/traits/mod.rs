//! Operation traits for tensor operations.
//!
//! `WhereOps` is the user-facing selection API. `WherePrimitives` is the seam
//! each backend implements; the generic pipeline in [`crate::ops::pipeline`]
//! composes the primitives into the user-facing operations.

mod primitives;
mod where_ops;

pub use primitives::{CoordLayout, WhereConfig, WherePrimitives};
pub use where_ops::WhereOps;
