//! Tensor operations
//!
//! This module defines the selection operation traits and their backend
//! implementations.
//!
//! # Design
//!
//! Operations are defined as traits that are implemented by `RuntimeClient`.
//! This gives operations access to device and allocator for creating output tensors.
//!
//! ```text
//! RuntimeClient<R>
//!   ├── implements WherePrimitives<R>   (backend seam)
//!   │     ├── count_nonzero_into       (device-wide reduction)
//!   │     ├── select_flagged_into      (stable compaction)
//!   │     └── unravel_into             (flat index -> coordinates)
//!   └── implements WhereOps<R>          (user-facing)
//!         ├── nonzero_coords, argwhere
//!         └── count_nonzero, flat_nonzero
//! ```
//!
//! # Implementing Operations for a New Backend
//!
//! Implement [`WherePrimitives`] for the backend client, then implement
//! [`WhereOps`] by delegating to the functions in [`pipeline`].

pub(crate) mod dispatch;
pub mod pipeline;
mod traits;

mod cpu;
#[cfg(feature = "wgpu")]
mod wgpu;

pub use traits::{CoordLayout, WhereConfig, WhereOps, WherePrimitives};
