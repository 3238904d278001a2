//! WGSL compute shaders for the WebGPU backend
//!
//! - `pipeline` - Pipeline caching and dispatch utilities
//! - `nonzero_wgsl` - WGSL source generation per dtype
//! - `nonzero` - Count, select and unravel launchers

pub mod nonzero;
pub mod nonzero_wgsl;
pub mod pipeline;

pub use nonzero::{
    launch_count_tiles, launch_scan_partials, launch_scatter, launch_sum_partials, launch_unravel,
};
pub use nonzero_wgsl::{MAX_DIMS, TILE_SIZE};
pub use pipeline::{PipelineCache, WORKGROUP_SIZE, workgroup_count};
