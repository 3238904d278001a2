//! WebGPU implementations of the selection operations

mod where_ops;
