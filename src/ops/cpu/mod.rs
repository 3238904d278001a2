//! CPU implementation of tensor operations.

mod where_ops;
