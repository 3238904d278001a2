//! CPU device

use crate::runtime::Device;
use std::fmt;

/// The host CPU
///
/// There is a single CPU device; every instance compares equal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuDevice;

impl CpuDevice {
    /// Create a handle to the host CPU
    pub const fn new() -> Self {
        Self
    }
}

impl Device for CpuDevice {
    fn id(&self) -> usize {
        0
    }

    fn name(&self) -> String {
        "cpu".to_string()
    }
}

impl fmt::Display for CpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cpu")
    }
}
