/// Device capability detection
/// The emulated device runs on the host CPU, so its limits come from the machine:
/// - Compute units: hardware threads available to the process
/// - Group lanes: every lane of a cooperative group is an OS thread blocked on the
///   same barrier, so the lane count per group is capped
///
/// Detection is a one-time query; the result is cached inside `Device`.

use std::num::NonZeroUsize;
use std::thread;

/// Default cap on lanes per cooperative group
pub const DEFAULT_MAX_GROUP_LANES: usize = 256;

/// Capacity of the scratch memory the layer kernels reserve per group (floats per side)
pub const SCRATCH_DIM: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Number of groups that can make progress at the same time
    pub compute_units: usize,

    /// Maximum number of lanes (threads) inside one cooperative group
    pub max_group_lanes: usize,
}

impl DeviceLimits {
    /// Detect limits of the current machine
    /// Falls back to a single compute unit if parallelism can't be queried
    pub fn detect() -> Self {
        let compute_units = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);

        Self {
            compute_units,
            max_group_lanes: DEFAULT_MAX_GROUP_LANES,
        }
    }

    /// Largest group edge for a square 2D group within the lane limit
    pub fn max_group_side(&self) -> usize {
        ((self.max_group_lanes as f64).sqrt() as usize).max(1)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} compute unit{}, up to {} lanes per group",
            self.compute_units,
            if self.compute_units == 1 { "" } else { "s" },
            self.max_group_lanes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_reports_at_least_one_unit() {
        let limits = DeviceLimits::detect();
        assert!(limits.compute_units >= 1);
        assert_eq!(limits.max_group_lanes, DEFAULT_MAX_GROUP_LANES);
    }

    #[test]
    fn test_describe_and_side() {
        let limits = DeviceLimits {
            compute_units: 1,
            max_group_lanes: 64,
        };
        assert_eq!(limits.max_group_side(), 8);
        let desc = limits.describe();
        assert!(desc.contains("1 compute unit,"));
        assert!(desc.contains("64 lanes"));
    }
}
