/// Kernel launching on the emulated device
///
/// Execution model:
/// - A launch covers a 1D or 2D grid of lanes (`global`)
/// - The grid is cut into cooperative groups of identical shape (`local`)
/// - Groups run concurrently on the device's rayon pool, in no particular order
/// - Inside a cooperative group each lane is its own scoped thread; lanes share one
///   scratch region and one barrier
/// - A kernel may have several stages; a stage boundary is a grid-wide barrier, every
///   group finishes stage N before any lane starts stage N+1
///
/// Only stages that synchronize get a thread per lane. Every other stage runs its
/// lanes one after the other on the pool worker, which gives the same results
/// without paying for a thread per lane.
///
/// Every lane of a cooperative group must reach the same barriers in the same order.
/// A lane that returns early or panics before a barrier leaves the others waiting.

use std::fmt;
use std::sync::atomic::{Ordering, fence};
use std::sync::Barrier;
use std::thread;

use log::{debug, info};
use rayon::prelude::*;
use thiserror::Error;

use super::limits::DeviceLimits;
use crate::config::DeviceConfig;
use crate::core::Scratch;

/// Extent of a grid or a group. 1D shapes have `y == 1`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Dims {
    pub x: usize,
    pub y: usize,
}

impl Dims {
    pub const fn one(x: usize) -> Self {
        Self { x, y: 1 }
    }

    pub const fn two(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    pub fn count(&self) -> usize {
        self.x * self.y
    }

    pub fn fits_within(&self, other: Dims) -> bool {
        self.x <= other.x && self.y <= other.y
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.y == 1 {
            write!(f, "{}", self.x)
        } else {
            write!(f, "{}x{}", self.x, self.y)
        }
    }
}

impl From<usize> for Dims {
    fn from(x: usize) -> Self {
        Self::one(x)
    }
}

impl From<(usize, usize)> for Dims {
    fn from((x, y): (usize, usize)) -> Self {
        Self::two(x, y)
    }
}

/// Which memory a barrier makes consistent across the group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fence {
    /// Scratch writes of every lane are visible after the barrier
    Local,
    /// Global buffer writes of every lane are visible after the barrier as well
    Global,
}

/// One lane's view of the launch
pub struct WorkItem<'a> {
    global_id: Dims,
    local_id: Dims,
    local_size: Dims,
    global_size: Dims,
    barrier: Option<&'a Barrier>,
    scratch: &'a Scratch,
}

impl<'a> WorkItem<'a> {
    pub fn global_id(&self) -> Dims {
        self.global_id
    }

    pub fn local_id(&self) -> Dims {
        self.local_id
    }

    pub fn local_size(&self) -> Dims {
        self.local_size
    }

    pub fn global_size(&self) -> Dims {
        self.global_size
    }

    /// Group-local scratch memory, `local_size.y` rows by `local_size.x` columns
    pub fn scratch(&self) -> &'a Scratch {
        self.scratch
    }

    /// Wait until every lane of the group reaches this point
    ///
    /// # Panics
    /// Panics if the kernel did not declare the current stage cooperative
    pub fn barrier(&self, kind: Fence) {
        let barrier = self
            .barrier
            .expect("barrier() called from a stage that is not cooperative");
        if kind == Fence::Global {
            fence(Ordering::SeqCst);
        }
        barrier.wait();
        if kind == Fence::Global {
            fence(Ordering::SeqCst);
        }
    }
}

/// A routine executed once per lane of a launch grid
pub trait Kernel: Sync {
    fn name(&self) -> &'static str;

    /// Largest group shape the kernel's scratch region can hold
    /// `None` means the kernel uses no scratch memory
    fn scratch_capacity(&self) -> Option<Dims> {
        None
    }

    /// Whether lanes of `stage` synchronize with `WorkItem::barrier`
    fn cooperative(&self, _stage: usize) -> bool {
        false
    }

    /// Number of grid-wide stages
    fn stages(&self) -> usize {
        1
    }

    fn run(&self, item: &WorkItem<'_>, stage: usize);
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Kernel '{kernel}': launch grid {global} has no lanes")]
    EmptyGrid { kernel: &'static str, global: Dims },

    #[error("Kernel '{kernel}': group {local} does not evenly divide grid {global}")]
    UnevenGroups {
        kernel: &'static str,
        global: Dims,
        local: Dims,
    },

    #[error("Kernel '{kernel}': group of {lanes} lanes exceeds the device limit of {max}")]
    GroupTooLarge {
        kernel: &'static str,
        lanes: usize,
        max: usize,
    },

    #[error("Kernel '{kernel}': group {local} exceeds scratch capacity {capacity}")]
    ScratchExceeded {
        kernel: &'static str,
        local: Dims,
        capacity: Dims,
    },

    #[error("Failed to build device thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Calculate group size: the largest value `<= max` that divides `size`
pub fn calc_group_size(max: usize, size: usize) -> usize {
    (1..=max.max(1)).rev().find(|i| size % i == 0).unwrap_or(1)
}

pub struct Device {
    pool: rayon::ThreadPool,
    limits: DeviceLimits,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device").field("limits", &self.limits).finish()
    }
}

impl Device {
    pub fn new(config: &DeviceConfig) -> Result<Self, LaunchError> {
        let mut limits = DeviceLimits::detect();
        if config.threads > 0 {
            limits.compute_units = config.threads;
        }
        if config.max_group_lanes > 0 {
            limits.max_group_lanes = config.max_group_lanes;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(limits.compute_units)
            .thread_name(|i| format!("device-cu-{}", i))
            .build()?;

        info!("Device ready: {}", limits.describe());
        Ok(Self { pool, limits })
    }

    /// Device with detected limits and default configuration
    pub fn cpu() -> Result<Self, LaunchError> {
        Self::new(&DeviceConfig::default())
    }

    pub fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    /// Pick a group shape for `global`, within the lane limit and the kernel's scratch capacity
    pub fn group_for<K: Kernel + ?Sized>(&self, kernel: &K, global: Dims) -> Dims {
        let (mut max_x, mut max_y) = if global.y == 1 {
            (self.limits.max_group_lanes, 1)
        } else {
            let side = self.limits.max_group_side();
            (side, side)
        };
        if let Some(capacity) = kernel.scratch_capacity() {
            max_x = max_x.min(capacity.x);
            max_y = max_y.min(capacity.y);
        }
        Dims::two(
            calc_group_size(max_x, global.x),
            calc_group_size(max_y, global.y),
        )
    }

    pub fn launch_auto<K: Kernel>(&self, kernel: &K, global: Dims) -> Result<(), LaunchError> {
        let local = self.group_for(kernel, global);
        self.launch(kernel, global, local)
    }

    pub fn launch<K: Kernel>(&self, kernel: &K, global: Dims, local: Dims) -> Result<(), LaunchError> {
        self.validate(kernel, global, local)?;

        let groups = Dims::two(global.x / local.x, global.y / local.y);
        debug!(
            "Launching '{}': grid {}, group {}, {} groups, {} stage(s)",
            kernel.name(),
            global,
            local,
            groups.count(),
            kernel.stages()
        );

        for stage in 0..kernel.stages() {
            self.pool.install(|| {
                (0..groups.count()).into_par_iter().for_each(|g| {
                    let group = Dims::two(g % groups.x, g / groups.x);
                    run_group(kernel, stage, group, global, local);
                });
            });
        }
        Ok(())
    }

    fn validate<K: Kernel>(&self, kernel: &K, global: Dims, local: Dims) -> Result<(), LaunchError> {
        let name = kernel.name();
        if global.count() == 0 {
            return Err(LaunchError::EmptyGrid { kernel: name, global });
        }
        if local.count() == 0 || global.x % local.x != 0 || global.y % local.y != 0 {
            return Err(LaunchError::UnevenGroups {
                kernel: name,
                global,
                local,
            });
        }
        if local.count() > self.limits.max_group_lanes {
            return Err(LaunchError::GroupTooLarge {
                kernel: name,
                lanes: local.count(),
                max: self.limits.max_group_lanes,
            });
        }
        if let Some(capacity) = kernel.scratch_capacity() {
            if !local.fits_within(capacity) {
                return Err(LaunchError::ScratchExceeded {
                    kernel: name,
                    local,
                    capacity,
                });
            }
        }
        Ok(())
    }
}

fn run_group<K: Kernel>(kernel: &K, stage: usize, group: Dims, global: Dims, local: Dims) {
    let scratch = match kernel.scratch_capacity() {
        Some(_) => Scratch::new(local.y, local.x),
        None => Scratch::new(0, 0),
    };
    let lanes = local.count();
    let barrier = Barrier::new(lanes);
    let cooperative = kernel.cooperative(stage);

    let item = |lane: usize| {
        let local_id = Dims::two(lane % local.x, lane / local.x);
        WorkItem {
            global_id: Dims::two(group.x * local.x + local_id.x, group.y * local.y + local_id.y),
            local_id,
            local_size: local,
            global_size: global,
            barrier: if cooperative { Some(&barrier) } else { None },
            scratch: &scratch,
        }
    };

    if !cooperative || lanes == 1 {
        for lane in 0..lanes {
            kernel.run(&item(lane), stage);
        }
        return;
    }

    thread::scope(|s| {
        for lane in 0..lanes {
            let work_item = item(lane);
            s.spawn(move || kernel.run(&work_item, stage));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeviceBuffer;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn device(max_group_lanes: usize) -> Device {
        Device::new(&DeviceConfig {
            threads: 2,
            max_group_lanes,
        })
        .unwrap()
    }

    /// Writes the global x id into every cell
    struct Iota<'a> {
        out: &'a DeviceBuffer,
    }

    impl Kernel for Iota<'_> {
        fn name(&self) -> &'static str {
            "iota"
        }

        fn run(&self, item: &WorkItem<'_>, _stage: usize) {
            let id = item.global_id();
            self.out.set(id.y * item.global_size().x + id.x, id.x as f32);
        }
    }

    /// Each lane reads its neighbour's scratch slot after a barrier
    struct Rotate<'a> {
        out: &'a DeviceBuffer,
    }

    impl Kernel for Rotate<'_> {
        fn name(&self) -> &'static str {
            "rotate"
        }

        fn scratch_capacity(&self) -> Option<Dims> {
            Some(Dims::two(8, 1))
        }

        fn cooperative(&self, _stage: usize) -> bool {
            true
        }

        fn run(&self, item: &WorkItem<'_>, _stage: usize) {
            let lx = item.local_id().x;
            let width = item.local_size().x;
            item.scratch().set(0, lx, item.global_id().x as f32);
            item.barrier(Fence::Local);
            let neighbour = item.scratch().get(0, (lx + 1) % width);
            self.out.set(item.global_id().x, neighbour);
        }
    }

    /// Stage 0 accumulates into cell 0, stage 1 copies the finished total everywhere
    struct TwoStage<'a> {
        sum: &'a DeviceBuffer,
        out: &'a DeviceBuffer,
    }

    impl Kernel for TwoStage<'_> {
        fn name(&self) -> &'static str {
            "two_stage"
        }

        fn stages(&self) -> usize {
            2
        }

        fn run(&self, item: &WorkItem<'_>, stage: usize) {
            let i = item.global_id().x;
            match stage {
                0 => {
                    self.sum.atomic_add(0, 1.0);
                }
                _ => self.out.set(i, self.sum.get(0)),
            }
        }
    }

    /// Stage 0 synchronizes, stage 1 records the thread that ran each lane
    struct Mixed<'a> {
        threads: &'a Mutex<HashSet<thread::ThreadId>>,
        barrier_in_second_stage: bool,
    }

    impl Kernel for Mixed<'_> {
        fn name(&self) -> &'static str {
            "mixed"
        }

        fn cooperative(&self, stage: usize) -> bool {
            stage == 0
        }

        fn stages(&self) -> usize {
            2
        }

        fn run(&self, item: &WorkItem<'_>, stage: usize) {
            if stage == 0 {
                item.barrier(Fence::Local);
                return;
            }
            if self.barrier_in_second_stage {
                item.barrier(Fence::Local);
            }
            self.threads.lock().unwrap().insert(thread::current().id());
        }
    }

    #[test]
    fn test_calc_group_size() {
        assert_eq!(calc_group_size(8, 12), 6);
        assert_eq!(calc_group_size(8, 16), 8);
        assert_eq!(calc_group_size(8, 7), 7);
        assert_eq!(calc_group_size(4, 7), 1);
        assert_eq!(calc_group_size(0, 5), 1);
    }

    #[test]
    fn test_every_lane_runs_once() {
        let device = device(16);
        let out = DeviceBuffer::filled(12, -1.0);
        device.launch(&Iota { out: &out }, Dims::two(4, 3), Dims::two(2, 3)).unwrap();
        assert_eq!(
            out.to_vec(),
            vec![0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_barrier_makes_scratch_visible() {
        let device = device(16);
        let out = DeviceBuffer::new(8);
        device.launch(&Rotate { out: &out }, Dims::one(8), Dims::one(4)).unwrap();
        assert_eq!(out.to_vec(), vec![1.0, 2.0, 3.0, 0.0, 5.0, 6.0, 7.0, 4.0]);
    }

    #[test]
    fn test_stage_boundary_is_grid_wide() {
        let device = device(16);
        let sum = DeviceBuffer::new(1);
        let out = DeviceBuffer::new(32);
        let kernel = TwoStage { sum: &sum, out: &out };
        device.launch(&kernel, Dims::one(32), Dims::one(4)).unwrap();
        assert_eq!(out.to_vec(), vec![32.0; 32]);
    }

    #[test]
    fn test_plain_stage_runs_lanes_on_one_thread() {
        let device = device(16);
        let threads = Mutex::new(HashSet::new());
        let kernel = Mixed { threads: &threads, barrier_in_second_stage: false };
        device.launch(&kernel, Dims::one(8), Dims::one(8)).unwrap();
        assert_eq!(threads.lock().unwrap().len(), 1);
    }

    #[test]
    #[should_panic(expected = "not cooperative")]
    fn test_barrier_outside_cooperative_stage_panics() {
        let device = device(16);
        let threads = Mutex::new(HashSet::new());
        let kernel = Mixed { threads: &threads, barrier_in_second_stage: true };
        let _ = device.launch(&kernel, Dims::one(8), Dims::one(8));
    }

    #[test]
    fn test_launch_validation() {
        let small = device(4);
        let out = DeviceBuffer::new(16);

        let err = small.launch(&Iota { out: &out }, Dims::one(0), Dims::one(1));
        assert!(matches!(err, Err(LaunchError::EmptyGrid { .. })));

        let err = small.launch(&Iota { out: &out }, Dims::one(10), Dims::one(4));
        assert!(matches!(err, Err(LaunchError::UnevenGroups { .. })));

        let err = small.launch(&Iota { out: &out }, Dims::one(16), Dims::one(8));
        assert!(matches!(err, Err(LaunchError::GroupTooLarge { lanes: 8, max: 4, .. })));

        let roomy = device(64);
        let err = roomy.launch(&Rotate { out: &out }, Dims::one(16), Dims::one(16));
        assert!(matches!(err, Err(LaunchError::ScratchExceeded { .. })));
    }

    #[test]
    fn test_group_for_respects_limits() {
        let device = device(16);
        let out = DeviceBuffer::new(1);
        assert_eq!(device.group_for(&Iota { out: &out }, Dims::one(48)), Dims::one(16));
        assert_eq!(device.group_for(&Iota { out: &out }, Dims::two(6, 9)), Dims::two(3, 3));
        assert_eq!(device.group_for(&Rotate { out: &out }, Dims::one(48)), Dims::one(8));
    }

    #[test]
    fn test_dims_display() {
        assert_eq!(Dims::one(5).to_string(), "5");
        assert_eq!(Dims::two(3, 4).to_string(), "3x4");
    }
}
