//! Device memory
//!
//! `DeviceBuffer` is global memory: visible to every lane of every group in a launch.
//! `Scratch` is group-local memory: one 2D region per cooperative group, dropped
//! when the group finishes.
//!
//! Every cell is an `AtomicF32` so lanes can share a buffer by reference. Plain reads
//! and writes use relaxed ordering, which is enough because kernels only write a cell
//! from several lanes through `atomic_add`; all other writes are index-disjoint and
//! get published by barriers or by the end of the launch.

use std::sync::atomic::Ordering;

use super::atomic::AtomicF32;

/// Flat float buffer in global device memory
#[derive(Debug, Default)]
pub struct DeviceBuffer {
    cells: Box<[AtomicF32]>,
}

impl DeviceBuffer {
    /// Zero-filled buffer of `len` floats
    pub fn new(len: usize) -> Self {
        Self::filled(len, 0.0)
    }

    pub fn filled(len: usize, value: f32) -> Self {
        Self {
            cells: (0..len).map(|_| AtomicF32::new(value)).collect(),
        }
    }

    pub fn from_slice(values: &[f32]) -> Self {
        Self {
            cells: values.iter().map(|&v| AtomicF32::new(v)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> f32 {
        self.cells[index].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, index: usize, value: f32) {
        self.cells[index].store(value, Ordering::Relaxed)
    }

    /// Global-scope atomic accumulation, safe under any number of concurrent writers
    #[inline]
    pub fn atomic_add(&self, index: usize, delta: f32) -> f32 {
        self.cells[index].fetch_add(delta)
    }

    pub fn fill(&self, value: f32) {
        for cell in self.cells.iter() {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Overwrite the start of the buffer with `values`
    /// Panics if `values` is longer than the buffer
    pub fn write(&self, values: &[f32]) {
        for (cell, &v) in self.cells[..values.len()].iter().zip(values) {
            cell.store(v, Ordering::Relaxed);
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.cells.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    /// Grow to at least `len` floats, keeping existing values and zero-filling the rest
    pub fn expand_to(&mut self, len: usize) {
        if self.cells.len() >= len {
            return;
        }
        let mut values = self.to_vec();
        values.resize(len, 0.0);
        *self = Self::from_slice(&values);
    }
}

impl From<Vec<f32>> for DeviceBuffer {
    fn from(values: Vec<f32>) -> Self {
        Self::from_slice(&values)
    }
}

/// Group-local scratch memory, indexed `[row][col]`
/// Kernels use the lane's local y id as row and local x id as column
#[derive(Debug)]
pub struct Scratch {
    rows: usize,
    cols: usize,
    cells: Box<[AtomicF32]>,
}

impl Scratch {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: (0..rows * cols).map(|_| AtomicF32::new(0.0)).collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols, "Scratch access out of bounds");
        row * self.cols + col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.cells[self.index(row, col)].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, row: usize, col: usize, value: f32) {
        self.cells[self.index(row, col)].store(value, Ordering::Relaxed)
    }

    /// Group-scope atomic accumulation, same algorithm as the global one
    #[inline]
    pub fn atomic_add(&self, row: usize, col: usize, delta: f32) -> f32 {
        self.cells[self.index(row, col)].fetch_add(delta)
    }
}
