//! Dense 3D arrays for cell- and face-centered grid data.
//!
//! Storage is a flat `Vec<T>` with x varying fastest:
//! `index = k * nx * ny + j * nx + i`.
//! Face arrays are one entry longer along their own axis.

use rayon::prelude::*;

use crate::error::FlipError;

/// Grid axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Shape of the face array for `axis` over a grid of `cells`.
#[inline]
pub fn face_dims(axis: Axis, cells: [usize; 3]) -> [usize; 3] {
    let mut dims = cells;
    dims[axis.index()] += 1;
    dims
}

#[derive(Clone, Debug, PartialEq)]
pub struct Array3<T> {
    dims: [usize; 3],
    data: Vec<T>,
}

impl<T: Clone> Array3<T> {
    /// Allocate a `dims` array filled with `value`.
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn try_new(dims: [usize; 3], value: T) -> Result<Self, FlipError> {
        let len = dims[0]
            .checked_mul(dims[1])
            .and_then(|n| n.checked_mul(dims[2]))
            .ok_or(FlipError::Allocation { cells: usize::MAX })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| FlipError::Allocation { cells: len })?;
        data.resize(len, value);
        Ok(Self { dims, data })
    }

    /// Allocate, panicking on failure. Convenient for small scratch arrays.
    pub fn new(dims: [usize; 3], value: T) -> Self {
        Self {
            dims,
            data: vec![value; dims[0] * dims[1] * dims[2]],
        }
    }

    /// Face-centered array for `axis` over a grid of `cells`.
    pub fn try_face(axis: Axis, cells: [usize; 3], value: T) -> Result<Self, FlipError> {
        Self::try_new(face_dims(axis, cells), value)
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copy every value from an array of the same shape.
    pub fn copy_from(&mut self, other: &Array3<T>) {
        assert_eq!(self.dims, other.dims, "array shape mismatch");
        self.data.clone_from_slice(&other.data);
    }
}

impl<T> Array3<T> {
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn in_bounds(&self, i: i64, j: i64, k: i64) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.dims[0]
            && (j as usize) < self.dims[1]
            && (k as usize) < self.dims[2]
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(
            i < self.dims[0] && j < self.dims[1] && k < self.dims[2],
            "index ({}, {}, {}) out of bounds for {:?}",
            i,
            j,
            k,
            self.dims
        );
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    /// Inverse of [`Array3::index`].
    #[inline]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let nx = self.dims[0];
        let ny = self.dims[1];
        [index % nx, (index / nx) % ny, index / (nx * ny)]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize, k: usize) -> &mut T {
        let idx = self.index(i, j, k);
        &mut self.data[idx]
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Copy> Array3<T> {
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> T {
        self.data[self.index(i, j, k)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: T) {
        let idx = self.index(i, j, k);
        self.data[idx] = value;
    }

    /// Read with signed indices clamped into range.
    #[inline]
    pub fn get_clamped(&self, i: i64, j: i64, k: i64) -> T {
        let ci = i.clamp(0, self.dims[0] as i64 - 1) as usize;
        let cj = j.clamp(0, self.dims[1] as i64 - 1) as usize;
        let ck = k.clamp(0, self.dims[2] as i64 - 1) as usize;
        self.get(ci, cj, ck)
    }

    /// Read with signed indices, `None` when outside the array.
    #[inline]
    pub fn get_checked(&self, i: i64, j: i64, k: i64) -> Option<T> {
        if self.in_bounds(i, j, k) {
            Some(self.get(i as usize, j as usize, k as usize))
        } else {
            None
        }
    }
}

impl<T: Send> Array3<T> {
    /// Update every element in parallel. Each call owns exactly one slot.
    pub fn par_update<F>(&mut self, f: F)
    where
        F: Fn([usize; 3], &mut T) + Sync + Send,
    {
        let [nx, ny, _] = self.dims;
        self.data
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, value)| {
                let coords = [idx % nx, (idx / nx) % ny, idx / (nx * ny)];
                f(coords, value);
            });
    }
}
