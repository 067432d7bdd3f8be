//! 3D MAC (Marker-and-Cell) staggered grid.
//!
//! Velocity components live on cell faces, everything else at cell centers.
//! Positions handed to the grid are in grid units (cell width 1):
//! - x-velocity at (i, j + 0.5, k + 0.5)
//! - y-velocity at (i + 0.5, j, k + 0.5)
//! - z-velocity at (i + 0.5, j + 0.5, k)

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::array3::{Array3, Axis};
use crate::error::FlipError;

/// Cell classification for the pressure solve.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum CellType {
    /// Contains a solid particle (no flow)
    Solid,
    /// Contains liquid particles
    Fluid,
    /// Empty
    #[default]
    Air,
}

/// Staggered velocity field plus the cell-centered solve state.
#[derive(Clone, Debug)]
pub struct MacGrid {
    dims: [usize; 3],
    /// Face velocities indexed by `Axis::index()`.
    pub velocity: [Array3<f32>; 3],
    pub cell_type: Array3<CellType>,
    pub divergence: Array3<f32>,
    pub pressure: Array3<f32>,
    /// Particle level set, negative inside the liquid.
    pub level_set: Array3<f32>,
}

impl MacGrid {
    pub fn try_new(dims: [usize; 3]) -> Result<Self, FlipError> {
        if dims.iter().any(|&n| n == 0) {
            return Err(FlipError::InvalidConfig(format!(
                "grid dimensions must be non-zero, got {:?}",
                dims
            )));
        }
        Ok(Self {
            dims,
            velocity: [
                Array3::try_face(Axis::X, dims, 0.0)?,
                Array3::try_face(Axis::Y, dims, 0.0)?,
                Array3::try_face(Axis::Z, dims, 0.0)?,
            ],
            cell_type: Array3::try_new(dims, CellType::Air)?,
            divergence: Array3::try_new(dims, 0.0)?,
            pressure: Array3::try_new(dims, 0.0)?,
            level_set: Array3::try_new(dims, 1.0)?,
        })
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Largest resolution; normalized positions are divided by it.
    #[inline]
    pub fn max_dimension(&self) -> f32 {
        self.dims.iter().copied().max().unwrap_or(1) as f32
    }

    /// Cell width in normalized units.
    #[inline]
    pub fn cell_width(&self) -> f32 {
        1.0 / self.max_dimension()
    }

    #[inline]
    pub fn velocity(&self, axis: Axis) -> &Array3<f32> {
        &self.velocity[axis.index()]
    }

    #[inline]
    pub fn velocity_mut(&mut self, axis: Axis) -> &mut Array3<f32> {
        &mut self.velocity[axis.index()]
    }

    /// Position of a velocity sample in grid units.
    #[inline]
    pub fn face_position(axis: Axis, i: usize, j: usize, k: usize) -> Vec3 {
        let mut pos = Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5);
        pos[axis.index()] -= 0.5;
        pos
    }

    /// Cell center in grid units.
    #[inline]
    pub fn cell_center(i: usize, j: usize, k: usize) -> Vec3 {
        Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5)
    }

    /// Cell type at signed indices, `None` outside the domain.
    #[inline]
    pub fn cell_type_at(&self, i: i64, j: i64, k: i64) -> Option<CellType> {
        self.cell_type.get_checked(i, j, k)
    }

    /// Number of cells currently marked `kind`.
    pub fn count_cells(&self, kind: CellType) -> usize {
        self.cell_type
            .as_slice()
            .par_iter()
            .filter(|&&c| c == kind)
            .count()
    }

    /// Copy this grid's face velocities into `previous`.
    pub fn store_velocities(&self, previous: &mut MacGrid) {
        for axis in Axis::ALL {
            previous
                .velocity_mut(axis)
                .copy_from(self.velocity(axis));
        }
    }

    /// Replace `previous` with `self - previous`, the per-face velocity change.
    pub fn subtract_previous(&self, previous: &mut MacGrid) {
        for axis in Axis::ALL {
            let current = self.velocity(axis).as_slice();
            previous
                .velocity_mut(axis)
                .as_mut_slice()
                .par_iter_mut()
                .zip(current.par_iter())
                .for_each(|(old, &new)| *old = new - *old);
        }
    }

    /// Zero the outer boundary faces and every face between a SOLID and a
    /// non-SOLID cell.
    ///
    /// Faces between two SOLID cells are left for extrapolation.
    pub fn enforce_boundary_velocity(&mut self) {
        let MacGrid {
            dims,
            velocity,
            cell_type,
            ..
        } = self;
        let dims = *dims;
        let cell_type = &*cell_type;
        for axis in Axis::ALL {
            let a = axis.index();
            velocity[a].par_update(|face, u| {
                if face[a] == 0 || face[a] == dims[a] {
                    *u = 0.0;
                    return;
                }
                let mut back = face;
                back[a] -= 1;
                let back_solid = cell_type.get(back[0], back[1], back[2]) == CellType::Solid;
                let front_solid = cell_type.get(face[0], face[1], face[2]) == CellType::Solid;
                if back_solid != front_solid {
                    *u = 0.0;
                }
            });
        }
    }
}
