//! Velocity extrapolation into wall faces.
//!
//! A face is valid when at least one adjacent cell is FLUID. Invalid faces
//! with SOLID or the domain edge on both sides take the average of their
//! valid axis-aligned neighbors. Only valid faces are read, so one pass is
//! final and running it again changes nothing.

use crate::array3::{Array3, Axis};
use crate::grid::{CellType, MacGrid};

/// Classification of one face from its two adjacent cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceClass {
    pub valid: bool,
    pub wall: bool,
}

/// Classify the face at `face` of `axis`. Missing cells (outside the domain)
/// count as walls.
pub fn classify_face(cell_type: &Array3<CellType>, axis: Axis, face: [usize; 3]) -> FaceClass {
    let a = axis.index();
    let front = if face[a] < cell_type.dims()[a] {
        Some(cell_type.get(face[0], face[1], face[2]))
    } else {
        None
    };
    let back = if face[a] > 0 {
        let mut b = face;
        b[a] -= 1;
        Some(cell_type.get(b[0], b[1], b[2]))
    } else {
        None
    };

    let is_fluid = |c: Option<CellType>| c == Some(CellType::Fluid);
    let is_wall = |c: Option<CellType>| matches!(c, None | Some(CellType::Solid));
    FaceClass {
        valid: is_fluid(back) || is_fluid(front),
        wall: is_wall(back) && is_wall(front),
    }
}

/// Fill every invalid wall face with the mean of its valid neighbors.
/// Faces without a valid neighbor keep their value.
pub fn extrapolate_velocity(grid: &mut MacGrid) {
    let MacGrid {
        velocity,
        cell_type,
        ..
    } = grid;
    let cell_type = &*cell_type;

    for axis in Axis::ALL {
        let field = &mut velocity[axis.index()];
        let dims = field.dims();

        let mut valid = Array3::new(dims, false);
        valid.par_update(|face, v| *v = classify_face(cell_type, axis, face).valid);
        let source = field.clone();

        field.par_update(|face, u| {
            let class = classify_face(cell_type, axis, face);
            if class.valid || !class.wall {
                return;
            }
            let mut sum = 0.0f32;
            let mut count = 0u32;
            for a in 0..3 {
                for step in [-1i64, 1] {
                    let mut n = [face[0] as i64, face[1] as i64, face[2] as i64];
                    n[a] += step;
                    if valid.get_checked(n[0], n[1], n[2]) == Some(true) {
                        sum += source.get(n[0] as usize, n[1] as usize, n[2] as usize);
                        count += 1;
                    }
                }
            }
            if count > 0 {
                *u = sum / count as f32;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test face classification next to fluid and solid cells
    #[test]
    fn test_classify_face() {
        let mut cells = Array3::new([3, 3, 3], CellType::Air);
        cells.set(1, 1, 1, CellType::Fluid);
        cells.set(0, 0, 0, CellType::Solid);
        cells.set(1, 0, 0, CellType::Solid);

        let fluid_face = classify_face(&cells, Axis::X, [1, 1, 1]);
        assert!(fluid_face.valid && !fluid_face.wall);
        // Boundary face of a solid cell: both sides are walls
        let edge = classify_face(&cells, Axis::X, [0, 0, 0]);
        assert!(!edge.valid && edge.wall);
        let between = classify_face(&cells, Axis::X, [1, 0, 0]);
        assert!(!between.valid && between.wall);
        let air = classify_face(&cells, Axis::X, [2, 2, 2]);
        assert!(!air.valid && !air.wall);
    }

    /// Test that a wall face takes the average of its valid neighbors
    #[test]
    fn test_fills_wall_face_from_fluid_neighbors() {
        let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
        grid.cell_type.fill(CellType::Fluid);
        for j in 0..4 {
            for i in 0..4 {
                grid.cell_type.set(i, j, 0, CellType::Solid);
            }
        }
        // y-faces between solid cells in the k = 0 layer neighbor fluid-side
        // faces at k = 1
        grid.velocity_mut(Axis::Y).fill(2.0);
        grid.velocity_mut(Axis::Y).set(1, 2, 0, 0.0);
        extrapolate_velocity(&mut grid);
        assert!((grid.velocity(Axis::Y).get(1, 2, 0) - 2.0).abs() < 1e-6);
    }

    /// Test that wall faces with no valid neighbor keep their value
    #[test]
    fn test_faces_without_valid_neighbors_unchanged() {
        let mut grid = MacGrid::try_new([3, 3, 3]).unwrap();
        grid.cell_type.fill(CellType::Solid);
        grid.velocity_mut(Axis::Z).fill(7.0);
        extrapolate_velocity(&mut grid);
        assert!(grid.velocity(Axis::Z).as_slice().iter().all(|&w| w == 7.0));
    }
}
