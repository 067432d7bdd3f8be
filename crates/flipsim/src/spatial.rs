//! Particle spatial index.
//!
//! Particles are bucketed into grid cells with an intrusive linked list:
//! `cell_head` holds the first particle of every cell and `particle_next`
//! chains the rest. Rebuilding only refills the heads, no per-cell
//! allocation.
//!
//! The index is a projection of one particle slice. Rebuild it whenever that
//! slice changes, and pass the same slice to every query that reads particle
//! data through it.

use glam::Vec3;

use crate::array3::{Array3, Axis};
use crate::constants::SURFACE_OFFSET;
use crate::error::FlipError;
use crate::grid::{CellType, MacGrid};
use crate::kernels::smooth;
use crate::particle::Particle;

/// End of a cell's particle list.
const EMPTY: usize = usize::MAX;

#[derive(Clone, Debug)]
pub struct ParticleGrid {
    dims: [usize; 3],
    max_dimension: f32,
    cell_head: Array3<usize>,
    particle_next: Vec<usize>,
}

impl ParticleGrid {
    pub fn try_new(dims: [usize; 3]) -> Result<Self, FlipError> {
        Ok(Self {
            dims,
            max_dimension: dims.iter().copied().max().unwrap_or(1) as f32,
            cell_head: Array3::try_new(dims, EMPTY)?,
            particle_next: Vec::new(),
        })
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Cell containing a normalized position, clamped into the grid.
    #[inline]
    pub fn cell_of(&self, position: Vec3) -> [usize; 3] {
        let t = position * self.max_dimension;
        let mut cell = [0usize; 3];
        for a in 0..3 {
            // `as` saturates: negatives and NaN land in cell 0
            cell[a] = (t[a] as usize).min(self.dims[a] - 1);
        }
        cell
    }

    /// Re-bucket every particle. Serial; finish before any query.
    pub fn rebuild(&mut self, particles: &[Particle]) {
        self.cell_head.fill(EMPTY);
        self.particle_next.clear();
        self.particle_next.resize(particles.len(), EMPTY);

        for (idx, particle) in particles.iter().enumerate() {
            let [i, j, k] = self.cell_of(particle.position);
            let head = self.cell_head.get_mut(i, j, k);
            // Insert at head of list
            self.particle_next[idx] = *head;
            *head = idx;
        }
    }

    /// Number of particles the index was last built from.
    #[inline]
    pub fn particle_count(&self) -> usize {
        self.particle_next.len()
    }

    /// Visit particle indices in the inclusive cell range `lo..=hi`,
    /// clipped to the grid.
    fn for_each_in_range<F: FnMut(usize)>(&self, lo: [i64; 3], hi: [i64; 3], mut f: F) {
        let mut from = [0usize; 3];
        let mut to = [0usize; 3];
        for a in 0..3 {
            let max = self.dims[a] as i64 - 1;
            let l = lo[a].max(0);
            let h = hi[a].min(max);
            if l > h {
                return;
            }
            from[a] = l as usize;
            to[a] = h as usize;
        }
        for k in from[2]..=to[2] {
            for j in from[1]..=to[1] {
                for i in from[0]..=to[0] {
                    let mut p = self.cell_head.get(i, j, k);
                    while p != EMPTY {
                        f(p);
                        p = self.particle_next[p];
                    }
                }
            }
        }
    }

    /// Visit particles in the cube of cells `cell ± radius` (inclusive).
    pub fn for_each_neighbor<F: FnMut(usize)>(&self, cell: [usize; 3], radius: [usize; 3], f: F) {
        let mut lo = [0i64; 3];
        let mut hi = [0i64; 3];
        for a in 0..3 {
            lo[a] = cell[a] as i64 - radius[a] as i64;
            hi[a] = cell[a] as i64 + radius[a] as i64;
        }
        self.for_each_in_range(lo, hi, f);
    }

    /// Particle indices in the cube of cells `cell ± radius`, unsorted.
    pub fn neighbors(&self, cell: [usize; 3], radius: [usize; 3]) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_neighbor(cell, radius, |p| out.push(p));
        out
    }

    /// Visit particles around a face of `axis`.
    ///
    /// Along the face axis the cells `f - along ..= f + along - 1` are
    /// searched (the face sits between them); across it `c ± across`.
    pub fn for_each_face_neighbor<F: FnMut(usize)>(
        &self,
        axis: Axis,
        face: [usize; 3],
        along: usize,
        across: usize,
        f: F,
    ) {
        let mut lo = [0i64; 3];
        let mut hi = [0i64; 3];
        for a in 0..3 {
            let c = face[a] as i64;
            if a == axis.index() {
                lo[a] = c - along as i64;
                hi[a] = c + along as i64 - 1;
            } else {
                lo[a] = c - across as i64;
                hi[a] = c + across as i64;
            }
        }
        self.for_each_in_range(lo, hi, f);
    }

    pub fn face_neighbors(&self, axis: Axis, face: [usize; 3], along: usize, across: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_face_neighbor(axis, face, along, across, |p| out.push(p));
        out
    }

    /// Classify cells by occupancy: SOLID if any solid particle lies in the
    /// cell, else FLUID if any particle does, else AIR.
    pub fn mark_cell_types(&self, particles: &[Particle], cell_type: &mut Array3<CellType>) {
        debug_assert_eq!(cell_type.dims(), self.dims);
        cell_type.par_update(|[i, j, k], cell| {
            let mut kind = CellType::Air;
            let mut p = self.cell_head.get(i, j, k);
            while p != EMPTY {
                if particles[p].is_solid() {
                    kind = CellType::Solid;
                    break;
                }
                kind = CellType::Fluid;
                p = self.particle_next[p];
            }
            *cell = kind;
        });
    }

    /// Particle level set over cells, negative inside the liquid.
    ///
    /// Every FLUID particle within one cell of the center contributes
    /// `density * smooth(d², h)`. The sum is normalized by the packed particle
    /// count per cell `1 / density³` and offset so the surface sits at
    /// [`SURFACE_OFFSET`]. SOLID cells read as outside.
    pub fn build_level_set(
        &self,
        particles: &[Particle],
        cell_type: &Array3<CellType>,
        density: f32,
        level_set: &mut Array3<f32>,
    ) {
        debug_assert_eq!(level_set.dims(), self.dims);
        let h = 1.0 / self.max_dimension;
        let packed = 1.0 / (density * density * density);
        let max_dimension = self.max_dimension;

        level_set.par_update(|[i, j, k], value| {
            if cell_type.get(i, j, k) == CellType::Solid {
                *value = 1.0;
                return;
            }
            let center = MacGrid::cell_center(i, j, k) / max_dimension;
            let mut accumulated = 0.0f32;
            self.for_each_neighbor([i, j, k], [1, 1, 1], |n| {
                let p = &particles[n];
                if p.is_fluid() {
                    accumulated += p.density * smooth(p.position.distance_squared(center), h);
                }
            });
            *value = SURFACE_OFFSET - accumulated / packed;
        });
    }
}
