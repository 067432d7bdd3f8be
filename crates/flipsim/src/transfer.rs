//! Particle-grid transfers.
//!
//! P2G: every face gathers the sharpen-weighted average of nearby fluid
//! particle velocities.
//! G2P: particles sample the face velocities with trilinear interpolation.

use glam::Vec3;
use rayon::prelude::*;

use crate::array3::{Array3, Axis};
use crate::constants::{SPLAT_NEIGHBORHOOD, SPLAT_RADIUS};
use crate::grid::MacGrid;
use crate::kernels::sharpen;
use crate::particle::Particle;
use crate::spatial::ParticleGrid;

/// Transfer particle velocities to the face velocities of `grid` (P2G).
///
/// Weights are `mass * sharpen(d², 1.4)` with `d` in grid units. Faces with
/// no fluid particle in reach get zero. Each face is computed independently,
/// so the result does not depend on particle order beyond float rounding.
/// `index` must be built from `particles`.
pub fn splat_particles_to_grid(index: &ParticleGrid, particles: &[Particle], grid: &mut MacGrid) {
    let max_dimension = grid.max_dimension();
    let [along, across] = SPLAT_NEIGHBORHOOD;

    for axis in Axis::ALL {
        let a = axis.index();
        grid.velocity_mut(axis).par_update(|[i, j, k], u| {
            let face = MacGrid::face_position(axis, i, j, k);
            let mut sum = 0.0f32;
            let mut weight_sum = 0.0f32;
            index.for_each_face_neighbor(axis, [i, j, k], along, across, |n| {
                let p = &particles[n];
                if !p.is_fluid() {
                    return;
                }
                let d2 = (p.position * max_dimension).distance_squared(face);
                let w = p.mass * sharpen(d2, SPLAT_RADIUS);
                sum += w * p.velocity[a];
                weight_sum += w;
            });
            *u = if weight_sum > 0.0 { sum / weight_sum } else { 0.0 };
        });
    }
}

/// Overwrite every particle velocity with the grid velocity at its position (G2P).
pub fn splat_grid_to_particles(particles: &mut [Particle], grid: &MacGrid) {
    particles.par_iter_mut().for_each(|p| {
        p.velocity = interpolate_velocity(p.position, grid);
    });
}

/// Trilinear face velocity at a normalized position.
///
/// Sample coordinates are clamped into the face array, so positions outside
/// the domain read the nearest boundary values.
pub fn interpolate_velocity(position: Vec3, grid: &MacGrid) -> Vec3 {
    let t = position * grid.max_dimension();
    let mut velocity = Vec3::ZERO;
    for axis in Axis::ALL {
        // Shift so face (i, j, k) sits at integer coordinates
        let mut sample = t - Vec3::splat(0.5);
        sample[axis.index()] += 0.5;
        velocity[axis.index()] = trilinear(grid.velocity(axis), sample);
    }
    velocity
}

/// Trilinear interpolation of `field` at fractional index `p`.
pub fn trilinear(field: &Array3<f32>, p: Vec3) -> f32 {
    let dims = field.dims();
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut frac = [0.0f32; 3];
    for a in 0..3 {
        let n = dims[a];
        let x = p[a].clamp(0.0, (n - 1) as f32);
        let i0 = (x.floor() as usize).min(n.saturating_sub(2));
        lo[a] = i0;
        hi[a] = (i0 + 1).min(n - 1);
        frac[a] = x - i0 as f32;
    }
    let [fx, fy, fz] = frac;

    let c00 = lerp(field.get(lo[0], lo[1], lo[2]), field.get(hi[0], lo[1], lo[2]), fx);
    let c10 = lerp(field.get(lo[0], hi[1], lo[2]), field.get(hi[0], hi[1], lo[2]), fx);
    let c01 = lerp(field.get(lo[0], lo[1], hi[2]), field.get(hi[0], lo[1], hi[2]), fx);
    let c11 = lerp(field.get(lo[0], hi[1], hi[2]), field.get(hi[0], hi[1], hi[2]), fx);

    let c0 = lerp(c00, c10, fy);
    let c1 = lerp(c01, c11, fy);
    lerp(c0, c1, fz)
}

/// Exact on constant data: `lerp(a, a, t) == a` for every `t`.
#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
