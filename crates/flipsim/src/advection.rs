//! External forces, PIC/FLIP velocity update, advection and boundary handling.

use glam::Vec3;
use rayon::prelude::*;

use crate::array3::Array3;
use crate::constants::{REPULSION_RADIUS, STUCK_PENALTY, STUCK_THRESHOLD};
use crate::grid::{CellType, MacGrid};
use crate::particle::Particle;
use crate::scene::Scene;
use crate::spatial::ParticleGrid;
use crate::transfer::interpolate_velocity;

/// Forward-Euler velocity update `v += g * dt` on fluid particles.
pub fn apply_external_forces(particles: &mut [Particle], gravity: Vec3, dt: f32) {
    particles
        .par_iter_mut()
        .filter(|p| p.is_fluid())
        .for_each(|p| p.velocity += gravity * dt);
}

/// Blend PIC and FLIP velocities.
///
/// `previous` must hold the per-face velocity change of this step
/// (current minus the splatted grid). The FLIP estimate is the particle's
/// own velocity plus that change; the PIC estimate is the current grid
/// velocity. The result is `(1 - ratio) * pic + ratio * flip`.
pub fn solve_pic_flip(particles: &mut [Particle], grid: &MacGrid, previous: &MacGrid, ratio: f32) {
    particles.par_iter_mut().for_each(|p| {
        let flip = p.velocity + interpolate_velocity(p.position, previous);
        let pic = interpolate_velocity(p.position, grid);
        p.velocity = (1.0 - ratio) * pic + ratio * flip;
    });
}

/// Move fluid particles through the grid velocity field.
///
/// Integrates positions, rebuilds `index`, clamps fluid particles one cell
/// inside every domain face, then pushes them out of nearby solid particles.
/// A fluid particle within `1.5 * density / maxD` of a solid particle moves
/// along the solid normal (or away from the solid if the normal is zero)
/// and loses its velocity component along that direction.
pub fn advect_particles(
    particles: &mut [Particle],
    grid: &MacGrid,
    index: &mut ParticleGrid,
    dt: f32,
    density: f32,
) {
    particles
        .par_iter_mut()
        .filter(|p| p.is_fluid())
        .for_each(|p| p.position += dt * interpolate_velocity(p.position, grid));

    index.rebuild(particles);

    let max_dimension = grid.max_dimension();
    let margin = 1.0 / max_dimension;
    let dims = grid.dims();
    let lower = Vec3::splat(margin);
    let upper = Vec3::new(
        dims[0] as f32 / max_dimension - margin,
        dims[1] as f32 / max_dimension - margin,
        dims[2] as f32 / max_dimension - margin,
    );
    let re = REPULSION_RADIUS * density / max_dimension;

    let snapshot: &[Particle] = &*particles;
    let index: &ParticleGrid = index;
    let updates: Vec<(Vec3, Vec3)> = snapshot
        .par_iter()
        .map(|p| {
            if !p.is_fluid() {
                return (p.position, p.velocity);
            }
            let mut position = p.position.max(lower).min(upper);
            let mut velocity = p.velocity;
            index.for_each_neighbor(index.cell_of(position), [1, 1, 1], |n| {
                let q = &snapshot[n];
                if !q.is_solid() {
                    return;
                }
                let dist = position.distance(q.position);
                if dist >= re {
                    return;
                }
                let mut normal = q.normal;
                if normal.length() < 1.0e-7 && dist > 0.0 {
                    normal = (position - q.position) / dist;
                }
                position += (re - dist) * normal;
                velocity -= velocity.dot(normal) * normal;
            });
            (position, velocity)
        })
        .collect();

    particles
        .par_iter_mut()
        .zip(updates.par_iter())
        .for_each(|(p, &(position, velocity))| {
            p.position = position;
            p.velocity = velocity;
        });
}

/// Flag particles outside the domain or inside a SOLID cell.
///
/// Every particle gets its flag. Solid samples normally sit inside SOLID
/// cells, so the returned count covers invalid fluid particles only.
pub fn mark_invalid(particles: &mut [Particle], cell_type: &Array3<CellType>, max_dimension: f32) -> usize {
    let dims = cell_type.dims();
    let extent = Vec3::new(dims[0] as f32, dims[1] as f32, dims[2] as f32);
    particles
        .par_iter_mut()
        .map(|p| {
            let t = p.position * max_dimension;
            let outside = t.cmplt(Vec3::ZERO).any() || t.cmpgt(extent).any();
            let in_solid = cell_type.get_clamped(t.x as i64, t.y as i64, t.z as i64) == CellType::Solid;
            p.invalid = outside || in_solid;
            (p.invalid && p.is_fluid()) as usize
        })
        .sum()
}

/// Project invalid fluid particles onto the solid surface.
///
/// Particles moved by more than a tiny distance get a velocity proportional
/// to the displacement, pushing them away from the wall. Returns how many
/// particles were moved.
pub fn project_stuck_particles(particles: &mut [Particle], scene: &dyn Scene, max_dimension: f32) -> usize {
    let stuck: Vec<usize> = particles
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_fluid() && p.invalid)
        .map(|(i, _)| i)
        .collect();
    if stuck.is_empty() {
        return 0;
    }

    let original: Vec<Vec3> = stuck
        .iter()
        .map(|&i| particles[i].position * max_dimension)
        .collect();
    let mut projected = original.clone();
    scene.project_points_to_solid_surface(&mut projected);

    let mut moved = 0;
    for ((&i, &from), &to) in stuck.iter().zip(&original).zip(&projected) {
        let displacement = to - from;
        if displacement.length() > STUCK_THRESHOLD {
            let p = &mut particles[i];
            p.position = to / max_dimension;
            p.velocity = displacement * STUCK_PENALTY;
            moved += 1;
        }
    }
    moved
}
