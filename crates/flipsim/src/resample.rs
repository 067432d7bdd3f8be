//! Particle resampler.
//!
//! Spreads clumped fluid particles apart with a short-range spring and then
//! re-gathers their velocities from the moved neighborhood. Run after
//! advection, before invalid particles are flagged.

use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use crate::constants::{
    RESAMPLE_FLUID_JITTER, RESAMPLE_MIN_SEPARATION, RESAMPLE_SOLID_PUSH, RESAMPLE_STIFFNESS,
};
use crate::kernels::{sharpen, smooth};
use crate::particle::Particle;
use crate::spatial::ParticleGrid;

/// Deterministic per-particle generator, independent of thread scheduling.
fn particle_rng(seed: u64, frame: u32, index: usize) -> StdRng {
    let mixed = seed
        ^ (frame as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    StdRng::seed_from_u64(mixed)
}

fn random_direction(rng: &mut StdRng) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let len2 = v.length_squared();
        if len2 > 1.0e-6 && len2 <= 1.0 {
            return v / len2.sqrt();
        }
    }
}

/// Push fluid particles apart and re-gather their velocities.
///
/// `re` is the particle spacing in normalized units. `index` must be built
/// from `particles`; it is rebuilt from the moved positions before the
/// velocity pass and stays valid on return.
pub fn resample_particles(
    index: &mut ParticleGrid,
    particles: &mut [Particle],
    dt: f32,
    re: f32,
    seed: u64,
    frame: u32,
) {
    if dt <= 0.0 || re <= 0.0 || particles.is_empty() {
        return;
    }

    let snapshot: &[Particle] = &*particles;
    let grid: &ParticleGrid = index;
    let positions: Vec<Vec3> = snapshot
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            if !p.is_fluid() {
                return p.position;
            }
            let mut spring = Vec3::ZERO;
            let mut rng: Option<StdRng> = None;
            grid.for_each_neighbor(grid.cell_of(p.position), [1, 1, 1], |n| {
                if n == i {
                    return;
                }
                let q = &snapshot[n];
                let dist = p.position.distance(q.position);
                let weight = RESAMPLE_STIFFNESS * q.mass * smooth(dist * dist, re);
                if dist > RESAMPLE_MIN_SEPARATION * re {
                    spring += weight * (p.position - q.position) / dist * re;
                } else if q.is_fluid() {
                    let rng = rng.get_or_insert_with(|| particle_rng(seed, frame, i));
                    let magnitude = rng.gen_range(0.0f32..=1.0) * RESAMPLE_FLUID_JITTER * re / dt;
                    spring += magnitude * random_direction(rng);
                } else {
                    spring += RESAMPLE_SOLID_PUSH * re / dt * q.normal;
                }
            });
            p.position + dt * spring
        })
        .collect();

    particles
        .par_iter_mut()
        .zip(positions.par_iter())
        .for_each(|(p, &position)| p.position = position);

    index.rebuild(particles);

    let snapshot: &[Particle] = &*particles;
    let grid: &ParticleGrid = index;
    let velocities: Vec<Vec3> = snapshot
        .par_iter()
        .map(|p| {
            if !p.is_fluid() {
                return p.velocity;
            }
            let mut weight_sum = 0.0f32;
            let mut velocity = Vec3::ZERO;
            grid.for_each_neighbor(grid.cell_of(p.position), [1, 1, 1], |n| {
                let q = &snapshot[n];
                if !q.is_fluid() {
                    return;
                }
                let w = q.mass * sharpen(p.position.distance_squared(q.position), re);
                velocity += w * q.velocity;
                weight_sum += w;
            });
            if weight_sum > 0.0 {
                velocity / weight_sum
            } else {
                p.velocity
            }
        })
        .collect();

    particles
        .par_iter_mut()
        .zip(velocities.par_iter())
        .for_each(|(p, &velocity)| p.velocity = velocity);

    log::trace!("Resampled {} particles", particles.len());
}
