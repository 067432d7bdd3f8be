//! Per-particle density estimate.
//!
//! Density is a kernel sum over fluid neighbors divided by a calibration
//! constant, so a fully packed region reads about 1.0.

use glam::Vec3;
use rayon::prelude::*;

use crate::constants::CALIBRATION_BLOCK;
use crate::error::FlipError;
use crate::kernels::smooth;
use crate::particle::Particle;
use crate::spatial::ParticleGrid;

/// Kernel support of the density sum, in normalized units.
#[inline]
pub fn density_radius(density: f32, max_dimension: f32) -> f32 {
    4.0 * density / max_dimension
}

/// Recompute `particle.density` for every particle.
///
/// Fluid particles sum `mass * smooth(d², 4 * density / maxD)` over non-solid
/// neighbors in the surrounding 3x3x3 cells and divide by `max_density`.
/// Solid particles always read 1.0. `index` must be built from `particles`.
pub fn compute_density(
    index: &ParticleGrid,
    particles: &mut [Particle],
    density: f32,
    max_dimension: f32,
    max_density: f32,
) {
    let radius = density_radius(density, max_dimension);
    let normalizer = if max_density > 0.0 { max_density } else { 1.0 };

    let snapshot: &[Particle] = &*particles;
    let densities: Vec<f32> = snapshot
        .par_iter()
        .map(|p| {
            if p.is_solid() {
                return 1.0;
            }
            let mut weight_sum = 0.0f32;
            index.for_each_neighbor(index.cell_of(p.position), [1, 1, 1], |n| {
                let q = &snapshot[n];
                if !q.is_solid() {
                    weight_sum += q.mass * smooth(q.position.distance_squared(p.position), radius);
                }
            });
            weight_sum / normalizer
        })
        .collect();

    particles
        .par_iter_mut()
        .zip(densities.par_iter())
        .for_each(|(p, &d)| p.density = d);
}

/// Unit-mass particle block used for calibration, on the seeding lattice.
pub fn calibration_block(density: f32, max_dimension: f32) -> Vec<Particle> {
    let spacing = density / max_dimension;
    let n = CALIBRATION_BLOCK;
    let mut block = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let position = (Vec3::new(i as f32, j as f32, k as f32) + Vec3::splat(0.5)) * spacing;
                block.push(Particle::fluid(position, Vec3::ZERO));
            }
        }
    }
    block
}

/// Peak raw density of the calibration block.
///
/// The block is measured with a normalizer of 1, so dividing later densities
/// by the result maps the packed interior to 1.0.
pub fn calibrate_max_density(dims: [usize; 3], density: f32) -> Result<f32, FlipError> {
    let max_dimension = dims.iter().copied().max().unwrap_or(1) as f32;
    let mut block = calibration_block(density, max_dimension);
    let mut index = ParticleGrid::try_new(dims)?;
    index.rebuild(&block);
    compute_density(&index, &mut block, density, max_dimension, 1.0);

    let peak = block.iter().map(|p| p.density).fold(0.0f32, f32::max);
    log::info!("Calibrated max density {:.4} over {} particles", peak, block.len());
    Ok(peak)
}
