//! Particle-grid transfer tests
//!
//! Constant fields must survive interpolation exactly, and a uniformly
//! moving particle block must splat to, and read back, the same velocity.

use flipsim::transfer::{interpolate_velocity, splat_grid_to_particles, splat_particles_to_grid};
use flipsim::{Axis, MacGrid, Particle, ParticleGrid, Vec3};
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Particles on a `spacing`-cell lattice filling the whole domain.
fn lattice(dims: [usize; 3], spacing: f32, velocity: Vec3) -> Vec<Particle> {
    let max_dimension = dims.iter().copied().max().unwrap() as f32;
    let counts = dims.map(|n| (n as f32 / spacing) as usize);
    let mut particles = Vec::new();
    for k in 0..counts[2] {
        for j in 0..counts[1] {
            for i in 0..counts[0] {
                let p = (Vec3::new(i as f32, j as f32, k as f32) + Vec3::splat(0.5)) * spacing;
                particles.push(Particle::fluid(p / max_dimension, velocity));
            }
        }
    }
    particles
}

proptest! {
    /// Test that a constant field interpolates to itself anywhere
    #[test]
    fn prop_constant_field_interpolates_exactly(
        ux in -50.0f32..50.0,
        uy in -50.0f32..50.0,
        uz in -50.0f32..50.0,
        x in 0.0f32..1.0,
        y in 0.0f32..0.75,
        z in 0.0f32..0.5,
    ) {
        let mut grid = MacGrid::try_new([8, 6, 4]).unwrap();
        grid.velocity_mut(Axis::X).fill(ux);
        grid.velocity_mut(Axis::Y).fill(uy);
        grid.velocity_mut(Axis::Z).fill(uz);

        let v = interpolate_velocity(Vec3::new(x, y, z), &grid);
        prop_assert_eq!(v, Vec3::new(ux, uy, uz));
    }

    /// Test that reads far outside the domain stay finite
    #[test]
    fn prop_out_of_domain_reads_stay_finite(
        x in -2.0f32..3.0,
        y in -2.0f32..3.0,
        z in -2.0f32..3.0,
    ) {
        let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
        grid.velocity_mut(Axis::Y).fill(-1.5);
        let v = interpolate_velocity(Vec3::new(x, y, z), &grid);
        prop_assert_eq!(v, Vec3::new(0.0, -1.5, 0.0));
    }
}

/// Test that a uniform block survives P2G then G2P
#[test]
fn test_uniform_block_round_trips() {
    let dims = [8, 8, 8];
    let velocity = Vec3::new(0.75, -2.0, 1.25);
    let mut particles = lattice(dims, 0.5, velocity);
    let mut index = ParticleGrid::try_new(dims).unwrap();
    index.rebuild(&particles);

    let mut grid = MacGrid::try_new(dims).unwrap();
    splat_particles_to_grid(&index, &particles, &mut grid);
    for axis in Axis::ALL {
        let expected = velocity[axis.index()];
        for &u in grid.velocity(axis).as_slice() {
            assert!((u - expected).abs() < 1e-5, "{:?} face {} != {}", axis, u, expected);
        }
    }

    for p in particles.iter_mut() {
        p.velocity = Vec3::ZERO;
    }
    splat_grid_to_particles(&mut particles, &grid);
    for p in &particles {
        assert!(p.velocity.abs_diff_eq(velocity, 1e-5), "{:?}", p.velocity);
    }
}

/// Test that splat results do not depend on particle order
#[test]
fn test_splat_independent_of_particle_order() {
    let dims = [8, 8, 8];
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut particles: Vec<Particle> = (0..600)
        .map(|_| {
            let position = Vec3::new(
                rng.gen_range(0.1..0.9),
                rng.gen_range(0.1..0.9),
                rng.gen_range(0.1..0.9),
            );
            let velocity = Vec3::new(
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-3.0..3.0),
            );
            Particle::fluid(position, velocity)
        })
        .collect();

    let splat = |particles: &[Particle]| {
        let mut index = ParticleGrid::try_new(dims).unwrap();
        index.rebuild(particles);
        let mut grid = MacGrid::try_new(dims).unwrap();
        splat_particles_to_grid(&index, particles, &mut grid);
        grid
    };

    let first = splat(&particles);
    particles.shuffle(&mut rng);
    let second = splat(&particles);

    for axis in Axis::ALL {
        let a = first.velocity(axis).as_slice();
        let b = second.velocity(axis).as_slice();
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{:?}: {} vs {}", axis, x, y);
        }
    }
}

/// Test that faces with no particle in reach are zero
#[test]
fn test_empty_faces_are_zero() {
    let dims = [8, 8, 8];
    let particles = vec![Particle::fluid(Vec3::splat(0.1), Vec3::splat(5.0))];
    let mut index = ParticleGrid::try_new(dims).unwrap();
    index.rebuild(&particles);
    let mut grid = MacGrid::try_new(dims).unwrap();
    grid.velocity_mut(Axis::X).fill(9.0);
    splat_particles_to_grid(&index, &particles, &mut grid);

    assert_eq!(grid.velocity(Axis::X).get(7, 7, 7), 0.0);
    assert!((grid.velocity(Axis::X).get(1, 0, 0) - 5.0).abs() < 1e-5);
}
