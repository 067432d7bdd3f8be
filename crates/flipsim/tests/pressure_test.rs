//! Pressure projection tests
//!
//! Projection must leave FLUID cells divergence-free, both in a closed tank
//! with a free surface and with subcell surface handling switched off.
//! Extrapolation into walls must be a fixed point.

use flipsim::extrapolation::extrapolate_velocity;
use flipsim::pressure::{compute_divergence, solve_pressure, subtract_pressure_gradient};
use flipsim::{Axis, CellType, MacGrid, PressureSettings};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const N: usize = 10;

/// Solid floor and side walls, liquid up to `surface`, air above.
fn tank(surface: usize, seed: u64) -> MacGrid {
    let mut grid = MacGrid::try_new([N, N, N]).unwrap();
    for k in 0..N {
        for j in 0..N {
            for i in 0..N {
                let wall = i == 0 || i == N - 1 || k == 0 || k == N - 1 || j == 0;
                let (kind, level) = if wall {
                    (CellType::Solid, 1.0)
                } else if j < surface {
                    (CellType::Fluid, -0.5)
                } else {
                    (CellType::Air, 0.5)
                };
                grid.cell_type.set(i, j, k, kind);
                grid.level_set.set(i, j, k, level);
            }
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for axis in Axis::ALL {
        for u in grid.velocity_mut(axis).as_mut_slice() {
            *u = rng.gen_range(-1.0..1.0);
        }
    }
    grid.enforce_boundary_velocity();
    grid
}

fn max_fluid_divergence(grid: &MacGrid) -> f32 {
    let mut worst = 0.0f32;
    for (idx, &d) in grid.divergence.as_slice().iter().enumerate() {
        if grid.cell_type.as_slice()[idx] == CellType::Fluid {
            worst = worst.max(d.abs());
        }
    }
    worst
}

fn project(grid: &mut MacGrid, settings: &PressureSettings) -> (f32, f32) {
    compute_divergence(grid);
    let before = max_fluid_divergence(grid);
    let stats = solve_pressure(grid, settings).unwrap();
    assert!(stats.converged, "solve did not converge: {:?}", stats);
    subtract_pressure_gradient(grid, settings.subcell);
    grid.enforce_boundary_velocity();
    compute_divergence(grid);
    (before, max_fluid_divergence(grid))
}

/// Test that projection leaves a tank divergence free with subcell
#[test]
fn test_projection_is_divergence_free_in_tank() {
    let settings = PressureSettings {
        subcell: true,
        tolerance: 1.0e-6,
        max_iterations: 1000,
    };
    for seed in [1, 2, 3] {
        let mut grid = tank(6, seed);
        let (before, after) = project(&mut grid, &settings);
        assert!(before > 1.0, "seed {} had no divergence to remove", seed);
        assert!(
            after < before * 1.0e-3,
            "seed {}: divergence {} -> {}",
            seed,
            before,
            after
        );
    }
}

/// Test that projection leaves a tank divergence free without subcell
#[test]
fn test_projection_without_subcell() {
    let settings = PressureSettings {
        subcell: false,
        tolerance: 1.0e-6,
        max_iterations: 1000,
    };
    let mut grid = tank(5, 11);
    let (before, after) = project(&mut grid, &settings);
    assert!(after < before * 1.0e-3, "divergence {} -> {}", before, after);
}

/// Test that non-fluid cells keep zero pressure
#[test]
fn test_pressure_is_zero_outside_fluid() {
    let mut grid = tank(6, 5);
    compute_divergence(&mut grid);
    solve_pressure(&mut grid, &PressureSettings::default()).unwrap();
    for (idx, &p) in grid.pressure.as_slice().iter().enumerate() {
        if grid.cell_type.as_slice()[idx] != CellType::Fluid {
            assert_eq!(p, 0.0);
        }
    }
}

/// Test that hitting the iteration cap is reported
#[test]
fn test_iteration_cap_reports_unconverged() {
    let mut grid = tank(6, 9);
    compute_divergence(&mut grid);
    let settings = PressureSettings {
        subcell: true,
        tolerance: 1.0e-12,
        max_iterations: 2,
    };
    let stats = solve_pressure(&mut grid, &settings).unwrap();
    assert!(!stats.converged);
    assert_eq!(stats.iterations, 2);
    assert!(grid.pressure.as_slice().iter().all(|p| p.is_finite()));
}

/// Test that a second extrapolation changes nothing
#[test]
fn test_extrapolation_is_idempotent() {
    let settings = PressureSettings {
        subcell: true,
        tolerance: 1.0e-5,
        max_iterations: 500,
    };
    let mut grid = tank(6, 21);
    project(&mut grid, &settings);

    extrapolate_velocity(&mut grid);
    let once = grid.clone();
    extrapolate_velocity(&mut grid);
    for axis in Axis::ALL {
        assert_eq!(grid.velocity(axis).as_slice(), once.velocity(axis).as_slice());
    }
}

/// Test that store then subtract with no change gives zero
#[test]
fn test_store_then_subtract_is_zero() {
    let grid = tank(6, 33);
    let mut previous = MacGrid::try_new([N, N, N]).unwrap();
    grid.store_velocities(&mut previous);
    grid.subtract_previous(&mut previous);
    for axis in Axis::ALL {
        assert!(previous.velocity(axis).as_slice().iter().all(|&d| d == 0.0));
    }
}
