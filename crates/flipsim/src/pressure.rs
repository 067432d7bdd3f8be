//! Pressure projection for incompressible flow.
//!
//! The Poisson system has one unknown per FLUID cell. AIR neighbors are
//! Dirichlet (zero or ghost pressure), SOLID and out-of-domain neighbors are
//! Neumann. With `subcell` on, an AIR neighbor across the liquid surface gets
//! the ghost pressure `L_air / L_liquid * p` so the surface is resolved inside
//! the cell. The system is solved with MIC(0)-preconditioned conjugate
//! gradient in f64.

use rayon::prelude::*;

use crate::array3::Axis;
use crate::constants::{LEVEL_SET_EPSILON, MIC_SIGMA, MIC_TAU};
use crate::error::FlipError;
use crate::grid::{CellType, MacGrid};
use crate::particle::Particle;
use crate::spatial::ParticleGrid;

/// Knobs of one projection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PressureSettings {
    pub subcell: bool,
    /// Stop once `|r|_inf <= tolerance * |b|_inf`.
    pub tolerance: f32,
    pub max_iterations: usize,
}

impl Default for PressureSettings {
    fn default() -> Self {
        Self {
            subcell: true,
            tolerance: 1.0e-4,
            max_iterations: 200,
        }
    }
}

/// Outcome of a pressure solve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    /// Final residual infinity norm.
    pub residual: f64,
    pub converged: bool,
}

/// Ghost pressure ratio across the liquid surface.
///
/// `Some(L_air / min(L_liquid, -eps))` when the liquid-side value is inside
/// and the air-side value is outside, `None` otherwise (plain zero pressure).
#[inline]
pub fn ghost_ratio(liquid: f32, air: f32) -> Option<f32> {
    if liquid < 0.0 && air > 0.0 {
        Some(air / liquid.min(-LEVEL_SET_EPSILON))
    } else {
        None
    }
}

/// Cell divergence `sum(u[+1] - u[0]) / h` for FLUID cells; zero elsewhere.
pub fn compute_divergence(grid: &mut MacGrid) {
    let scale = grid.max_dimension();
    let MacGrid {
        velocity,
        cell_type,
        divergence,
        ..
    } = grid;
    let [u, v, w] = &*velocity;
    let cell_type = &*cell_type;

    divergence.par_update(|[i, j, k], div| {
        if cell_type.get(i, j, k) != CellType::Fluid {
            *div = 0.0;
            return;
        }
        let du = u.get(i + 1, j, k) - u.get(i, j, k);
        let dv = v.get(i, j + 1, k) - v.get(i, j, k);
        let dw = w.get(i, j, k + 1) - w.get(i, j, k);
        *div = (du + dv + dw) * scale;
    });
}

/// Matrix, preconditioner and CG work vectors over the full cell grid.
///
/// Entries of non-FLUID cells stay zero. `plus_*[idx]` couples cell `idx`
/// with its +x/+y/+z neighbor.
#[derive(Clone, Debug)]
pub struct PressureSolver {
    dims: [usize; 3],
    fluid: Vec<bool>,
    diag: Vec<f64>,
    plus_x: Vec<f64>,
    plus_y: Vec<f64>,
    plus_z: Vec<f64>,
    precon: Vec<f64>,
    rhs: Vec<f64>,
    pressure: Vec<f64>,
    residual: Vec<f64>,
    aux: Vec<f64>,
    search: Vec<f64>,
}

fn try_zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>, FlipError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| FlipError::Allocation { cells: len })?;
    v.resize(len, T::default());
    Ok(v)
}

impl PressureSolver {
    pub fn try_new(dims: [usize; 3]) -> Result<Self, FlipError> {
        let n = dims[0] * dims[1] * dims[2];
        Ok(Self {
            dims,
            fluid: try_zeroed(n)?,
            diag: try_zeroed(n)?,
            plus_x: try_zeroed(n)?,
            plus_y: try_zeroed(n)?,
            plus_z: try_zeroed(n)?,
            precon: try_zeroed(n)?,
            rhs: try_zeroed(n)?,
            pressure: try_zeroed(n)?,
            residual: try_zeroed(n)?,
            aux: try_zeroed(n)?,
            search: try_zeroed(n)?,
        })
    }

    #[inline]
    fn strides(&self) -> [usize; 3] {
        [1, self.dims[0], self.dims[0] * self.dims[1]]
    }

    /// Solve for `grid.pressure` from `grid.divergence`, `grid.cell_type` and
    /// `grid.level_set`. Non-FLUID cells get zero pressure.
    ///
    /// Fails without touching `grid` when its shape differs from the one
    /// the solver was built for.
    pub fn solve(
        &mut self,
        grid: &mut MacGrid,
        settings: &PressureSettings,
    ) -> Result<SolveStats, FlipError> {
        if grid.dims() != self.dims {
            return Err(FlipError::ShapeMismatch {
                expected: self.dims,
                found: grid.dims(),
            });
        }
        let h = grid.cell_width() as f64;

        self.assemble(grid, settings.subcell, h);
        self.build_preconditioner();
        let stats = self.conjugate_gradient(settings);

        grid.pressure
            .as_mut_slice()
            .par_iter_mut()
            .zip(self.pressure.par_iter())
            .for_each(|(out, &p)| *out = p as f32);
        Ok(stats)
    }

    fn assemble(&mut self, grid: &MacGrid, subcell: bool, h: f64) {
        let cell_type = &grid.cell_type;
        let level_set = &grid.level_set;
        let divergence = &grid.divergence;

        self.fluid
            .par_iter_mut()
            .zip(self.rhs.par_iter_mut())
            .enumerate()
            .for_each(|(idx, (fluid, rhs))| {
                let [i, j, k] = cell_type.coords(idx);
                *fluid = cell_type.get(i, j, k) == CellType::Fluid;
                *rhs = if *fluid {
                    -h * h * divergence.get(i, j, k) as f64
                } else {
                    0.0
                };
            });

        self.diag
            .par_iter_mut()
            .zip(self.plus_x.par_iter_mut())
            .zip(self.plus_y.par_iter_mut())
            .zip(self.plus_z.par_iter_mut())
            .enumerate()
            .for_each(|(idx, (((diag, px), py), pz))| {
                *diag = 0.0;
                *px = 0.0;
                *py = 0.0;
                *pz = 0.0;
                let [i, j, k] = cell_type.coords(idx);
                if cell_type.get(i, j, k) != CellType::Fluid {
                    return;
                }
                let here = level_set.get(i, j, k);
                for axis in Axis::ALL {
                    let a = axis.index();
                    for step in [-1i64, 1] {
                        let mut q = [i as i64, j as i64, k as i64];
                        q[a] += step;
                        let Some(kind) = cell_type.get_checked(q[0], q[1], q[2]) else {
                            continue;
                        };
                        match kind {
                            CellType::Solid => {}
                            CellType::Fluid => {
                                *diag += 1.0;
                                if step > 0 {
                                    let off = match axis {
                                        Axis::X => &mut *px,
                                        Axis::Y => &mut *py,
                                        Axis::Z => &mut *pz,
                                    };
                                    *off = -1.0;
                                }
                            }
                            CellType::Air => {
                                let there = level_set.get(q[0] as usize, q[1] as usize, q[2] as usize);
                                let theta = if subcell {
                                    ghost_ratio(here, there).unwrap_or(0.0)
                                } else {
                                    0.0
                                };
                                *diag += 1.0 - theta as f64;
                            }
                        }
                    }
                }
            });
    }

    /// Modified incomplete Cholesky, level zero. Sequential sweep.
    fn build_preconditioner(&mut self) {
        let [nx, ny, nz] = self.dims;
        let [_, sy, sz] = self.strides();
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let idx = i + j * sy + k * sz;
                    if !self.fluid[idx] || self.diag[idx] <= 0.0 {
                        self.precon[idx] = 0.0;
                        continue;
                    }
                    let mut e = self.diag[idx];
                    if i > 0 {
                        let n = idx - 1;
                        let a = self.plus_x[n] * self.precon[n];
                        e -= a * a + MIC_TAU * a * (self.plus_y[n] + self.plus_z[n]) * self.precon[n];
                    }
                    if j > 0 {
                        let n = idx - sy;
                        let a = self.plus_y[n] * self.precon[n];
                        e -= a * a + MIC_TAU * a * (self.plus_x[n] + self.plus_z[n]) * self.precon[n];
                    }
                    if k > 0 {
                        let n = idx - sz;
                        let a = self.plus_z[n] * self.precon[n];
                        e -= a * a + MIC_TAU * a * (self.plus_x[n] + self.plus_y[n]) * self.precon[n];
                    }
                    if e < MIC_SIGMA * self.diag[idx] {
                        e = self.diag[idx];
                    }
                    self.precon[idx] = 1.0 / e.sqrt();
                }
            }
        }
    }

    /// `aux = M^-1 residual` by forward then backward substitution.
    fn apply_preconditioner(&mut self) {
        let [nx, ny, nz] = self.dims;
        let [_, sy, sz] = self.strides();
        let Self {
            fluid,
            plus_x,
            plus_y,
            plus_z,
            precon,
            residual,
            aux,
            ..
        } = self;

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let idx = i + j * sy + k * sz;
                    if !fluid[idx] {
                        aux[idx] = 0.0;
                        continue;
                    }
                    let mut t = residual[idx];
                    if i > 0 {
                        let n = idx - 1;
                        t -= plus_x[n] * precon[n] * aux[n];
                    }
                    if j > 0 {
                        let n = idx - sy;
                        t -= plus_y[n] * precon[n] * aux[n];
                    }
                    if k > 0 {
                        let n = idx - sz;
                        t -= plus_z[n] * precon[n] * aux[n];
                    }
                    aux[idx] = t * precon[idx];
                }
            }
        }

        for k in (0..nz).rev() {
            for j in (0..ny).rev() {
                for i in (0..nx).rev() {
                    let idx = i + j * sy + k * sz;
                    if !fluid[idx] {
                        continue;
                    }
                    let mut t = aux[idx];
                    if i + 1 < nx {
                        t -= plus_x[idx] * precon[idx] * aux[idx + 1];
                    }
                    if j + 1 < ny {
                        t -= plus_y[idx] * precon[idx] * aux[idx + sy];
                    }
                    if k + 1 < nz {
                        t -= plus_z[idx] * precon[idx] * aux[idx + sz];
                    }
                    aux[idx] = t * precon[idx];
                }
            }
        }
    }

    /// `out = A x`.
    fn multiply(&self, x: &[f64], out: &mut [f64]) {
        let [nx, ny, nz] = self.dims;
        let [_, sy, sz] = self.strides();
        out.par_iter_mut().enumerate().for_each(|(idx, o)| {
            if !self.fluid[idx] {
                *o = 0.0;
                return;
            }
            let i = idx % nx;
            let j = (idx / nx) % ny;
            let k = idx / sz;
            let mut t = self.diag[idx] * x[idx];
            if i > 0 {
                t += self.plus_x[idx - 1] * x[idx - 1];
            }
            if i + 1 < nx {
                t += self.plus_x[idx] * x[idx + 1];
            }
            if j > 0 {
                t += self.plus_y[idx - sy] * x[idx - sy];
            }
            if j + 1 < ny {
                t += self.plus_y[idx] * x[idx + sy];
            }
            if k > 0 {
                t += self.plus_z[idx - sz] * x[idx - sz];
            }
            if k + 1 < nz {
                t += self.plus_z[idx] * x[idx + sz];
            }
            *o = t;
        });
    }

    fn conjugate_gradient(&mut self, settings: &PressureSettings) -> SolveStats {
        self.pressure.fill(0.0);
        self.residual.copy_from_slice(&self.rhs);

        let rhs_norm = infinity_norm(&self.rhs);
        if rhs_norm == 0.0 {
            return SolveStats {
                iterations: 0,
                residual: 0.0,
                converged: true,
            };
        }
        let target = settings.tolerance as f64 * rhs_norm;

        self.apply_preconditioner();
        self.search.copy_from_slice(&self.aux);
        let mut sigma = dot(&self.aux, &self.residual);
        let mut residual = rhs_norm;

        for iteration in 1..=settings.max_iterations {
            let mut product = std::mem::take(&mut self.aux);
            self.multiply(&self.search, &mut product);
            self.aux = product;

            let denom = dot(&self.aux, &self.search);
            if denom == 0.0 {
                return SolveStats {
                    iterations: iteration,
                    residual,
                    converged: residual <= target,
                };
            }
            let alpha = sigma / denom;
            axpy(&mut self.pressure, alpha, &self.search);
            axpy(&mut self.residual, -alpha, &self.aux);

            residual = infinity_norm(&self.residual);
            if residual <= target {
                return SolveStats {
                    iterations: iteration,
                    residual,
                    converged: true,
                };
            }

            self.apply_preconditioner();
            let sigma_new = dot(&self.aux, &self.residual);
            let beta = sigma_new / sigma;
            self.search
                .par_iter_mut()
                .zip(self.aux.par_iter())
                .for_each(|(s, &z)| *s = z + beta * *s);
            sigma = sigma_new;
        }

        log::warn!(
            "Pressure solve hit {} iterations without converging (residual {:.3e}, target {:.3e})",
            settings.max_iterations,
            residual,
            target
        );
        SolveStats {
            iterations: settings.max_iterations,
            residual,
            converged: false,
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
}

fn axpy(y: &mut [f64], alpha: f64, x: &[f64]) {
    y.par_iter_mut().zip(x.par_iter()).for_each(|(y, &x)| *y += alpha * x);
}

fn infinity_norm(a: &[f64]) -> f64 {
    a.par_iter().map(|x| x.abs()).reduce(|| 0.0, f64::max)
}

/// One-shot solve with a temporary solver.
pub fn solve_pressure(grid: &mut MacGrid, settings: &PressureSettings) -> Result<SolveStats, FlipError> {
    let mut solver = PressureSolver::try_new(grid.dims())?;
    solver.solve(grid, settings)
}

/// `u -= (p_front - p_back) / h` on interior faces with a FLUID side.
///
/// Faces touching SOLID and faces between two non-FLUID cells are left
/// alone. With `subcell`, the AIR side of a face across the liquid surface
/// reads the ghost pressure used by the matrix.
pub fn subtract_pressure_gradient(grid: &mut MacGrid, subcell: bool) {
    let dims = grid.dims();
    let scale = grid.max_dimension();
    let MacGrid {
        velocity,
        cell_type,
        pressure,
        level_set,
        ..
    } = grid;
    let cell_type = &*cell_type;
    let pressure = &*pressure;
    let level_set = &*level_set;

    for axis in Axis::ALL {
        let a = axis.index();
        velocity[a].par_update(|front, u| {
            if front[a] == 0 || front[a] == dims[a] {
                return;
            }
            let mut back = front;
            back[a] -= 1;
            let back_type = cell_type.get(back[0], back[1], back[2]);
            let front_type = cell_type.get(front[0], front[1], front[2]);
            if back_type == CellType::Solid || front_type == CellType::Solid {
                return;
            }
            if back_type != CellType::Fluid && front_type != CellType::Fluid {
                return;
            }

            let mut p_back = pressure.get(back[0], back[1], back[2]);
            let mut p_front = pressure.get(front[0], front[1], front[2]);
            if subcell {
                let l_back = level_set.get(back[0], back[1], back[2]);
                let l_front = level_set.get(front[0], front[1], front[2]);
                if back_type == CellType::Fluid && front_type == CellType::Air {
                    if let Some(theta) = ghost_ratio(l_back, l_front) {
                        p_front = theta * p_back;
                    }
                } else if back_type == CellType::Air && front_type == CellType::Fluid {
                    if let Some(theta) = ghost_ratio(l_front, l_back) {
                        p_back = theta * p_front;
                    }
                }
            }
            *u -= (p_front - p_back) * scale;
        });
    }
}

/// Full projection: divergence, level set, solve, gradient subtraction.
///
/// `index` must be built from `particles`, and `grid.cell_type` marked
/// from them.
pub fn project(
    grid: &mut MacGrid,
    solver: &mut PressureSolver,
    index: &ParticleGrid,
    particles: &[Particle],
    density: f32,
    settings: &PressureSettings,
) -> Result<SolveStats, FlipError> {
    compute_divergence(grid);
    {
        let MacGrid {
            cell_type,
            level_set,
            ..
        } = &mut *grid;
        index.build_level_set(particles, cell_type, density, level_set);
    }
    log::trace!("{} fluid cells", grid.count_cells(CellType::Fluid));
    let stats = solver.solve(grid, settings)?;
    subtract_pressure_gradient(grid, settings.subcell);
    log::trace!(
        "Projection: {} iterations, residual {:.3e}",
        stats.iterations,
        stats.residual
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_fluid(grid: &mut MacGrid) {
        grid.cell_type.fill(CellType::Fluid);
        grid.level_set.fill(-1.0);
    }

    /// Test that divergence of a zero velocity field is zero
    #[test]
    fn test_divergence_zero_velocity() {
        let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
        fill_fluid(&mut grid);
        compute_divergence(&mut grid);
        assert!(grid.divergence.as_slice().iter().all(|d| d.abs() < 1e-6));
    }

    /// Test that a single outflow face shows up in both adjacent cells
    #[test]
    fn test_divergence_of_expanding_cell() {
        let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
        fill_fluid(&mut grid);
        grid.velocity_mut(Axis::X).set(2, 1, 1, 1.0);
        compute_divergence(&mut grid);
        // h = 1/4: outflow of 1 on one face gives 4
        assert!((grid.divergence.get(1, 1, 1) - 4.0).abs() < 1e-5);
        assert!((grid.divergence.get(2, 1, 1) + 4.0).abs() < 1e-5);
    }

    /// Test that AIR cells keep zero divergence
    #[test]
    fn test_divergence_skips_non_fluid() {
        let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
        grid.velocity_mut(Axis::X).set(2, 1, 1, 1.0);
        compute_divergence(&mut grid);
        assert_eq!(grid.divergence.get(1, 1, 1), 0.0);
    }

    /// Test that the ghost ratio only exists across the surface and clamps the liquid side
    #[test]
    fn test_ghost_ratio() {
        assert_eq!(ghost_ratio(-0.5, 0.25), Some(-0.5));
        assert_eq!(ghost_ratio(0.1, 0.25), None);
        assert_eq!(ghost_ratio(-0.5, -0.25), None);
        // Near-zero liquid side is clamped to epsilon
        let theta = ghost_ratio(-1.0e-9, 0.5).unwrap();
        assert!((theta + 0.5 / LEVEL_SET_EPSILON).abs() < 1e-2);
    }

    /// Test that a divergence-free field needs no iterations
    #[test]
    fn test_empty_rhs_is_trivially_converged() {
        let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
        fill_fluid(&mut grid);
        let stats = solve_pressure(&mut grid, &PressureSettings::default()).unwrap();
        assert!(stats.converged);
        assert_eq!(stats.iterations, 0);
        assert!(grid.pressure.as_slice().iter().all(|&p| p == 0.0));
    }

    /// Test that projection with subcell makes a free-surface column divergence free
    #[test]
    fn test_projection_removes_divergence_next_to_air() {
        // A column of fluid under air, pushed sideways in the middle
        let mut grid = MacGrid::try_new([6, 6, 6]).unwrap();
        for k in 0..6 {
            for j in 0..6 {
                for i in 0..6 {
                    let fluid = j < 3;
                    grid.cell_type.set(
                        i,
                        j,
                        k,
                        if fluid { CellType::Fluid } else { CellType::Air },
                    );
                    grid.level_set
                        .set(i, j, k, if fluid { -0.5 } else { 0.5 });
                }
            }
        }
        grid.velocity_mut(Axis::X).set(3, 1, 3, 1.0);
        grid.velocity_mut(Axis::Y).set(2, 2, 2, -0.5);
        let settings = PressureSettings {
            subcell: true,
            tolerance: 1.0e-6,
            max_iterations: 500,
        };
        compute_divergence(&mut grid);
        let stats = solve_pressure(&mut grid, &settings).unwrap();
        assert!(stats.converged, "{:?}", stats);
        subtract_pressure_gradient(&mut grid, true);
        compute_divergence(&mut grid);
        let worst = grid
            .divergence
            .as_slice()
            .iter()
            .fold(0.0f32, |m, d| m.max(d.abs()));
        assert!(worst < 1.0e-3, "max divergence {}", worst);
    }

    /// Test that faces touching SOLID keep their velocity
    #[test]
    fn test_gradient_leaves_solid_faces() {
        let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
        fill_fluid(&mut grid);
        grid.cell_type.set(0, 1, 1, CellType::Solid);
        grid.pressure.set(1, 1, 1, 3.0);
        grid.velocity_mut(Axis::X).set(1, 1, 1, 0.0);
        subtract_pressure_gradient(&mut grid, false);
        assert_eq!(grid.velocity(Axis::X).get(1, 1, 1), 0.0);
        // Fluid/fluid face sees the gradient: -(0 - 3) * 4
        assert!((grid.velocity(Axis::X).get(2, 1, 1) - 12.0).abs() < 1e-5);
    }

    /// Test that AIR/AIR faces and domain boundary faces are never touched
    #[test]
    fn test_gradient_skips_air_and_boundary_faces() {
        for subcell in [false, true] {
            let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
            grid.pressure.fill(5.0);
            for i in 0..2 {
                grid.cell_type.set(i, 1, 1, CellType::Fluid);
                grid.level_set.set(i, 1, 1, -0.5);
            }
            grid.pressure.set(0, 1, 1, 1.0);
            grid.pressure.set(1, 1, 1, 2.0);

            // Interior AIR/AIR face, and boundary faces next to FLUID and AIR
            grid.velocity_mut(Axis::X).set(3, 2, 2, 7.0);
            grid.velocity_mut(Axis::X).set(0, 1, 1, 7.0);
            grid.velocity_mut(Axis::X).set(4, 1, 1, 7.0);
            grid.velocity_mut(Axis::Z).set(1, 1, 4, 7.0);
            grid.velocity_mut(Axis::Y).set(1, 0, 1, 7.0);

            subtract_pressure_gradient(&mut grid, subcell);

            assert_eq!(grid.velocity(Axis::X).get(3, 2, 2), 7.0);
            assert_eq!(grid.velocity(Axis::X).get(0, 1, 1), 7.0);
            assert_eq!(grid.velocity(Axis::X).get(4, 1, 1), 7.0);
            assert_eq!(grid.velocity(Axis::Z).get(1, 1, 4), 7.0);
            assert_eq!(grid.velocity(Axis::Y).get(1, 0, 1), 7.0);
            // FLUID/FLUID face: -(2 - 1) * 4
            assert_eq!(grid.velocity(Axis::X).get(1, 1, 1), -4.0);
        }
    }

    /// Test that a near-zero liquid level set uses the clamped ghost pressure on both face orientations
    #[test]
    fn test_gradient_ghost_pressure_near_surface() {
        let build = || {
            let mut grid = MacGrid::try_new([4, 4, 4]).unwrap();
            grid.cell_type.set(1, 1, 1, CellType::Fluid);
            grid.level_set.set(1, 1, 1, -1.0e-9);
            grid.level_set.set(0, 1, 1, 0.5);
            grid.level_set.set(2, 1, 1, 0.5);
            grid.pressure.set(1, 1, 1, 2.0);
            grid.pressure.set(0, 1, 1, 9.0);
            grid.pressure.set(2, 1, 1, 9.0);
            grid.velocity_mut(Axis::X).set(1, 1, 1, 1.0);
            grid.velocity_mut(Axis::X).set(2, 1, 1, 1.0);
            grid
        };
        let close = |a: f32, b: f32| (a - b).abs() <= 1.0e-4 * b.abs().max(1.0);

        let mut grid = build();
        subtract_pressure_gradient(&mut grid, true);
        let theta = 0.5 / -LEVEL_SET_EPSILON;
        let p = 2.0;
        let scale = grid.max_dimension();
        // FLUID behind, AIR in front
        let front = grid.velocity(Axis::X).get(2, 1, 1);
        let expected = 1.0 - (theta * p - p) * scale;
        assert!(close(front, expected), "{} vs {}", front, expected);
        assert!(close(front, 4009.0));
        // AIR behind, FLUID in front
        let back = grid.velocity(Axis::X).get(1, 1, 1);
        let expected = 1.0 - (p - theta * p) * scale;
        assert!(close(back, expected), "{} vs {}", back, expected);
        assert!(close(back, -4007.0));

        // Without subcell the stored AIR pressure is used as is
        let mut grid = build();
        subtract_pressure_gradient(&mut grid, false);
        assert_eq!(grid.velocity(Axis::X).get(2, 1, 1), 1.0 - (9.0 - 2.0) * 4.0);
        assert_eq!(grid.velocity(Axis::X).get(1, 1, 1), 1.0 - (2.0 - 9.0) * 4.0);
    }

    /// Test that a solver rejects a grid of another shape and leaves it untouched
    #[test]
    fn test_solve_rejects_shape_mismatch() {
        let mut solver = PressureSolver::try_new([4, 4, 4]).unwrap();
        let mut grid = MacGrid::try_new([5, 4, 4]).unwrap();
        fill_fluid(&mut grid);
        grid.pressure.fill(3.0);
        let result = solver.solve(&mut grid, &PressureSettings::default());
        assert!(matches!(
            result,
            Err(FlipError::ShapeMismatch {
                expected: [4, 4, 4],
                found: [5, 4, 4],
            })
        ));
        assert!(grid.pressure.as_slice().iter().all(|&p| p == 3.0));
    }
}
