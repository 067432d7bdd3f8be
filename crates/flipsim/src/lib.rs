//! 3D PIC/FLIP liquid solver
//!
//! Particles carry the liquid; a staggered MAC grid enforces
//! incompressibility each step with a MIC(0)-preconditioned conjugate
//! gradient solve. The free surface is resolved inside cells from a
//! particle level set. Boundaries, seeding and export come from a
//! [`Scene`] collaborator.
//!
//! # Example
//!
//! ```
//! use flipsim::{BoxScene, ExportFlags, FlipConfig, FlipSimulation};
//!
//! let config = FlipConfig::cube(12);
//! let scene = BoxScene::dam_break(config.dimensions, 0.4, 0.6);
//! let mut sim = FlipSimulation::new(config, Box::new(scene)).unwrap();
//! sim.initialize().unwrap();
//!
//! let report = sim.step(ExportFlags::NONE).unwrap();
//! assert_eq!(report.frame, 1);
//! ```

pub mod advection;
pub mod array3;
pub mod config;
pub mod constants;
pub mod density;
pub mod error;
pub mod extrapolation;
pub mod grid;
pub mod kernels;
pub mod particle;
pub mod pressure;
pub mod resample;
pub mod scene;
pub mod serde_utils;
pub mod spatial;
pub mod transfer;

use std::sync::Arc;

pub use array3::{Array3, Axis};
pub use config::FlipConfig;
pub use error::{FlipError, SceneError};
pub use glam::Vec3;
pub use grid::{CellType, MacGrid};
pub use particle::{Particle, ParticleKind, Particles};
pub use pressure::{PressureSettings, PressureSolver, SolveStats};
pub use scene::{BoxScene, ExportFlags, LevelSet, Scene};
pub use spatial::ParticleGrid;

/// Summary of one completed step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepReport {
    pub frame: u32,
    /// Particles alive after the step.
    pub particles: usize,
    pub solve: SolveStats,
    /// Single-frame particles dropped at the end of the step.
    pub removed_transient: usize,
    /// Fluid particles pushed back out of solids.
    pub stuck: usize,
}

/// PIC/FLIP liquid simulation over a fixed grid.
pub struct FlipSimulation {
    config: FlipConfig,
    pool: Arc<rayon::ThreadPool>,

    /// Current grid and the splatted copy used for the FLIP delta
    grid: MacGrid,
    previous: MacGrid,
    index: ParticleGrid,
    solver: PressureSolver,

    particles: Particles,
    scene: Box<dyn Scene>,

    frame: u32,
    max_density: f32,
    initialized: bool,
}

impl FlipSimulation {
    /// Validate `config` and allocate all grid storage.
    pub fn new(config: FlipConfig, scene: Box<dyn Scene>) -> Result<Self, FlipError> {
        config.validate()?;
        let dims = config.dimensions;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()?;

        let sim = Self {
            grid: MacGrid::try_new(dims)?,
            previous: MacGrid::try_new(dims)?,
            index: ParticleGrid::try_new(dims)?,
            solver: PressureSolver::try_new(dims)?,
            particles: Particles::new(),
            scene,
            pool: Arc::new(pool),
            frame: 0,
            max_density: 0.0,
            initialized: false,
            config,
        };
        log::info!(
            "Created {}x{}x{} simulation on {} threads",
            dims[0],
            dims[1],
            dims[2],
            sim.pool.current_num_threads()
        );
        Ok(sim)
    }

    /// Calibrate density and seed the first frame.
    ///
    /// Fluid particles seeded inside SOLID cells are dropped.
    pub fn initialize(&mut self) -> Result<(), FlipError> {
        let pool = Arc::clone(&self.pool);
        pool.install(|| self.initialize_inner())
    }

    fn initialize_inner(&mut self) -> Result<(), FlipError> {
        let dims = self.config.dimensions;
        let density = self.config.density;
        self.max_density = density::calibrate_max_density(dims, density)?;

        self.particles.clear();
        self.frame = 0;
        self.scene.build_level_sets(0);
        self.scene
            .generate_particles(&mut self.particles, dims, density, &self.index, 0);

        self.index.rebuild(self.particles.as_slice());
        self.index
            .mark_cell_types(self.particles.as_slice(), &mut self.grid.cell_type);

        let max_dimension = self.config.max_dimension();
        let cell_type = &self.grid.cell_type;
        let before = self.particles.len();
        self.particles.retain(|p| {
            if p.is_solid() {
                return true;
            }
            let t = p.position * max_dimension;
            cell_type.get_clamped(t.x as i64, t.y as i64, t.z as i64) != CellType::Solid
        });
        let removed = before - self.particles.len();
        self.index.rebuild(self.particles.as_slice());

        self.initialized = true;
        log::info!(
            "Initialized {} particles ({} fluid, {} solid), dropped {} inside walls",
            self.particles.len(),
            self.particles.count_kind(ParticleKind::Fluid),
            self.particles.count_kind(ParticleKind::Solid),
            removed
        );
        Ok(())
    }

    /// Advance one frame of `step_size`.
    pub fn step(&mut self, flags: ExportFlags) -> Result<StepReport, FlipError> {
        if !self.is_initialized() {
            return Err(FlipError::NotInitialized);
        }
        let pool = Arc::clone(&self.pool);
        pool.install(|| self.step_inner(flags))
    }

    fn step_inner(&mut self, flags: ExportFlags) -> Result<StepReport, FlipError> {
        self.frame += 1;
        let frame = self.frame;
        let dims = self.config.dimensions;
        let density = self.config.density;
        let dt = self.config.step_size;
        let max_dimension = self.config.max_dimension();
        let settings = self.config.pressure_settings();

        self.scene.build_level_sets(frame);
        self.scene
            .generate_particles(&mut self.particles, dims, density, &self.index, frame);
        self.index.rebuild(self.particles.as_slice());

        density::compute_density(
            &self.index,
            self.particles.as_mut_slice(),
            density,
            max_dimension,
            self.max_density,
        );
        advection::apply_external_forces(
            self.particles.as_mut_slice(),
            self.config.gravity_vec(),
            dt,
        );

        transfer::splat_particles_to_grid(&self.index, self.particles.as_slice(), &mut self.grid);
        self.index
            .mark_cell_types(self.particles.as_slice(), &mut self.grid.cell_type);
        self.grid.store_velocities(&mut self.previous);

        self.grid.enforce_boundary_velocity();
        let solve = pressure::project(
            &mut self.grid,
            &mut self.solver,
            &self.index,
            self.particles.as_slice(),
            density,
            &settings,
        )?;
        self.grid.enforce_boundary_velocity();
        extrapolation::extrapolate_velocity(&mut self.grid);
        self.grid.subtract_previous(&mut self.previous);

        advection::solve_pic_flip(
            self.particles.as_mut_slice(),
            &self.grid,
            &self.previous,
            self.config.pic_flip_ratio,
        );
        advection::advect_particles(
            self.particles.as_mut_slice(),
            &self.grid,
            &mut self.index,
            dt,
            density,
        );
        if self.config.resample {
            resample::resample_particles(
                &mut self.index,
                self.particles.as_mut_slice(),
                dt,
                self.config.particle_spacing(),
                self.config.seed,
                frame,
            );
        }

        let invalid = advection::mark_invalid(
            self.particles.as_mut_slice(),
            &self.grid.cell_type,
            max_dimension,
        );
        let removed_transient = self.particles.remove_transient();
        let stuck = advection::project_stuck_particles(
            self.particles.as_mut_slice(),
            self.scene.as_ref(),
            max_dimension,
        );
        self.index.rebuild(self.particles.as_slice());

        if flags.any() {
            self.scene
                .export_particles(self.particles.as_slice(), max_dimension, frame, flags)?;
        }

        let report = StepReport {
            frame,
            particles: self.particles.len(),
            solve,
            removed_transient,
            stuck,
        };
        log::debug!(
            "Frame {}: {} particles, {} pressure iterations (residual {:.3e}), {} invalid, {} transient removed, {} stuck",
            frame,
            report.particles,
            solve.iterations,
            solve.residual,
            invalid,
            removed_transient,
            stuck
        );
        Ok(report)
    }

    /// True when the scene places liquid at cell (i, j, k) and no solid.
    pub fn is_cell_fluid(&self, i: usize, j: usize, k: usize) -> bool {
        let liquid = self.scene.liquid_level_set();
        let solid = self.scene.solid_level_set();
        if !liquid.in_bounds(i as i64, j as i64, k as i64) || !solid.in_bounds(i as i64, j as i64, k as i64) {
            return false;
        }
        liquid.get(i, j, k) < 0.0 && solid.get(i, j, k) >= 0.0
    }

    /// Set the FLIP share of the velocity blend. Must lie in `[0, 1]`;
    /// the current value is kept on error.
    pub fn set_pic_flip_ratio(&mut self, ratio: f32) -> Result<(), FlipError> {
        config::check_ratio(ratio)?;
        self.config.pic_flip_ratio = ratio;
        Ok(())
    }

    /// Set the time step used from the next `step` on. Must be finite and
    /// positive.
    pub fn set_step_size(&mut self, dt: f32) -> Result<(), FlipError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(FlipError::InvalidConfig(format!(
                "step_size must be positive, got {}",
                dt
            )));
        }
        self.config.step_size = dt;
        Ok(())
    }

    /// Set the acceleration applied to fluid particles. Every component must
    /// be finite.
    pub fn set_gravity(&mut self, gravity: Vec3) -> Result<(), FlipError> {
        if !gravity.is_finite() {
            return Err(FlipError::InvalidConfig(format!(
                "gravity must be finite, got {}",
                gravity
            )));
        }
        self.config.gravity = gravity.to_array();
        Ok(())
    }

    #[inline]
    pub fn particles(&self) -> &Particles {
        &self.particles
    }

    /// Mutable particle access between steps. The index is rebuilt at the
    /// start of the next step.
    #[inline]
    pub fn particles_mut(&mut self) -> &mut Particles {
        &mut self.particles
    }

    #[inline]
    pub fn dimensions(&self) -> [usize; 3] {
        self.config.dimensions
    }

    #[inline]
    pub fn frame(&self) -> u32 {
        self.frame
    }

    #[inline]
    pub fn config(&self) -> &FlipConfig {
        &self.config
    }

    #[inline]
    pub fn grid(&self) -> &MacGrid {
        &self.grid
    }

    #[inline]
    pub fn max_density(&self) -> f32 {
        self.max_density
    }

    #[inline]
    pub fn scene(&self) -> &dyn Scene {
        self.scene.as_ref()
    }

    /// True once `initialize` has seeded the particles.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
