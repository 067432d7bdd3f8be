//! Solver configuration.
//!
//! A `FlipConfig` is fixed once a simulation is built. The few parameters
//! that may change between frames go through setters on `FlipSimulation`.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::FlipError;
use crate::pressure::PressureSettings;

/// Parameters for one simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipConfig {
    /// Cell resolution along x, y, z.
    pub dimensions: [usize; 3],
    /// Particle spacing measured in cells (0.5 = two particles per cell per axis).
    pub density: f32,
    /// Fixed time step.
    pub step_size: f32,
    /// Weight of the FLIP estimate in the final particle velocity.
    pub pic_flip_ratio: f32,
    /// Low-density threshold for stuck-particle detection near walls.
    /// Carried for scene tooling; the step itself does not read it.
    pub density_threshold: f32,
    /// Resolve the free surface inside cells using the level set.
    pub subcell: bool,
    /// External acceleration applied to fluid particles. Solid particles
    /// never move.
    pub gravity: [f32; 3],
    /// Relative residual at which the pressure solve stops.
    pub pressure_tolerance: f32,
    /// Iteration cap for the pressure solve.
    pub max_pressure_iterations: usize,
    /// Worker threads; 0 picks one per logical CPU.
    pub threads: usize,
    /// Run the particle resampler after advection.
    pub resample: bool,
    /// Seed for the resampler jitter.
    pub seed: u64,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            dimensions: [32, 32, 32],
            density: 0.5,
            step_size: 0.005,
            pic_flip_ratio: 0.95,
            density_threshold: 0.04,
            subcell: true,
            gravity: [0.0, -9.8, 0.0],
            pressure_tolerance: 1.0e-4,
            max_pressure_iterations: 200,
            threads: 0,
            resample: true,
            seed: 0,
        }
    }
}

impl FlipConfig {
    /// Cubic domain of `n` cells per side, everything else default.
    pub fn cube(n: usize) -> Self {
        Self {
            dimensions: [n, n, n],
            ..Self::default()
        }
    }

    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, FlipError> {
        let config: FlipConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlipError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), FlipError> {
        if self.dimensions.iter().any(|&n| n == 0) {
            return Err(FlipError::InvalidConfig(format!(
                "dimensions must be non-zero, got {:?}",
                self.dimensions
            )));
        }
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err(FlipError::InvalidConfig(format!(
                "density must be positive, got {}",
                self.density
            )));
        }
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(FlipError::InvalidConfig(format!(
                "step_size must be positive, got {}",
                self.step_size
            )));
        }
        check_ratio(self.pic_flip_ratio)?;
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(FlipError::InvalidConfig(format!(
                "gravity must be finite, got {:?}",
                self.gravity
            )));
        }
        if !(self.pressure_tolerance.is_finite() && self.pressure_tolerance > 0.0) {
            return Err(FlipError::InvalidConfig(format!(
                "pressure_tolerance must be positive, got {}",
                self.pressure_tolerance
            )));
        }
        if self.max_pressure_iterations == 0 {
            return Err(FlipError::InvalidConfig(
                "max_pressure_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Largest of the three resolutions. Positions are normalized by it.
    #[inline]
    pub fn max_dimension(&self) -> f32 {
        self.dimensions.iter().copied().max().unwrap_or(1) as f32
    }

    /// Uniform cell width in normalized units.
    #[inline]
    pub fn cell_width(&self) -> f32 {
        1.0 / self.max_dimension()
    }

    /// Distance between seeded particles in normalized units.
    #[inline]
    pub fn particle_spacing(&self) -> f32 {
        self.density / self.max_dimension()
    }

    #[inline]
    pub fn gravity_vec(&self) -> Vec3 {
        Vec3::from_array(self.gravity)
    }

    pub fn pressure_settings(&self) -> PressureSettings {
        PressureSettings {
            subcell: self.subcell,
            tolerance: self.pressure_tolerance,
            max_iterations: self.max_pressure_iterations,
        }
    }
}

pub(crate) fn check_ratio(ratio: f32) -> Result<(), FlipError> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(FlipError::InvalidConfig(format!(
            "pic_flip_ratio must lie in [0, 1], got {}",
            ratio
        )))
    }
}
