//! Scene collaborator: level sets, particle seeding, wall projection, export.
//!
//! The solver only talks to a scene through [`Scene`]. [`BoxScene`] is a
//! small analytic scene (box walls around an axis-aligned block of liquid)
//! used by the tests and the demo.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use glam::Vec3;
use rayon::prelude::*;

use crate::array3::Array3;
use crate::error::SceneError;
use crate::particle::{Particle, Particles};
use crate::spatial::ParticleGrid;

/// Signed distance over cells in grid units, negative inside.
pub type LevelSet = Array3<f32>;

/// Which export formats a step should write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportFlags {
    pub vdb: bool,
    pub obj: bool,
    pub partio: bool,
}

impl ExportFlags {
    pub const NONE: ExportFlags = ExportFlags {
        vdb: false,
        obj: false,
        partio: false,
    };

    #[inline]
    pub fn any(&self) -> bool {
        self.vdb || self.obj || self.partio
    }
}

pub trait Scene: Send + Sync {
    /// Refresh the solid and liquid level sets for `frame`.
    fn build_level_sets(&mut self, frame: u32);

    /// Append new particles for `frame`. Positions are normalized by the
    /// largest dimension. `index` reflects the particles before seeding.
    fn generate_particles(
        &mut self,
        particles: &mut Particles,
        dims: [usize; 3],
        density: f32,
        index: &ParticleGrid,
        frame: u32,
    );

    /// Move points (grid units) that lie inside a solid onto its surface.
    fn project_points_to_solid_surface(&self, points: &mut [Vec3]);

    fn liquid_level_set(&self) -> &LevelSet;

    fn solid_level_set(&self) -> &LevelSet;

    /// Persist the particles of `frame`. `scale` maps normalized positions
    /// to grid units.
    fn export_particles(
        &self,
        _particles: &[Particle],
        _scale: f32,
        _frame: u32,
        _flags: ExportFlags,
    ) -> Result<(), SceneError> {
        Ok(())
    }
}

/// Signed distance to an axis-aligned box, negative inside.
pub fn box_distance(p: Vec3, min: Vec3, max: Vec3) -> f32 {
    let center = (min + max) * 0.5;
    let half = (max - min) * 0.5;
    let q = (p - center).abs() - half;
    q.max(Vec3::ZERO).length() + q.max_element().min(0.0)
}

/// Solid walls `wall` cells thick around the domain, liquid in a box.
#[derive(Clone, Debug)]
pub struct BoxScene {
    dims: [usize; 3],
    wall: f32,
    liquid_min: Vec3,
    liquid_max: Vec3,
    liquid: LevelSet,
    solid: LevelSet,
    built: bool,
    output_dir: Option<PathBuf>,
}

/// Outside this band (cells) solid particles are not seeded.
const SOLID_SHELL: f32 = 1.5;

/// Step used for level set gradients (grid units).
const GRADIENT_STEP: f32 = 1.0e-2;

/// Extra push past the surface when projecting out of a solid (grid units).
const PROJECTION_MARGIN: f32 = 1.0e-3;

impl BoxScene {
    /// Liquid box given in grid units.
    pub fn new(dims: [usize; 3], wall: usize, liquid_min: Vec3, liquid_max: Vec3) -> Self {
        Self {
            dims,
            wall: wall as f32,
            liquid_min,
            liquid_max,
            liquid: Array3::new(dims, 1.0),
            solid: Array3::new(dims, 1.0),
            built: false,
            output_dir: None,
        }
    }

    /// A column of liquid against the low-x wall filling `fraction` of the
    /// interior width and `height` of its height.
    pub fn dam_break(dims: [usize; 3], fraction: f32, height: f32) -> Self {
        let wall = 1usize;
        let w = wall as f32;
        let interior = Vec3::new(
            dims[0] as f32 - 2.0 * w,
            dims[1] as f32 - 2.0 * w,
            dims[2] as f32 - 2.0 * w,
        );
        let min = Vec3::splat(w);
        let max = Vec3::new(
            w + interior.x * fraction,
            w + interior.y * height,
            w + interior.z,
        );
        Self::new(dims, wall, min, max)
    }

    /// Write particle snapshots as JSON under `dir` when exporting.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    fn interior(&self) -> (Vec3, Vec3) {
        let min = Vec3::splat(self.wall);
        let max = Vec3::new(
            self.dims[0] as f32 - self.wall,
            self.dims[1] as f32 - self.wall,
            self.dims[2] as f32 - self.wall,
        );
        (min, max)
    }

    /// Solid signed distance at a point in grid units, negative inside walls.
    pub fn solid_distance(&self, p: Vec3) -> f32 {
        let (min, max) = self.interior();
        -box_distance(p, min, max)
    }

    /// Liquid signed distance at a point in grid units, negative inside.
    pub fn liquid_distance(&self, p: Vec3) -> f32 {
        box_distance(p, self.liquid_min, self.liquid_max)
    }

    /// Unit gradient of the solid distance, zero where it is flat.
    pub fn solid_normal(&self, p: Vec3) -> Vec3 {
        let e = GRADIENT_STEP;
        let gradient = Vec3::new(
            self.solid_distance(p + Vec3::X * e) - self.solid_distance(p - Vec3::X * e),
            self.solid_distance(p + Vec3::Y * e) - self.solid_distance(p - Vec3::Y * e),
            self.solid_distance(p + Vec3::Z * e) - self.solid_distance(p - Vec3::Z * e),
        );
        gradient.normalize_or_zero()
    }

    fn seed(&self, particles: &mut Particles, dims: [usize; 3], density: f32) {
        let max_dimension = dims.iter().copied().max().unwrap_or(1) as f32;
        let counts = dims.map(|n| (n as f32 / density).floor() as usize);
        let before = particles.len();

        for k in 0..counts[2] {
            for j in 0..counts[1] {
                for i in 0..counts[0] {
                    let p = (Vec3::new(i as f32, j as f32, k as f32) + Vec3::splat(0.5)) * density;
                    let solid = self.solid_distance(p);
                    if solid < 0.0 {
                        if solid > -SOLID_SHELL {
                            particles.push(Particle::solid(p / max_dimension, self.solid_normal(p)));
                        }
                    } else if self.liquid_distance(p) < 0.0 {
                        particles.push(Particle::fluid(p / max_dimension, Vec3::ZERO));
                    }
                }
            }
        }
        log::debug!("Seeded {} particles", particles.len() - before);
    }

    fn write_snapshot(&self, particles: &[Particle], scale: f32, frame: u32) -> Result<(), SceneError> {
        let Some(dir) = &self.output_dir else {
            log::debug!("Frame {} export skipped: no output directory", frame);
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("frame_{:05}.json", frame));
        let scaled: Vec<Particle> = particles
            .iter()
            .map(|p| Particle {
                position: p.position * scale,
                ..*p
            })
            .collect();
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, &scaled).map_err(|e| SceneError::Export {
            frame,
            reason: e.to_string(),
        })?;
        writer.flush()?;
        log::info!("Wrote {} particles to {}", scaled.len(), path.display());
        Ok(())
    }
}

impl Scene for BoxScene {
    fn build_level_sets(&mut self, frame: u32) {
        if self.built {
            return;
        }
        let (min, max) = self.interior();
        let (liquid_min, liquid_max) = (self.liquid_min, self.liquid_max);
        self.solid.par_update(|[i, j, k], v| {
            let c = Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5);
            *v = -box_distance(c, min, max);
        });
        self.liquid.par_update(|[i, j, k], v| {
            let c = Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5);
            *v = box_distance(c, liquid_min, liquid_max);
        });
        self.built = true;
        log::trace!("Built box level sets at frame {}", frame);
    }

    fn generate_particles(
        &mut self,
        particles: &mut Particles,
        dims: [usize; 3],
        density: f32,
        _index: &ParticleGrid,
        frame: u32,
    ) {
        if frame == 0 {
            self.seed(particles, dims, density);
        }
    }

    fn project_points_to_solid_surface(&self, points: &mut [Vec3]) {
        points.par_iter_mut().for_each(|p| {
            let distance = self.solid_distance(*p);
            // Points exactly on the wall still sit in a SOLID cell
            if distance <= 0.0 {
                let normal = self.solid_normal(*p);
                *p += normal * (-distance + PROJECTION_MARGIN);
            }
        });
    }

    fn liquid_level_set(&self) -> &LevelSet {
        &self.liquid
    }

    fn solid_level_set(&self) -> &LevelSet {
        &self.solid
    }

    fn export_particles(
        &self,
        particles: &[Particle],
        scale: f32,
        frame: u32,
        flags: ExportFlags,
    ) -> Result<(), SceneError> {
        if flags.vdb || flags.obj {
            log::debug!("Frame {}: volume and mesh export are not provided by BoxScene", frame);
        }
        if flags.partio {
            self.write_snapshot(particles, scale, frame)?;
        }
        Ok(())
    }
}
