//! Numerical constants shared by the solver phases.
//!
//! Distances marked "grid units" are measured in cells; everything else is in
//! normalized units where the largest domain side has length 1.

// =============================================================================
// PRESSURE
// =============================================================================

/// Smallest magnitude allowed for the liquid-side level set in a ghost
/// pressure ratio. Used by matrix assembly and gradient subtraction alike.
pub const LEVEL_SET_EPSILON: f32 = 1.0e-3;

/// Modified incomplete Cholesky blend factor.
pub const MIC_TAU: f64 = 0.97;

/// MIC(0) safety factor: fall back to the plain diagonal below this fraction.
pub const MIC_SIGMA: f64 = 0.25;

// =============================================================================
// LEVEL SET
// =============================================================================

/// Offset of the particle level set; the surface sits where the normalized
/// particle accumulation reaches this value.
pub const SURFACE_OFFSET: f32 = 0.2;

// =============================================================================
// TRANSFER
// =============================================================================

/// Support of the sharpen kernel used by the particle-to-grid splat (grid units).
pub const SPLAT_RADIUS: f32 = 1.4;

/// Cells searched on either side of a face, along the face axis and across it.
pub const SPLAT_NEIGHBORHOOD: [usize; 2] = [1, 2];

// =============================================================================
// DENSITY
// =============================================================================

/// Side of the particle block used to calibrate the density normalizer.
pub const CALIBRATION_BLOCK: usize = 10;

// =============================================================================
// ADVECTION
// =============================================================================

/// Solid repulsion radius in particle spacings.
pub const REPULSION_RADIUS: f32 = 1.5;

/// Velocity gained per grid unit of displacement when a particle is pushed
/// out of a solid.
pub const STUCK_PENALTY: f32 = 10.0;

/// Displacements below this (grid units) leave a stuck particle alone.
pub const STUCK_THRESHOLD: f32 = 1.0e-4;

// =============================================================================
// RESAMPLER
// =============================================================================

/// Spring stiffness of the resampler.
pub const RESAMPLE_STIFFNESS: f32 = 50.0;

/// Pairs closer than this fraction of the spacing get jitter instead of a spring.
pub const RESAMPLE_MIN_SEPARATION: f32 = 0.1;

/// Jitter magnitude for coincident fluid pairs, in spacings per step.
pub const RESAMPLE_FLUID_JITTER: f32 = 0.01;

/// Push along the solid normal for a fluid particle sitting on a solid one.
pub const RESAMPLE_SOLID_PUSH: f32 = 0.05;
