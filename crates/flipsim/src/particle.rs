//! Marker particles carried through the liquid.

use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParticleKind {
    /// Liquid marker, advected every step
    #[default]
    Fluid,
    /// Static boundary sample carrying the solid surface normal
    Solid,
}

/// A single particle. Positions are normalized by the largest domain side.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    #[serde(with = "crate::serde_utils::vec3")]
    pub position: Vec3,
    #[serde(with = "crate::serde_utils::vec3")]
    pub velocity: Vec3,
    /// Outward solid normal; zero for fluid particles
    #[serde(with = "crate::serde_utils::vec3")]
    pub normal: Vec3,
    pub mass: f32,
    /// Normalized local density, 1.0 at rest packing
    pub density: f32,
    pub kind: ParticleKind,
    /// Removed at the end of the step it was spawned in
    pub transient: bool,
    /// Left the domain or entered a solid cell
    pub invalid: bool,
}

impl Particle {
    /// Fluid particle at `position` moving with `velocity`.
    pub fn fluid(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            normal: Vec3::ZERO,
            mass: 1.0,
            density: 0.0,
            kind: ParticleKind::Fluid,
            transient: false,
            invalid: false,
        }
    }

    /// Solid boundary sample with its outward surface normal.
    pub fn solid(position: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            kind: ParticleKind::Solid,
            density: 1.0,
            ..Self::fluid(position, Vec3::ZERO)
        }
    }

    /// Mark for removal at the end of the current step.
    pub fn as_transient(mut self) -> Self {
        self.transient = true;
        self
    }

    #[inline]
    pub fn is_fluid(&self) -> bool {
        self.kind == ParticleKind::Fluid
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        self.kind == ParticleKind::Solid
    }
}

/// Collection of particles.
#[derive(Clone, Debug, Default)]
pub struct Particles {
    pub list: Vec<Particle>,
}

impl Particles {
    /// Empty collection.
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    /// Append a particle. The spatial index is stale until the next rebuild.
    pub fn push(&mut self, particle: Particle) {
        self.list.push(particle);
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Iterate in storage order.
    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.list.iter()
    }

    /// Contiguous view for the parallel phases.
    pub fn as_slice(&self) -> &[Particle] {
        &self.list
    }

    /// Mutable view for the parallel phases. Order and length are fixed.
    pub fn as_mut_slice(&mut self) -> &mut [Particle] {
        &mut self.list
    }

    /// Remove every particle, fluid and solid.
    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Keep only the particles for which `f` returns true, preserving order.
    pub fn retain<F: FnMut(&Particle) -> bool>(&mut self, f: F) {
        self.list.retain(f);
    }

    /// Number of particles of the given kind.
    pub fn count_kind(&self, kind: ParticleKind) -> usize {
        self.list.iter().filter(|p| p.kind == kind).count()
    }

    /// Drop every transient particle. Returns how many were removed.
    pub fn remove_transient(&mut self) -> usize {
        let before = self.list.len();
        self.list.retain(|p| !p.transient);
        before - self.list.len()
    }
}
