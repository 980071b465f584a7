//! Teleport-in effect played when a character finishes loading.
//!
//! The effect is pure animation state: [`TeleportEffect::step`] returns the
//! visual parameters of every particle, ring and the beam for the frame, and
//! the viewer mirrors them onto scene nodes.

use std::f32::consts::TAU;

use glam::Vec3;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Serialize;

use crate::config::ControllerConfig;

const PARTICLE_MAX_HEIGHT: f32 = 50.0;
const RING_MAX_HEIGHT: f32 = 45.0;
const RING_RISE_SPEED: f32 = 0.4;
const RING_BASE_RADIUS: f32 = 16.0;
const BEAM_HEIGHT: f32 = 60.0;

/// One particle on an inward spiral. Angle and flash phase advance independently.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SpiralParticle {
    angle: f32,
    angular_speed: f32,
    start_radius: f32,
    height: f32,
    rise_speed: f32,
    flash_phase: f32,
    flash_speed: f32,
    size: f32,
}

impl SpiralParticle {
    fn random(rng: &mut SmallRng) -> Self {
        Self {
            angle: rng.gen_range(0.0..TAU),
            angular_speed: rng.gen_range(0.05..0.15),
            start_radius: rng.gen_range(8.0..20.0),
            height: rng.gen_range(0.0..PARTICLE_MAX_HEIGHT),
            rise_speed: rng.gen_range(0.3..0.9),
            flash_phase: rng.gen_range(0.0..TAU),
            flash_speed: rng.gen_range(0.2..0.5),
            size: rng.gen_range(0.4..1.0),
        }
    }

    fn advance(&mut self) {
        self.angle += self.angular_speed;
        self.flash_phase += self.flash_speed;
        self.height += self.rise_speed;
        if self.height > PARTICLE_MAX_HEIGHT {
            self.height -= PARTICLE_MAX_HEIGHT;
        }
    }

    /// Radius shrinks linearly to zero at the top of the column.
    fn radius(&self) -> f32 {
        self.start_radius * (1.0 - self.height / PARTICLE_MAX_HEIGHT).max(0.0)
    }

    fn opacity(&self, progress: f32) -> f32 {
        let height_fade = 1.0 - self.height / PARTICLE_MAX_HEIGHT;
        let flicker = 0.5 + 0.5 * self.flash_phase.sin();
        (height_fade * (1.0 - progress) * flicker).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParticleVisual {
    /// Offset from the effect origin.
    pub offset: Vec3,
    pub size: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RingVisual {
    pub height: f32,
    pub radius: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeamVisual {
    pub height: f32,
    pub opacity: f32,
}

/// Visual state of the whole ensemble for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeleportFrame {
    pub particles: Vec<ParticleVisual>,
    pub rings: Vec<RingVisual>,
    pub beam: BeamVisual,
    pub progress: f32,
    /// True on the frame progress reaches 1; the ensemble should be torn down.
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct TeleportEffect {
    pub origin: Vec3,
    particles: Vec<SpiralParticle>,
    ring_heights: Vec<f32>,
    frame: u32,
    total_frames: u32,
}

impl TeleportEffect {
    pub fn new(origin: Vec3, config: &ControllerConfig) -> Self {
        let mut rng = SmallRng::seed_from_u64(config.teleport_seed);
        let particles = (0..config.teleport_particles)
            .map(|_| SpiralParticle::random(&mut rng))
            .collect();
        let rings = config.teleport_rings.max(1);
        let ring_heights = (0..config.teleport_rings)
            .map(|i| i as f32 * RING_MAX_HEIGHT / rings as f32)
            .collect();
        Self {
            origin,
            particles,
            ring_heights,
            frame: 0,
            total_frames: config.teleport_frames.max(1),
        }
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn ring_count(&self) -> usize {
        self.ring_heights.len()
    }

    pub fn progress(&self) -> f32 {
        (self.frame as f32 / self.total_frames as f32).min(1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.frame >= self.total_frames
    }

    pub fn step(&mut self) -> TeleportFrame {
        if !self.is_finished() {
            self.frame += 1;
        }
        let progress = self.progress();

        for particle in &mut self.particles {
            particle.advance();
        }
        for height in &mut self.ring_heights {
            *height += RING_RISE_SPEED;
            if *height > RING_MAX_HEIGHT {
                *height -= RING_MAX_HEIGHT;
            }
        }

        let particles = self
            .particles
            .iter()
            .map(|p| {
                let r = p.radius();
                ParticleVisual {
                    offset: Vec3::new(p.angle.cos() * r, p.height, p.angle.sin() * r),
                    size: p.size,
                    opacity: p.opacity(progress),
                }
            })
            .collect();

        let rings = self
            .ring_heights
            .iter()
            .map(|&height| {
                let rise = height / RING_MAX_HEIGHT;
                RingVisual {
                    height,
                    radius: RING_BASE_RADIUS * (1.0 - 0.5 * rise),
                    opacity: (0.8 * (1.0 - rise) * (1.0 - progress)).clamp(0.0, 1.0),
                }
            })
            .collect();

        let shimmer = 0.8 + 0.2 * (self.frame as f32 * 0.3).sin();
        let beam = BeamVisual {
            height: BEAM_HEIGHT,
            opacity: (0.4 * shimmer * (1.0 - progress)).clamp(0.0, 1.0),
        };

        TeleportFrame {
            particles,
            rings,
            beam,
            progress,
            finished: self.is_finished(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ControllerConfig {
        ControllerConfig::preset(crate::config::Variant::Teleport)
    }

    #[test]
    fn test_ensemble_size() {
        let effect = TeleportEffect::new(Vec3::ZERO, &config());
        assert_eq!(effect.particle_count(), 120);
        assert_eq!(effect.ring_count(), 5);
    }

    #[test]
    fn test_same_seed_same_animation() {
        let mut a = TeleportEffect::new(Vec3::ZERO, &config());
        let mut b = TeleportEffect::new(Vec3::ZERO, &config());
        for _ in 0..10 {
            assert_eq!(a.step(), b.step());
        }
    }

    #[test]
    fn test_finishes_after_configured_frames() {
        let cfg = config();
        let mut effect = TeleportEffect::new(Vec3::ZERO, &cfg);
        for _ in 1..cfg.teleport_frames {
            assert!(!effect.step().finished);
        }
        let last = effect.step();
        assert!(last.finished);
        assert_eq!(last.progress, 1.0);
        assert!(last.particles.iter().all(|p| p.opacity == 0.0));
        assert_eq!(last.beam.opacity, 0.0);
    }

    #[test]
    fn test_spiral_tightens_as_it_rises() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut p = SpiralParticle::random(&mut rng);
        p.height = 0.0;
        let low = p.radius();
        p.height = PARTICLE_MAX_HEIGHT * 0.75;
        let high = p.radius();
        assert!(high < low);
        assert!((high - low * 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_opacity_bounds() {
        let mut effect = TeleportEffect::new(Vec3::ZERO, &config());
        for _ in 0..60 {
            let frame = effect.step();
            for p in &frame.particles {
                assert!((0.0..=1.0).contains(&p.opacity));
                assert!(p.offset.y >= 0.0 && p.offset.y <= PARTICLE_MAX_HEIGHT);
            }
            for r in &frame.rings {
                assert!((0.0..=1.0).contains(&r.opacity));
            }
        }
    }
}
