//! Short-lived animations layered on the base pose.
//!
//! Jump owns the vertical position and bow owns the root pitch. Both run
//! alongside locomotion; neither blocks the other.

use std::f32::consts::PI;

use serde::Serialize;

/// Closed-form kinematic jump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct JumpState {
    pub airborne: bool,
    pub velocity: f32,
}

impl JumpState {
    /// Start a jump. No-op while already airborne.
    pub fn trigger(&mut self, strength: f32) -> bool {
        if self.airborne {
            return false;
        }
        self.airborne = true;
        self.velocity = strength;
        true
    }

    /// Integrate one frame (`v -= g; y += v`). Returns true on the frame the
    /// character lands, with `height` clamped to `ground` and velocity zeroed.
    pub fn step(&mut self, height: &mut f32, ground: f32, gravity: f32) -> bool {
        if !self.airborne {
            return false;
        }
        self.velocity -= gravity;
        *height += self.velocity;
        if *height <= ground {
            *height = ground;
            self.velocity = 0.0;
            self.airborne = false;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Result of one bow frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BowFrame {
    pub pitch: f32,
    pub finished: bool,
}

/// Forward bow: pitch follows `sin(progress * PI) * amplitude` over one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BowState {
    pub bowing: bool,
    pub progress: f32,
}

impl BowState {
    /// Start a bow. No-op while a bow is already running.
    pub fn trigger(&mut self) -> bool {
        if self.bowing {
            return false;
        }
        self.bowing = true;
        self.progress = 0.0;
        true
    }

    pub fn pitch(&self, amplitude: f32) -> f32 {
        if self.bowing {
            (self.progress * PI).sin() * amplitude
        } else {
            0.0
        }
    }

    pub fn step(&mut self, speed: f32, amplitude: f32) -> BowFrame {
        if !self.bowing {
            return BowFrame {
                pitch: 0.0,
                finished: false,
            };
        }
        self.progress += speed;
        if self.progress >= 1.0 {
            self.bowing = false;
            self.progress = 0.0;
            return BowFrame {
                pitch: 0.0,
                finished: true,
            };
        }
        BowFrame {
            pitch: self.pitch(amplitude),
            finished: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_retrigger_is_noop() {
        let mut jump = JumpState::default();
        assert!(jump.trigger(2.0));
        let mut y = 0.0;
        jump.step(&mut y, 0.0, 0.014);
        let v = jump.velocity;
        assert!(!jump.trigger(2.0));
        assert_eq!(jump.velocity, v);
    }

    #[test]
    fn test_jump_lands_on_raised_ground() {
        let mut jump = JumpState::default();
        let ground = -100.0;
        let mut y = ground;
        jump.trigger(2.0);
        let mut frames = 0;
        while !jump.step(&mut y, ground, 0.014) {
            frames += 1;
            assert!(y > ground);
        }
        assert_eq!(y, ground);
        assert_eq!(jump.velocity, 0.0);
        assert!(!jump.airborne);
        assert!(frames > 200);
    }

    #[test]
    fn test_grounded_step_does_nothing() {
        let mut jump = JumpState::default();
        let mut y = 5.0;
        assert!(!jump.step(&mut y, 0.0, 0.014));
        assert_eq!(y, 5.0);
    }

    #[test]
    fn test_bow_cycle() {
        let mut bow = BowState::default();
        assert_eq!(bow.pitch(0.8), 0.0);
        assert!(bow.trigger());
        assert!(!bow.trigger());

        let mut peak: f32 = 0.0;
        let mut finished_at = None;
        for frame in 1..=40 {
            let out = bow.step(0.05, 0.8);
            peak = peak.max(out.pitch);
            if out.finished {
                finished_at = Some(frame);
                break;
            }
            assert!(out.pitch > -1e-5);
        }
        let frame = finished_at.unwrap();
        assert!((19..=21).contains(&frame));
        assert!((peak - 0.8).abs() < 1e-3);
        assert!(!bow.bowing);
        assert_eq!(bow.progress, 0.0);
        assert!(bow.trigger());
    }
}
