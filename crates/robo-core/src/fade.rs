//! Frame-counted opacity ramps.
//!
//! The model fade-in after teleport runs as a stepped ramp sampled once per
//! frame by the viewer, so there is no timer to cancel when a model is
//! replaced mid-fade.

/// Opacity ramp from `from` to `to` in `steps` discrete increments, holding
/// each step for `frames_per_step` frames.
#[derive(Debug, Clone)]
pub struct FadeRamp {
    from: f32,
    to: f32,
    steps: u32,
    frames_per_step: u32,
    frame: u32,
}

impl FadeRamp {
    pub fn new(from: f32, to: f32, steps: u32, frames_per_step: u32) -> Self {
        Self {
            from,
            to,
            steps: steps.max(1),
            frames_per_step: frames_per_step.max(1),
            frame: 0,
        }
    }

    pub fn fade_in(steps: u32, frames_per_step: u32) -> Self {
        Self::new(0.0, 1.0, steps, frames_per_step)
    }

    pub fn total_frames(&self) -> u32 {
        self.steps * self.frames_per_step
    }

    /// Steps completed so far.
    pub fn step(&self) -> u32 {
        (self.frame / self.frames_per_step).min(self.steps)
    }

    pub fn value(&self) -> f32 {
        let t = self.step() as f32 / self.steps as f32;
        self.from + (self.to - self.from) * t
    }

    pub fn is_complete(&self) -> bool {
        self.frame >= self.total_frames()
    }

    /// Advance one frame. Returns the value to apply, or `None` once the ramp
    /// had already completed before this call.
    pub fn advance(&mut self) -> Option<f32> {
        if self.is_complete() {
            return None;
        }
        self.frame += 1;
        Some(self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_in_steps() {
        let mut ramp = FadeRamp::fade_in(20, 3);
        assert_eq!(ramp.total_frames(), 60);
        assert_eq!(ramp.value(), 0.0);

        // Holds each step for three frames.
        assert_eq!(ramp.advance(), Some(0.0));
        assert_eq!(ramp.advance(), Some(0.0));
        let v = ramp.advance().unwrap();
        assert!((v - 0.05).abs() < 1e-6);

        let mut last = v;
        let mut frames = 3;
        while let Some(v) = ramp.advance() {
            assert!(v >= last);
            last = v;
            frames += 1;
        }
        assert_eq!(frames, 60);
        assert!((last - 1.0).abs() < 1e-6);
        assert!(ramp.is_complete());
        assert_eq!(ramp.advance(), None);
    }

    #[test]
    fn test_zero_steps_is_clamped() {
        let mut ramp = FadeRamp::fade_in(0, 0);
        assert_eq!(ramp.total_frames(), 1);
        assert_eq!(ramp.advance(), Some(1.0));
        assert!(ramp.is_complete());
    }
}
