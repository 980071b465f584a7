//! Third-person follow camera.
//!
//! The camera position and look target are recomputed from the character pose
//! every frame, including frames without input, so the view keeps easing after
//! the character stops turning.

use glam::{Mat4, Quat, Vec3};
use serde::Serialize;

use crate::config::ControllerConfig;
use crate::locomotion::CharacterPose;

/// Fixed follow-camera geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraRig {
    /// Offset from the character before rotating by its heading.
    pub offset: Vec3,
    pub look_ahead: f32,
    pub look_height: f32,
    /// Fraction of the remaining distance covered per frame.
    pub smoothing: f32,
}

impl CameraRig {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            offset: config.camera_offset,
            look_ahead: config.camera_look_ahead,
            look_height: config.camera_look_height,
            smoothing: config.camera_smoothing,
        }
    }

    pub fn desired_position(&self, pose: &CharacterPose) -> Vec3 {
        pose.position + Quat::from_rotation_y(pose.heading) * self.offset
    }

    /// Point the camera looks at: behind the character along its facing.
    pub fn look_target(&self, pose: &CharacterPose) -> Vec3 {
        pose.position - pose.facing() * self.look_ahead + Vec3::Y * self.look_height
    }
}

/// Smoothed camera that trails the character.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraFollow {
    pub rig: CameraRig,
    pub position: Vec3,
    pub target: Vec3,
}

impl CameraFollow {
    pub fn new(rig: CameraRig, initial_position: Vec3) -> Self {
        Self {
            rig,
            position: initial_position,
            target: Vec3::ZERO,
        }
    }

    /// Lerp toward the desired position and re-aim. Must run every frame, even
    /// without input, since the heading keeps relaxing.
    pub fn update(&mut self, pose: &CharacterPose) {
        let desired = self.rig.desired_position(pose);
        self.position = self.position.lerp(desired, self.rig.smoothing);
        self.target = self.rig.look_target(pose);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn rig() -> CameraRig {
        CameraRig::from_config(&ControllerConfig::default())
    }

    #[test]
    fn test_offset_rotates_with_heading() {
        let rig = rig();
        let pose = CharacterPose::new(Vec3::ZERO, 0.0);
        assert!((rig.desired_position(&pose) - Vec3::new(0.0, 60.0, -100.0)).length() < 1e-4);

        let pose = CharacterPose::new(Vec3::ZERO, PI);
        assert!((rig.desired_position(&pose) - Vec3::new(0.0, 60.0, 100.0)).length() < 1e-3);

        let pose = CharacterPose::new(Vec3::ZERO, PI / 2.0);
        assert!((rig.desired_position(&pose) - Vec3::new(-100.0, 60.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_camera_stays_behind_facing() {
        let rig = rig();
        for heading in [0.0, 0.7, 2.0, -1.3] {
            let pose = CharacterPose::new(Vec3::ZERO, heading);
            let flat = rig.desired_position(&pose) * Vec3::new(1.0, 0.0, 1.0);
            assert!(flat.normalize().dot(pose.facing()) < -0.999);
        }
    }

    #[test]
    fn test_look_target_is_behind_character() {
        let rig = rig();
        let pose = CharacterPose::new(Vec3::new(5.0, 1.0, 5.0), 0.0);
        let target = rig.look_target(&pose);
        assert!((target - Vec3::new(5.0, 1.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn test_lerp_converges() {
        let mut cam = CameraFollow::new(rig(), Vec3::new(0.0, 3.0, 8.0));
        let pose = CharacterPose::new(Vec3::ZERO, 0.0);
        let desired = cam.rig.desired_position(&pose);
        let first_gap = (desired - cam.position).length();
        cam.update(&pose);
        let gap = (desired - cam.position).length();
        assert!((gap - first_gap * 0.9).abs() < 1e-3);
        for _ in 0..200 {
            cam.update(&pose);
        }
        assert!((cam.position - desired).length() < 1e-3);
    }
}
