//! Per-frame input snapshot and its reduction to a single movement intent.
//!
//! The windowed shell polls keys and touch state into an [`InputSnapshot`]
//! at the start of every frame; [`InputAggregator::aggregate`] turns that
//! into a [`FrameIntent`]. Edge-triggered controls go through [`EdgeLatch`].

use glam::Vec2;
use serde::Serialize;

use crate::config::{ControllerConfig, InputMerge};

/// Held state of every discrete control, sampled once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeySnapshot {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub bow_modifier: bool,
    pub bow_key: bool,
}

impl KeySnapshot {
    pub fn any_movement(&self) -> bool {
        self.forward || self.back || self.left || self.right
    }
}

/// Touch joystick state. `vector` is in stick space: +x right, +y down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct JoystickInput {
    pub active: bool,
    pub vector: Vec2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InputSnapshot {
    pub keys: KeySnapshot,
    pub joystick: JoystickInput,
    /// On-screen jump button held.
    pub jump_button: bool,
}

/// What the controller should do this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameIntent {
    /// Positive turns left (heading increases).
    pub turn: f32,
    /// Positive walks along the current facing.
    pub forward: f32,
    /// Positive steps to the character's left.
    pub strafe: f32,
    pub jump: bool,
    pub bow: bool,
    pub reverse: bool,
}

impl FrameIntent {
    pub fn is_moving(&self) -> bool {
        self.forward != 0.0 || self.turn != 0.0 || self.strafe != 0.0
    }
}

/// Fires once on the released→pressed transition; re-arms only on release.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeLatch {
    was_pressed: bool,
}

impl EdgeLatch {
    pub fn update(&mut self, pressed: bool) -> bool {
        let fired = pressed && !self.was_pressed;
        self.was_pressed = pressed;
        fired
    }
}

/// Convert a touch drag offset (in pixels from the joystick centre) into a
/// stick vector, clamping the drag to `max_distance`.
pub fn joystick_from_drag(delta: Vec2, max_distance: f32) -> Vec2 {
    if max_distance <= 0.0 {
        return Vec2::ZERO;
    }
    let distance = delta.length();
    let clamped = if distance > max_distance {
        delta / distance * max_distance
    } else {
        delta
    };
    clamped / max_distance
}

/// Clamp to the unit circle, then zero each axis whose magnitude is within the deadzone.
pub fn apply_deadzone(vector: Vec2, deadzone: f32) -> Vec2 {
    let v = if vector.length_squared() > 1.0 {
        vector.normalize()
    } else {
        vector
    };
    Vec2::new(
        if v.x.abs() > deadzone { v.x } else { 0.0 },
        if v.y.abs() > deadzone { v.y } else { 0.0 },
    )
}

/// Reduces raw snapshots to intents, owning the edge latches.
#[derive(Debug, Clone)]
pub struct InputAggregator {
    merge: InputMerge,
    reverse_toggle: bool,
    joystick_strafe: bool,
    deadzone: f32,
    joystick_speed_scale: f32,
    jump_latch: EdgeLatch,
    bow_latch: EdgeLatch,
    reverse_latch: EdgeLatch,
}

impl InputAggregator {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            merge: config.input_merge,
            reverse_toggle: config.reverse_toggle,
            joystick_strafe: config.joystick_strafe,
            deadzone: config.joystick_deadzone,
            joystick_speed_scale: config.joystick_speed_scale,
            jump_latch: EdgeLatch::default(),
            bow_latch: EdgeLatch::default(),
            reverse_latch: EdgeLatch::default(),
        }
    }

    pub fn aggregate(&mut self, snapshot: &InputSnapshot) -> FrameIntent {
        let keys = &snapshot.keys;

        let mut turn = 0.0;
        if keys.left {
            turn += 1.0;
        }
        if keys.right {
            turn -= 1.0;
        }

        let mut forward = 0.0;
        if keys.forward {
            forward += 1.0;
        }
        if keys.back && !self.reverse_toggle {
            forward -= 1.0;
        }

        let reverse = self.reverse_toggle && self.reverse_latch.update(keys.back);
        if !self.reverse_toggle {
            self.reverse_latch.update(false);
        }

        let mut strafe = 0.0;
        let joystick_allowed = match self.merge {
            InputMerge::Additive => true,
            InputMerge::Exclusive => !keys.any_movement(),
        };
        if snapshot.joystick.active && joystick_allowed {
            let stick = apply_deadzone(snapshot.joystick.vector, self.deadzone);
            // Screen y grows downward; pushing up walks forward.
            forward += -stick.y * self.joystick_speed_scale;
            turn += -stick.x;
            if self.joystick_strafe {
                strafe += -stick.x * self.joystick_speed_scale;
            }
        }

        FrameIntent {
            turn: turn.clamp(-1.0, 1.0),
            forward: forward.clamp(-1.0, 1.0),
            strafe: strafe.clamp(-1.0, 1.0),
            jump: self.jump_latch.update(keys.jump || snapshot.jump_button),
            bow: self.bow_latch.update(keys.bow_modifier && keys.bow_key),
            reverse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;

    fn held(keys: KeySnapshot) -> InputSnapshot {
        InputSnapshot {
            keys,
            ..Default::default()
        }
    }

    #[test]
    fn test_edge_latch_fires_once_per_press() {
        let mut latch = EdgeLatch::default();
        assert!(latch.update(true));
        assert!(!latch.update(true));
        assert!(!latch.update(true));
        assert!(!latch.update(false));
        assert!(latch.update(true));
    }

    #[test]
    fn test_joystick_from_drag_clamps() {
        let v = joystick_from_drag(Vec2::new(70.0, 0.0), 35.0);
        assert!((v - Vec2::new(1.0, 0.0)).length() < 1e-6);
        let v = joystick_from_drag(Vec2::new(0.0, 17.5), 35.0);
        assert!((v.y - 0.5).abs() < 1e-6);
        let v = joystick_from_drag(Vec2::new(30.0, 30.0), 35.0);
        assert!(v.length() <= 1.0 + 1e-6);
    }

    #[test]
    fn test_deadzone_per_axis() {
        let v = apply_deadzone(Vec2::new(0.05, 0.8), 0.1);
        assert_eq!(v.x, 0.0);
        assert!((v.y - 0.8).abs() < 1e-6);
        let v = apply_deadzone(Vec2::new(3.0, 0.0), 0.1);
        assert!((v.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_turn_sign_convention() {
        let mut agg = InputAggregator::new(&ControllerConfig::default());
        let intent = agg.aggregate(&held(KeySnapshot {
            left: true,
            ..Default::default()
        }));
        assert_eq!(intent.turn, 1.0);
        let intent = agg.aggregate(&held(KeySnapshot {
            right: true,
            ..Default::default()
        }));
        assert_eq!(intent.turn, -1.0);
    }

    #[test]
    fn test_back_key_reverses_or_walks_backward() {
        let mut rich = InputAggregator::new(&ControllerConfig::preset(Variant::Additive));
        let back = held(KeySnapshot {
            back: true,
            ..Default::default()
        });
        let intent = rich.aggregate(&back);
        assert!(intent.reverse);
        assert_eq!(intent.forward, 0.0);

        let mut simple = InputAggregator::new(&ControllerConfig::preset(Variant::Simple));
        let intent = simple.aggregate(&back);
        assert!(!intent.reverse);
        assert_eq!(intent.forward, -1.0);
    }

    #[test]
    fn test_reverse_held_toggles_once() {
        let mut agg = InputAggregator::new(&ControllerConfig::default());
        let back = held(KeySnapshot {
            back: true,
            ..Default::default()
        });
        let fired = (0..30).filter(|_| agg.aggregate(&back).reverse).count();
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_bow_requires_chord() {
        let mut agg = InputAggregator::new(&ControllerConfig::default());
        let only_key = held(KeySnapshot {
            bow_key: true,
            ..Default::default()
        });
        assert!(!agg.aggregate(&only_key).bow);
        let chord = held(KeySnapshot {
            bow_key: true,
            bow_modifier: true,
            ..Default::default()
        });
        assert!(agg.aggregate(&chord).bow);
        assert!(!agg.aggregate(&chord).bow);
    }

    #[test]
    fn test_jump_button_and_key_share_latch() {
        let mut agg = InputAggregator::new(&ControllerConfig::default());
        let button = InputSnapshot {
            jump_button: true,
            ..Default::default()
        };
        assert!(agg.aggregate(&button).jump);
        let both = InputSnapshot {
            jump_button: true,
            keys: KeySnapshot {
                jump: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!agg.aggregate(&both).jump);
    }

    #[test]
    fn test_additive_merge_sums_sources() {
        let mut agg = InputAggregator::new(&ControllerConfig::preset(Variant::Additive));
        let snapshot = InputSnapshot {
            keys: KeySnapshot {
                left: true,
                ..Default::default()
            },
            joystick: JoystickInput {
                active: true,
                vector: Vec2::new(0.0, -1.0),
            },
            jump_button: false,
        };
        let intent = agg.aggregate(&snapshot);
        assert_eq!(intent.turn, 1.0);
        assert!(intent.forward > 0.0);
    }

    #[test]
    fn test_exclusive_merge_ignores_joystick_while_keys_held() {
        let mut agg = InputAggregator::new(&ControllerConfig::preset(Variant::Simple));
        let joystick = JoystickInput {
            active: true,
            vector: Vec2::new(0.0, -1.0),
        };
        let with_keys = InputSnapshot {
            keys: KeySnapshot {
                left: true,
                ..Default::default()
            },
            joystick,
            jump_button: false,
        };
        assert_eq!(agg.aggregate(&with_keys).forward, 0.0);

        let idle_keys = InputSnapshot {
            joystick,
            ..Default::default()
        };
        assert!(agg.aggregate(&idle_keys).forward > 0.0);
    }

    #[test]
    fn test_inactive_joystick_is_ignored() {
        let mut agg = InputAggregator::new(&ControllerConfig::default());
        let snapshot = InputSnapshot {
            joystick: JoystickInput {
                active: false,
                vector: Vec2::new(1.0, 1.0),
            },
            ..Default::default()
        };
        assert!(!agg.aggregate(&snapshot).is_moving());
    }
}
