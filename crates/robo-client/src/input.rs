use std::collections::{HashMap, HashSet};
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use winit::event::{ElementState, Touch, TouchPhase, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use robo_core::intent::{joystick_from_drag, InputSnapshot, JoystickInput, KeySnapshot};

/// Maximum joystick drag in logical pixels.
pub const JOYSTICK_MAX_DISTANCE: f32 = 35.0;
const JOYSTICK_BASE_RADIUS: f32 = 60.0;
const JUMP_BUTTON_RADIUS: f32 = 40.0;
const TOUCH_MARGIN: f32 = 90.0;

/// Action names mapped to key names, loaded from input/bindings.yaml.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputBindings {
    #[serde(default)]
    pub actions: HashMap<String, Vec<String>>,
}

impl Default for InputBindings {
    fn default() -> Self {
        let mut actions = HashMap::new();
        actions.insert("forward".into(), vec!["W".into(), "ArrowUp".into()]);
        actions.insert("back".into(), vec!["S".into(), "ArrowDown".into()]);
        actions.insert("turn_left".into(), vec!["A".into(), "ArrowLeft".into()]);
        actions.insert("turn_right".into(), vec!["D".into(), "ArrowRight".into()]);
        actions.insert("jump".into(), vec!["Space".into()]);
        actions.insert("bow_modifier".into(), vec!["ControlLeft".into(), "ControlRight".into()]);
        actions.insert("bow".into(), vec!["B".into()]);
        Self { actions }
    }
}

impl InputBindings {
    /// Fill in any action the file did not mention from the defaults.
    fn with_defaults(mut self) -> Self {
        for (action, keys) in InputBindings::default().actions {
            self.actions.entry(action).or_insert(keys);
        }
        self
    }
}

/// Load input bindings from a YAML file, with defaults as fallback.
pub fn load_bindings(path: &Path) -> InputBindings {
    if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<InputBindings>(&contents) {
                Ok(bindings) => {
                    tracing::info!("Loaded input bindings from {:?}", path);
                    return bindings.with_defaults();
                }
                Err(e) => tracing::warn!("Failed to parse bindings.yaml: {}", e),
            },
            Err(e) => tracing::warn!("Failed to read bindings.yaml: {}", e),
        }
    }
    tracing::info!("Using default input bindings");
    InputBindings::default()
}

/// Maps key name strings to winit KeyCode.
pub fn key_name_to_code(name: &str) -> Option<KeyCode> {
    let code = match name {
        "A" => KeyCode::KeyA,
        "B" => KeyCode::KeyB,
        "C" => KeyCode::KeyC,
        "D" => KeyCode::KeyD,
        "E" => KeyCode::KeyE,
        "F" => KeyCode::KeyF,
        "J" => KeyCode::KeyJ,
        "K" => KeyCode::KeyK,
        "L" => KeyCode::KeyL,
        "Q" => KeyCode::KeyQ,
        "R" => KeyCode::KeyR,
        "S" => KeyCode::KeyS,
        "W" => KeyCode::KeyW,
        "X" => KeyCode::KeyX,
        "Z" => KeyCode::KeyZ,
        "Space" => KeyCode::Space,
        "ShiftLeft" => KeyCode::ShiftLeft,
        "ShiftRight" => KeyCode::ShiftRight,
        "ControlLeft" => KeyCode::ControlLeft,
        "ControlRight" => KeyCode::ControlRight,
        "AltLeft" => KeyCode::AltLeft,
        "AltRight" => KeyCode::AltRight,
        "Escape" => KeyCode::Escape,
        "Enter" => KeyCode::Enter,
        "ArrowUp" => KeyCode::ArrowUp,
        "ArrowDown" => KeyCode::ArrowDown,
        "ArrowLeft" => KeyCode::ArrowLeft,
        "ArrowRight" => KeyCode::ArrowRight,
        _ => return None,
    };
    Some(code)
}

/// On-screen touch regions in logical pixels, recomputed on resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchLayout {
    pub joystick_center: Vec2,
    pub jump_center: Vec2,
}

impl TouchLayout {
    /// Joystick in the lower-left corner, jump button in the lower-right.
    pub fn for_size(width: f32, height: f32) -> Self {
        Self {
            joystick_center: Vec2::new(TOUCH_MARGIN, height - TOUCH_MARGIN),
            jump_center: Vec2::new(width - TOUCH_MARGIN, height - TOUCH_MARGIN),
        }
    }

    pub fn hits_joystick(&self, point: Vec2) -> bool {
        point.distance(self.joystick_center) <= JOYSTICK_BASE_RADIUS
    }

    pub fn hits_jump(&self, point: Vec2) -> bool {
        point.distance(self.jump_center) <= JUMP_BUTTON_RADIUS
    }
}

/// Keyboard and touch state, sampled into an [`InputSnapshot`] once per frame.
pub struct InputState {
    bindings: InputBindings,
    keys_held: HashSet<KeyCode>,
    layout: TouchLayout,
    scale_factor: f64,
    joystick_touch: Option<u64>,
    joystick_vector: Vec2,
    jump_touch: Option<u64>,
    // Synthetic input queue (command socket / tests)
    synthetic_keys_pressed: HashSet<KeyCode>,
    synthetic_keys_released: HashSet<KeyCode>,
    synthetic_joystick: Option<Vec2>,
    synthetic_jump_button: bool,
}

impl InputState {
    pub fn new(bindings: InputBindings) -> Self {
        Self {
            bindings,
            keys_held: HashSet::new(),
            layout: TouchLayout::for_size(1280.0, 720.0),
            scale_factor: 1.0,
            joystick_touch: None,
            joystick_vector: Vec2::ZERO,
            jump_touch: None,
            synthetic_keys_pressed: HashSet::new(),
            synthetic_keys_released: HashSet::new(),
            synthetic_joystick: None,
            synthetic_jump_button: false,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32, scale_factor: f64) {
        self.scale_factor = scale_factor.max(f64::EPSILON);
        let logical_w = (width as f64 / self.scale_factor) as f32;
        let logical_h = (height as f64 / self.scale_factor) as f32;
        self.layout = TouchLayout::for_size(logical_w, logical_h);
    }

    /// Apply queued synthetic key changes. Call at the start of each frame.
    pub fn begin_frame(&mut self) {
        for key in self.synthetic_keys_pressed.drain() {
            self.keys_held.insert(key);
        }
        for key in self.synthetic_keys_released.drain() {
            self.keys_held.remove(&key);
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key_code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            self.keys_held.insert(key_code);
                        }
                        ElementState::Released => {
                            self.keys_held.remove(&key_code);
                        }
                    }
                }
            }
            WindowEvent::Touch(touch) => self.handle_touch(touch),
            WindowEvent::Focused(false) => {
                // Key-up events are lost while unfocused.
                self.keys_held.clear();
            }
            _ => {}
        }
    }

    fn handle_touch(&mut self, touch: &Touch) {
        let point = Vec2::new(
            (touch.location.x / self.scale_factor) as f32,
            (touch.location.y / self.scale_factor) as f32,
        );
        match touch.phase {
            TouchPhase::Started => {
                if self.joystick_touch.is_none() && self.layout.hits_joystick(point) {
                    self.joystick_touch = Some(touch.id);
                    self.joystick_vector =
                        joystick_from_drag(point - self.layout.joystick_center, JOYSTICK_MAX_DISTANCE);
                } else if self.jump_touch.is_none() && self.layout.hits_jump(point) {
                    self.jump_touch = Some(touch.id);
                }
            }
            TouchPhase::Moved => {
                if self.joystick_touch == Some(touch.id) {
                    self.joystick_vector =
                        joystick_from_drag(point - self.layout.joystick_center, JOYSTICK_MAX_DISTANCE);
                }
            }
            TouchPhase::Ended | TouchPhase::Cancelled => {
                if self.joystick_touch == Some(touch.id) {
                    self.joystick_touch = None;
                    self.joystick_vector = Vec2::ZERO;
                }
                if self.jump_touch == Some(touch.id) {
                    self.jump_touch = None;
                }
            }
        }
    }

    /// Check if a named action has any of its keys held.
    pub fn pressed(&self, action: &str) -> bool {
        self.bindings
            .actions
            .get(action)
            .map(|keys| {
                keys.iter()
                    .filter_map(|name| key_name_to_code(name))
                    .any(|code| self.keys_held.contains(&code))
            })
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> InputSnapshot {
        let joystick = match self.synthetic_joystick {
            Some(vector) => JoystickInput { active: true, vector },
            None => JoystickInput {
                active: self.joystick_touch.is_some(),
                vector: self.joystick_vector,
            },
        };
        InputSnapshot {
            keys: KeySnapshot {
                forward: self.pressed("forward"),
                back: self.pressed("back"),
                left: self.pressed("turn_left"),
                right: self.pressed("turn_right"),
                jump: self.pressed("jump"),
                bow_modifier: self.pressed("bow_modifier"),
                bow_key: self.pressed("bow"),
            },
            joystick,
            jump_button: self.jump_touch.is_some() || self.synthetic_jump_button,
        }
    }

    /// Queue a synthetic key press. Cancels a pending release for the same key.
    pub fn inject_key_press(&mut self, key_name: &str) -> bool {
        let Some(code) = key_name_to_code(key_name) else {
            return false;
        };
        self.synthetic_keys_pressed.insert(code);
        self.synthetic_keys_released.remove(&code);
        true
    }

    /// Queue a synthetic key release. Cancels a pending press for the same key.
    pub fn inject_key_release(&mut self, key_name: &str) -> bool {
        let Some(code) = key_name_to_code(key_name) else {
            return false;
        };
        self.synthetic_keys_released.insert(code);
        self.synthetic_keys_pressed.remove(&code);
        true
    }

    /// Hold the joystick at `vector` (`None` releases it).
    pub fn inject_joystick(&mut self, vector: Option<Vec2>) {
        self.synthetic_joystick = vector;
    }

    pub fn inject_jump_button(&mut self, held: bool) {
        self.synthetic_jump_button = held;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = InputBindings::default();
        assert!(bindings.actions["forward"].contains(&"ArrowUp".to_string()));
        assert!(bindings.actions.contains_key("bow_modifier"));
    }

    #[test]
    fn test_key_name_mapping() {
        assert_eq!(key_name_to_code("W"), Some(KeyCode::KeyW));
        assert_eq!(key_name_to_code("ArrowDown"), Some(KeyCode::ArrowDown));
        assert_eq!(key_name_to_code("Invalid"), None);
    }

    #[test]
    fn test_partial_bindings_file_keeps_defaults() {
        let bindings: InputBindings = serde_yaml::from_str("actions:\n  jump: [J]\n").unwrap();
        let bindings = bindings.with_defaults();
        assert_eq!(bindings.actions["jump"], vec!["J".to_string()]);
        assert!(bindings.actions.contains_key("forward"));
    }

    #[test]
    fn test_snapshot_from_keys() {
        let mut state = InputState::new(InputBindings::default());
        state.keys_held.insert(KeyCode::ArrowUp);
        state.keys_held.insert(KeyCode::ControlLeft);
        state.keys_held.insert(KeyCode::KeyB);
        let snap = state.snapshot();
        assert!(snap.keys.forward);
        assert!(snap.keys.bow_modifier && snap.keys.bow_key);
        assert!(!snap.keys.back);
        assert!(!snap.joystick.active);
    }

    #[test]
    fn test_synthetic_keys_apply_next_frame() {
        let mut state = InputState::new(InputBindings::default());
        assert!(state.inject_key_press("S"));
        assert!(!state.snapshot().keys.back);
        state.begin_frame();
        assert!(state.snapshot().keys.back);
        state.inject_key_release("S");
        state.begin_frame();
        assert!(!state.snapshot().keys.back);
        assert!(!state.inject_key_press("Nope"));
    }

    #[test]
    fn test_synthetic_joystick_and_jump_button() {
        let mut state = InputState::new(InputBindings::default());
        state.inject_joystick(Some(Vec2::new(0.0, -1.0)));
        state.inject_jump_button(true);
        let snap = state.snapshot();
        assert!(snap.joystick.active);
        assert_eq!(snap.joystick.vector, Vec2::new(0.0, -1.0));
        assert!(snap.jump_button);
    }

    #[test]
    fn test_touch_layout_regions() {
        let layout = TouchLayout::for_size(800.0, 600.0);
        assert!(layout.hits_joystick(Vec2::new(90.0, 510.0)));
        assert!(!layout.hits_joystick(Vec2::new(700.0, 510.0)));
        assert!(layout.hits_jump(Vec2::new(710.0, 510.0)));
    }
}
