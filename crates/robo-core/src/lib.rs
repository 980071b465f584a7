pub mod bindings;
pub mod camera_follow;
pub mod components;
pub mod config;
pub mod events;
pub mod fade;
pub mod intent;
pub mod locomotion;
pub mod model;
pub mod overlay;
pub mod panel;
pub mod teleport;
pub mod transform;
pub mod viewer;
pub mod world;

pub use config::{ControllerConfig, Variant};
pub use viewer::{Viewer, ViewerError};
