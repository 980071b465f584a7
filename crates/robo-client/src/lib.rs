pub mod assets;
pub mod camera;
pub mod cli;
pub mod command;
pub mod engine;
pub mod input;
pub mod mesh;
pub mod project_config;
pub mod renderer;
