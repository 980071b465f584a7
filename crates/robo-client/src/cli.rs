use clap::{Parser, Subcommand};
use robo_core::config::Variant;

#[derive(Parser, Debug, Clone)]
#[command(name = "robo-viewer", version, about = "Interactive 3D robot viewer")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to viewer.yaml (defaults to searching upward from the working directory)
    #[arg(long)]
    pub config: Option<String>,

    /// Character model (.glb / .gltf)
    #[arg(long)]
    pub character: Option<String>,

    /// Environment model (.glb / .gltf)
    #[arg(long)]
    pub environment: Option<String>,

    /// Scene variant
    #[arg(long, value_enum)]
    pub variant: Option<Variant>,

    /// Path to the command socket for external control
    #[arg(long)]
    pub socket: Option<String>,

    /// Initial speed multiplier
    #[arg(long)]
    pub speed: Option<f32>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the part list of a model without opening a window
    Parts {
        /// Model file to inspect
        model: String,
    },
}
