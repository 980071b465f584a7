use std::path::{Path, PathBuf};

use clap::Parser;
use robo_client::cli::{CliArgs, Command};
use robo_client::project_config::{self, ResolvedConfig, ViewerConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    tracing::info!("robo-viewer v{}", env!("CARGO_PKG_VERSION"));

    if let Some(Command::Parts { model }) = &args.command {
        print_parts(Path::new(model));
        return;
    }

    let config = match resolve_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Project '{}' ({:?}) at {}",
        config.name,
        config.variant,
        config.project_root.display()
    );
    run_engine(config);
}

/// Use `--config`, else search upward for viewer.yaml, else run with defaults.
fn resolve_config(args: &CliArgs) -> Result<ResolvedConfig, project_config::ConfigError> {
    let cwd = std::env::current_dir().map_err(project_config::ConfigError::Io)?;
    let config_path = match &args.config {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(project_config::ConfigError::NotFound);
            }
            Some(path)
        }
        None => project_config::find_config(&cwd),
    };

    match config_path {
        Some(path) => {
            let config = project_config::load_config(&path)?;
            let root = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
            tracing::info!("Loaded {}", path.display());
            project_config::resolve(config, &root, args)
        }
        None => {
            tracing::info!("No {} found, using defaults", project_config::CONFIG_FILE);
            project_config::resolve(ViewerConfig::default(), &cwd, args)
        }
    }
}

fn print_parts(model: &Path) {
    match robo_client::assets::load_model(model) {
        Ok(loaded) => {
            for (index, name) in robo_client::assets::part_names(&loaded.asset).iter().enumerate() {
                println!("{:>4}  {}", index, name);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_engine(config: ResolvedConfig) {
    let event_loop =
        winit::event_loop::EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(winit::event_loop::ControlFlow::Poll);

    let mut engine = robo_client::engine::Engine::new(config);

    event_loop
        .run_app(&mut engine)
        .expect("Event loop error");
}
