//! viewer.yaml project configuration parsing.
//!
//! The file is optional: command-line flags override anything it sets, and
//! every field has a default so a bare `robo-viewer` works in a directory that
//! contains `model/robot.glb` and `environment/environment.glb`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use robo_core::config::{ControllerConfig, Variant};

use crate::cli::CliArgs;

pub const CONFIG_FILE: &str = "viewer.yaml";
pub const DEFAULT_SOCKET: &str = "/tmp/robo-viewer.sock";

#[derive(Debug, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_character")]
    pub character: String,
    #[serde(default = "default_environment")]
    pub environment: Option<String>,
    #[serde(default = "default_variant")]
    pub variant: Variant,
    /// Field-by-field overrides applied on top of the variant preset.
    #[serde(default)]
    pub controller: Option<serde_yaml::Value>,
    #[serde(default)]
    pub socket: Option<String>,
    /// Key bindings file, relative to the project root.
    #[serde(default)]
    pub bindings: Option<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            character: default_character(),
            environment: default_environment(),
            variant: default_variant(),
            controller: None,
            socket: None,
            bindings: None,
        }
    }
}

fn default_name() -> String {
    "Robot Viewer".to_string()
}

fn default_character() -> String {
    "model/robot.glb".to_string()
}

fn default_environment() -> Option<String> {
    Some("environment/environment.glb".to_string())
}

fn default_variant() -> Variant {
    Variant::Additive
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound,
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound => write!(f, "{} not found", CONFIG_FILE),
            ConfigError::Io(e) => write!(f, "IO error reading {}: {}", CONFIG_FILE, e),
            ConfigError::Parse(e) => write!(f, "Failed to parse {}: {}", CONFIG_FILE, e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Walk up from `start_dir` looking for `viewer.yaml`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

pub fn load_config(path: &Path) -> Result<ViewerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<ViewerConfig, ConfigError> {
    serde_yaml::from_str(contents).map_err(ConfigError::Parse)
}

/// Fully resolved startup settings: project file merged with CLI flags.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub name: String,
    pub project_root: PathBuf,
    pub character: PathBuf,
    pub environment: Option<PathBuf>,
    pub variant: Variant,
    pub controller: ControllerConfig,
    pub socket: String,
    pub bindings: PathBuf,
}

/// Merge the project file (if any) with command-line overrides.
pub fn resolve(config: ViewerConfig, project_root: &Path, args: &CliArgs) -> Result<ResolvedConfig, ConfigError> {
    let variant = args.variant.unwrap_or(config.variant);

    let mut controller = ControllerConfig::preset(variant);
    if let Some(overrides) = &config.controller {
        controller = controller.with_overrides(overrides).map_err(ConfigError::Parse)?;
    }
    if let Some(speed) = args.speed {
        if !controller.accepts_speed(speed) {
            return Err(ConfigError::Invalid(format!(
                "speed {} outside {}..={}",
                speed, controller.speed_multiplier_min, controller.speed_multiplier_max
            )));
        }
        controller.speed_multiplier = speed;
    }

    let character = args.character.clone().unwrap_or(config.character);
    let environment = args.environment.clone().or(config.environment);

    Ok(ResolvedConfig {
        name: config.name,
        project_root: project_root.to_path_buf(),
        character: project_root.join(character),
        environment: environment.map(|e| project_root.join(e)),
        variant,
        controller,
        socket: args
            .socket
            .clone()
            .or(config.socket)
            .unwrap_or_else(|| DEFAULT_SOCKET.to_string()),
        bindings: project_root.join(config.bindings.as_deref().unwrap_or("input/bindings.yaml")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["robo-viewer"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_parse_full_config() {
        let cfg = parse_config(
            "name: Demo\ncharacter: assets/bot.glb\nenvironment: null\nvariant: teleport\n\
             controller:\n  gravity: 0.02\nsocket: /tmp/demo.sock\n",
        )
        .unwrap();
        assert_eq!(cfg.name, "Demo");
        assert_eq!(cfg.variant, Variant::Teleport);
        assert!(cfg.environment.is_none());

        let resolved = resolve(cfg, Path::new("/proj"), &args(&[])).unwrap();
        assert!(resolved.controller.teleport);
        assert!((resolved.controller.gravity - 0.02).abs() < 1e-6);
        assert_eq!(resolved.character, PathBuf::from("/proj/assets/bot.glb"));
        assert_eq!(resolved.socket, "/tmp/demo.sock");
    }

    #[test]
    fn test_defaults_when_empty() {
        let cfg = parse_config("{}").unwrap();
        let resolved = resolve(cfg, Path::new("."), &args(&[])).unwrap();
        assert_eq!(resolved.variant, Variant::Additive);
        assert_eq!(resolved.socket, DEFAULT_SOCKET);
        assert!(resolved.environment.is_some());
        assert!(resolved.bindings.ends_with("input/bindings.yaml"));
    }

    #[test]
    fn test_cli_overrides() {
        let cfg = ViewerConfig::default();
        let resolved = resolve(
            cfg,
            Path::new("."),
            &args(&["--variant", "simple", "--speed", "1.5", "--socket", "/tmp/x.sock"]),
        )
        .unwrap();
        assert_eq!(resolved.variant, Variant::Simple);
        assert!(!resolved.controller.reverse_toggle);
        assert_eq!(resolved.controller.speed_multiplier, 1.5);
        assert_eq!(resolved.socket, "/tmp/x.sock");
    }

    #[test]
    fn test_rejects_bad_variant_and_speed() {
        assert!(CliArgs::try_parse_from(["robo-viewer", "--variant", "fancy"]).is_err());
        let teleport = CliArgs::try_parse_from(["robo-viewer", "--variant", "teleport"]).unwrap();
        assert_eq!(teleport.variant, Some(Variant::Teleport));
        assert!(matches!(
            resolve(ViewerConfig::default(), Path::new("."), &args(&["--speed", "9"])),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_find_config_walks_up() {
        let root = std::env::temp_dir().join(format!("robo-viewer-cfg-{}", std::process::id()));
        let nested = root.join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE), "name: x\n").unwrap();
        assert_eq!(find_config(&nested), Some(root.join(CONFIG_FILE)));
        std::fs::remove_dir_all(&root).unwrap();
    }
}
