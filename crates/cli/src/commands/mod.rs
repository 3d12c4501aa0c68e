pub mod control;
pub mod completions;
pub mod install;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use vsf_core::Config;

#[derive(Parser)]
#[command(name = "vsfhost")]
#[command(author, version, about = "Hosts virtual services and manages their lifecycle.", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub options: HostOptions,

    /// Without a command the host runs in the foreground as a service
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install the host as a service on this system
    Install,

    /// Uninstall the host service
    #[command(alias = "remove")]
    Uninstall,

    /// Start the host in the background
    Start,

    /// Stop the background host
    Stop,

    /// Pause the background host (stops its virtual services)
    Pause,

    /// Resume a paused host
    #[command(alias = "continue")]
    Resume,

    /// Show the state of the host and its virtual services
    Status,

    /// Run the host as an interactive console instead of a service
    #[command(name = "consolehost", alias = "console-host")]
    ConsoleHost,

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Overrides for the host configuration.
#[derive(Args, Default)]
pub struct HostOptions {
    /// Name the host is installed under
    #[arg(long, global = true)]
    pub service_name: Option<String>,

    /// Display name of the installed host
    #[arg(long, global = true)]
    pub display_name: Option<String>,

    /// Description of the installed host
    #[arg(long, global = true)]
    pub description: Option<String>,

    /// Folder holding services.yaml
    #[arg(long, global = true)]
    pub config_dir: Option<String>,
}

impl HostOptions {
    /// Apply the overrides on top of the loaded configuration.
    pub fn apply(self, mut config: Config) -> Config {
        if let Some(name) = self.service_name.filter(|s| !s.trim().is_empty()) {
            config.service_name = name;
        }
        if let Some(name) = self.display_name.filter(|s| !s.trim().is_empty()) {
            config.display_name = name;
        }
        if let Some(description) = self.description.filter(|s| !s.trim().is_empty()) {
            config.description = description;
        }
        if let Some(dir) = self.config_dir {
            config.set_config_dir(dir);
        }
        config
    }
}
