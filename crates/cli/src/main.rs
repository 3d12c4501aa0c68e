mod args;
mod commands;
mod host;
mod output;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use vsf_core::Config;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("vsfhost=info".parse().unwrap())
                .add_directive("vsf_core=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        print_error(&err);
        std::process::exit(1);
    }
}

/// Execute a command with automatic error context
macro_rules! run_command {
    ($name:expr, $cmd:expr) => {
        $cmd.await
            .with_context(|| format!("Command '{}' failed", $name))
    };
}

async fn run() -> anyhow::Result<()> {
    let cli = commands::Cli::parse_from(args::normalize(std::env::args()));

    if let Some(commands::Commands::Completions { shell }) = &cli.command {
        commands::completions::run(*shell);
        return Ok(());
    }

    let config = cli.options.apply(Config::load());
    config.ensure_config_dir()?;

    match cli.command {
        None => run_command!("host", host::daemon::run(config)),
        Some(commands::Commands::Install) => {
            run_command!("install", commands::install::install(config))
        }
        Some(commands::Commands::Uninstall) => {
            run_command!("uninstall", commands::install::uninstall(config))
        }
        Some(commands::Commands::Start) => run_command!("start", commands::control::start(config)),
        Some(commands::Commands::Stop) => run_command!("stop", commands::control::stop(config)),
        Some(commands::Commands::Pause) => run_command!("pause", commands::control::pause(config)),
        Some(commands::Commands::Resume) => {
            run_command!("resume", commands::control::resume(config))
        }
        Some(commands::Commands::Status) => {
            run_command!("status", commands::control::status(config))
        }
        Some(commands::Commands::ConsoleHost) => {
            run_command!("consolehost", host::console::run(config))
        }
        Some(commands::Commands::Completions { .. }) => Ok(()),
    }
}

fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    // Print the error chain
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), cause);
        source = cause.source();
    }
}
