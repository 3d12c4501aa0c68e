//! Interactive console host.

use crate::output::{print_outcome, print_outcomes, print_reports, print_running};
use colored::Colorize;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use vsf_core::{Config, ServiceManager};

const HEADER: &str = "═════════════════════════════════[ Virtual Services Console Host ]════";
const FOOTER: &str = "══════════════════════════════════════════════════════════════════════";
const USAGE: &str = "  start [name]  - Starts all virtual services, or the named one.
  stop [name]   - Stops all virtual services, or the named one.
  report        - Asks the virtual services to report their status.
  reset <name>  - Clears the recorded error of a service.
  list          - Lists running services and their endpoints.
  exit          - Stops all services and exits.";

/// A line typed at the console prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start(Option<String>),
    Stop(Option<String>),
    Report,
    Reset(Option<String>),
    List,
    Help,
    Exit,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return ConsoleCommand::Empty;
        };
        let argument = words.next().map(str::to_string);

        match command.to_ascii_lowercase().as_str() {
            "start" => ConsoleCommand::Start(argument),
            "stop" => ConsoleCommand::Stop(argument),
            "report" | "status" => ConsoleCommand::Report,
            "reset" => ConsoleCommand::Reset(argument),
            "list" => ConsoleCommand::List,
            "help" | "?" => ConsoleCommand::Help,
            "exit" | "e" | "quit" => ConsoleCommand::Exit,
            _ => ConsoleCommand::Unknown(command.to_string()),
        }
    }
}

/// Run one command against the manager. Returns false once the console should exit.
pub async fn execute(manager: &mut ServiceManager, command: ConsoleCommand) -> bool {
    match command {
        ConsoleCommand::Start(None) => match manager.start_services().await {
            Ok(outcomes) => print_outcomes(&outcomes),
            Err(e) => println!("  {} {}", "✗".red(), e),
        },
        ConsoleCommand::Start(Some(name)) => match manager.start_service(&name).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => println!("  {} {}", "✗".red(), e),
        },
        ConsoleCommand::Stop(None) => print_outcomes(&manager.stop_services().await),
        ConsoleCommand::Stop(Some(name)) => print_outcome(&manager.stop_service(&name).await),
        ConsoleCommand::Report => print_reports(&manager.report_services().await),
        ConsoleCommand::Reset(Some(name)) => print_outcome(&manager.reset_error(&name)),
        ConsoleCommand::Reset(None) => println!("  {} reset needs a service name", "⚠".yellow()),
        ConsoleCommand::List => print_running(&manager.running()),
        ConsoleCommand::Help => println!("{}", USAGE),
        ConsoleCommand::Empty => {}
        ConsoleCommand::Unknown(command) => {
            println!(" {} Unknown command '{}'", "WARNING:".yellow(), command);
            println!(" Valid commands:\n{}", USAGE);
        }
        ConsoleCommand::Exit => return false,
    }
    true
}

/// Run the console host until `exit` or end of input.
pub async fn run(config: Config) -> anyhow::Result<()> {
    println!("{}", HEADER);
    println!("{}", USAGE);
    println!("{}", FOOTER);

    let mut manager = ServiceManager::from_config(&config);
    println!("Initializing services manager...");
    manager.initialize()?;

    println!("Starting virtual services...");
    let outcomes = manager.start_services().await?;
    print_outcomes(&outcomes);
    println!("{}", FOOTER);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Cmd> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        if !execute(&mut manager, ConsoleCommand::parse(&line)).await {
            break;
        }
    }

    println!("{}", FOOTER);
    println!("Stopping virtual services...");
    print_outcomes(&manager.stop_services().await);
    println!("Exiting...");
    Ok(())
}
