//! Operator-facing lines for manager outcomes and reports.

use colored::Colorize;
use vsf_core::{LifecycleState, Outcome, RunningInfo, ServiceReport};

pub fn print_outcomes(outcomes: &[Outcome]) {
    if outcomes.is_empty() {
        println!("  No services affected");
    }
    for outcome in outcomes {
        print_outcome(outcome);
    }
}

pub fn print_outcome(outcome: &Outcome) {
    let marker = match outcome {
        Outcome::Started { .. } | Outcome::Stopped { .. } | Outcome::Reset { .. } => {
            "✓".green()
        }
        Outcome::AlreadyRunning { .. } | Outcome::NotFound { .. } | Outcome::NotRunning { .. } => {
            "⚠".yellow()
        }
        Outcome::Failed { .. } => "✗".red(),
    };
    println!("  {} {}", marker, outcome);

    for warning in outcome.warnings() {
        println!("    {} {}", "warning:".yellow(), warning);
    }
}

pub fn print_reports(reports: &[ServiceReport]) {
    if reports.is_empty() {
        println!("  No services running");
        return;
    }

    for report in reports {
        println!("  {} Reporting status of {}", "●".blue(), report.name.bold());
        match &report.result {
            Ok(text) if report.state == LifecycleState::Error => println!("    {}", text.red()),
            Ok(text) => println!("    {}", text),
            Err(reason) => println!("    {} {}", "Report failed:".red(), reason),
        }
    }
    println!("  Report finished");
}

pub fn print_running(running: &[RunningInfo]) {
    if running.is_empty() {
        println!("  No services running");
        return;
    }

    for info in running {
        let url = info
            .address
            .map(|address| format!("http://{}", address))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} {} [{}]",
            "●".green(),
            info.name.bold(),
            url.cyan(),
            info.kind
        );
    }
}
