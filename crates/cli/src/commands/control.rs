//! Control a background host through its state file and signals.

use crate::host::{process_alive, send_signal, HostPhase, HostState};
use colored::Colorize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use vsf_core::Config;

/// How long to wait for the host to react to a control command.
const TIMEOUT: Duration = Duration::from_secs(10);
/// Delay between polls of the host state.
const POLL_DELAY: Duration = Duration::from_millis(500);

fn phase_label(state: &Option<HostState>) -> String {
    match state {
        Some(state) => state.phase.to_string(),
        None => "Stopped".to_string(),
    }
}

fn refuse(state: &Option<HostState>, action: &str) {
    println!("Current host state: {}", phase_label(state).bold());
    println!("The host is not in a state which can be {}.", action);
}

pub async fn start(config: Config) -> anyhow::Result<()> {
    let state = HostState::load(&config.state_file)?;
    if state.is_some() {
        refuse(&state, "started");
        return Ok(());
    }

    let exe = std::env::current_exe()?;
    let child = std::process::Command::new(exe)
        .env("VSF_CONFIG_DIR", &config.config_dir)
        .env("VSF_SERVICE_NAME", &config.service_name)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let pid = child.id();

    print!("{} Starting {}...", "▶".blue(), config.service_name);
    let started = wait_for(&config, |state| matches!(state, Some(s) if s.pid == pid)).await?;
    if started {
        println!(" {}", "✓".green());
        println!("The host was started successfully (PID: {}).", pid);
        Ok(())
    } else {
        println!(" {}", "✗".red());
        anyhow::bail!("The host did not report itself running within {}s", TIMEOUT.as_secs())
    }
}

pub async fn stop(config: Config) -> anyhow::Result<()> {
    let state = HostState::load(&config.state_file)?;
    let Some(host) = state.as_ref() else {
        refuse(&state, "stopped");
        return Ok(());
    };

    print!("{} Stopping {}...", "■".red(), config.service_name);
    send_signal(host.pid, libc::SIGTERM)?;

    let pid = host.pid;
    let deadline = Instant::now() + TIMEOUT;
    while process_alive(pid) && Instant::now() < deadline {
        tokio::time::sleep(POLL_DELAY).await;
    }

    if process_alive(pid) {
        println!(" {}", "✗".red());
        anyhow::bail!("The host (PID: {}) is still running after {}s", pid, TIMEOUT.as_secs());
    }
    println!(" {}", "✓".green());
    println!("The host was stopped successfully.");
    Ok(())
}

pub async fn pause(config: Config) -> anyhow::Result<()> {
    transition(config, HostPhase::Running, HostPhase::Paused, libc::SIGUSR1, "paused").await
}

pub async fn resume(config: Config) -> anyhow::Result<()> {
    transition(config, HostPhase::Paused, HostPhase::Running, libc::SIGUSR2, "resumed").await
}

async fn transition(
    config: Config,
    from: HostPhase,
    to: HostPhase,
    signal: i32,
    action: &str,
) -> anyhow::Result<()> {
    let state = HostState::load(&config.state_file)?;
    let pid = match &state {
        Some(host) if host.phase == from => host.pid,
        _ => {
            refuse(&state, action);
            return Ok(());
        }
    };

    send_signal(pid, signal)?;
    if wait_for(&config, |state| matches!(state, Some(s) if s.phase == to)).await? {
        println!("The host was {} successfully.", action);
        Ok(())
    } else {
        anyhow::bail!("The host did not confirm it was {} within {}s", action, TIMEOUT.as_secs())
    }
}

pub async fn status(config: Config) -> anyhow::Result<()> {
    let state = HostState::load(&config.state_file)?;
    println!("Host status: {}", phase_label(&state).bold());

    let Some(host) = state else {
        return Ok(());
    };
    println!("  PID: {}  Started: {}", host.pid, host.started_at);

    if host.services.is_empty() {
        println!("  No services running");
        return Ok(());
    }

    let client = reqwest::Client::new();
    for service in &host.services {
        let Some(address) = &service.address else {
            println!("  {} {}", "●".yellow(), service.name.bold());
            continue;
        };

        let url = format!("http://{}/report", address);
        let report = match client.get(&url).timeout(Duration::from_secs(2)).send().await {
            Ok(resp) => {
                let ok = resp.status().is_success();
                let text = resp.text().await.unwrap_or_default();
                if ok {
                    text.normal()
                } else {
                    text.red()
                }
            }
            Err(e) => format!("unreachable ({})", e).red(),
        };

        println!("  {} {} {}", "●".green(), service.name.bold(), url.cyan());
        println!("    {}", report);
    }

    Ok(())
}

/// Poll the state file until `ready` holds or the timeout passes.
async fn wait_for<F>(config: &Config, ready: F) -> anyhow::Result<bool>
where
    F: Fn(&Option<HostState>) -> bool,
{
    let deadline = Instant::now() + TIMEOUT;
    loop {
        if ready(&HostState::load(&config.state_file)?) {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(POLL_DELAY).await;
    }
}
