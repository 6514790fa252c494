use anyhow::Result;
use console::style;
use std::path::Path;

use crate::core::terminal::{GuideSection, print_error, print_info, print_warn};
use crate::platform::{NativePlatform, Platform};

pub async fn gateway_start(
    run_dir: &Path,
    pid_file: &Path,
    api_host: &str,
    api_port: u16,
) -> Result<()> {
    std::fs::create_dir_all(run_dir)?;
    NativePlatform::restrict_dir_permissions(run_dir);
    if pid_file.exists() && std::fs::read_to_string(pid_file).is_ok() {
        print_warn("Gateway is already running. Use 'webedt gateway stop' first.");
        return Ok(());
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(run_dir.join("webedt.log"))?;

    let exe = std::env::current_exe()?;
    let mut child_cmd = std::process::Command::new(exe);
    child_cmd.arg("serve");
    child_cmd.arg("--api-host").arg(api_host);
    child_cmd.arg("--api-port").arg(api_port.to_string());

    let child = child_cmd
        .stdin(std::process::Stdio::null())
        .stdout(log_file.try_clone()?)
        .stderr(log_file)
        .spawn()?;

    std::fs::write(pid_file, child.id().to_string())?;

    GuideSection::new("Gateway Started")
        .status(
            "Status",
            &format!(
                "{} (PID {})",
                style("RUNNING").green().bold(),
                style(child.id()).dim()
            ),
        )
        .status("API Endpoint", &format!("http://{}:{}", api_host, api_port))
        .blank()
        .info(&format!(
            "Run {} to stream a coding session.",
            style("webedt execute --prompt \"...\"").cyan().bold()
        ))
        .print();
    println!();

    Ok(())
}

pub async fn gateway_stop(pid_file: &Path) -> Result<()> {
    let mut daemon_stopped = false;
    if pid_file.exists() {
        if let Ok(pid_str) = std::fs::read_to_string(pid_file) {
            let pid = pid_str.trim();
            if !pid.is_empty() {
                let _ = NativePlatform::kill_process(pid);
                GuideSection::new("Gateway Stopped")
                    .status(
                        "Status",
                        &format!(
                            "{} (was PID {})",
                            style("STOPPED").red().bold(),
                            style(pid).dim()
                        ),
                    )
                    .print();
                daemon_stopped = true;
            }
        }
        std::fs::remove_file(pid_file).ok();
    }

    if !daemon_stopped {
        print_info("Gateway is not currently running.");
    }

    println!();
    Ok(())
}

pub async fn gateway_status(pid_file: &Path) -> Result<()> {
    if pid_file.exists() {
        let pid_str = std::fs::read_to_string(pid_file)?;
        GuideSection::new("Gateway Status")
            .status(
                "Gateway",
                &format!(
                    "{} (PID {})",
                    style("RUNNING").green().bold(),
                    style(pid_str.trim()).dim()
                ),
            )
            .print();
    } else {
        GuideSection::new("Gateway Status")
            .status("Gateway", &style("STOPPED").red().bold().to_string())
            .blank()
            .info(&format!(
                "Run {} to start the daemon.",
                style("webedt gateway start").cyan().bold()
            ))
            .print();
    }
    println!();
    Ok(())
}

pub async fn follow_logs(run_dir: &Path, pid_file: &Path) -> Result<()> {
    if pid_file.exists() && std::fs::read_to_string(pid_file).is_ok() {
        let log_file = run_dir.join("webedt.log");
        if log_file.exists() {
            GuideSection::new("Live Logs")
                .text(&format!(
                    "Following {} - press {} to stop.",
                    style("webedt.log").cyan(),
                    style("Ctrl+C").bold().yellow()
                ))
                .print();
            println!();
            let mut child = NativePlatform::tail_file(&log_file)?;
            let _ = child.wait()?;
        } else {
            print_error(&format!(
                "Log file not found at {}",
                style(log_file.display()).dim()
            ));
        }
    } else {
        GuideSection::new("Live Logs")
            .warn("Gateway is not running.")
            .blank()
            .info(&format!(
                "Run {} to start it.",
                style("webedt gateway start").cyan().bold()
            ))
            .print();
        println!();
    }
    Ok(())
}
