mod daemon;
mod execute;
mod serve;
mod sessions;
mod tokens;

use anyhow::Result;
use console::style;

use crate::core::config::{DEFAULT_API_HOST, DEFAULT_API_PORT};
use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Core")
        .command("execute", "Run a coding session and stream its output")
        .command("sessions", "List recorded sessions")
        .command("serve", "Run the gateway in the foreground")
        .print();

    GuideSection::new("Management")
        .command("gateway", "Manage the background gateway process")
        .command("token", "Manage API tokens")
        .command("credential", "Store the coding agent credential")
        .print();

    GuideSection::new("Diagnostics")
        .command("logs", "Follow real-time gateway logs")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("webedt").green()
    );
}

pub(crate) fn parse_api_server_flags(
    args: &[String],
    start: usize,
    mut api_host: String,
    mut api_port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().unwrap_or(DEFAULT_API_PORT);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (api_host, api_port)
}

pub(crate) fn parse_execute_args(args: &[String], start: usize) -> execute::ExecuteArgs {
    let mut parsed = execute::ExecuteArgs {
        api_base: format!("http://{}:{}", DEFAULT_API_HOST, DEFAULT_API_PORT),
        ..execute::ExecuteArgs::default()
    };
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--prompt" | "-p" => {
                if i + 1 < args.len() {
                    parsed.prompt = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--repo" => {
                if i + 1 < args.len() {
                    parsed.repo = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--branch" => {
                if i + 1 < args.len() {
                    parsed.branch = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--auto-commit" => {
                parsed.auto_commit = true;
                i += 1;
            }
            "--resume" => {
                if i + 1 < args.len() {
                    parsed.resume = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-url" => {
                if i + 1 < args.len() {
                    parsed.api_base = args[i + 1].trim_end_matches('/').to_string();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--token" => {
                if i + 1 < args.len() {
                    parsed.token = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    parsed
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let run_dir = NativePlatform::data_dir().join("run");
    let pid_file = run_dir.join("webedt.pid");

    let api_host = DEFAULT_API_HOST.to_string();
    let api_port: u16 = DEFAULT_API_PORT;

    if args.len() > 1 {
        let cmd = args[1].as_str();
        match cmd {
            "serve" => {
                let (api_host, api_port) = parse_api_server_flags(&args, 2, api_host, api_port);
                serve::run_engine(api_host, api_port).await?;
            }
            "gateway" => {
                let sub_cmd = if args.len() > 2 { args[2].as_str() } else { "" };
                match sub_cmd {
                    "start" => {
                        let (api_host, api_port) =
                            parse_api_server_flags(&args, 3, api_host, api_port);
                        daemon::gateway_start(&run_dir, &pid_file, &api_host, api_port).await?;
                    }
                    "stop" => {
                        daemon::gateway_stop(&pid_file).await?;
                    }
                    "status" => {
                        daemon::gateway_status(&pid_file).await?;
                    }
                    _ => {
                        print_error(
                            "Unknown or missing gateway command. Expected: start, stop, status",
                        );
                        print_help();
                    }
                }
            }
            "logs" => {
                daemon::follow_logs(&run_dir, &pid_file).await?;
            }
            "execute" => {
                let parsed = parse_execute_args(&args, 2);
                if parsed.prompt.is_none() && parsed.resume.is_none() {
                    print_error("Error: --prompt or --resume is required for execute.");
                    print_help();
                    return Ok(());
                }
                execute::run_execute(parsed).await?;
            }
            "sessions" => {
                let mut limit = 20;
                let mut i = 2;
                while i < args.len() {
                    if args[i] == "--limit" && i + 1 < args.len() {
                        limit = args[i + 1].parse().unwrap_or(20);
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                sessions::run_sessions_command(limit).await?;
            }
            "token" => {
                tokens::run_token_command(&args).await?;
            }
            "credential" => {
                let Some(value) = args.get(2) else {
                    print_error("Usage: webedt credential <value>");
                    return Ok(());
                };
                let store =
                    crate::core::store::Store::open(NativePlatform::data_dir()).await?;
                let user_id = store.default_user_id().await?;
                store.set_worker_credential(user_id, value).await?;
                terminal::print_success("Coding agent credential stored.");
            }
            "help" | "--help" | "-h" => print_help(),
            _ => {
                print_error(&format!("Unknown command: {}", cmd));
                print_help();
            }
        }
    } else {
        print_help();
    }

    Ok(())
}
