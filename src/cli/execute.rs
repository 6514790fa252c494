use anyhow::{Result, anyhow};
use console::style;
use serde_json::Value;

use crate::client::{Method, StreamEvent, SubscribeOptions, subscribe};
use crate::core::terminal::{print_error, print_info, print_success};

#[derive(Debug, Default)]
pub struct ExecuteArgs {
    pub prompt: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub auto_commit: bool,
    pub resume: Option<String>,
    pub api_base: String,
    pub token: Option<String>,
}

/// Stream one coding session in the terminal. Uses the same stream-client
/// layer a UI would, over the POST transport (no auto-reconnect: the request
/// has side effects).
pub async fn run_execute(args: ExecuteArgs) -> Result<()> {
    let mut body = serde_json::Map::new();
    if let Some(prompt) = &args.prompt {
        body.insert("userRequest".to_string(), Value::String(prompt.clone()));
    }
    if let Some(repo) = &args.repo {
        body.insert("repositoryUrl".to_string(), Value::String(repo.clone()));
    }
    if let Some(branch) = &args.branch {
        body.insert("branch".to_string(), Value::String(branch.clone()));
    }
    if args.auto_commit {
        body.insert("autoCommit".to_string(), Value::Bool(true));
    }
    if let Some(resume) = &args.resume {
        body.insert("resumeSessionId".to_string(), Value::String(resume.clone()));
    }

    let url = format!("{}/api/execute", args.api_base);
    let mut conn = subscribe(
        url,
        SubscribeOptions {
            method: Method::Post,
            body: Some(Value::Object(body)),
            bearer_token: args.token.clone(),
            ..SubscribeOptions::default()
        },
    );

    while let Some(event) = conn.recv().await {
        match event {
            StreamEvent::Connected => {
                print_info("Connected - streaming session output...");
            }
            StreamEvent::Message { event, data } => render_event(&event, &data),
            StreamEvent::Completed(payload) => {
                let session_id = payload
                    .as_ref()
                    .and_then(|p| p.get("sessionId"))
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "?".to_string());
                print_success(&format!("Session {} completed.", session_id));
                return Ok(());
            }
            StreamEvent::Error(reason) => {
                print_error(&reason);
                return Err(anyhow!("session failed: {reason}"));
            }
        }
    }

    Ok(())
}

fn render_event(event: &str, data: &Value) {
    let text = ["message", "text", "content"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_str));

    match (event, text) {
        ("assistant_message", Some(text)) => println!("{}", text),
        ("thought", Some(text)) => println!("{}", style(text).dim().italic()),
        ("status", Some(text)) => println!("{}", style(text).dim()),
        ("session-created", _) => {
            if let Some(id) = data.get("sessionId").and_then(Value::as_str) {
                println!("{}", style(format!("[worker session {}]", id)).dim());
            }
        }
        ("session_name", _) => {
            if let Some(name) = data.as_str() {
                println!("{}", style(format!("[{}]", name)).dim());
            }
        }
        (_, Some(text)) => println!("{}", style(text).dim()),
        // Unknown shapes are still shown; the relay forwards them verbatim.
        (_, None) => println!("{}", style(format!("[{}] {}", event, data)).dim()),
    }
}
