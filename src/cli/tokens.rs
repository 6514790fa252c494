use anyhow::Result;
use console::style;

use crate::core::store::Store;
use crate::core::terminal::{GuideSection, print_error, print_success};
use crate::platform::{NativePlatform, Platform};

pub async fn run_token_command(args: &[String]) -> Result<()> {
    let sub_cmd = if args.len() > 2 { args[2].as_str() } else { "" };
    let store = Store::open(NativePlatform::data_dir()).await?;
    let user_id = store.default_user_id().await?;

    match sub_cmd {
        "create" => {
            let name = args
                .get(3)
                .cloned()
                .unwrap_or_else(|| "cli".to_string());
            let (raw_token, record) = store.create_api_token(user_id, &name).await?;
            GuideSection::new("Token Created")
                .status("Name", &record.name)
                .status("Id", &record.id)
                .status("Token", &style(&raw_token).green().bold().to_string())
                .blank()
                .warn("Save the token value - it will not be shown again.")
                .print();
            println!();
        }
        "list" => {
            let tokens = store.list_api_tokens(user_id).await?;
            let mut section = GuideSection::new("API Tokens");
            if tokens.is_empty() {
                section = section.text("No tokens configured. Loopback access is open.");
            }
            for token in tokens {
                section = section.status(&token.name, &format!("{} ({})", token.id, token.created_at));
            }
            section.print();
            println!();
        }
        "revoke" => {
            let Some(id) = args.get(3) else {
                print_error("Usage: webedt token revoke <token-id>");
                return Ok(());
            };
            if store.delete_api_token(id).await? {
                print_success("Token revoked.");
            } else {
                print_error("Token not found.");
            }
        }
        _ => {
            print_error("Unknown or missing token command. Expected: create, list, revoke");
        }
    }
    Ok(())
}
