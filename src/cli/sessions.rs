use anyhow::Result;
use console::style;

use crate::core::store::Store;
use crate::core::store::types::SessionStatus;
use crate::core::terminal::GuideSection;
use crate::platform::{NativePlatform, Platform};

pub async fn run_sessions_command(limit: usize) -> Result<()> {
    let store = Store::open(NativePlatform::data_dir()).await?;
    let user_id = store.default_user_id().await?;
    let sessions = store.list_sessions(user_id, limit).await?;

    let mut section = GuideSection::new("Sessions");
    if sessions.is_empty() {
        section = section.text("No sessions yet. Run 'webedt execute --prompt \"...\"'.");
    }
    for session in sessions {
        let status = match session.status {
            SessionStatus::Completed => style("completed").green().to_string(),
            SessionStatus::Error => style("error").red().to_string(),
            SessionStatus::Running => style("running").yellow().to_string(),
            SessionStatus::Pending => style("pending").dim().to_string(),
        };
        let mut summary = session.user_request.clone();
        if summary.chars().count() > 60 {
            summary = format!("{}...", summary.chars().take(60).collect::<String>());
        }
        section = section.status(
            &format!("#{} [{}]", session.id, status),
            &format!("{} ({})", summary, session.created_at),
        );
    }
    section.print();
    println!();
    Ok(())
}
