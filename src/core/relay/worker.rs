use serde_derive::Serialize;

/// Repository binding forwarded to the worker when a session is bound to a
/// GitHub repo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubBinding {
    pub repo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub access_token: String,
}

/// Body of `POST {AI_WORKER_URL}/execute`. `user_request` is an opaque JSON
/// value: a plain string or an array of content blocks, passed through
/// exactly as the caller sent it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerExecuteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_request: Option<serde_json::Value>,
    pub coding_assistant_provider: &'static str,
    pub coding_assistant_authentication: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_commit: Option<bool>,
}

pub const CODING_ASSISTANT_PROVIDER: &str = "ClaudeAgentSDK";

/// Thin client for the external ai-coding-worker.
#[derive(Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
    execute_url: String,
}

impl WorkerClient {
    pub fn new(worker_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            execute_url: format!("{}/execute", worker_url.trim_end_matches('/')),
        }
    }

    pub async fn execute(
        &self,
        request: &WorkerExecuteRequest,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(&self.execute_url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
    }
}
