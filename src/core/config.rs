use url::Url;

pub const DEFAULT_API_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 7177;
pub const DEFAULT_WORKER_URL: &str = "http://localhost:5001";

/// Runtime configuration. Environment wins over defaults; the API bind
/// address comes from CLI flags instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        let worker_url = std::env::var("AI_WORKER_URL")
            .ok()
            .map(|raw| normalize_worker_url(&raw))
            .unwrap_or_else(|| DEFAULT_WORKER_URL.to_string());

        Self { worker_url }
    }
}

/// Trailing slashes would otherwise produce `//execute` upstream paths.
/// Unparseable values are kept verbatim so the connect error surfaces at
/// request time with the configured string in it.
fn normalize_worker_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    match Url::parse(trimmed) {
        Ok(url) => url.to_string().trim_end_matches('/').to_string(),
        Err(_) => trimmed.to_string(),
    }
}
