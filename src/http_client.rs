use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = "divrank/0.1 (+ranking pipeline)";

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Status, content type and body of one GET. Non-2xx statuses are returned,
/// not raised; retry policy lives with the callers.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub fn get_page(url: &str) -> Result<FetchedPage> {
    let client = http_client()?;
    let resp = client
        .get(url)
        .send()
        .with_context(|| format!("GET {url} failed"))?;
    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = resp.text().context("failed reading body")?;
    Ok(FetchedPage {
        status,
        content_type,
        body,
    })
}

/// Process-wide blocking client. Connection pooling (keep-alive) is shared
/// across all scrape workers. `HTTP_USER_AGENT` overrides the default agent.
pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| build_client(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
}

/// Install the client with a non-default timeout. A no-op if something
/// already forced initialization; call this before the first request.
pub fn init_http_client(timeout: Duration) -> Result<()> {
    CLIENT.get_or_try_init(|| build_client(timeout))?;
    Ok(())
}

fn build_client(timeout: Duration) -> Result<Client> {
    let agent = std::env::var("HTTP_USER_AGENT")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
    Client::builder()
        .user_agent(agent)
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}
