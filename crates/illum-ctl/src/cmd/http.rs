//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api/v1", port)
}

/// Session id and bearer credential, as issued by `session create`.
pub struct Credentials<'a> {
    pub session_id: &'a str,
    pub token: &'a str,
}

pub fn request(method: Method, url: &str, creds: Option<&Credentials<'_>>) -> RequestBuilder {
    let req = reqwest::Client::new().request(method, url);
    match creds {
        Some(c) => req
            .header("X-Session-ID", c.session_id)
            .bearer_auth(c.token),
        None => req,
    }
}

/// Send and decode, turning the daemon's error body into a readable error.
pub async fn send<T: for<'de> Deserialize<'de>>(req: RequestBuilder, url: &str) -> Result<T> {
    let resp = req
        .send()
        .await
        .with_context(|| format!("failed to connect to illumd at {} (is it running?)", url))?;

    let status = resp.status();
    if !status.is_success() {
        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        bail!(describe_error(status.as_u16(), &body));
    }
    resp.json::<T>().await.context("failed to parse response")
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    send(request(Method::GET, url, None), url).await
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    send(request(Method::POST, url, None), url).await
}

fn describe_error(status: u16, body: &serde_json::Value) -> String {
    let kind = body["error"].as_str().unwrap_or("error");
    let message = body["message"].as_str().unwrap_or("request failed");
    let mut out = format!("{} ({}): {}", kind, status, message);

    let suggestions = body["detail"]["suggestions"].as_array();
    for s in suggestions.into_iter().flatten().filter_map(|s| s.as_str()) {
        out.push_str("\n  - ");
        out.push_str(s);
    }
    out
}
